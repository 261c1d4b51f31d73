//! GymBooking maintenance binary
//!
//! Runs migrations and the operator commands of the participation engine:
//!
//! ```text
//! gymbooking migrate
//! gymbooking expire-payments <event_id>
//! gymbooking confirm-payment <participation_id> [intent_id]
//! gymbooking cancel-event <event_id> <actor_id> <reason...>
//! ```

use anyhow::{bail, Context};
use chrono::Utc;
use tracing::{error, info, warn};

use gymbooking::{
    config::Settings,
    database::{self, DatabaseConfig},
    services::ServiceFactory,
    utils::logging,
};

enum Command {
    Migrate,
    ExpirePayments { event_id: i64 },
    ConfirmPayment { participation_id: i64, intent_id: Option<String> },
    CancelEvent { event_id: i64, actor_id: i64, reason: String },
}

impl Command {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let id = |index: usize, name: &str| -> anyhow::Result<i64> {
            args.get(index)
                .with_context(|| format!("missing <{}>", name))?
                .parse()
                .with_context(|| format!("<{}> must be an integer", name))
        };

        match args.first().map(String::as_str) {
            Some("migrate") => Ok(Command::Migrate),
            Some("expire-payments") => Ok(Command::ExpirePayments { event_id: id(1, "event_id")? }),
            Some("confirm-payment") => Ok(Command::ConfirmPayment {
                participation_id: id(1, "participation_id")?,
                intent_id: args.get(2).cloned(),
            }),
            Some("cancel-event") => {
                let reason = args.get(3..).map(|words| words.join(" ")).unwrap_or_default();
                if reason.trim().is_empty() {
                    bail!("missing <reason>");
                }
                Ok(Command::CancelEvent {
                    event_id: id(1, "event_id")?,
                    actor_id: id(2, "actor_id")?,
                    reason,
                })
            }
            Some(other) => bail!("unknown command: {}", other),
            None => bail!("usage: gymbooking <migrate|expire-payments|confirm-payment|cancel-event> [args]"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    // Load configuration
    let settings = Settings::new().context("failed to load settings")?;
    settings.validate()?;

    let _guard = logging::init_logging(&settings.logging)?;
    info!("Starting {}", gymbooking::info());

    let pool = database::create_pool(&DatabaseConfig::from(&settings.database)).await?;

    if let Command::Migrate = command {
        database::run_migrations(&pool).await?;
        return Ok(());
    }

    let services = ServiceFactory::new(&settings, pool)?;
    let health = services.health_check().await;
    for issue in health.get_issues() {
        warn!(issue = %issue, "Service degraded");
    }
    if !health.is_healthy() {
        bail!("engine is not healthy: {:?}", health.get_issues());
    }

    let engine = &services.participation_service;
    match command {
        Command::Migrate => {}
        Command::ExpirePayments { event_id } => {
            let expired = engine.expire_overdue_payments(event_id, Utc::now()).await?;
            info!(event_id = event_id, expired = expired.len(), "Overdue payments expired");
        }
        Command::ConfirmPayment { participation_id, intent_id } => {
            match engine.confirm_payment(participation_id, intent_id.as_deref()).await {
                Ok(participation) => info!(
                    participation_id = participation.id,
                    status = %participation.status,
                    "Payment confirmed"
                ),
                Err(e) if e.is_recoverable() => {
                    warn!(participation_id = participation_id, error = %e, "Payment not confirmed yet");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::CancelEvent { event_id, actor_id, reason } => {
            let report = engine.cancel_event_with_refunds(event_id, actor_id, &reason).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                error!(event_id = event_id, failures = report.failures.len(), "Some refunds need manual follow-up");
            }
        }
    }

    Ok(())
}
