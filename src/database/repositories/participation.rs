//! Participation repository implementation

use sqlx::{PgConnection, PgPool};
use crate::models::participation::{Participation, ParticipationStatus};
use crate::utils::errors::EngineError;

const PARTICIPATION_COLUMNS: &str = "id, event_id, member_id, tenant_id, status, payment_status, \
    payment_intent_id, amount_paid_cents, paid_at, refunded_at, refund_amount_cents, \
    payment_expires_at, registered_at, updated_at, version";

#[derive(Clone, Debug)]
pub struct ParticipationRepository {
    pool: PgPool,
}

impl ParticipationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find participation by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Participation>, EngineError> {
        let participation = sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM event_participations WHERE id = $1",
            PARTICIPATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(participation)
    }

    /// Find a member's participation in an event
    pub async fn find_for_member(&self, event_id: i64, member_id: i64) -> Result<Option<Participation>, EngineError> {
        let participation = sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM event_participations WHERE event_id = $1 AND member_id = $2",
            PARTICIPATION_COLUMNS
        ))
        .bind(event_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(participation)
    }

    /// Find the participation linked to a provider payment intent
    pub async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Participation>, EngineError> {
        let participation = sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM event_participations WHERE payment_intent_id = $1 ORDER BY updated_at DESC LIMIT 1",
            PARTICIPATION_COLUMNS
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(participation)
    }

    /// All non-cancelled participations of an event in registration order
    pub async fn list_active(&self, event_id: i64) -> Result<Vec<Participation>, EngineError> {
        let participations = sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM event_participations WHERE event_id = $1 AND status <> 'CANCELLED' ORDER BY registered_at ASC, id ASC",
            PARTICIPATION_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(participations)
    }

    /// Count seat-holding participations
    pub async fn count_registered(conn: &mut PgConnection, event_id: i64) -> Result<i64, EngineError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM event_participations WHERE event_id = $1 AND status = 'REGISTERED'"
        )
        .bind(event_id)
        .fetch_one(conn)
        .await?;

        Ok(count.0)
    }

    /// Lock a member's participation row inside the current transaction
    pub async fn lock_for_member(conn: &mut PgConnection, event_id: i64, member_id: i64) -> Result<Option<Participation>, EngineError> {
        let participation = sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM event_participations WHERE event_id = $1 AND member_id = $2 FOR UPDATE",
            PARTICIPATION_COLUMNS
        ))
        .bind(event_id)
        .bind(member_id)
        .fetch_optional(conn)
        .await?;

        Ok(participation)
    }

    /// Lock a participation row inside the current transaction
    pub async fn lock(conn: &mut PgConnection, id: i64) -> Result<Option<Participation>, EngineError> {
        let participation = sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM event_participations WHERE id = $1 FOR UPDATE",
            PARTICIPATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(participation)
    }

    /// Rows of the event in the given status, oldest registration first
    pub async fn lock_by_status(conn: &mut PgConnection, event_id: i64, status: ParticipationStatus) -> Result<Vec<Participation>, EngineError> {
        let participations = sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM event_participations WHERE event_id = $1 AND status = $2 ORDER BY registered_at ASC, id ASC FOR UPDATE",
            PARTICIPATION_COLUMNS
        ))
        .bind(event_id)
        .bind(status)
        .fetch_all(conn)
        .await?;

        Ok(participations)
    }

    /// Every row of the event, cancelled ones included, locked for the current transaction
    pub async fn lock_for_event(conn: &mut PgConnection, event_id: i64) -> Result<Vec<Participation>, EngineError> {
        let participations = sqlx::query_as::<_, Participation>(&format!(
            "SELECT {} FROM event_participations WHERE event_id = $1 ORDER BY registered_at ASC, id ASC FOR UPDATE",
            PARTICIPATION_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(conn)
        .await?;

        Ok(participations)
    }

    /// Insert a freshly admitted participation; `id` on the argument is ignored
    pub async fn insert(conn: &mut PgConnection, participation: &Participation) -> Result<Participation, EngineError> {
        let participation = sqlx::query_as::<_, Participation>(&format!(
            r#"
            INSERT INTO event_participations (event_id, member_id, tenant_id, status, payment_status, registered_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PARTICIPATION_COLUMNS
        ))
        .bind(participation.event_id)
        .bind(participation.member_id)
        .bind(participation.tenant_id)
        .bind(participation.status)
        .bind(participation.payment_status)
        .bind(participation.registered_at)
        .bind(participation.updated_at)
        .fetch_one(conn)
        .await?;

        Ok(participation)
    }

    /// Write back every mutable column of a participation and bump its version.
    /// Callers hold the row lock.
    pub async fn save(conn: &mut PgConnection, participation: &Participation) -> Result<Participation, EngineError> {
        let participation_id = participation.id;
        Self::update(conn, participation, None)
            .await?
            .ok_or(EngineError::ParticipationNotFound { participation_id })
    }

    /// Optimistic write: applies only while the stored version still equals
    /// `participation.version`. Returns `None` when the row moved on.
    pub async fn save_if_current(conn: &mut PgConnection, participation: &Participation) -> Result<Option<Participation>, EngineError> {
        Self::update(conn, participation, Some(participation.version)).await
    }

    async fn update(
        conn: &mut PgConnection,
        participation: &Participation,
        expected_version: Option<i64>,
    ) -> Result<Option<Participation>, EngineError> {
        let saved = sqlx::query_as::<_, Participation>(&format!(
            r#"
            UPDATE event_participations
            SET status = $2,
                payment_status = $3,
                payment_intent_id = $4,
                amount_paid_cents = $5,
                paid_at = $6,
                refunded_at = $7,
                refund_amount_cents = $8,
                payment_expires_at = $9,
                registered_at = $10,
                updated_at = $11,
                version = version + 1
            WHERE id = $1 AND ($12::BIGINT IS NULL OR version = $12)
            RETURNING {}
            "#,
            PARTICIPATION_COLUMNS
        ))
        .bind(participation.id)
        .bind(participation.status)
        .bind(participation.payment_status)
        .bind(&participation.payment_intent_id)
        .bind(participation.amount_paid_cents)
        .bind(participation.paid_at)
        .bind(participation.refunded_at)
        .bind(participation.refund_amount_cents)
        .bind(participation.payment_expires_at)
        .bind(participation.registered_at)
        .bind(participation.updated_at)
        .bind(expected_version)
        .fetch_optional(conn)
        .await?;

        Ok(saved)
    }
}
