//! Event repository implementation

use sqlx::{PgConnection, PgPool};
use chrono::Utc;
use crate::models::event::{Event, CreateEventRequest};
use crate::utils::errors::EngineError;

pub(crate) const EVENT_COLUMNS: &str = "id, tenant_id, creator_id, title, start_time, capacity, is_paid, \
    price_cents, currency, refund_policy, refund_deadline_hours, partial_refund_percentage, status, \
    cancelled_at, cancelled_by, cancellation_reason, total_refunded_cents, completion_attempts, \
    created_at, updated_at";

#[derive(Clone, Debug)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new event
    pub async fn create(&self, request: &CreateEventRequest) -> Result<Event, EngineError> {
        let now = Utc::now();
        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (tenant_id, creator_id, title, start_time, capacity, is_paid, price_cents, currency,
                                refund_policy, refund_deadline_hours, partial_refund_percentage, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(request.tenant_id)
        .bind(request.creator_id)
        .bind(&request.title)
        .bind(request.start_time)
        .bind(request.capacity)
        .bind(request.is_paid)
        .bind(request.price_cents)
        .bind(&request.currency)
        .bind(request.refund_policy)
        .bind(request.refund_deadline_hours)
        .bind(request.partial_refund_percentage)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(event)
    }

    /// Find event by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Event>, EngineError> {
        let event = sqlx::query_as::<_, Event>(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(event)
    }

    /// Read the event and hold its row lock until the surrounding transaction ends
    pub async fn lock(conn: &mut PgConnection, id: i64) -> Result<Option<Event>, EngineError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id = $1 FOR UPDATE",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(event)
    }

    /// Write back the mutable columns of an event already locked in this transaction
    pub async fn save(conn: &mut PgConnection, event: &Event) -> Result<Event, EngineError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET capacity = $2,
                status = $3,
                cancelled_at = $4,
                cancelled_by = $5,
                cancellation_reason = $6,
                total_refunded_cents = $7,
                completion_attempts = $8,
                updated_at = $9
            WHERE id = $1
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(event.id)
        .bind(event.capacity)
        .bind(event.status)
        .bind(event.cancelled_at)
        .bind(event.cancelled_by)
        .bind(&event.cancellation_reason)
        .bind(event.total_refunded_cents)
        .bind(event.completion_attempts)
        .bind(event.updated_at)
        .fetch_one(conn)
        .await?;

        Ok(event)
    }
}
