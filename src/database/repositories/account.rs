//! Payment account repository implementation

use sqlx::PgPool;
use crate::models::payment::PaymentAccount;
use crate::utils::errors::EngineError;

#[derive(Clone, Debug)]
pub struct PaymentAccountRepository {
    pool: PgPool,
}

impl PaymentAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the connected account of a gym
    pub async fn find_by_tenant(&self, tenant_id: i64) -> Result<Option<PaymentAccount>, EngineError> {
        let account = sqlx::query_as::<_, PaymentAccount>(
            "SELECT tenant_id, account_id, charges_enabled, created_at FROM payment_accounts WHERE tenant_id = $1"
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Create or replace a gym's connected account
    pub async fn upsert(&self, account: &PaymentAccount) -> Result<PaymentAccount, EngineError> {
        let account = sqlx::query_as::<_, PaymentAccount>(
            r#"
            INSERT INTO payment_accounts (tenant_id, account_id, charges_enabled, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id) DO UPDATE
            SET account_id = EXCLUDED.account_id,
                charges_enabled = EXCLUDED.charges_enabled
            RETURNING tenant_id, account_id, charges_enabled, created_at
            "#
        )
        .bind(account.tenant_id)
        .bind(&account.account_id)
        .bind(account.charges_enabled)
        .bind(account.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }
}
