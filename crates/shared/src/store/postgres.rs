//! Postgres implementation of the account store.
//!
//! Expected schema (migrations are managed outside this crate):
//!
//! ```sql
//! CREATE TABLE tenant_accounts (
//!     id                   UUID PRIMARY KEY,
//!     email                TEXT NOT NULL UNIQUE,
//!     company_name         TEXT,
//!     channel_phone        TEXT,
//!     business_context     TEXT,
//!     tier                 TEXT NOT NULL,
//!     status               TEXT NOT NULL,
//!     ai_credits_remaining BIGINT NOT NULL DEFAULT 0 CHECK (ai_credits_remaining >= 0),
//!     referral_code        TEXT NOT NULL UNIQUE,
//!     referred_by          UUID REFERENCES tenant_accounts(id),
//!     total_referrals      INT NOT NULL DEFAULT 0,
//!     referral_credits     INT NOT NULL DEFAULT 0,
//!     billing_customer_id  TEXT UNIQUE,
//!     is_active            BOOLEAN NOT NULL DEFAULT TRUE,
//!     created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE TABLE ledger_entries (
//!     id            UUID PRIMARY KEY,
//!     account_id    UUID NOT NULL REFERENCES tenant_accounts(id),
//!     delta         BIGINT NOT NULL,
//!     reason        TEXT NOT NULL,
//!     balance_after BIGINT NOT NULL,
//!     created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::account::{normalize_referral_code, LedgerEntry, TenantAccount};
use crate::tiers::{PlanStatus, PlanTier};

use super::{AccountStore, ReferralBalances, ReferralReward, StoreError, StoreResult};

const ACCOUNT_COLUMNS: &str = "id, email, company_name, channel_phone, business_context, tier, \
     status, ai_credits_remaining, referral_code, referred_by, total_referrals, \
     referral_credits, billing_customer_id, is_active, created_at";

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    company_name: Option<String>,
    channel_phone: Option<String>,
    business_context: Option<String>,
    tier: String,
    status: String,
    ai_credits_remaining: i64,
    referral_code: String,
    referred_by: Option<Uuid>,
    total_referrals: i32,
    referral_credits: i32,
    billing_customer_id: Option<String>,
    is_active: bool,
    created_at: OffsetDateTime,
}

impl AccountRow {
    fn into_account(self) -> StoreResult<TenantAccount> {
        let tier = PlanTier::parse(&self.tier)
            .ok_or_else(|| StoreError::Decode(format!("unknown tier '{}'", self.tier)))?;
        let status = PlanStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Decode(format!("unknown status '{}'", self.status)))?;
        Ok(TenantAccount {
            id: self.id,
            email: self.email,
            company_name: self.company_name,
            channel_phone: self.channel_phone,
            business_context: self.business_context,
            tier,
            status,
            ai_credits_remaining: self.ai_credits_remaining,
            referral_code: self.referral_code,
            referred_by: self.referred_by,
            total_referrals: self.total_referrals,
            referral_credits: self.referral_credits,
            billing_customer_id: self.billing_customer_id,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        bind: &str,
    ) -> StoreResult<Option<TenantAccount>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM tenant_accounts WHERE {clause}");
        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AccountRow::into_account).transpose()
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn insert_account(&self, account: TenantAccount) -> StoreResult<TenantAccount> {
        sqlx::query(
            r#"
            INSERT INTO tenant_accounts (
                id, email, company_name, channel_phone, business_context, tier, status,
                ai_credits_remaining, referral_code, referred_by, total_referrals,
                referral_credits, billing_customer_id, is_active, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.company_name)
        .bind(&account.channel_phone)
        .bind(&account.business_context)
        .bind(account.tier.as_str())
        .bind(account.status.as_str())
        .bind(account.ai_credits_remaining)
        .bind(&account.referral_code)
        .bind(account.referred_by)
        .bind(account.total_referrals)
        .bind(account.referral_credits)
        .bind(&account.billing_customer_id)
        .bind(account.is_active)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StoreError::Conflict(format!(
                        "account insert conflict: {}",
                        db.message()
                    ));
                }
            }
            StoreError::Database(e)
        })?;
        Ok(account)
    }

    async fn account_by_id(&self, id: Uuid) -> StoreResult<Option<TenantAccount>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM tenant_accounts WHERE id = $1");
        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn account_by_channel_phone(&self, phone: &str) -> StoreResult<Option<TenantAccount>> {
        self.fetch_one_where("channel_phone = $1", phone).await
    }

    async fn account_by_referral_code(&self, code: &str) -> StoreResult<Option<TenantAccount>> {
        let code = normalize_referral_code(code);
        self.fetch_one_where("referral_code = $1", &code).await
    }

    async fn account_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> StoreResult<Option<TenantAccount>> {
        self.fetch_one_where("billing_customer_id = $1", customer_id)
            .await
    }

    async fn first_active_account(&self) -> StoreResult<Option<TenantAccount>> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM tenant_accounts WHERE is_active = TRUE \
             ORDER BY created_at LIMIT 1"
        );
        let row: Option<AccountRow> = sqlx::query_as(&query).fetch_optional(&self.pool).await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn list_accounts(&self) -> StoreResult<Vec<TenantAccount>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM tenant_accounts ORDER BY created_at");
        let rows: Vec<AccountRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;
        rows.into_iter().map(AccountRow::into_account).collect()
    }

    async fn top_referrers(&self, limit: i64) -> StoreResult<Vec<TenantAccount>> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM tenant_accounts WHERE total_referrals > 0 \
             ORDER BY total_referrals DESC LIMIT $1"
        );
        let rows: Vec<AccountRow> = sqlx::query_as(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AccountRow::into_account).collect()
    }

    async fn set_plan(&self, id: Uuid, tier: PlanTier, status: PlanStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE tenant_accounts SET tier = $2, status = $3 WHERE id = $1")
            .bind(id)
            .bind(tier.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    async fn set_billing_customer(&self, id: Uuid, customer_id: &str) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE tenant_accounts SET billing_customer_id = $2 WHERE id = $1")
                .bind(id)
                .bind(customer_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE tenant_accounts SET is_active = FALSE, status = 'inactive' WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    async fn debit_credits(&self, id: Uuid, amount: i64) -> StoreResult<i64> {
        // Single-statement compare-and-decrement: the WHERE guard and the
        // update are atomic, so concurrent debits serialize on the row and
        // the balance can never go negative.
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE tenant_accounts
            SET ai_credits_remaining = ai_credits_remaining - $2
            WHERE id = $1 AND ai_credits_remaining >= $2
            RETURNING ai_credits_remaining
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some((balance,)) => Ok(balance),
            None => {
                // Guard failed: distinguish a missing account from an
                // insufficient balance for the caller.
                let balance: Option<(i64,)> = sqlx::query_as(
                    "SELECT ai_credits_remaining FROM tenant_accounts WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                match balance {
                    Some((balance,)) => Err(StoreError::InsufficientCredits {
                        balance,
                        requested: amount,
                    }),
                    None => Err(StoreError::NotFound(format!("account {id}"))),
                }
            }
        }
    }

    async fn credit_credits(&self, id: Uuid, amount: i64) -> StoreResult<i64> {
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE tenant_accounts
            SET ai_credits_remaining = ai_credits_remaining + $2
            WHERE id = $1
            RETURNING ai_credits_remaining
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;
        updated
            .map(|(balance,)| balance)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))
    }

    async fn apply_referral_reward(
        &self,
        referee_id: Uuid,
        referrer_id: Uuid,
        reward: ReferralReward,
    ) -> StoreResult<ReferralBalances> {
        let mut tx = self.pool.begin().await?;

        // The referred_by IS NULL guard makes a second application for the
        // same referee a no-row update, which aborts the transaction.
        let referee: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE tenant_accounts
            SET referred_by = $2,
                ai_credits_remaining = ai_credits_remaining + $3
            WHERE id = $1 AND referred_by IS NULL
            RETURNING ai_credits_remaining
            "#,
        )
        .bind(referee_id)
        .bind(referrer_id)
        .bind(reward.referee_ai_credits)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((referee_balance,)) = referee else {
            tx.rollback().await?;
            let exists: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM tenant_accounts WHERE id = $1")
                    .bind(referee_id)
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(match exists {
                Some(_) => {
                    StoreError::Conflict("referral already applied for this account".to_string())
                }
                None => StoreError::NotFound(format!("account {referee_id}")),
            });
        };

        let referrer: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE tenant_accounts
            SET total_referrals = total_referrals + 1,
                referral_credits = referral_credits + $2,
                ai_credits_remaining = ai_credits_remaining + $3
            WHERE id = $1
            RETURNING ai_credits_remaining
            "#,
        )
        .bind(referrer_id)
        .bind(reward.referrer_packs)
        .bind(reward.referrer_ai_credits)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((referrer_balance,)) = referrer else {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("account {referrer_id}")));
        };

        tx.commit().await?;

        Ok(ReferralBalances {
            referee_balance,
            referrer_balance,
        })
    }

    async fn record_ledger_entry(&self, entry: LedgerEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, account_id, delta, reason, balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.account_id)
        .bind(entry.delta)
        .bind(&entry.reason)
        .bind(entry.balance_after)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ledger_entries_for(&self, account_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let rows: Vec<(Uuid, Uuid, i64, String, i64, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT id, account_id, delta, reason, balance_after, created_at
            FROM ledger_entries
            WHERE account_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(id, account_id, delta, reason, balance_after, created_at)| LedgerEntry {
                    id,
                    account_id,
                    delta,
                    reason,
                    balance_after,
                    created_at,
                },
            )
            .collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
