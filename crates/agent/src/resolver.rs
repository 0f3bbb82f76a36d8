//! Tenant resolution.
//!
//! Maps the channel-side destination number to the owning tenant account.
//! When no account has registered that number, resolution falls back to an
//! arbitrary active account. That fallback conflates tenants under
//! ambiguous routing and exists for demo deployments with a single tenant;
//! a production build should fail hard here instead. Every fallback use is
//! logged at warn so the behavior is visible.

use std::sync::Arc;

use swiftreply_shared::{AccountStore, StoreResult, TenantAccount};

#[derive(Clone)]
pub struct TenantResolver {
    store: Arc<dyn AccountStore>,
}

impl TenantResolver {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Resolve the destination address to a tenant. `None` means no active
    /// tenant exists at all; the pipeline halts silently.
    pub async fn resolve(&self, destination: &str) -> StoreResult<Option<TenantAccount>> {
        if !destination.is_empty() {
            if let Some(account) = self.store.account_by_channel_phone(destination).await? {
                return Ok(Some(account));
            }
        }

        let fallback = self.store.first_active_account().await?;
        match &fallback {
            Some(account) => {
                tracing::warn!(
                    destination,
                    account_id = %account.id,
                    "No exact channel match, falling back to an active account"
                );
            }
            None => {
                tracing::warn!(destination, "No active account found for inbound message");
            }
        }
        Ok(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swiftreply_shared::MemoryAccountStore;

    #[tokio::test]
    async fn exact_match_wins() {
        let store = Arc::new(MemoryAccountStore::new());
        let mut owner = swiftreply_shared::TenantAccount::new("owner@example.com");
        owner.channel_phone = Some("15559990000".to_string());
        let owner = store.insert_account(owner).await.unwrap();
        store
            .insert_account(swiftreply_shared::TenantAccount::new("other@example.com"))
            .await
            .unwrap();

        let resolver = TenantResolver::new(store);
        let resolved = resolver.resolve("15559990000").await.unwrap().unwrap();
        assert_eq!(resolved.id, owner.id);
    }

    #[tokio::test]
    async fn unmatched_destination_falls_back_to_active() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = store
            .insert_account(swiftreply_shared::TenantAccount::new("only@example.com"))
            .await
            .unwrap();

        let resolver = TenantResolver::new(store);
        let resolved = resolver.resolve("19998887777").await.unwrap().unwrap();
        assert_eq!(resolved.id, account.id);
    }

    #[tokio::test]
    async fn no_active_account_resolves_to_none() {
        let store = Arc::new(MemoryAccountStore::new());
        let account = store
            .insert_account(swiftreply_shared::TenantAccount::new("gone@example.com"))
            .await
            .unwrap();
        store.deactivate(account.id).await.unwrap();

        let resolver = TenantResolver::new(store);
        assert!(resolver.resolve("15550000000").await.unwrap().is_none());
    }
}
