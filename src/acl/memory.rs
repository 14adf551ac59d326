//! In-memory ACL store.
//!
//! One readers-writer lock guards all nested maps; critical sections are
//! short and never perform I/O. Suitable for local development and tests.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;

use super::{validate_grant_args, AclError, Store, Visibility};

/// In-memory [`Store`] implementation.
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    // tenant -> doc -> visibility (restricted entries only)
    visibility: HashMap<String, HashMap<String, Visibility>>,
    // tenant -> doc -> users
    permanent: HashMap<String, HashMap<String, HashSet<String>>>,
    // tenant -> doc -> user -> valid_to
    expiring: HashMap<String, HashMap<String, HashMap<String, SystemTime>>>,
}

/// Point-in-time counters over the store's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub tenants: usize,
    pub visibility_docs: usize,
    pub permanent_doc_edges: usize,
    pub expiring_doc_edges: usize,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryInner::default()),
        }
    }

    /// Count tenants, visibility entries, and grant edges.
    pub fn stats(&self) -> MemoryStats {
        let inner = self.inner.read().unwrap();
        MemoryStats {
            tenants: inner.visibility.len(),
            visibility_docs: inner.visibility.values().map(|docs| docs.len()).sum(),
            permanent_doc_edges: inner
                .permanent
                .values()
                .flat_map(|docs| docs.values())
                .map(|users| users.len())
                .sum(),
            expiring_doc_edges: inner
                .expiring
                .values()
                .flat_map(|docs| docs.values())
                .map(|users| users.len())
                .sum(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set_visibility(
        &self,
        tenant_id: &str,
        doc_id: &str,
        visibility: Visibility,
    ) -> Result<(), AclError> {
        if tenant_id.is_empty() || doc_id.is_empty() {
            return Err(AclError::MissingField("tenant_id/doc_id"));
        }

        let mut inner = self.inner.write().unwrap();
        match visibility {
            // Public is the default; keep no entry for it.
            Visibility::Public => {
                if let Some(docs) = inner.visibility.get_mut(tenant_id) {
                    docs.remove(doc_id);
                    if docs.is_empty() {
                        inner.visibility.remove(tenant_id);
                    }
                }
            }
            Visibility::Restricted => {
                inner
                    .visibility
                    .entry(tenant_id.to_string())
                    .or_default()
                    .insert(doc_id.to_string(), visibility);
            }
        }
        Ok(())
    }

    async fn grant(
        &self,
        tenant_id: &str,
        doc_id: &str,
        user_id: &str,
        valid_from: SystemTime,
        valid_to: Option<SystemTime>,
    ) -> Result<(), AclError> {
        validate_grant_args(tenant_id, doc_id, user_id, valid_from, valid_to)?;

        let mut inner = self.inner.write().unwrap();
        match valid_to {
            None => {
                inner
                    .permanent
                    .entry(tenant_id.to_string())
                    .or_default()
                    .entry(doc_id.to_string())
                    .or_default()
                    .insert(user_id.to_string());
                remove_timed_edge(&mut inner.expiring, tenant_id, doc_id, user_id);
            }
            Some(valid_to) => {
                inner
                    .expiring
                    .entry(tenant_id.to_string())
                    .or_default()
                    .entry(doc_id.to_string())
                    .or_default()
                    .insert(user_id.to_string(), valid_to);
                remove_set_edge(&mut inner.permanent, tenant_id, doc_id, user_id);
            }
        }
        Ok(())
    }

    async fn revoke(&self, tenant_id: &str, doc_id: &str, user_id: &str) -> Result<(), AclError> {
        if tenant_id.is_empty() || doc_id.is_empty() || user_id.is_empty() {
            return Err(AclError::MissingField("tenant_id/doc_id/user_id"));
        }

        let mut inner = self.inner.write().unwrap();
        remove_set_edge(&mut inner.permanent, tenant_id, doc_id, user_id);
        remove_timed_edge(&mut inner.expiring, tenant_id, doc_id, user_id);
        Ok(())
    }

    async fn revoke_all_user(&self, tenant_id: &str, user_id: &str) -> Result<(), AclError> {
        if tenant_id.is_empty() || user_id.is_empty() {
            return Err(AclError::MissingField("tenant_id/user_id"));
        }

        let mut inner = self.inner.write().unwrap();

        if let Some(docs) = inner.permanent.get_mut(tenant_id) {
            docs.retain(|_, users| {
                users.remove(user_id);
                !users.is_empty()
            });
            if docs.is_empty() {
                inner.permanent.remove(tenant_id);
            }
        }
        if let Some(docs) = inner.expiring.get_mut(tenant_id) {
            docs.retain(|_, users| {
                users.remove(user_id);
                !users.is_empty()
            });
            if docs.is_empty() {
                inner.expiring.remove(tenant_id);
            }
        }
        Ok(())
    }

    async fn check_batch(
        &self,
        tenant_id: &str,
        user_id: &str,
        doc_ids: &[String],
        now: SystemTime,
    ) -> Result<Vec<String>, AclError> {
        if tenant_id.is_empty() || user_id.is_empty() {
            return Err(AclError::MissingField("tenant_id/user_id"));
        }

        let inner = self.inner.read().unwrap();
        let mut allowed = Vec::with_capacity(doc_ids.len());

        for doc_id in doc_ids {
            if doc_id.is_empty() {
                continue;
            }
            let restricted = inner
                .visibility
                .get(tenant_id)
                .and_then(|docs| docs.get(doc_id))
                .is_some_and(|v| *v == Visibility::Restricted);
            if !restricted {
                allowed.push(doc_id.clone());
                continue;
            }
            let has_permanent = inner
                .permanent
                .get(tenant_id)
                .and_then(|docs| docs.get(doc_id))
                .is_some_and(|users| users.contains(user_id));
            if has_permanent {
                allowed.push(doc_id.clone());
                continue;
            }
            let has_unexpired = inner
                .expiring
                .get(tenant_id)
                .and_then(|docs| docs.get(doc_id))
                .and_then(|users| users.get(user_id))
                .is_some_and(|valid_to| *valid_to > now);
            if has_unexpired {
                allowed.push(doc_id.clone());
            }
        }
        Ok(allowed)
    }

    async fn list_grants(
        &self,
        tenant_id: &str,
        user_id: &str,
        now: SystemTime,
    ) -> Result<Vec<String>, AclError> {
        if tenant_id.is_empty() || user_id.is_empty() {
            return Err(AclError::MissingField("tenant_id/user_id"));
        }

        let inner = self.inner.read().unwrap();
        let mut seen = HashSet::new();

        if let Some(docs) = inner.permanent.get(tenant_id) {
            for (doc_id, users) in docs {
                if users.contains(user_id) {
                    seen.insert(doc_id.clone());
                }
            }
        }
        if let Some(docs) = inner.expiring.get(tenant_id) {
            for (doc_id, users) in docs {
                if users.get(user_id).is_some_and(|valid_to| *valid_to > now) {
                    seen.insert(doc_id.clone());
                }
            }
        }
        Ok(seen.into_iter().collect())
    }
}

fn remove_set_edge(
    index: &mut HashMap<String, HashMap<String, HashSet<String>>>,
    tenant_id: &str,
    doc_id: &str,
    user_id: &str,
) {
    if let Some(docs) = index.get_mut(tenant_id) {
        if let Some(users) = docs.get_mut(doc_id) {
            users.remove(user_id);
            if users.is_empty() {
                docs.remove(doc_id);
            }
        }
        if docs.is_empty() {
            index.remove(tenant_id);
        }
    }
}

fn remove_timed_edge(
    index: &mut HashMap<String, HashMap<String, HashMap<String, SystemTime>>>,
    tenant_id: &str,
    doc_id: &str,
    user_id: &str,
) {
    if let Some(docs) = index.get_mut(tenant_id) {
        if let Some(users) = docs.get_mut(doc_id) {
            users.remove(user_id);
            if users.is_empty() {
                docs.remove(doc_id);
            }
        }
        if docs.is_empty() {
            index.remove(tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    const TENANT: &str = "tenant-1";
    const DOC: &str = "doc-1";
    const USER: &str = "user-1";

    fn base_time() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn ids(docs: &[&str]) -> Vec<String> {
        docs.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_default_public_allows_without_any_entry() {
        let store = MemoryStore::new();
        let allowed = store
            .check_batch(TENANT, USER, &ids(&[DOC]), base_time())
            .await
            .unwrap();
        assert_eq!(allowed, ids(&[DOC]));
    }

    #[tokio::test]
    async fn test_restricted_requires_grant_and_revoke_works() {
        let store = MemoryStore::new();
        store
            .set_visibility(TENANT, DOC, Visibility::Restricted)
            .await
            .unwrap();

        let now = base_time();
        let allowed = store.check_batch(TENANT, USER, &ids(&[DOC]), now).await.unwrap();
        assert!(allowed.is_empty());

        store.grant(TENANT, DOC, USER, now, None).await.unwrap();
        let allowed = store.check_batch(TENANT, USER, &ids(&[DOC]), now).await.unwrap();
        assert_eq!(allowed, ids(&[DOC]));

        store.revoke(TENANT, DOC, USER).await.unwrap();
        let allowed = store.check_batch(TENANT, USER, &ids(&[DOC]), now).await.unwrap();
        assert!(allowed.is_empty());
    }

    #[tokio::test]
    async fn test_expiring_grant_respects_now() {
        let store = MemoryStore::new();
        store
            .set_visibility(TENANT, DOC, Visibility::Restricted)
            .await
            .unwrap();

        let base = base_time();
        let valid_to = base + Duration::from_secs(600);
        store
            .grant(TENANT, DOC, USER, base, Some(valid_to))
            .await
            .unwrap();

        let mid = base + Duration::from_secs(300);
        let allowed = store.check_batch(TENANT, USER, &ids(&[DOC]), mid).await.unwrap();
        assert_eq!(allowed, ids(&[DOC]));

        let late = base + Duration::from_secs(660);
        let allowed = store.check_batch(TENANT, USER, &ids(&[DOC]), late).await.unwrap();
        assert!(allowed.is_empty());

        assert_eq!(store.list_grants(TENANT, USER, mid).await.unwrap(), ids(&[DOC]));
        assert!(store.list_grants(TENANT, USER, late).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_rejects_inverted_window() {
        let store = MemoryStore::new();
        let base = base_time();
        let result = store
            .grant(TENANT, DOC, USER, base, Some(base - Duration::from_secs(1)))
            .await;
        assert!(matches!(result, Err(AclError::InvalidValidity)));
    }

    #[tokio::test]
    async fn test_grant_forms_are_mutually_exclusive() {
        let store = MemoryStore::new();
        store
            .set_visibility(TENANT, DOC, Visibility::Restricted)
            .await
            .unwrap();
        let base = base_time();

        // Permanent, then downgraded to expiring: access ends at valid_to.
        store.grant(TENANT, DOC, USER, base, None).await.unwrap();
        store
            .grant(TENANT, DOC, USER, base, Some(base + Duration::from_secs(60)))
            .await
            .unwrap();
        let after = base + Duration::from_secs(120);
        assert!(store
            .check_batch(TENANT, USER, &ids(&[DOC]), after)
            .await
            .unwrap()
            .is_empty());

        // Upgraded back to permanent: no expiry applies.
        store.grant(TENANT, DOC, USER, base, None).await.unwrap();
        assert_eq!(
            store.check_batch(TENANT, USER, &ids(&[DOC]), after).await.unwrap(),
            ids(&[DOC])
        );
        assert_eq!(store.stats().expiring_doc_edges, 0);
    }

    #[tokio::test]
    async fn test_check_batch_preserves_order_and_skips_empty() {
        let store = MemoryStore::new();
        store
            .set_visibility(TENANT, "doc-b", Visibility::Restricted)
            .await
            .unwrap();

        let docs = ids(&["doc-a", "", "doc-b", "doc-c"]);
        let allowed = store
            .check_batch(TENANT, USER, &docs, base_time())
            .await
            .unwrap();
        assert_eq!(allowed, ids(&["doc-a", "doc-c"]));
    }

    #[tokio::test]
    async fn test_revoke_all_user_cleans_every_container() {
        let store = MemoryStore::new();
        let base = base_time();

        store.grant(TENANT, "doc-a", USER, base, None).await.unwrap();
        store
            .grant(TENANT, "doc-b", USER, base, Some(base + Duration::from_secs(600)))
            .await
            .unwrap();
        store.grant(TENANT, "doc-a", "user-2", base, None).await.unwrap();

        store.revoke_all_user(TENANT, USER).await.unwrap();

        assert!(store.list_grants(TENANT, USER, base).await.unwrap().is_empty());
        // user-2's edge survives; every container emptied by the revoke is
        // gone.
        let stats = store.stats();
        assert_eq!(stats.permanent_doc_edges, 1);
        assert_eq!(stats.expiring_doc_edges, 0);
    }

    #[tokio::test]
    async fn test_set_public_erases_entry() {
        let store = MemoryStore::new();
        store
            .set_visibility(TENANT, DOC, Visibility::Restricted)
            .await
            .unwrap();
        assert_eq!(store.stats().visibility_docs, 1);

        store
            .set_visibility(TENANT, DOC, Visibility::Public)
            .await
            .unwrap();
        let stats = store.stats();
        assert_eq!(stats.visibility_docs, 0);
        assert_eq!(stats.tenants, 0);

        let allowed = store
            .check_batch(TENANT, USER, &ids(&[DOC]), base_time())
            .await
            .unwrap();
        assert_eq!(allowed, ids(&[DOC]));
    }

    #[tokio::test]
    async fn test_list_grants_is_unique() {
        let store = MemoryStore::new();
        let base = base_time();
        store.grant(TENANT, DOC, USER, base, None).await.unwrap();
        store.grant(TENANT, "doc-2", USER, base, Some(base + Duration::from_secs(60))).await.unwrap();

        let mut grants = store.list_grants(TENANT, USER, base).await.unwrap();
        grants.sort();
        assert_eq!(grants, ids(&[DOC, "doc-2"]));
    }
}
