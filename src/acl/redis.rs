//! Redis-backed ACL store.
//!
//! Key layout per `(tenant, doc)` / `(tenant, user)`:
//!
//! ```text
//! {prefix}t:{tenant}:doc:{doc}:vis    string   "restricted" (absent = public)
//! {prefix}t:{tenant}:doc:{doc}:perm   set      users with permanent grants
//! {prefix}t:{tenant}:doc:{doc}:exp    zset     user scored by valid_to epoch secs
//! {prefix}t:{tenant}:u:{user}:perm    set      reverse index of docs
//! {prefix}t:{tenant}:u:{user}:exp     zset     reverse index of docs
//! ```
//!
//! Forward and reverse indexes are written together in one pipeline.
//! Emptied containers are deleted by server-side scripts (remove member,
//! delete if empty) so concurrent writers cannot resurrect a dangling key.

use std::time::SystemTime;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{epoch_secs, validate_grant_args, AclError, Store, Visibility};

const DEFAULT_KEY_PREFIX: &str = "acl:";

const SREM_DEL_IF_EMPTY: &str = r#"
redis.call('SREM', KEYS[1], ARGV[1])
if redis.call('SCARD', KEYS[1]) == 0 then redis.call('DEL', KEYS[1]) end
return 1
"#;

const ZREM_DEL_IF_EMPTY: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
if redis.call('ZCARD', KEYS[1]) == 0 then redis.call('DEL', KEYS[1]) end
return 1
"#;

/// Redis-backed [`Store`] implementation.
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
}

impl From<redis::RedisError> for AclError {
    fn from(err: redis::RedisError) -> Self {
        AclError::Backend(Box::new(err))
    }
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379`) with automatic
    /// reconnects. An empty `key_prefix` falls back to `"acl:"`.
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, AclError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, key_prefix))
    }

    /// Wrap an existing managed connection.
    pub fn new(conn: ConnectionManager, key_prefix: &str) -> Self {
        let prefix = if key_prefix.is_empty() {
            DEFAULT_KEY_PREFIX.to_string()
        } else {
            key_prefix.to_string()
        };
        Self { conn, prefix }
    }

    /// The configured key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// A clone of the underlying managed connection, for callers that need
    /// raw access (stats, test cleanup).
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    fn key_visibility(&self, tenant_id: &str, doc_id: &str) -> String {
        key_visibility(&self.prefix, tenant_id, doc_id)
    }

    fn key_permanent(&self, tenant_id: &str, doc_id: &str) -> String {
        key_permanent(&self.prefix, tenant_id, doc_id)
    }

    fn key_expiring(&self, tenant_id: &str, doc_id: &str) -> String {
        key_expiring(&self.prefix, tenant_id, doc_id)
    }

    fn key_user_permanent(&self, tenant_id: &str, user_id: &str) -> String {
        key_user_permanent(&self.prefix, tenant_id, user_id)
    }

    fn key_user_expiring(&self, tenant_id: &str, user_id: &str) -> String {
        key_user_expiring(&self.prefix, tenant_id, user_id)
    }
}

fn key_visibility(prefix: &str, tenant_id: &str, doc_id: &str) -> String {
    format!("{prefix}t:{tenant_id}:doc:{doc_id}:vis")
}

fn key_permanent(prefix: &str, tenant_id: &str, doc_id: &str) -> String {
    format!("{prefix}t:{tenant_id}:doc:{doc_id}:perm")
}

fn key_expiring(prefix: &str, tenant_id: &str, doc_id: &str) -> String {
    format!("{prefix}t:{tenant_id}:doc:{doc_id}:exp")
}

fn key_user_permanent(prefix: &str, tenant_id: &str, user_id: &str) -> String {
    format!("{prefix}t:{tenant_id}:u:{user_id}:perm")
}

fn key_user_expiring(prefix: &str, tenant_id: &str, user_id: &str) -> String {
    format!("{prefix}t:{tenant_id}:u:{user_id}:exp")
}

fn eval_cleanup(pipe: &mut redis::Pipeline, script: &str, key: &str, member: &str) {
    pipe.cmd("EVAL")
        .arg(script)
        .arg(1)
        .arg(key)
        .arg(member)
        .ignore();
}

#[async_trait]
impl Store for RedisStore {
    async fn set_visibility(
        &self,
        tenant_id: &str,
        doc_id: &str,
        visibility: Visibility,
    ) -> Result<(), AclError> {
        if tenant_id.is_empty() || doc_id.is_empty() {
            return Err(AclError::MissingField("tenant_id/doc_id"));
        }

        let mut conn = self.conn.clone();
        let key = self.key_visibility(tenant_id, doc_id);
        match visibility {
            // Missing key means public by default.
            Visibility::Public => {
                let _: () = conn.del(&key).await?;
            }
            Visibility::Restricted => {
                let _: () = conn.set(&key, visibility.as_str()).await?;
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

        let doc_perm = self.key_permanent(tenant_id, doc_id);
        let doc_exp = self.key_expiring(tenant_id, doc_id);
        let user_perm = self.key_user_permanent(tenant_id, user_id);
        let user_exp = self.key_user_expiring(tenant_id, user_id);

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();

        match valid_to {
            None => {
                pipe.sadd(&doc_perm, user_id).ignore();
                pipe.sadd(&user_perm, doc_id).ignore();
                pipe.zrem(&doc_exp, user_id).ignore();
                pipe.zrem(&user_exp, doc_id).ignore();
            }
            Some(valid_to) => {
                // Prune already-expired members so the zsets do not grow
                // without bound.
                let now_secs = epoch_secs(SystemTime::now());
                pipe.zrembyscore(&doc_exp, "-inf", now_secs).ignore();
                pipe.zrembyscore(&user_exp, "-inf", now_secs).ignore();

                let score = epoch_secs(valid_to);
                pipe.zadd(&doc_exp, user_id, score).ignore();
                pipe.zadd(&user_exp, doc_id, score).ignore();
                pipe.srem(&doc_perm, user_id).ignore();
                pipe.srem(&user_perm, doc_id).ignore();
            }
        }
        let _: () = pipe.query_async(&mut conn).await?;

        // Best-effort cleanup of the opposite grant form's containers.
        let mut cleanup = redis::pipe();
        match valid_to {
            None => {
                eval_cleanup(&mut cleanup, ZREM_DEL_IF_EMPTY, &doc_exp, user_id);
                eval_cleanup(&mut cleanup, ZREM_DEL_IF_EMPTY, &user_exp, doc_id);
            }
            Some(_) => {
                eval_cleanup(&mut cleanup, SREM_DEL_IF_EMPTY, &doc_perm, user_id);
                eval_cleanup(&mut cleanup, SREM_DEL_IF_EMPTY, &user_perm, doc_id);
            }
        }
        if let Err(err) = cleanup.query_async::<()>(&mut conn).await {
            tracing::debug!(error = %err, "acl grant cleanup failed");
        }

        Ok(())
    }

    async fn revoke(&self, tenant_id: &str, doc_id: &str, user_id: &str) -> Result<(), AclError> {
        if tenant_id.is_empty() || doc_id.is_empty() || user_id.is_empty() {
            return Err(AclError::MissingField("tenant_id/doc_id/user_id"));
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        eval_cleanup(
            &mut pipe,
            SREM_DEL_IF_EMPTY,
            &self.key_permanent(tenant_id, doc_id),
            user_id,
        );
        eval_cleanup(
            &mut pipe,
            ZREM_DEL_IF_EMPTY,
            &self.key_expiring(tenant_id, doc_id),
            user_id,
        );
        eval_cleanup(
            &mut pipe,
            SREM_DEL_IF_EMPTY,
            &self.key_user_permanent(tenant_id, user_id),
            doc_id,
        );
        eval_cleanup(
            &mut pipe,
            ZREM_DEL_IF_EMPTY,
            &self.key_user_expiring(tenant_id, user_id),
            doc_id,
        );
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn revoke_all_user(&self, tenant_id: &str, user_id: &str) -> Result<(), AclError> {
        if tenant_id.is_empty() || user_id.is_empty() {
            return Err(AclError::MissingField("tenant_id/user_id"));
        }

        let user_perm = self.key_user_permanent(tenant_id, user_id);
        let user_exp = self.key_user_expiring(tenant_id, user_id);

        let mut conn = self.conn.clone();
        let perm_docs: Vec<String> = conn.smembers(&user_perm).await?;
        let exp_docs: Vec<String> = conn.zrange(&user_exp, 0, -1).await?;

        let mut docs: Vec<&String> = perm_docs.iter().chain(exp_docs.iter()).collect();
        docs.sort();
        docs.dedup();

        let mut pipe = redis::pipe();
        for doc_id in docs {
            if doc_id.is_empty() {
                continue;
            }
            eval_cleanup(
                &mut pipe,
                SREM_DEL_IF_EMPTY,
                &self.key_permanent(tenant_id, doc_id),
                user_id,
            );
            eval_cleanup(
                &mut pipe,
                ZREM_DEL_IF_EMPTY,
                &self.key_expiring(tenant_id, doc_id),
                user_id,
            );
        }
        pipe.del(&[user_perm.as_str(), user_exp.as_str()]).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
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

        let user_perm = self.key_user_permanent(tenant_id, user_id);
        let user_exp = self.key_user_expiring(tenant_id, user_id);

        let filtered: Vec<&String> = doc_ids.iter().filter(|d| !d.is_empty()).collect();
        if filtered.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for doc_id in &filtered {
            pipe.get(self.key_visibility(tenant_id, doc_id));
            pipe.sismember(&user_perm, doc_id.as_str());
            pipe.zscore(&user_exp, doc_id.as_str());
        }

        let mut conn = self.conn.clone();
        let rows: Vec<redis::Value> = pipe.query_async(&mut conn).await?;

        let now_secs = epoch_secs(now);
        let mut allowed = Vec::with_capacity(filtered.len());
        for (doc_id, chunk) in filtered.iter().zip(rows.chunks_exact(3)) {
            let visibility: Option<String> = redis::from_redis_value(&chunk[0])?;
            let restricted = visibility.as_deref() == Some(Visibility::Restricted.as_str());
            if !restricted {
                allowed.push((*doc_id).clone());
                continue;
            }

            let permanent: bool = redis::from_redis_value(&chunk[1])?;
            if permanent {
                allowed.push((*doc_id).clone());
                continue;
            }

            let valid_to: Option<f64> = redis::from_redis_value(&chunk[2])?;
            if valid_to.is_some_and(|valid_to| (now_secs as f64) < valid_to) {
                allowed.push((*doc_id).clone());
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

        let mut conn = self.conn.clone();
        let perm_docs: Vec<String> = conn.smembers(self.key_user_permanent(tenant_id, user_id)).await?;

        // Strictly greater than now: a grant expiring exactly at `now` is
        // already gone.
        let min = format!("({}", epoch_secs(now));
        let exp_docs: Vec<String> = conn
            .zrangebyscore(self.key_user_expiring(tenant_id, user_id), min, "+inf")
            .await?;

        let mut out: Vec<String> = perm_docs
            .into_iter()
            .chain(exp_docs)
            .filter(|d| !d.is_empty())
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(key_visibility("test:", "t1", "d1"), "test:t:t1:doc:d1:vis");
        assert_eq!(key_permanent("test:", "t1", "d1"), "test:t:t1:doc:d1:perm");
        assert_eq!(key_expiring("test:", "t1", "d1"), "test:t:t1:doc:d1:exp");
        assert_eq!(key_user_permanent("test:", "t1", "u1"), "test:t:t1:u:u1:perm");
        assert_eq!(key_user_expiring("test:", "t1", "u1"), "test:t:t1:u:u1:exp");
    }

    #[test]
    fn test_cleanup_scripts_reference_single_key() {
        for script in [SREM_DEL_IF_EMPTY, ZREM_DEL_IF_EMPTY] {
            assert!(script.contains("KEYS[1]"));
            assert!(script.contains("ARGV[1]"));
            assert!(!script.contains("KEYS[2]"));
        }
    }
}
