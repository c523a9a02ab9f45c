//! Pluggable TTL key/value storage backing sessions, PAR state, DPoP nonces,
//! and the persisted DPoP keypair.
//!
//! Grounded in `jacquard_common::session::SessionStore`'s trait shape, extended
//! with TTL, multi-key batch operations and advisory locking, none of which
//! the simpler session store needs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Errors emitted by a [`Storage`] backend.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    #[diagnostic(code(jacquard_oauth::storage::backend))]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("lock {0} is already held")]
    #[diagnostic(code(jacquard_oauth::storage::lock_contended))]
    LockContended(String),

    #[error("serialization error: {0}")]
    #[diagnostic(code(jacquard_oauth::storage::serde))]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Pluggable TTL-based key/value storage.
///
/// Keys are opaque strings; callers namespace them (e.g. `atproto:session:<id>`,
/// `atproto:state:<state>`, `atproto:nonce:<origin>`, `atproto:dpop:<client_id>`).
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl` if given.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Fetch the value stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove the value stored under `key`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check for the presence of `key` without fetching its value.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Batch fetch; missing keys are omitted from the result map.
    async fn multi_get(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                out.insert((*key).to_string(), value);
            }
        }
        Ok(out)
    }

    /// Batch set, all sharing the same TTL.
    async fn multi_set(&self, entries: &[(&str, Vec<u8>)], ttl: Option<Duration>) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value.clone(), ttl).await?;
        }
        Ok(())
    }

    /// Acquire an advisory lock under `namespace:id`, returning a token that
    /// must be presented to [`Storage::release_lock`]. Fails if already held.
    async fn acquire_lock(&self, namespace: &str, id: &str, ttl: Duration) -> Result<String>;

    /// Release a lock previously acquired with [`Storage::acquire_lock`].
    async fn release_lock(&self, namespace: &str, id: &str, token: &str) -> Result<()>;
}

/// Run `f` while holding the named lock, releasing it afterwards regardless of outcome.
pub async fn with_lock<S, F, Fut, T>(
    storage: &S,
    namespace: &str,
    id: &str,
    ttl: Duration,
    f: F,
) -> Result<T>
where
    S: Storage + ?Sized,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let token = storage.acquire_lock(namespace, id, ttl).await?;
    let result = f().await;
    storage.release_lock(namespace, id, &token).await?;
    result
}

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<std::time::Instant>,
}

struct LockEntry {
    token: String,
    expires_at: std::time::Instant,
}

/// In-memory [`Storage`] backend; suitable for tests and single-process deployments
/// without crash durability.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
    locks: Arc<Mutex<HashMap<String, LockEntry>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_key(namespace: &str, id: &str) -> String {
        format!("{namespace}:{id}")
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|d| std::time::Instant::now() + d);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) => {
                if entry.expires_at.is_some_and(|t| t <= std::time::Instant::now()) {
                    entries.remove(key);
                    Ok(None)
                } else {
                    Ok(Some(entry.value.clone()))
                }
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn acquire_lock(&self, namespace: &str, id: &str, ttl: Duration) -> Result<String> {
        let key = Self::lock_key(namespace, id);
        let mut locks = self.locks.lock().await;
        if let Some(existing) = locks.get(&key) {
            if existing.expires_at > std::time::Instant::now() {
                return Err(StorageError::LockContended(key));
            }
        }
        let token = Uuid::new_v4().to_string();
        locks.insert(
            key,
            LockEntry {
                token: token.clone(),
                expires_at: std::time::Instant::now() + ttl,
            },
        );
        Ok(token)
    }

    async fn release_lock(&self, namespace: &str, id: &str, token: &str) -> Result<()> {
        let key = Self::lock_key(namespace, id);
        let mut locks = self.locks.lock().await;
        if locks.get(&key).is_some_and(|l| l.token == token) {
            locks.remove(&key);
        }
        Ok(())
    }
}

/// Exponential-backoff retry wrapper for flaky backend calls, matching the
/// idiom used by Redis-backed storage implementations elsewhere in the corpus.
pub(crate) async fn with_retries<F, Fut, T, E>(mut attempt: F, max_retries: u32) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = core::result::Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut last_err = None;
    for n in 0..=max_retries {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempt = n, error = %e, "storage operation failed, retrying");
                last_err = Some(e);
                if n < max_retries {
                    tokio::time::sleep(Duration::from_millis(100 * (n as u64 + 1))).await;
                }
            }
        }
    }
    Err(StorageError::Backend(Box::new(last_err.unwrap())))
}

#[cfg(feature = "redis-storage")]
pub mod redis_backend {
    //! Redis-backed [`Storage`], grounded in the key-prefix and retry idiom used
    //! by Redis-backed nonce storage elsewhere in the corpus.
    use super::*;
    use redis::AsyncCommands;

    #[derive(Clone)]
    pub struct RedisStorage {
        client: redis::Client,
        prefix: String,
    }

    impl RedisStorage {
        pub fn new(url: &str, prefix: impl Into<String>) -> core::result::Result<Self, redis::RedisError> {
            Ok(Self {
                client: redis::Client::open(url)?,
                prefix: prefix.into(),
            })
        }

        fn key(&self, key: &str) -> String {
            format!("{}:{}", self.prefix, key)
        }

        fn lock_key(&self, namespace: &str, id: &str) -> String {
            format!("{}:lock:{}:{}", self.prefix, namespace, id)
        }

        async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| StorageError::Backend(Box::new(e)))
        }
    }

    #[async_trait::async_trait]
    impl Storage for RedisStorage {
        async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
            let full_key = self.key(key);
            with_retries(
                || {
                    let mut conn = self.client.get_multiplexed_async_connection();
                    let full_key = full_key.clone();
                    let value = value.clone();
                    async move {
                        let mut conn = conn.await?;
                        match ttl {
                            Some(ttl) => {
                                conn.set_ex::<_, _, ()>(&full_key, value, ttl.as_secs().max(1))
                                    .await
                            }
                            None => conn.set::<_, _, ()>(&full_key, value).await,
                        }
                    }
                },
                3,
            )
            .await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let full_key = self.key(key);
            with_retries(
                || {
                    let conn = self.client.get_multiplexed_async_connection();
                    let full_key = full_key.clone();
                    async move {
                        let mut conn = conn.await?;
                        conn.get::<_, Option<Vec<u8>>>(&full_key).await
                    }
                },
                3,
            )
            .await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            let full_key = self.key(key);
            with_retries(
                || {
                    let conn = self.client.get_multiplexed_async_connection();
                    let full_key = full_key.clone();
                    async move {
                        let mut conn = conn.await?;
                        conn.del::<_, ()>(&full_key).await
                    }
                },
                3,
            )
            .await
        }

        async fn acquire_lock(&self, namespace: &str, id: &str, ttl: Duration) -> Result<String> {
            let key = self.lock_key(namespace, id);
            let token = Uuid::new_v4().to_string();
            let mut conn = self.conn().await?;
            let acquired: bool = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async::<Option<String>>(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(Box::new(e)))?
                .is_some();
            if acquired {
                Ok(token)
            } else {
                Err(StorageError::LockContended(key))
            }
        }

        async fn release_lock(&self, namespace: &str, id: &str, token: &str) -> Result<()> {
            let key = self.lock_key(namespace, id);
            let mut conn = self.conn().await?;
            let held: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| StorageError::Backend(Box::new(e)))?;
            if held.as_deref() == Some(token) {
                conn.del::<_, ()>(&key)
                    .await
                    .map_err(|e| StorageError::Backend(Box::new(e)))?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_roundtrip() {
        let store = MemoryStorage::new();
        store.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expiry() {
        let store = MemoryStorage::new();
        store
            .set("k", b"v".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lock_contention() {
        let store = MemoryStorage::new();
        let token = store
            .acquire_lock("ns", "id", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(store.acquire_lock("ns", "id", Duration::from_secs(5)).await.is_err());
        store.release_lock("ns", "id", &token).await.unwrap();
        assert!(store.acquire_lock("ns", "id", Duration::from_secs(5)).await.is_ok());
    }
}
