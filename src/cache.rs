//
// Cache read-through layer over a shared Redis-compatible backend.
//
// The cache is best-effort: connection failures and command errors degrade
// to the caller's loader rather than propagating, per the coherence
// rules below. `ConnectionManager` already retries/reconnects under the hood, so
// the degrade path here only has to cover the "redis is entirely absent"
// and "this one command timed out" cases.
//
use std::future::Future;

use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};

use crate::CONFIG;

/// Implemented by every entity the cache read-through layer knows how to
/// serve: a table name, a primary-key-shaped canonical key, and zero or more
/// reference keys that redirect to the canonical one.
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
    /// Attribute names whose values double as reference keys, in the order
    /// they should be probed on a cache miss. Empty for entities with no
    /// secondary lookup (businesses, clients, tokens).
    const REFERENCE_ATTRS: &'static [&'static str] = &[];

    /// The value of this instance's `primary_attr`.
    fn cache_primary_value(&self) -> String;

    /// `(attr_name, value)` pairs for this instance's `REFERENCE_ATTRS`.
    fn cache_reference_values(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn canonical_key(&self) -> String {
        Self::canonical_key_for(&self.cache_primary_value())
    }

    fn reference_keys(&self) -> Vec<String> {
        self.cache_reference_values()
            .into_iter()
            .map(|(attr, value)| format!("ref:{}:{attr}:{value}", Self::TABLE))
            .collect()
    }

    /// `"{table}:{value}"` -- the class-level mirror of `canonical_key`, for
    /// lookups where only the attribute value (not the whole entity) is known.
    fn canonical_key_for(value: &str) -> String {
        format!("{}:{value}", Self::TABLE)
    }

    /// One `"ref:{table}:{attr}:{value}"` per entry in `REFERENCE_ATTRS`, all
    /// keyed by the same raw `value` -- exactly one of them will actually
    /// exist in the cache for any given lookup, the rest simply miss.
    fn reference_keys_for(value: &str) -> Vec<String> {
        Self::REFERENCE_ATTRS.iter().map(|attr| format!("ref:{}:{attr}:{value}", Self::TABLE)).collect()
    }
}

#[derive(Clone)]
pub struct Cache {
    conn: Option<ConnectionManager>,
}

impl Cache {
    /// Connects to `CONFIG.redis_url()`. A failure here does not stop the
    /// process from starting -- it just means every cache op degrades to
    /// its loader for the life of this handle.
    pub async fn from_config() -> Self {
        match redis::Client::open(CONFIG.redis_url()) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    info!("Connected to cache backend");
                    Cache {
                        conn: Some(conn),
                    }
                }
                Err(e) => {
                    warn!("Cache backend unreachable, degrading to direct store reads: {e}");
                    Cache {
                        conn: None,
                    }
                }
            },
            Err(e) => {
                warn!("Invalid cache URL, degrading to direct store reads: {e}");
                Cache {
                    conn: None,
                }
            }
        }
    }

    /// A handle with no backing connection; every operation degrades. Used
    /// by unit tests that only exercise the key-derivation math.
    pub fn disconnected() -> Self {
        Cache {
            conn: None,
        }
    }

    async fn get_string(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone()?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!("cache GET {key} failed, degrading: {e}");
                None
            }
        }
    }

    async fn set_string(&self, key: &str, value: &str, ttl_secs: u64) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            warn!("cache SET {key} failed: {e}");
        }
    }

    async fn del_key(&self, key: &str) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!("cache DEL {key} failed: {e}");
        }
    }

    pub async fn get<T: Cacheable>(&self, canonical_key: &str) -> Option<T> {
        let raw = self.get_string(canonical_key).await?;
        match serde_json::from_str(&raw) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!("cache entry at {canonical_key} failed to deserialize, treating as a miss: {e}");
                None
            }
        }
    }

    /// The read-through operation: canonical key, then each
    /// reference key in turn, then `loader`. A loaded entity is cached
    /// before being returned.
    pub async fn with_cache<T, L, Fut>(&self, lookup_value: &str, loader: L) -> Option<T>
    where
        T: Cacheable,
        L: FnOnce() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let canonical = T::canonical_key_for(lookup_value);
        if let Some(entity) = self.get::<T>(&canonical).await {
            return Some(entity);
        }

        for reference_key in T::reference_keys_for(lookup_value) {
            if let Some(canonical) = self.get_string(&reference_key).await {
                if let Some(entity) = self.get::<T>(&canonical).await {
                    return Some(entity);
                }
            }
        }

        let loaded = loader().await;
        if let Some(ref entity) = loaded {
            self.cache_entity(entity).await;
        }
        loaded
    }

    /// Writes the canonical key and every reference key, all with the same
    /// TTL (default `CONFIG.cache_ttl_secs()`, 1h).
    pub async fn cache_entity<T: Cacheable>(&self, entity: &T) {
        self.cache_entity_ttl(entity, CONFIG.cache_ttl_secs()).await;
    }

    pub async fn cache_entity_ttl<T: Cacheable>(&self, entity: &T, ttl_secs: u64) {
        let Ok(serialized) = serde_json::to_string(entity) else {
            return;
        };
        let canonical = entity.canonical_key();
        self.set_string(&canonical, &serialized, ttl_secs).await;
        for reference_key in entity.reference_keys() {
            self.set_string(&reference_key, &canonical, ttl_secs).await;
        }
    }

    /// Deletes the canonical key and every reference key. Idempotent.
    pub async fn invalidate<T: Cacheable>(&self, entity: &T) {
        self.del_key(&entity.canonical_key()).await;
        for reference_key in entity.reference_keys() {
            self.del_key(&reference_key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        id: i64,
        phone: String,
    }

    impl Serialize for Widget {
        fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            (self.id, &self.phone).serialize(s)
        }
    }
    impl<'de> serde::Deserialize<'de> for Widget {
        fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            let (id, phone) = <(i64, String)>::deserialize(d)?;
            Ok(Widget {
                id,
                phone,
            })
        }
    }

    impl Cacheable for Widget {
        const TABLE: &'static str = "users";
        const REFERENCE_ATTRS: &'static [&'static str] = &["phone"];

        fn cache_primary_value(&self) -> String {
            self.id.to_string()
        }

        fn cache_reference_values(&self) -> Vec<(&'static str, String)> {
            vec![("phone", self.phone.clone())]
        }
    }

    #[test]
    fn derives_canonical_and_reference_keys() {
        let w = Widget {
            id: 7,
            phone: "+15551234567".to_string(),
        };
        assert_eq!(w.canonical_key(), "users:7");
        assert_eq!(w.reference_keys(), vec!["ref:users:phone:+15551234567".to_string()]);
        assert_eq!(Widget::canonical_key_for("7"), "users:7");
        assert_eq!(Widget::reference_keys_for("+15551234567"), vec!["ref:users:phone:+15551234567".to_string()]);
    }

    #[tokio::test]
    async fn disconnected_cache_degrades_to_loader() {
        let cache = Cache::disconnected();
        let loaded = cache
            .with_cache::<Widget, _, _>("7", || async {
                Some(Widget {
                    id: 7,
                    phone: "+15551234567".to_string(),
                })
            })
            .await;
        assert_eq!(loaded.unwrap().id, 7);
    }
}
