use std::time::Duration;

use log::warn;

use crate::batch::{ttl_millis, BatchWriteResult, BatchedExpiringWriter};
use crate::cmd::SetOptions;
use crate::config::{CacheConfig, FlushPolicy};
use crate::errors::{StoreError, StoreResult};
use crate::executor::ScriptedOperationExecutor;
use crate::routing::{RoutingStrategy, Topology};
use crate::script::ScriptRegistry;
use crate::store::{StoreClient, StoreCommands};
use crate::types::{FromStoreValue, ToStoreArgs, Value};

/// A key-value cache on top of a store, plus the scripted counters.
///
/// Time to live values are [`Duration`]s with millisecond precision;
/// `Duration::ZERO` means the entry never expires.
///
/// ```rust,no_run
/// # fn run<C: rcache::StoreClient>(client: C) -> rcache::StoreResult<()> {
/// use std::time::Duration;
///
/// let mut cache = rcache::Cache::new(client);
/// cache.set("greeting", "hello", Duration::from_secs(60))?;
/// let hits: i64 = cache.execute_atomic_operation_as("incr", "hits", 3600)?;
/// # let _ = hits;
/// # Ok(())
/// # }
/// ```
pub struct Cache<C> {
    client: C,
    registry: ScriptRegistry,
    routing: RoutingStrategy,
    writer: BatchedExpiringWriter,
    flush_policy: FlushPolicy,
}

impl<C: StoreClient> Cache<C> {
    /// Creates a cache with the default configuration.
    pub fn new(client: C) -> Self {
        Self::with_config(client, CacheConfig::default())
    }

    /// Creates a cache with the given configuration.
    pub fn with_config(client: C, config: CacheConfig) -> Self {
        let mut registry = ScriptRegistry::new();
        for script in config.scripts {
            registry.register(script);
        }
        Cache {
            client,
            registry,
            routing: RoutingStrategy::new(config.topology),
            writer: BatchedExpiringWriter::new(),
            flush_policy: config.flush_policy,
        }
    }

    /// Returns the value stored at `key`.
    pub fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.client.get(key)
    }

    /// Returns the values stored at `keys`, in order.
    pub fn mget(&mut self, keys: &[&str]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        self.client.mget(keys)
    }

    /// Stores `value` at `key`, replacing whatever was there.
    pub fn set<V: AsRef<[u8]>>(&mut self, key: &str, value: V, ttl: Duration) -> StoreResult<bool> {
        let options = expiring(SetOptions::new(), ttl);
        self.client.set(key, value.as_ref(), options)
    }

    /// Stores `value` at `key` only if the key does not exist yet.  Returns
    /// false, without touching the existing value, otherwise.
    pub fn add<V: AsRef<[u8]>>(&mut self, key: &str, value: V, ttl: Duration) -> StoreResult<bool> {
        let options = expiring(SetOptions::new().only_if_absent(), ttl);
        self.client.set(key, value.as_ref(), options)
    }

    /// Stores several entries atomically.  See [`BatchedExpiringWriter`].
    pub fn mset<I, K, V>(&mut self, entries: I, ttl: Duration) -> StoreResult<BatchWriteResult>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        self.writer.write_with_expiry(&mut self.client, entries, ttl)
    }

    /// Adds several entries one by one.  The result lists the keys that were
    /// not added: keys that already existed, which are left untouched, and
    /// keys whose write failed.
    ///
    /// The writes are independent, so a store failure on one key does not
    /// stop the others and keys added before it stay written.  Only errors
    /// for which [`StoreError::is_fatal`] holds abort the call.
    pub fn madd<I, K, V>(&mut self, entries: I, ttl: Duration) -> StoreResult<BatchWriteResult>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let mut skipped = vec![];
        for (key, value) in entries {
            let key = key.into();
            match self.add(&key, value, ttl) {
                Ok(true) => {}
                Ok(false) => skipped.push(key),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("madd: adding `{key}` failed: {err}");
                    skipped.push(key);
                }
            }
        }
        Ok(skipped.into_iter().collect())
    }

    /// Deletes `key`.  Returns true if something was removed.
    pub fn delete(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.client.del(key)? > 0)
    }

    /// Returns true if `key` exists.
    pub fn exists(&mut self, key: &str) -> StoreResult<bool> {
        self.client.exists(key)
    }

    /// Removes every key from the store.
    ///
    /// Be careful when the store is shared with other applications.  With
    /// [`FlushPolicy::Never`] nothing is removed and `true` is returned.
    pub fn flush(&mut self) -> StoreResult<bool> {
        match self.flush_policy {
            FlushPolicy::Allow => self.client.flush_all(),
            FlushPolicy::Never => {
                warn!("flush: refusing to flush a shared store");
                Ok(true)
            }
        }
    }

    /// Runs a registered script.  See [`ScriptedOperationExecutor::execute`].
    pub fn execute_atomic_operation<K, A>(&mut self, name: &str, keys: K, args: A) -> StoreResult<Value>
    where
        K: ToStoreArgs,
        A: ToStoreArgs,
    {
        ScriptedOperationExecutor::new(&self.registry, &self.routing).execute(
            &mut self.client,
            name,
            keys,
            args,
        )
    }

    /// Runs a registered script and converts the reply.
    pub fn execute_atomic_operation_as<T, K, A>(&mut self, name: &str, keys: K, args: A) -> StoreResult<T>
    where
        T: FromStoreValue,
        K: ToStoreArgs,
        A: ToStoreArgs,
    {
        ScriptedOperationExecutor::new(&self.registry, &self.routing).execute_as(
            &mut self.client,
            name,
            keys,
            args,
        )
    }

    /// Returns the script registry.
    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    /// Returns the script registry for late registrations.
    pub fn registry_mut(&mut self) -> &mut ScriptRegistry {
        &mut self.registry
    }

    /// Returns the deployment the cache was configured for.
    pub fn topology(&self) -> &Topology {
        self.routing.topology()
    }

    /// Returns the underlying client.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Consumes the cache, returning the underlying client.
    pub fn into_inner(self) -> C {
        self.client
    }
}

fn expiring(options: SetOptions, ttl: Duration) -> SetOptions {
    if ttl.is_zero() {
        options
    } else {
        options.expire_millis(ttl_millis(ttl))
    }
}
