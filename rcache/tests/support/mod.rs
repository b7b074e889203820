#![allow(dead_code)]

use rcache::{
    Cache, CacheConfig, ErrorKind, ScriptRegistry, StoreError, Topology,
};
use rcache_test::MemoryStore;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A cache over a fresh single-node memory store.  The returned store shares
/// its data with the one inside the cache.
pub fn memory_cache() -> (Cache<MemoryStore>, MemoryStore) {
    init_logger();
    let store = MemoryStore::new();
    (Cache::new(store.clone()), store)
}

/// A cache over a fresh memory store with `nodes` shards.
pub fn sharded_memory_cache(nodes: usize) -> (Cache<MemoryStore>, MemoryStore) {
    init_logger();
    let store = MemoryStore::sharded(nodes);
    let addresses = (0..nodes).map(|node| format!("127.0.0.1:{}", 7000 + node));
    let config = CacheConfig::new().set_topology(Topology::sharded(addresses));
    (Cache::with_config(store.clone(), config), store)
}

pub fn no_script_error() -> StoreError {
    StoreError::from((
        ErrorKind::ResponseError,
        "An error was signalled by the server",
        "NOSCRIPT No matching script. Please use EVAL.".to_string(),
    ))
}

pub fn source_of(name: &str) -> String {
    ScriptRegistry::new()
        .resolve(name)
        .unwrap()
        .source()
        .to_string()
}

pub fn fingerprint_of(name: &str) -> String {
    ScriptRegistry::new()
        .fingerprint_of(name)
        .unwrap()
        .to_string()
}
