use std::collections::{HashMap, HashSet};
use std::io;
use std::str::from_utf8;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::trace;
use rcache::{
    fingerprint, get_slot, Batch, Cmd, ErrorKind, RouteHint, ScriptRegistry, StoreClient,
    StoreError, StoreResult, Value,
};

const SLOT_COUNT: usize = 16384;

type Emulation = fn(&mut Keyspace, &[Vec<u8>], &[Vec<u8>]) -> StoreResult<Value>;

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Clone, Default)]
struct Keyspace {
    entries: HashMap<Vec<u8>, Entry>,
}

impl Keyspace {
    fn live(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.expires_at.map_or(false, |at| at <= Instant::now()),
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.live(key).map(|entry| entry.value.clone())
    }

    fn exists(&mut self, key: &[u8]) -> bool {
        self.live(key).is_some()
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>, expires_at: Option<Instant>) {
        self.entries
            .insert(key.to_vec(), Entry { value, expires_at });
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        self.live(key).is_some() && self.entries.remove(key).is_some()
    }

    fn expire(&mut self, key: &[u8], ttl: Duration) -> bool {
        match self.live(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    fn incr_by(&mut self, key: &[u8], delta: i64) -> StoreResult<i64> {
        let current = match self.live(key) {
            Some(entry) => parse_int(&entry.value)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            StoreError::from((
                ErrorKind::ResponseError,
                "An error was signalled by the server",
                "ERR increment or decrement would overflow".to_string(),
            ))
        })?;
        match self.live(key) {
            Some(entry) => entry.value = next.to_string().into_bytes(),
            None => self.set(key, next.to_string().into_bytes(), None),
        }
        Ok(next)
    }
}

fn parse_int(bytes: &[u8]) -> StoreResult<i64> {
    from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            StoreError::from((
                ErrorKind::ResponseError,
                "An error was signalled by the server",
                "ERR value is not an integer or out of range".to_string(),
            ))
        })
}

fn arg_int(args: &[Vec<u8>], idx: usize) -> StoreResult<i64> {
    match args.get(idx) {
        Some(arg) => parse_int(arg),
        None => Err(StoreError::from((
            ErrorKind::ResponseError,
            "An error was signalled by the server",
            format!("ERR missing script argument ARGV[{}]", idx + 1),
        ))),
    }
}

fn expire_secs(keyspace: &mut Keyspace, key: &[u8], secs: i64) {
    if secs <= 0 {
        keyspace.remove(key);
    } else {
        keyspace.expire(key, Duration::from_secs(secs as u64));
    }
}

fn incr(keyspace: &mut Keyspace, keys: &[Vec<u8>], args: &[Vec<u8>]) -> StoreResult<Value> {
    let count = keyspace.incr_by(&keys[0], 1)?;
    if count == 1 {
        expire_secs(keyspace, &keys[0], arg_int(args, 0)?);
    }
    Ok(Value::Int(count))
}

fn incr_reset(keyspace: &mut Keyspace, keys: &[Vec<u8>], args: &[Vec<u8>]) -> StoreResult<Value> {
    let count = keyspace.incr_by(&keys[0], 1)?;
    if count == 1 {
        expire_secs(keyspace, &keys[0], arg_int(args, 1)?);
    }
    if count > arg_int(args, 0)? {
        // a plain SET also drops the expiry
        keyspace.set(&keys[0], b"0".to_vec(), None);
        return Ok(Value::Int(0));
    }
    Ok(Value::Int(count))
}

fn incr_max(keyspace: &mut Keyspace, keys: &[Vec<u8>], args: &[Vec<u8>]) -> StoreResult<Value> {
    let max = arg_int(args, 0)?;
    let current = match keyspace.get(&keys[0]) {
        Some(value) => Some(parse_int(&value)?),
        None => None,
    };
    match current {
        Some(current) if current >= max => Ok(Value::Array(vec![Value::Int(0), Value::Int(current)])),
        _ => {
            let count = keyspace.incr_by(&keys[0], 1)?;
            if count == 1 {
                expire_secs(keyspace, &keys[0], arg_int(args, 1)?);
            }
            Ok(Value::Array(vec![Value::Int(1), Value::Int(count)]))
        }
    }
}

fn decr_exist(keyspace: &mut Keyspace, keys: &[Vec<u8>], _args: &[Vec<u8>]) -> StoreResult<Value> {
    if keyspace.exists(&keys[0]) {
        Ok(Value::Int(keyspace.incr_by(&keys[0], -1)?))
    } else {
        Ok(Value::Int(0))
    }
}

fn builtin_emulations() -> HashMap<String, Emulation> {
    let registry = ScriptRegistry::new();
    let mut emulations: HashMap<String, Emulation> = HashMap::new();
    for (name, emulation) in [
        ("incr", incr as Emulation),
        ("incr_reset", incr_reset as Emulation),
        ("incr_max", incr_max as Emulation),
        ("decr_exist", decr_exist as Emulation),
    ] {
        if let Ok(fingerprint) = registry.fingerprint_of(name) {
            emulations.insert(fingerprint.to_string(), emulation);
        }
    }
    emulations
}

struct State {
    keyspace: Keyspace,
    // one script cache per node
    script_caches: Vec<HashSet<String>>,
    emulations: HashMap<String, Emulation>,
    failing_expiry: HashSet<Vec<u8>>,
    load_overrides: HashMap<String, String>,
    unreachable: bool,
    received: Vec<&'static str>,
}

impl State {
    fn node_for(&self, key: &[u8]) -> usize {
        usize::from(get_slot(key)) * self.script_caches.len() / SLOT_COUNT
    }

    fn node_for_route(&self, route: &RouteHint) -> usize {
        match route {
            RouteHint::Any => 0,
            RouteHint::Key(key) => self.node_for(key),
        }
    }

    fn apply(&mut self, cmd: &Cmd) -> StoreResult<Value> {
        self.received.push(cmd.name());
        trace!("memory store: {cmd:?}");
        match cmd {
            Cmd::Get { key } => Ok(self
                .keyspace
                .get(key)
                .map_or(Value::Nil, Value::BulkString)),
            Cmd::MGet { keys } => Ok(Value::Array(
                keys.iter()
                    .map(|key| self.keyspace.get(key).map_or(Value::Nil, Value::BulkString))
                    .collect(),
            )),
            Cmd::Set {
                key,
                value,
                options,
            } => {
                if options.is_only_if_absent() && self.keyspace.exists(key) {
                    return Ok(Value::Nil);
                }
                let expires_at = options
                    .expiry_millis()
                    .map(|millis| Instant::now() + Duration::from_millis(millis));
                self.keyspace.set(key, value.clone(), expires_at);
                Ok(Value::Okay)
            }
            Cmd::MSet { entries } => {
                for (key, value) in entries {
                    self.keyspace.set(key, value.clone(), None);
                }
                Ok(Value::Okay)
            }
            Cmd::Del { key } => Ok(Value::Int(self.keyspace.remove(key) as i64)),
            Cmd::Exists { key } => Ok(Value::Int(self.keyspace.exists(key) as i64)),
            Cmd::PExpire { key, millis } => {
                if self.failing_expiry.contains(key) {
                    return Ok(Value::Int(0));
                }
                let applied = if *millis == 0 {
                    self.keyspace.remove(key)
                } else {
                    self.keyspace.expire(key, Duration::from_millis(*millis))
                };
                Ok(Value::Int(applied as i64))
            }
            Cmd::EvalSha {
                fingerprint,
                args,
                key_count,
            } => self.eval_sha(fingerprint, args, *key_count),
            Cmd::ScriptLoad { source, route } => {
                let computed = fingerprint(source);
                let node = self.node_for_route(route);
                self.script_caches[node].insert(computed.clone());
                let echoed = self
                    .load_overrides
                    .get(&computed)
                    .cloned()
                    .unwrap_or(computed);
                Ok(Value::BulkString(echoed.into_bytes()))
            }
            Cmd::FlushAll => {
                self.keyspace.entries.clear();
                Ok(Value::Okay)
            }
        }
    }

    fn eval_sha(&mut self, sha: &str, args: &[Vec<u8>], key_count: usize) -> StoreResult<Value> {
        if key_count > args.len() {
            return Err(StoreError::from((
                ErrorKind::ResponseError,
                "An error was signalled by the server",
                "ERR Number of keys can't be greater than number of args".to_string(),
            )));
        }
        let (keys, argv) = args.split_at(key_count);
        let node = keys.first().map_or(0, |key| self.node_for(key));
        if !self.script_caches[node].contains(sha) {
            return Err(StoreError::from((
                ErrorKind::NoScript,
                "An error was signalled by the server",
                "NOSCRIPT No matching script. Please use EVAL.".to_string(),
            )));
        }
        match self.emulations.get(sha) {
            Some(emulation) if !keys.is_empty() => emulation(&mut self.keyspace, keys, argv),
            _ => Err(StoreError::from((
                ErrorKind::ResponseError,
                "An error was signalled by the server",
                format!("ERR script {sha} cannot be run by the memory store"),
            ))),
        }
    }
}

/// An in-memory store implementing [`StoreClient`].
///
/// It knows the built-in scripts of [`ScriptRegistry::new`] by fingerprint and
/// runs native versions of them.  Each node has its own script cache, which
/// starts out empty, so the first call of every script sees `NOSCRIPT`.
///
/// Clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Creates a single-node store.
    pub fn new() -> MemoryStore {
        MemoryStore::sharded(1)
    }

    /// Creates a store whose script caches are split over `nodes` shards.
    /// Shards own equal slot ranges, in order.
    pub fn sharded(nodes: usize) -> MemoryStore {
        MemoryStore {
            state: Arc::new(Mutex::new(State {
                keyspace: Keyspace::default(),
                script_caches: vec![HashSet::new(); nodes.max(1)],
                emulations: builtin_emulations(),
                failing_expiry: HashSet::new(),
                load_overrides: HashMap::new(),
                unreachable: false,
                received: vec![],
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Drops every cached script on every node, like `SCRIPT FLUSH`.
    pub fn flush_script_cache(&self) {
        for cache in &mut self.state().script_caches {
            cache.clear();
        }
    }

    /// Returns the nodes that have the script with this fingerprint cached.
    pub fn nodes_with_script(&self, sha: &str) -> Vec<usize> {
        self.state()
            .script_caches
            .iter()
            .enumerate()
            .filter(|(_, cache)| cache.contains(sha))
            .map(|(node, _)| node)
            .collect()
    }

    /// Returns the node owning `key`.
    pub fn node_for(&self, key: &str) -> usize {
        self.state().node_for(key.as_bytes())
    }

    /// Makes `PEXPIRE` on `key` report failure from now on.
    pub fn fail_expiry_for(&self, key: &str) {
        self.state().failing_expiry.insert(key.as_bytes().to_vec());
    }

    /// Makes `SCRIPT LOAD` of the script with fingerprint `sha` echo
    /// `echoed` instead, as a store running a different hash would.
    pub fn echo_on_load(&self, sha: &str, echoed: &str) {
        self.state()
            .load_overrides
            .insert(sha.to_string(), echoed.to_string());
    }

    /// Makes every request fail as if the connection was refused.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Returns the raw value of `key`, if it is live.
    pub fn value_of(&self, key: &str) -> Option<Vec<u8>> {
        self.state().keyspace.get(key.as_bytes())
    }

    /// Returns when `key` expires, `None` for missing or persistent keys.
    pub fn expires_at(&self, key: &str) -> Option<Instant> {
        self.state()
            .keyspace
            .live(key.as_bytes())
            .and_then(|entry| entry.expires_at)
    }

    /// Returns the remaining time to live of `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.expires_at(key)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Counts received commands by name, e.g. `"SCRIPT LOAD"`.  Commands
    /// sent inside a batch are counted individually.
    pub fn count(&self, name: &str) -> usize {
        self.state()
            .received
            .iter()
            .filter(|received| **received == name)
            .count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

fn connection_refused() -> StoreError {
    StoreError::from(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "memory store is unreachable",
    ))
}

impl StoreClient for MemoryStore {
    fn req_command(&mut self, cmd: &Cmd) -> StoreResult<Value> {
        let mut state = self.state();
        if state.unreachable {
            return Err(connection_refused());
        }
        state.apply(cmd)
    }

    fn req_batch(&mut self, batch: &Batch) -> StoreResult<Vec<Value>> {
        let mut state = self.state();
        if state.unreachable {
            return Err(connection_refused());
        }
        let snapshot = state.keyspace.clone();
        let mut results = Vec::with_capacity(batch.len());
        for cmd in batch.commands() {
            match state.apply(cmd) {
                Ok(value) => results.push(value),
                Err(err) => {
                    state.keyspace = snapshot;
                    return Err(StoreError::from((
                        ErrorKind::ExecAbort,
                        "Transaction discarded because of previous errors",
                        err.to_string(),
                    )));
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcache::{SetOptions, StoreCommands};

    #[test]
    fn set_get_and_expiry() {
        let mut store = MemoryStore::new();
        assert!(store.set("a", b"1", SetOptions::new()).unwrap());
        assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.ttl("a"), None);

        assert!(store.pexpire("a", 60_000).unwrap());
        assert!(store.ttl("a").unwrap() <= Duration::from_secs(60));

        assert!(!store
            .set("a", b"2", SetOptions::new().only_if_absent())
            .unwrap());
        assert_eq!(store.value_of("a"), Some(b"1".to_vec()));
    }

    #[test]
    fn expired_keys_disappear() {
        let mut store = MemoryStore::new();
        store
            .set("short", b"1", SetOptions::new().expire_millis(1))
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.get("short").unwrap(), None);
        assert!(!store.exists("short").unwrap());
    }

    #[test]
    fn unknown_script_reports_noscript_until_loaded() {
        let mut store = MemoryStore::new();
        let registry = ScriptRegistry::new();
        let sha = registry.fingerprint_of("incr").unwrap();

        let err = store
            .eval_sha(sha, vec![b"k".to_vec(), b"10".to_vec()], 1)
            .unwrap_err();
        assert!(err.is_no_script());

        let loaded = store
            .script_load(registry.resolve("incr").unwrap().source(), RouteHint::Any)
            .unwrap();
        assert_eq!(loaded, sha);
        assert_eq!(
            store
                .eval_sha(sha, vec![b"k".to_vec(), b"10".to_vec()], 1)
                .unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn failed_batch_is_rolled_back() {
        let mut store = MemoryStore::new();
        store.set("text", b"abc", SetOptions::new()).unwrap();
        store
            .script_load(
                ScriptRegistry::new().resolve("incr").unwrap().source(),
                RouteHint::Any,
            )
            .unwrap();

        let mut batch = Batch::new();
        batch
            .add(Cmd::MSet {
                entries: vec![(b"a".to_vec(), b"1".to_vec())],
            })
            .add(Cmd::EvalSha {
                fingerprint: ScriptRegistry::new().fingerprint_of("incr").unwrap().to_string(),
                args: vec![b"text".to_vec(), b"10".to_vec()],
                key_count: 1,
            });

        let err = store.req_batch(&batch).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecAbort);
        assert_eq!(store.value_of("a"), None);
    }

    #[test]
    fn unreachable_store_refuses_connections() {
        let mut store = MemoryStore::new();
        store.set_unreachable(true);
        let err = store.get("a").unwrap_err();
        assert!(err.is_connection_dropped());
    }
}
