use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use sha1_smol::Sha1;

use crate::errors::{ErrorKind, StoreError, StoreResult};

/// Counter with auto-expiry.  `KEYS[1]` counter, `ARGV[1]` ttl in seconds.
/// The ttl is only applied by the increment that creates the counter.
const INCR: &str = r"
local count = redis.call('incr', KEYS[1])
if tonumber(count) == 1 then
    redis.call('expire', KEYS[1], ARGV[1])
end
return count
";

/// `ARGV[1]` ceiling, `ARGV[2]` ttl in seconds.  Going over the ceiling
/// resets the counter to 0.
const INCR_RESET: &str = r"
local count = redis.call('incr', KEYS[1])
if tonumber(count) == 1 then
    redis.call('expire', KEYS[1], ARGV[2])
end
if tonumber(count) > tonumber(ARGV[1]) then
    redis.call('set', KEYS[1], 0)
    return 0
end
return count
";

/// `ARGV[1]` ceiling, `ARGV[2]` ttl in seconds.  Returns `{1, new}` when the
/// increment happened and `{0, current}` when the ceiling was already reached.
const INCR_MAX: &str = r"
local count = redis.call('get', KEYS[1])
if count == false or tonumber(count) < tonumber(ARGV[1]) then
    count = redis.call('incr', KEYS[1])
    if count == 1 then
        redis.call('expire', KEYS[1], ARGV[2])
    end
    return {1, count}
end
return {0, tonumber(count)}
";

/// Decrements only existing keys; returns 0 for a missing key.
const DECR_EXIST: &str = r"
local count = redis.call('exists', KEYS[1])
if tonumber(count) == 1 then
    count = redis.call('decr', KEYS[1])
end
return count
";

/// Returns the hex encoded SHA1 of a script source, which is what the store
/// uses to identify cached scripts.
pub fn fingerprint(source: &str) -> String {
    let mut hash = Sha1::new();
    hash.update(source.as_bytes());
    hash.digest().to_string()
}

/// Number of keys and plain arguments a script expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    /// Entries of `KEYS`.
    pub keys: usize,
    /// Entries of `ARGV`.
    pub args: usize,
}

/// A named server-side script.
///
/// The fingerprint is computed on first use and kept for the lifetime of the
/// definition.
pub struct ScriptDefinition {
    name: String,
    source: String,
    arity: Option<Arity>,
    fingerprint: OnceLock<String>,
}

impl ScriptDefinition {
    /// Creates a script definition with no declared arity.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> ScriptDefinition {
        ScriptDefinition {
            name: name.into(),
            source: source.into(),
            arity: None,
            fingerprint: OnceLock::new(),
        }
    }

    /// Declares how many keys and arguments every invocation must pass.
    pub fn with_arity(mut self, keys: usize, args: usize) -> ScriptDefinition {
        self.arity = Some(Arity { keys, args });
        self
    }

    /// Returns the name the script is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the script source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the declared arity, if any.
    pub fn arity(&self) -> Option<Arity> {
        self.arity
    }

    /// Returns the script's SHA1 hash in hexadecimal format.
    pub fn fingerprint(&self) -> &str {
        self.fingerprint.get_or_init(|| fingerprint(&self.source))
    }
}

impl Clone for ScriptDefinition {
    fn clone(&self) -> Self {
        ScriptDefinition {
            name: self.name.clone(),
            source: self.source.clone(),
            arity: self.arity,
            fingerprint: self.fingerprint.clone(),
        }
    }
}

impl fmt::Debug for ScriptDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptDefinition")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("fingerprint", &self.fingerprint.get())
            .finish()
    }
}

/// The table of scripts that can be executed by name.
///
/// `ScriptRegistry::new` comes with the built-in counters:
///
/// * `incr(key; ttl)`: increment, expiring the counter `ttl` seconds after it
///   was created.
/// * `incr_reset(key; max, ttl)`: like `incr`, but a count above `max` resets
///   the counter to 0 and returns 0.
/// * `incr_max(key; max, ttl)`: increment only while below `max`, returning
///   `[1, new]`, otherwise `[0, current]`.
/// * `decr_exist(key)`: decrement only if the key exists, 0 otherwise.
#[derive(Debug, Clone)]
pub struct ScriptRegistry {
    scripts: BTreeMap<String, ScriptDefinition>,
}

impl ScriptRegistry {
    /// Creates a registry with the built-in scripts.
    pub fn new() -> ScriptRegistry {
        let mut registry = ScriptRegistry::empty();
        registry.register(ScriptDefinition::new("incr", INCR).with_arity(1, 1));
        registry.register(ScriptDefinition::new("incr_reset", INCR_RESET).with_arity(1, 2));
        registry.register(ScriptDefinition::new("incr_max", INCR_MAX).with_arity(1, 2));
        registry.register(ScriptDefinition::new("decr_exist", DECR_EXIST).with_arity(1, 0));
        registry
    }

    /// Creates a registry without any scripts.
    pub fn empty() -> ScriptRegistry {
        ScriptRegistry {
            scripts: BTreeMap::new(),
        }
    }

    /// Adds a script, returning the definition it replaced.
    pub fn register(&mut self, script: ScriptDefinition) -> Option<ScriptDefinition> {
        self.scripts.insert(script.name.clone(), script)
    }

    /// Looks a script up by name.
    ///
    /// Fails with [`ErrorKind::UnknownOperation`] if nothing is registered
    /// under `name` or the registered source is empty.
    pub fn resolve(&self, name: &str) -> StoreResult<&ScriptDefinition> {
        match self.scripts.get(name) {
            Some(script) if !script.source.trim().is_empty() => Ok(script),
            Some(_) => Err(StoreError::from((
                ErrorKind::UnknownOperation,
                "Script has an empty source",
                name.to_string(),
            ))),
            None => Err(StoreError::from((
                ErrorKind::UnknownOperation,
                "No script registered under this name",
                name.to_string(),
            ))),
        }
    }

    /// Returns the fingerprint of a registered script.
    pub fn fingerprint_of(&self, name: &str) -> StoreResult<&str> {
        self.resolve(name).map(ScriptDefinition::fingerprint)
    }

    /// Returns true if a script is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    /// Iterates over the registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }
}

impl Default for ScriptRegistry {
    fn default() -> Self {
        ScriptRegistry::new()
    }
}
