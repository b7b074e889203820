use log::{debug, trace, warn};

use crate::cmd::Cmd;
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::routing::{RouteHint, RoutingStrategy};
use crate::script::{ScriptDefinition, ScriptRegistry};
use crate::store::{StoreClient, StoreCommands};
use crate::types::{from_store_value, FromStoreValue, ToStoreArgs, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    AfterReload,
}

enum Reload {
    Loaded,
    Failed,
}

/// Runs registered scripts by fingerprint, loading them on demand.
///
/// A script is sent as `EVALSHA`.  When the node answers `NOSCRIPT` the
/// source is loaded with `SCRIPT LOAD` (on the shard owning the first key in
/// sharded deployments) and the call is retried once.  There is never a
/// third attempt.
///
/// Store failures do not propagate: they are logged and the call returns
/// [`Value::DEGRADED`], which callers see as the operation's empty result.
/// Only errors for which [`StoreError::is_fatal`] holds are returned: caller
/// mistakes ([`ErrorKind::UnknownOperation`], [`ErrorKind::ClientError`])
/// and a fingerprint mismatch after loading
/// ([`ErrorKind::ScriptIntegrityMismatch`]).
///
/// ```rust
/// use rcache::{RoutingStrategy, ScriptRegistry, ScriptedOperationExecutor, Topology};
///
/// let registry = ScriptRegistry::new();
/// let routing = RoutingStrategy::new(Topology::Single);
/// let executor = ScriptedOperationExecutor::new(&registry, &routing);
/// # let _ = executor;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ScriptedOperationExecutor<'a> {
    registry: &'a ScriptRegistry,
    routing: &'a RoutingStrategy,
}

impl<'a> ScriptedOperationExecutor<'a> {
    /// Creates an executor over a registry and a routing strategy.
    pub fn new(registry: &'a ScriptRegistry, routing: &'a RoutingStrategy) -> Self {
        ScriptedOperationExecutor { registry, routing }
    }

    /// Runs the script registered as `name`.
    ///
    /// `keys` and `args` accept a single value or a sequence; they end up as
    /// `KEYS` and `ARGV` of the script.
    pub fn execute<C, K, A>(&self, con: &mut C, name: &str, keys: K, args: A) -> StoreResult<Value>
    where
        C: StoreClient + ?Sized,
        K: ToStoreArgs,
        A: ToStoreArgs,
    {
        let script = self.registry.resolve(name)?;
        let keys = keys.to_store_args();
        let args = args.to_store_args();
        check_arguments(script, &keys, &args)?;

        let key_count = keys.len();
        let route = self.routing.target_for(&keys);
        let mut combined = keys;
        combined.extend(args);
        let invocation = Cmd::EvalSha {
            fingerprint: script.fingerprint().to_string(),
            args: combined,
            key_count,
        };

        for attempt in [Attempt::Initial, Attempt::AfterReload] {
            trace!("{name}: {attempt:?}");
            let err = match invocation.query(con) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt == Attempt::Initial && err.is_no_script() {
                match self.reload(con, script, route.clone())? {
                    Reload::Loaded => continue,
                    Reload::Failed => return Ok(Value::DEGRADED),
                }
            }

            if err.is_fatal() {
                return Err(err);
            }
            warn!("script `{name}` failed: {err}");
            return Ok(Value::DEGRADED);
        }

        Ok(Value::DEGRADED)
    }

    /// Runs the script registered as `name` and converts the reply.
    ///
    /// A degraded outcome converts to the empty value of `T`.
    pub fn execute_as<T, C, K, A>(&self, con: &mut C, name: &str, keys: K, args: A) -> StoreResult<T>
    where
        T: FromStoreValue,
        C: StoreClient + ?Sized,
        K: ToStoreArgs,
        A: ToStoreArgs,
    {
        from_store_value(&self.execute(con, name, keys, args)?)
    }

    fn reload<C>(&self, con: &mut C, script: &ScriptDefinition, route: RouteHint) -> StoreResult<Reload>
    where
        C: StoreClient + ?Sized,
    {
        debug!("loading script `{}` ({route:?})", script.name());
        let returned = match con.script_load(script.source(), route) {
            Ok(returned) => returned,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("loading script `{}` failed: {err}", script.name());
                return Ok(Reload::Failed);
            }
        };

        if returned != script.fingerprint() {
            warn!(
                "store computed fingerprint {returned} for script `{}`, expected {}",
                script.name(),
                script.fingerprint()
            );
            return Err(StoreError::integrity_mismatch(
                script.name(),
                script.fingerprint(),
                &returned,
            ));
        }
        Ok(Reload::Loaded)
    }
}

fn check_arguments(script: &ScriptDefinition, keys: &[Vec<u8>], args: &[Vec<u8>]) -> StoreResult<()> {
    if keys.is_empty() {
        fail!((
            ErrorKind::ClientError,
            "Scripted operations need at least one key",
            script.name().to_string(),
        ));
    }
    if let Some(arity) = script.arity() {
        if arity.keys != keys.len() || arity.args != args.len() {
            fail!((
                ErrorKind::ClientError,
                "Wrong number of keys or arguments for script",
                format!(
                    "{} takes {} key(s) and {} argument(s), got {} and {}",
                    script.name(),
                    arity.keys,
                    arity.args,
                    keys.len(),
                    args.len()
                ),
            ));
        }
    }
    Ok(())
}
