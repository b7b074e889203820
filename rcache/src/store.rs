use crate::cmd::{Batch, Cmd, SetOptions};
use crate::errors::{ErrorKind, StoreError, StoreResult};
use crate::routing::RouteHint;
use crate::types::{from_store_value, Value};

/// Implements the "stateless" part of the store connection interface that
/// is used by the different objects in this crate.
///
/// Connection establishment, authentication, database selection and the wire
/// protocol all live behind this trait; the cache and script layers only see
/// [`Cmd`]s going in and [`Value`]s coming back.
pub trait StoreClient {
    /// Sends a single command and returns the reply.
    ///
    /// A server error reply is reported as `Err`, with the server's error
    /// text preserved so that callers can recognise `NOSCRIPT`.
    fn req_command(&mut self, cmd: &Cmd) -> StoreResult<Value>;

    /// Sends a batch wrapped in `MULTI`/`EXEC` and returns one reply per
    /// queued command.  An aborted transaction is reported as
    /// [`ErrorKind::ExecAbort`].
    fn req_batch(&mut self, batch: &Batch) -> StoreResult<Vec<Value>>;
}

impl<C: StoreClient + ?Sized> StoreClient for &mut C {
    fn req_command(&mut self, cmd: &Cmd) -> StoreResult<Value> {
        (**self).req_command(cmd)
    }

    fn req_batch(&mut self, batch: &Batch) -> StoreResult<Vec<Value>> {
        (**self).req_batch(batch)
    }
}

impl<C: StoreClient + ?Sized> StoreClient for Box<C> {
    fn req_command(&mut self, cmd: &Cmd) -> StoreResult<Value> {
        (**self).req_command(cmd)
    }

    fn req_batch(&mut self, batch: &Batch) -> StoreResult<Vec<Value>> {
        (**self).req_batch(batch)
    }
}

/// Typed helpers over [`StoreClient`].  Implemented for every client.
pub trait StoreCommands: StoreClient {
    /// Get the value of a key, `None` if it does not exist.
    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        bytes_from_value(&self.req_command(&Cmd::get(key))?)
    }

    /// Get the values of several keys, in order.
    fn mget(&mut self, keys: &[&str]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        match self.req_command(&Cmd::mget(keys))? {
            Value::Array(items) => items.iter().map(bytes_from_value).collect(),
            other => Err(StoreError::from((
                ErrorKind::TypeError,
                "Response type not convertible",
                format!("MGET replied with {other:?}"),
            ))),
        }
    }

    /// Set a key.  Returns false if the write was skipped because of
    /// [`SetOptions::only_if_absent`].
    fn set(&mut self, key: &str, value: &[u8], options: SetOptions) -> StoreResult<bool> {
        match self.req_command(&Cmd::set(key, value, options))? {
            Value::Okay => Ok(true),
            Value::Nil => Ok(false),
            other => from_store_value(&other),
        }
    }

    /// Set several keys at once, without expiry.
    fn mset(&mut self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> StoreResult<()> {
        self.req_command(&Cmd::MSet { entries })?;
        Ok(())
    }

    /// Delete a key, returning the number of keys removed.
    fn del(&mut self, key: &str) -> StoreResult<i64> {
        from_store_value(&self.req_command(&Cmd::del(key))?)
    }

    /// Returns true if the key exists.
    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        from_store_value(&self.req_command(&Cmd::exists(key))?)
    }

    /// Set a key's time to live in milliseconds.  Returns true if the
    /// timeout was set.
    fn pexpire(&mut self, key: &str, millis: u64) -> StoreResult<bool> {
        Ok(self.req_command(&Cmd::pexpire(key, millis))?.is_one())
    }

    /// Runs a cached script by its fingerprint.
    fn eval_sha(
        &mut self,
        fingerprint: &str,
        args: Vec<Vec<u8>>,
        key_count: usize,
    ) -> StoreResult<Value> {
        self.req_command(&Cmd::EvalSha {
            fingerprint: fingerprint.to_string(),
            args,
            key_count,
        })
    }

    /// Loads a script into the script cache of the node selected by `route`
    /// and returns the fingerprint the store computed for it.
    fn script_load(&mut self, source: &str, route: RouteHint) -> StoreResult<String> {
        from_store_value(&self.req_command(&Cmd::ScriptLoad {
            source: source.to_string(),
            route,
        })?)
    }

    /// Removes every key from the store.
    fn flush_all(&mut self) -> StoreResult<bool> {
        from_store_value(&self.req_command(&Cmd::FlushAll)?)
    }
}

impl<T: StoreClient + ?Sized> StoreCommands for T {}

fn bytes_from_value(v: &Value) -> StoreResult<Option<Vec<u8>>> {
    match v {
        Value::Nil => Ok(None),
        Value::BulkString(bytes) => Ok(Some(bytes.clone())),
        Value::SimpleString(s) => Ok(Some(s.as_bytes().to_vec())),
        Value::Okay => Ok(Some(b"OK".to_vec())),
        Value::Int(val) => Ok(Some(val.to_string().into_bytes())),
        other => Err(StoreError::from((
            ErrorKind::TypeError,
            "Response type not convertible",
            format!("expected a string reply, got {other:?}"),
        ))),
    }
}
