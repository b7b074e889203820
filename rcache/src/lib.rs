//! rcache is a cache layer over a Redis-like key-value store, together with a
//! small set of server-side scripted counters.
//!
//! # Cache
//!
//! [`Cache`] offers `get`/`mget`/`set`/`add`/`mset`/`madd`/`delete`/`exists`/
//! `flush` on top of any [`StoreClient`].  Multi-key writes with a time to
//! live are sent as one transaction (`MSET` plus a `PEXPIRE` per key) and
//! report the keys whose expiry did not stick:
//!
//! ```rust,no_run
//! # fn run<C: rcache::StoreClient>(client: C) -> rcache::StoreResult<()> {
//! use std::time::Duration;
//!
//! let mut cache = rcache::Cache::new(client);
//! let result = cache.mset([("a", "1"), ("b", "2")], Duration::from_millis(1500))?;
//! for key in result.failed_keys() {
//!     cache.delete(key)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Scripted operations
//!
//! Scripts are kept in a [`ScriptRegistry`] and run by fingerprint with
//! `EVALSHA`.  A node that does not know a script yet gets it through
//! `SCRIPT LOAD`, after which the call is retried once.  In sharded
//! deployments the load goes to the shard that owns the first key.  The
//! built-in scripts are `incr`, `incr_reset`, `incr_max` and `decr_exist`.
//!
//! ```rust,no_run
//! # fn run<C: rcache::StoreClient>(client: C) -> rcache::StoreResult<()> {
//! let mut cache = rcache::Cache::new(client);
//! // allow at most 3 attempts per 10 minutes
//! let outcome: Vec<i64> = cache.execute_atomic_operation_as("incr_max", "login:42", (3, 600))?;
//! let allowed = outcome.first() == Some(&1);
//! # let _ = allowed;
//! # Ok(())
//! # }
//! ```
//!
//! Backend failures while running a script are logged and reported as
//! [`Value::DEGRADED`] instead of an error, so a broken cache never takes the
//! caller down with it.
//!
//! # Connections
//!
//! Connecting, authenticating and speaking the wire protocol are left to the
//! [`StoreClient`] implementation.  The `rcache-test` crate provides an
//! in-memory store and a mock store for tests.

#![deny(non_camel_case_types)]
#![warn(missing_docs)]

mod macros;

mod batch;
mod cache;
mod cmd;
mod config;
mod errors;
mod executor;
mod routing;
mod script;
mod store;
mod types;

pub use crate::batch::{BatchWriteResult, BatchedExpiringWriter};
pub use crate::cache::Cache;
pub use crate::cmd::{Batch, Cmd, SetOptions};
pub use crate::config::{CacheConfig, FlushPolicy};
pub use crate::errors::{ErrorKind, StoreError, StoreResult};
pub use crate::executor::ScriptedOperationExecutor;
pub use crate::routing::{get_slot, RouteHint, RoutingStrategy, Topology};
pub use crate::script::{fingerprint, Arity, ScriptDefinition, ScriptRegistry};
pub use crate::store::{StoreClient, StoreCommands};
pub use crate::types::{from_store_value, FromStoreValue, ToStoreArgs, Value};
