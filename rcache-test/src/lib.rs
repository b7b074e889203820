//! Testing support
//!
//! This crate provides two stores implementing [`StoreClient`], so that code
//! built on `rcache` can be tested without a server:
//!
//! * [`MockStore`] checks that the client submits an exact sequence of
//!   commands and answers each with a canned reply.
//! * [`MemoryStore`] is a small in-memory store with expiry, transactions,
//!   per-node script caches and native versions of the built-in scripts.
//!
//! # Example
//!
//! ```rust
//! use rcache::{Cmd, StoreCommands};
//! use rcache_test::{MockCmd, MockStore};
//!
//! let mut store = MockStore::new(vec![MockCmd::new(Cmd::exists("foo"), Ok(1))]);
//!
//! assert!(store.exists("foo").unwrap());
//! ```

mod memory;

pub use crate::memory::MemoryStore;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rcache::{Batch, Cmd, ErrorKind, StoreClient, StoreError, StoreResult, Value};

/// Helper trait for converting test values into a `rcache::Value` returned
/// from a `MockStore`.
pub trait IntoStoreValue {
    /// Convert a value into `rcache::Value`.
    fn into_store_value(self) -> Value;
}

macro_rules! into_store_value_impl_int {
    ($t:ty) => {
        impl IntoStoreValue for $t {
            fn into_store_value(self) -> Value {
                Value::Int(self as i64)
            }
        }
    };
}

into_store_value_impl_int!(i8);
into_store_value_impl_int!(i16);
into_store_value_impl_int!(i32);
into_store_value_impl_int!(i64);
into_store_value_impl_int!(u8);
into_store_value_impl_int!(u16);
into_store_value_impl_int!(u32);

impl IntoStoreValue for String {
    fn into_store_value(self) -> Value {
        Value::BulkString(self.into_bytes())
    }
}

impl IntoStoreValue for &str {
    fn into_store_value(self) -> Value {
        Value::BulkString(self.as_bytes().to_vec())
    }
}

impl IntoStoreValue for bool {
    fn into_store_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl IntoStoreValue for Vec<Value> {
    fn into_store_value(self) -> Value {
        Value::Array(self)
    }
}

impl IntoStoreValue for Value {
    fn into_store_value(self) -> Value {
        self
    }
}

/// Build [`Value`]s from a JSON-like notation
///
/// * integers, strings and other types that implement [`IntoStoreValue`]
/// * `nil` - maps to [`Value::Nil`]
/// * `ok` - maps to [`Value::Okay`]
/// * `[element1, element2, ..., elementN]` - maps to [`Value::Array`]
///
/// # Example
///
/// ```rust
/// use rcache::Value;
/// use rcache_test::store_value;
///
/// let actual = store_value!([1, "foo", nil]);
///
/// let expected = Value::Array(vec![
///   Value::Int(1),
///   Value::BulkString("foo".as_bytes().to_vec()),
///   Value::Nil,
/// ]);
/// assert_eq!(actual, expected)
/// ```
#[macro_export]
macro_rules! store_value {
    ([$($e:tt),* $(,)*]) => {
        rcache::Value::Array(vec![$($crate::store_value!($e)),*])
    };

    (nil) => {
        rcache::Value::Nil
    };

    (ok) => {
        rcache::Value::Okay
    };

    ($e:expr) => {
        $crate::IntoStoreValue::into_store_value($e)
    };
}

enum Expected {
    Command(Cmd),
    Batch(Batch),
}

/// Represents a command to be executed against a `MockStore`.
pub struct MockCmd {
    expected: Expected,
    responses: Result<Vec<Value>, StoreError>,
}

impl MockCmd {
    /// Create a new `MockCmd` given a command and either a value convertible
    /// to a `rcache::Value` or a `StoreError`.
    pub fn new<V>(cmd: Cmd, response: Result<V, StoreError>) -> Self
    where
        V: IntoStoreValue,
    {
        MockCmd {
            expected: Expected::Command(cmd),
            responses: response.map(|r| vec![r.into_store_value()]),
        }
    }

    /// Create a new `MockCmd` given a batch and one reply per queued command
    /// or a `StoreError` for the whole transaction.
    pub fn batch<V>(batch: Batch, responses: Result<Vec<V>, StoreError>) -> Self
    where
        V: IntoStoreValue,
    {
        MockCmd {
            expected: Expected::Batch(batch),
            responses: responses.map(|xs| xs.into_iter().map(|x| x.into_store_value()).collect()),
        }
    }
}

/// A mock store for testing without a server. `MockStore` checks whether the
/// client submits a specific sequence of commands and generates an error if
/// it does not.
///
/// Clones share the same expectations, so a test can keep a handle after
/// moving the store into a `Cache`.
#[derive(Clone)]
pub struct MockStore {
    commands: Arc<Mutex<VecDeque<MockCmd>>>,
    history: Arc<Mutex<Vec<Cmd>>>,
    assert_is_empty_on_drop: bool,
}

impl MockStore {
    /// Construct a new from the given sequence of commands.
    pub fn new<I>(commands: I) -> Self
    where
        I: IntoIterator<Item = MockCmd>,
    {
        MockStore {
            commands: Arc::new(Mutex::new(VecDeque::from_iter(commands))),
            history: Arc::new(Mutex::new(vec![])),
            assert_is_empty_on_drop: false,
        }
    }

    /// Enable assertion to ensure all commands have been consumed
    pub fn assert_all_commands_consumed(mut self) -> Self {
        self.assert_is_empty_on_drop = true;
        self
    }

    /// Returns true if every expected command was received.
    pub fn is_empty(&self) -> bool {
        self.commands.lock().unwrap().is_empty()
    }

    /// Returns every command received so far; commands of a batch are
    /// listed individually.
    pub fn history(&self) -> Vec<Cmd> {
        self.history.lock().unwrap().clone()
    }

    /// Counts received commands by name, e.g. `"SCRIPT LOAD"`.
    pub fn count(&self, name: &str) -> usize {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|cmd| cmd.name() == name)
            .count()
    }

    fn next(&mut self, actual: Expected) -> StoreResult<Vec<Value>> {
        match &actual {
            Expected::Command(cmd) => self.history.lock().unwrap().push(cmd.clone()),
            Expected::Batch(batch) => self
                .history
                .lock()
                .unwrap()
                .extend(batch.commands().iter().cloned()),
        }

        let mut commands = self.commands.lock().unwrap();
        let next_cmd = commands.pop_front().ok_or_else(|| {
            self.assert_is_empty_on_drop = false;
            StoreError::from((
                ErrorKind::ClientError,
                "TEST",
                format!("unexpected command: {}", describe(&actual)),
            ))
        })?;

        let matches = match (&next_cmd.expected, &actual) {
            (Expected::Command(expected), Expected::Command(actual)) => expected == actual,
            (Expected::Batch(expected), Expected::Batch(actual)) => expected == actual,
            _ => false,
        };
        if !matches {
            self.assert_is_empty_on_drop = false;
            return Err(StoreError::from((
                ErrorKind::ClientError,
                "TEST",
                format!(
                    "unexpected command: expected={}, actual={}",
                    describe(&next_cmd.expected),
                    describe(&actual),
                ),
            )));
        }

        next_cmd.responses
    }
}

fn describe(expected: &Expected) -> String {
    match expected {
        Expected::Command(cmd) => format!("{cmd:?}"),
        Expected::Batch(batch) => format!("MULTI {:?} EXEC", batch.commands()),
    }
}

impl Drop for MockStore {
    fn drop(&mut self) {
        if self.assert_is_empty_on_drop {
            let commands = self.commands.lock().unwrap();
            if Arc::strong_count(&self.commands) == 1 {
                assert!(commands.back().is_none());
            }
        }
    }
}

impl StoreClient for MockStore {
    fn req_command(&mut self, cmd: &Cmd) -> StoreResult<Value> {
        let mut values = self.next(Expected::Command(cmd.clone()))?;
        match values.len() {
            1 => Ok(values.remove(0)),
            0 => {
                self.assert_is_empty_on_drop = false;
                Err(StoreError::from((
                    ErrorKind::ClientError,
                    "no value configured as response",
                )))
            }
            _ => {
                self.assert_is_empty_on_drop = false;
                Err(StoreError::from((
                    ErrorKind::ClientError,
                    "multiple values configured as response for command expecting a single value",
                )))
            }
        }
    }

    fn req_batch(&mut self, batch: &Batch) -> StoreResult<Vec<Value>> {
        self.next(Expected::Batch(batch.clone()))
    }
}
