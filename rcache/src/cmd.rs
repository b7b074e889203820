use crate::errors::{ErrorKind, StoreResult};
use crate::routing::RouteHint;
use crate::store::StoreClient;
use crate::types::{ToStoreArgs, Value};

/// Options for a single-key write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    only_if_absent: bool,
    expire_millis: Option<u64>,
}

impl SetOptions {
    /// Creates options for a plain, unconditional write without expiry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only write if the key does not exist yet (`NX`).
    pub fn only_if_absent(mut self) -> Self {
        self.only_if_absent = true;
        self
    }

    /// Expire the key after the given number of milliseconds (`PX`).
    pub fn expire_millis(mut self, millis: u64) -> Self {
        self.expire_millis = Some(millis);
        self
    }

    /// Returns true if the write is conditional on the key being absent.
    pub fn is_only_if_absent(&self) -> bool {
        self.only_if_absent
    }

    /// Returns the requested expiry, if any.
    pub fn expiry_millis(&self) -> Option<u64> {
        self.expire_millis
    }
}

/// A single store command.
///
/// The set of variants is the full capability surface this crate needs from
/// a store; adapters translate each variant to the wire protocol they speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// `GET key`
    Get {
        /// Key to read.
        key: Vec<u8>,
    },
    /// `MGET key [key ...]`
    MGet {
        /// Keys to read, in reply order.
        keys: Vec<Vec<u8>>,
    },
    /// `SET key value [NX] [PX millis]`
    Set {
        /// Key to write.
        key: Vec<u8>,
        /// Value to store.
        value: Vec<u8>,
        /// Condition and expiry.
        options: SetOptions,
    },
    /// `MSET key value [key value ...]`
    MSet {
        /// Key/value pairs, in order.
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    },
    /// `DEL key`
    Del {
        /// Key to remove.
        key: Vec<u8>,
    },
    /// `EXISTS key`
    Exists {
        /// Key to check.
        key: Vec<u8>,
    },
    /// `PEXPIRE key millis`
    PExpire {
        /// Key to expire.
        key: Vec<u8>,
        /// Time to live in milliseconds.
        millis: u64,
    },
    /// `EVALSHA fingerprint key_count arg [arg ...]`
    EvalSha {
        /// SHA1 of the script source.
        fingerprint: String,
        /// The keys followed by the plain arguments.
        args: Vec<Vec<u8>>,
        /// How many entries of `args` are keys.
        key_count: usize,
    },
    /// `SCRIPT LOAD source`
    ScriptLoad {
        /// Script source.
        source: String,
        /// Node that has to receive the script.
        route: RouteHint,
    },
    /// `FLUSHALL`
    FlushAll,
}

impl Cmd {
    /// Creates a `GET` command.
    pub fn get<K: ToStoreArgs + ?Sized>(key: &K) -> Cmd {
        Cmd::Get {
            key: single_arg(key),
        }
    }

    /// Creates an `MGET` command.
    pub fn mget<K: ToStoreArgs + ?Sized>(keys: &K) -> Cmd {
        Cmd::MGet {
            keys: keys.to_store_args(),
        }
    }

    /// Creates a `SET` command.
    pub fn set<K, V>(key: &K, value: &V, options: SetOptions) -> Cmd
    where
        K: ToStoreArgs + ?Sized,
        V: AsRef<[u8]> + ?Sized,
    {
        Cmd::Set {
            key: single_arg(key),
            value: value.as_ref().to_vec(),
            options,
        }
    }

    /// Creates a `DEL` command.
    pub fn del<K: ToStoreArgs + ?Sized>(key: &K) -> Cmd {
        Cmd::Del {
            key: single_arg(key),
        }
    }

    /// Creates an `EXISTS` command.
    pub fn exists<K: ToStoreArgs + ?Sized>(key: &K) -> Cmd {
        Cmd::Exists {
            key: single_arg(key),
        }
    }

    /// Creates a `PEXPIRE` command.
    pub fn pexpire<K: ToStoreArgs + ?Sized>(key: &K, millis: u64) -> Cmd {
        Cmd::PExpire {
            key: single_arg(key),
            millis,
        }
    }

    /// Returns the command name as the store knows it.
    pub fn name(&self) -> &'static str {
        match self {
            Cmd::Get { .. } => "GET",
            Cmd::MGet { .. } => "MGET",
            Cmd::Set { .. } => "SET",
            Cmd::MSet { .. } => "MSET",
            Cmd::Del { .. } => "DEL",
            Cmd::Exists { .. } => "EXISTS",
            Cmd::PExpire { .. } => "PEXPIRE",
            Cmd::EvalSha { .. } => "EVALSHA",
            Cmd::ScriptLoad { .. } => "SCRIPT LOAD",
            Cmd::FlushAll => "FLUSHALL",
        }
    }

    /// Sends the command to the store and returns the raw reply.
    #[inline]
    pub fn query<C: StoreClient + ?Sized>(&self, con: &mut C) -> StoreResult<Value> {
        con.req_command(self)
    }
}

fn single_arg<K: ToStoreArgs + ?Sized>(key: &K) -> Vec<u8> {
    let mut args = key.to_store_args();
    match args.len() {
        1 => args.pop().unwrap_or_default(),
        // a multi-part key is joined so that the command still addresses one key
        _ => args.concat(),
    }
}

/// A batch of commands executed by the store as one atomic unit
/// (`MULTI` ... `EXEC`).
///
/// ```rust
/// use rcache::{Batch, Cmd};
///
/// let mut batch = Batch::new();
/// batch
///     .add(Cmd::MSet { entries: vec![(b"a".to_vec(), b"1".to_vec())] })
///     .add(Cmd::pexpire("a", 1500));
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Cmd>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Batch {
        Self::with_capacity(0)
    }

    /// Creates an empty batch with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Batch {
        Batch {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Queues a command.
    #[inline]
    pub fn add(&mut self, cmd: Cmd) -> &mut Batch {
        self.commands.push(cmd);
        self
    }

    /// Returns the queued commands in queue order.
    pub fn commands(&self) -> &[Cmd] {
        &self.commands
    }

    /// Returns the number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Executes the batch and returns one reply per queued command, in queue
    /// order.
    pub fn execute<C: StoreClient + ?Sized>(&self, con: &mut C) -> StoreResult<Vec<Value>> {
        let results = con.req_batch(self)?;
        if results.len() != self.commands.len() {
            fail!((
                ErrorKind::ResponseError,
                "Invalid response when parsing multi response",
                format!(
                    "expected {} replies, got {}",
                    self.commands.len(),
                    results.len()
                ),
            ));
        }
        Ok(results)
    }
}
