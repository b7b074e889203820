use std::collections::HashSet;
use std::time::Duration;

use log::{debug, warn};

use crate::cmd::{Batch, Cmd};
use crate::errors::StoreResult;
use crate::store::StoreClient;

/// Converts a ttl to whole milliseconds, rounding to the nearest one.  A
/// non-zero ttl never becomes 0, since `PEXPIRE key 0` deletes the key.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    if ttl.is_zero() {
        return 0;
    }
    let millis = (ttl.as_nanos() + 500_000) / 1_000_000;
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

/// Outcome of a multi-key write with expiry.
///
/// The write itself is atomic; the keys listed here were written but the
/// store did not confirm their expiry, so they need a follow-up `PEXPIRE`
/// (or a delete) from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteResult {
    failed_keys: HashSet<String>,
}

impl BatchWriteResult {
    /// Keys whose expiry was not applied.
    pub fn failed_keys(&self) -> &HashSet<String> {
        &self.failed_keys
    }

    /// Consumes the result, returning the failed keys.
    pub fn into_failed_keys(self) -> HashSet<String> {
        self.failed_keys
    }

    /// Returns true if every key got its expiry.
    pub fn is_complete(&self) -> bool {
        self.failed_keys.is_empty()
    }

    /// Returns true if `key` did not get its expiry.
    pub fn is_failed(&self, key: &str) -> bool {
        self.failed_keys.contains(key)
    }
}

impl FromIterator<String> for BatchWriteResult {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        BatchWriteResult {
            failed_keys: iter.into_iter().collect(),
        }
    }
}

/// Writes several keys at once and gives each of them a time to live.
///
/// With a ttl the write is a single transaction: `MSET` followed by one
/// `PEXPIRE` per key, in entry order.  The replies of the `PEXPIRE`s are
/// checked one by one, so a key can be written while its expiry is reported
/// as failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchedExpiringWriter;

impl BatchedExpiringWriter {
    /// Creates a writer.
    pub fn new() -> Self {
        BatchedExpiringWriter
    }

    /// Writes `entries`, expiring each key after `ttl`.  A zero ttl writes
    /// without expiry.
    ///
    /// A failure of the transaction as a whole is returned as an error;
    /// per-key expiry failures are reported in the result.
    pub fn write_with_expiry<C, I, K, V>(
        &self,
        con: &mut C,
        entries: I,
        ttl: Duration,
    ) -> StoreResult<BatchWriteResult>
    where
        C: StoreClient + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let (keys, entries): (Vec<String>, Vec<(Vec<u8>, Vec<u8>)>) = entries
            .into_iter()
            .map(|(key, value)| {
                let key = key.into();
                let entry = (key.as_bytes().to_vec(), value.as_ref().to_vec());
                (key, entry)
            })
            .unzip();

        if entries.is_empty() {
            return Ok(BatchWriteResult::default());
        }

        if ttl.is_zero() {
            Cmd::MSet { entries }.query(con)?;
            return Ok(BatchWriteResult::default());
        }

        let millis = ttl_millis(ttl);
        let mut batch = Batch::with_capacity(keys.len() + 1);
        batch.add(Cmd::MSet { entries });
        for key in &keys {
            batch.add(Cmd::pexpire(key.as_str(), millis));
        }
        debug!("writing {} keys with a ttl of {millis}ms", keys.len());

        let results = batch.execute(con)?;
        let failed: BatchWriteResult = keys
            .into_iter()
            .zip(results.iter().skip(1))
            .filter(|(_, reply)| !reply.is_one())
            .map(|(key, _)| key)
            .collect();

        if !failed.is_complete() {
            warn!(
                "expiry was not applied to {} of {} keys",
                failed.failed_keys().len(),
                batch.len() - 1
            );
        }
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_rounded_to_milliseconds() {
        assert_eq!(ttl_millis(Duration::ZERO), 0);
        assert_eq!(ttl_millis(Duration::from_secs_f64(1.5)), 1500);
        assert_eq!(ttl_millis(Duration::from_nanos(1_499_600)), 1);
        assert_eq!(ttl_millis(Duration::from_nanos(1_500_000)), 2);
        assert_eq!(ttl_millis(Duration::from_nanos(1_400_000)), 1);
        assert_eq!(ttl_millis(Duration::from_nanos(10)), 1);
    }

    #[test]
    fn result_reports_failed_keys() {
        let result: BatchWriteResult = vec!["b".to_string()].into_iter().collect();
        assert!(!result.is_complete());
        assert!(result.is_failed("b"));
        assert!(!result.is_failed("a"));
        assert!(BatchWriteResult::default().is_complete());
    }
}
