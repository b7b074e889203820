mod support;

mod cache {
    use std::collections::HashSet;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use rcache::{
        Batch, Cache, CacheConfig, Cmd, ErrorKind, FlushPolicy, SetOptions, StoreError, Value,
    };
    use rcache_test::{MemoryStore, MockCmd, MockStore};

    use crate::support::*;

    #[test]
    fn test_set_and_get() {
        let (mut cache, store) = memory_cache();

        assert!(cache.set("greeting", "hello", Duration::ZERO).unwrap());
        assert_eq!(cache.get("greeting").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(cache.get("missing").unwrap(), None);
        assert_eq!(store.expires_at("greeting"), None);
    }

    #[test]
    fn test_set_with_ttl_expires() {
        let (mut cache, store) = memory_cache();

        cache.set("session", "abc", Duration::from_secs(30)).unwrap();

        let ttl = store.ttl("session").expect("session should expire");
        assert!(ttl <= Duration::from_secs(30));
        assert!(ttl > Duration::from_secs(25));
    }

    #[test]
    fn test_set_sends_expiry_in_milliseconds() {
        init_logger();
        let store = MockStore::new(vec![MockCmd::new(
            Cmd::set("k", "v", SetOptions::new().expire_millis(1500)),
            Ok(Value::Okay),
        )])
        .assert_all_commands_consumed();
        let mut cache = Cache::new(store);

        assert!(cache.set("k", "v", Duration::from_millis(1500)).unwrap());
    }

    #[test]
    fn test_add_keeps_existing_value() {
        let (mut cache, _store) = memory_cache();

        assert!(cache.add("user:1", "first", Duration::ZERO).unwrap());
        assert!(!cache.add("user:1", "second", Duration::ZERO).unwrap());
        assert_eq!(cache.get("user:1").unwrap(), Some(b"first".to_vec()));
    }

    #[test]
    fn test_mget() {
        let (mut cache, _store) = memory_cache();
        cache.set("a", "1", Duration::ZERO).unwrap();
        cache.set("c", "3", Duration::ZERO).unwrap();

        assert_eq!(
            cache.mget(&["a", "b", "c"]).unwrap(),
            vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]
        );
    }

    #[test]
    fn test_mset_without_ttl_is_plain() {
        init_logger();
        let store = MockStore::new(vec![MockCmd::new(
            Cmd::MSet {
                entries: vec![
                    (b"a".to_vec(), b"1".to_vec()),
                    (b"b".to_vec(), b"2".to_vec()),
                ],
            },
            Ok(Value::Okay),
        )])
        .assert_all_commands_consumed();
        let mut cache = Cache::new(store.clone());

        let result = cache.mset([("a", "1"), ("b", "2")], Duration::ZERO).unwrap();

        assert!(result.is_complete());
        assert_eq!(store.count("PEXPIRE"), 0);
    }

    #[test]
    fn test_mset_reports_failed_expiry() {
        init_logger();
        let mut expected = Batch::new();
        expected
            .add(Cmd::MSet {
                entries: vec![
                    (b"a".to_vec(), b"1".to_vec()),
                    (b"b".to_vec(), b"2".to_vec()),
                ],
            })
            .add(Cmd::pexpire("a", 1500))
            .add(Cmd::pexpire("b", 1500));
        let store = MockStore::new(vec![MockCmd::batch(
            expected,
            Ok(vec![Value::Okay, Value::Int(1), Value::Int(0)]),
        )])
        .assert_all_commands_consumed();
        let mut cache = Cache::new(store);

        let result = cache
            .mset([("a", "1"), ("b", "2")], Duration::from_secs_f64(1.5))
            .unwrap();

        assert_eq!(result.failed_keys(), &HashSet::from(["b".to_string()]));
        assert!(!result.is_failed("a"));
    }

    #[test]
    fn test_mset_against_memory_store() {
        let (mut cache, store) = memory_cache();
        store.fail_expiry_for("b");

        let result = cache
            .mset(
                vec![("a".to_string(), "1"), ("b".to_string(), "2"), ("c".to_string(), "3")],
                Duration::from_secs(60),
            )
            .unwrap();

        assert_eq!(result.into_failed_keys(), HashSet::from(["b".to_string()]));
        assert_eq!(store.value_of("b"), Some(b"2".to_vec()));
        assert!(store.expires_at("a").is_some());
        assert!(store.expires_at("b").is_none());
        assert!(store.expires_at("c").is_some());
        assert_eq!(store.count("MSET"), 1);
        assert_eq!(store.count("PEXPIRE"), 3);
    }

    #[test]
    fn test_mset_empty_sends_nothing() {
        let store = MockStore::new(vec![]).assert_all_commands_consumed();
        let mut cache = Cache::new(store);

        let entries: Vec<(String, Vec<u8>)> = vec![];
        let result = cache.mset(entries, Duration::from_secs(1)).unwrap();

        assert!(result.is_complete());
    }

    #[test]
    fn test_mset_aborted_transaction_is_an_error() {
        init_logger();
        let mut expected = Batch::new();
        expected
            .add(Cmd::MSet {
                entries: vec![(b"a".to_vec(), b"1".to_vec())],
            })
            .add(Cmd::pexpire("a", 1000));
        let store = MockStore::new(vec![MockCmd::batch::<Value>(
            expected,
            Err(StoreError::from((
                ErrorKind::ExecAbort,
                "Transaction discarded because of previous errors",
            ))),
        )]);
        let mut cache = Cache::new(store);

        let result = cache.mset([("a", "1")], Duration::from_secs(1));

        assert_matches!(result, Err(err) if err.kind() == ErrorKind::ExecAbort);
    }

    #[test]
    fn test_madd_skips_existing_keys() {
        let (mut cache, store) = memory_cache();
        cache.set("b", "old", Duration::ZERO).unwrap();

        let result = cache
            .madd([("a", "1"), ("b", "2")], Duration::from_secs(60))
            .unwrap();

        assert_eq!(result.failed_keys(), &HashSet::from(["b".to_string()]));
        assert_eq!(store.value_of("a"), Some(b"1".to_vec()));
        assert_eq!(store.value_of("b"), Some(b"old".to_vec()));
        assert!(store.expires_at("a").is_some());
        assert!(store.expires_at("b").is_none());
    }

    #[test]
    fn test_madd_continues_after_a_failed_key() {
        init_logger();
        let add = |key: &str| Cmd::set(key, "v", SetOptions::new().only_if_absent());
        let store = MockStore::new(vec![
            MockCmd::new(add("a"), Ok(Value::Okay)),
            MockCmd::new::<Value>(
                add("b"),
                Err(StoreError::from(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
            ),
            MockCmd::new(add("c"), Ok(Value::Nil)),
            MockCmd::new(add("d"), Ok(Value::Okay)),
        ])
        .assert_all_commands_consumed();
        let mut cache = Cache::new(store.clone());

        let result = cache
            .madd([("a", "v"), ("b", "v"), ("c", "v"), ("d", "v")], Duration::ZERO)
            .unwrap();

        assert_eq!(
            result.into_failed_keys(),
            HashSet::from(["b".to_string(), "c".to_string()])
        );
        assert_eq!(store.count("SET"), 4);
    }

    #[test]
    fn test_delete_and_exists() {
        let (mut cache, _store) = memory_cache();
        cache.set("k", "v", Duration::ZERO).unwrap();

        assert!(cache.exists("k").unwrap());
        assert!(cache.delete("k").unwrap());
        assert!(!cache.exists("k").unwrap());
        assert!(!cache.delete("k").unwrap());
    }

    #[test]
    fn test_flush() {
        let (mut cache, store) = memory_cache();
        cache.set("k", "v", Duration::ZERO).unwrap();

        assert!(cache.flush().unwrap());

        assert_eq!(store.value_of("k"), None);
        assert_eq!(store.count("FLUSHALL"), 1);
    }

    #[test]
    fn test_flush_never() {
        init_logger();
        let store = MemoryStore::new();
        let config = CacheConfig::new().set_flush_policy(FlushPolicy::Never);
        let mut cache = Cache::with_config(store.clone(), config);
        cache.set("k", "v", Duration::ZERO).unwrap();

        assert!(cache.flush().unwrap());

        assert_eq!(store.value_of("k"), Some(b"v".to_vec()));
        assert_eq!(store.count("FLUSHALL"), 0);
    }

    #[test]
    fn test_plain_operations_propagate_errors() {
        let (mut cache, store) = memory_cache();
        store.set_unreachable(true);

        let err = cache.get("k").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert!(err.is_connection_dropped());
    }

    #[test]
    fn test_into_inner_returns_client() {
        let (mut cache, _store) = memory_cache();
        cache.set("k", "v", Duration::ZERO).unwrap();

        let store = cache.into_inner();

        assert_eq!(store.value_of("k"), Some(b"v".to_vec()));
    }
}
