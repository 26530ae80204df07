//! Property tests for the record codec and the expiry policy.

use std::collections::BTreeMap;

use proptest::prelude::*;
use sidcache_store::{OpenMode, Store, StoreConfig, StoreMode};
use tempfile::TempDir;

use sidcache::codec::{Cursor, NtTime, RecordBuf, MAX_STRING_LEN};
use sidcache::domain::SeqNum;
use sidcache::expiry::{evaluate, ExpiryInput, Verdict};
use sidcache::types::Wire;
use sidcache::{Sid, UserInfo};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_sid() -> impl Strategy<Value = Sid> {
    (0u64..(1 << 48), prop::collection::vec(any::<u32>(), 0..=15))
        .prop_map(|(authority, subs)| Sid::new(1, authority, &subs).unwrap())
}

fn arb_seqnum() -> impl Strategy<Value = SeqNum> {
    prop_oneof![
        Just(SeqNum::UNREACHABLE),
        (0u32..4).prop_map(SeqNum),
        any::<u32>().prop_map(SeqNum),
    ]
}

fn arb_expiry_input() -> impl Strategy<Value = ExpiryInput> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), arb_seqnum(), arb_seqnum()).prop_map(
        |(offline_logon, globally_offline, domain_online, recent_conn_failure, domain_seqnum, record_seqnum)| {
            ExpiryInput {
                offline_logon,
                globally_offline,
                domain_online,
                recent_conn_failure,
                domain_seqnum,
                record_seqnum,
            }
        },
    )
}

#[derive(Debug, Clone)]
enum Op {
    Put(u8, Vec<u8>),
    Delete(u8),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..8, prop::collection::vec(any::<u8>(), 0..64)).prop_map(|(k, v)| Op::Put(k, v)),
        1 => (0u8..8).prop_map(Op::Delete),
    ]
}

fn op_key(k: u8) -> Vec<u8> {
    format!("NS/HOME/USER{}", k).into_bytes()
}

fn arb_user() -> impl Strategy<Value = UserInfo> {
    (
        "[a-z][a-z0-9._-]{0,20}",
        prop::option::of(".{0,40}"),
        prop::option::of("/home/[a-z]{1,12}"),
        prop::option::of("/bin/(sh|bash|zsh)"),
        arb_sid(),
        arb_sid(),
    )
        .prop_map(|(acct_name, full_name, homedir, shell, user_sid, group_sid)| UserInfo {
            acct_name,
            full_name,
            homedir,
            shell,
            user_sid,
            group_sid,
        })
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_string_reads_back_or_truncates(s in prop::option::of(".{0,300}")) {
        let mut buf = RecordBuf::new();
        buf.put_string(s.as_deref());
        let read = Cursor::new(buf.as_bytes()).get_string().unwrap();

        match (s, read) {
            (None, None) => {}
            (Some(s), Some(read)) if s.len() <= MAX_STRING_LEN => prop_assert_eq!(read, s),
            (Some(s), Some(read)) => {
                // cut at a char boundary at most 3 bytes short of the limit
                prop_assert!(read.len() <= MAX_STRING_LEN);
                prop_assert!(read.len() + 3 >= MAX_STRING_LEN);
                prop_assert!(s.starts_with(&read));
            }
            (s, read) => prop_assert!(false, "wrote {:?}, read {:?}", s, read),
        }
    }

    #[test]
    fn prop_mixed_fields_in_order(a in any::<u8>(), b in any::<u16>(), c in any::<u32>(), t in any::<u64>(), h in any::<[u8; 16]>()) {
        let mut buf = RecordBuf::with_capacity(1);
        buf.put_u8(a);
        buf.put_u16(b);
        buf.put_nttime(NtTime(t));
        buf.put_hash16(&h);
        buf.put_u32(c);

        let mut cur = Cursor::new(buf.as_bytes());
        prop_assert_eq!(cur.get_u8().unwrap(), a);
        prop_assert_eq!(cur.get_u16().unwrap(), b);
        prop_assert_eq!(cur.get_nttime().unwrap(), NtTime(t));
        prop_assert_eq!(cur.get_hash16().unwrap(), h);
        prop_assert_eq!(cur.get_u32().unwrap(), c);
        prop_assert_eq!(cur.remaining(), 0);
        prop_assert!(buf.capacity() >= buf.len());
        prop_assert!(buf.capacity().is_power_of_two());
    }

    #[test]
    fn prop_sid_text_round_trips(sid in arb_sid()) {
        prop_assert_eq!(sid.to_string().parse::<Sid>().unwrap(), sid);
    }

    #[test]
    fn prop_truncated_row_never_decodes(user in arb_user(), cut in any::<prop::sample::Index>()) {
        let mut buf = RecordBuf::new();
        user.encode(&mut buf);
        let bytes = buf.as_bytes();
        let cut = cut.index(bytes.len());

        let mut cur = Cursor::new(&bytes[..cut]);
        prop_assert!(UserInfo::decode(&mut cur).is_err());

        let mut cur = Cursor::new(bytes);
        prop_assert_eq!(UserInfo::decode(&mut cur).unwrap(), user);
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_store_matches_model_across_reopen(ops in prop::collection::vec(arb_op(), 1..40)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.journal");
        let mut model = BTreeMap::new();

        let store = Store::open(&path, OpenMode::Truncate, StoreConfig::default()).unwrap();
        for op in &ops {
            match op {
                Op::Put(k, v) => {
                    // writing the same value twice changes nothing
                    store.store(&op_key(*k), v, StoreMode::Replace).unwrap();
                    store.store(&op_key(*k), v, StoreMode::Replace).unwrap();
                    prop_assert_eq!(store.fetch(&op_key(*k)).unwrap(), Some(v.clone()));
                    model.insert(op_key(*k), v.clone());
                }
                Op::Delete(k) => {
                    let existed = store.delete(&op_key(*k)).unwrap();
                    prop_assert_eq!(existed, model.remove(&op_key(*k)).is_some());
                }
            }
        }
        prop_assert_eq!(store.len().unwrap(), model.len());
        store.close().unwrap();

        let reopened = Store::open(&path, OpenMode::Preserve, StoreConfig::default()).unwrap();
        prop_assert_eq!(reopened.len().unwrap(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(reopened.fetch(key).unwrap(), Some(value.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// Expiry policy
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_globally_offline_never_expires(mut input in arb_expiry_input()) {
        input.offline_logon = true;
        input.globally_offline = true;
        prop_assert_eq!(evaluate(&input), Verdict::GloballyOffline);
    }

    #[test]
    fn prop_offline_domain_without_failure_signal_never_expires(mut input in arb_expiry_input()) {
        prop_assume!(!(input.offline_logon && input.globally_offline));
        input.domain_online = false;
        input.recent_conn_failure = false;
        prop_assert!(!evaluate(&input).is_expired());
    }

    #[test]
    fn prop_matching_known_seqnum_never_expires(input in arb_expiry_input(), seq in 0u32..0xFFFF_FFFF) {
        let input = ExpiryInput { domain_seqnum: SeqNum(seq), record_seqnum: SeqNum(seq), ..input };
        prop_assert!(!evaluate(&input).is_expired());
    }

    #[test]
    fn prop_verdict_is_first_matching_rule(input in arb_expiry_input()) {
        let rule1 = input.offline_logon && input.globally_offline;
        let rule2 = !input.domain_online && !input.recent_conn_failure;
        let rule3 = !input.domain_seqnum.is_unreachable() && input.record_seqnum.is_unreachable();
        let rule4 = input.domain_seqnum.is_unreachable() || input.record_seqnum == input.domain_seqnum;

        let expected = if rule1 {
            Verdict::GloballyOffline
        } else if rule2 {
            Verdict::DomainOffline
        } else if rule3 {
            Verdict::WrittenUnreachable
        } else if rule4 {
            Verdict::Current
        } else {
            Verdict::Changed
        };
        prop_assert_eq!(evaluate(&input), expected);
    }
}

#[test]
fn test_every_flag_combination_with_changed_seqnum() {
    // with a known, changed sequence number only the two offline rules keep
    // a record
    for bits in 0u8..16 {
        let input = ExpiryInput {
            offline_logon: bits & 1 != 0,
            globally_offline: bits & 2 != 0,
            domain_online: bits & 4 != 0,
            recent_conn_failure: bits & 8 != 0,
            domain_seqnum: SeqNum(8),
            record_seqnum: SeqNum(7),
        };
        let kept = (input.offline_logon && input.globally_offline)
            || (!input.domain_online && !input.recent_conn_failure);
        assert_eq!(evaluate(&input).is_expired(), !kept, "{:?}", input);
    }
}
