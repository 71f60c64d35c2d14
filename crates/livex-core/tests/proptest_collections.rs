//! Property-based invariant tests for the observable collections.
//!
//! 1. Replaying every collection-changed event onto a shadow vector yields
//!    the list's own contents after any sequence of mutations.
//! 2. Rejected mutations raise no events.
//! 3. Replaying dictionary-changed events yields the dictionary's key set.

use std::collections::HashSet;
use std::sync::Arc;

use livex_core::{
    CollectionChangeAction, CollectionChangedArgs, DictionaryChangeAction, DictionaryChangedArgs,
    NotifyCollectionChanged, NotifyDictionaryChanged, ObservableDictionary, ObservableList, Value,
};
use parking_lot::Mutex;
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ListOp {
    Push(i64),
    InsertRange(usize, Vec<i64>),
    RemoveRange(usize, usize),
    Set(usize, i64),
    ReplaceRange(usize, usize, Vec<i64>),
    MoveRange(usize, usize, usize),
    Reset(Vec<i64>),
}

fn list_op_strategy() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        (0i64..100).prop_map(ListOp::Push),
        (0usize..12, proptest::collection::vec(0i64..100, 0..4))
            .prop_map(|(i, items)| ListOp::InsertRange(i, items)),
        (0usize..12, 0usize..4).prop_map(|(i, n)| ListOp::RemoveRange(i, n)),
        (0usize..12, 0i64..100).prop_map(|(i, v)| ListOp::Set(i, v)),
        (0usize..12, 0usize..3, proptest::collection::vec(0i64..100, 0..4))
            .prop_map(|(i, n, items)| ListOp::ReplaceRange(i, n, items)),
        (0usize..12, 0usize..12, 1usize..4).prop_map(|(a, b, n)| ListOp::MoveRange(a, b, n)),
        proptest::collection::vec(0i64..100, 0..6).prop_map(ListOp::Reset),
    ]
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

fn apply(list: &ObservableList, op: &ListOp) -> bool {
    match op {
        ListOp::Push(v) => {
            list.push(*v);
            true
        }
        ListOp::InsertRange(i, items) => list.insert_range(*i, ints(items)).is_ok(),
        ListOp::RemoveRange(i, n) => list.remove_range(*i, *n).is_ok(),
        ListOp::Set(i, v) => list.set(*i, *v).is_ok(),
        ListOp::ReplaceRange(i, n, items) => list.replace_range(*i, *n, ints(items)).is_ok(),
        ListOp::MoveRange(a, b, n) => list.move_range(*a, *b, *n).is_ok(),
        ListOp::Reset(items) => {
            list.reset(ints(items));
            true
        }
    }
}

fn replay(shadow: &mut Vec<Value>, args: &CollectionChangedArgs, snapshot: &[Value]) {
    match args.action {
        CollectionChangeAction::Add => {
            let start = args.new_start_index.unwrap_or(0);
            shadow.splice(start..start, args.new_items.iter().cloned());
        }
        CollectionChangeAction::Remove => {
            let start = args.old_start_index.unwrap_or(0);
            shadow.drain(start..start + args.old_items.len());
        }
        CollectionChangeAction::Replace => {
            let start = args.new_start_index.unwrap_or(0);
            shadow.splice(start..start + args.old_items.len(), args.new_items.iter().cloned());
        }
        CollectionChangeAction::Move => {
            let old = args.old_start_index.unwrap_or(0);
            let new = args.new_start_index.unwrap_or(0);
            let moved: Vec<Value> = shadow.drain(old..old + args.old_items.len()).collect();
            shadow.splice(new..new, moved);
        }
        CollectionChangeAction::Reset => {
            *shadow = snapshot.to_vec();
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// List
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn replayed_events_reconstruct_list(
        initial in proptest::collection::vec(0i64..100, 0..8),
        ops in proptest::collection::vec(list_op_strategy(), 1..40),
    ) {
        let list = Arc::new(ObservableList::from_vec(ints(&initial)));
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let _sub = list.collection_changed().subscribe(move |args: &CollectionChangedArgs| {
            events_clone.lock().push(args.clone());
        });

        let mut shadow = ints(&initial);
        for op in &ops {
            let before = events.lock().len();
            let accepted = apply(&list, op);
            let raised: Vec<CollectionChangedArgs> = events.lock().drain(before..).collect();
            if !accepted {
                prop_assert!(raised.is_empty(), "rejected {:?} raised {:?}", op, raised);
            }
            let snapshot = list.to_vec();
            for args in &raised {
                replay(&mut shadow, args, &snapshot);
            }
            prop_assert_eq!(&shadow, &snapshot, "after {:?}", op);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Dictionary
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn replayed_events_track_dictionary_keys(
        ops in proptest::collection::vec((0u8..3, 0i64..6, 0i64..100), 1..40),
    ) {
        let dict = ObservableDictionary::new();
        let keys = Arc::new(Mutex::new(HashSet::new()));
        let keys_clone = Arc::clone(&keys);
        let _sub = dict.dictionary_changed().subscribe(move |args: &DictionaryChangedArgs| {
            let mut keys = keys_clone.lock();
            match args.action {
                DictionaryChangeAction::Add => {
                    keys.extend(args.new_items.iter().map(|(k, _)| k.clone()));
                }
                DictionaryChangeAction::Remove => {
                    for (k, _) in &args.old_items {
                        keys.remove(k);
                    }
                }
                DictionaryChangeAction::Replace => {}
                DictionaryChangeAction::Reset => keys.clear(),
            }
        });

        for (kind, key, value) in ops {
            match kind {
                0 => {
                    dict.insert(key, value);
                }
                1 => {
                    dict.remove(&Value::Int(key));
                }
                _ => dict.clear(),
            }
            let expected: HashSet<Value> = dict.keys().into_iter().collect();
            prop_assert_eq!(&*keys.lock(), &expected);
        }
    }
}
