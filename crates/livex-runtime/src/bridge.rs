#![forbid(unsafe_code)]

//! Change bridge between active nodes and the runtime values they read.
//!
//! # Design
//!
//! A node that reads through a receiver (member access, indexing, instance
//! calls) subscribes to whatever change capabilities the receiver's current
//! value offers. The subscriptions live in a [`ValueWatch`] stored in the
//! node's links; when the receiver value changes the watch is replaced and the
//! old subscriptions drop with it.
//!
//! Handlers capture only a `Weak` reference to the node, so a subscription
//! never keeps a node alive.
//!
//! # Invariants
//!
//! 1. A node watches at most one value at a time.
//! 2. Positional collection changes re-evaluate an index node only when the
//!    change can move or replace the element at the observed index.
//! 3. Removing the observed dictionary key faults the node with `KeyRemoved`
//!    instead of re-reading the dictionary.

use std::sync::{Arc, Weak};

use livex_core::{
    CollectionChangeAction, CollectionChangedArgs, DictionaryChangeAction, DictionaryChangedArgs,
    Subscription, Value,
};
use smallvec::SmallVec;

use crate::node::{ActiveNode, KindData};

pub(crate) type WatchSubscriptions = SmallVec<[Subscription; 3]>;

/// The runtime value a node currently observes, with its subscriptions.
#[derive(Default)]
pub(crate) struct ValueWatch {
    current: Value,
    subs: WatchSubscriptions,
}

impl ValueWatch {
    pub(crate) fn new(current: Value, subs: WatchSubscriptions) -> Self {
        Self { current, subs }
    }

    pub(crate) fn is_watching(&self, value: &Value) -> bool {
        self.current == *value
    }

    #[cfg(test)]
    pub(crate) fn subscription_count(&self) -> usize {
        self.subs.len()
    }
}

fn reevaluate(node: &Weak<ActiveNode>) {
    if let Some(node) = node.upgrade() {
        node.on_dependency_changed();
    }
}

/// Subscribe `node` to the change events of `value` relevant to its kind.
pub(crate) fn receiver_subscriptions(node: &ActiveNode, value: &Value) -> WatchSubscriptions {
    let mut subs = WatchSubscriptions::new();
    let Some(object) = value.as_object() else {
        return subs;
    };

    match node.data() {
        KindData::Member { member, .. } => {
            if let Some(source) = object.as_property_changed() {
                let weak = node.weak();
                let name: Arc<str> = member.name().into();
                subs.push(source.property_changed().subscribe(move |args| {
                    if args.affects(&name) {
                        reevaluate(&weak);
                    }
                }));
            }
        }
        KindData::Index { indexer, .. } => {
            if let Some(source) = object.as_dictionary_changed() {
                let weak = node.weak();
                subs.push(source.dictionary_changed().subscribe(move |args| {
                    if let Some(node) = weak.upgrade() {
                        node.on_dictionary_changed(args);
                    }
                }));
            } else if let Some(source) = object.as_collection_changed() {
                let weak = node.weak();
                subs.push(source.collection_changed().subscribe(move |args| {
                    if let Some(node) = weak.upgrade() {
                        node.on_collection_changed(args);
                    }
                }));
            }
            if let Some(source) = object.as_property_changed() {
                let weak = node.weak();
                let name: Arc<str> = indexer.name().into();
                subs.push(source.property_changed().subscribe(move |args| {
                    if args.affects(&name) {
                        reevaluate(&weak);
                    }
                }));
            }
        }
        KindData::Call { .. } => {
            if let Some(source) = object.as_property_changed() {
                let weak = node.weak();
                subs.push(source.property_changed().subscribe(move |_| reevaluate(&weak)));
            }
            if let Some(source) = object.as_collection_changed() {
                let weak = node.weak();
                subs.push(source.collection_changed().subscribe(move |_| reevaluate(&weak)));
            }
            if let Some(source) = object.as_dictionary_changed() {
                let weak = node.weak();
                subs.push(source.dictionary_changed().subscribe(move |_| reevaluate(&weak)));
            }
        }
        _ => {}
    }
    subs
}

impl ActiveNode {
    /// The single integer index this node reads at, if it has one.
    fn observed_position(&self) -> Option<i64> {
        match self.data() {
            KindData::Index { args, .. } if args.len() == 1 => args[0].peek_value().as_int(),
            _ => None,
        }
    }

    fn observed_key(&self) -> Option<Value> {
        match self.data() {
            KindData::Index { args, .. } if args.len() == 1 => Some(args[0].peek_value()),
            _ => None,
        }
    }

    pub(crate) fn on_collection_changed(&self, args: &CollectionChangedArgs) {
        if collection_change_affects(args, self.observed_position()) {
            self.on_dependency_changed();
        }
    }

    pub(crate) fn on_dictionary_changed(&self, args: &DictionaryChangedArgs) {
        let Some(key) = self.observed_key() else {
            self.on_dependency_changed();
            return;
        };
        match dictionary_change_effect(args, &key) {
            DictionaryEffect::Reevaluate => self.on_dependency_changed(),
            DictionaryEffect::Removed => self.on_key_removed(&key),
            DictionaryEffect::Ignore => {}
        }
    }
}

/// Whether a positional change can affect the element at `index`.
///
/// `None` means the node does not read a single integer position, so every
/// change counts.
pub(crate) fn collection_change_affects(args: &CollectionChangedArgs, index: Option<i64>) -> bool {
    let Some(index) = index else {
        return true;
    };
    let at = |start: Option<usize>| start.map(|s| s as i64);
    match args.action {
        CollectionChangeAction::Reset => true,
        CollectionChangeAction::Add => at(args.new_start_index).is_none_or(|s| s <= index),
        CollectionChangeAction::Remove => at(args.old_start_index).is_none_or(|s| s <= index),
        CollectionChangeAction::Replace => {
            let Some(start) = at(args.new_start_index.or(args.old_start_index)) else {
                return true;
            };
            if args.old_items.len() != args.new_items.len() {
                return start <= index;
            }
            start <= index && index < start + args.new_items.len() as i64
        }
        CollectionChangeAction::Move => {
            let (Some(old), Some(new)) = (at(args.old_start_index), at(args.new_start_index))
            else {
                return true;
            };
            let count = args.new_items.len().max(args.old_items.len()) as i64;
            let lo = old.min(new);
            let hi = old.max(new) + count;
            lo <= index && index < hi
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DictionaryEffect {
    Reevaluate,
    Removed,
    Ignore,
}

/// How a dictionary change affects a node reading `key`.
pub(crate) fn dictionary_change_effect(args: &DictionaryChangedArgs, key: &Value) -> DictionaryEffect {
    match args.action {
        DictionaryChangeAction::Reset => DictionaryEffect::Reevaluate,
        _ if args.adds_key(key) => DictionaryEffect::Reevaluate,
        DictionaryChangeAction::Remove if args.drops_key(key) => DictionaryEffect::Removed,
        DictionaryChangeAction::Replace if args.drops_key(key) => DictionaryEffect::Reevaluate,
        _ => DictionaryEffect::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<Value> {
        (0..n as i64).map(Value::from).collect()
    }

    // -----------------------------------------------------------------------
    // Positional changes
    // -----------------------------------------------------------------------

    #[test]
    fn add_affects_only_at_or_after_start() {
        let args = CollectionChangedArgs::added(3, items(1));
        assert!(!collection_change_affects(&args, Some(2)));
        assert!(collection_change_affects(&args, Some(3)));
        assert!(collection_change_affects(&args, Some(10)));
    }

    #[test]
    fn remove_affects_only_at_or_after_start() {
        let args = CollectionChangedArgs::removed(1, items(2));
        assert!(!collection_change_affects(&args, Some(0)));
        assert!(collection_change_affects(&args, Some(1)));
    }

    #[test]
    fn equal_length_replace_is_local() {
        let args = CollectionChangedArgs::replaced(2, items(2), items(2));
        assert!(!collection_change_affects(&args, Some(1)));
        assert!(collection_change_affects(&args, Some(2)));
        assert!(collection_change_affects(&args, Some(3)));
        assert!(!collection_change_affects(&args, Some(4)));
    }

    #[test]
    fn resizing_replace_shifts_the_tail() {
        let args = CollectionChangedArgs::replaced(2, items(1), items(3));
        assert!(!collection_change_affects(&args, Some(1)));
        assert!(collection_change_affects(&args, Some(7)));
    }

    #[test]
    fn move_covers_the_whole_span() {
        // Moving two items from 1 to 4 touches positions 1..6.
        let args = CollectionChangedArgs::moved(1, 4, items(2));
        assert!(!collection_change_affects(&args, Some(0)));
        assert!(collection_change_affects(&args, Some(1)));
        assert!(collection_change_affects(&args, Some(5)));
        assert!(!collection_change_affects(&args, Some(6)));
    }

    #[test]
    fn reset_and_unknown_positions_always_affect() {
        assert!(collection_change_affects(&CollectionChangedArgs::reset(), Some(0)));
        let args = CollectionChangedArgs::added(5, items(1));
        assert!(collection_change_affects(&args, None));
    }

    // -----------------------------------------------------------------------
    // Dictionary changes
    // -----------------------------------------------------------------------

    fn pair(k: &str, v: i64) -> (Value, Value) {
        (Value::from(k), Value::from(v))
    }

    #[test]
    fn removing_the_observed_key_is_reported() {
        let args = DictionaryChangedArgs::removed(vec![pair("a", 1)]);
        assert_eq!(
            dictionary_change_effect(&args, &Value::from("a")),
            DictionaryEffect::Removed
        );
        assert_eq!(
            dictionary_change_effect(&args, &Value::from("b")),
            DictionaryEffect::Ignore
        );
    }

    #[test]
    fn adds_and_replaces_of_the_key_reevaluate() {
        let key = Value::from("a");
        let added = DictionaryChangedArgs::added(vec![pair("a", 1)]);
        let replaced = DictionaryChangedArgs::replaced(vec![pair("a", 1)], vec![pair("a", 2)]);
        let other = DictionaryChangedArgs::added(vec![pair("z", 1)]);
        assert_eq!(dictionary_change_effect(&added, &key), DictionaryEffect::Reevaluate);
        assert_eq!(dictionary_change_effect(&replaced, &key), DictionaryEffect::Reevaluate);
        assert_eq!(dictionary_change_effect(&other, &key), DictionaryEffect::Ignore);
        assert_eq!(
            dictionary_change_effect(&DictionaryChangedArgs::reset(), &key),
            DictionaryEffect::Reevaluate
        );
    }

    #[test]
    fn default_watch_observes_null() {
        let watch = ValueWatch::default();
        assert!(watch.is_watching(&Value::Null));
        assert!(!watch.is_watching(&Value::from(1)));
        assert_eq!(watch.subscription_count(), 0);
    }
}
