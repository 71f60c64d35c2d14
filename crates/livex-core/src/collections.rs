#![forbid(unsafe_code)]

//! Observable list and dictionary with range operations.
//!
//! Both collections are meant to be shared (`Arc<ObservableList>` wrapped in
//! a [`Value`]) and mutated through `&self`. Every mutation raises exactly one
//! collection- or dictionary-changed notification per contiguous change,
//! followed by a `"Count"` property-changed notification when the length
//! changed.
//!
//! # Invariants
//!
//! 1. Notifications are raised after the storage lock is released, so
//!    handlers may read the collection.
//! 2. A rejected mutation (out-of-range index) changes nothing and raises
//!    nothing.
//! 3. Neither collection raises an `"Item"` property change; positional and
//!    keyed listeners rely on the collection/dictionary events alone.

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::event::EventSource;
use crate::fault::Fault;
use crate::notifier::PropertyChangeNotifier;
use crate::notify::{
    CollectionChangedArgs, DictionaryChangedArgs, NotifyCollectionChanged,
    NotifyDictionaryChanged, NotifyPropertyChanged, NotifyPropertyChanging,
};
use crate::value::{Object, Value};

const COUNT: &str = "Count";

fn out_of_range(index: usize, len: usize) -> Fault {
    Fault::index_out_of_range(i64::try_from(index).unwrap_or(i64::MAX), len)
}

// ---------------------------------------------------------------------------
// ObservableList
// ---------------------------------------------------------------------------

/// A list of values raising collection-changed notifications.
#[derive(Default)]
pub struct ObservableList {
    items: RwLock<Vec<Value>>,
    collection_changed: EventSource<CollectionChangedArgs>,
    notifier: PropertyChangeNotifier,
}

impl fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableList")
            .field("len", &self.len())
            .finish()
    }
}

impl ObservableList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            items: RwLock::new(items),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    /// Snapshot of the current items.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    pub fn push(&self, item: impl Into<Value>) {
        let item = item.into();
        let start = {
            let mut items = self.items.write();
            items.push(item.clone());
            items.len() - 1
        };
        self.raise(CollectionChangedArgs::added(start, vec![item]), true);
    }

    pub fn insert(&self, index: usize, item: impl Into<Value>) -> Result<(), Fault> {
        self.insert_range(index, vec![item.into()])
    }

    /// Insert `new_items` so the first lands at `index`.
    pub fn insert_range(&self, index: usize, new_items: Vec<Value>) -> Result<(), Fault> {
        if new_items.is_empty() {
            return Ok(());
        }
        {
            let mut items = self.items.write();
            if index > items.len() {
                return Err(out_of_range(index, items.len()));
            }
            items.splice(index..index, new_items.iter().cloned());
        }
        self.raise(CollectionChangedArgs::added(index, new_items), true);
        Ok(())
    }

    pub fn remove_at(&self, index: usize) -> Result<Value, Fault> {
        let mut removed = self.remove_range(index, 1)?;
        removed.pop().ok_or_else(|| out_of_range(index, self.len()))
    }

    /// Remove `count` items starting at `index`.
    pub fn remove_range(&self, index: usize, count: usize) -> Result<Vec<Value>, Fault> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let removed: Vec<Value> = {
            let mut items = self.items.write();
            let end = index
                .checked_add(count)
                .filter(|end| *end <= items.len())
                .ok_or_else(|| out_of_range(index, items.len()))?;
            items.drain(index..end).collect()
        };
        self.raise(CollectionChangedArgs::removed(index, removed.clone()), true);
        Ok(removed)
    }

    /// Replace the item at `index`, returning the previous one.
    pub fn set(&self, index: usize, item: impl Into<Value>) -> Result<Value, Fault> {
        let item = item.into();
        let old = {
            let mut items = self.items.write();
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
            std::mem::replace(slot, item.clone())
        };
        self.raise(
            CollectionChangedArgs::replaced(index, vec![old.clone()], vec![item]),
            false,
        );
        Ok(old)
    }

    /// Replace `count` items at `index` with `new_items` (counts may differ).
    pub fn replace_range(
        &self,
        index: usize,
        count: usize,
        new_items: Vec<Value>,
    ) -> Result<Vec<Value>, Fault> {
        let count_changed = count != new_items.len();
        let old: Vec<Value> = {
            let mut items = self.items.write();
            let end = index
                .checked_add(count)
                .filter(|end| *end <= items.len())
                .ok_or_else(|| out_of_range(index, items.len()))?;
            items.splice(index..end, new_items.iter().cloned()).collect()
        };
        self.raise(
            CollectionChangedArgs::replaced(index, old.clone(), new_items),
            count_changed,
        );
        Ok(old)
    }

    /// Move `count` items from `old_index` so they start at `new_index`.
    ///
    /// `new_index` is interpreted after the items are taken out.
    pub fn move_range(&self, old_index: usize, new_index: usize, count: usize) -> Result<(), Fault> {
        if count == 0 || old_index == new_index {
            return Ok(());
        }
        let moved: Vec<Value> = {
            let mut items = self.items.write();
            let len = items.len();
            let fits = |start: usize| start.checked_add(count).is_some_and(|end| end <= len);
            if !fits(old_index) {
                return Err(out_of_range(old_index, len));
            }
            if !fits(new_index) {
                return Err(out_of_range(new_index, len));
            }
            let moved: Vec<Value> = items.drain(old_index..old_index + count).collect();
            items.splice(new_index..new_index, moved.iter().cloned());
            moved
        };
        self.raise(CollectionChangedArgs::moved(old_index, new_index, moved), false);
        Ok(())
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.reset(Vec::new());
    }

    /// Replace the whole content, raising a single reset.
    pub fn reset(&self, new_items: Vec<Value>) {
        let count_changed = {
            let mut items = self.items.write();
            let before = items.len();
            *items = new_items;
            before != items.len()
        };
        self.raise(CollectionChangedArgs::reset(), count_changed);
    }

    fn raise(&self, args: CollectionChangedArgs, count_changed: bool) {
        trace!(action = ?args.action, start = ?args.new_start_index.or(args.old_start_index), "list changed");
        self.collection_changed.raise(&args);
        if count_changed {
            self.notifier.on_property_changed(COUNT);
        }
    }
}

impl NotifyCollectionChanged for ObservableList {
    fn collection_changed(&self) -> &EventSource<CollectionChangedArgs> {
        &self.collection_changed
    }
}

impl Object for ObservableList {
    fn type_name(&self) -> &'static str {
        "ObservableList"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn property(&self, name: &str) -> Result<Value, Fault> {
        match name {
            COUNT => Ok(Value::from(self.len())),
            _ => Err(Fault::missing_member(self.type_name(), name)),
        }
    }

    fn index(&self, key: &Value) -> Result<Value, Fault> {
        let Some(index) = key.as_int() else {
            return Err(Fault::argument(format!(
                "list index must be an int, found {}",
                key.type_label()
            )));
        };
        let items = self.items.read();
        usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .ok_or_else(|| Fault::index_out_of_range(index, items.len()))
    }

    fn as_property_changed(&self) -> Option<&dyn NotifyPropertyChanged> {
        Some(&self.notifier)
    }

    fn as_property_changing(&self) -> Option<&dyn NotifyPropertyChanging> {
        Some(&self.notifier)
    }

    fn as_collection_changed(&self) -> Option<&dyn NotifyCollectionChanged> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// ObservableDictionary
// ---------------------------------------------------------------------------

/// An insertion-ordered map raising dictionary-changed notifications.
#[derive(Default)]
pub struct ObservableDictionary {
    entries: RwLock<IndexMap<Value, Value>>,
    dictionary_changed: EventSource<DictionaryChangedArgs>,
    notifier: PropertyChangeNotifier,
}

impl fmt::Debug for ObservableDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableDictionary")
            .field("len", &self.len())
            .finish()
    }
}

impl ObservableDictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    #[must_use]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.read().contains_key(key)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.entries.read().keys().cloned().collect()
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let (key, value) = (key.into(), value.into());
        let previous = self.entries.write().insert(key.clone(), value.clone());
        match &previous {
            Some(old) => self.raise(
                DictionaryChangedArgs::replaced(
                    vec![(key.clone(), old.clone())],
                    vec![(key, value)],
                ),
                false,
            ),
            None => self.raise(DictionaryChangedArgs::added(vec![(key, value)]), true),
        }
        previous
    }

    /// Remove `key`, returning its value if it was present.
    pub fn remove(&self, key: &Value) -> Option<Value> {
        let removed = self.entries.write().shift_remove(key)?;
        self.raise(
            DictionaryChangedArgs::removed(vec![(key.clone(), removed.clone())]),
            true,
        );
        Some(removed)
    }

    /// Insert many pairs: one add event for new keys, one replace event for
    /// existing keys.
    pub fn extend(&self, pairs: impl IntoIterator<Item = (Value, Value)>) {
        let mut added = Vec::new();
        let mut replaced_old = Vec::new();
        let mut replaced_new = Vec::new();
        {
            let mut entries = self.entries.write();
            for (key, value) in pairs {
                match entries.insert(key.clone(), value.clone()) {
                    Some(old) => {
                        replaced_old.push((key.clone(), old));
                        replaced_new.push((key, value));
                    }
                    None => added.push((key, value)),
                }
            }
        }
        if !added.is_empty() {
            self.raise(DictionaryChangedArgs::added(added), true);
        }
        if !replaced_new.is_empty() {
            self.raise(
                DictionaryChangedArgs::replaced(replaced_old, replaced_new),
                false,
            );
        }
    }

    /// Remove every entry, raising a single reset.
    pub fn clear(&self) {
        let count_changed = {
            let mut entries = self.entries.write();
            let had_entries = !entries.is_empty();
            entries.clear();
            had_entries
        };
        self.raise(DictionaryChangedArgs::reset(), count_changed);
    }

    fn raise(&self, args: DictionaryChangedArgs, count_changed: bool) {
        trace!(action = ?args.action, "dictionary changed");
        self.dictionary_changed.raise(&args);
        if count_changed {
            self.notifier.on_property_changed(COUNT);
        }
    }
}

impl NotifyDictionaryChanged for ObservableDictionary {
    fn dictionary_changed(&self) -> &EventSource<DictionaryChangedArgs> {
        &self.dictionary_changed
    }
}

impl Object for ObservableDictionary {
    fn type_name(&self) -> &'static str {
        "ObservableDictionary"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn property(&self, name: &str) -> Result<Value, Fault> {
        match name {
            COUNT => Ok(Value::from(self.len())),
            _ => Err(Fault::missing_member(self.type_name(), name)),
        }
    }

    fn index(&self, key: &Value) -> Result<Value, Fault> {
        self.get(key).ok_or_else(|| Fault::key_not_found(key))
    }

    fn as_property_changed(&self) -> Option<&dyn NotifyPropertyChanged> {
        Some(&self.notifier)
    }

    fn as_property_changing(&self) -> Option<&dyn NotifyPropertyChanging> {
        Some(&self.notifier)
    }

    fn as_dictionary_changed(&self) -> Option<&dyn NotifyDictionaryChanged> {
        Some(self)
    }
}
