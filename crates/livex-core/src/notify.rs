#![forbid(unsafe_code)]

//! Change notification capabilities.
//!
//! Any [`Object`](crate::Object) may expose any subset of these through the
//! capability queries on the `Object` trait. The active-node bridge only
//! subscribes to what a value actually exposes.

use std::sync::Arc;

use bitflags::bitflags;

use crate::event::EventSource;
use crate::value::Value;

bitflags! {
    /// Which notification capabilities an object exposes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// Raises property-changed after a property's value is swapped.
        const PROPERTY_CHANGED = 1 << 0;
        /// Raises property-changing before a property's value is swapped.
        const PROPERTY_CHANGING = 1 << 1;
        /// Raises collection-changed for positional mutations.
        const COLLECTION_CHANGED = 1 << 2;
        /// Raises dictionary-changed for keyed mutations.
        const DICTIONARY_CHANGED = 1 << 3;
        /// Owns resources released by `dispose`.
        const DISPOSABLE = 1 << 4;
    }
}

impl Capabilities {
    /// Whether an active node has anything to subscribe to on this value.
    #[must_use]
    pub fn is_observable(self) -> bool {
        self.intersects(Self::PROPERTY_CHANGED | Self::COLLECTION_CHANGED | Self::DICTIONARY_CHANGED)
    }
}

// ---------------------------------------------------------------------------
// Property notifications
// ---------------------------------------------------------------------------

/// Payload of a property-changed notification.
///
/// A `None` property name means "possibly every property changed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChangedArgs {
    property_name: Option<Arc<str>>,
}

impl PropertyChangedArgs {
    #[must_use]
    pub fn new(property_name: impl Into<Arc<str>>) -> Self {
        Self {
            property_name: Some(property_name.into()),
        }
    }

    /// Notification that any property may have changed.
    #[must_use]
    pub fn all() -> Self {
        Self {
            property_name: None,
        }
    }

    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        self.property_name.as_deref()
    }

    /// Whether a listener reading `name` must react.
    #[must_use]
    pub fn affects(&self, name: &str) -> bool {
        self.property_name.as_deref().is_none_or(|n| n == name)
    }
}

/// Payload of a property-changing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChangingArgs {
    property_name: Option<Arc<str>>,
}

impl PropertyChangingArgs {
    #[must_use]
    pub fn new(property_name: impl Into<Arc<str>>) -> Self {
        Self {
            property_name: Some(property_name.into()),
        }
    }

    #[must_use]
    pub fn all() -> Self {
        Self {
            property_name: None,
        }
    }

    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        self.property_name.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Collection notifications
// ---------------------------------------------------------------------------

/// What kind of positional mutation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionChangeAction {
    Add,
    Remove,
    Replace,
    Move,
    Reset,
}

/// Payload of a collection-changed notification.
///
/// Start indices are `None` for [`CollectionChangeAction::Reset`].
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChangedArgs {
    pub action: CollectionChangeAction,
    pub new_items: Vec<Value>,
    pub new_start_index: Option<usize>,
    pub old_items: Vec<Value>,
    pub old_start_index: Option<usize>,
}

impl CollectionChangedArgs {
    /// `items` were inserted starting at `start`.
    #[must_use]
    pub fn added(start: usize, items: Vec<Value>) -> Self {
        Self {
            action: CollectionChangeAction::Add,
            new_items: items,
            new_start_index: Some(start),
            old_items: Vec::new(),
            old_start_index: None,
        }
    }

    /// `items` were removed starting at `start`.
    #[must_use]
    pub fn removed(start: usize, items: Vec<Value>) -> Self {
        Self {
            action: CollectionChangeAction::Remove,
            new_items: Vec::new(),
            new_start_index: None,
            old_items: items,
            old_start_index: Some(start),
        }
    }

    /// `old_items` starting at `start` were replaced by `new_items`.
    #[must_use]
    pub fn replaced(start: usize, old_items: Vec<Value>, new_items: Vec<Value>) -> Self {
        Self {
            action: CollectionChangeAction::Replace,
            new_items,
            new_start_index: Some(start),
            old_items,
            old_start_index: Some(start),
        }
    }

    /// `items` moved from `old_start` to `new_start`.
    #[must_use]
    pub fn moved(old_start: usize, new_start: usize, items: Vec<Value>) -> Self {
        Self {
            action: CollectionChangeAction::Move,
            new_items: items.clone(),
            new_start_index: Some(new_start),
            old_items: items,
            old_start_index: Some(old_start),
        }
    }

    /// The collection changed too much to describe.
    #[must_use]
    pub fn reset() -> Self {
        Self {
            action: CollectionChangeAction::Reset,
            new_items: Vec::new(),
            new_start_index: None,
            old_items: Vec::new(),
            old_start_index: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Dictionary notifications
// ---------------------------------------------------------------------------

/// What kind of keyed mutation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DictionaryChangeAction {
    Add,
    Remove,
    Replace,
    Reset,
}

/// Payload of a dictionary-changed notification.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryChangedArgs {
    pub action: DictionaryChangeAction,
    pub new_items: Vec<(Value, Value)>,
    pub old_items: Vec<(Value, Value)>,
}

impl DictionaryChangedArgs {
    #[must_use]
    pub fn added(items: Vec<(Value, Value)>) -> Self {
        Self {
            action: DictionaryChangeAction::Add,
            new_items: items,
            old_items: Vec::new(),
        }
    }

    #[must_use]
    pub fn removed(items: Vec<(Value, Value)>) -> Self {
        Self {
            action: DictionaryChangeAction::Remove,
            new_items: Vec::new(),
            old_items: items,
        }
    }

    #[must_use]
    pub fn replaced(old_items: Vec<(Value, Value)>, new_items: Vec<(Value, Value)>) -> Self {
        Self {
            action: DictionaryChangeAction::Replace,
            new_items,
            old_items,
        }
    }

    #[must_use]
    pub fn reset() -> Self {
        Self {
            action: DictionaryChangeAction::Reset,
            new_items: Vec::new(),
            old_items: Vec::new(),
        }
    }

    /// Whether `key` appears among the new items.
    #[must_use]
    pub fn adds_key(&self, key: &Value) -> bool {
        self.new_items.iter().any(|(k, _)| k == key)
    }

    /// Whether `key` appears among the old items.
    #[must_use]
    pub fn drops_key(&self, key: &Value) -> bool {
        self.old_items.iter().any(|(k, _)| k == key)
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

pub trait NotifyPropertyChanged: Send + Sync {
    fn property_changed(&self) -> &EventSource<PropertyChangedArgs>;
}

pub trait NotifyPropertyChanging: Send + Sync {
    fn property_changing(&self) -> &EventSource<PropertyChangingArgs>;
}

pub trait NotifyCollectionChanged: Send + Sync {
    fn collection_changed(&self) -> &EventSource<CollectionChangedArgs>;
}

pub trait NotifyDictionaryChanged: Send + Sync {
    fn dictionary_changed(&self) -> &EventSource<DictionaryChangedArgs>;
}

/// Objects that release resources when their owner lets go of them.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}
