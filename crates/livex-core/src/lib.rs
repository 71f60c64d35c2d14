#![forbid(unsafe_code)]

//! Core: value model, faults, change notification, observable collections.
//!
//! # Role in livex
//! `livex-core` is the data layer. Everything an active expression reads is a
//! [`Value`]; everything it can listen to is exposed through the capability
//! queries on [`Object`]. The runtime (`livex-runtime`) builds node graphs on
//! top of these types and never needs to know a concrete object type.
//!
//! # Primary responsibilities
//! - **Value / ValueType / Object**: the dynamic value model and static types.
//! - **Fault**: captured evaluation errors, shared by identity.
//! - **EventSource / Subscription**: multicast events with RAII unsubscribe.
//! - **Notification capabilities**: property-changed, property-changing,
//!   collection-changed, dictionary-changed, disposable.
//! - **PropertyChangeNotifier**: backing-field helper for observable objects.
//! - **ObservableList / ObservableDictionary**: collections with range
//!   operations that raise the matching notifications.

pub mod collections;
pub mod event;
pub mod fault;
pub mod notifier;
pub mod notify;
pub mod value;

pub use collections::{ObservableDictionary, ObservableList};
pub use event::{EventSource, Subscription};
pub use fault::{Fault, FaultKind};
pub use notifier::PropertyChangeNotifier;
pub use notify::{
    Capabilities, CollectionChangeAction, CollectionChangedArgs, DictionaryChangeAction,
    DictionaryChangedArgs, Disposable, NotifyCollectionChanged, NotifyDictionaryChanged,
    NotifyPropertyChanged, NotifyPropertyChanging, PropertyChangedArgs, PropertyChangingArgs,
};
pub use value::{FromValue, Object, ObjectRef, Value, ValueType};
