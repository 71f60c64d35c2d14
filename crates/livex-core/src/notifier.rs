#![forbid(unsafe_code)]

//! Backing-field helper for objects that raise property notifications.
//!
//! [`PropertyChangeNotifier`] owns a property-changing and a property-changed
//! [`EventSource`]. Embed it in a type, return it from the capability queries
//! of [`Object`](crate::Object), and route setters through
//! [`set_backed_property`](PropertyChangeNotifier::set_backed_property).
//!
//! # Invariants
//!
//! 1. Setting a field to an equal value raises nothing.
//! 2. For a real change, `changing` fires before the swap and `changed` after,
//!    both with the same property name.
//! 3. No field lock is held while handlers run.

use std::fmt;

use parking_lot::Mutex;

use crate::event::{EventSource, Subscription};
use crate::notify::{
    NotifyPropertyChanged, NotifyPropertyChanging, PropertyChangedArgs, PropertyChangingArgs,
};

/// Property-changing / property-changed event pair.
#[derive(Default)]
pub struct PropertyChangeNotifier {
    changing: EventSource<PropertyChangingArgs>,
    changed: EventSource<PropertyChangedArgs>,
}

impl fmt::Debug for PropertyChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyChangeNotifier")
            .field("changing_handlers", &self.changing.handler_count())
            .field("changed_handlers", &self.changed.handler_count())
            .finish()
    }
}

impl PropertyChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise property-changed for `name`.
    pub fn on_property_changed(&self, name: &str) {
        self.changed.raise(&PropertyChangedArgs::new(name));
    }

    /// Raise property-changing for `name`.
    pub fn on_property_changing(&self, name: &str) {
        self.changing.raise(&PropertyChangingArgs::new(name));
    }

    /// Store `value` into `field`, raising changing/changed around the swap.
    ///
    /// Returns `false` (and raises nothing) when the stored value already
    /// equals `value`.
    pub fn set_backed_property<T: PartialEq>(&self, field: &Mutex<T>, value: T, name: &str) -> bool {
        if *field.lock() == value {
            return false;
        }
        self.on_property_changing(name);
        let previous = std::mem::replace(&mut *field.lock(), value);
        drop(previous);
        self.on_property_changed(name);
        true
    }

    /// Subscribe to property-changed.
    pub fn subscribe_changed(
        &self,
        handler: impl Fn(&PropertyChangedArgs) + Send + Sync + 'static,
    ) -> Subscription {
        self.changed.subscribe(handler)
    }

    /// Subscribe to property-changing.
    pub fn subscribe_changing(
        &self,
        handler: impl Fn(&PropertyChangingArgs) + Send + Sync + 'static,
    ) -> Subscription {
        self.changing.subscribe(handler)
    }
}

impl NotifyPropertyChanged for PropertyChangeNotifier {
    fn property_changed(&self) -> &EventSource<PropertyChangedArgs> {
        &self.changed
    }
}

impl NotifyPropertyChanging for PropertyChangeNotifier {
    fn property_changing(&self) -> &EventSource<PropertyChangingArgs> {
        &self.changing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder(notifier: &PropertyChangeNotifier) -> (Arc<Mutex<Vec<String>>>, Vec<Subscription>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_changing = Arc::clone(&log);
        let log_changed = Arc::clone(&log);
        let subs = vec![
            notifier.subscribe_changing(move |args| {
                log_changing
                    .lock()
                    .push(format!("changing:{}", args.property_name().unwrap_or("*")));
            }),
            notifier.subscribe_changed(move |args| {
                log_changed
                    .lock()
                    .push(format!("changed:{}", args.property_name().unwrap_or("*")));
            }),
        ];
        (log, subs)
    }

    #[test]
    fn changing_precedes_changed() {
        let notifier = PropertyChangeNotifier::new();
        let (log, _subs) = recorder(&notifier);
        let field = Mutex::new(1);

        assert!(notifier.set_backed_property(&field, 2, "Value"));
        assert_eq!(*field.lock(), 2);
        assert_eq!(*log.lock(), vec!["changing:Value", "changed:Value"]);
    }

    #[test]
    fn equal_value_raises_nothing() {
        let notifier = PropertyChangeNotifier::new();
        let (log, _subs) = recorder(&notifier);
        let field = Mutex::new(String::from("a"));

        assert!(!notifier.set_backed_property(&field, String::from("a"), "Name"));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn handler_can_read_field_during_notification() {
        let notifier = Arc::new(PropertyChangeNotifier::new());
        let field = Arc::new(Mutex::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let field_clone = Arc::clone(&field);
        let seen_clone = Arc::clone(&seen);
        let _sub = notifier.subscribe_changed(move |_| {
            seen_clone.lock().push(*field_clone.lock());
        });

        notifier.set_backed_property(&field, 5, "Value");
        assert_eq!(*seen.lock(), vec![5]);
    }
}
