#![forbid(unsafe_code)]

//! Typed root handles.
//!
//! # Design
//!
//! An [`ActiveExpression<T>`] is a counted reference to a root entry keyed
//! by (lambda, arguments, options). The root entry binds the lambda, holds a
//! reference to the top active node, and mirrors that node's value and
//! fault into its own fields so it can raise property-change notifications
//! named `"Value"` and `"Fault"`.
//!
//! # Invariants
//!
//! 1. Creating the same (lambda, arguments, options) twice yields handles to
//!    one root, which is torn down only when the last handle drops.
//! 2. On a successful update the fault clears before the value changes; on
//!    a fault the value resets to its default before the fault is set.
//! 3. The handle's value converts from the node value; a value that does
//!    not convert reads as `T::default()`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use livex_core::{
    Fault, FromValue, PropertyChangeNotifier, PropertyChangedArgs, PropertyChangingArgs,
    Subscription, Value,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::engine::{Engine, Tables};
use crate::error::ConstructionError;
use crate::expr::Lambda;
use crate::intern::NodeRef;
use crate::node::factory;
use crate::options::{ActiveOptions, OptionsKey};

pub(crate) const ROOT_SHARD: usize = 0;

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct RootKey {
    pub(crate) lambda: Lambda,
    pub(crate) args: Arc<[Value]>,
    pub(crate) options: Option<OptionsKey>,
}

pub(crate) struct RootInner {
    tables: Arc<Tables>,
    key: RootKey,
    root: Mutex<Option<NodeRef>>,
    subscription: Mutex<Option<Subscription>>,
    value: Mutex<Value>,
    fault: Mutex<Option<Fault>>,
    notifier: PropertyChangeNotifier,
}

impl RootInner {
    pub(crate) fn new(
        tables: Arc<Tables>,
        key: RootKey,
        options: Option<Arc<ActiveOptions>>,
    ) -> Result<Arc<Self>, ConstructionError> {
        let body = key.lambda.bind(&key.args)?;
        let root = factory::build(&tables, &body, options.as_ref(), false)?;
        let node = Arc::clone(root.node());
        let (value, fault) = match node.read() {
            Ok(value) => (value, None),
            Err(fault) => (node.result_type().default_value(), Some(fault)),
        };

        let inner = Arc::new(Self {
            tables,
            key,
            root: Mutex::new(Some(root)),
            subscription: Mutex::new(None),
            value: Mutex::new(value),
            fault: Mutex::new(fault),
            notifier: PropertyChangeNotifier::new(),
        });
        let weak = Arc::downgrade(&inner);
        let subscription = node.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.sync();
            }
        });
        *inner.subscription.lock() = Some(subscription);
        // Catch a change that landed between the first read and subscribing.
        inner.sync();
        Ok(inner)
    }

    fn sync(&self) {
        let Some(node) = self.root.lock().as_ref().map(|root| Arc::clone(root.node())) else {
            return;
        };
        match node.read() {
            Ok(value) => {
                self.notifier.set_backed_property(&self.fault, None, "Fault");
                self.notifier.set_backed_property(&self.value, value, "Value");
            }
            Err(fault) => {
                let default = node.result_type().default_value();
                self.notifier.set_backed_property(&self.value, default, "Value");
                self.notifier.set_backed_property(&self.fault, Some(fault), "Fault");
            }
        }
    }

    /// Drop the node subscription, then the node reference.
    pub(crate) fn teardown(&self) {
        let subscription = self.subscription.lock().take();
        drop(subscription);
        let root = self.root.lock().take();
        drop(root);
        debug!(lambda = %self.key.lambda.body(), "root disposed");
    }

    fn render(&self) -> String {
        match self.root.lock().as_ref() {
            Some(root) => root.node().render(),
            None => self.key.lambda.body().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActiveExpression
// ---------------------------------------------------------------------------

/// A live, typed view of a lambda applied to fixed arguments.
///
/// The value updates as the objects the expression reads from change.
/// Subscribe with [`subscribe_property_changed`](Self::subscribe_property_changed)
/// to hear about `"Value"` and `"Fault"` changes.
pub struct ActiveExpression<T: FromValue = Value> {
    inner: Arc<RootInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromValue> ActiveExpression<T> {
    /// Create (or share) a handle on the global engine.
    pub fn create(lambda: &Lambda, args: &[Value]) -> Result<Self, ConstructionError> {
        Engine::global().create(lambda, args)
    }

    /// Create (or share) a handle on the global engine with disposal options.
    pub fn create_with_options(
        lambda: &Lambda,
        args: &[Value],
        options: Arc<ActiveOptions>,
    ) -> Result<Self, ConstructionError> {
        Engine::global().create_with_options(lambda, args, options)
    }

    pub(crate) fn from_inner(inner: Arc<RootInner>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn value(&self) -> T {
        T::from_value(&self.inner.value.lock()).unwrap_or_default()
    }

    /// The untyped value, as stored.
    #[must_use]
    pub fn raw_value(&self) -> Value {
        self.inner.value.lock().clone()
    }

    #[must_use]
    pub fn fault(&self) -> Option<Fault> {
        self.inner.fault.lock().clone()
    }

    /// The value, or the fault that replaced it.
    pub fn result(&self) -> Result<T, Fault> {
        match self.fault() {
            Some(fault) => Err(fault),
            None => Ok(self.value()),
        }
    }

    #[must_use]
    pub fn arguments(&self) -> &[Value] {
        &self.inner.key.args
    }

    #[must_use]
    pub fn lambda(&self) -> &Lambda {
        &self.inner.key.lambda
    }

    #[must_use]
    pub fn options(&self) -> Option<&Arc<ActiveOptions>> {
        self.inner.key.options.as_ref().map(|key| &key.0)
    }

    pub fn subscribe_property_changed(
        &self,
        handler: impl Fn(&PropertyChangedArgs) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.notifier.subscribe_changed(handler)
    }

    pub fn subscribe_property_changing(
        &self,
        handler: impl Fn(&PropertyChangingArgs) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.notifier.subscribe_changing(handler)
    }

    /// Number of live handles sharing this root.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.inner
            .tables
            .roots
            .ref_count(ROOT_SHARD, &self.inner.key)
    }

    /// Whether both handles share one root.
    #[must_use]
    pub fn same_root<U: FromValue>(&self, other: &ActiveExpression<U>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Release this handle. Equivalent to dropping it.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<T: FromValue> Clone for ActiveExpression<T> {
    fn clone(&self) -> Self {
        let retained = self.inner.tables.roots.retain(ROOT_SHARD, &self.inner.key);
        debug_assert!(retained, "ActiveExpression cloned after its root was released");
        Self::from_inner(Arc::clone(&self.inner))
    }
}

impl<T: FromValue> Drop for ActiveExpression<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.tables.roots.release(ROOT_SHARD, &self.inner.key) {
            inner.teardown();
        }
    }
}

impl<T: FromValue> PartialEq for ActiveExpression<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: FromValue> Eq for ActiveExpression<T> {}

impl<T: FromValue> fmt::Debug for ActiveExpression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.render())
    }
}
