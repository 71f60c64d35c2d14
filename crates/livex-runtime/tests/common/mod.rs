//! Shared fixtures for the runtime integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use livex_core::{
    Disposable, Fault, NotifyPropertyChanged, NotifyPropertyChanging, Object,
    PropertyChangeNotifier, Value,
};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

// ---------------------------------------------------------------------------
// TestPerson
// ---------------------------------------------------------------------------

/// An observable object with a nullable `Name` and an int `Age`.
///
/// Counts how often `Name` is read so tests can assert short-circuiting.
#[derive(Debug, Default)]
pub struct TestPerson {
    name: Mutex<Value>,
    age: Mutex<Value>,
    name_gets: AtomicUsize,
    notifier: PropertyChangeNotifier,
}

impl TestPerson {
    pub fn new(name: Option<&str>) -> Arc<Self> {
        let person = Self::default();
        *person.name.lock() = name.map_or(Value::Null, Value::from);
        *person.age.lock() = Value::Int(0);
        Arc::new(person)
    }

    pub fn set_name(&self, name: Option<&str>) {
        let value = name.map_or(Value::Null, Value::from);
        self.notifier.set_backed_property(&self.name, value, "Name");
    }

    pub fn set_age(&self, age: i64) {
        self.notifier
            .set_backed_property(&self.age, Value::Int(age), "Age");
    }

    pub fn name_gets(&self) -> usize {
        self.name_gets.load(Ordering::SeqCst)
    }

    pub fn reset_name_gets(&self) {
        self.name_gets.store(0, Ordering::SeqCst);
    }

    pub fn handler_count(&self) -> usize {
        self.notifier.property_changed().live_handler_count()
    }

    /// Registered `PropertyChanged` entries, including dead ones not yet pruned.
    pub fn raw_handler_count(&self) -> usize {
        self.notifier.property_changed().handler_count()
    }
}

impl Object for TestPerson {
    fn type_name(&self) -> &'static str {
        "TestPerson"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn property(&self, name: &str) -> Result<Value, Fault> {
        match name {
            "Name" => {
                self.name_gets.fetch_add(1, Ordering::SeqCst);
                Ok(self.name.lock().clone())
            }
            "Age" => Ok(self.age.lock().clone()),
            _ => Err(Fault::missing_member(self.type_name(), name)),
        }
    }

    fn as_property_changed(&self) -> Option<&dyn NotifyPropertyChanged> {
        Some(&self.notifier)
    }

    fn as_property_changing(&self) -> Option<&dyn NotifyPropertyChanging> {
        Some(&self.notifier)
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A disposable object that counts its disposals.
#[derive(Debug)]
pub struct Resource {
    pub seed: Value,
    disposals: AtomicUsize,
}

impl Resource {
    pub fn new(seed: Value) -> Arc<Self> {
        Arc::new(Self {
            seed,
            disposals: AtomicUsize::new(0),
        })
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl Object for Resource {
    fn type_name(&self) -> &'static str {
        "Resource"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn property(&self, name: &str) -> Result<Value, Fault> {
        match name {
            "Seed" => Ok(self.seed.clone()),
            _ => Err(Fault::missing_member(self.type_name(), name)),
        }
    }

    fn as_disposable(&self) -> Option<&dyn Disposable> {
        Some(self)
    }
}

impl Disposable for Resource {
    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Every `Resource` a factory closure has produced, in creation order.
#[derive(Debug, Default, Clone)]
pub struct ResourceLog(Arc<Mutex<Vec<Arc<Resource>>>>);

impl ResourceLog {
    pub fn make(&self, seed: Value) -> Value {
        let resource = Resource::new(seed);
        self.0.lock().push(Arc::clone(&resource));
        Value::from(resource)
    }

    pub fn all(&self) -> Vec<Arc<Resource>> {
        self.0.lock().clone()
    }

    pub fn disposal_counts(&self) -> Vec<usize> {
        self.0.lock().iter().map(|r| r.disposals()).collect()
    }
}

/// Records property names raised on an event source, in order.
#[derive(Debug, Default, Clone)]
pub struct NameLog(Arc<Mutex<Vec<String>>>);

impl NameLog {
    pub fn push(&self, name: Option<&str>) {
        self.0.lock().push(name.unwrap_or("*").to_string());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}
