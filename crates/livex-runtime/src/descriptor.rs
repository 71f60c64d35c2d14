#![forbid(unsafe_code)]

//! Static descriptors: members, indexers, methods, constructors.
//!
//! A descriptor is the statically known "what to call" part of an operation
//! tree node. Descriptors carry a process-unique [`DescriptorId`]; intern keys
//! and [`ActiveOptions`](crate::ActiveOptions) refer to them by id, so two
//! descriptors are interchangeable only when they are clones of one another.
//!
//! [`Member::property`], [`Indexer::item`] and [`Method::stringify`] are
//! memoized, so independently built trees that read the same property share
//! descriptor identity and therefore share active nodes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use livex_core::{Fault, Value, ValueType};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(u64);

impl DescriptorId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

type Getter = dyn Fn(&Value) -> Result<Value, Fault> + Send + Sync;
type IndexGetter = dyn Fn(&Value, &[Value]) -> Result<Value, Fault> + Send + Sync;
type Invoker = dyn Fn(Option<&Value>, &[Value]) -> Result<Value, Fault> + Send + Sync;
type Factory = dyn Fn(&[Value]) -> Result<Value, Fault> + Send + Sync;

macro_rules! identity_eq {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.0.id == other.0.id
            }
        }

        impl Eq for $ty {}

        impl std::hash::Hash for $ty {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.0.id.hash(state);
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Member
// ---------------------------------------------------------------------------

struct MemberInner {
    id: DescriptorId,
    name: Arc<str>,
    result_type: ValueType,
    is_static: bool,
    getter: Box<Getter>,
}

/// A readable property or field.
#[derive(Clone)]
pub struct Member(Arc<MemberInner>);

identity_eq!(Member);

static PROPERTIES: LazyLock<Mutex<FxHashMap<(Arc<str>, ValueType), Member>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

impl Member {
    /// An instance member read by `getter` from a non-null receiver.
    pub fn new(
        name: impl Into<Arc<str>>,
        result_type: ValueType,
        getter: impl Fn(&Value) -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(MemberInner {
            id: DescriptorId::next(),
            name: name.into(),
            result_type,
            is_static: false,
            getter: Box::new(getter),
        }))
    }

    /// A static member; `getter` takes no receiver.
    pub fn new_static(
        name: impl Into<Arc<str>>,
        result_type: ValueType,
        getter: impl Fn() -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(MemberInner {
            id: DescriptorId::next(),
            name: name.into(),
            result_type,
            is_static: true,
            getter: Box::new(move |_| getter()),
        }))
    }

    /// The shared descriptor reading `name` through [`Value::property`].
    #[must_use]
    pub fn property(name: &str, result_type: ValueType) -> Self {
        let key: (Arc<str>, ValueType) = (name.into(), result_type);
        PROPERTIES
            .lock()
            .entry(key)
            .or_insert_with_key(|(name, ty)| {
                let prop = Arc::clone(name);
                Member::new(Arc::clone(name), *ty, move |recv| recv.property(&prop))
            })
            .clone()
    }

    #[must_use]
    pub fn id(&self) -> DescriptorId {
        self.0.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn result_type(&self) -> ValueType {
        self.0.result_type
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.0.is_static
    }

    /// Read the member from `receiver` (ignored for static members).
    pub fn get(&self, receiver: &Value) -> Result<Value, Fault> {
        (self.0.getter)(receiver)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.0.id.0)
            .field("name", &self.0.name)
            .field("result_type", &self.0.result_type)
            .field("is_static", &self.0.is_static)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

struct IndexerInner {
    id: DescriptorId,
    name: Arc<str>,
    result_type: ValueType,
    getter: Box<IndexGetter>,
}

/// A keyed accessor (`receiver[args]`).
#[derive(Clone)]
pub struct Indexer(Arc<IndexerInner>);

identity_eq!(Indexer);

static ITEMS: LazyLock<Mutex<FxHashMap<ValueType, Indexer>>> =
    LazyLock::new(|| Mutex::new(FxHashMap::default()));

impl Indexer {
    pub fn new(
        name: impl Into<Arc<str>>,
        result_type: ValueType,
        getter: impl Fn(&Value, &[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(IndexerInner {
            id: DescriptorId::next(),
            name: name.into(),
            result_type,
            getter: Box::new(getter),
        }))
    }

    /// The shared single-key `Item` indexer resolving through [`Value::index`].
    ///
    /// Works for `ObservableList` (int index), `ObservableDictionary` (key
    /// lookup), strings, and any object overriding `Object::index`.
    #[must_use]
    pub fn item(result_type: ValueType) -> Self {
        ITEMS
            .lock()
            .entry(result_type)
            .or_insert_with(|| {
                Indexer::new("Item", result_type, |recv, args| match args {
                    [key] => recv.index(key),
                    _ => Err(Fault::argument(format!(
                        "Item takes exactly one key, got {}",
                        args.len()
                    ))),
                })
            })
            .clone()
    }

    #[must_use]
    pub fn id(&self) -> DescriptorId {
        self.0.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn result_type(&self) -> ValueType {
        self.0.result_type
    }

    pub fn get(&self, receiver: &Value, args: &[Value]) -> Result<Value, Fault> {
        (self.0.getter)(receiver, args)
    }
}

impl fmt::Debug for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexer")
            .field("id", &self.0.id.0)
            .field("name", &self.0.name)
            .field("result_type", &self.0.result_type)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

struct MethodInner {
    id: DescriptorId,
    name: Arc<str>,
    result_type: ValueType,
    is_static: bool,
    invoker: Box<Invoker>,
}

/// An instance or static method.
#[derive(Clone)]
pub struct Method(Arc<MethodInner>);

identity_eq!(Method);

static STRINGIFY: LazyLock<Method> = LazyLock::new(|| {
    Method::instance("ToString", ValueType::Str, |recv, _| {
        Ok(Value::from(recv.to_string()))
    })
});

impl Method {
    /// An instance method; `f` receives the non-null receiver and arguments.
    pub fn instance(
        name: impl Into<Arc<str>>,
        result_type: ValueType,
        f: impl Fn(&Value, &[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Self {
        let name: Arc<str> = name.into();
        let method_name = Arc::clone(&name);
        Self(Arc::new(MethodInner {
            id: DescriptorId::next(),
            name,
            result_type,
            is_static: false,
            invoker: Box::new(move |recv, args| match recv {
                Some(recv) => f(recv, args),
                None => Err(Fault::null_reference(&*method_name)),
            }),
        }))
    }

    /// A static function of its arguments.
    pub fn static_fn(
        name: impl Into<Arc<str>>,
        result_type: ValueType,
        f: impl Fn(&[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(MethodInner {
            id: DescriptorId::next(),
            name: name.into(),
            result_type,
            is_static: true,
            invoker: Box::new(move |_, args| f(args)),
        }))
    }

    /// The shared `ToString()` method formatting the receiver with `Display`.
    #[must_use]
    pub fn stringify() -> Self {
        STRINGIFY.clone()
    }

    #[must_use]
    pub fn id(&self) -> DescriptorId {
        self.0.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn result_type(&self) -> ValueType {
        self.0.result_type
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.0.is_static
    }

    pub fn invoke(&self, receiver: Option<&Value>, args: &[Value]) -> Result<Value, Fault> {
        (self.0.invoker)(receiver, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.0.id.0)
            .field("name", &self.0.name)
            .field("result_type", &self.0.result_type)
            .field("is_static", &self.0.is_static)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Constructor
// ---------------------------------------------------------------------------

struct ConstructorInner {
    id: DescriptorId,
    type_name: Arc<str>,
    result_type: ValueType,
    factory: Box<Factory>,
}

/// Creates a new value from arguments (`new T(args)`).
#[derive(Clone)]
pub struct Constructor(Arc<ConstructorInner>);

identity_eq!(Constructor);

impl Constructor {
    pub fn new(
        type_name: impl Into<Arc<str>>,
        result_type: ValueType,
        factory: impl Fn(&[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(ConstructorInner {
            id: DescriptorId::next(),
            type_name: type_name.into(),
            result_type,
            factory: Box::new(factory),
        }))
    }

    #[must_use]
    pub fn id(&self) -> DescriptorId {
        self.0.id
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.0.type_name
    }

    #[must_use]
    pub fn result_type(&self) -> ValueType {
        self.0.result_type
    }

    pub fn construct(&self, args: &[Value]) -> Result<Value, Fault> {
        (self.0.factory)(args)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("id", &self.0.id.0)
            .field("type_name", &self.0.type_name)
            .field("result_type", &self.0.result_type)
            .finish()
    }
}
