#![forbid(unsafe_code)]

//! The dynamic value model active nodes compute over.
//!
//! # Design
//!
//! Primitive values are stored inline in [`Value`]; everything else is an
//! [`ObjectRef`], a shared pointer to a type implementing [`Object`].
//! Objects advertise notification capabilities through optional trait
//! queries so a node can find out what it can subscribe to without knowing
//! the concrete type.
//!
//! # Invariants
//!
//! 1. Object equality and hashing use pointer identity, never structure.
//! 2. Floats compare and hash by bit pattern, so every `Value` is usable as a
//!    map key and `Eq` is reflexive (`NaN == NaN`).
//! 3. `ValueType::default_value()` is what a faulted or deferred node reports.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::fault::Fault;
use crate::notify::{
    Capabilities, Disposable, NotifyCollectionChanged, NotifyDictionaryChanged,
    NotifyPropertyChanged, NotifyPropertyChanging,
};

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// A reference-typed value with optional change notification capabilities.
pub trait Object: Any + Send + Sync + fmt::Debug {
    /// Static type name used in fault messages and type checks.
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Read a named property.
    fn property(&self, name: &str) -> Result<Value, Fault> {
        Err(Fault::missing_member(self.type_name(), name))
    }

    /// Read the item stored under `key`.
    fn index(&self, _key: &Value) -> Result<Value, Fault> {
        Err(Fault::missing_member(self.type_name(), "Item"))
    }

    fn as_property_changed(&self) -> Option<&dyn NotifyPropertyChanged> {
        None
    }

    fn as_property_changing(&self) -> Option<&dyn NotifyPropertyChanging> {
        None
    }

    fn as_collection_changed(&self) -> Option<&dyn NotifyCollectionChanged> {
        None
    }

    fn as_dictionary_changed(&self) -> Option<&dyn NotifyDictionaryChanged> {
        None
    }

    fn as_disposable(&self) -> Option<&dyn Disposable> {
        None
    }

    /// Summary of the capability queries above.
    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(
            Capabilities::PROPERTY_CHANGED,
            self.as_property_changed().is_some(),
        );
        caps.set(
            Capabilities::PROPERTY_CHANGING,
            self.as_property_changing().is_some(),
        );
        caps.set(
            Capabilities::COLLECTION_CHANGED,
            self.as_collection_changed().is_some(),
        );
        caps.set(
            Capabilities::DICTIONARY_CHANGED,
            self.as_dictionary_changed().is_some(),
        );
        caps.set(Capabilities::DISPOSABLE, self.as_disposable().is_some());
        caps
    }
}

/// Shared handle to an [`Object`], compared by identity.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn Object>);

impl ObjectRef {
    #[must_use]
    pub fn new<T: Object>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Wrap an existing shared object; the caller may keep its own `Arc<T>`.
    #[must_use]
    pub fn from_arc<T: Object>(object: Arc<T>) -> Self {
        Self(object)
    }

    #[must_use]
    pub fn as_object(&self) -> &dyn Object {
        &*self.0
    }

    #[must_use]
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Address of the pointee, without vtable metadata.
    #[must_use]
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.addr() == other.addr()
    }
}

impl std::ops::Deref for ObjectRef {
    type Target = dyn Object;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl<T: Object> From<Arc<T>> for ObjectRef {
    fn from(object: Arc<T>) -> Self {
        Self::from_arc(object)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(ObjectRef),
}

impl Value {
    /// Wrap an object.
    #[must_use]
    pub fn object<T: Object>(object: T) -> Self {
        Self::Object(ObjectRef::new(object))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view, promoting integers.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_object().and_then(ObjectRef::downcast_ref)
    }

    /// Capabilities of the wrapped object; primitives expose none.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.as_object()
            .map_or(Capabilities::empty(), |o| o.capabilities())
    }

    /// Short type label used in fault messages.
    #[must_use]
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Object(o) => o.type_name(),
        }
    }

    /// Read the property `name` from this value.
    ///
    /// Strings expose `Length` (in chars); objects resolve through
    /// [`Object::property`]. A null receiver is a `NullReference` fault.
    pub fn property(&self, name: &str) -> Result<Value, Fault> {
        match self {
            Self::Null => Err(Fault::null_reference(name)),
            Self::Str(s) if name == "Length" => Ok(Self::Int(s.chars().count() as i64)),
            Self::Object(o) => o.property(name),
            other => Err(Fault::missing_member(other.type_label(), name)),
        }
    }

    /// Read the item under `key`.
    ///
    /// Strings are indexable by char position; objects resolve through
    /// [`Object::index`].
    pub fn index(&self, key: &Value) -> Result<Value, Fault> {
        match (self, key) {
            (Self::Null, _) => Err(Fault::null_reference("Item")),
            (Self::Object(o), _) => o.index(key),
            (Self::Str(s), Self::Int(i)) => {
                let len = s.chars().count();
                usize::try_from(*i)
                    .ok()
                    .and_then(|pos| s.chars().nth(pos))
                    .map(|c| Self::Str(c.to_string().into()))
                    .ok_or_else(|| Fault::index_out_of_range(*i, len))
            }
            (other, _) => Err(Fault::missing_member(other.type_label(), "Item")),
        }
    }

    /// Release the wrapped object's resources if it is disposable.
    ///
    /// Returns whether anything was disposed.
    pub fn dispose(&self) -> bool {
        match self.as_object().and_then(|o| o.as_disposable()) {
            Some(d) => {
                d.dispose();
                true
            }
            None => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
            Self::Object(o) => o.hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Object(o) => write!(f, "{o:?}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::Object(o) => f.write_str(o.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Self::Str(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Self::Object(o)
    }
}

impl<T: Object> From<Arc<T>> for Value {
    fn from(o: Arc<T>) -> Self {
        Self::Object(ObjectRef::from_arc(o))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// Static type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Str,
    /// An object whose [`Object::type_name`] is the given name.
    Object(&'static str),
    /// Anything, including null.
    Any,
}

impl ValueType {
    /// The value a faulted or deferred node of this type reports.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Str | Self::Object(_) | Self::Any => Value::Null,
        }
    }

    #[must_use]
    pub fn is_nullable(self) -> bool {
        matches!(self, Self::Str | Self::Object(_) | Self::Any)
    }

    /// Whether `value` is a legal value of this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (ty, Value::Null) => ty.is_nullable(),
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Str, Value::Str(_)) => true,
            (Self::Object(name), Value::Object(o)) => o.type_name() == name,
            _ => false,
        }
    }

    /// Most specific type describing `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Any,
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::Int,
            Value::Float(_) => Self::Float,
            Value::Str(_) => Self::Str,
            Value::Object(o) => Self::Object(o.type_name()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Str => f.write_str("string"),
            Self::Object(name) => f.write_str(name),
            Self::Any => f.write_str("any"),
        }
    }
}

// ---------------------------------------------------------------------------
// FromValue
// ---------------------------------------------------------------------------

/// Conversion from a node's [`Value`] into a typed handle value.
pub trait FromValue: Sized + Default {
    /// Whether an expression of static type `ty` can be read as `Self`.
    fn accepts(ty: ValueType) -> bool;

    /// Convert, or `None` if the runtime value does not fit.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn accepts(_: ValueType) -> bool {
        true
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    fn accepts(ty: ValueType) -> bool {
        matches!(ty, ValueType::Bool | ValueType::Any)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    fn accepts(ty: ValueType) -> bool {
        matches!(ty, ValueType::Int | ValueType::Any)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }
}

impl FromValue for f64 {
    fn accepts(ty: ValueType) -> bool {
        matches!(ty, ValueType::Float | ValueType::Int | ValueType::Any)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    fn accepts(ty: ValueType) -> bool {
        matches!(ty, ValueType::Str | ValueType::Any)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(String::new()),
            Value::Str(s) => Some(s.to_string()),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn accepts(ty: ValueType) -> bool {
        T::accepts(ty)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}
