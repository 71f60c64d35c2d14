#![forbid(unsafe_code)]

//! Value-disposal options for active expressions.
//!
//! # Design
//!
//! [`ActiveOptions`] starts as a mutable draft. The first time it is used to
//! create a node or root it is frozen: the draft is copied into a
//! [`OnceLock`] snapshot and every later read goes to the snapshot without
//! locking. Mutators check the frozen flag under the draft's write lock, so a
//! mutation either lands in the snapshot or is rejected with
//! [`OptionsError::Frozen`].
//!
//! Options take part in intern keys by identity: two `Arc<ActiveOptions>`
//! with the same settings still produce separate node graphs.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use tracing::warn;

use crate::descriptor::{Constructor, DescriptorId, Indexer, Member, Method};
use crate::error::OptionsError;

#[derive(Debug, Clone, Default)]
struct Settings {
    members: FxHashSet<DescriptorId>,
    methods: FxHashSet<DescriptorId>,
    indexers: FxHashSet<DescriptorId>,
    constructors: FxHashSet<DescriptorId>,
    dispose_constructed_objects: bool,
    dispose_static_method_return_values: bool,
}

/// Which computed values an active node owns and must dispose.
#[derive(Default)]
pub struct ActiveOptions {
    draft: RwLock<Settings>,
    frozen: OnceLock<Settings>,
}

impl fmt::Debug for ActiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_settings(|s| {
            f.debug_struct("ActiveOptions")
                .field("frozen", &self.is_frozen())
                .field("members", &s.members.len())
                .field("methods", &s.methods.len())
                .field("indexers", &s.indexers.len())
                .field("constructors", &s.constructors.len())
                .field("dispose_constructed_objects", &s.dispose_constructed_objects)
                .field(
                    "dispose_static_method_return_values",
                    &s.dispose_static_method_return_values,
                )
                .finish()
        })
    }
}

impl ActiveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ---- builder helpers ----

    /// Dispose values read through `member` when superseded or on teardown.
    #[must_use]
    pub fn with_member_disposal(self, member: &Member) -> Self {
        self.build(|s| s.members.insert(member.id()))
    }

    #[must_use]
    pub fn with_method_disposal(self, method: &Method) -> Self {
        self.build(|s| s.methods.insert(method.id()))
    }

    #[must_use]
    pub fn with_indexer_disposal(self, indexer: &Indexer) -> Self {
        self.build(|s| s.indexers.insert(indexer.id()))
    }

    #[must_use]
    pub fn with_constructor_disposal(self, constructor: &Constructor) -> Self {
        self.build(|s| s.constructors.insert(constructor.id()))
    }

    #[must_use]
    pub fn with_dispose_constructed_objects(self, enabled: bool) -> Self {
        self.build(|s| s.dispose_constructed_objects = enabled)
    }

    #[must_use]
    pub fn with_dispose_static_method_return_values(self, enabled: bool) -> Self {
        self.build(|s| s.dispose_static_method_return_values = enabled)
    }

    fn build<R>(self, f: impl FnOnce(&mut Settings) -> R) -> Self {
        let applied = self.mutate(f).is_ok();
        if !applied {
            warn!("ignoring builder call on frozen ActiveOptions");
        }
        debug_assert!(applied, "builder call on frozen ActiveOptions");
        self
    }

    // ---- mutators ----

    pub fn add_member_disposal(&self, member: &Member) -> Result<(), OptionsError> {
        self.mutate(|s| s.members.insert(member.id())).map(drop)
    }

    pub fn add_method_disposal(&self, method: &Method) -> Result<(), OptionsError> {
        self.mutate(|s| s.methods.insert(method.id())).map(drop)
    }

    pub fn add_indexer_disposal(&self, indexer: &Indexer) -> Result<(), OptionsError> {
        self.mutate(|s| s.indexers.insert(indexer.id())).map(drop)
    }

    pub fn add_constructor_disposal(&self, constructor: &Constructor) -> Result<(), OptionsError> {
        self.mutate(|s| s.constructors.insert(constructor.id())).map(drop)
    }

    pub fn set_dispose_constructed_objects(&self, enabled: bool) -> Result<(), OptionsError> {
        self.mutate(|s| s.dispose_constructed_objects = enabled)
    }

    pub fn set_dispose_static_method_return_values(
        &self,
        enabled: bool,
    ) -> Result<(), OptionsError> {
        self.mutate(|s| s.dispose_static_method_return_values = enabled)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> Result<R, OptionsError> {
        let mut draft = self.draft.write();
        if self.is_frozen() {
            return Err(OptionsError::Frozen);
        }
        Ok(f(&mut draft))
    }

    // ---- freezing ----

    /// Make the options immutable. Idempotent.
    pub fn freeze(&self) {
        self.frozen.get_or_init(|| self.draft.read().clone());
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    // ---- queries ----

    fn with_settings<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        match self.frozen.get() {
            Some(settings) => f(settings),
            None => f(&self.draft.read()),
        }
    }

    #[must_use]
    pub fn is_member_disposal(&self, member: &Member) -> bool {
        self.with_settings(|s| s.members.contains(&member.id()))
    }

    /// Whether `method`'s return value is owned, including the blanket
    /// static-method flag.
    #[must_use]
    pub fn is_method_disposal(&self, method: &Method) -> bool {
        self.with_settings(|s| {
            s.methods.contains(&method.id())
                || (method.is_static() && s.dispose_static_method_return_values)
        })
    }

    #[must_use]
    pub fn is_indexer_disposal(&self, indexer: &Indexer) -> bool {
        self.with_settings(|s| s.indexers.contains(&indexer.id()))
    }

    /// Whether `constructor`'s result is owned, including the blanket
    /// constructed-objects flag.
    #[must_use]
    pub fn is_constructor_disposal(&self, constructor: &Constructor) -> bool {
        self.with_settings(|s| {
            s.dispose_constructed_objects || s.constructors.contains(&constructor.id())
        })
    }

    #[must_use]
    pub fn dispose_constructed_objects(&self) -> bool {
        self.with_settings(|s| s.dispose_constructed_objects)
    }

    #[must_use]
    pub fn dispose_static_method_return_values(&self) -> bool {
        self.with_settings(|s| s.dispose_static_method_return_values)
    }
}

/// Intern-key view of shared options: equality and hash by identity.
#[derive(Clone)]
pub(crate) struct OptionsKey(pub(crate) Arc<ActiveOptions>);

impl OptionsKey {
    pub(crate) fn of(options: Option<&Arc<ActiveOptions>>) -> Option<Self> {
        options.map(|o| Self(Arc::clone(o)))
    }
}

impl PartialEq for OptionsKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for OptionsKey {}

impl Hash for OptionsKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for OptionsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OptionsKey({:p})", Arc::as_ptr(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livex_core::{Value, ValueType};

    fn member() -> Member {
        Member::new("Thing", ValueType::Any, |_| Ok(Value::Null))
    }

    #[test]
    fn builder_registers_descriptors() {
        let m = member();
        let options = ActiveOptions::new().with_member_disposal(&m);
        assert!(options.is_member_disposal(&m));
        assert!(!options.is_member_disposal(&member()));
    }

    #[test]
    fn frozen_options_reject_mutation() {
        let options = ActiveOptions::new();
        options.set_dispose_constructed_objects(true).unwrap();
        options.freeze();
        options.freeze();
        assert!(options.is_frozen());
        assert_eq!(
            options.add_member_disposal(&member()),
            Err(OptionsError::Frozen)
        );
        assert_eq!(
            options.set_dispose_constructed_objects(false),
            Err(OptionsError::Frozen)
        );
        assert!(options.dispose_constructed_objects());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "frozen ActiveOptions"))]
    fn builder_on_frozen_options_is_ignored() {
        let m = member();
        let options = ActiveOptions::new();
        options.freeze();
        let options = options.with_member_disposal(&m);
        assert!(!options.is_member_disposal(&m));
    }

    #[test]
    fn blanket_flags() {
        let ctor = Constructor::new("Thing", ValueType::Any, |_| Ok(Value::Null));
        let stat = Method::static_fn("Make", ValueType::Any, |_| Ok(Value::Null));
        let inst = Method::instance("Make", ValueType::Any, |_, _| Ok(Value::Null));

        let options = ActiveOptions::new()
            .with_dispose_constructed_objects(true)
            .with_dispose_static_method_return_values(true);
        assert!(options.is_constructor_disposal(&ctor));
        assert!(options.is_method_disposal(&stat));
        assert!(!options.is_method_disposal(&inst));
    }

    #[test]
    fn keys_compare_by_identity() {
        let a = Arc::new(ActiveOptions::new());
        let b = Arc::new(ActiveOptions::new());
        assert_eq!(OptionsKey::of(Some(&a)), OptionsKey::of(Some(&a)));
        assert_ne!(OptionsKey::of(Some(&a)), OptionsKey::of(Some(&b)));
        assert_eq!(OptionsKey::of(None), None);
    }
}
