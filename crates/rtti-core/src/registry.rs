//! TypeRegistry - the name-indexed store of every type descriptor.
//!
//! # Lifecycle
//!
//! 1. [`TypeRegistry::new`] registers the builtin simple types and installs the
//!    composite creators (`array<T>`, `[N]T`, `class<T>`).
//! 2. Classes, enums and other descriptors are added with
//!    [`register_type`](TypeRegistry::register_type). References between them
//!    stay unresolved at this point, so registration order does not matter.
//! 3. [`finish_bootstrap`](TypeRegistry::finish_bootstrap) resolves class bases,
//!    property types and alternative names. Types registered afterwards are
//!    resolved immediately.
//! 4. Composite types (`array<Mesh>`, `[4]float`) are created on first lookup
//!    and cached under their name.
//!
//! # Thread Safety
//!
//! Every category has its own `parking_lot::RwLock`. Creators run without any
//! lock held so they can look up their inner types recursively; when two
//! threads create the same composite concurrently, the first inserted
//! descriptor wins and the other is discarded.
//!
//! # Example
//!
//! ```
//! use rtti_core::{RegistryConfig, TypeRegistry};
//!
//! let registry = TypeRegistry::new(RegistryConfig::default());
//! registry.finish_bootstrap();
//!
//! let floats = registry.find_type("array<float>").unwrap();
//! assert_eq!(floats.inner_type().unwrap().name(), "float");
//! assert_eq!(registry.find_type("array<float>"), Some(floats));
//! ```

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{RegistrationError, fatal};
use crate::function::Function;
use crate::meta_type::MetaType;
use crate::metadata::ShortTypeName;
use crate::property::Property;
use crate::type_hash::TypeHash;
use crate::type_info::{Reflect, Type};
use crate::types::simple::builtin_types;
use crate::types::{ArrayCreator, ClassRefCreator, ClassType, NativeArrayCreator};

// ============================================================================
// Configuration
// ============================================================================

/// Registry behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Abort on duplicate registrations after bootstrap. When false the
    /// duplicate is logged and the existing type is returned.
    pub fatal_after_bootstrap: bool,
    /// Cache the result of unfiltered class enumerations per base class.
    pub memoize_class_enumeration: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fatal_after_bootstrap: true,
            memoize_class_enumeration: true,
        }
    }
}

impl RegistryConfig {
    pub fn with_fatal_after_bootstrap(mut self, fatal: bool) -> Self {
        self.fatal_after_bootstrap = fatal;
        self
    }

    pub fn with_class_enumeration_memo(mut self, memoize: bool) -> Self {
        self.memoize_class_enumeration = memoize;
        self
    }
}

// ============================================================================
// Creators
// ============================================================================

/// Strategy creating composite types from their name.
///
/// A creator is asked for every unknown name starting with its prefix. It
/// resolves inner types through the registry and returns `None` when the
/// name does not parse or an inner type is unknown.
pub trait TypeCreator: Send + Sync {
    fn prefix(&self) -> &str;

    fn create(&self, registry: &TypeRegistry, name: &str) -> Option<Type>;
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
struct TypeTable {
    by_name: FxHashMap<String, Type>,
    alternatives: FxHashMap<String, Type>,
    /// Registration order.
    all: Vec<Type>,
    classes: Vec<ClassType>,
}

impl TypeTable {
    fn lookup(&self, name: &str) -> Option<&Type> {
        self.by_name.get(name).or_else(|| self.alternatives.get(name))
    }

    /// Record the short name of `ty`, if it has one.
    fn add_alternative(&mut self, ty: &Type) -> Result<(), RegistrationError> {
        let Some(short) = ty.metadata().metadata::<ShortTypeName>() else {
            return Ok(());
        };
        let alias = short.name();
        if alias == ty.name() {
            return Ok(());
        }
        if let Some(existing) = self.lookup(alias) {
            if existing == ty {
                return Ok(());
            }
            return Err(RegistrationError::DuplicateAlternativeName {
                alias: alias.to_owned(),
                type_name: ty.name().to_owned(),
                existing: existing.name().to_owned(),
            });
        }
        self.alternatives.insert(alias.to_owned(), ty.clone());
        Ok(())
    }
}

/// Name-indexed store of type descriptors, functions and class properties.
pub struct TypeRegistry {
    config: RegistryConfig,
    this: Weak<TypeRegistry>,
    bootstrapped: AtomicBool,

    types: RwLock<TypeTable>,
    native: RwLock<FxHashMap<TypeId, Type>>,
    properties: RwLock<FxHashMap<TypeHash, Arc<Property>>>,
    functions: RwLock<FxHashMap<String, Arc<Function>>>,
    creators: RwLock<Vec<Arc<dyn TypeCreator>>>,
    class_memo: RwLock<FxHashMap<usize, Vec<ClassType>>>,
}

impl TypeRegistry {
    /// Create a registry holding the builtin types and creators.
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        let registry = Arc::new_cyclic(|this| Self {
            config,
            this: this.clone(),
            bootstrapped: AtomicBool::new(false),
            types: RwLock::new(TypeTable::default()),
            native: RwLock::new(FxHashMap::default()),
            properties: RwLock::new(FxHashMap::default()),
            functions: RwLock::new(FxHashMap::default()),
            creators: RwLock::new(Vec::new()),
            class_memo: RwLock::new(FxHashMap::default()),
        });

        for ty in builtin_types() {
            registry.register_type(ty);
        }
        registry.register_creator(ArrayCreator);
        registry.register_creator(NativeArrayCreator);
        registry.register_creator(ClassRefCreator);
        registry
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Weak reference for descriptors that need to look up types later.
    pub fn downgrade(&self) -> Weak<TypeRegistry> {
        self.this.clone()
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    /// Register a type. A name collision is fatal unless the registry is
    /// bootstrapped and configured to tolerate it. A tolerated collision on
    /// the short name registers the type without that name.
    pub fn register_type(&self, ty: Type) -> Type {
        let tolerant = self.is_bootstrapped() && !self.config.fatal_after_bootstrap;
        match self.insert_type(ty, tolerant) {
            Ok(ty) => ty,
            Err(RegistrationError::DuplicateType(name)) if tolerant => {
                log::error!("type '{name}' is already registered, keeping the existing one");
                match self.types.read().by_name.get(&name) {
                    Some(existing) => existing.clone(),
                    None => fatal(RegistrationError::DuplicateType(name)),
                }
            }
            Err(err) => fatal(err),
        }
    }

    /// Register a type, returning an error instead of aborting on collisions.
    pub fn try_register_type(&self, ty: Type) -> Result<Type, RegistrationError> {
        self.insert_type(ty, false)
    }

    fn insert_type(&self, ty: Type, skip_taken_alias: bool) -> Result<Type, RegistrationError> {
        let bootstrapped = self.is_bootstrapped();
        {
            let mut types = self.types.write();
            if types.by_name.contains_key(ty.name()) {
                return Err(RegistrationError::DuplicateType(ty.name().to_owned()));
            }
            if bootstrapped {
                match types.add_alternative(&ty) {
                    Err(err @ RegistrationError::DuplicateAlternativeName { .. })
                        if skip_taken_alias =>
                    {
                        log::error!("{err}, registering without it");
                    }
                    other => other?,
                }
            }
            types.by_name.insert(ty.name().to_owned(), ty.clone());
            types.all.push(ty.clone());
            if let Some(class) = ty.as_class() {
                types.classes.push(class);
            }
        }
        if let Some(id) = ty.native_type_id() {
            self.native.write().insert(id, ty.clone());
        }
        log::debug!("registered {} '{}'", ty.meta_type(), ty.name());

        if bootstrapped {
            self.resolve(&ty);
            if ty.meta_type().is_class_like() {
                self.class_memo.write().clear();
            }
        }
        Ok(ty)
    }

    /// Resolve deferred data of every registered type. Idempotent.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn finish_bootstrap(&self) {
        if self.bootstrapped.swap(true, Ordering::AcqRel) {
            return;
        }
        let all = self.types.read().all.clone();
        for ty in &all {
            self.resolve(ty);
        }
        {
            let mut types = self.types.write();
            for ty in &all {
                if let Err(err) = types.add_alternative(ty) {
                    fatal(err);
                }
            }
        }
        log::debug!("bootstrap finished with {} types", all.len());
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }

    fn resolve(&self, ty: &Type) {
        ty.cache_type_data(self);
        if let Some(class) = ty.as_class() {
            let mut properties = self.properties.write();
            for prop in class.local_properties() {
                properties.insert(prop.hash(), prop.clone());
            }
        }
    }

    /// Append a composite type creator.
    pub fn register_creator<C: TypeCreator + 'static>(&self, creator: C) {
        self.creators.write().push(Arc::new(creator));
    }

    pub fn register_global_function(&self, function: Function) -> Arc<Function> {
        let mut functions = self.functions.write();
        if functions.contains_key(function.name()) {
            fatal(RegistrationError::DuplicateFunction(function.name().to_owned()));
        }
        let function = Arc::new(function);
        functions.insert(function.name().to_owned(), function.clone());
        log::debug!("registered function {function:?}");
        function
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    /// Find a type by name or short name, creating composite types on demand.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn find_type(&self, name: &str) -> Option<Type> {
        if let Some(ty) = self.types.read().lookup(name) {
            return Some(ty.clone());
        }

        let creators = self.creators.read().clone();
        let created = creators
            .iter()
            .filter(|creator| name.starts_with(creator.prefix()))
            .find_map(|creator| creator.create(self, name))?;

        let canonical = created.name().to_owned();
        let ty = {
            let mut types = self.types.write();
            let ty = match types.by_name.get(&canonical) {
                Some(existing) => existing.clone(),
                None => {
                    types.by_name.insert(canonical.clone(), created.clone());
                    types.all.push(created.clone());
                    log::debug!("created {} '{canonical}'", created.meta_type());
                    created
                }
            };
            if canonical != name {
                types.alternatives.insert(name.to_owned(), ty.clone());
            }
            ty
        };
        if self.is_bootstrapped() {
            ty.cache_type_data(self);
        }
        Some(ty)
    }

    /// Type registered for the Rust type `T`.
    pub fn type_of<T: Reflect>(&self) -> Option<Type> {
        if let Some(ty) = self.native.read().get(&TypeId::of::<T>()) {
            return Some(ty.clone());
        }
        let ty = self.find_type(&T::type_name())?;
        self.native.write().insert(TypeId::of::<T>(), ty.clone());
        Some(ty)
    }

    pub fn find_class(&self, name: &str) -> Option<ClassType> {
        self.find_type(name)?.as_class()
    }

    /// Find an enum type; use [`Type::as_enum`] for its options.
    pub fn find_enum(&self, name: &str) -> Option<Type> {
        self.find_type(name)
            .filter(|ty| ty.meta_type() == MetaType::Enum)
    }

    pub fn find_property(&self, hash: TypeHash) -> Option<Arc<Property>> {
        self.properties.read().get(&hash).cloned()
    }

    pub fn find_global_function(&self, name: &str) -> Option<Arc<Function>> {
        self.functions.read().get(name).cloned()
    }

    // ==========================================================================
    // Class Enumeration
    // ==========================================================================

    /// Classes deriving from `base` (including `base` itself).
    ///
    /// Abstract classes are skipped unless `allow_abstract` is set. With
    /// `assign_indices` every returned class gets its position as user index.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn enum_classes(
        &self,
        base: &ClassType,
        filter: Option<&dyn Fn(&ClassType) -> bool>,
        allow_abstract: bool,
        assign_indices: bool,
    ) -> Vec<ClassType> {
        let memoizable = self.config.memoize_class_enumeration
            && filter.is_none()
            && !allow_abstract
            && !assign_indices;
        let key = base.as_type().addr();
        if memoizable && let Some(classes) = self.class_memo.read().get(&key) {
            return classes.clone();
        }

        let candidates = self.types.read().classes.clone();
        let mut result = Vec::new();
        for class in candidates {
            if !class.is_resolved() || !class.is(base) {
                continue;
            }
            if class.is_abstract() && !allow_abstract {
                continue;
            }
            if let Some(filter) = filter
                && !filter(&class)
            {
                continue;
            }
            if assign_indices {
                class.set_user_index(result.len() as u32);
            }
            result.push(class);
        }

        if memoizable {
            self.class_memo.write().insert(key, result.clone());
        }
        result
    }

    /// Non-abstract classes deriving from `base`.
    pub fn enum_derived_classes(&self, base: &ClassType) -> Vec<ClassType> {
        self.enum_classes(base, None, false, false)
    }

    /// Class named `name` that can be instantiated as a `base`.
    pub fn find_factory_class(&self, name: &str, base: &ClassType) -> Option<ClassType> {
        if name.is_empty() {
            log::warn!("no class name given for a '{}' factory", base.name());
            return None;
        }
        let Some(class) = self.find_class(name) else {
            log::warn!("unknown class '{name}'");
            return None;
        };
        if !class.is(base) {
            log::warn!("class '{name}' does not derive from '{}'", base.name());
            return None;
        }
        if class.is_abstract() {
            log::warn!("class '{name}' is abstract");
            return None;
        }
        Some(class)
    }

    // ==========================================================================
    // Introspection
    // ==========================================================================

    /// Every registered and created type in registration order.
    pub fn all_types(&self) -> Vec<Type> {
        self.types.read().all.clone()
    }

    pub fn type_count(&self) -> usize {
        self.types.read().all.len()
    }
}

impl Drop for TypeRegistry {
    fn drop(&mut self) {
        let table = std::mem::take(self.types.get_mut());
        for ty in table.all.iter().rev() {
            ty.release_type_data();
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_count())
            .field("bootstrapped", &self.is_bootstrapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassBuilder;
    use std::borrow::Cow;

    #[derive(Default, Clone, PartialEq)]
    struct Shape {
        sides: i32,
    }

    #[derive(Default, Clone, PartialEq)]
    #[repr(C)]
    struct Square {
        base: Shape,
        size: f32,
    }

    impl Reflect for Shape {
        fn type_name() -> Cow<'static, str> {
            Cow::Borrowed("Shape")
        }
    }

    impl Reflect for Square {
        fn type_name() -> Cow<'static, str> {
            Cow::Borrowed("Square")
        }
    }

    fn shapes(registry: &TypeRegistry) {
        registry.register_type(
            ClassBuilder::<Shape>::new()
                .property(crate::field!(Shape, sides))
                .build()
                .as_type(),
        );
        registry.register_type(
            ClassBuilder::<Square>::new()
                .constructible()
                .base::<Shape>()
                .short_name("Sq")
                .property(crate::field!(Square, size))
                .build()
                .as_type(),
        );
    }

    #[test]
    fn builtins_are_registered() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        for name in ["bool", "char", "int8", "int", "uint64", "double", "string"] {
            assert!(registry.find_type(name).is_some(), "{name}");
        }
        assert_eq!(registry.type_of::<f32>().unwrap().name(), "float");
        assert!(registry.find_type("Missing").is_none());
    }

    #[test]
    fn composites_are_cached() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let count = registry.type_count();
        let a = registry.find_type("array<[3]float>").unwrap();
        let b = registry.find_type("array<[3]float>").unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.type_count(), count + 2);
        assert!(registry.find_type("array<nothing>").is_none());
        assert!(registry.find_type("array<int").is_none());
    }

    #[test]
    fn classes_resolve_at_bootstrap() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        shapes(&registry);
        let square = registry.find_class("Square").unwrap();
        assert!(!square.is_resolved());

        registry.finish_bootstrap();
        registry.finish_bootstrap();
        assert!(square.is_resolved());
        assert_eq!(registry.find_class("Sq"), Some(square.clone()));
        assert_eq!(square.all_properties().len(), 2);
        let hash = TypeHash::from_property("Square", "size");
        assert_eq!(registry.find_property(hash).unwrap().name(), "size");
    }

    #[test]
    fn class_enumeration() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        shapes(&registry);
        registry.finish_bootstrap();
        let shape = registry.find_class("Shape").unwrap();
        let square = registry.find_class("Square").unwrap();

        assert_eq!(registry.enum_derived_classes(&shape), vec![square.clone()]);
        let all = registry.enum_classes(&shape, None, true, true);
        assert_eq!(all, vec![shape.clone(), square.clone()]);
        assert_eq!(square.user_index(), Some(1));

        assert_eq!(registry.find_factory_class("Square", &shape), Some(square));
        assert!(registry.find_factory_class("Shape", &shape).is_none());
        assert!(registry.find_factory_class("", &shape).is_none());
    }

    #[test]
    #[should_panic(expected = "type 'int' is already registered")]
    fn duplicate_registration_is_fatal() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        registry.register_type(Type::new(crate::types::SimpleType::<i32>::default()));
    }

    #[test]
    fn duplicate_after_bootstrap_can_be_tolerated() {
        let registry = TypeRegistry::new(RegistryConfig::default().with_fatal_after_bootstrap(false));
        registry.finish_bootstrap();
        let existing = registry.find_type("int").unwrap();
        let kept = registry.register_type(Type::new(crate::types::SimpleType::<i32>::default()));
        assert_eq!(kept, existing);

        let err = registry
            .try_register_type(Type::new(crate::types::SimpleType::<i32>::default()))
            .unwrap_err();
        assert_eq!(err, RegistrationError::DuplicateType("int".into()));
    }

    fn gear(name: &str) -> Type {
        ClassBuilder::raw(name, 4, 4)
            .short_name("Cog")
            .build()
            .as_type()
    }

    #[test]
    fn taken_short_name_after_bootstrap_can_be_tolerated() {
        let registry = TypeRegistry::new(RegistryConfig::default().with_fatal_after_bootstrap(false));
        let first = registry.register_type(gear("SpurGear"));
        registry.finish_bootstrap();

        let second = registry.register_type(gear("BevelGear"));
        assert_eq!(second.name(), "BevelGear");
        assert_eq!(registry.find_type("BevelGear"), Some(second));
        assert_eq!(registry.find_type("Cog"), Some(first));

        let err = registry.try_register_type(gear("WormGear")).unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateAlternativeName { .. }));
        assert!(registry.find_type("WormGear").is_none());
    }

    #[test]
    #[should_panic(expected = "alternative name 'Cog'")]
    fn taken_short_name_after_bootstrap_is_fatal_by_default() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        registry.register_type(gear("SpurGear"));
        registry.finish_bootstrap();
        registry.register_type(gear("BevelGear"));
    }
}
