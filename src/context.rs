//! Reflection context.
//!
//! A `Context` owns the type registry and the object model of one world.
//! Types are registered first; [`Context::seal`] then finishes the
//! bootstrap, resolving every base class and property type. Objects can be
//! created once the context is sealed.
//!
//! # Example
//!
//! ```
//! use rtti::prelude::*;
//!
//! #[derive(Default)]
//! struct Door {
//!     open: bool,
//! }
//! impl_reflect!(Door);
//! impl Object for Door {}
//!
//! let ctx = Context::new(ContextConfig::default());
//! ctx.register_class(
//!     ObjectClassBuilder::<Door>::new()
//!         .constructible()
//!         .property(field!(Door, open))
//!         .build(),
//! )
//! .unwrap();
//! ctx.seal();
//!
//! let door = ctx.create_object("Door").unwrap();
//! door.write_value("open", &true).unwrap();
//! assert!(door.read_value::<bool>("open").unwrap());
//! ```

use rtti_core::{ClassType, RegistrationError, RegistryConfig, Type, TypeRegistry};
use rtti_object::{ObjectConfig, ObjectContext, ObjectPtr};
use std::sync::Arc;
use thiserror::Error;

/// Configuration of both registries.
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    pub registry: RegistryConfig,
    pub objects: ObjectConfig,
}

/// Type registry plus object model.
pub struct Context {
    types: Arc<TypeRegistry>,
    objects: Arc<ObjectContext>,
}

impl Context {
    pub fn new(config: ContextConfig) -> Self {
        let types = TypeRegistry::new(config.registry);
        let objects = ObjectContext::new(types.clone(), config.objects);
        log::debug!("created context with {} builtin types", types.type_count());
        Self { types, objects }
    }

    /// Register a type. Before sealing it is resolved by [`seal`](Self::seal);
    /// afterwards it is resolved immediately.
    ///
    /// # Errors
    ///
    /// Returns the registration error when the name or short name is taken.
    pub fn register(&self, ty: Type) -> Result<Type, ContextError> {
        Ok(self.types.try_register_type(ty)?)
    }

    pub fn register_class(&self, class: ClassType) -> Result<ClassType, ContextError> {
        self.register(class.as_type())?;
        Ok(class)
    }

    /// Finish the bootstrap. Calling `seal()` again is a no-op.
    pub fn seal(&self) {
        self.types.finish_bootstrap();
    }

    pub fn is_sealed(&self) -> bool {
        self.types.is_bootstrapped()
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn objects(&self) -> &Arc<ObjectContext> {
        &self.objects
    }

    /// Create a default object of the class registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::NotSealed` before [`seal`](Self::seal), and
    /// `ContextError::CannotCreate` when `name` is not an instantiable
    /// object class.
    pub fn create_object(&self, name: &str) -> Result<ObjectPtr, ContextError> {
        if !self.is_sealed() {
            return Err(ContextError::NotSealed);
        }
        self.objects
            .create_named(name)
            .ok_or_else(|| ContextError::CannotCreate(name.to_owned()))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

/// Errors from context operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// Objects are created only after the context is sealed.
    #[error("context is not sealed")]
    NotSealed,

    #[error("cannot create an object of class '{0}'")]
    CannotCreate(String),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
