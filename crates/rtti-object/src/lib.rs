//! Object model on top of `rtti-core`.
//!
//! Objects are Rust values whose class derives from `IObject`. They are
//! registered in a weak registry under generation-checked ids, can have a
//! parent, track a modified flag, notify listeners of changes and persist
//! to XML or binary together with the child objects they own.
//!
//! # Example
//!
//! ```
//! use rtti_core::{RegistryConfig, TypeRegistry, field, impl_reflect};
//! use rtti_object::{Object, ObjectClassBuilder, ObjectConfig, ObjectContext};
//!
//! #[derive(Default)]
//! struct Lamp {
//!     power: f32,
//! }
//! impl_reflect!(Lamp);
//! impl Object for Lamp {}
//!
//! let types = TypeRegistry::new(RegistryConfig::default());
//! let context = ObjectContext::new(types.clone(), ObjectConfig::default());
//! types.register_type(
//!     ObjectClassBuilder::<Lamp>::new()
//!         .constructible()
//!         .property(field!(Lamp, power))
//!         .build()
//!         .as_type(),
//! );
//! types.finish_bootstrap();
//!
//! let lamp = context.create_named("Lamp").unwrap();
//! lamp.write_value("power", &60.0f32).unwrap();
//! assert!(lamp.is_modified());
//! assert_eq!(rtti_object::save_xml_string(&lamp), r#"<object class="Lamp"><power>60</power></object>"#);
//! ```

pub mod class;
pub mod context;
pub mod error;
pub mod events;
pub mod handle;
pub mod object;
pub mod registry;
pub mod serialization;

pub use class::{IObject, ObjectClassBuilder, ObjectClassInfo, ObjectFactory, is_object_class};
pub use context::ObjectContext;
pub use error::{LoadError, ObjectError};
pub use events::{EventDispatcher, EventKey, ListenerId, ObjectEvent};
pub use handle::{Handle, HandleCreator, HandleType, WeakHandle};
pub use object::{Object, ObjectCell, ObjectPtr};
pub use registry::{ObjectConfig, ObjectId, ObjectRegistry};
pub use serialization::{
    clone_object, load_binary, load_xml, load_xml_str, save_binary, save_xml, save_xml_string,
};
