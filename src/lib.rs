//! Runtime type information and object model.
//!
//! - [`core`]: type descriptors, the type registry, codecs and data views
//! - [`object`]: reflected objects, handles and the weak object registry
//! - [`Context`]: one type registry plus its object model

pub mod context;

pub use rtti_core as core;
pub use rtti_object as object;

pub use context::{Context, ContextConfig, ContextError};

pub mod prelude {
    pub use crate::context::{Context, ContextConfig, ContextError};
    pub use rtti_core::{
        Array, ClassBuilder, ClassRef, ClassType, DataHolder, DataViewError, DataViewInfoFlags,
        DataViewRequestFlags, EnumBuilder, MetaType, PropertyIssue, PropertyIssueKind, Reflect,
        RegistryConfig, Type, TypeInfo, TypeRegistry, ValueRef, field, impl_reflect,
    };
    pub use rtti_object::{
        Handle, IObject, LoadError, Object, ObjectClassBuilder, ObjectConfig, ObjectContext,
        ObjectError, ObjectEvent, ObjectId, ObjectPtr, WeakHandle, clone_object, load_binary,
        load_xml_str, save_binary, save_xml_string,
    };
}
