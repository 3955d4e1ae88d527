//! Runtime type information core.
//!
//! This crate describes types at runtime: their layout, how to construct,
//! copy, compare and destroy values, how to print and parse them, and how to
//! store them in binary and XML form. Composite types (`array<T>`, `[N]T`,
//! `class<T>`) are created from their names on first lookup.
//!
//! ## Modules
//!
//! - [`registry`]: [`TypeRegistry`], the name-indexed store of all types
//! - [`type_info`]: the [`TypeInfo`] descriptor trait and the [`Type`] handle
//! - [`types`]: simple, enum, class, array and class reference descriptors
//! - [`property`]: reflected class members and the [`field!`] macro
//! - [`function`]: reflected global functions and methods
//! - [`metadata`]: typed tags attached to types and properties
//! - [`data_view`]: path-addressed access to nested values
//! - [`convert`]: conversions between unrelated types
//! - [`holder`]: [`DataHolder`], an owned value of any registered type
//! - [`text`], [`stream`], [`xml`]: value codecs
//!
//! # Example
//!
//! ```
//! use rtti_core::{ClassBuilder, DataHolder, RegistryConfig, TypeRegistry, field, impl_reflect};
//!
//! #[derive(Default, Clone, PartialEq)]
//! struct Vector3 {
//!     x: f32,
//!     y: f32,
//!     z: f32,
//! }
//! impl_reflect!(Vector3);
//!
//! let registry = TypeRegistry::new(RegistryConfig::default());
//! registry.register_type(
//!     ClassBuilder::<Vector3>::new()
//!         .constructible()
//!         .cloneable()
//!         .comparable()
//!         .property(field!(Vector3, x))
//!         .property(field!(Vector3, y))
//!         .property(field!(Vector3, z))
//!         .build()
//!         .as_type(),
//! );
//! registry.finish_bootstrap();
//!
//! let value = DataHolder::of(&registry, Vector3 { x: 1.0, y: 0.0, z: 2.5 }).unwrap();
//! assert_eq!(value.to_text(), "(x=1)(z=2.5)");
//! ```

pub mod convert;
pub mod data_view;
pub mod error;
pub mod function;
pub mod holder;
pub mod meta_type;
pub mod metadata;
pub mod property;
pub mod registry;
pub mod serialization;
pub mod stream;
pub mod text;
pub mod type_hash;
pub mod type_info;
pub mod types;
pub mod xml;

pub use convert::{Numeric, convert_data};
pub use data_view::{
    DataViewInfo, DataViewInfoFlags, DataViewMember, DataViewRequestFlags, ValueRef,
    describe_data_view, read_data_view, write_data_view,
};
pub use error::{
    CallError, DataViewError, DataViewResult, LifecycleError, RegistrationError, RttiError,
    StreamError, XmlError, fatal,
};
pub use function::{CallFrame, Function, FunctionBuilder, NativeFn};
pub use holder::DataHolder;
pub use meta_type::{MetaType, TypeFlags, TypeTraits};
pub use metadata::{Metadata, MetadataContainer};
pub use property::{Property, PropertyFlags, PropertySetup};
pub use registry::{RegistryConfig, TypeCreator, TypeRegistry};
pub use serialization::{PropertyIssue, PropertyIssueKind, SerializationContext};
pub use stream::{BinaryReader, BinaryWriter};
pub use text::TextFlags;
pub use type_hash::TypeHash;
pub use type_info::{AsAny, Reflect, Type, TypeInfo};
pub use types::{
    Array, ArrayType, ClassBuilder, ClassDescriptor, ClassRef, ClassRefType, ClassType,
    CompareOp, Construct, CopyOp, Destruct, EnumBuilder, EnumOption, EnumType, NativeArrayType,
    RawArray, SimpleType, SimpleValue, strip_template,
};
pub use xml::XmlNode;

/// Implement [`Reflect`] for a type, named after the type or explicitly.
///
/// ```
/// struct Mesh;
/// rtti_core::impl_reflect!(Mesh);
/// struct MeshLod;
/// rtti_core::impl_reflect!(MeshLod, "Mesh.Lod");
///
/// use rtti_core::Reflect;
/// assert_eq!(Mesh::type_name(), "Mesh");
/// assert_eq!(MeshLod::type_name(), "Mesh.Lod");
/// ```
#[macro_export]
macro_rules! impl_reflect {
    ($ty:ty) => {
        $crate::impl_reflect!($ty, stringify!($ty));
    };
    ($ty:ty, $name:expr) => {
        impl $crate::Reflect for $ty {
            fn type_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed($name)
            }
        }
    };
}
