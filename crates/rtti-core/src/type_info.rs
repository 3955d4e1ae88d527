//! The type descriptor interface and the shared [`Type`] handle.
//!
//! Every type known to the registry implements [`TypeInfo`]: simple values,
//! enums, classes and the composite types built from other type names. The
//! descriptor operates on untyped memory; callers guarantee that the pointers
//! they pass refer to properly aligned storage of the described type.
//!
//! # Safety contract
//!
//! All `unsafe` methods share the same contract:
//!
//! - `data`, `src`, `dest`, `a` and `b` point to storage of `traits().size`
//!   bytes aligned to `traits().alignment`,
//! - storage passed to [`construct`](TypeInfo::construct) is uninitialized,
//!   every other pointer refers to a constructed value of this type,
//! - `default` pointers may be null, meaning "no baseline value".

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::convert::Numeric;
use crate::data_view::DataViewInfo;
use crate::error::{DataViewError, DataViewResult, StreamError};
use crate::meta_type::{MetaType, TypeTraits};
use crate::metadata::MetadataContainer;
use crate::registry::TypeRegistry;
use crate::serialization::SerializationContext;
use crate::stream::{BinaryReader, BinaryWriter};
use crate::text::TextFlags;
use crate::types::{ClassType, EnumType};
use crate::xml::XmlNode;

/// Upcasting helpers for descriptor trait objects.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Static link between a Rust type and its registered type name.
///
/// Composite names are derived from the element names, so `Array<Vec<i32>>`
/// is not reflectable but `Array<Array<i32>>` is `array<array<int>>`.
pub trait Reflect: 'static {
    fn type_name() -> Cow<'static, str>;
}

/// Runtime descriptor of a type.
#[allow(clippy::missing_safety_doc)]
pub trait TypeInfo: AsAny {
    /// Registered name.
    fn name(&self) -> &str;

    /// Layout and memory behavior.
    fn traits(&self) -> &TypeTraits;

    fn metadata(&self) -> &MetadataContainer;

    fn meta_type(&self) -> MetaType {
        self.traits().meta_type
    }

    /// Element/pointee type for composite types.
    fn inner_type(&self) -> Option<Type> {
        None
    }

    /// Rust type this descriptor was built from, if any.
    fn native_type_id(&self) -> Option<TypeId> {
        None
    }

    /// Resolve references to other types. Called once the registry can answer lookups.
    fn cache_type_data(&self, _registry: &TypeRegistry) {}

    /// Drop cached data (default objects) before the registry goes away.
    fn release_type_data(&self) {}

    unsafe fn construct(&self, data: *mut u8);

    unsafe fn destruct(&self, data: *mut u8);

    unsafe fn compare(&self, a: *const u8, b: *const u8) -> bool;

    unsafe fn copy(&self, dest: *mut u8, src: *const u8);

    unsafe fn print_to_text(&self, out: &mut String, data: *const u8, flags: TextFlags);

    /// Parse the text form into `data`. On failure the value is left unchanged.
    unsafe fn parse_from_text(&self, text: &str, data: *mut u8, flags: TextFlags) -> bool;

    unsafe fn write_binary(
        &self,
        _ctx: &mut SerializationContext<'_>,
        writer: &mut BinaryWriter,
        data: *const u8,
        _default: *const u8,
    ) {
        let mut text = String::new();
        unsafe { self.print_to_text(&mut text, data, TextFlags::empty()) };
        writer.write_str(&text);
    }

    unsafe fn read_binary(
        &self,
        _ctx: &mut SerializationContext<'_>,
        reader: &mut BinaryReader<'_>,
        data: *mut u8,
    ) -> Result<(), StreamError> {
        let text = reader.read_str()?;
        if unsafe { self.parse_from_text(text, data, TextFlags::empty()) } {
            Ok(())
        } else {
            Err(StreamError::InvalidValue {
                type_name: self.name().to_owned(),
                detail: format!("cannot parse '{text}'"),
            })
        }
    }

    unsafe fn write_xml(
        &self,
        _ctx: &mut SerializationContext<'_>,
        node: &mut XmlNode,
        data: *const u8,
        _default: *const u8,
    ) {
        unsafe { self.print_to_text(&mut node.text, data, TextFlags::empty()) };
    }

    unsafe fn read_xml(
        &self,
        _ctx: &mut SerializationContext<'_>,
        node: &XmlNode,
        data: *mut u8,
    ) -> bool {
        unsafe { self.parse_from_text(&node.text, data, TextFlags::empty()) }
    }

    /// Numeric view of the value (numbers, bool, enums).
    unsafe fn read_numeric(&self, _data: *const u8) -> Option<Numeric> {
        None
    }

    /// Store a numeric value; false when the type has no numeric form or rejects the value.
    unsafe fn write_numeric(&self, _data: *mut u8, _value: Numeric) -> bool {
        false
    }

    /// Type specific conversion from another type (handle casts, class references).
    unsafe fn convert_from(&self, _dest: *mut u8, _src: *const u8, _src_type: &Type) -> bool {
        false
    }

    /// Describe the value at `path` (possibly empty) inside `data`.
    unsafe fn describe_view(
        &self,
        path: &str,
        _data: *const u8,
        _info: &mut DataViewInfo,
    ) -> DataViewResult {
        if path.is_empty() {
            Ok(())
        } else {
            Err(DataViewError::UnknownProperty(path.to_owned()))
        }
    }

    /// Read the member at non-empty `path` into `target`.
    unsafe fn read_view(
        &self,
        path: &str,
        _data: *const u8,
        _target: *mut u8,
        _target_type: &Type,
    ) -> DataViewResult {
        Err(DataViewError::UnknownProperty(path.to_owned()))
    }

    /// Write `source` into the member at non-empty `path`.
    unsafe fn write_view(
        &self,
        path: &str,
        _data: *mut u8,
        _source: *const u8,
        _source_type: &Type,
    ) -> DataViewResult {
        Err(DataViewError::UnknownProperty(path.to_owned()))
    }
}

/// Shared handle to a type descriptor. Two handles are equal when they refer
/// to the same descriptor.
#[derive(Clone)]
pub struct Type(Arc<dyn TypeInfo>);

impl Type {
    pub fn new<T: TypeInfo>(info: T) -> Self {
        Type(Arc::new(info))
    }

    pub fn from_arc(info: Arc<dyn TypeInfo>) -> Self {
        Type(info)
    }

    pub fn info(&self) -> &dyn TypeInfo {
        &*self.0
    }

    pub fn downcast_ref<T: TypeInfo>(&self) -> Option<&T> {
        AsAny::as_any(&*self.0).downcast_ref::<T>()
    }

    /// Class view of this type, for structs and classes.
    pub fn as_class(&self) -> Option<ClassType> {
        if !self.meta_type().is_class_like() {
            return None;
        }
        AsAny::into_any_arc(self.0.clone())
            .downcast()
            .ok()
            .map(ClassType::from_arc)
    }

    /// Enum view of this type.
    pub fn as_enum(&self) -> Option<&EnumType> {
        self.downcast_ref::<EnumType>()
    }

    /// Address of the descriptor; identifies the type.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether `info` is this very descriptor.
    pub fn is(&self, info: &dyn TypeInfo) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), info as *const dyn TypeInfo)
    }
}

impl Deref for Type {
    type Target = dyn TypeInfo;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.name())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
