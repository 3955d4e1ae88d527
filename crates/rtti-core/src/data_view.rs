//! Path-addressed access to nested values.
//!
//! A data path names a value inside another value: `.name` or `name` selects a
//! property, `[index]` an array element. Segments compose, so `points[2].x`
//! reads the `x` member of the third element of `points`.
//!
//! The free functions here handle the empty path (copy or convert) and
//! dispatch non-empty paths to the type's view hooks.

use bitflags::bitflags;
use std::sync::Arc;

use crate::convert::convert_data;
use crate::error::{DataViewError, DataViewResult};
use crate::metadata::Metadata;
use crate::text::TextFlags;
use crate::type_info::{Reflect, Type};
use crate::types::ClassType;

bitflags! {
    /// What a describe call should collect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DataViewRequestFlags: u8 {
        const MEMBER_LIST = 1 << 0;
        const PROPERTY_METADATA = 1 << 1;
        const OPTIONS = 1 << 2;
    }
}

bitflags! {
    /// Properties of a described value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DataViewInfoFlags: u16 {
        /// The value has named members.
        const LIKE_STRUCT = 1 << 0;
        /// The value has indexed elements.
        const LIKE_ARRAY = 1 << 1;
        /// The value is edited in place inside its parent.
        const INLINED = 1 << 2;
        const READ_ONLY = 1 << 3;
        /// The value is (or points to) an object.
        const OBJECT = 1 << 4;
        /// The value can be reset to its class default.
        const RESETTABLE = 1 << 5;
        const HANDLE = 1 << 6;
    }
}

/// A member reported by a describe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataViewMember {
    pub name: String,
    pub category: String,
}

/// Result of [`describe_data_view`].
#[derive(Debug, Clone, Default)]
pub struct DataViewInfo {
    pub request: DataViewRequestFlags,
    pub flags: DataViewInfoFlags,
    pub data_type: Option<Type>,
    pub members: Vec<DataViewMember>,
    pub metadata: Vec<Arc<dyn Metadata>>,
    pub array_size: Option<usize>,
    pub class_options: Vec<ClassType>,
    pub object_class: Option<ClassType>,
}

impl DataViewInfo {
    pub fn new(request: DataViewRequestFlags) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    pub fn member(&self, name: &str) -> Option<&DataViewMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Borrowed, typed view of a value about to be written.
#[derive(Clone, Copy)]
pub struct ValueRef<'a> {
    data: *const u8,
    ty: &'a Type,
}

impl<'a> ValueRef<'a> {
    /// # Safety
    ///
    /// `data` must point to a constructed value of `ty` that outlives the view.
    pub unsafe fn new(data: *const u8, ty: &'a Type) -> Self {
        Self { data, ty }
    }

    pub fn ty(&self) -> &'a Type {
        self.ty
    }

    pub fn data(&self) -> *const u8 {
        self.data
    }

    /// The value as `T`, if `T` is the value's registered type.
    pub fn get<T: Reflect>(&self) -> Option<&'a T> {
        if self.ty.name() == T::type_name() {
            // name match means the storage is a `T`
            Some(unsafe { &*(self.data as *const T) })
        } else {
            None
        }
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        unsafe { self.ty.print_to_text(&mut text, self.data, TextFlags::empty()) };
        text
    }
}

/// Consume a property name segment (`.name` or `name`) from the front of `path`.
pub fn parse_property_name<'a>(path: &mut &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix('.').unwrap_or(path);
    let len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    if len == 0 {
        return None;
    }
    let (name, remainder) = rest.split_at(len);
    *path = remainder;
    Some(name)
}

/// Consume an array index segment (`[n]`) from the front of `path`.
pub fn parse_array_index(path: &mut &str) -> Option<usize> {
    let body = path.strip_prefix('[')?;
    let end = body.find(']')?;
    let index = body[..end].trim().parse().ok()?;
    *path = &body[end + 1..];
    Some(index)
}

/// Describe the value at `path` inside `data`.
///
/// # Safety
///
/// `data` must point to a constructed value of `ty`.
pub unsafe fn describe_data_view(
    ty: &Type,
    path: &str,
    data: *const u8,
    info: &mut DataViewInfo,
) -> DataViewResult {
    if path.is_empty() {
        info.data_type = Some(ty.clone());
    }
    unsafe { ty.describe_view(path, data, info) }
}

/// Read the value at `path` inside `data` into `target`, converting as needed.
///
/// # Safety
///
/// `data` and `target` must point to constructed values of `ty` and `target_type`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub unsafe fn read_data_view(
    ty: &Type,
    path: &str,
    data: *const u8,
    target: *mut u8,
    target_type: &Type,
) -> DataViewResult {
    if !path.is_empty() {
        return unsafe { ty.read_view(path, data, target, target_type) };
    }
    if unsafe { convert_data(data, ty, target, target_type) } {
        Ok(())
    } else {
        Err(DataViewError::TypeConversion {
            from: ty.name().to_owned(),
            to: target_type.name().to_owned(),
        })
    }
}

/// Write `source` into the value at `path` inside `data`, converting as needed.
///
/// # Safety
///
/// `data` and `source` must point to constructed values of `ty` and `source_type`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub unsafe fn write_data_view(
    ty: &Type,
    path: &str,
    data: *mut u8,
    source: *const u8,
    source_type: &Type,
) -> DataViewResult {
    if !path.is_empty() {
        return unsafe { ty.write_view(path, data, source, source_type) };
    }
    if unsafe { convert_data(source, source_type, data, ty) } {
        Ok(())
    } else {
        Err(DataViewError::TypeConversion {
            from: source_type.name().to_owned(),
            to: ty.name().to_owned(),
        })
    }
}
