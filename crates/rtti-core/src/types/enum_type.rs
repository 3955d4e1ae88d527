//! Enumerations: named integer options stored in 1, 2, 4 or 8 bytes.

use std::any::TypeId;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};

use crate::convert::Numeric;
use crate::error::{RegistrationError, StreamError, fatal};
use crate::meta_type::{MetaType, TypeFlags, TypeTraits};
use crate::metadata::{Metadata, MetadataContainer};
use crate::serialization::SerializationContext;
use crate::stream::{BinaryReader, BinaryWriter};
use crate::text::TextFlags;
use crate::type_info::{Reflect, TypeInfo};

/// One named value of an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumOption {
    pub name: String,
    pub value: i64,
}

/// Descriptor of an enum type.
#[derive(Debug)]
pub struct EnumType {
    name: String,
    traits: TypeTraits,
    metadata: MetadataContainer,
    native: Option<TypeId>,
    options: Vec<EnumOption>,
}

impl EnumType {
    pub fn options(&self) -> &[EnumOption] {
        &self.options
    }

    pub fn find_value(&self, name: &str) -> Option<i64> {
        self.options.iter().find(|o| o.name == name).map(|o| o.value)
    }

    pub fn find_name(&self, value: i64) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.name.as_str())
    }

    /// Stored value widened to `i64`.
    ///
    /// # Safety
    ///
    /// `data` must point to a value of this enum.
    pub unsafe fn read_raw(&self, data: *const u8) -> i64 {
        unsafe {
            match self.traits.size {
                1 => (data as *const i8).read_unaligned() as i64,
                2 => (data as *const i16).read_unaligned() as i64,
                4 => (data as *const i32).read_unaligned() as i64,
                _ => (data as *const i64).read_unaligned(),
            }
        }
    }

    /// # Safety
    ///
    /// `data` must point to a value of this enum and `value` must be one of its options.
    unsafe fn write_raw(&self, data: *mut u8, value: i64) {
        unsafe {
            match self.traits.size {
                1 => (data as *mut i8).write_unaligned(value as i8),
                2 => (data as *mut i16).write_unaligned(value as i16),
                4 => (data as *mut i32).write_unaligned(value as i32),
                _ => (data as *mut i64).write_unaligned(value),
            }
        }
    }

    /// Store `value` if it is a known option.
    unsafe fn set_checked(&self, data: *mut u8, value: i64) -> bool {
        if self.find_name(value).is_none() {
            return false;
        }
        unsafe { self.write_raw(data, value) };
        true
    }
}

impl TypeInfo for EnumType {
    fn name(&self) -> &str {
        &self.name
    }

    fn traits(&self) -> &TypeTraits {
        &self.traits
    }

    fn metadata(&self) -> &MetadataContainer {
        &self.metadata
    }

    fn native_type_id(&self) -> Option<TypeId> {
        self.native
    }

    unsafe fn construct(&self, data: *mut u8) {
        // options are never empty
        let first = self.options.first().map_or(0, |o| o.value);
        unsafe { self.write_raw(data, first) };
    }

    unsafe fn destruct(&self, _data: *mut u8) {}

    unsafe fn compare(&self, a: *const u8, b: *const u8) -> bool {
        unsafe { self.read_raw(a) == self.read_raw(b) }
    }

    unsafe fn copy(&self, dest: *mut u8, src: *const u8) {
        unsafe { std::ptr::copy_nonoverlapping(src, dest, self.traits.size) };
    }

    unsafe fn print_to_text(&self, out: &mut String, data: *const u8, _flags: TextFlags) {
        let value = unsafe { self.read_raw(data) };
        match self.find_name(value) {
            Some(name) => out.push_str(name),
            None => out.push_str(&value.to_string()),
        }
    }

    unsafe fn parse_from_text(&self, text: &str, data: *mut u8, _flags: TextFlags) -> bool {
        let text = text.trim();
        let value = match self.find_value(text) {
            Some(value) => value,
            None => match text.parse::<i64>() {
                Ok(value) => value,
                Err(_) => return false,
            },
        };
        unsafe { self.set_checked(data, value) }
    }

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
        let name = reader.read_str()?;
        if unsafe { self.parse_from_text(name, data, TextFlags::empty()) } {
            Ok(())
        } else {
            Err(StreamError::InvalidValue {
                type_name: self.name.clone(),
                detail: format!("unknown option '{name}'"),
            })
        }
    }

    unsafe fn read_numeric(&self, data: *const u8) -> Option<Numeric> {
        Some(Numeric::Signed(unsafe { self.read_raw(data) }))
    }

    unsafe fn write_numeric(&self, data: *mut u8, value: Numeric) -> bool {
        unsafe { self.set_checked(data, value.to_i64()) }
    }
}

/// Builder for [`EnumType`] from a fieldless Rust enum.
///
/// Options are recorded by reading the raw discriminant of each value, so `E`
/// must be a fieldless enum with a 1, 2, 4 or 8 byte representation.
pub struct EnumBuilder<E> {
    name: String,
    options: Vec<EnumOption>,
    metadata: MetadataContainer,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Reflect + Copy> EnumBuilder<E> {
    pub fn new() -> Self {
        let name = E::type_name().into_owned();
        if !matches!(size_of::<E>(), 1 | 2 | 4 | 8) {
            fatal(RegistrationError::UnsupportedEnumSize {
                name,
                size: size_of::<E>(),
            });
        }
        Self {
            name,
            options: Vec::new(),
            metadata: MetadataContainer::new(),
            _marker: PhantomData,
        }
    }

    pub fn option(mut self, name: &str, value: E) -> Self {
        let data = &value as *const E as *const u8;
        let raw = unsafe {
            match size_of::<E>() {
                1 => (data as *const i8).read_unaligned() as i64,
                2 => (data as *const i16).read_unaligned() as i64,
                4 => (data as *const i32).read_unaligned() as i64,
                _ => (data as *const i64).read_unaligned(),
            }
        };
        self.options.push(EnumOption {
            name: name.to_owned(),
            value: raw,
        });
        self
    }

    pub fn metadata<M: Metadata>(self, value: M) -> Self {
        self.metadata.attach(value);
        self
    }

    pub fn try_build(self) -> Result<EnumType, RegistrationError> {
        if self.options.is_empty() {
            return Err(RegistrationError::EmptyEnum(self.name));
        }
        Ok(EnumType {
            name: self.name,
            traits: TypeTraits::sized(
                MetaType::Enum,
                size_of::<E>(),
                align_of::<E>(),
                TypeFlags::TRIVIAL_COPY | TypeFlags::TRIVIAL_COMPARE | TypeFlags::TRIVIAL_DESTRUCT,
            ),
            metadata: self.metadata,
            native: Some(TypeId::of::<E>()),
            options: self.options,
        })
    }

    pub fn build(self) -> EnumType {
        match self.try_build() {
            Ok(ty) => ty,
            Err(err) => fatal(err),
        }
    }
}

impl<E: Reflect + Copy> Default for EnumBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
