//! Primitive value types: numbers, bool, char and string.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::marker::PhantomData;

use crate::convert::Numeric;
use crate::error::StreamError;
use crate::meta_type::{MetaType, TypeFlags, TypeTraits};
use crate::metadata::MetadataContainer;
use crate::serialization::SerializationContext;
use crate::stream::{BinaryReader, BinaryWriter};
use crate::text::{TextFlags, parse_string, print_string};
use crate::type_info::{Reflect, Type, TypeInfo};

/// A Rust value type usable as a simple reflected type.
pub trait SimpleValue: Reflect + Default + Clone + PartialEq + Send + Sync {
    const FLAGS: TypeFlags;

    fn print(&self, out: &mut String, flags: TextFlags);

    fn parse(text: &str) -> Option<Self>;

    fn write(&self, writer: &mut BinaryWriter);

    fn read(reader: &mut BinaryReader<'_>) -> Result<Self, StreamError>;

    fn to_numeric(&self) -> Option<Numeric> {
        None
    }

    fn from_numeric(_value: Numeric) -> Option<Self> {
        None
    }
}

macro_rules! signed_value {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn type_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }
            }

            impl SimpleValue for $ty {
                const FLAGS: TypeFlags = TypeFlags::POD;

                fn print(&self, out: &mut String, _flags: TextFlags) {
                    let _ = write!(out, "{self}");
                }

                fn parse(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }

                fn write(&self, writer: &mut BinaryWriter) {
                    writer.write_raw(&self.to_le_bytes());
                }

                fn read(reader: &mut BinaryReader<'_>) -> Result<Self, StreamError> {
                    Ok(<$ty>::from_le_bytes(reader.read_array()?))
                }

                fn to_numeric(&self) -> Option<Numeric> {
                    Some(Numeric::Signed(*self as i64))
                }

                fn from_numeric(value: Numeric) -> Option<Self> {
                    Some(value.clamp_signed(<$ty>::MIN as i64, <$ty>::MAX as i64) as $ty)
                }
            }
        )*
    };
}

macro_rules! unsigned_value {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn type_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }
            }

            impl SimpleValue for $ty {
                const FLAGS: TypeFlags = TypeFlags::POD;

                fn print(&self, out: &mut String, _flags: TextFlags) {
                    let _ = write!(out, "{self}");
                }

                fn parse(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }

                fn write(&self, writer: &mut BinaryWriter) {
                    writer.write_raw(&self.to_le_bytes());
                }

                fn read(reader: &mut BinaryReader<'_>) -> Result<Self, StreamError> {
                    Ok(<$ty>::from_le_bytes(reader.read_array()?))
                }

                fn to_numeric(&self) -> Option<Numeric> {
                    Some(Numeric::Unsigned(*self as u64))
                }

                fn from_numeric(value: Numeric) -> Option<Self> {
                    Some(value.clamp_unsigned(<$ty>::MAX as u64) as $ty)
                }
            }
        )*
    };
}

macro_rules! float_value {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn type_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }
            }

            impl SimpleValue for $ty {
                const FLAGS: TypeFlags = TypeFlags::POD;

                fn print(&self, out: &mut String, _flags: TextFlags) {
                    let _ = write!(out, "{self}");
                }

                fn parse(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }

                fn write(&self, writer: &mut BinaryWriter) {
                    writer.write_raw(&self.to_le_bytes());
                }

                fn read(reader: &mut BinaryReader<'_>) -> Result<Self, StreamError> {
                    Ok(<$ty>::from_le_bytes(reader.read_array()?))
                }

                fn to_numeric(&self) -> Option<Numeric> {
                    Some(Numeric::Float(*self as f64))
                }

                fn from_numeric(value: Numeric) -> Option<Self> {
                    Some(value.to_f64() as $ty)
                }
            }
        )*
    };
}

signed_value! {
    i8 => "int8",
    i16 => "int16",
    i32 => "int",
    i64 => "int64",
}

unsigned_value! {
    u8 => "uint8",
    u16 => "uint16",
    u32 => "uint",
    u64 => "uint64",
}

float_value! {
    f32 => "float",
    f64 => "double",
}

impl Reflect for bool {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("bool")
    }
}

impl SimpleValue for bool {
    const FLAGS: TypeFlags = TypeFlags::POD;

    fn print(&self, out: &mut String, _flags: TextFlags) {
        out.push_str(if *self { "true" } else { "false" });
    }

    fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    fn write(&self, writer: &mut BinaryWriter) {
        writer.write_bool(*self);
    }

    fn read(reader: &mut BinaryReader<'_>) -> Result<Self, StreamError> {
        reader.read_bool()
    }

    fn to_numeric(&self) -> Option<Numeric> {
        Some(Numeric::Unsigned(*self as u64))
    }

    fn from_numeric(value: Numeric) -> Option<Self> {
        Some(!value.is_zero())
    }
}

impl Reflect for char {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("char")
    }
}

impl SimpleValue for char {
    const FLAGS: TypeFlags = TypeFlags::POD;

    fn print(&self, out: &mut String, flags: TextFlags) {
        let mut buf = [0u8; 4];
        print_string(out, self.encode_utf8(&mut buf), flags);
    }

    fn parse(text: &str) -> Option<Self> {
        let text = parse_string(text)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => Some(ch),
            (None, None) => Some('\0'),
            _ => None,
        }
    }

    fn write(&self, writer: &mut BinaryWriter) {
        writer.write_u32(*self as u32);
    }

    fn read(reader: &mut BinaryReader<'_>) -> Result<Self, StreamError> {
        let code = reader.read_u32()?;
        char::from_u32(code).ok_or_else(|| StreamError::InvalidValue {
            type_name: "char".to_owned(),
            detail: format!("invalid code point {code:#x}"),
        })
    }

    fn to_numeric(&self) -> Option<Numeric> {
        Some(Numeric::Unsigned(*self as u64))
    }

    fn from_numeric(value: Numeric) -> Option<Self> {
        char::from_u32(value.clamp_unsigned(u32::MAX as u64) as u32)
    }
}

impl Reflect for String {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("string")
    }
}

impl SimpleValue for String {
    const FLAGS: TypeFlags = TypeFlags::TEXT;

    fn print(&self, out: &mut String, flags: TextFlags) {
        print_string(out, self, flags);
    }

    fn parse(text: &str) -> Option<Self> {
        parse_string(text)
    }

    fn write(&self, writer: &mut BinaryWriter) {
        writer.write_str(self);
    }

    fn read(reader: &mut BinaryReader<'_>) -> Result<Self, StreamError> {
        reader.read_str().map(str::to_owned)
    }
}

/// Descriptor of a [`SimpleValue`] type.
pub struct SimpleType<T> {
    name: String,
    traits: TypeTraits,
    metadata: MetadataContainer,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SimpleValue> SimpleType<T> {
    pub fn new() -> Self {
        Self {
            name: T::type_name().into_owned(),
            traits: TypeTraits::value::<T>(MetaType::Simple).with_flags(T::FLAGS),
            metadata: MetadataContainer::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: SimpleValue> Default for SimpleType<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SimpleValue> TypeInfo for SimpleType<T> {
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
        Some(TypeId::of::<T>())
    }

    unsafe fn construct(&self, data: *mut u8) {
        unsafe { (data as *mut T).write(T::default()) };
    }

    unsafe fn destruct(&self, data: *mut u8) {
        unsafe { std::ptr::drop_in_place(data as *mut T) };
    }

    unsafe fn compare(&self, a: *const u8, b: *const u8) -> bool {
        unsafe { *(a as *const T) == *(b as *const T) }
    }

    unsafe fn copy(&self, dest: *mut u8, src: *const u8) {
        unsafe { (*(dest as *mut T)).clone_from(&*(src as *const T)) };
    }

    unsafe fn print_to_text(&self, out: &mut String, data: *const u8, flags: TextFlags) {
        unsafe { (*(data as *const T)).print(out, flags) };
    }

    unsafe fn parse_from_text(&self, text: &str, data: *mut u8, _flags: TextFlags) -> bool {
        match T::parse(text) {
            Some(value) => {
                unsafe { *(data as *mut T) = value };
                true
            }
            None => false,
        }
    }

    unsafe fn write_binary(
        &self,
        _ctx: &mut SerializationContext<'_>,
        writer: &mut BinaryWriter,
        data: *const u8,
        _default: *const u8,
    ) {
        unsafe { (*(data as *const T)).write(writer) };
    }

    unsafe fn read_binary(
        &self,
        _ctx: &mut SerializationContext<'_>,
        reader: &mut BinaryReader<'_>,
        data: *mut u8,
    ) -> Result<(), StreamError> {
        let value = T::read(reader)?;
        unsafe { *(data as *mut T) = value };
        Ok(())
    }

    unsafe fn read_numeric(&self, data: *const u8) -> Option<Numeric> {
        unsafe { (*(data as *const T)).to_numeric() }
    }

    unsafe fn write_numeric(&self, data: *mut u8, value: Numeric) -> bool {
        match T::from_numeric(value) {
            Some(value) => {
                unsafe { *(data as *mut T) = value };
                true
            }
            None => false,
        }
    }
}

/// Descriptors of all builtin simple types.
pub(crate) fn builtin_types() -> Vec<Type> {
    vec![
        Type::new(SimpleType::<bool>::new()),
        Type::new(SimpleType::<char>::new()),
        Type::new(SimpleType::<i8>::new()),
        Type::new(SimpleType::<i16>::new()),
        Type::new(SimpleType::<i32>::new()),
        Type::new(SimpleType::<i64>::new()),
        Type::new(SimpleType::<u8>::new()),
        Type::new(SimpleType::<u16>::new()),
        Type::new(SimpleType::<u32>::new()),
        Type::new(SimpleType::<u64>::new()),
        Type::new(SimpleType::<f32>::new()),
        Type::new(SimpleType::<f64>::new()),
        Type::new(SimpleType::<String>::new()),
    ]
}
