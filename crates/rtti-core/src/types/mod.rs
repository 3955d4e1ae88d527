//! Concrete type descriptors.

pub mod class;
pub mod class_ref;
pub mod dynamic_array;
pub mod enum_type;
pub mod native_array;
pub mod simple;

pub use class::{ClassBuilder, ClassDescriptor, ClassType, CompareOp, Construct, CopyOp, Destruct};
pub use class_ref::{ClassRef, ClassRefCreator, ClassRefType};
pub use dynamic_array::{Array, ArrayCreator, ArrayType, RawArray};
pub use enum_type::{EnumBuilder, EnumOption, EnumType};
pub use native_array::{NativeArrayCreator, NativeArrayType};
pub use simple::{SimpleType, SimpleValue};

/// Inner name of `prefix<inner>`, requiring balanced angle brackets.
pub fn strip_template<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let inner = name.strip_prefix(prefix)?.strip_prefix('<')?.strip_suffix('>')?;
    let mut depth = 0usize;
    for ch in inner.chars() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            _ => {}
        }
    }
    (depth == 0 && !inner.is_empty()).then_some(inner)
}
