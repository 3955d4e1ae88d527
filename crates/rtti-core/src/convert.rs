//! Value conversion between registered types.
//!
//! Conversion order:
//!
//! 1. identical types copy,
//! 2. numeric values (numbers, bool, enums) go through [`Numeric`],
//! 3. text targets print the source,
//! 4. text sources are parsed by the target,
//! 5. the target's own [`TypeInfo::convert_from`](crate::TypeInfo::convert_from)
//!    (handle casts, class references).

use crate::meta_type::TypeFlags;
use crate::text::TextFlags;
use crate::type_info::Type;

/// A number read from or written to a value of a numeric type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Numeric {
    /// Value as `i64`, saturating at the bounds.
    pub fn to_i64(self) -> i64 {
        match self {
            Numeric::Signed(v) => v,
            Numeric::Unsigned(v) => v.min(i64::MAX as u64) as i64,
            Numeric::Float(v) => v as i64,
        }
    }

    /// Value as `u64`; negative values clamp to zero.
    pub fn to_u64(self) -> u64 {
        match self {
            Numeric::Signed(v) => v.max(0) as u64,
            Numeric::Unsigned(v) => v,
            Numeric::Float(v) => v as u64,
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Numeric::Signed(v) => v as f64,
            Numeric::Unsigned(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Numeric::Signed(v) => v == 0,
            Numeric::Unsigned(v) => v == 0,
            Numeric::Float(v) => v == 0.0,
        }
    }

    /// Integer value clamped into `[min, max]`.
    pub fn clamp_signed(self, min: i64, max: i64) -> i64 {
        self.to_i64().clamp(min, max)
    }

    /// Unsigned value clamped to `max`.
    pub fn clamp_unsigned(self, max: u64) -> u64 {
        self.to_u64().min(max)
    }
}

/// Convert the value at `src` into the value at `dest`.
///
/// Returns false when the types are unrelated; `dest` is left unchanged then.
///
/// # Safety
///
/// `src` and `dest` must point to constructed values of `src_type` and
/// `dest_type`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub unsafe fn convert_data(src: *const u8, src_type: &Type, dest: *mut u8, dest_type: &Type) -> bool {
    if src_type == dest_type {
        unsafe { dest_type.copy(dest, src) };
        return true;
    }

    if let Some(value) = unsafe { src_type.read_numeric(src) }
        && unsafe { dest_type.write_numeric(dest, value) }
    {
        return true;
    }

    if dest_type.traits().flags.contains(TypeFlags::TEXT) {
        let mut text = String::new();
        unsafe {
            src_type.print_to_text(&mut text, src, TextFlags::empty());
            *(dest as *mut String) = text;
        }
        return true;
    }

    if src_type.traits().flags.contains(TypeFlags::TEXT) {
        let text = unsafe { &*(src as *const String) };
        return unsafe { dest_type.parse_from_text(text, dest, TextFlags::empty()) };
    }

    unsafe { dest_type.convert_from(dest, src, src_type) }
}
