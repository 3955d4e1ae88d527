//! Meta type classification and memory traits of a type.

use bitflags::bitflags;
use std::fmt;
use std::mem::{align_of, needs_drop, size_of};

/// Broad classification of a type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaType {
    /// Primitive value: numbers, bool, char, string.
    Simple,
    /// Named integer options.
    Enum,
    /// Non-polymorphic class with reflected properties.
    Struct,
    /// Polymorphic class (object model classes).
    Class,
    /// Dynamic array `array<T>`.
    Array,
    /// Fixed size inline array `[N]T`.
    NativeArray,
    /// Owning object handle `strong<T>`.
    StrongHandle,
    /// Non-owning object handle `weak<T>`.
    WeakHandle,
    /// Reference to a class descriptor `class<T>`.
    ClassRef,
}

impl MetaType {
    /// Whether values of this meta type have reflected members.
    pub fn is_class_like(self) -> bool {
        matches!(self, MetaType::Struct | MetaType::Class)
    }

    /// Whether values of this meta type are element containers.
    pub fn is_array_like(self) -> bool {
        matches!(self, MetaType::Array | MetaType::NativeArray)
    }

    /// Whether values of this meta type point at objects.
    pub fn is_handle(self) -> bool {
        matches!(self, MetaType::StrongHandle | MetaType::WeakHandle)
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetaType::Simple => "simple",
            MetaType::Enum => "enum",
            MetaType::Struct => "struct",
            MetaType::Class => "class",
            MetaType::Array => "array",
            MetaType::NativeArray => "native array",
            MetaType::StrongHandle => "strong handle",
            MetaType::WeakHandle => "weak handle",
            MetaType::ClassRef => "class reference",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Memory behavior of a type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u16 {
        /// An all-zero buffer is a valid default value.
        const ZERO_INIT = 1 << 0;
        /// Values can be copied with memcpy.
        const TRIVIAL_COPY = 1 << 1;
        /// Values can be compared with memcmp.
        const TRIVIAL_COMPARE = 1 << 2;
        /// Values need no destruction.
        const TRIVIAL_DESTRUCT = 1 << 3;
        /// Values are stored as a Rust `String`; every type converts to and from it.
        const TEXT = 1 << 4;

        /// Plain old data.
        const POD = Self::ZERO_INIT.bits()
            | Self::TRIVIAL_COPY.bits()
            | Self::TRIVIAL_COMPARE.bits()
            | Self::TRIVIAL_DESTRUCT.bits();
    }
}

/// Layout and behavior summary of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTraits {
    pub meta_type: MetaType,
    pub size: usize,
    pub alignment: usize,
    pub flags: TypeFlags,
}

impl TypeTraits {
    /// Traits for a Rust type with size and alignment taken from `T`.
    pub fn value<T>(meta_type: MetaType) -> Self {
        let flags = if needs_drop::<T>() {
            TypeFlags::empty()
        } else {
            TypeFlags::TRIVIAL_DESTRUCT
        };
        Self {
            meta_type,
            size: size_of::<T>(),
            alignment: align_of::<T>(),
            flags,
        }
    }

    /// Traits for plain old data.
    pub fn pod<T: Copy>(meta_type: MetaType) -> Self {
        Self {
            meta_type,
            size: size_of::<T>(),
            alignment: align_of::<T>(),
            flags: TypeFlags::POD,
        }
    }

    /// Traits with explicit layout.
    pub const fn sized(meta_type: MetaType, size: usize, alignment: usize, flags: TypeFlags) -> Self {
        Self {
            meta_type,
            size,
            alignment,
            flags,
        }
    }

    /// Add flags.
    pub fn with_flags(mut self, flags: TypeFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Element stride inside arrays: `max(size, alignment)`.
    #[inline]
    pub fn stride(&self) -> usize {
        self.size.max(self.alignment)
    }

    /// A zero-filled buffer is a valid value and needs no destruction.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.flags
            .contains(TypeFlags::ZERO_INIT | TypeFlags::TRIVIAL_DESTRUCT)
    }
}
