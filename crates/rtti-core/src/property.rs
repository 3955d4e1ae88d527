//! Reflected class members.
//!
//! Properties are declared with [`field!`](crate::field), which captures the
//! member name, its byte offset and the registered name of its Rust type:
//!
//! ```ignore
//! ClassBuilder::<Mesh>::new()
//!     .property(field!(Mesh, name).editable().comment("Display name"))
//!     .property(field!(Mesh, cache).transient())
//! ```

use bitflags::bitflags;
use std::fmt;
use std::mem::size_of;
use std::sync::OnceLock;

use crate::error::{LifecycleError, RegistrationError, fatal};
use crate::metadata::{Comment, Metadata, MetadataContainer, Range};
use crate::registry::TypeRegistry;
use crate::type_hash::TypeHash;
use crate::type_info::{Reflect, Type};

bitflags! {
    /// Behavior flags of a property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFlags: u16 {
        /// Shown to editors and listed by describe calls.
        const EDITABLE = 1 << 0;
        /// Rejects writes through data views.
        const READ_ONLY = 1 << 1;
        /// Never serialized.
        const TRANSIENT = 1 << 2;
        /// Edited in place inside the owner.
        const INLINED = 1 << 3;
        const SCRIPT_HIDDEN = 1 << 4;
        /// May be overridden per instance.
        const OVERRIDABLE = 1 << 5;
        /// Editors offer no reset to the class default.
        const NO_RESET_TO_DEFAULT = 1 << 6;
    }
}

/// A member of a class: name, frozen offset and (lazily resolved) type.
pub struct Property {
    name: String,
    category: String,
    offset: usize,
    type_name: String,
    field_size: Option<usize>,
    ty: OnceLock<Type>,
    flags: PropertyFlags,
    metadata: MetadataContainer,
    owner: String,
    hash: TypeHash,
}

impl Property {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Byte offset inside the owning class.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Resolved type. Asking before the registry resolved the owner is fatal.
    pub fn ty(&self) -> &Type {
        match self.ty.get() {
            Some(ty) => ty,
            None => fatal(LifecycleError::UnresolvedProperty {
                class: self.owner.clone(),
                property: self.name.clone(),
            }),
        }
    }

    pub fn try_ty(&self) -> Option<&Type> {
        self.ty.get()
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn is_editable(&self) -> bool {
        self.flags.contains(PropertyFlags::EDITABLE)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(PropertyFlags::READ_ONLY)
    }

    pub fn is_transient(&self) -> bool {
        self.flags.contains(PropertyFlags::TRANSIENT)
    }

    pub fn is_inlined(&self) -> bool {
        self.flags.contains(PropertyFlags::INLINED)
    }

    pub fn metadata(&self) -> &MetadataContainer {
        &self.metadata
    }

    /// Name of the class declaring this property.
    pub fn owner_name(&self) -> &str {
        &self.owner
    }

    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    /// Address of this property inside the object at `object`.
    ///
    /// # Safety
    ///
    /// `object` must point to an instance of the owning class (or a derived one).
    #[inline]
    pub unsafe fn data_ptr(&self, object: *const u8) -> *const u8 {
        unsafe { object.add(self.offset) }
    }

    /// Mutable variant of [`data_ptr`](Self::data_ptr).
    ///
    /// # Safety
    ///
    /// Same as [`data_ptr`](Self::data_ptr).
    #[inline]
    pub unsafe fn data_ptr_mut(&self, object: *mut u8) -> *mut u8 {
        unsafe { object.add(self.offset) }
    }

    pub(crate) fn resolve(&self, registry: &TypeRegistry) -> Result<(), RegistrationError> {
        if self.ty.get().is_some() {
            return Ok(());
        }
        let ty = registry.find_type(&self.type_name).ok_or_else(|| {
            RegistrationError::UnresolvedPropertyType {
                class: self.owner.clone(),
                property: self.name.clone(),
                type_name: self.type_name.clone(),
            }
        })?;
        if let Some(field_size) = self.field_size
            && field_size != ty.traits().size
        {
            return Err(RegistrationError::PropertySizeMismatch {
                class: self.owner.clone(),
                property: self.name.clone(),
                type_name: self.type_name.clone(),
                field_size,
                type_size: ty.traits().size,
            });
        }
        let _ = self.ty.set(ty);
        Ok(())
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("type", &self.type_name)
            .field("offset", &self.offset)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Builder for a [`Property`], normally created by [`field!`](crate::field).
pub struct PropertySetup {
    name: String,
    category: String,
    offset: usize,
    type_name: String,
    field_size: Option<usize>,
    flags: PropertyFlags,
    metadata: MetadataContainer,
}

impl PropertySetup {
    /// Property of field type `F` inside owner `O`. The accessor only pins the types.
    pub fn of<O, F: Reflect>(name: &str, offset: usize, _accessor: fn(&O) -> &F) -> Self {
        Self {
            name: name.to_owned(),
            category: "Default".to_owned(),
            offset,
            type_name: F::type_name().into_owned(),
            field_size: Some(size_of::<F>()),
            flags: PropertyFlags::empty(),
            metadata: MetadataContainer::new(),
        }
    }

    /// Property at an explicit offset with a type given by name.
    pub fn raw(name: &str, offset: usize, type_name: &str) -> Self {
        Self {
            name: name.to_owned(),
            category: "Default".to_owned(),
            offset,
            type_name: type_name.to_owned(),
            field_size: None,
            flags: PropertyFlags::empty(),
            metadata: MetadataContainer::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Editor category; also marks the property editable.
    pub fn category(mut self, category: &str) -> Self {
        self.category = category.to_owned();
        self.flags |= PropertyFlags::EDITABLE;
        self
    }

    pub fn editable(mut self) -> Self {
        self.flags |= PropertyFlags::EDITABLE;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.flags |= PropertyFlags::READ_ONLY;
        self
    }

    pub fn transient(mut self) -> Self {
        self.flags |= PropertyFlags::TRANSIENT;
        self
    }

    pub fn inlined(mut self) -> Self {
        self.flags |= PropertyFlags::INLINED;
        self
    }

    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn comment(self, text: &str) -> Self {
        self.metadata(Comment::new(text))
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.metadata(Range::new(min, max))
    }

    pub fn metadata<M: Metadata>(self, value: M) -> Self {
        self.metadata.attach(value);
        self
    }

    pub(crate) fn build(self, owner: &str) -> Property {
        Property {
            hash: TypeHash::from_property(owner, &self.name),
            name: self.name,
            category: self.category,
            offset: self.offset,
            type_name: self.type_name,
            field_size: self.field_size,
            ty: OnceLock::new(),
            flags: self.flags,
            metadata: self.metadata,
            owner: owner.to_owned(),
        }
    }
}

/// Declare a reflected property from a struct field.
///
/// Expands to a [`PropertySetup`] carrying the field name, its offset and the
/// registered name of the field's type.
#[macro_export]
macro_rules! field {
    ($owner:ty, $field:ident) => {
        $crate::PropertySetup::of(
            stringify!($field),
            ::std::mem::offset_of!($owner, $field),
            |o: &$owner| &o.$field,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    struct Sample {
        id: u32,
        scale: f32,
    }

    #[test]
    fn field_macro_captures_layout() {
        let setup = field!(Sample, scale).editable().range(0.0, 10.0);
        let property = setup.build("Sample");
        assert_eq!(property.name(), "scale");
        assert_eq!(property.offset(), std::mem::offset_of!(Sample, scale));
        assert_eq!(property.type_name(), "float");
        assert!(property.is_editable());
        assert_eq!(property.hash(), TypeHash::from_property("Sample", "scale"));
        assert_eq!(property.metadata().require_metadata::<Range>().max, 10.0);
    }

    #[test]
    fn category_marks_editable() {
        let property = field!(Sample, id).category("Identity").build("Sample");
        assert!(property.is_editable());
        assert_eq!(property.category(), "Identity");
        assert!(!property.is_transient());
    }

    #[test]
    #[should_panic(expected = "requested before bootstrap completed")]
    fn unresolved_type_is_fatal() {
        let property = field!(Sample, id).build("Sample");
        property.ty();
    }
}
