//! Owned, type-erased values.

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::fmt;
use std::ptr::NonNull;

use crate::error::{LifecycleError, fatal};
use crate::meta_type::TypeTraits;
use crate::registry::TypeRegistry;
use crate::text::TextFlags;
use crate::type_info::{Reflect, Type};

/// Heap storage for one constructed value of a registered type.
pub struct DataHolder {
    ty: Type,
    data: NonNull<u8>,
}

// SAFETY: registered types are Send + Sync Rust values; the holder owns its value.
unsafe impl Send for DataHolder {}
unsafe impl Sync for DataHolder {}

/// Allocation layout for one value; zero sized types still get a distinct allocation.
pub(crate) fn value_layout_of(name: &str, traits: &TypeTraits) -> Layout {
    match Layout::from_size_align(traits.size.max(1), traits.alignment.max(1)) {
        Ok(layout) => layout,
        Err(_) => fatal(LifecycleError::InvalidLayout(name.to_owned())),
    }
}

fn value_layout(ty: &Type) -> Layout {
    value_layout_of(ty.name(), ty.traits())
}

impl DataHolder {
    /// Default constructed value of `ty`.
    pub fn new(ty: &Type) -> Self {
        let layout = value_layout(ty);
        let Some(data) = NonNull::new(unsafe { alloc(layout) }) else {
            handle_alloc_error(layout)
        };
        unsafe { ty.construct(data.as_ptr()) };
        Self {
            ty: ty.clone(),
            data,
        }
    }

    /// Copy of the value at `src`.
    ///
    /// # Safety
    ///
    /// `src` must point to a constructed value of `ty`.
    pub unsafe fn from_raw(ty: &Type, src: *const u8) -> Self {
        let holder = Self::new(ty);
        unsafe { ty.copy(holder.data.as_ptr(), src) };
        holder
    }

    /// Holder of a Rust value whose type is registered.
    pub fn of<T: Reflect>(registry: &TypeRegistry, value: T) -> Option<Self> {
        let ty = registry.type_of::<T>()?;
        let holder = Self::new(&ty);
        unsafe { *(holder.data.as_ptr() as *mut T) = value };
        Some(holder)
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn data(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn data_mut(&mut self) -> *mut u8 {
        self.data.as_ptr()
    }

    pub fn get<T: Reflect>(&self) -> Option<&T> {
        (self.ty.name() == T::type_name()).then(|| unsafe { &*(self.data.as_ptr() as *const T) })
    }

    pub fn get_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        (self.ty.name() == T::type_name()).then(|| unsafe { &mut *(self.data.as_ptr() as *mut T) })
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        unsafe { self.ty.print_to_text(&mut text, self.data(), TextFlags::empty()) };
        text
    }

    pub fn parse(&mut self, text: &str) -> bool {
        unsafe { self.ty.parse_from_text(text, self.data.as_ptr(), TextFlags::empty()) }
    }
}

impl Clone for DataHolder {
    fn clone(&self) -> Self {
        unsafe { Self::from_raw(&self.ty, self.data()) }
    }
}

impl PartialEq for DataHolder {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && unsafe { self.ty.compare(self.data(), other.data()) }
    }
}

impl Drop for DataHolder {
    fn drop(&mut self) {
        unsafe {
            self.ty.destruct(self.data.as_ptr());
            dealloc(self.data.as_ptr(), value_layout(&self.ty));
        }
    }
}

impl fmt::Debug for DataHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataHolder({}: {})", self.ty.name(), self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;

    #[test]
    fn holds_typed_values() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let mut holder = DataHolder::of(&*registry, 7i32).unwrap();
        assert_eq!(holder.get::<i32>(), Some(&7));
        assert_eq!(holder.get::<u32>(), None);
        *holder.get_mut::<i32>().unwrap() = 9;
        assert_eq!(holder.to_text(), "9");
    }

    #[test]
    fn clone_and_compare() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let a = DataHolder::of(&*registry, "text".to_owned()).unwrap();
        let mut b = a.clone();
        assert_eq!(a, b);
        assert!(b.parse("other"));
        assert_ne!(a, b);
    }

    #[test]
    fn new_is_default_constructed() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let ty = registry.find_type("double").unwrap();
        let holder = DataHolder::new(&ty);
        assert_eq!(holder.to_text(), "0");
    }
}
