//! Class references: `class<T>` holds a class descriptor deriving from `T`.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::Weak;

use crate::meta_type::{MetaType, TypeTraits};
use crate::metadata::MetadataContainer;
use crate::registry::{TypeCreator, TypeRegistry};
use crate::text::TextFlags;
use crate::type_info::{Reflect, Type, TypeInfo};
use crate::types::{ClassType, strip_template};

/// Optional reference to a class deriving from `T`.
#[repr(transparent)]
pub struct ClassRef<T> {
    class: Option<ClassType>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ClassRef<T> {
    pub fn null() -> Self {
        Self {
            class: None,
            _marker: PhantomData,
        }
    }

    /// Reference `class` if it derives from `base`.
    pub fn new(class: ClassType, base: &ClassType) -> Option<Self> {
        class.is(base).then(|| Self {
            class: Some(class),
            _marker: PhantomData,
        })
    }

    pub fn class(&self) -> Option<&ClassType> {
        self.class.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.class.is_none()
    }
}

impl<T> Default for ClassRef<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for ClassRef<T> {
    fn clone(&self) -> Self {
        Self {
            class: self.class.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for ClassRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
    }
}

impl<T> fmt::Debug for ClassRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class {
            Some(class) => write!(f, "ClassRef({})", class.name()),
            None => f.write_str("ClassRef(null)"),
        }
    }
}

impl<T: Reflect> Reflect for ClassRef<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("class<{}>", T::type_name()))
    }
}

type Slot = Option<ClassType>;

/// Descriptor of `class<T>`.
pub struct ClassRefType {
    name: String,
    traits: TypeTraits,
    metadata: MetadataContainer,
    registry: Weak<TypeRegistry>,
    base: ClassType,
}

impl ClassRefType {
    pub fn new(registry: Weak<TypeRegistry>, base: ClassType) -> Self {
        Self {
            name: format!("class<{}>", base.name()),
            traits: TypeTraits::value::<Slot>(MetaType::ClassRef),
            metadata: MetadataContainer::new(),
            registry,
            base,
        }
    }

    /// Required base class of referenced classes.
    pub fn base(&self) -> &ClassType {
        &self.base
    }

    /// # Safety
    ///
    /// `data` must point to a value of this type.
    pub unsafe fn get<'a>(&self, data: *const u8) -> Option<&'a ClassType> {
        unsafe { (*(data as *const Slot)).as_ref() }
    }

    /// Store `class` if it is null or derives from the base; false otherwise.
    ///
    /// # Safety
    ///
    /// `data` must point to a value of this type.
    pub unsafe fn set(&self, data: *mut u8, class: Option<ClassType>) -> bool {
        if let Some(class) = &class
            && !class.is(&self.base)
        {
            return false;
        }
        unsafe { *(data as *mut Slot) = class };
        true
    }
}

impl TypeInfo for ClassRefType {
    fn name(&self) -> &str {
        &self.name
    }

    fn traits(&self) -> &TypeTraits {
        &self.traits
    }

    fn metadata(&self) -> &MetadataContainer {
        &self.metadata
    }

    fn inner_type(&self) -> Option<Type> {
        Some(self.base.as_type())
    }

    unsafe fn construct(&self, data: *mut u8) {
        unsafe { (data as *mut Slot).write(None) };
    }

    unsafe fn destruct(&self, data: *mut u8) {
        unsafe { ptr::drop_in_place(data as *mut Slot) };
    }

    unsafe fn compare(&self, a: *const u8, b: *const u8) -> bool {
        unsafe { *(a as *const Slot) == *(b as *const Slot) }
    }

    unsafe fn copy(&self, dest: *mut u8, src: *const u8) {
        unsafe { (*(dest as *mut Slot)).clone_from(&*(src as *const Slot)) };
    }

    unsafe fn print_to_text(&self, out: &mut String, data: *const u8, _flags: TextFlags) {
        match unsafe { self.get(data) } {
            Some(class) => out.push_str(class.name()),
            None => out.push_str("null"),
        }
    }

    unsafe fn parse_from_text(&self, text: &str, data: *mut u8, _flags: TextFlags) -> bool {
        let text = text.trim();
        if text == "null" {
            return unsafe { self.set(data, None) };
        }
        if text.is_empty() {
            return false;
        }
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        match registry.find_class(text) {
            Some(class) => unsafe { self.set(data, Some(class)) },
            None => {
                log::warn!("{}: unknown class '{text}'", self.name);
                false
            }
        }
    }

    unsafe fn convert_from(&self, dest: *mut u8, src: *const u8, src_type: &Type) -> bool {
        if src_type.meta_type() != MetaType::ClassRef {
            return false;
        }
        let class = unsafe { (*(src as *const Slot)).clone() };
        // an unrelated class converts to null
        if !unsafe { self.set(dest, class) } {
            unsafe { self.set(dest, None) };
        }
        true
    }
}

/// Creates `class<T>` types on lookup.
pub struct ClassRefCreator;

impl TypeCreator for ClassRefCreator {
    fn prefix(&self) -> &str {
        "class<"
    }

    fn create(&self, registry: &TypeRegistry, name: &str) -> Option<Type> {
        let base = registry.find_class(strip_template(name, "class")?)?;
        Some(Type::new(ClassRefType::new(registry.downgrade(), base)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;
    use crate::types::ClassBuilder;
    use crate::impl_reflect;

    struct Component;
    impl_reflect!(Component);

    #[test]
    fn text_accepts_related_classes_only() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        registry.register_type(ClassBuilder::raw("Component", 8, 8).build().as_type());
        registry.register_type(ClassBuilder::raw("Light", 8, 8).base_named("Component").build().as_type());
        registry.register_type(ClassBuilder::raw("Texture", 8, 8).build().as_type());
        registry.finish_bootstrap();

        let ty = registry.type_of::<ClassRef<Component>>().unwrap();
        assert_eq!(ty.name(), "class<Component>");
        let mut value = ClassRef::<Component>::null();
        let data = &mut value as *mut ClassRef<Component> as *mut u8;

        assert!(unsafe { ty.parse_from_text("Light", data, TextFlags::empty()) });
        assert_eq!(value.class().map(|c| c.name()), Some("Light"));
        assert!(!unsafe { ty.parse_from_text("Texture", data, TextFlags::empty()) });
        assert!(!unsafe { ty.parse_from_text("", data, TextFlags::empty()) });
        assert!(!unsafe { ty.parse_from_text("Nothing", data, TextFlags::empty()) });
        assert_eq!(value.class().map(|c| c.name()), Some("Light"));

        let mut out = String::new();
        unsafe { ty.print_to_text(&mut out, data, TextFlags::empty()) };
        assert_eq!(out, "Light");
        assert!(unsafe { ty.parse_from_text("null", data, TextFlags::empty()) });
        assert!(value.is_null());
    }
}
