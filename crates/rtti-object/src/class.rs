//! Object classes: the `IObject` root and the builder for classes deriving from it.

use rtti_core::{
    ClassBuilder, ClassType, FunctionBuilder, Metadata, PropertySetup, Reflect, impl_reflect,
};

use crate::object::Object;

/// Root of the object class hierarchy.
pub struct IObject;
impl_reflect!(IObject);

/// Creates a default instance of an object class.
pub type ObjectFactory = fn() -> Box<dyn Object>;

/// Object specific class data, stored as the class extension.
#[derive(Debug, Clone, Copy)]
pub struct ObjectClassInfo {
    pub factory: Option<ObjectFactory>,
}

impl ObjectClassInfo {
    pub fn of(class: &ClassType) -> Option<&ObjectClassInfo> {
        class.extension::<ObjectClassInfo>()
    }
}

/// Whether `class` belongs to the object hierarchy.
pub fn is_object_class(class: &ClassType) -> bool {
    ObjectClassInfo::of(class).is_some()
}

fn create_default<T: Object + Default>() -> Box<dyn Object> {
    Box::new(T::default())
}

pub(crate) fn root_class() -> ClassType {
    ClassBuilder::raw(&IObject::type_name(), 0, 1)
        .polymorphic()
        .extension(ObjectClassInfo { factory: None })
        .build()
}

/// Builder for an object class backed by the Rust type `T`.
///
/// The class derives from `IObject` unless [`base`](Self::base) names
/// another object class; a derived type must embed its base as the first
/// field of a `#[repr(C)]` struct so inherited property offsets stay valid.
pub struct ObjectClassBuilder<T> {
    inner: ClassBuilder<T>,
    factory: Option<ObjectFactory>,
}

impl<T: Object + Reflect> ObjectClassBuilder<T> {
    pub fn new() -> Self {
        Self {
            inner: ClassBuilder::<T>::new().polymorphic().base::<IObject>(),
            factory: None,
        }
    }

    /// Make the class instantiable through `T::default()`.
    pub fn constructible(mut self) -> Self
    where
        T: Default,
    {
        self.inner = self.inner.constructible();
        self.factory = Some(create_default::<T>);
        self
    }

    pub fn base<B: Reflect>(mut self) -> Self {
        self.inner = self.inner.base::<B>();
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.inner = self.inner.named(name);
        self
    }

    pub fn property(mut self, setup: PropertySetup) -> Self {
        self.inner = self.inner.property(setup);
        self
    }

    pub fn method<F>(mut self, builder: FunctionBuilder, native: F) -> Self
    where
        F: Fn(&mut rtti_core::CallFrame<'_>) -> Option<rtti_core::DataHolder>
            + Send
            + Sync
            + 'static,
    {
        self.inner = self.inner.method(builder, native);
        self
    }

    pub fn metadata<M: Metadata>(mut self, value: M) -> Self {
        self.inner = self.inner.metadata(value);
        self
    }

    pub fn short_name(mut self, alias: &str) -> Self {
        self.inner = self.inner.short_name(alias);
        self
    }

    pub fn build(self) -> ClassType {
        self.inner
            .extension(ObjectClassInfo {
                factory: self.factory,
            })
            .build()
    }
}

impl<T: Object + Reflect> Default for ObjectClassBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtti_core::{MetaType, TypeInfo, field};

    #[derive(Default)]
    struct Lamp {
        power: f32,
    }
    impl_reflect!(Lamp);
    impl Object for Lamp {}

    #[test]
    fn object_classes_are_polymorphic_and_derive_from_root() {
        let class = ObjectClassBuilder::<Lamp>::new()
            .constructible()
            .property(field!(Lamp, power))
            .build();
        assert_eq!(class.meta_type(), MetaType::Class);
        assert_eq!(class.base_name(), Some("IObject"));
        assert!(is_object_class(&class));
        assert!(ObjectClassInfo::of(&class).and_then(|info| info.factory).is_some());

        let root = root_class();
        assert!(root.is_abstract());
        assert!(ObjectClassInfo::of(&root).is_some_and(|info| info.factory.is_none()));
    }

    #[test]
    fn abstract_object_classes_have_no_factory() {
        let class = ObjectClassBuilder::<Lamp>::new().build();
        assert!(class.is_abstract());
        assert!(ObjectClassInfo::of(&class).is_some_and(|info| info.factory.is_none()));
    }
}
