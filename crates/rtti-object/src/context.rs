//! Object context: the type registry, the weak object registry and the event
//! dispatcher that objects of one world share.

use parking_lot::{Mutex, MutexGuard};
use rtti_core::{ClassType, Reflect, TypeInfo, TypeRegistry};
use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::class::{ObjectClassInfo, root_class};
use crate::events::EventDispatcher;
use crate::handle::HandleCreator;
use crate::object::{Object, ObjectCell, ObjectPtr};
use crate::registry::{ObjectConfig, ObjectId, ObjectRegistry};

pub struct ObjectContext {
    this: Weak<ObjectContext>,
    types: Arc<TypeRegistry>,
    objects: ObjectRegistry,
    events: EventDispatcher,
    root: ClassType,
    // held across the ancestor walk and the store of every parent change
    parent_lock: Mutex<()>,
}

impl ObjectContext {
    /// Attach an object model to `types`: registers the `IObject` root class
    /// and the `strong<T>` and `weak<T>` creators.
    pub fn new(types: Arc<TypeRegistry>, config: ObjectConfig) -> Arc<Self> {
        let root = root_class();
        types.register_type(root.as_type());
        Arc::new_cyclic(|this: &Weak<ObjectContext>| {
            types.register_creator(HandleCreator::strong(this.clone()));
            types.register_creator(HandleCreator::weak(this.clone()));
            Self {
                this: this.clone(),
                objects: ObjectRegistry::with_capacity(config.initial_capacity),
                events: EventDispatcher::new(),
                types,
                root,
                parent_lock: Mutex::new(()),
            }
        })
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// The `IObject` class.
    pub fn root_class(&self) -> &ClassType {
        &self.root
    }

    pub(crate) fn lock_parents(&self) -> MutexGuard<'_, ()> {
        self.parent_lock.lock()
    }

    // ==========================================================================
    // Creation
    // ==========================================================================

    /// Wrap `value` as an object of its registered class.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn create_instance<T: Object + Reflect>(&self, value: T) -> Option<ObjectPtr> {
        let name = T::type_name();
        let Some(class) = self.types.find_class(&name) else {
            log::warn!("cannot create object: class '{name}' is not registered");
            return None;
        };
        if class.native_type_id() != Some(TypeId::of::<T>()) || ObjectClassInfo::of(&class).is_none() {
            log::warn!("cannot create object: '{name}' is not an object class of this type");
            return None;
        }
        let context = self.this.upgrade()?;
        Some(ObjectCell::create(context, class, Box::new(value)))
    }

    /// Default instance of `class` created by its factory.
    pub fn create_object(&self, class: &ClassType) -> Option<ObjectPtr> {
        let Some(info) = ObjectClassInfo::of(class) else {
            log::warn!("cannot create object: '{}' is not an object class", class.name());
            return None;
        };
        let Some(factory) = info.factory else {
            log::warn!("cannot create object: class '{}' is abstract", class.name());
            return None;
        };
        let context = self.this.upgrade()?;
        Some(ObjectCell::create(context, class.clone(), factory()))
    }

    /// Default instance of the object class registered as `name`.
    pub fn create_named(&self, name: &str) -> Option<ObjectPtr> {
        let class = self.types.find_factory_class(name, &self.root)?;
        self.create_object(&class)
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    pub fn find_object(&self, id: ObjectId) -> Option<ObjectPtr> {
        self.objects.find_object(id)
    }

    /// Visit every live object. Objects must not be created or destroyed by `f`.
    pub fn for_each_object(&self, f: impl FnMut(&ObjectPtr)) {
        self.objects.for_each_object(f);
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl fmt::Debug for ObjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectContext")
            .field("types", &self.types.type_count())
            .field("objects", &self.objects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ObjectClassBuilder;
    use rtti_core::{RegistryConfig, field, impl_reflect};

    #[derive(Default)]
    struct Probe {
        depth: u32,
    }
    impl_reflect!(Probe);
    impl Object for Probe {}

    struct Sensor;
    impl_reflect!(Sensor);
    impl Object for Sensor {}

    fn context() -> Arc<ObjectContext> {
        let types = TypeRegistry::new(RegistryConfig::default());
        let context = ObjectContext::new(types.clone(), ObjectConfig { initial_capacity: 4 });
        types.register_type(
            ObjectClassBuilder::<Probe>::new()
                .constructible()
                .property(field!(Probe, depth))
                .build()
                .as_type(),
        );
        types.register_type(ObjectClassBuilder::<Sensor>::new().build().as_type());
        types.finish_bootstrap();
        context
    }

    #[test]
    fn dropped_objects_leave_the_registry() {
        let context = context();
        let probe = context.create_named("Probe").unwrap();
        let id = probe.id();
        assert!(context.find_object(id).is_some_and(|found| Arc::ptr_eq(&found, &probe)));
        assert_eq!(context.object_count(), 1);

        drop(probe);
        assert!(context.find_object(id).is_none());
        assert_eq!(context.object_count(), 0);

        let next = context.create_instance(Probe { depth: 2 }).unwrap();
        assert_eq!(next.id().index(), id.index());
        assert_ne!(next.id(), id);
    }

    #[test]
    fn abstract_and_unknown_classes_are_not_created() {
        let context = context();
        assert!(context.create_named("Sensor").is_none());
        assert!(context.create_named("IObject").is_none());
        assert!(context.create_named("Nothing").is_none());
        assert!(context.create_instance(Sensor).is_some());
    }

    #[test]
    fn enumeration_visits_live_objects() {
        let context = context();
        let objects: Vec<_> = (0..3).map(|_| context.create_named("Probe").unwrap()).collect();
        let mut seen = Vec::new();
        context.for_each_object(|object| seen.push(object.id()));
        seen.sort();
        let mut expected: Vec<_> = objects.iter().map(|o| o.id()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }
}
