//! Object handles: `strong<T>` owns an object deriving from `T`, `weak<T>` observes one.
//!
//! A strong handle persists the object it points to inline, but only when
//! that object is a child of the object being serialized; references to
//! objects owned elsewhere are stored as null. Weak handles always store
//! null and load as null.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use rtti_core::{
    BinaryReader, BinaryWriter, ClassType, DataViewError, DataViewInfo, DataViewInfoFlags,
    DataViewRequestFlags, DataViewResult, MetaType, MetadataContainer, Reflect,
    SerializationContext, StreamError, TextFlags, Type, TypeCreator, TypeInfo, TypeRegistry,
    TypeTraits, XmlNode, strip_template,
};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::{Arc, Weak};

use crate::class::is_object_class;
use crate::context::ObjectContext;
use crate::object::{ObjectCell, ObjectPtr, object_data, object_data_mut};

// ============================================================================
// Typed handles
// ============================================================================

/// Owning handle to an object deriving from `T`.
#[repr(transparent)]
pub struct Handle<T> {
    object: Option<ObjectPtr>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub fn null() -> Self {
        Self {
            object: None,
            _marker: PhantomData,
        }
    }

    /// Handle to `object` if its class is `class` or derives from it.
    pub fn new(object: ObjectPtr, class: &ClassType) -> Option<Self> {
        object.is(class).then(|| Self {
            object: Some(object),
            _marker: PhantomData,
        })
    }

    pub fn get(&self) -> Option<&ObjectPtr> {
        self.object.as_ref()
    }

    pub fn take(&mut self) -> Option<ObjectPtr> {
        self.object.take()
    }

    pub fn is_null(&self) -> bool {
        self.object.is_none()
    }

    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle {
            object: self.object.as_ref().map_or_else(Weak::new, Arc::downgrade),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        same_object(self.object.as_ref(), other.object.as_ref())
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            Some(object) => write!(f, "Handle({}#{})", object.class().name(), object.id()),
            None => f.write_str("Handle(null)"),
        }
    }
}

impl<T: Reflect> Reflect for Handle<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("strong<{}>", T::type_name()))
    }
}

/// Non-owning handle to an object deriving from `T`.
#[repr(transparent)]
pub struct WeakHandle<T> {
    object: Weak<ObjectCell>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> WeakHandle<T> {
    pub fn null() -> Self {
        Self {
            object: Weak::new(),
            _marker: PhantomData,
        }
    }

    pub fn new(object: &ObjectPtr, class: &ClassType) -> Option<Self> {
        object.is(class).then(|| Self {
            object: Arc::downgrade(object),
            _marker: PhantomData,
        })
    }

    /// The object, if it is still alive.
    pub fn upgrade(&self) -> Option<ObjectPtr> {
        self.object.upgrade()
    }

    pub fn is_null(&self) -> bool {
        self.object.strong_count() == 0
    }
}

impl<T> Default for WeakHandle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for WeakHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.object, &other.object)
    }
}

impl<T> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(object) => write!(f, "WeakHandle({}#{})", object.class().name(), object.id()),
            None => f.write_str("WeakHandle(null)"),
        }
    }
}

impl<T: Reflect> Reflect for WeakHandle<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("weak<{}>", T::type_name()))
    }
}

fn same_object(a: Option<&ObjectPtr>, b: Option<&ObjectPtr>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

// ============================================================================
// Handle descriptor
// ============================================================================

type StrongSlot = Option<ObjectPtr>;
type WeakSlot = Weak<ObjectCell>;

/// Tag in front of a persisted handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
enum HandleTag {
    Null = 0,
    Inline = 1,
}

/// Object pointed to by the handle of meta type `kind` at `data`.
unsafe fn load(kind: MetaType, data: *const u8) -> Option<ObjectPtr> {
    unsafe {
        match kind {
            MetaType::StrongHandle => (*(data as *const StrongSlot)).clone(),
            MetaType::WeakHandle => (*(data as *const WeakSlot)).upgrade(),
            _ => None,
        }
    }
}

/// Descriptor of `strong<T>` and `weak<T>`.
pub struct HandleType {
    name: String,
    traits: TypeTraits,
    metadata: MetadataContainer,
    class: ClassType,
    context: Weak<ObjectContext>,
}

impl HandleType {
    pub fn strong(context: Weak<ObjectContext>, class: ClassType) -> Self {
        Self {
            name: format!("strong<{}>", class.name()),
            traits: TypeTraits::value::<StrongSlot>(MetaType::StrongHandle),
            metadata: MetadataContainer::new(),
            class,
            context,
        }
    }

    pub fn weak(context: Weak<ObjectContext>, class: ClassType) -> Self {
        Self {
            name: format!("weak<{}>", class.name()),
            traits: TypeTraits::value::<WeakSlot>(MetaType::WeakHandle),
            metadata: MetadataContainer::new(),
            class,
            context,
        }
    }

    /// Class every pointed object derives from.
    pub fn class(&self) -> &ClassType {
        &self.class
    }

    fn is_strong(&self) -> bool {
        self.traits.meta_type == MetaType::StrongHandle
    }

    /// # Safety
    ///
    /// `data` must point to a value of this type.
    pub unsafe fn get(&self, data: *const u8) -> Option<ObjectPtr> {
        unsafe { load(self.traits.meta_type, data) }
    }

    /// Store `object` if it is null or of a related class; false otherwise.
    ///
    /// # Safety
    ///
    /// `data` must point to a value of this type.
    pub unsafe fn set(&self, data: *mut u8, object: Option<ObjectPtr>) -> bool {
        if let Some(object) = &object
            && !object.is(&self.class)
        {
            return false;
        }
        unsafe {
            if self.is_strong() {
                *(data as *mut StrongSlot) = object;
            } else {
                *(data as *mut WeakSlot) = object.as_ref().map_or_else(Weak::new, Arc::downgrade);
            }
        }
        true
    }

    fn object_or_null(&self, data: *const u8) -> DataViewResult<ObjectPtr> {
        unsafe { self.get(data) }.ok_or(DataViewError::NullObject)
    }

    /// Whether `object` is written inline while serializing `ctx.direct_object`.
    fn is_owned_child(ctx: &SerializationContext<'_>, object: &ObjectPtr) -> bool {
        match ctx
            .direct_object
            .clone()
            .and_then(|direct| direct.downcast::<ObjectCell>().ok())
        {
            Some(direct) => object.parent_id() == Some(direct.id()),
            None => true,
        }
    }

    /// Create an instance of the persisted class `name` parented to the
    /// object being loaded.
    fn instantiate(&self, ctx: &SerializationContext<'_>, name: &str) -> Option<ObjectPtr> {
        let context = self.context.upgrade()?;
        let class = context.types().find_factory_class(name, &self.class)?;
        let object = context.create_object(&class)?;
        if let Some(parent) = ctx
            .direct_object
            .clone()
            .and_then(|direct| direct.downcast::<ObjectCell>().ok())
            && object.set_parent(Some(&parent)).is_err()
        {
            return None;
        }
        Some(object)
    }
}

impl TypeInfo for HandleType {
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
        Some(self.class.as_type())
    }

    unsafe fn construct(&self, data: *mut u8) {
        unsafe {
            if self.is_strong() {
                (data as *mut StrongSlot).write(None);
            } else {
                (data as *mut WeakSlot).write(Weak::new());
            }
        }
    }

    unsafe fn destruct(&self, data: *mut u8) {
        unsafe {
            if self.is_strong() {
                ptr::drop_in_place(data as *mut StrongSlot);
            } else {
                ptr::drop_in_place(data as *mut WeakSlot);
            }
        }
    }

    unsafe fn compare(&self, a: *const u8, b: *const u8) -> bool {
        unsafe {
            if self.is_strong() {
                same_object(
                    (*(a as *const StrongSlot)).as_ref(),
                    (*(b as *const StrongSlot)).as_ref(),
                )
            } else {
                Weak::ptr_eq(&*(a as *const WeakSlot), &*(b as *const WeakSlot))
            }
        }
    }

    unsafe fn copy(&self, dest: *mut u8, src: *const u8) {
        unsafe {
            if self.is_strong() {
                (*(dest as *mut StrongSlot)).clone_from(&*(src as *const StrongSlot));
            } else {
                (*(dest as *mut WeakSlot)).clone_from(&*(src as *const WeakSlot));
            }
        }
    }

    unsafe fn print_to_text(&self, out: &mut String, data: *const u8, _flags: TextFlags) {
        match unsafe { self.get(data) } {
            Some(object) => out.push_str(&format!("{}#{}", object.class().name(), object.id())),
            None => out.push_str("null"),
        }
    }

    unsafe fn parse_from_text(&self, text: &str, data: *mut u8, _flags: TextFlags) -> bool {
        let text = text.trim();
        if text == "null" {
            return unsafe { self.set(data, None) };
        }
        let Some((_, id)) = text.rsplit_once('#') else {
            log::warn!("{}: malformed object reference '{text}'", self.name);
            return false;
        };
        let Some(context) = self.context.upgrade() else {
            return false;
        };
        let object = id
            .parse::<u64>()
            .ok()
            .and_then(|bits| context.find_object(crate::ObjectId::from_bits(bits)));
        match object {
            Some(object) => unsafe { self.set(data, Some(object)) },
            None => {
                log::warn!("{}: no live object '{text}'", self.name);
                false
            }
        }
    }

    unsafe fn convert_from(&self, dest: *mut u8, src: *const u8, src_type: &Type) -> bool {
        if !src_type.meta_type().is_handle() {
            return false;
        }
        let object = unsafe { load(src_type.meta_type(), src) };
        // an object of an unrelated class converts to null
        if !unsafe { self.set(dest, object) } {
            unsafe { self.set(dest, None) };
        }
        true
    }

    // ==========================================================================
    // Serialization
    // ==========================================================================

    unsafe fn write_binary(
        &self,
        ctx: &mut SerializationContext<'_>,
        writer: &mut BinaryWriter,
        data: *const u8,
        _default: *const u8,
    ) {
        let object = unsafe { self.get(data) }
            .filter(|object| self.is_strong() && Self::is_owned_child(ctx, object));
        let Some(object) = object else {
            writer.write_u8(HandleTag::Null.into());
            return;
        };
        writer.write_u8(HandleTag::Inline.into());
        writer.write_str(object.class().name());
        ctx.with_object(object.as_context_object(), |ctx| {
            let guard = object.lock_read();
            unsafe {
                object
                    .class()
                    .write_binary(ctx, writer, object_data(&**guard), ptr::null())
            };
        });
    }

    unsafe fn read_binary(
        &self,
        ctx: &mut SerializationContext<'_>,
        reader: &mut BinaryReader<'_>,
        data: *mut u8,
    ) -> Result<(), StreamError> {
        let tag = reader.read_u8()?;
        let tag = HandleTag::try_from(tag).map_err(|_| StreamError::InvalidValue {
            type_name: self.name.clone(),
            detail: format!("unknown handle tag {tag}"),
        })?;
        if tag == HandleTag::Null || !self.is_strong() {
            unsafe { self.set(data, None) };
            return Ok(());
        }

        let name = reader.read_str()?;
        let Some(object) = self.instantiate(ctx, name) else {
            log::warn!("{}: cannot instantiate stored class '{name}'", self.name);
            unsafe { self.set(data, None) };
            return Ok(());
        };
        let owner = object.as_context_object();
        let result = ctx.with_object(owner.clone(), |ctx| {
            let mut guard = object.lock_write();
            unsafe {
                object
                    .class()
                    .read_binary(ctx, reader, object_data_mut(&mut **guard))
            }
        });
        result?;
        object.finish_load(ctx.take_issues_of(&owner));
        unsafe { self.set(data, Some(object)) };
        Ok(())
    }

    unsafe fn write_xml(
        &self,
        ctx: &mut SerializationContext<'_>,
        node: &mut XmlNode,
        data: *const u8,
        _default: *const u8,
    ) {
        if !self.is_strong() {
            return;
        }
        let object = unsafe { self.get(data) }.filter(|object| Self::is_owned_child(ctx, object));
        let Some(object) = object else {
            return;
        };
        node.set_attribute("class", object.class().name());
        ctx.with_object(object.as_context_object(), |ctx| {
            let guard = object.lock_read();
            unsafe {
                object
                    .class()
                    .write_xml(ctx, node, object_data(&**guard), ptr::null())
            };
        });
    }

    unsafe fn read_xml(
        &self,
        ctx: &mut SerializationContext<'_>,
        node: &XmlNode,
        data: *mut u8,
    ) -> bool {
        if !self.is_strong() {
            return true;
        }
        let Some(name) = node.attribute("class") else {
            return unsafe { self.set(data, None) };
        };
        let Some(object) = self.instantiate(ctx, name) else {
            log::warn!("{}: cannot instantiate stored class '{name}'", self.name);
            return false;
        };
        let owner = object.as_context_object();
        ctx.with_object(owner.clone(), |ctx| {
            let mut guard = object.lock_write();
            unsafe {
                object
                    .class()
                    .read_xml(ctx, node, object_data_mut(&mut **guard))
            }
        });
        object.finish_load(ctx.take_issues_of(&owner));
        unsafe { self.set(data, Some(object)) }
    }

    // ==========================================================================
    // Data views
    // ==========================================================================

    unsafe fn describe_view(
        &self,
        path: &str,
        data: *const u8,
        info: &mut DataViewInfo,
    ) -> DataViewResult {
        if !path.is_empty() {
            return self.object_or_null(data)?.describe_into(path, info);
        }
        info.flags |= DataViewInfoFlags::HANDLE;
        if info.request.contains(DataViewRequestFlags::OPTIONS)
            && let Some(context) = self.context.upgrade()
        {
            info.class_options = context.types().enum_derived_classes(&self.class);
        }
        if let Some(object) = unsafe { self.get(data) } {
            info.flags |= DataViewInfoFlags::OBJECT;
            info.object_class = Some(object.class().clone());
        }
        Ok(())
    }

    unsafe fn read_view(
        &self,
        path: &str,
        data: *const u8,
        target: *mut u8,
        target_type: &Type,
    ) -> DataViewResult {
        let object = self.object_or_null(data)?;
        unsafe { object.read_data_view_raw(path, target, target_type) }
    }

    unsafe fn write_view(
        &self,
        path: &str,
        data: *mut u8,
        source: *const u8,
        source_type: &Type,
    ) -> DataViewResult {
        let object = self.object_or_null(data)?;
        unsafe { object.write_data_view_raw(path, source, source_type) }
    }
}

// ============================================================================
// Creators
// ============================================================================

/// Creates `strong<T>` or `weak<T>` types on lookup.
pub struct HandleCreator {
    kind: MetaType,
    context: Weak<ObjectContext>,
}

impl HandleCreator {
    pub fn strong(context: Weak<ObjectContext>) -> Self {
        Self {
            kind: MetaType::StrongHandle,
            context,
        }
    }

    pub fn weak(context: Weak<ObjectContext>) -> Self {
        Self {
            kind: MetaType::WeakHandle,
            context,
        }
    }

    fn template(&self) -> &'static str {
        match self.kind {
            MetaType::StrongHandle => "strong",
            _ => "weak",
        }
    }
}

impl TypeCreator for HandleCreator {
    fn prefix(&self) -> &str {
        match self.kind {
            MetaType::StrongHandle => "strong<",
            _ => "weak<",
        }
    }

    fn create(&self, registry: &TypeRegistry, name: &str) -> Option<Type> {
        let class = registry.find_class(strip_template(name, self.template())?)?;
        if !is_object_class(&class) {
            log::warn!("'{name}': '{}' is not an object class", class.name());
            return None;
        }
        let context = self.context.clone();
        let handle = match self.kind {
            MetaType::StrongHandle => HandleType::strong(context, class),
            _ => HandleType::weak(context, class),
        };
        Some(Type::new(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{IObject, ObjectClassBuilder};
    use crate::object::Object;
    use crate::registry::ObjectConfig;
    use rtti_core::{DataHolder, RegistryConfig, field, impl_reflect};

    #[derive(Default)]
    struct Light {
        intensity: f32,
    }
    impl_reflect!(Light);
    impl Object for Light {}

    #[derive(Default)]
    struct Camera {
        fov: f32,
    }
    impl_reflect!(Camera);
    impl Object for Camera {}

    #[derive(Default)]
    struct Scene {
        sun: Handle<Light>,
        watcher: WeakHandle<IObject>,
    }
    impl_reflect!(Scene);
    impl Object for Scene {}

    fn context() -> Arc<ObjectContext> {
        let types = TypeRegistry::new(RegistryConfig::default());
        let context = ObjectContext::new(types.clone(), ObjectConfig::default());
        types.register_type(
            ObjectClassBuilder::<Light>::new()
                .constructible()
                .property(field!(Light, intensity))
                .build()
                .as_type(),
        );
        types.register_type(
            ObjectClassBuilder::<Camera>::new()
                .constructible()
                .property(field!(Camera, fov))
                .build()
                .as_type(),
        );
        types.register_type(
            ObjectClassBuilder::<Scene>::new()
                .constructible()
                .property(field!(Scene, sun))
                .property(field!(Scene, watcher))
                .build()
                .as_type(),
        );
        types.finish_bootstrap();
        context
    }

    #[test]
    fn handle_names_and_inner_class() {
        let context = context();
        let ty = context.types().type_of::<Handle<Light>>().unwrap();
        assert_eq!(ty.name(), "strong<Light>");
        assert_eq!(ty.meta_type(), MetaType::StrongHandle);
        assert_eq!(ty.inner_type().unwrap().name(), "Light");
        let weak = context.types().find_type("weak<IObject>").unwrap();
        assert_eq!(weak.meta_type(), MetaType::WeakHandle);
        assert!(context.types().find_type("strong<float>").is_none());
    }

    #[test]
    fn unrelated_objects_convert_to_null() {
        let context = context();
        let camera = context.create_instance(Camera::default()).unwrap();
        let light = context.create_instance(Light::default()).unwrap();
        let scene = context.create_instance(Scene::default()).unwrap();

        let any = DataHolder::of(
            context.types(),
            WeakHandle::<IObject>::new(&light, context.root_class()).unwrap(),
        )
        .unwrap();
        scene.write_data_view("sun", &any).unwrap();
        let sun = scene.read::<Scene>().unwrap().sun.get().cloned();
        assert!(sun.is_some_and(|sun| Arc::ptr_eq(&sun, &light)));

        let other = DataHolder::of(
            context.types(),
            WeakHandle::<IObject>::new(&camera, context.root_class()).unwrap(),
        )
        .unwrap();
        scene.write_data_view("sun", &other).unwrap();
        assert!(scene.read::<Scene>().unwrap().sun.is_null());
    }

    #[test]
    fn paths_go_through_handles() {
        let context = context();
        let scene = context.create_instance(Scene::default()).unwrap();
        assert_eq!(
            scene.read_value::<f32>("sun.intensity"),
            Err(DataViewError::NullObject)
        );

        let light = context.create_instance(Light::default()).unwrap();
        scene.write::<Scene>().unwrap().sun = Handle::new(light.clone(), light.class()).unwrap();
        scene.write_value("sun.intensity", &2.5f32).unwrap();
        assert_eq!(light.read::<Light>().unwrap().intensity, 2.5);
        assert!(light.is_modified());

        let info = scene
            .describe_data_view("sun", DataViewRequestFlags::OPTIONS)
            .unwrap();
        assert!(info.flags.contains(DataViewInfoFlags::HANDLE | DataViewInfoFlags::OBJECT));
        assert_eq!(info.class_options.len(), 1);
        assert_eq!(info.class_options[0].name(), "Light");
    }

    #[test]
    fn text_refers_to_live_objects() {
        let context = context();
        let light = context.create_instance(Light::default()).unwrap();
        let ty = context.types().type_of::<Handle<Light>>().unwrap();
        let mut holder = DataHolder::new(&ty);
        let text = format!("Light#{}", light.id());
        assert!(holder.parse(&text));
        assert_eq!(holder.to_text(), text);
        assert!(!holder.parse("Light#999999"));
        assert!(holder.parse("null"));
        assert!(holder.get::<Handle<Light>>().unwrap().is_null());
    }

    #[test]
    fn weak_handles_store_null() {
        let context = context();
        let light = context.create_instance(Light::default()).unwrap();
        let weak = WeakHandle::<IObject>::new(&light, context.root_class()).unwrap();
        let watchers: rtti_core::Array<WeakHandle<IObject>> = vec![weak.clone(), weak].into();
        let source = DataHolder::of(context.types(), watchers).unwrap();

        let mut writer = BinaryWriter::new();
        let mut ctx = SerializationContext::new(context.types());
        unsafe { source.ty().write_binary(&mut ctx, &mut writer, source.data(), ptr::null()) };
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 4 + 2);

        let ty = source.ty().clone();
        let mut loaded = DataHolder::new(&ty);
        let mut reader = BinaryReader::new(&bytes);
        unsafe { ty.read_binary(&mut ctx, &mut reader, loaded.data_mut()) }.unwrap();
        let loaded = loaded.get::<rtti_core::Array<WeakHandle<IObject>>>().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(WeakHandle::is_null));
    }
}
