//! Class descriptors: reflected structs and polymorphic classes.
//!
//! A class is registered in two phases. [`ClassBuilder::build`] produces a
//! descriptor with its local properties still unresolved; the registry later
//! calls [`TypeInfo::cache_type_data`] which resolves the base class and the
//! property types. The split lets a class refer to types that are registered
//! after it, including itself (`array<Node>` inside `Node`).
//!
//! # Example
//!
//! ```ignore
//! #[derive(Default, Clone, PartialEq)]
//! struct Vector3 { x: f32, y: f32, z: f32 }
//! impl_reflect!(Vector3);
//!
//! registry.register_type(
//!     ClassBuilder::<Vector3>::new()
//!         .constructible()
//!         .cloneable()
//!         .comparable()
//!         .property(field!(Vector3, x).editable())
//!         .property(field!(Vector3, y).editable())
//!         .property(field!(Vector3, z).editable())
//!         .build()
//!         .as_type(),
//! );
//! ```

use rustc_hash::{FxHashMap, FxHashSet};
use std::alloc::{alloc, dealloc, handle_alloc_error};
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::mem::needs_drop;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use crate::convert::convert_data;
use crate::data_view::{
    DataViewInfo, DataViewInfoFlags, DataViewMember, DataViewRequestFlags, describe_data_view,
    parse_array_index, parse_property_name, read_data_view, write_data_view,
};
use crate::error::{DataViewError, DataViewResult, LifecycleError, RegistrationError, StreamError, fatal};
use crate::function::{CallFrame, Function, FunctionBuilder};
use crate::holder::{DataHolder, value_layout_of};
use crate::meta_type::{MetaType, TypeFlags, TypeTraits};
use crate::metadata::{Metadata, MetadataContainer, ShortTypeName};
use crate::property::{Property, PropertySetup};
use crate::registry::TypeRegistry;
use crate::serialization::{PropertyIssue, PropertyIssueKind, SerializationContext};
use crate::stream::{BinaryReader, BinaryWriter};
use crate::text::{MemberItems, TextFlags};
use crate::type_info::{Reflect, Type, TypeInfo};
use crate::xml::XmlNode;

// ============================================================================
// Capabilities
// ============================================================================

/// How instances are created.
#[derive(Clone, Copy)]
pub enum Construct {
    Native(unsafe fn(*mut u8)),
    /// The class cannot be instantiated.
    Abstract,
}

/// How instances are destroyed.
#[derive(Clone, Copy)]
pub enum Destruct {
    Native(unsafe fn(*mut u8)),
    /// Nothing to do.
    Trivial,
    /// Unknown; only allowed for abstract classes.
    Missing,
}

/// How instances are copied.
#[derive(Clone, Copy)]
pub enum CopyOp {
    Native(unsafe fn(*mut u8, *const u8)),
    /// Copy every reflected property.
    MemberWise,
}

/// How instances are compared.
#[derive(Clone, Copy)]
pub enum CompareOp {
    Native(unsafe fn(*const u8, *const u8) -> bool),
    /// Compare every reflected property.
    MemberWise,
}

unsafe fn construct_native<T: Default>(data: *mut u8) {
    unsafe { (data as *mut T).write(T::default()) };
}

unsafe fn destruct_native<T>(data: *mut u8) {
    unsafe { ptr::drop_in_place(data as *mut T) };
}

unsafe fn copy_native<T: Clone>(dest: *mut u8, src: *const u8) {
    unsafe { (*(dest as *mut T)).clone_from(&*(src as *const T)) };
}

unsafe fn compare_native<T: PartialEq>(a: *const u8, b: *const u8) -> bool {
    unsafe { *(a as *const T) == *(b as *const T) }
}

// ============================================================================
// Descriptor
// ============================================================================

/// Data resolved once the registry can answer lookups.
struct ClassLayout {
    base: Option<ClassType>,
    all_properties: Vec<Arc<Property>>,
    by_name: FxHashMap<String, usize>,
}

/// Descriptor of a reflected class.
pub struct ClassDescriptor {
    name: String,
    traits: TypeTraits,
    metadata: MetadataContainer,
    native: Option<TypeId>,

    // === Operations ===
    construct: Construct,
    destruct: Destruct,
    copy: CopyOp,
    compare: CompareOp,

    // === Members ===
    base_name: Option<String>,
    local_properties: Vec<Arc<Property>>,
    functions: Vec<Arc<Function>>,
    layout: OnceLock<ClassLayout>,

    // === Runtime state ===
    default_object: AtomicPtr<u8>,
    user_index: AtomicU32,
    extension: Option<Box<dyn Any + Send + Sync>>,
}

const NO_USER_INDEX: u32 = u32::MAX;

impl ClassDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.construct, Construct::Abstract)
    }

    /// Polymorphic classes form the object hierarchy; the rest are plain structs.
    pub fn is_polymorphic(&self) -> bool {
        self.traits.meta_type == MetaType::Class
    }

    pub fn base_name(&self) -> Option<&str> {
        self.base_name.as_deref()
    }

    /// Resolved base class.
    pub fn base(&self) -> Option<&ClassType> {
        self.layout.get().and_then(|layout| layout.base.as_ref())
    }

    /// Whether this class is `base` or derives from it.
    pub fn is(&self, base: &ClassDescriptor) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if ptr::eq(class, base) {
                return true;
            }
            current = class.base().map(|b| &**b);
        }
        false
    }

    /// Properties declared by this class only.
    pub fn local_properties(&self) -> &[Arc<Property>] {
        &self.local_properties
    }

    /// All properties, base class properties first.
    pub fn all_properties(&self) -> &[Arc<Property>] {
        &self.layout().all_properties
    }

    pub fn find_property(&self, name: &str) -> Option<&Arc<Property>> {
        let layout = self.layout();
        layout.by_name.get(name).map(|&index| &layout.all_properties[index])
    }

    /// Functions declared by this class.
    pub fn functions(&self) -> &[Arc<Function>] {
        &self.functions
    }

    /// Find a method here or in a base class.
    pub fn find_function(&self, name: &str) -> Option<&Arc<Function>> {
        self.functions
            .iter()
            .find(|f| f.name() == name)
            .or_else(|| self.base().and_then(|base| base.find_function(name)))
    }

    /// Dense index assigned by class enumeration, if any.
    pub fn user_index(&self) -> Option<u32> {
        match self.user_index.load(Ordering::Relaxed) {
            NO_USER_INDEX => None,
            index => Some(index),
        }
    }

    pub(crate) fn set_user_index(&self, index: u32) {
        self.user_index.store(index, Ordering::Relaxed);
    }

    /// Extension data attached by the layer that registered the class.
    pub fn extension<E: Any>(&self) -> Option<&E> {
        self.extension.as_ref()?.downcast_ref::<E>()
    }

    /// Whether the base class and property types are resolved.
    pub fn is_resolved(&self) -> bool {
        self.layout.get().is_some()
    }

    fn layout(&self) -> &ClassLayout {
        match self.layout.get() {
            Some(layout) => layout,
            None => fatal(LifecycleError::UnresolvedClass(self.name.clone())),
        }
    }

    // ==========================================================================
    // Default object
    // ==========================================================================

    /// Shared default instance, built on first use.
    ///
    /// For abstract classes this is a zeroed buffer with every property
    /// default constructed. Asking before the class is resolved is fatal.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn default_object(&self) -> *const u8 {
        let current = self.default_object.load(Ordering::Acquire);
        if !current.is_null() {
            return current;
        }
        if self.layout.get().is_none() {
            fatal(LifecycleError::PrematureDefaultObject(self.name.clone()));
        }

        let fresh = self.build_default_object();
        match self.default_object.compare_exchange(
            ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => fresh,
            Err(existing) => {
                // another thread won the race
                unsafe { self.destroy_default_object(fresh) };
                existing
            }
        }
    }

    fn build_default_object(&self) -> *mut u8 {
        let layout = value_layout_of(&self.name, &self.traits);
        let data = unsafe { alloc(layout) };
        if data.is_null() {
            handle_alloc_error(layout);
        }
        unsafe {
            match self.construct {
                Construct::Native(construct) => construct(data),
                Construct::Abstract => {
                    ptr::write_bytes(data, 0, layout.size());
                    for prop in self.all_properties() {
                        prop.ty().construct(prop.data_ptr_mut(data));
                    }
                }
            }
        }
        data
    }

    unsafe fn destroy_default_object(&self, data: *mut u8) {
        unsafe {
            match self.construct {
                Construct::Native(_) => self.destruct_value(data),
                Construct::Abstract => {
                    for prop in self.all_properties() {
                        prop.ty().destruct(prop.data_ptr_mut(data));
                    }
                }
            }
            dealloc(data, value_layout_of(&self.name, &self.traits));
        }
    }

    unsafe fn destruct_value(&self, data: *mut u8) {
        match self.destruct {
            Destruct::Native(destruct) => unsafe { destruct(data) },
            Destruct::Trivial => {}
            Destruct::Missing => {
                for prop in self.all_properties() {
                    unsafe { prop.ty().destruct(prop.data_ptr_mut(data)) };
                }
            }
        }
    }

    // ==========================================================================
    // Resolution
    // ==========================================================================

    fn resolve(&self, registry: &TypeRegistry, chain: &mut Vec<String>) -> Result<(), RegistrationError> {
        if self.layout.get().is_some() {
            return Ok(());
        }
        if chain.iter().any(|name| *name == self.name) {
            return Err(RegistrationError::CyclicBase(self.name.clone()));
        }
        chain.push(self.name.clone());

        let base = match &self.base_name {
            Some(base_name) => {
                let base = registry.find_class(base_name).ok_or_else(|| {
                    RegistrationError::UnknownBaseClass {
                        class: self.name.clone(),
                        base: base_name.clone(),
                    }
                })?;
                base.resolve(registry, chain)?;
                Some(base)
            }
            None => None,
        };

        let mut all_properties = base
            .as_ref()
            .map(|b| b.all_properties().to_vec())
            .unwrap_or_default();
        let mut by_name: FxHashMap<String, usize> = base
            .as_ref()
            .map(|b| b.layout().by_name.clone())
            .unwrap_or_default();

        for prop in &self.local_properties {
            prop.resolve(registry)?;
            if by_name.insert(prop.name().to_owned(), all_properties.len()).is_some() {
                return Err(RegistrationError::DuplicateProperty {
                    class: self.name.clone(),
                    property: prop.name().to_owned(),
                });
            }
            all_properties.push(prop.clone());
        }

        let _ = self.layout.set(ClassLayout {
            base,
            all_properties,
            by_name,
        });
        Ok(())
    }

    // ==========================================================================
    // Serialization helpers
    // ==========================================================================

    /// Properties that differ from `default` and are not transient.
    unsafe fn persisted_properties(&self, data: *const u8, default: *const u8) -> Vec<&Arc<Property>> {
        self.all_properties()
            .iter()
            .filter(|prop| !prop.is_transient())
            .filter(|prop| unsafe { !prop.ty().compare(prop.data_ptr(data), prop.data_ptr(default)) })
            .collect()
    }

    fn resolve_default(&self, default: *const u8) -> *const u8 {
        if default.is_null() {
            self.default_object()
        } else {
            default
        }
    }

    fn issue(
        &self,
        ctx: &SerializationContext<'_>,
        property: &str,
        kind: PropertyIssueKind,
        stored_value: Option<DataHolder>,
    ) -> PropertyIssue {
        PropertyIssue {
            owner: ctx.direct_object.clone(),
            class_name: self.name.clone(),
            property: property.to_owned(),
            kind,
            stored_value,
        }
    }
}

/// Whether a value stored as `stored` can be decoded directly by `current`.
fn binary_compatible(stored: &Type, current: &Type) -> bool {
    if stored == current {
        return true;
    }
    let (a, b) = (stored.meta_type(), current.meta_type());
    match (a, b) {
        (MetaType::StrongHandle, MetaType::StrongHandle)
        | (MetaType::WeakHandle, MetaType::WeakHandle)
        | (MetaType::ClassRef, MetaType::ClassRef) => true,
        (MetaType::Array, MetaType::Array) => stored.inner_type() == current.inner_type(),
        _ => false,
    }
}

impl TypeInfo for ClassDescriptor {
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
        self.native
    }

    fn cache_type_data(&self, registry: &TypeRegistry) {
        if let Err(err) = self.resolve(registry, &mut Vec::new()) {
            fatal(err);
        }
    }

    fn release_type_data(&self) {
        let data = self.default_object.swap(ptr::null_mut(), Ordering::AcqRel);
        if !data.is_null() {
            unsafe { self.destroy_default_object(data) };
        }
    }

    unsafe fn construct(&self, data: *mut u8) {
        match self.construct {
            Construct::Native(construct) => unsafe { construct(data) },
            Construct::Abstract => fatal(LifecycleError::AbstractConstruction(self.name.clone())),
        }
    }

    unsafe fn destruct(&self, data: *mut u8) {
        unsafe { self.destruct_value(data) };
    }

    unsafe fn compare(&self, a: *const u8, b: *const u8) -> bool {
        match self.compare {
            CompareOp::Native(compare) => unsafe { compare(a, b) },
            CompareOp::MemberWise => self
                .all_properties()
                .iter()
                .all(|prop| unsafe { prop.ty().compare(prop.data_ptr(a), prop.data_ptr(b)) }),
        }
    }

    unsafe fn copy(&self, dest: *mut u8, src: *const u8) {
        match self.copy {
            CopyOp::Native(copy) => unsafe { copy(dest, src) },
            CopyOp::MemberWise => {
                for prop in self.all_properties() {
                    unsafe { prop.ty().copy(prop.data_ptr_mut(dest), prop.data_ptr(src)) };
                }
            }
        }
    }

    unsafe fn print_to_text(&self, out: &mut String, data: *const u8, flags: TextFlags) {
        let default = self.default_object();
        for prop in self.all_properties() {
            let value = unsafe { prop.data_ptr(data) };
            if unsafe { prop.ty().compare(value, prop.data_ptr(default)) } {
                continue;
            }
            out.push('(');
            out.push_str(prop.name());
            out.push('=');
            unsafe { prop.ty().print_to_text(out, value, flags | TextFlags::NESTED) };
            out.push(')');
        }
    }

    /// Members not listed keep their value; unknown members are skipped.
    unsafe fn parse_from_text(&self, text: &str, data: *mut u8, flags: TextFlags) -> bool {
        for item in MemberItems::new(text) {
            let Ok((name, value)) = item else {
                return false;
            };
            let Some(prop) = self.find_property(name) else {
                log::debug!("ignoring unknown member '{name}' of '{}'", self.name);
                continue;
            };
            let target = unsafe { prop.data_ptr_mut(data) };
            if !unsafe { prop.ty().parse_from_text(value, target, flags | TextFlags::NESTED) } {
                return false;
            }
        }
        true
    }

    unsafe fn write_binary(
        &self,
        ctx: &mut SerializationContext<'_>,
        writer: &mut BinaryWriter,
        data: *const u8,
        default: *const u8,
    ) {
        let default = self.resolve_default(default);
        let props = unsafe { self.persisted_properties(data, default) };
        writer.write_u32(props.len() as u32);
        for prop in props {
            writer.write_str(prop.name());
            writer.write_str(prop.ty().name());
            let block = writer.begin_block();
            unsafe {
                prop.ty()
                    .write_binary(ctx, writer, prop.data_ptr(data), prop.data_ptr(default))
            };
            writer.end_block(block);
        }
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    unsafe fn read_binary(
        &self,
        ctx: &mut SerializationContext<'_>,
        reader: &mut BinaryReader<'_>,
        data: *mut u8,
    ) -> Result<(), StreamError> {
        let count = reader.read_u32()?;
        for _ in 0..count {
            let name = reader.read_str()?;
            let type_name = reader.read_str()?;
            let mut block = reader.read_block()?;
            let stored_type = ctx.registry.find_type(type_name);

            let Some(prop) = self.find_property(name) else {
                let stored_value = stored_type.and_then(|stored| {
                    let mut holder = DataHolder::new(&stored);
                    unsafe { stored.read_binary(ctx, &mut block, holder.data_mut()) }
                        .ok()
                        .map(|_| holder)
                });
                let issue = self.issue(ctx, name, PropertyIssueKind::Missing, stored_value);
                ctx.report(issue);
                continue;
            };

            let target = unsafe { prop.data_ptr_mut(data) };
            let current = prop.ty();
            match stored_type {
                Some(stored) if binary_compatible(&stored, current) => unsafe {
                    current.read_binary(ctx, &mut block, target)?
                },
                Some(stored) => {
                    let mut holder = DataHolder::new(&stored);
                    if let Err(err) = unsafe { stored.read_binary(ctx, &mut block, holder.data_mut()) } {
                        log::warn!(
                            "cannot decode '{}.{name}' stored as '{type_name}': {err}",
                            self.name
                        );
                        continue;
                    }
                    if !unsafe { convert_data(holder.data(), &stored, target, current) } {
                        let kind = PropertyIssueKind::TypeChanged {
                            stored_type: type_name.to_owned(),
                        };
                        let issue = self.issue(ctx, name, kind, Some(holder));
                        ctx.report(issue);
                    }
                }
                None => {
                    log::warn!(
                        "property '{}.{name}' was stored as unknown type '{type_name}'",
                        self.name
                    );
                    let kind = PropertyIssueKind::TypeChanged {
                        stored_type: type_name.to_owned(),
                    };
                    let issue = self.issue(ctx, name, kind, None);
                    ctx.report(issue);
                }
            }
        }
        Ok(())
    }

    unsafe fn write_xml(
        &self,
        ctx: &mut SerializationContext<'_>,
        node: &mut XmlNode,
        data: *const u8,
        default: *const u8,
    ) {
        let default = self.resolve_default(default);
        for prop in unsafe { self.persisted_properties(data, default) } {
            let mut child = XmlNode::new(prop.name());
            unsafe {
                prop.ty()
                    .write_xml(ctx, &mut child, prop.data_ptr(data), prop.data_ptr(default))
            };
            node.push_child(child);
        }
    }

    unsafe fn read_xml(&self, ctx: &mut SerializationContext<'_>, node: &XmlNode, data: *mut u8) -> bool {
        for child in &node.children {
            let Some(prop) = self.find_property(&child.name) else {
                let stored_value = DataHolder::of(ctx.registry, child.text.clone());
                let issue = self.issue(ctx, &child.name, PropertyIssueKind::Missing, stored_value);
                ctx.report(issue);
                continue;
            };
            let target = unsafe { prop.data_ptr_mut(data) };
            if !unsafe { prop.ty().read_xml(ctx, child, target) } {
                log::warn!(
                    "cannot load '{}.{}' of type '{}' from XML",
                    self.name,
                    prop.name(),
                    prop.ty().name()
                );
                let kind = PropertyIssueKind::TypeChanged {
                    stored_type: "string".to_owned(),
                };
                let stored_value = DataHolder::of(ctx.registry, child.text.clone());
                let issue = self.issue(ctx, &child.name, kind, stored_value);
                ctx.report(issue);
            }
        }
        true
    }

    unsafe fn describe_view(&self, path: &str, data: *const u8, info: &mut DataViewInfo) -> DataViewResult {
        if path.is_empty() {
            if info.request.contains(DataViewRequestFlags::MEMBER_LIST) {
                info.members.extend(
                    self.all_properties()
                        .iter()
                        .filter(|prop| prop.is_editable())
                        .map(|prop| DataViewMember {
                            name: prop.name().to_owned(),
                            category: prop.category().to_owned(),
                        }),
                );
            }
            info.flags |= DataViewInfoFlags::LIKE_STRUCT;
            return Ok(());
        }

        let mut rest = path;
        let name = parse_property_name(&mut rest)
            .ok_or_else(|| DataViewError::UnknownProperty(path.to_owned()))?;
        let prop = self
            .find_property(name)
            .ok_or_else(|| DataViewError::UnknownProperty(name.to_owned()))?;

        let mut index_only = rest;
        let describes_property = rest.is_empty()
            || (prop.ty().meta_type().is_array_like()
                && parse_array_index(&mut index_only).is_some()
                && index_only.is_empty());
        if describes_property {
            if info.request.contains(DataViewRequestFlags::PROPERTY_METADATA) {
                info.metadata.extend(prop.metadata().collect());
            }
            if prop.is_inlined() {
                info.flags |= DataViewInfoFlags::INLINED;
            }
            if prop.is_read_only() {
                info.flags |= DataViewInfoFlags::READ_ONLY;
            }
            if !prop.flags().contains(crate::property::PropertyFlags::NO_RESET_TO_DEFAULT) {
                info.flags |= DataViewInfoFlags::RESETTABLE;
            }
        }
        unsafe { describe_data_view(prop.ty(), rest, prop.data_ptr(data), info) }
    }

    unsafe fn read_view(
        &self,
        path: &str,
        data: *const u8,
        target: *mut u8,
        target_type: &Type,
    ) -> DataViewResult {
        let mut rest = path;
        let name = parse_property_name(&mut rest)
            .ok_or_else(|| DataViewError::UnknownProperty(path.to_owned()))?;
        let prop = self
            .find_property(name)
            .ok_or_else(|| DataViewError::UnknownProperty(name.to_owned()))?;
        unsafe { read_data_view(prop.ty(), rest, prop.data_ptr(data), target, target_type) }
    }

    unsafe fn write_view(
        &self,
        path: &str,
        data: *mut u8,
        source: *const u8,
        source_type: &Type,
    ) -> DataViewResult {
        let mut rest = path;
        let name = parse_property_name(&mut rest)
            .ok_or_else(|| DataViewError::UnknownProperty(path.to_owned()))?;
        let prop = self
            .find_property(name)
            .ok_or_else(|| DataViewError::UnknownProperty(name.to_owned()))?;
        if prop.is_read_only() {
            return Err(DataViewError::ReadOnly);
        }
        unsafe { write_data_view(prop.ty(), rest, prop.data_ptr_mut(data), source, source_type) }
    }
}

impl Drop for ClassDescriptor {
    fn drop(&mut self) {
        self.release_type_data();
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("base", &self.base_name)
            .field("properties", &self.local_properties.len())
            .field("abstract", &self.is_abstract())
            .finish()
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Shared handle to a class descriptor; equal when the descriptors are the same.
#[derive(Clone)]
pub struct ClassType(Arc<ClassDescriptor>);

impl ClassType {
    pub fn from_arc(descriptor: Arc<ClassDescriptor>) -> Self {
        Self(descriptor)
    }

    /// The class as a generic type handle.
    pub fn as_type(&self) -> Type {
        Type::from_arc(self.0.clone())
    }

    pub fn ptr_eq(&self, other: &ClassType) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for ClassType {
    type Target = ClassDescriptor;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for ClassType {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ClassType {}

impl std::hash::Hash for ClassType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassType({})", self.0.name)
    }
}

impl fmt::Display for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for class descriptors.
///
/// `ClassBuilder::<T>::new()` describes a Rust type. The class starts out
/// abstract; [`constructible`](Self::constructible), [`cloneable`](Self::cloneable)
/// and [`comparable`](Self::comparable) switch to the native operations of `T`.
/// [`ClassBuilder::raw`] describes a layout without a Rust type.
pub struct ClassBuilder<T = ()> {
    name: String,
    traits: TypeTraits,
    native: Option<TypeId>,
    construct: Construct,
    destruct: Destruct,
    copy: CopyOp,
    compare: CompareOp,
    base_name: Option<String>,
    properties: Vec<PropertySetup>,
    functions: Vec<Function>,
    metadata: MetadataContainer,
    extension: Option<Box<dyn Any + Send + Sync>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Reflect + Send + Sync> ClassBuilder<T> {
    pub fn new() -> Self {
        let destruct = if needs_drop::<T>() {
            Destruct::Native(destruct_native::<T>)
        } else {
            Destruct::Trivial
        };
        Self {
            name: T::type_name().into_owned(),
            traits: TypeTraits::value::<T>(MetaType::Struct),
            native: Some(TypeId::of::<T>()),
            construct: Construct::Abstract,
            destruct,
            copy: CopyOp::MemberWise,
            compare: CompareOp::MemberWise,
            base_name: None,
            properties: Vec::new(),
            functions: Vec::new(),
            metadata: MetadataContainer::new(),
            extension: None,
            _marker: PhantomData,
        }
    }

    pub fn constructible(mut self) -> Self
    where
        T: Default,
    {
        self.construct = Construct::Native(construct_native::<T>);
        self
    }

    pub fn cloneable(mut self) -> Self
    where
        T: Clone,
    {
        self.copy = CopyOp::Native(copy_native::<T>);
        self
    }

    pub fn comparable(mut self) -> Self
    where
        T: PartialEq,
    {
        self.compare = CompareOp::Native(compare_native::<T>);
        self
    }
}

impl<T: Reflect + Send + Sync> Default for ClassBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassBuilder<()> {
    /// Class with an explicit layout and no operations; destruction is unknown.
    pub fn raw(name: &str, size: usize, alignment: usize) -> Self {
        if !alignment.is_power_of_two() {
            fatal(LifecycleError::InvalidLayout(name.to_owned()));
        }
        Self {
            name: name.to_owned(),
            traits: TypeTraits::sized(MetaType::Struct, size, alignment, TypeFlags::empty()),
            native: None,
            construct: Construct::Abstract,
            destruct: Destruct::Missing,
            copy: CopyOp::MemberWise,
            compare: CompareOp::MemberWise,
            base_name: None,
            properties: Vec::new(),
            functions: Vec::new(),
            metadata: MetadataContainer::new(),
            extension: None,
            _marker: PhantomData,
        }
    }
}

impl<T> ClassBuilder<T> {
    /// Register under a different name than `T::type_name()`.
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn construct_with(mut self, construct: Construct) -> Self {
        self.construct = construct;
        self
    }

    pub fn destruct_with(mut self, destruct: Destruct) -> Self {
        self.destruct = destruct;
        self
    }

    pub fn copy_with(mut self, copy: CopyOp) -> Self {
        self.copy = copy;
        self
    }

    pub fn compare_with(mut self, compare: CompareOp) -> Self {
        self.compare = compare;
        self
    }

    /// Derive from the class registered as `name`.
    pub fn base_named(mut self, name: &str) -> Self {
        self.base_name = Some(name.to_owned());
        self
    }

    pub fn base<B: Reflect>(self) -> Self {
        let name = B::type_name();
        self.base_named(&name)
    }

    /// Mark the class as part of the polymorphic object hierarchy.
    pub fn polymorphic(mut self) -> Self {
        self.traits.meta_type = MetaType::Class;
        self
    }

    pub fn property(mut self, setup: PropertySetup) -> Self {
        self.properties.push(setup);
        self
    }

    /// Add a method implemented by `native`.
    pub fn method<F>(mut self, builder: FunctionBuilder, native: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>) -> Option<DataHolder> + Send + Sync + 'static,
    {
        let function = builder.build_method(&self.name, native);
        self.functions.push(function);
        self
    }

    pub fn metadata<M: Metadata>(self, value: M) -> Self {
        self.metadata.attach(value);
        self
    }

    /// Short alias the registry also resolves.
    pub fn short_name(self, alias: &str) -> Self {
        self.metadata(ShortTypeName::new(alias))
    }

    pub fn extension<E: Any + Send + Sync>(mut self, value: E) -> Self {
        self.extension = Some(Box::new(value));
        self
    }

    /// Validate and produce the descriptor.
    pub fn try_build(self) -> Result<ClassType, RegistrationError> {
        let concrete = !matches!(self.construct, Construct::Abstract);
        if concrete && matches!(self.destruct, Destruct::Missing) {
            return Err(RegistrationError::MissingOperation {
                class: self.name,
                operation: "destruct",
            });
        }

        let mut seen = FxHashSet::default();
        for setup in &self.properties {
            if !seen.insert(setup.name().to_owned()) {
                return Err(RegistrationError::DuplicateProperty {
                    class: self.name.clone(),
                    property: setup.name().to_owned(),
                });
            }
        }

        let name = self.name;
        let local_properties = self
            .properties
            .into_iter()
            .map(|setup| Arc::new(setup.build(&name)))
            .collect();

        Ok(ClassType(Arc::new(ClassDescriptor {
            traits: self.traits,
            metadata: self.metadata,
            native: self.native,
            construct: self.construct,
            destruct: self.destruct,
            copy: self.copy,
            compare: self.compare,
            base_name: self.base_name,
            local_properties,
            functions: self.functions.into_iter().map(Arc::new).collect(),
            layout: OnceLock::new(),
            default_object: AtomicPtr::new(ptr::null_mut()),
            user_index: AtomicU32::new(NO_USER_INDEX),
            extension: self.extension,
            name,
        })))
    }

    /// Validate and produce the descriptor; invalid classes are fatal.
    pub fn build(self) -> ClassType {
        match self.try_build() {
            Ok(class) => class,
            Err(err) => fatal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;
    use crate::types::Array;
    use crate::{field, impl_reflect};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }
    impl_reflect!(Point);

    #[derive(Debug, Clone, PartialEq)]
    struct Bounds {
        min: Point,
        max: Point,
        label: String,
        weights: Array<f32>,
    }
    impl_reflect!(Bounds);

    impl Default for Bounds {
        fn default() -> Self {
            Self {
                min: Point::default(),
                max: Point { x: 1, y: 1 },
                label: String::new(),
                weights: Array::new(),
            }
        }
    }

    fn registry() -> Arc<TypeRegistry> {
        let registry = TypeRegistry::new(RegistryConfig::default());
        registry.register_type(
            ClassBuilder::<Point>::new()
                .constructible()
                .cloneable()
                .comparable()
                .property(field!(Point, x).editable())
                .property(field!(Point, y).editable())
                .build()
                .as_type(),
        );
        registry.register_type(
            ClassBuilder::<Bounds>::new()
                .constructible()
                .property(field!(Bounds, min).editable())
                .property(field!(Bounds, max).editable())
                .property(field!(Bounds, label).read_only())
                .property(field!(Bounds, weights).editable())
                .build()
                .as_type(),
        );
        registry
    }

    fn as_data<T>(value: &mut T) -> *mut u8 {
        value as *mut T as *mut u8
    }

    #[test]
    fn default_object_is_a_live_instance() {
        let registry = registry();
        registry.finish_bootstrap();
        let class = registry.find_class("Bounds").unwrap();
        let default = unsafe { &*(class.default_object() as *const Bounds) };
        assert_eq!(default, &Bounds::default());
        assert_eq!(class.default_object(), class.default_object());
    }

    #[test]
    #[should_panic(expected = "requested before bootstrap completed")]
    fn default_object_before_bootstrap_is_fatal() {
        let registry = registry();
        registry.find_class("Bounds").unwrap().default_object();
    }

    #[test]
    fn text_lists_changed_members() {
        let registry = registry();
        registry.finish_bootstrap();
        let class = registry.find_class("Bounds").unwrap();
        let mut value = Bounds::default();
        value.min.x = 3;

        let mut out = String::new();
        unsafe { class.print_to_text(&mut out, as_data(&mut value), TextFlags::empty()) };
        assert_eq!(out, "(min=(x=3))");

        let text = "(min=)(max=(y=0))(unknown=5)";
        assert!(unsafe { class.parse_from_text(text, as_data(&mut value), TextFlags::empty()) });
        assert_eq!(value.min, Point { x: 3, y: 0 });
        assert_eq!(value.max, Point { x: 1, y: 0 });

        assert!(!unsafe { class.parse_from_text("(min=(x=abc))", as_data(&mut value), TextFlags::empty()) });
    }

    #[test]
    fn memberwise_copy_and_compare() {
        let registry = registry();
        registry.finish_bootstrap();
        let class = registry.find_class("Bounds").unwrap();
        let mut a = Bounds::default();
        a.weights.push(0.5);
        a.label = "a".into();
        let mut b = Bounds::default();
        unsafe {
            assert!(!class.compare(as_data(&mut a), as_data(&mut b)));
            class.copy(as_data(&mut b), as_data(&mut a));
            assert!(class.compare(as_data(&mut a), as_data(&mut b)));
        }
        assert_eq!(a, b);
    }

    #[test]
    fn data_view_paths() {
        let registry = registry();
        registry.finish_bootstrap();
        let ty = registry.find_type("Bounds").unwrap();
        let mut value = Bounds::default();
        value.weights = vec![0.25f32, 0.75].into();

        let mut target = DataHolder::of(&*registry, 0.0f64).unwrap();
        let target_type = target.ty().clone();
        unsafe {
            read_data_view(&ty, "weights[1]", as_data(&mut value), target.data_mut(), &target_type).unwrap();
        }
        assert_eq!(target.get::<f64>(), Some(&0.75));

        let source = DataHolder::of(&*registry, String::from("-4")).unwrap();
        unsafe {
            write_data_view(&ty, ".min.y", as_data(&mut value), source.data(), source.ty()).unwrap();
        }
        assert_eq!(value.min.y, -4);

        let err = unsafe { write_data_view(&ty, "label", as_data(&mut value), source.data(), source.ty()) };
        assert_eq!(err, Err(DataViewError::ReadOnly));
        let err = unsafe {
            read_data_view(&ty, "weights[5]", as_data(&mut value), target.data_mut(), &target_type)
        };
        assert_eq!(err, Err(DataViewError::IndexOutOfRange { index: 5, size: 2 }));

        let mut info = DataViewInfo::new(DataViewRequestFlags::MEMBER_LIST);
        unsafe { describe_data_view(&ty, "", as_data(&mut value), &mut info).unwrap() };
        assert!(info.flags.contains(DataViewInfoFlags::LIKE_STRUCT));
        assert_eq!(info.members.len(), 3);
        assert!(info.member("label").is_none());
    }

    #[derive(Default)]
    struct SaveV1 {
        count: i32,
        gone: i32,
        label: String,
    }
    impl_reflect!(SaveV1, "Save");

    #[derive(Default)]
    struct SaveV2 {
        count: f64,
        label: i32,
    }
    impl_reflect!(SaveV2, "Save");

    fn save_class<T: Reflect + Default + Send + Sync>(setup: Vec<PropertySetup>) -> (Arc<TypeRegistry>, ClassType) {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let builder = setup
            .into_iter()
            .fold(ClassBuilder::<T>::new().constructible(), |b, p| b.property(p));
        let class = registry.register_type(builder.build().as_type()).as_class().unwrap();
        registry.finish_bootstrap();
        (registry, class)
    }

    #[test]
    fn binary_load_converts_and_reports_changes() {
        let (old_registry, old_class) = save_class::<SaveV1>(vec![
            field!(SaveV1, count),
            field!(SaveV1, gone),
            field!(SaveV1, label),
        ]);
        let mut old = SaveV1 {
            count: 7,
            gone: 2,
            label: "abc".into(),
        };
        let mut writer = BinaryWriter::new();
        let mut ctx = SerializationContext::new(&old_registry);
        unsafe { old_class.write_binary(&mut ctx, &mut writer, as_data(&mut old), ptr::null()) };

        let (registry, class) = save_class::<SaveV2>(vec![field!(SaveV2, count), field!(SaveV2, label)]);
        let mut new = SaveV2::default();
        let mut reader = BinaryReader::new(writer.as_bytes());
        let mut ctx = SerializationContext::new(&registry);
        unsafe { class.read_binary(&mut ctx, &mut reader, as_data(&mut new)).unwrap() };

        assert_eq!(new.count, 7.0);
        assert_eq!(new.label, 0);
        let issues = ctx.take_issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].property, "gone");
        assert_eq!(issues[0].kind, PropertyIssueKind::Missing);
        assert_eq!(issues[0].stored_value.as_ref().and_then(|v| v.get::<i32>()), Some(&2));
        assert_eq!(issues[1].property, "label");
        assert_eq!(
            issues[1].kind,
            PropertyIssueKind::TypeChanged {
                stored_type: "string".into()
            }
        );
    }

    #[test]
    fn xml_skips_default_members() {
        let registry = registry();
        registry.finish_bootstrap();
        let class = registry.find_class("Bounds").unwrap();
        let mut value = Bounds::default();
        value.max.y = 9;
        value.weights.push(1.5);

        let mut node = XmlNode::new("bounds");
        let mut ctx = SerializationContext::new(&registry);
        unsafe { class.write_xml(&mut ctx, &mut node, as_data(&mut value), ptr::null()) };
        assert!(node.child("min").is_none());
        assert_eq!(node.child("max").unwrap().child("y").unwrap().text, "9");
        assert_eq!(node.child("weights").unwrap().children.len(), 1);

        let mut loaded = Bounds::default();
        node.push_child(XmlNode::new("legacy").with_text("x"));
        assert!(unsafe { class.read_xml(&mut ctx, &node, as_data(&mut loaded)) });
        assert_eq!(loaded, value);
        assert_eq!(ctx.issues().len(), 1);
        assert_eq!(ctx.issues()[0].stored_value.as_ref().unwrap().to_text(), "x");
    }

    #[test]
    fn concrete_class_needs_a_destructor() {
        unsafe fn zero(data: *mut u8) {
            unsafe { ptr::write_bytes(data, 0, 8) };
        }
        let err = ClassBuilder::raw("Blob", 8, 8)
            .construct_with(Construct::Native(zero))
            .try_build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::MissingOperation {
                class: "Blob".into(),
                operation: "destruct"
            }
        );
        assert!(ClassBuilder::raw("Blob", 8, 8).try_build().is_ok());
    }

    #[test]
    #[should_panic(expected = "cannot be constructed")]
    fn abstract_construction_is_fatal() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let class = registry.register_type(ClassBuilder::<Point>::new().build().as_type());
        registry.finish_bootstrap();
        let mut value = Point::default();
        unsafe { class.construct(as_data(&mut value)) };
    }

    #[test]
    #[should_panic(expected = "cyclic base class chain")]
    fn cyclic_bases_are_fatal() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        registry.register_type(ClassBuilder::raw("A", 4, 4).base_named("B").build().as_type());
        registry.register_type(ClassBuilder::raw("B", 4, 4).base_named("A").build().as_type());
        registry.finish_bootstrap();
    }

    #[test]
    fn methods_are_found_through_bases() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        registry.register_type(
            ClassBuilder::<Point>::new()
                .constructible()
                .property(field!(Point, x))
                .method(Function::builder("flip"), |frame| {
                    let point = unsafe { frame.this::<Point>()? };
                    point.x = -point.x;
                    None
                })
                .build()
                .as_type(),
        );
        registry.register_type(ClassBuilder::raw("Point3", 12, 4).base::<Point>().build().as_type());
        registry.finish_bootstrap();

        let derived = registry.find_class("Point3").unwrap();
        let flip = derived.find_function("flip").unwrap();
        assert_eq!(flip.owner(), Some("Point"));
        let mut point = Point { x: 4, y: 0 };
        flip.call(as_data(&mut point), &[]).unwrap();
        assert_eq!(point.x, -4);
        assert!(derived.functions().is_empty());
    }
}
