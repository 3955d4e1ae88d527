//! Reflected objects.
//!
//! An object is a Rust value implementing [`Object`] whose class derives
//! from `IObject`. [`ObjectCell`] wraps the value with its class, its id in
//! the weak registry, an optional parent, a modified flag and an event key.
//! Objects are shared as [`ObjectPtr`]; the registry only keeps weak
//! references, so the last strong holder destroys the object.
//!
//! All property writes that should notify anyone go through
//! [`ObjectCell::write_data_view`]:
//!
//! 1. [`Object::on_property_changing`] may veto the write
//! 2. the class path writer stores the value
//! 3. [`Object::on_property_changed`] runs
//! 4. the object and its ancestors are marked modified
//! 5. listeners receive [`ObjectEvent::PropertyChanged`]
//!
//! Paths that lead back into an object already locked by the same call
//! (an object writing itself through one of its own handles) deadlock.

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockUpgradableReadGuard, RwLockWriteGuard,
};
use rtti_core::{
    AsAny, ClassType, DataHolder, DataViewError, DataViewInfo, DataViewInfoFlags,
    DataViewRequestFlags, DataViewResult, PropertyIssue, PropertyIssueKind, Reflect, Type,
    ValueRef,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::ObjectContext;
use crate::error::ObjectError;
use crate::events::{EventKey, ListenerId, ObjectEvent};
use crate::registry::ObjectId;

/// Behavior hooks of a reflected object. Every hook has a default.
pub trait Object: AsAny {
    /// Called before a data view write; returning false vetoes it.
    fn on_property_changing(&self, _path: &str, _value: ValueRef<'_>) -> bool {
        true
    }

    fn on_property_changed(&mut self, _path: &str) {}

    /// A stored property no longer exists. Return true when handled.
    fn on_missing_property(&mut self, _issue: &PropertyIssue) -> bool {
        false
    }

    /// A stored property changed type and could not be converted. Return true when handled.
    fn on_property_type_changed(&mut self, _issue: &PropertyIssue) -> bool {
        false
    }

    /// Called once all properties of a loaded object are restored.
    fn on_post_load(&mut self) {}
}

/// Shared pointer to an object.
pub type ObjectPtr = Arc<ObjectCell>;

/// Start of the object's value, where its class property offsets apply.
pub(crate) fn object_data(object: &dyn Object) -> *const u8 {
    object as *const dyn Object as *const u8
}

pub(crate) fn object_data_mut(object: &mut dyn Object) -> *mut u8 {
    object as *mut dyn Object as *mut u8
}

/// A registered object with its bookkeeping.
pub struct ObjectCell {
    class: ClassType,
    id: ObjectId,
    event_key: EventKey,
    parent: Mutex<Option<ObjectId>>,
    modified: AtomicBool,
    data: RwLock<Box<dyn Object>>,
    context: Arc<ObjectContext>,
}

impl ObjectCell {
    /// Wrap `data` and register it. `data` must be a value of `class`.
    pub(crate) fn create(
        context: Arc<ObjectContext>,
        class: ClassType,
        data: Box<dyn Object>,
    ) -> ObjectPtr {
        let ptr = Arc::new_cyclic(|this| {
            let id = context.objects().register(this.clone());
            ObjectCell {
                event_key: context.events().new_key(),
                class,
                id,
                parent: Mutex::new(None),
                modified: AtomicBool::new(false),
                data: RwLock::new(data),
                context,
            }
        });
        log::debug!("created object {} of class '{}'", ptr.id, ptr.class.name());
        ptr
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class(&self) -> &ClassType {
        &self.class
    }

    /// Whether the object's class is `class` or derives from it.
    pub fn is(&self, class: &ClassType) -> bool {
        self.class.is(class)
    }

    pub fn context(&self) -> &Arc<ObjectContext> {
        &self.context
    }

    pub fn event_key(&self) -> EventKey {
        self.event_key
    }

    // ==========================================================================
    // Typed access
    // ==========================================================================

    /// Borrow the value as `T`. Direct access bypasses hooks and events.
    pub fn read<T: Object>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.data.read(), |data| {
            AsAny::as_any(&**data).downcast_ref::<T>()
        })
        .ok()
    }

    pub fn write<T: Object>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.data.write(), |data| {
            if AsAny::as_any(&**data).is::<T>() {
                // the type check above makes the cast exact
                Some(unsafe { &mut *(object_data_mut(&mut **data) as *mut T) })
            } else {
                None
            }
        })
        .ok()
    }

    pub(crate) fn lock_read(&self) -> RwLockReadGuard<'_, Box<dyn Object>> {
        self.data.read_recursive()
    }

    pub(crate) fn lock_write(&self) -> RwLockWriteGuard<'_, Box<dyn Object>> {
        self.data.write()
    }

    // ==========================================================================
    // Parent
    // ==========================================================================

    pub fn parent_id(&self) -> Option<ObjectId> {
        *self.parent.lock()
    }

    /// The parent, if it is set and still alive.
    pub fn parent(&self) -> Option<ObjectPtr> {
        self.parent_id()
            .and_then(|id| self.context.find_object(id))
    }

    /// Set or clear the parent. Parenting to the object itself or one of its
    /// descendants is rejected and leaves the link unchanged.
    ///
    /// Parent changes within one context are serialized, so two objects
    /// parented to each other concurrently cannot both succeed.
    pub fn set_parent(&self, parent: Option<&ObjectPtr>) -> Result<(), ObjectError> {
        let guard = self.context.lock_parents();
        if let Some(parent) = parent {
            let mut cursor = Some(parent.clone());
            while let Some(ancestor) = cursor {
                if ancestor.id == self.id {
                    log::warn!(
                        "object {} ('{}') cannot be parented to its descendant {}",
                        self.id,
                        self.class.name(),
                        parent.id
                    );
                    return Err(ObjectError::ParentCycle {
                        object: self.id,
                        parent: parent.id,
                    });
                }
                cursor = ancestor.parent();
            }
        }
        *self.parent.lock() = parent.map(|p| p.id);
        drop(guard);
        self.dispatch(&ObjectEvent::ParentChanged);
        Ok(())
    }

    // ==========================================================================
    // Modified state
    // ==========================================================================

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Mark this object and its ancestors as modified.
    pub fn mark_modified(&self) {
        if !self.modified.swap(true, Ordering::AcqRel) {
            self.dispatch(&ObjectEvent::Modified);
        }
        let mut cursor = self.parent();
        while let Some(ancestor) = cursor {
            if !ancestor.modified.swap(true, Ordering::AcqRel) {
                ancestor.dispatch(&ObjectEvent::Modified);
            }
            cursor = ancestor.parent();
        }
    }

    pub fn reset_modified(&self) {
        self.modified.store(false, Ordering::Release);
    }

    // ==========================================================================
    // Events
    // ==========================================================================

    pub fn subscribe(
        &self,
        listener: impl Fn(&ObjectEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.context.events().subscribe(self.event_key, listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.context.events().unsubscribe(self.event_key, id)
    }

    fn dispatch(&self, event: &ObjectEvent) {
        self.context.events().dispatch(self.event_key, event);
    }

    // ==========================================================================
    // Data views
    // ==========================================================================

    /// Write `value` to `path`, running the change hooks and notifying listeners.
    pub fn write_data_view(&self, path: &str, value: &DataHolder) -> DataViewResult {
        unsafe { self.write_data_view_raw(path, value.data(), value.ty()) }
    }

    /// Typed form of [`write_data_view`](Self::write_data_view).
    pub fn write_value<T: Reflect>(&self, path: &str, value: &T) -> DataViewResult {
        let ty = self.value_type::<T>()?;
        unsafe { self.write_data_view_raw(path, value as *const T as *const u8, &ty) }
    }

    /// # Safety
    ///
    /// `source` must point to a constructed value of `source_type`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub unsafe fn write_data_view_raw(
        &self,
        path: &str,
        source: *const u8,
        source_type: &Type,
    ) -> DataViewResult {
        let guard = self.data.upgradable_read();
        let value = unsafe { ValueRef::new(source, source_type) };
        if !guard.on_property_changing(path, value) {
            log::warn!(
                "write to '{path}' of object {} ('{}') was vetoed",
                self.id,
                self.class.name()
            );
            return Err(DataViewError::IllegalOperation);
        }

        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        let data = object_data_mut(&mut **guard);
        unsafe { rtti_core::write_data_view(&self.class.as_type(), path, data, source, source_type)? };
        guard.on_property_changed(path);
        drop(guard);

        self.mark_modified();
        self.dispatch(&ObjectEvent::PropertyChanged {
            path: path.to_owned(),
        });
        Ok(())
    }

    /// Read the value at `path` into `target`, converting to its type.
    pub fn read_data_view(&self, path: &str, target: &mut DataHolder) -> DataViewResult {
        let ty = target.ty().clone();
        unsafe { self.read_data_view_raw(path, target.data_mut(), &ty) }
    }

    /// Typed form of [`read_data_view`](Self::read_data_view).
    pub fn read_value<T: Reflect + Default>(&self, path: &str) -> DataViewResult<T> {
        let ty = self.value_type::<T>()?;
        let mut value = T::default();
        unsafe { self.read_data_view_raw(path, &mut value as *mut T as *mut u8, &ty)? };
        Ok(value)
    }

    /// # Safety
    ///
    /// `target` must point to a constructed value of `target_type`.
    pub unsafe fn read_data_view_raw(
        &self,
        path: &str,
        target: *mut u8,
        target_type: &Type,
    ) -> DataViewResult {
        let guard = self.lock_read();
        unsafe {
            rtti_core::read_data_view(
                &self.class.as_type(),
                path,
                object_data(&**guard),
                target,
                target_type,
            )
        }
    }

    pub fn describe_data_view(
        &self,
        path: &str,
        request: DataViewRequestFlags,
    ) -> DataViewResult<DataViewInfo> {
        let mut info = DataViewInfo::new(request);
        self.describe_into(path, &mut info)?;
        Ok(info)
    }

    pub(crate) fn describe_into(&self, path: &str, info: &mut DataViewInfo) -> DataViewResult {
        if path.is_empty() {
            info.flags |= DataViewInfoFlags::OBJECT;
            info.object_class = Some(self.class.clone());
        }
        let guard = self.lock_read();
        unsafe {
            rtti_core::describe_data_view(&self.class.as_type(), path, object_data(&**guard), info)
        }
    }

    fn value_type<T: Reflect>(&self) -> DataViewResult<Type> {
        self.context
            .types()
            .type_of::<T>()
            .ok_or_else(|| DataViewError::TypeConversion {
                from: self.class.name().to_owned(),
                to: T::type_name().into_owned(),
            })
    }

    // ==========================================================================
    // Loading
    // ==========================================================================

    /// Hand load issues to the object's hooks, run the post load hook and
    /// clear the modified state.
    pub(crate) fn finish_load(&self, issues: Vec<PropertyIssue>) {
        {
            let mut data = self.data.write();
            for issue in &issues {
                let handled = match issue.kind {
                    PropertyIssueKind::Missing => data.on_missing_property(issue),
                    PropertyIssueKind::TypeChanged { .. } => data.on_property_type_changed(issue),
                };
                if !handled {
                    log::warn!(
                        "object {} ('{}'): property '{}' not restored: {:?}",
                        self.id,
                        self.class.name(),
                        issue.property,
                        issue.kind
                    );
                }
            }
            data.on_post_load();
        }
        self.reset_modified();
        self.dispatch(&ObjectEvent::Loaded);
    }

    /// This cell as the opaque object of a serialization context.
    pub(crate) fn as_context_object(self: &Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self.clone()
    }
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        self.context.objects().unregister(self.id);
        self.context.events().remove_key(self.event_key);
    }
}

impl fmt::Debug for ObjectCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCell")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .field("parent", &self.parent_id())
            .field("modified", &self.is_modified())
            .finish()
    }
}
