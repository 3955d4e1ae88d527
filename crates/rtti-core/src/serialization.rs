//! State shared by the binary and XML serializers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::holder::DataHolder;
use crate::registry::TypeRegistry;

/// Why a stored property could not be loaded into the current class layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyIssueKind {
    /// The class no longer has a property of this name.
    Missing,
    /// The property exists but its type changed and conversion failed.
    TypeChanged { stored_type: String },
}

/// A stored property that did not load cleanly.
#[derive(Clone)]
pub struct PropertyIssue {
    /// Object being loaded when the issue was found, if any.
    pub owner: Option<Arc<dyn Any + Send + Sync>>,
    pub class_name: String,
    pub property: String,
    pub kind: PropertyIssueKind,
    /// Stored value decoded with its stored type, when that type is known.
    pub stored_value: Option<DataHolder>,
}

impl fmt::Debug for PropertyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyIssue")
            .field("class_name", &self.class_name)
            .field("property", &self.property)
            .field("kind", &self.kind)
            .field("stored_value", &self.stored_value)
            .finish()
    }
}

/// Context threaded through serializer calls.
///
/// `direct_object` is the object whose properties are being processed and
/// `parent_object` the object owning it; both are opaque here and interpreted
/// by the object layer.
pub struct SerializationContext<'a> {
    pub registry: &'a TypeRegistry,
    pub direct_object: Option<Arc<dyn Any + Send + Sync>>,
    pub parent_object: Option<Arc<dyn Any + Send + Sync>>,
    issues: Vec<PropertyIssue>,
}

impl<'a> SerializationContext<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            direct_object: None,
            parent_object: None,
            issues: Vec::new(),
        }
    }

    pub fn report(&mut self, issue: PropertyIssue) {
        log::debug!(
            "property '{}.{}' not loaded: {:?}",
            issue.class_name,
            issue.property,
            issue.kind
        );
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[PropertyIssue] {
        &self.issues
    }

    pub fn take_issues(&mut self) -> Vec<PropertyIssue> {
        std::mem::take(&mut self.issues)
    }

    /// Remove and return the issues reported while `owner` was the direct object.
    pub fn take_issues_of(&mut self, owner: &Arc<dyn Any + Send + Sync>) -> Vec<PropertyIssue> {
        let (owned, rest) = std::mem::take(&mut self.issues)
            .into_iter()
            .partition(|issue| issue.owner.as_ref().is_some_and(|o| Arc::ptr_eq(o, owner)));
        self.issues = rest;
        owned
    }

    /// Run `f` with `object` as the direct object, restoring the previous pair afterwards.
    pub fn with_object<R>(
        &mut self,
        object: Arc<dyn Any + Send + Sync>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let parent = self.parent_object.take();
        let direct = self.direct_object.replace(object);
        self.parent_object = direct.clone();
        let result = f(self);
        self.direct_object = direct;
        self.parent_object = parent;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;

    #[test]
    fn nested_objects_restore_context() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let mut ctx = SerializationContext::new(&registry);
        let outer: Arc<dyn Any + Send + Sync> = Arc::new(1u32);
        let inner: Arc<dyn Any + Send + Sync> = Arc::new(2u32);

        ctx.with_object(outer.clone(), |ctx| {
            ctx.with_object(inner.clone(), |ctx| {
                let direct = ctx.direct_object.as_ref().unwrap();
                let parent = ctx.parent_object.as_ref().unwrap();
                assert!(Arc::ptr_eq(direct, &inner));
                assert!(Arc::ptr_eq(parent, &outer));
            });
            assert!(Arc::ptr_eq(ctx.direct_object.as_ref().unwrap(), &outer));
            assert!(ctx.parent_object.is_none());
        });
        assert!(ctx.direct_object.is_none());
    }

    #[test]
    fn issues_are_collected() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let mut ctx = SerializationContext::new(&registry);
        ctx.report(PropertyIssue {
            owner: None,
            class_name: "Mesh".into(),
            property: "old".into(),
            kind: PropertyIssueKind::Missing,
            stored_value: None,
        });
        assert_eq!(ctx.issues().len(), 1);
        assert_eq!(ctx.take_issues()[0].property, "old");
        assert!(ctx.issues().is_empty());
    }

    #[test]
    fn issues_split_by_owner() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let mut ctx = SerializationContext::new(&registry);
        let child: Arc<dyn Any + Send + Sync> = Arc::new(7u8);
        for owner in [Some(child.clone()), None] {
            ctx.report(PropertyIssue {
                owner,
                class_name: "Mesh".into(),
                property: "lod".into(),
                kind: PropertyIssueKind::Missing,
                stored_value: None,
            });
        }
        assert_eq!(ctx.take_issues_of(&child).len(), 1);
        assert_eq!(ctx.issues().len(), 1);
        assert!(ctx.issues()[0].owner.is_none());
    }
}
