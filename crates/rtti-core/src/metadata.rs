//! Typed descriptive tags attached to types, properties and functions.
//!
//! A [`MetadataContainer`] holds at most one instance of each metadata type.
//! Metadata types are plain Rust types implementing [`Metadata`]; since
//! [`MetadataContainer::add_metadata`] needs `M: Default`, only concrete,
//! constructible metadata can ever be attached.
//!
//! ```
//! use rtti_core::{MetadataContainer, metadata::Comment};
//!
//! let container = MetadataContainer::new();
//! container.attach(Comment::new("Diffuse color"));
//! assert_eq!(container.metadata::<Comment>().unwrap().text(), "Diffuse color");
//! ```

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::error::{LifecycleError, RegistrationError, fatal};

/// A typed descriptive tag.
pub trait Metadata: Any + Send + Sync + fmt::Debug {
    /// Name of the metadata kind, used in diagnostics.
    fn metadata_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

struct MetadataEntry {
    type_id: TypeId,
    any: Arc<dyn Any + Send + Sync>,
    meta: Arc<dyn Metadata>,
}

impl MetadataEntry {
    fn new<M: Metadata>(value: Arc<M>) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            any: value.clone(),
            meta: value,
        }
    }

    fn downcast<M: Metadata>(&self) -> Option<Arc<M>> {
        self.any.clone().downcast::<M>().ok()
    }
}

/// Set of metadata, at most one per metadata type.
#[derive(Default)]
pub struct MetadataContainer {
    entries: RwLock<Vec<MetadataEntry>>,
}

impl MetadataContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the attached `M`, creating a default one if absent.
    pub fn add_metadata<M: Metadata + Default>(&self) -> Arc<M> {
        if let Some(existing) = self.metadata::<M>() {
            return existing;
        }

        let mut entries = self.entries.write();
        // another thread may have attached it between the two locks
        if let Some(existing) = entries
            .iter()
            .find(|e| e.type_id == TypeId::of::<M>())
            .and_then(MetadataEntry::downcast::<M>)
        {
            return existing;
        }
        let value = Arc::new(M::default());
        entries.push(MetadataEntry::new(value.clone()));
        value
    }

    /// Attach a configured metadata value. Attaching the same kind twice is fatal.
    pub fn attach<M: Metadata>(&self, value: M) -> Arc<M> {
        match self.try_attach(value) {
            Ok(value) => value,
            Err(err) => fatal(err),
        }
    }

    /// Attach a metadata value, failing if the kind is already present.
    pub fn try_attach<M: Metadata>(&self, value: M) -> Result<Arc<M>, RegistrationError> {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.type_id == TypeId::of::<M>()) {
            return Err(RegistrationError::DuplicateMetadata(
                std::any::type_name::<M>(),
            ));
        }
        let value = Arc::new(value);
        entries.push(MetadataEntry::new(value.clone()));
        Ok(value)
    }

    /// Soft lookup.
    pub fn metadata<M: Metadata>(&self) -> Option<Arc<M>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.type_id == TypeId::of::<M>())
            .and_then(MetadataEntry::downcast::<M>)
    }

    /// Lookup of metadata that must exist; absence is fatal.
    pub fn require_metadata<M: Metadata>(&self) -> Arc<M> {
        match self.metadata::<M>() {
            Some(value) => value,
            None => fatal(LifecycleError::MissingMetadata(std::any::type_name::<M>())),
        }
    }

    pub fn has_metadata<M: Metadata>(&self) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| e.type_id == TypeId::of::<M>())
    }

    /// All attached metadata in attachment order.
    pub fn collect(&self) -> Vec<Arc<dyn Metadata>> {
        self.entries.read().iter().map(|e| e.meta.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for MetadataContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.read().iter().map(|e| e.meta.metadata_name()))
            .finish()
    }
}

// ============================================================================
// Standard Metadata
// ============================================================================

/// Short alias under which a type can also be found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortTypeName(pub String);

impl ShortTypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Metadata for ShortTypeName {}

/// Human readable description shown by inspectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment(pub String);

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

impl Metadata for Comment {}

/// Editing range for numeric properties.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

impl Metadata for Range {}

/// Name of a custom editor widget for a property or type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomEditor(pub String);

impl CustomEditor {
    pub fn new(editor: impl Into<String>) -> Self {
        Self(editor.into())
    }
}

impl Metadata for CustomEditor {}

/// Services a class needs to be running before it can be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependsOnService(pub Vec<String>);

impl DependsOnService {
    pub fn new<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(services.into_iter().map(Into::into).collect())
    }

    pub fn services(&self) -> &[String] {
        &self.0
    }
}

impl Metadata for DependsOnService {}

/// Source file extensions a class can import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFormat(pub Vec<String>);

impl SourceFormat {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(extensions.into_iter().map(Into::into).collect())
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.0.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }
}

impl Metadata for SourceFormat {}

/// Data version of a class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassVersion(pub u32);

impl Metadata for ClassVersion {}
