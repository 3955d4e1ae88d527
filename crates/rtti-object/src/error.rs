//! Error types for the object model.
//!
//! ```text
//! ObjectError
//! ├── ParentCycle - parent assignment would create a cycle
//! ├── DataView    - path-addressed access failed (including vetoed writes)
//! └── Load        - an object could not be restored from XML or binary data
//! ```

use rtti_core::{DataViewError, StreamError, XmlError};
use thiserror::Error;

use crate::registry::ObjectId;

/// Failures while restoring an object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The root element carries no `class` attribute.
    #[error("object element has no class attribute")]
    MissingClass,

    #[error("unknown object class '{0}'")]
    UnknownClass(String),

    /// The class exists but cannot be instantiated.
    #[error("object class '{0}' is abstract")]
    AbstractClass(String),

    /// The class is registered but is not an object class.
    #[error("class '{0}' is not an object class")]
    NotAnObjectClass(String),
}

/// Errors of object operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// The new parent is the object itself or one of its descendants.
    #[error("object {object} cannot be parented to its descendant {parent}")]
    ParentCycle { object: ObjectId, parent: ObjectId },

    #[error(transparent)]
    DataView(#[from] DataViewError),

    #[error(transparent)]
    Load(#[from] LoadError),
}
