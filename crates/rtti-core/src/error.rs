//! Error types for the type system.
//!
//! ## Error Hierarchy
//!
//! ```text
//! RttiError (top-level wrapper)
//! ├── RegistrationError - duplicate names, missing class operations, unresolved types
//! ├── LifecycleError    - descriptor misuse (premature default object, abstract construction)
//! ├── DataViewError     - path-addressed read/write failures
//! ├── CallError         - reflected function calls with bad arguments
//! ├── StreamError       - malformed binary input
//! └── XmlError          - malformed XML input
//! ```
//!
//! Registration and lifecycle errors are programmer errors. The registry raises
//! them through [`fatal`], which logs and then panics (the release profile aborts
//! on panic). The remaining errors are ordinary recoverable results.

use thiserror::Error;

// ============================================================================
// Programmer Errors
// ============================================================================

/// Errors raised while registering types or building descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A type with this name is already registered.
    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    /// An alternative (short) name is already taken by another type.
    #[error("alternative name '{alias}' of type '{type_name}' is already taken by '{existing}'")]
    DuplicateAlternativeName {
        alias: String,
        type_name: String,
        existing: String,
    },

    /// A concrete class lacks an operation it cannot work without.
    #[error("class '{class}' is missing required operation '{operation}'")]
    MissingOperation {
        class: String,
        operation: &'static str,
    },

    /// A property refers to a type the registry cannot resolve.
    #[error("property '{class}.{property}' uses unknown type '{type_name}'")]
    UnresolvedPropertyType {
        class: String,
        property: String,
        type_name: String,
    },

    /// A class names a base class that is not registered.
    #[error("class '{class}' derives from unknown class '{base}'")]
    UnknownBaseClass { class: String, base: String },

    /// A class is (indirectly) its own base.
    #[error("class '{0}' has a cyclic base class chain")]
    CyclicBase(String),

    /// Two properties of a class share a name.
    #[error("class '{class}' declares property '{property}' more than once")]
    DuplicateProperty { class: String, property: String },

    /// Metadata of this kind is already attached to the owner.
    #[error("metadata '{0}' is already attached")]
    DuplicateMetadata(&'static str),

    /// A property's Rust field does not match the layout of its registered type.
    #[error("property '{class}.{property}' has size {field_size} but type '{type_name}' has size {type_size}")]
    PropertySizeMismatch {
        class: String,
        property: String,
        type_name: String,
        field_size: usize,
        type_size: usize,
    },

    /// Enum storage must be 1, 2, 4 or 8 bytes wide.
    #[error("enum '{name}' has unsupported size {size}")]
    UnsupportedEnumSize { name: String, size: usize },

    /// An enum was registered without options.
    #[error("enum '{0}' has no options")]
    EmptyEnum(String),

    /// A global function with this name is already registered.
    #[error("function '{0}' is already registered")]
    DuplicateFunction(String),
}

/// Errors raised by misuse of a descriptor at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A default object was requested before the registry finished bootstrap.
    #[error("default object of '{0}' requested before bootstrap completed")]
    PrematureDefaultObject(String),

    /// Class layout requested before the registry resolved it.
    #[error("class '{0}' used before bootstrap completed")]
    UnresolvedClass(String),

    /// Property type requested before the registry resolved it.
    #[error("type of property '{class}.{property}' requested before bootstrap completed")]
    UnresolvedProperty { class: String, property: String },

    /// An abstract class cannot produce instances.
    #[error("abstract class '{0}' cannot be constructed")]
    AbstractConstruction(String),

    /// Metadata declared as required is missing.
    #[error("required metadata '{0}' is missing")]
    MissingMetadata(&'static str),

    /// Size and alignment of a type do not form a valid memory layout.
    #[error("type '{0}' has an invalid memory layout")]
    InvalidLayout(String),
}

// ============================================================================
// Data View Errors
// ============================================================================

/// Failures of a path-addressed data view operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataViewError {
    /// The path names a member that does not exist.
    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    /// The operation is not allowed for this value (including vetoed changes).
    #[error("illegal operation")]
    IllegalOperation,

    /// The value exists but cannot be accessed this way.
    #[error("illegal access")]
    IllegalAccess,

    /// The path goes through an empty object handle.
    #[error("null object")]
    NullObject,

    /// The value is read only.
    #[error("value is read only")]
    ReadOnly,

    /// The value cannot be converted between the two types.
    #[error("cannot convert '{from}' to '{to}'")]
    TypeConversion { from: String, to: String },

    /// An array index is outside the array.
    #[error("index {index} out of range for array of size {size}")]
    IndexOutOfRange { index: usize, size: usize },
}

/// Result of a data view operation.
pub type DataViewResult<T = ()> = Result<T, DataViewError>;

/// Failures of a reflected function call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("function '{function}' expects {expected} arguments, got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("argument {index} of '{function}' must be '{expected}', got '{got}'")]
    ArgumentType {
        function: String,
        index: usize,
        expected: String,
        got: String,
    },

    /// A method was called without an object.
    #[error("method '{0}' called without an object")]
    MissingObject(String),
}

// ============================================================================
// Input Errors
// ============================================================================

/// Errors produced while decoding binary data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream ended before the requested data.
    #[error("unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A string was not valid UTF-8.
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    /// A value was decoded but is not valid for its type.
    #[error("invalid value for type '{type_name}': {detail}")]
    InvalidValue { type_name: String, detail: String },

    /// A header did not match.
    #[error("bad stream header")]
    BadHeader,
}

/// Errors produced while decoding XML documents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    /// The XML text is not well formed.
    #[error("XML parse error: {0}")]
    Parse(String),

    /// The document has no root element.
    #[error("XML document has no root element")]
    MissingRoot,

    /// An element closes without a matching open tag.
    #[error("unbalanced XML element '{0}'")]
    Unbalanced(String),
}

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        XmlError::Parse(err.to_string())
    }
}

// ============================================================================
// Unified Error
// ============================================================================

/// Top-level error type for the type system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RttiError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    DataView(#[from] DataViewError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Report a programmer error and stop.
///
/// Logs the error and panics; with `panic = "abort"` this terminates the process.
#[track_caller]
#[cold]
pub fn fatal(error: impl Into<RttiError>) -> ! {
    let error = error.into();
    log::error!("fatal: {error}");
    panic!("{error}");
}
