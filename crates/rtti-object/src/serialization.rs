//! Saving and loading whole objects.
//!
//! XML documents have an `object` root whose `class` attribute names the
//! class; binary data starts with the class name. Both then hold the class
//! properties that differ from the class default. Child objects owned
//! through strong handles are stored inline.

use rtti_core::{
    BinaryReader, BinaryWriter, ClassType, SerializationContext, TypeInfo, XmlNode,
};
use std::ptr;

use crate::class::ObjectClassInfo;
use crate::context::ObjectContext;
use crate::error::LoadError;
use crate::object::{ObjectPtr, object_data, object_data_mut};

const ROOT_ELEMENT: &str = "object";
const CLASS_ATTRIBUTE: &str = "class";

/// Class named `name` if it is an instantiable object class.
fn loadable_class(context: &ObjectContext, name: &str) -> Result<ClassType, LoadError> {
    let Some(class) = context.types().find_class(name) else {
        log::warn!("cannot load object of unknown class '{name}'");
        return Err(LoadError::UnknownClass(name.to_owned()));
    };
    let Some(info) = ObjectClassInfo::of(&class) else {
        log::warn!("cannot load '{name}': not an object class");
        return Err(LoadError::NotAnObjectClass(name.to_owned()));
    };
    if info.factory.is_none() {
        log::warn!("cannot load object of abstract class '{name}'");
        return Err(LoadError::AbstractClass(name.to_owned()));
    }
    Ok(class)
}

fn instantiate(context: &ObjectContext, name: &str) -> Result<ObjectPtr, LoadError> {
    let class = loadable_class(context, name)?;
    context
        .create_object(&class)
        .ok_or_else(|| LoadError::AbstractClass(name.to_owned()))
}

// ============================================================================
// XML
// ============================================================================

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn save_xml(object: &ObjectPtr) -> XmlNode {
    let mut node = XmlNode::new(ROOT_ELEMENT);
    node.set_attribute(CLASS_ATTRIBUTE, object.class().name());
    let types = object.context().types().clone();
    let mut ctx = SerializationContext::new(&types);
    ctx.with_object(object.as_context_object(), |ctx| {
        let guard = object.lock_read();
        unsafe {
            object
                .class()
                .write_xml(ctx, &mut node, object_data(&**guard), ptr::null())
        };
    });
    node
}

pub fn save_xml_string(object: &ObjectPtr) -> String {
    save_xml(object).to_xml_string()
}

/// Create an object from a document produced by [`save_xml`].
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn load_xml(context: &ObjectContext, node: &XmlNode) -> Result<ObjectPtr, LoadError> {
    let Some(name) = node.attribute(CLASS_ATTRIBUTE) else {
        log::warn!("object element '{}' has no class attribute", node.name);
        return Err(LoadError::MissingClass);
    };
    let object = instantiate(context, name)?;
    let mut ctx = SerializationContext::new(context.types());
    let complete = ctx.with_object(object.as_context_object(), |ctx| {
        let mut guard = object.lock_write();
        unsafe {
            object
                .class()
                .read_xml(ctx, node, object_data_mut(&mut **guard))
        }
    });
    if !complete {
        log::warn!("some properties of '{name}' could not be read");
    }
    object.finish_load(ctx.take_issues());
    Ok(object)
}

pub fn load_xml_str(context: &ObjectContext, source: &str) -> Result<ObjectPtr, LoadError> {
    let node = XmlNode::parse(source).inspect_err(|err| log::warn!("malformed object document: {err}"))?;
    load_xml(context, &node)
}

// ============================================================================
// Binary
// ============================================================================

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn save_binary(object: &ObjectPtr) -> Vec<u8> {
    let mut writer = BinaryWriter::new();
    writer.write_str(object.class().name());
    let types = object.context().types().clone();
    let mut ctx = SerializationContext::new(&types);
    ctx.with_object(object.as_context_object(), |ctx| {
        let guard = object.lock_read();
        unsafe {
            object
                .class()
                .write_binary(ctx, &mut writer, object_data(&**guard), ptr::null())
        };
    });
    writer.into_bytes()
}

/// Create an object from data produced by [`save_binary`].
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn load_binary(context: &ObjectContext, bytes: &[u8]) -> Result<ObjectPtr, LoadError> {
    let mut reader = BinaryReader::new(bytes);
    let name = reader.read_str()?;
    let object = instantiate(context, name)?;
    let mut ctx = SerializationContext::new(context.types());
    ctx.with_object(object.as_context_object(), |ctx| {
        let mut guard = object.lock_write();
        unsafe {
            object
                .class()
                .read_binary(ctx, &mut reader, object_data_mut(&mut **guard))
        }
    })
    .inspect_err(|err| log::warn!("cannot load '{name}' object: {err}"))?;
    object.finish_load(ctx.take_issues());
    Ok(object)
}

/// Copy of `object` made by saving and loading it; owned children are copied too.
pub fn clone_object(object: &ObjectPtr) -> Result<ObjectPtr, LoadError> {
    let bytes = save_binary(object);
    load_binary(object.context(), &bytes)
}
