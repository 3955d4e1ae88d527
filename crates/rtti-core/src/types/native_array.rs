//! Fixed size inline arrays: `[N]T`.

use std::borrow::Cow;
use std::ptr;

use crate::data_view::{
    DataViewInfo, DataViewInfoFlags, describe_data_view, parse_array_index, read_data_view,
    write_data_view,
};
use crate::error::{DataViewError, DataViewResult, StreamError};
use crate::meta_type::{MetaType, TypeFlags, TypeTraits};
use crate::metadata::MetadataContainer;
use crate::registry::{TypeCreator, TypeRegistry};
use crate::serialization::SerializationContext;
use crate::stream::{BinaryReader, BinaryWriter};
use crate::text::{BracketItems, TextFlags, parse_string, print_string};
use crate::type_info::{Reflect, Type, TypeInfo};
use crate::xml::XmlNode;

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("[{N}]{}", T::type_name()))
    }
}

/// Descriptor of `[N]T`, stored as `N` consecutive elements.
pub struct NativeArrayType {
    name: String,
    traits: TypeTraits,
    metadata: MetadataContainer,
    inner: Type,
    len: usize,
}

impl NativeArrayType {
    pub fn new(inner: Type, len: usize) -> Self {
        let inner_traits = *inner.traits();
        let flags = inner_traits.flags
            & (TypeFlags::ZERO_INIT
                | TypeFlags::TRIVIAL_COPY
                | TypeFlags::TRIVIAL_COMPARE
                | TypeFlags::TRIVIAL_DESTRUCT);
        Self {
            name: format!("[{len}]{}", inner.name()),
            traits: TypeTraits::sized(
                MetaType::NativeArray,
                inner_traits.stride() * len,
                inner_traits.alignment,
                flags,
            ),
            metadata: MetadataContainer::new(),
            inner,
            len,
        }
    }

    pub fn inner(&self) -> &Type {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn stride(&self) -> usize {
        self.inner.traits().stride()
    }

    fn is_char(&self) -> bool {
        self.inner.name() == "char"
    }

    /// Element pointer, or null when `index` is out of range.
    pub fn element(&self, data: *const u8, index: usize) -> *const u8 {
        if index < self.len {
            data.wrapping_add(index * self.stride())
        } else {
            ptr::null()
        }
    }

    pub fn element_mut(&self, data: *mut u8, index: usize) -> *mut u8 {
        self.element(data, index) as *mut u8
    }

    /// Only the declared size is accepted.
    pub fn resize(&self, new_size: usize) -> bool {
        new_size == self.len
    }

    /// Reset elements from `start` on to their default value.
    unsafe fn reset_tail(&self, data: *mut u8, start: usize) {
        if start >= self.len {
            return;
        }
        if self.inner.traits().is_trivial() {
            let stride = self.stride();
            unsafe { ptr::write_bytes(data.add(start * stride), 0, (self.len - start) * stride) };
        } else {
            for i in start..self.len {
                let element = self.element_mut(data, i);
                unsafe {
                    self.inner.destruct(element);
                    self.inner.construct(element);
                }
            }
        }
    }

    /// Characters up to the first zero terminator.
    unsafe fn read_chars(&self, data: *const u8) -> String {
        (0..self.len)
            .map(|i| unsafe { *(self.element(data, i) as *const char) })
            .take_while(|&c| c != '\0')
            .collect()
    }

    /// Store `text` as a zero terminated C string, truncating to fit.
    unsafe fn write_chars(&self, data: *mut u8, text: &str) {
        let mut count = 0;
        for (i, ch) in text.chars().take(self.len.saturating_sub(1)).enumerate() {
            unsafe { *(self.element_mut(data, i) as *mut char) = ch };
            count = i + 1;
        }
        unsafe { self.reset_tail(data, count) };
    }

    fn split_index<'p>(path: &'p str) -> DataViewResult<(usize, &'p str)> {
        let mut rest = path;
        let index = parse_array_index(&mut rest)
            .ok_or_else(|| DataViewError::UnknownProperty(path.to_owned()))?;
        Ok((index, rest))
    }

    fn checked_element(&self, data: *const u8, index: usize) -> DataViewResult<*const u8> {
        let element = self.element(data, index);
        if element.is_null() {
            Err(DataViewError::IndexOutOfRange {
                index,
                size: self.len,
            })
        } else {
            Ok(element)
        }
    }
}

impl TypeInfo for NativeArrayType {
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
        Some(self.inner.clone())
    }

    unsafe fn construct(&self, data: *mut u8) {
        if self.inner.traits().flags.contains(TypeFlags::ZERO_INIT) {
            unsafe { ptr::write_bytes(data, 0, self.traits.size) };
            return;
        }
        for i in 0..self.len {
            unsafe { self.inner.construct(self.element_mut(data, i)) };
        }
    }

    unsafe fn destruct(&self, data: *mut u8) {
        if self.traits.flags.contains(TypeFlags::TRIVIAL_DESTRUCT) {
            return;
        }
        for i in 0..self.len {
            unsafe { self.inner.destruct(self.element_mut(data, i)) };
        }
    }

    unsafe fn compare(&self, a: *const u8, b: *const u8) -> bool {
        (0..self.len).all(|i| unsafe { self.inner.compare(self.element(a, i), self.element(b, i)) })
    }

    unsafe fn copy(&self, dest: *mut u8, src: *const u8) {
        if ptr::eq(dest, src) {
            return;
        }
        for i in 0..self.len {
            unsafe { self.inner.copy(self.element_mut(dest, i), self.element(src, i)) };
        }
    }

    unsafe fn print_to_text(&self, out: &mut String, data: *const u8, flags: TextFlags) {
        if self.is_char() {
            let text = unsafe { self.read_chars(data) };
            print_string(out, &text, flags);
            return;
        }
        for i in 0..self.len {
            out.push('[');
            unsafe { self.inner.print_to_text(out, self.element(data, i), TextFlags::NESTED) };
            out.push(']');
        }
    }

    unsafe fn parse_from_text(&self, text: &str, data: *mut u8, _flags: TextFlags) -> bool {
        if self.is_char() {
            let Some(decoded) = parse_string(text) else {
                return false;
            };
            unsafe { self.write_chars(data, &decoded) };
            return true;
        }
        let mut count = 0;
        for item in BracketItems::new(text) {
            let Ok(item) = item else {
                return false;
            };
            // items past the declared size are ignored
            if count == self.len {
                break;
            }
            if !unsafe {
                self.inner
                    .parse_from_text(item, self.element_mut(data, count), TextFlags::NESTED)
            } {
                return false;
            }
            count += 1;
        }
        unsafe { self.reset_tail(data, count) };
        true
    }

    unsafe fn write_binary(
        &self,
        ctx: &mut SerializationContext<'_>,
        writer: &mut BinaryWriter,
        data: *const u8,
        _default: *const u8,
    ) {
        if self.is_char() {
            writer.write_str(&unsafe { self.read_chars(data) });
            return;
        }
        writer.write_u32(self.len as u32);
        for i in 0..self.len {
            unsafe {
                self.inner
                    .write_binary(ctx, writer, self.element(data, i), ptr::null())
            };
        }
    }

    unsafe fn read_binary(
        &self,
        ctx: &mut SerializationContext<'_>,
        reader: &mut BinaryReader<'_>,
        data: *mut u8,
    ) -> Result<(), StreamError> {
        if self.is_char() {
            let text = reader.read_str()?;
            unsafe { self.write_chars(data, text) };
            return Ok(());
        }
        let count = reader.read_u32()? as usize;
        let mut scratch = None;
        for i in 0..count {
            if i < self.len {
                unsafe { self.inner.read_binary(ctx, reader, self.element_mut(data, i))? };
            } else {
                // decode and drop stored elements that no longer fit
                let holder =
                    scratch.get_or_insert_with(|| crate::holder::DataHolder::new(&self.inner));
                unsafe { self.inner.read_binary(ctx, reader, holder.data_mut())? };
            }
        }
        unsafe { self.reset_tail(data, count) };
        Ok(())
    }

    unsafe fn write_xml(
        &self,
        ctx: &mut SerializationContext<'_>,
        node: &mut XmlNode,
        data: *const u8,
        _default: *const u8,
    ) {
        if self.is_char() {
            unsafe { self.print_to_text(&mut node.text, data, TextFlags::empty()) };
            return;
        }
        for i in 0..self.len {
            let mut element = XmlNode::new("element");
            unsafe {
                self.inner
                    .write_xml(ctx, &mut element, self.element(data, i), ptr::null())
            };
            node.push_child(element);
        }
    }

    unsafe fn read_xml(&self, ctx: &mut SerializationContext<'_>, node: &XmlNode, data: *mut u8) -> bool {
        if self.is_char() {
            return unsafe { self.parse_from_text(&node.text, data, TextFlags::empty()) };
        }
        let mut count = 0;
        for child in node.children_named("element").take(self.len) {
            if !unsafe { self.inner.read_xml(ctx, child, self.element_mut(data, count)) } {
                return false;
            }
            count += 1;
        }
        unsafe { self.reset_tail(data, count) };
        true
    }

    unsafe fn describe_view(&self, path: &str, data: *const u8, info: &mut DataViewInfo) -> DataViewResult {
        if path.is_empty() {
            info.flags |= DataViewInfoFlags::LIKE_ARRAY;
            info.array_size = Some(self.len);
            return Ok(());
        }
        let (index, rest) = Self::split_index(path)?;
        let element = self.checked_element(data, index)?;
        unsafe { describe_data_view(&self.inner, rest, element, info) }
    }

    unsafe fn read_view(
        &self,
        path: &str,
        data: *const u8,
        target: *mut u8,
        target_type: &Type,
    ) -> DataViewResult {
        let (index, rest) = Self::split_index(path)?;
        let element = self.checked_element(data, index)?;
        unsafe { read_data_view(&self.inner, rest, element, target, target_type) }
    }

    unsafe fn write_view(
        &self,
        path: &str,
        data: *mut u8,
        source: *const u8,
        source_type: &Type,
    ) -> DataViewResult {
        let (index, rest) = Self::split_index(path)?;
        let element = self.checked_element(data, index)? as *mut u8;
        unsafe { write_data_view(&self.inner, rest, element, source, source_type) }
    }
}

/// Creates `[N]T` types on lookup.
pub struct NativeArrayCreator;

impl NativeArrayCreator {
    /// Split `[N]T` into `N` and `T`.
    pub fn split_name(name: &str) -> Option<(usize, &str)> {
        let rest = name.strip_prefix('[')?;
        let end = rest.find(']')?;
        let len = rest[..end].parse().ok()?;
        let inner = &rest[end + 1..];
        (!inner.is_empty()).then_some((len, inner))
    }
}

impl TypeCreator for NativeArrayCreator {
    fn prefix(&self) -> &str {
        "["
    }

    fn create(&self, registry: &TypeRegistry, name: &str) -> Option<Type> {
        let (len, inner) = Self::split_name(name)?;
        if len == 0 {
            return None;
        }
        let inner = registry.find_type(inner)?;
        Some(Type::new(NativeArrayType::new(inner, len)))
    }
}
