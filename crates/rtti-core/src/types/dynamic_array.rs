//! Dynamic arrays: `array<T>`.
//!
//! [`Array<T>`] is the typed Rust view and [`ArrayType`] the type-erased
//! descriptor. Both operate on the same [`RawArray`] header, so a struct field
//! of type `Array<f32>` can be edited through `array<float>` and vice versa.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ops::{Deref, DerefMut};
use std::ptr;

use crate::error::{DataViewError, DataViewResult, StreamError};
use crate::data_view::{
    DataViewInfo, DataViewInfoFlags, describe_data_view, parse_array_index, read_data_view,
    write_data_view,
};
use crate::meta_type::{MetaType, TypeFlags, TypeTraits};
use crate::metadata::MetadataContainer;
use crate::registry::{TypeCreator, TypeRegistry};
use crate::serialization::SerializationContext;
use crate::stream::{BinaryReader, BinaryWriter};
use crate::text::{BracketItems, TextFlags, parse_string, print_string};
use crate::type_info::{Reflect, Type, TypeInfo};
use crate::types::strip_template;
use crate::xml::XmlNode;

// ============================================================================
// Storage
// ============================================================================

/// Header of a dynamic array: element buffer, length and capacity.
///
/// An empty array with no capacity points at a dangling, aligned address.
#[repr(C)]
pub struct RawArray {
    data: *mut u8,
    size: usize,
    capacity: usize,
}

impl RawArray {
    fn empty(alignment: usize) -> Self {
        Self {
            data: ptr::without_provenance_mut(alignment.max(1)),
            size: 0,
            capacity: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn buffer_layout(stride: usize, alignment: usize, capacity: usize) -> Layout {
        match Layout::from_size_align(stride * capacity, alignment.max(1)) {
            Ok(layout) => layout,
            Err(_) => handle_alloc_error(Layout::new::<u8>()),
        }
    }

    /// Grow the buffer to hold at least `min_capacity` elements. Elements are
    /// moved bitwise.
    fn reserve(&mut self, stride: usize, alignment: usize, min_capacity: usize) {
        if min_capacity <= self.capacity || stride == 0 {
            if stride == 0 {
                self.capacity = self.capacity.max(min_capacity);
            }
            return;
        }
        let capacity = min_capacity.max(self.capacity * 2).max(4);
        let layout = Self::buffer_layout(stride, alignment, capacity);
        let data = unsafe { alloc(layout) };
        if data.is_null() {
            handle_alloc_error(layout);
        }
        if self.capacity > 0 {
            unsafe {
                ptr::copy_nonoverlapping(self.data, data, self.size * stride);
                dealloc(self.data, Self::buffer_layout(stride, alignment, self.capacity));
            }
        }
        self.data = data;
        self.capacity = capacity;
    }

    /// Free the buffer. Elements must already be destroyed.
    fn release(&mut self, stride: usize, alignment: usize) {
        if self.capacity > 0 && stride > 0 {
            unsafe { dealloc(self.data, Self::buffer_layout(stride, alignment, self.capacity)) };
        }
        *self = Self::empty(alignment);
    }

    #[inline]
    fn element(&self, stride: usize, index: usize) -> *mut u8 {
        unsafe { self.data.add(index * stride) }
    }
}

// ============================================================================
// Typed array
// ============================================================================

/// Growable array of `T` with a reflected layout.
#[repr(transparent)]
pub struct Array<T> {
    raw: RawArray,
    _marker: PhantomData<T>,
}

// SAFETY: Array<T> owns its elements like Vec<T>.
unsafe impl<T: Send> Send for Array<T> {}
unsafe impl<T: Sync> Sync for Array<T> {}

impl<T> Array<T> {
    const STRIDE: usize = if size_of::<T>() > align_of::<T>() {
        size_of::<T>()
    } else {
        align_of::<T>()
    };

    pub fn new() -> Self {
        Self {
            raw: RawArray::empty(align_of::<T>()),
            _marker: PhantomData,
        }
    }

    pub fn push(&mut self, value: T) {
        let size = self.raw.size;
        self.raw.reserve(Self::STRIDE, align_of::<T>(), size + 1);
        unsafe { (self.raw.element(Self::STRIDE, size) as *mut T).write(value) };
        self.raw.size += 1;
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.raw.size == 0 {
            return None;
        }
        self.raw.size -= 1;
        Some(unsafe { (self.raw.element(Self::STRIDE, self.raw.size) as *mut T).read() })
    }

    pub fn insert(&mut self, index: usize, value: T) {
        assert!(index <= self.raw.size, "insert index out of range");
        let size = self.raw.size;
        self.raw.reserve(Self::STRIDE, align_of::<T>(), size + 1);
        unsafe {
            let at = self.raw.element(Self::STRIDE, index);
            ptr::copy(at, at.add(Self::STRIDE), (size - index) * Self::STRIDE);
            (at as *mut T).write(value);
        }
        self.raw.size += 1;
    }

    pub fn remove(&mut self, index: usize) -> T {
        assert!(index < self.raw.size, "remove index out of range");
        unsafe {
            let at = self.raw.element(Self::STRIDE, index);
            let value = (at as *mut T).read();
            ptr::copy(at.add(Self::STRIDE), at, (self.raw.size - index - 1) * Self::STRIDE);
            self.raw.size -= 1;
            value
        }
    }

    pub fn clear(&mut self) {
        let size = self.raw.size;
        self.raw.size = 0;
        for index in 0..size {
            unsafe { ptr::drop_in_place(self.raw.element(Self::STRIDE, index) as *mut T) };
        }
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.raw.data as *const T, self.raw.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.raw.data as *mut T, self.raw.size) }
    }

    pub fn capacity(&self) -> usize {
        self.raw.capacity
    }
}

impl<T> Drop for Array<T> {
    fn drop(&mut self) {
        self.clear();
        self.raw.release(Self::STRIDE, align_of::<T>());
    }
}

impl<T> Default for Array<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for Array<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for Array<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Clone> Clone for Array<T> {
    fn clone(&self) -> Self {
        self.iter().cloned().collect()
    }
}

impl<T: PartialEq> PartialEq for Array<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> FromIterator<T> for Array<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::new();
        for value in iter {
            array.push(value);
        }
        array
    }
}

impl<T> From<Vec<T>> for Array<T> {
    fn from(values: Vec<T>) -> Self {
        values.into_iter().collect()
    }
}

impl<T: Reflect> Reflect for Array<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("array<{}>", T::type_name()))
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// Descriptor of `array<T>`.
pub struct ArrayType {
    name: String,
    traits: TypeTraits,
    metadata: MetadataContainer,
    inner: Type,
}

enum ArrayEncoding {
    Elements,
    /// `array<uint8>`: base64 text.
    Bytes,
    /// `array<char>`: C-escaped string.
    Chars,
}

impl ArrayType {
    pub fn new(inner: Type) -> Self {
        Self {
            name: format!("array<{}>", inner.name()),
            traits: TypeTraits::sized(
                MetaType::Array,
                size_of::<RawArray>(),
                align_of::<RawArray>(),
                TypeFlags::empty(),
            ),
            metadata: MetadataContainer::new(),
            inner,
        }
    }

    pub fn inner(&self) -> &Type {
        &self.inner
    }

    fn stride(&self) -> usize {
        self.inner.traits().stride()
    }

    fn alignment(&self) -> usize {
        self.inner.traits().alignment
    }

    fn encoding(&self) -> ArrayEncoding {
        match self.inner.name() {
            "uint8" => ArrayEncoding::Bytes,
            "char" => ArrayEncoding::Chars,
            _ => ArrayEncoding::Elements,
        }
    }

    /// # Safety
    ///
    /// `data` must point to a constructed `array<T>` of this type (here and in
    /// every other accessor).
    pub unsafe fn size(&self, data: *const u8) -> usize {
        unsafe { (*(data as *const RawArray)).size }
    }

    /// Element pointer, or null when `index` is out of range.
    ///
    /// # Safety
    ///
    /// See [`size`](Self::size).
    pub unsafe fn element(&self, data: *const u8, index: usize) -> *const u8 {
        let raw = unsafe { &*(data as *const RawArray) };
        if index < raw.size {
            raw.element(self.stride(), index)
        } else {
            ptr::null()
        }
    }

    /// Mutable element pointer, or null when `index` is out of range.
    ///
    /// # Safety
    ///
    /// See [`size`](Self::size).
    pub unsafe fn element_mut(&self, data: *mut u8, index: usize) -> *mut u8 {
        unsafe { self.element(data, index) as *mut u8 }
    }

    /// Resize, default constructing new elements and destroying removed ones.
    ///
    /// # Safety
    ///
    /// See [`size`](Self::size).
    pub unsafe fn resize(&self, data: *mut u8, new_size: usize) {
        let raw = unsafe { &mut *(data as *mut RawArray) };
        let stride = self.stride();
        if new_size > raw.size {
            raw.reserve(stride, self.alignment(), new_size);
            for index in raw.size..new_size {
                unsafe { self.inner.construct(raw.element(stride, index)) };
            }
        } else {
            for index in new_size..raw.size {
                unsafe { self.inner.destruct(raw.element(stride, index)) };
            }
        }
        raw.size = new_size;
    }

    /// Insert a default element at `index`; returns null when `index > size`.
    ///
    /// # Safety
    ///
    /// See [`size`](Self::size).
    pub unsafe fn insert(&self, data: *mut u8, index: usize) -> *mut u8 {
        let raw = unsafe { &mut *(data as *mut RawArray) };
        if index > raw.size {
            return ptr::null_mut();
        }
        let stride = self.stride();
        raw.reserve(stride, self.alignment(), raw.size + 1);
        unsafe {
            let at = raw.element(stride, index);
            ptr::copy(at, at.add(stride), (raw.size - index) * stride);
            self.inner.construct(at);
            raw.size += 1;
            at
        }
    }

    /// Remove the element at `index`; false when out of range.
    ///
    /// # Safety
    ///
    /// See [`size`](Self::size).
    pub unsafe fn erase(&self, data: *mut u8, index: usize) -> bool {
        let raw = unsafe { &mut *(data as *mut RawArray) };
        if index >= raw.size {
            return false;
        }
        let stride = self.stride();
        unsafe {
            let at = raw.element(stride, index);
            self.inner.destruct(at);
            ptr::copy(at.add(stride), at, (raw.size - index - 1) * stride);
        }
        raw.size -= 1;
        true
    }

    /// # Safety
    ///
    /// See [`size`](Self::size).
    pub unsafe fn clear(&self, data: *mut u8) {
        unsafe { self.resize(data, 0) };
    }

    /// Build a new array in a temporary and move it into `data` on success.
    unsafe fn replace_with(&self, data: *mut u8, fill: impl FnOnce(*mut u8) -> bool) -> bool {
        let mut temp = RawArray::empty(self.alignment());
        let temp_ptr = &mut temp as *mut RawArray as *mut u8;
        let ok = fill(temp_ptr);
        if ok {
            unsafe { std::mem::swap(&mut *(data as *mut RawArray), &mut temp) };
        }
        // temp now holds either the failed build or the previous contents
        unsafe { self.destruct(temp_ptr) };
        ok
    }

    unsafe fn as_bytes<'a>(&self, data: *const u8) -> &'a [u8] {
        let raw = unsafe { &*(data as *const RawArray) };
        unsafe { std::slice::from_raw_parts(raw.data, raw.size) }
    }

    unsafe fn set_bytes(&self, data: *mut u8, bytes: &[u8]) {
        unsafe {
            self.resize(data, bytes.len());
            let raw = &*(data as *const RawArray);
            ptr::copy_nonoverlapping(bytes.as_ptr(), raw.data, bytes.len());
        }
    }

    unsafe fn set_chars(&self, data: *mut u8, text: &str) {
        let chars: Vec<char> = text.chars().collect();
        unsafe {
            self.resize(data, chars.len());
            let raw = &*(data as *const RawArray);
            ptr::copy_nonoverlapping(chars.as_ptr(), raw.data as *mut char, chars.len());
        }
    }

    fn split_index<'p>(path: &'p str) -> DataViewResult<(usize, &'p str)> {
        let mut rest = path;
        let index = parse_array_index(&mut rest)
            .ok_or_else(|| DataViewError::UnknownProperty(path.to_owned()))?;
        Ok((index, rest))
    }

    unsafe fn checked_element(&self, data: *const u8, index: usize) -> DataViewResult<*const u8> {
        let element = unsafe { self.element(data, index) };
        if element.is_null() {
            Err(DataViewError::IndexOutOfRange {
                index,
                size: unsafe { self.size(data) },
            })
        } else {
            Ok(element)
        }
    }
}

impl TypeInfo for ArrayType {
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
        unsafe { (data as *mut RawArray).write(RawArray::empty(self.alignment())) };
    }

    unsafe fn destruct(&self, data: *mut u8) {
        unsafe {
            self.clear(data);
            (*(data as *mut RawArray)).release(self.stride(), self.alignment());
        }
    }

    unsafe fn compare(&self, a: *const u8, b: *const u8) -> bool {
        let size = unsafe { self.size(a) };
        if size != unsafe { self.size(b) } {
            return false;
        }
        (0..size).all(|i| unsafe { self.inner.compare(self.element(a, i), self.element(b, i)) })
    }

    unsafe fn copy(&self, dest: *mut u8, src: *const u8) {
        if ptr::eq(dest, src) {
            return;
        }
        unsafe {
            let size = self.size(src);
            self.resize(dest, size);
            for i in 0..size {
                self.inner.copy(self.element_mut(dest, i), self.element(src, i));
            }
        }
    }

    unsafe fn print_to_text(&self, out: &mut String, data: *const u8, flags: TextFlags) {
        match self.encoding() {
            ArrayEncoding::Bytes => out.push_str(&BASE64.encode(unsafe { self.as_bytes(data) })),
            ArrayEncoding::Chars => {
                let size = unsafe { self.size(data) };
                let text: String = (0..size)
                    .map(|i| unsafe { *(self.element(data, i) as *const char) })
                    .collect();
                print_string(out, &text, flags);
            }
            ArrayEncoding::Elements => {
                for i in 0..unsafe { self.size(data) } {
                    out.push('[');
                    unsafe { self.inner.print_to_text(out, self.element(data, i), TextFlags::NESTED) };
                    out.push(']');
                }
            }
        }
    }

    unsafe fn parse_from_text(&self, text: &str, data: *mut u8, _flags: TextFlags) -> bool {
        unsafe {
            self.replace_with(data, |temp| match self.encoding() {
                ArrayEncoding::Bytes => match BASE64.decode(text.trim()) {
                    Ok(bytes) => {
                        self.set_bytes(temp, &bytes);
                        true
                    }
                    Err(_) => false,
                },
                ArrayEncoding::Chars => match parse_string(text) {
                    Some(decoded) => {
                        self.set_chars(temp, &decoded);
                        true
                    }
                    None => false,
                },
                ArrayEncoding::Elements => {
                    for item in BracketItems::new(text) {
                        let Ok(item) = item else {
                            return false;
                        };
                        let index = self.size(temp);
                        let element = self.insert(temp, index);
                        if !self.inner.parse_from_text(item, element, TextFlags::NESTED) {
                            return false;
                        }
                    }
                    true
                }
            })
        }
    }

    unsafe fn write_binary(
        &self,
        ctx: &mut SerializationContext<'_>,
        writer: &mut BinaryWriter,
        data: *const u8,
        _default: *const u8,
    ) {
        if let ArrayEncoding::Bytes = self.encoding() {
            writer.write_bytes(unsafe { self.as_bytes(data) });
            return;
        }
        let size = unsafe { self.size(data) };
        writer.write_u32(size as u32);
        for i in 0..size {
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
        if let ArrayEncoding::Bytes = self.encoding() {
            let bytes = reader.read_bytes()?;
            unsafe { self.set_bytes(data, bytes) };
            return Ok(());
        }
        // every element takes at least one byte
        let count = reader.read_u32()? as usize;
        if count > reader.remaining() {
            return Err(StreamError::UnexpectedEof {
                needed: count,
                remaining: reader.remaining(),
            });
        }
        let mut result = Ok(());
        unsafe {
            self.replace_with(data, |temp| {
                for i in 0..count {
                    let element = self.insert(temp, i);
                    if let Err(err) = self.inner.read_binary(ctx, reader, element) {
                        result = Err(err);
                        return false;
                    }
                }
                true
            })
        };
        result
    }

    unsafe fn write_xml(
        &self,
        ctx: &mut SerializationContext<'_>,
        node: &mut XmlNode,
        data: *const u8,
        _default: *const u8,
    ) {
        match self.encoding() {
            ArrayEncoding::Elements => {
                for i in 0..unsafe { self.size(data) } {
                    let mut element = XmlNode::new("element");
                    unsafe {
                        self.inner
                            .write_xml(ctx, &mut element, self.element(data, i), ptr::null())
                    };
                    node.push_child(element);
                }
            }
            _ => unsafe { self.print_to_text(&mut node.text, data, TextFlags::empty()) },
        }
    }

    unsafe fn read_xml(&self, ctx: &mut SerializationContext<'_>, node: &XmlNode, data: *mut u8) -> bool {
        match self.encoding() {
            ArrayEncoding::Elements => unsafe {
                self.replace_with(data, |temp| {
                    for child in node.children_named("element") {
                        let index = self.size(temp);
                        let element = self.insert(temp, index);
                        if !self.inner.read_xml(ctx, child, element) {
                            return false;
                        }
                    }
                    true
                })
            },
            _ => unsafe { self.parse_from_text(&node.text, data, TextFlags::empty()) },
        }
    }

    unsafe fn describe_view(&self, path: &str, data: *const u8, info: &mut DataViewInfo) -> DataViewResult {
        if path.is_empty() {
            info.flags |= DataViewInfoFlags::LIKE_ARRAY;
            info.array_size = Some(unsafe { self.size(data) });
            return Ok(());
        }
        let (index, rest) = Self::split_index(path)?;
        let element = unsafe { self.checked_element(data, index)? };
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
        let element = unsafe { self.checked_element(data, index)? };
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
        let element = unsafe { self.checked_element(data, index)? } as *mut u8;
        unsafe { write_data_view(&self.inner, rest, element, source, source_type) }
    }
}

/// Creates `array<T>` types on lookup.
pub struct ArrayCreator;

impl TypeCreator for ArrayCreator {
    fn prefix(&self) -> &str {
        "array<"
    }

    fn create(&self, registry: &TypeRegistry, name: &str) -> Option<Type> {
        let inner = registry.find_type(strip_template(name, "array")?)?;
        Some(Type::new(ArrayType::new(inner)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_array_basics() {
        let mut array: Array<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        array.insert(1, "x".into());
        assert_eq!(array.as_slice(), ["a", "x", "b"]);
        assert_eq!(array.remove(0), "a");
        assert_eq!(array.pop().as_deref(), Some("b"));
        assert_eq!(array.len(), 1);
        let copy = array.clone();
        assert_eq!(copy, array);
    }

    #[test]
    fn reflected_name() {
        assert_eq!(Array::<i32>::type_name(), "array<int>");
        assert_eq!(Array::<Array<f32>>::type_name(), "array<array<float>>");
    }

    #[test]
    fn binary_count_beyond_the_stream_is_rejected() {
        let registry = TypeRegistry::new(crate::registry::RegistryConfig::default());
        let ty = registry.find_type("array<int>").unwrap();
        let mut holder = crate::holder::DataHolder::of(&registry, Array::from(vec![7i32])).unwrap();
        let mut ctx = SerializationContext::new(&registry);

        let mut reader = BinaryReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
        let result = unsafe { ty.read_binary(&mut ctx, &mut reader, holder.data_mut()) };
        assert!(matches!(result, Err(StreamError::UnexpectedEof { .. })));

        // the count fits but the elements are cut short
        let mut reader = BinaryReader::new(&[3, 0, 0, 0, 1, 0, 0, 0, 2]);
        assert!(unsafe { ty.read_binary(&mut ctx, &mut reader, holder.data_mut()) }.is_err());
        assert_eq!(holder.get::<Array<i32>>().unwrap().as_slice(), &[7]);
    }

    #[test]
    fn empty_array_is_not_allocated() {
        let array = Array::<u64>::new();
        assert_eq!(array.capacity(), 0);
        assert!(array.as_slice().is_empty());
    }
}
