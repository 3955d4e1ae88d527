//! Little-endian binary streams with skip-protected blocks.
//!
//! Every property value is written inside a block prefixed by its byte length,
//! so a reader can skip values it does not understand (missing properties,
//! changed types) without knowing their encoding.

use crate::error::StreamError;

/// Position of an open block's length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a block must be closed with end_block"]
pub struct BlockMarker(usize);

/// Growable binary output buffer.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

macro_rules! write_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self, value: $ty) {
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
        )*
    };
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    write_le! {
        write_u8: u8,
        write_i8: i8,
        write_u16: u16,
        write_i16: i16,
        write_u32: u32,
        write_i32: i32,
        write_u64: u64,
        write_i64: i64,
        write_f32: f32,
        write_f64: f64,
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    /// Write a length-prefixed byte slice.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Append raw bytes without a length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Open a block; its length is patched in by [`end_block`](Self::end_block).
    pub fn begin_block(&mut self) -> BlockMarker {
        let marker = BlockMarker(self.buffer.len());
        self.write_u32(0);
        marker
    }

    pub fn end_block(&mut self, marker: BlockMarker) {
        let start = marker.0 + 4;
        let len = (self.buffer.len() - start) as u32;
        self.buffer[marker.0..start].copy_from_slice(&len.to_le_bytes());
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor over binary input.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> Result<$ty, StreamError> {
                let bytes = self.take(std::mem::size_of::<$ty>())?;
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                Ok(<$ty>::from_le_bytes(raw))
            }
        )*
    };
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    read_le! {
        read_u8: u8,
        read_i8: i8,
        read_u16: u16,
        read_i16: i16,
        read_u32: u32,
        read_i32: i32,
        read_u64: u64,
        read_i64: i64,
        read_f32: f32,
        read_f64: f64,
    }

    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], StreamError> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, StreamError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| StreamError::InvalidUtf8)
    }

    /// Read a block written by [`BinaryWriter::begin_block`] as a sub-reader.
    ///
    /// The parent reader is positioned after the block whatever the caller
    /// does with the sub-reader.
    pub fn read_block(&mut self) -> Result<BinaryReader<'a>, StreamError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        Ok(BinaryReader::new(bytes))
    }

    /// Read exactly `N` raw bytes.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], StreamError> {
        let mut raw = [0u8; N];
        raw.copy_from_slice(self.take(N)?);
        Ok(raw)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], StreamError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(StreamError::UnexpectedEof {
                needed: len,
                remaining,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}
