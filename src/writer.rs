use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{
    buffer::{BuffMut, BufferPool},
    error::{EncodeError, Result},
};

/// Writes a packet body into a pooled buffer.
///
/// Every numeric field is fixed-width little-endian. A writer is single-use: the
/// `finish_*` methods consume it and the buffer goes back to its pool, which also
/// happens if the writer is simply dropped.
///
/// Using a writer after it has been finished does not compile:
///
/// ```compile_fail
/// use pktwriter::{BufferPool, PacketWriter};
///
/// let pool = BufferPool::new();
/// let writer = PacketWriter::with_id(&pool, 1).unwrap();
/// let first = writer.finish_framed().unwrap();
/// let second = writer.finish_raw().unwrap();
/// ```
#[derive(Debug)]
pub struct PacketWriter {
    buf: BuffMut,
    has_id: bool,
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new(BufferPool::global())
    }
}

impl PacketWriter {
    /// Creates a writer with an empty body.
    pub fn new(pool: &BufferPool) -> Self {
        Self {
            buf: pool.acquire(),
            has_id: false,
        }
    }

    /// Creates a writer whose body starts with `packet_id`.
    pub fn with_id(pool: &BufferPool, packet_id: u16) -> Result<Self> {
        let mut writer = Self::new(pool);
        writer.write_u16(packet_id)?;
        writer.has_id = true;
        Ok(writer)
    }

    /// Whether the body starts with a packet id.
    pub fn has_id(&self) -> bool {
        self.has_id
    }

    /// The body written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    fn sink(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.sink().write_u8(v)?;
        Ok(())
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.sink().write_i8(v)?;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.sink().write_u16::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.sink().write_i16::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.sink().write_u32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.sink().write_i32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.sink().write_u64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.sink().write_i64::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.sink().write_f32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.sink().write_f64::<LittleEndian>(v)?;
        Ok(())
    }

    /// Writes `1` for true and `0` for false.
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(v as u8)
    }

    /// Writes the raw bytes of `s` followed by a single NUL terminator.
    ///
    /// Strings that themselves contain a NUL are rejected, since a reader could
    /// not tell where they end. Nothing is written in that case.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        if let Some(position) = s.bytes().position(|b| b == 0) {
            return Err(EncodeError::EmbeddedNul { position });
        }
        let sink = self.sink();
        sink.write_all(s.as_bytes())?;
        sink.write_u8(0)?;
        Ok(())
    }

    /// Writes any [`PacketField`], picking the encoding from its type.
    #[inline]
    pub fn write<T: PacketField + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.write_to(self)
    }

    /// Finishes the packet, prefixing it with a 2-byte little-endian length.
    ///
    /// The length is the body length minus 2, i.e. it does not count the packet
    /// id. Writers created without an id still get 2 subtracted, so their header
    /// under-reports the body; this is kept for compatibility with existing
    /// readers.
    pub fn finish_framed(self) -> Result<Vec<u8>> {
        let len = self.buf.len();
        if !self.has_id {
            tracing::warn!(
                "framing a packet without an id, length header will read {} for a {}-byte body",
                len.saturating_sub(2),
                len
            );
        }
        let body_len = len
            .checked_sub(2)
            .ok_or(EncodeError::BodyTooShort { len })?;
        let header = u16::try_from(body_len).map_err(|_| EncodeError::BodyTooLong { len })?;
        let mut framed = Vec::with_capacity(len + 2);
        framed.write_u16::<LittleEndian>(header)?;
        framed.extend_from_slice(&self.buf);
        tracing::trace!("framed packet with header {} => {} bytes", header, framed.len());
        Ok(framed)
    }

    /// Finishes the packet, returning the body as-is with no length header.
    pub fn finish_raw(self) -> Result<Vec<u8>> {
        tracing::trace!("raw packet of {} bytes", self.buf.len());
        Ok(self.buf.to_vec())
    }
}

/// A value with a fixed wire encoding.
pub trait PacketField {
    /// Appends this value to the writer.
    fn write_to(&self, writer: &mut PacketWriter) -> Result<()>;
}

macro_rules! impl_packet_field {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl PacketField for $ty {
                #[inline]
                fn write_to(&self, writer: &mut PacketWriter) -> Result<()> {
                    writer.$method(*self)
                }
            }
        )*
    };
}

impl_packet_field! {
    u8 => write_u8,
    i8 => write_i8,
    u16 => write_u16,
    i16 => write_i16,
    u32 => write_u32,
    i32 => write_i32,
    u64 => write_u64,
    i64 => write_i64,
    f32 => write_f32,
    f64 => write_f64,
    bool => write_bool,
}

impl PacketField for str {
    fn write_to(&self, writer: &mut PacketWriter) -> Result<()> {
        writer.write_string(self)
    }
}

impl PacketField for String {
    fn write_to(&self, writer: &mut PacketWriter) -> Result<()> {
        writer.write_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(f: impl FnOnce(&mut PacketWriter) -> Result<()>) -> Vec<u8> {
        let pool = BufferPool::new();
        let mut w = PacketWriter::new(&pool);
        f(&mut w).unwrap();
        w.finish_raw().unwrap()
    }

    #[test]
    fn numeric_encodings() {
        assert_eq!(raw(|w| w.write_u8(0xAB)), [0xAB]);
        assert_eq!(raw(|w| w.write_i8(-1)), [0xFF]);
        assert_eq!(raw(|w| w.write_u16(0x1234)), [0x34, 0x12]);
        assert_eq!(raw(|w| w.write_i16(-2)), [0xFE, 0xFF]);
        assert_eq!(raw(|w| w.write_u32(0xDEADBEEF)), [0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(raw(|w| w.write_i32(-1)), [0xFF; 4]);
        assert_eq!(
            raw(|w| w.write_u64(0x0102030405060708)),
            [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
        );
        assert_eq!(raw(|w| w.write_i64(i64::MIN)), [0, 0, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(raw(|w| w.write_f32(1.0)), 1.0f32.to_le_bytes());
        assert_eq!(raw(|w| w.write_f64(-2.5)), (-2.5f64).to_le_bytes());
    }

    #[test]
    fn bools_are_one_byte() {
        assert_eq!(
            raw(|w| {
                w.write_bool(true)?;
                w.write_bool(false)
            }),
            [1, 0]
        );
    }

    #[test]
    fn strings_are_nul_terminated() {
        assert_eq!(raw(|w| w.write_string("hi")), [b'h', b'i', 0]);
        assert_eq!(raw(|w| w.write_string("")), [0]);
    }

    #[test]
    fn embedded_nul_is_rejected_without_writing() {
        let pool = BufferPool::new();
        let mut w = PacketWriter::with_id(&pool, 7).unwrap();
        let err = w.write_string("ab\0cd").unwrap_err();
        assert!(matches!(err, EncodeError::EmbeddedNul { position: 2 }));
        assert_eq!(w.as_bytes(), [7, 0]);
    }

    #[test]
    fn fields_are_written_in_order() {
        let pool = BufferPool::new();
        let mut w = PacketWriter::with_id(&pool, 0x0102).unwrap();
        w.write_u8(9).unwrap();
        w.write_string("a").unwrap();
        w.write_i16(-1).unwrap();
        assert_eq!(w.len(), 7);
        assert_eq!(
            w.finish_framed().unwrap(),
            [0x05, 0x00, 0x02, 0x01, 9, b'a', 0, 0xFF, 0xFF]
        );
    }

    #[test]
    fn generic_write_matches_typed_writes() {
        let typed = raw(|w| {
            w.write_u32(77)?;
            w.write_f32(0.5)?;
            w.write_bool(true)?;
            w.write_string("xyz")
        });
        let generic = raw(|w| {
            w.write(&77u32)?;
            w.write(&0.5f32)?;
            w.write(&true)?;
            w.write("xyz")?;
            Ok(())
        });
        assert_eq!(typed, generic);
        assert_eq!(raw(|w| w.write(&String::from("q"))), [b'q', 0]);
    }

    #[test]
    fn framing_without_id_still_subtracts_two() {
        let pool = BufferPool::new();
        let mut w = PacketWriter::new(&pool);
        assert!(!w.has_id());
        w.write_u32(0x04030201).unwrap();
        assert_eq!(
            w.finish_framed().unwrap(),
            [0x02, 0x00, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn framing_short_body_is_an_error() {
        let pool = BufferPool::new();
        let w = PacketWriter::new(&pool);
        assert!(w.is_empty());
        assert!(matches!(
            w.finish_framed(),
            Err(EncodeError::BodyTooShort { len: 0 })
        ));

        let mut w = PacketWriter::new(&pool);
        w.write_u8(1).unwrap();
        assert!(matches!(
            w.finish_framed(),
            Err(EncodeError::BodyTooShort { len: 1 })
        ));
        // both buffers made it back despite the errors
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.stats().released, 2);
    }

    #[test]
    fn framing_oversize_body_is_an_error() {
        let pool = BufferPool::new();
        let mut w = PacketWriter::with_id(&pool, 1).unwrap();
        w.write_string(&"a".repeat(u16::MAX as usize)).unwrap();
        let len = w.len();
        assert!(matches!(
            w.finish_framed(),
            Err(EncodeError::BodyTooLong { len: l }) if l == len
        ));
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn largest_body_fits() {
        let pool = BufferPool::new();
        let mut w = PacketWriter::with_id(&pool, 1).unwrap();
        w.write_string(&"a".repeat(u16::MAX as usize - 1)).unwrap();
        let framed = w.finish_framed().unwrap();
        assert_eq!(&framed[..2], [0xFF, 0xFF]);
        assert_eq!(framed.len(), 2 + 2 + u16::MAX as usize);
    }

    #[test]
    fn raw_finish_releases_buffer() {
        let pool = BufferPool::new();
        let mut w = PacketWriter::with_id(&pool, 3).unwrap();
        w.write_u8(4).unwrap();
        assert_eq!(w.finish_raw().unwrap(), [3, 0, 4]);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn dropped_writer_releases_buffer() {
        let pool = BufferPool::new();
        let w = PacketWriter::with_id(&pool, 3).unwrap();
        drop(w);
        assert_eq!(pool.idle_count(), 1);
    }
}
