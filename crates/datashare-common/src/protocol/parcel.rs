//! Parcel: the flat byte buffer every DataShare request and reply travels in.
//!
//! A [`Parcel`] is written front to back and read back with a
//! [`ParcelReader`]. All fixed-width integers are little-endian. Strings,
//! blobs and collections are prefixed with an `i32` count.
//!
//! The reader never trusts a declared count: a negative count, or a count whose
//! minimum wire footprint exceeds the bytes still unread, fails with
//! [`DataShareError::CorruptEncoding`] before anything is allocated.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::{DataShareError, Result};
use super::marshal::{Marshal, Unmarshal};

/// Growable write buffer for one request or reply.
#[derive(Debug, Default, Clone)]
pub struct Parcel {
    buf: BytesMut,
}

impl Parcel {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Wraps already-encoded bytes, e.g. a payload taken off the wire.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self { buf: BytesMut::from(data) }
    }

    /// Starts a request parcel with the interface token written first.
    pub fn with_interface_token(token: &str) -> Result<Self> {
        let mut parcel = Self::new();
        parcel.write_string(token)?;
        Ok(parcel)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    /// Returns a reader positioned at the start of this parcel.
    pub fn reader(&self) -> ParcelReader<'_> {
        ParcelReader::new(&self.buf)
    }

    /// Writes any marshallable value.
    pub fn write<T: Marshal + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.marshal(self)
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16_le(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64_le(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    /// Writes a collection count. Counts that do not fit an `i32` are rejected.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len)
            .map_err(|_| DataShareError::Parameter(format!("collection too large: {} elements", len)))?;
        self.write_i32(len);
        Ok(())
    }

    pub fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_blob(s.as_bytes())
    }

    pub fn write_blob(&mut self, data: &[u8]) -> Result<()> {
        self.write_len(data.len())?;
        self.buf.put_slice(data);
        Ok(())
    }
}

/// Bounds-checked cursor over an encoded parcel.
#[derive(Debug, Clone)]
pub struct ParcelReader<'a> {
    buf: &'a [u8],
}

impl<'a> ParcelReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Reads any unmarshallable value.
    pub fn read<T: Unmarshal>(&mut self) -> Result<T> {
        T::unmarshal(self)
    }

    /// Verifies the interface token a request must start with.
    pub fn expect_interface_token(&mut self, expected: &str) -> Result<()> {
        let token = self.read_string()?;
        if token != expected {
            return Err(DataShareError::corrupt(format!(
                "interface token mismatch: expected '{}', got '{}'",
                expected, token
            )));
        }
        Ok(())
    }

    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(DataShareError::corrupt(format!(
                "truncated {}: need {} bytes, {} remaining",
                what,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.need(2, "i16")?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.need(4, "i32")?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4, "u32")?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.need(8, "i64")?;
        Ok(self.buf.get_i64_le())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.need(8, "u64")?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.need(8, "f64")?;
        Ok(self.buf.get_f64_le())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DataShareError::corrupt(format!("invalid bool byte {}", other))),
        }
    }

    /// Reads a collection count whose elements occupy at least
    /// `min_element_size` bytes each on the wire.
    ///
    /// Fails if the count is negative or if even the smallest possible
    /// encoding of that many elements would overrun the buffer.
    pub fn read_len(&mut self, min_element_size: usize) -> Result<usize> {
        let raw = self.read_i32()?;
        if raw < 0 {
            return Err(DataShareError::corrupt(format!("negative length {}", raw)));
        }
        let len = raw as usize;
        let needed = len.saturating_mul(min_element_size.max(1));
        if needed > self.remaining() {
            return Err(DataShareError::corrupt(format!(
                "declared length {} exceeds {} remaining bytes",
                len,
                self.remaining()
            )));
        }
        Ok(len)
    }

    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len(1)?;
        let data = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(data)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let data = self.read_blob()?;
        String::from_utf8(data).map_err(|e| DataShareError::corrupt(format!("invalid utf-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_round_trip() {
        let mut parcel = Parcel::new();
        parcel.write_i32(-7);
        parcel.write_i64(i64::MIN);
        parcel.write_f64(2.5);
        parcel.write_bool(true);
        parcel.write_string("uri").unwrap();

        let mut reader = parcel.reader();
        assert_eq!(reader.read_i32().unwrap(), -7);
        assert_eq!(reader.read_i64().unwrap(), i64::MIN);
        assert_eq!(reader.read_f64().unwrap(), 2.5);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_string().unwrap(), "uri");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_read_is_corrupt() {
        let data = [1u8, 2, 3];
        let mut reader = ParcelReader::new(&data);
        let err = reader.read_i64().unwrap_err();
        assert!(matches!(err, DataShareError::CorruptEncoding(_)));
    }

    #[test]
    fn test_negative_length_is_corrupt() {
        let mut parcel = Parcel::new();
        parcel.write_i32(-1);
        let err = parcel.reader().read_blob().unwrap_err();
        assert!(matches!(err, DataShareError::CorruptEncoding(_)));
    }

    #[test]
    fn test_length_beyond_buffer_is_corrupt() {
        let mut parcel = Parcel::new();
        parcel.write_i32(i32::MAX);
        parcel.write_u8(0);
        let err = parcel.reader().read_string().unwrap_err();
        assert!(matches!(err, DataShareError::CorruptEncoding(_)));
    }

    #[test]
    fn test_len_uses_minimum_element_width() {
        // 3 declared i64 elements but only 16 bytes follow.
        let mut parcel = Parcel::new();
        parcel.write_i32(3);
        parcel.write_i64(1);
        parcel.write_i64(2);
        let mut reader = parcel.reader();
        assert!(reader.read_len(8).is_err());
    }

    #[test]
    fn test_invalid_bool_byte() {
        let data = [7u8];
        let mut reader = ParcelReader::new(&data);
        assert!(reader.read_bool().is_err());
    }

    #[test]
    fn test_invalid_utf8_is_corrupt() {
        let mut parcel = Parcel::new();
        parcel.write_blob(&[0xff, 0xfe]).unwrap();
        let err = parcel.reader().read_string().unwrap_err();
        assert!(matches!(err, DataShareError::CorruptEncoding(_)));
    }

    #[test]
    fn test_interface_token_mismatch() {
        let parcel = Parcel::with_interface_token("a.Service").unwrap();
        assert!(parcel.reader().expect_interface_token("a.Service").is_ok());
        assert!(parcel.reader().expect_interface_token("b.Service").is_err());
    }
}
