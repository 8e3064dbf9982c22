//! Streaming readers and writers that apply the archive cipher.
//!
//! [`DecodingReader`] wraps any [`Read`] and yields decoded bytes, keeping
//! track of how many bytes it has consumed from the underlying stream.
//! [`EncodingWriter`] is its mirror image for producing archive bytes.

use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian};
use zerocopy::FromBytes;

use crate::cipher;
use crate::{Error, Result};

/// A reader that decodes every byte pulled from the inner stream.
///
/// Reads are strictly sequential; the reader never seeks.
///
/// # Example
///
/// ```
/// use popcap_common::DecodingReader;
///
/// // 0x01 0x02 0x03 0x04 encoded with the archive key
/// let data = [0xF6, 0xF5, 0xF4, 0xF3];
/// let mut reader = DecodingReader::new(&data[..]);
///
/// assert_eq!(reader.read_u32_le().unwrap(), 0x04030201);
/// assert_eq!(reader.position(), 4);
/// ```
#[derive(Debug)]
pub struct DecodingReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> DecodingReader<R> {
    /// Wrap a stream positioned at the first encoded byte.
    #[inline]
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Number of bytes consumed from the inner stream so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get a reference to the inner stream.
    #[inline]
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap the inner stream.
    #[inline]
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Fill `buf` completely with decoded bytes.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::UnexpectedEof {
                        needed: buf.len(),
                        available: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Read a fixed number of decoded bytes.
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut bytes = [0u8; N];
        self.read_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a single decoded byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_array::<1>().map(|b| b[0])
    }

    /// Read a single decoded byte, or `None` if the stream is exhausted.
    pub fn try_read_u8(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];

        loop {
            match self.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read a decoded little-endian u32.
    #[inline]
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_array::<4>()?;
        Ok(LittleEndian::read_u32(&bytes))
    }

    /// Read a decoded little-endian u64.
    #[inline]
    pub fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.read_array::<8>()?;
        Ok(LittleEndian::read_u64(&bytes))
    }

    /// Read a decoded struct using zerocopy.
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let mut bytes = vec![0u8; size];
        self.read_into(&mut bytes)?;

        T::read_from_bytes(&bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }

    /// Discard up to `count` bytes, returning how many were skipped.
    ///
    /// Fewer bytes are skipped only when the stream ends first.
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        let skipped = io::copy(&mut (&mut self.inner).take(count), &mut io::sink())?;
        self.position += skipped;
        Ok(skipped)
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        cipher::decode_in_place(&mut buf[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

/// A writer that encodes every byte before passing it on.
#[derive(Debug)]
pub struct EncodingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> EncodingWriter<W> {
    const CHUNK: usize = 1024;

    /// Wrap an output stream.
    #[inline]
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Number of encoded bytes written so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Unwrap the inner stream.
    #[inline]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for EncodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut chunk = [0u8; Self::CHUNK];
        let n = buf.len().min(Self::CHUNK);
        chunk[..n].copy_from_slice(&buf[..n]);
        cipher::encode_in_place(&mut chunk[..n]);

        let written = self.inner.write(&chunk[..n])?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(plain: &[u8]) -> Vec<u8> {
        let mut writer = EncodingWriter::new(Vec::new());
        writer.write_all(plain).unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_read_primitives() {
        let data = encoded(&[
            0x2A, // u8
            0x01, 0x02, 0x03, 0x04, // u32: 0x04030201
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, // u64
        ]);
        let mut reader = DecodingReader::new(&data[..]);

        assert_eq!(reader.read_u8().unwrap(), 0x2A);
        assert_eq!(reader.read_u32_le().unwrap(), 0x04030201);
        assert_eq!(reader.read_u64_le().unwrap(), 0x8000_0000_0000_0001);
        assert_eq!(reader.position(), 13);
        assert_eq!(reader.try_read_u8().unwrap(), None);
    }

    #[test]
    fn test_eof_error() {
        let data = encoded(&[0x01, 0x02]);
        let mut reader = DecodingReader::new(&data[..]);

        let err = reader.read_u32_le().unwrap_err();
        assert!(err.is_eof());
        assert!(matches!(
            err,
            Error::UnexpectedEof {
                needed: 4,
                available: 2
            }
        ));
    }

    #[test]
    fn test_skip_counts_position() {
        let data = encoded(b"0123456789");
        let mut reader = DecodingReader::new(&data[..]);

        assert_eq!(reader.skip(4).unwrap(), 4);
        assert_eq!(reader.read_u8().unwrap(), b'4');
        assert_eq!(reader.skip(100).unwrap(), 5);
        assert_eq!(reader.position(), 10);
    }

    #[test]
    fn test_large_write_round_trip() {
        let plain: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let data = encoded(&plain);
        assert_eq!(data.len(), plain.len());

        let mut reader = DecodingReader::new(&data[..]);
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, plain);
    }

    #[test]
    fn test_read_struct() {
        use zerocopy::{Immutable, KnownLayout};

        #[derive(FromBytes, Immutable, KnownLayout, Debug, PartialEq)]
        #[repr(C)]
        struct Pair {
            a: [u8; 2],
            b: [u8; 2],
        }

        let data = encoded(&[1, 2, 3, 4]);
        let mut reader = DecodingReader::new(&data[..]);
        let pair: Pair = reader.read_struct().unwrap();
        assert_eq!(pair, Pair { a: [1, 2], b: [3, 4] });
    }
}
