// Exact-width little-endian reads over a sequential byte source.
// Every read either fills its buffer completely or reports why it could not.
use std::io::{self, Read};

use crate::core::error::{Error, ErrorKind};

#[derive(Debug)]
pub struct StreamReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the 2-byte table index that opens every row.
    /// `None` means the source ended cleanly on a row boundary.
    pub fn read_row_start(&mut self) -> Result<Option<u16>, Error> {
        let start = self.offset;
        let mut buf = [0u8; 2];
        match self.fill(&mut buf)? {
            0 => Ok(None),
            2 => Ok(Some(u16::from_le_bytes(buf))),
            _ => Err(Error::new(ErrorKind::Stream)
                .with_message("truncated table index")
                .with_offset(start)),
        }
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let start = self.offset;
        let mut buf = [0u8; N];
        let filled = self.fill(&mut buf)?;
        if filled < N {
            return Err(truncated(start, N, filled));
        }
        Ok(buf)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let start = self.offset;
        let mut buf = vec![0u8; len];
        let filled = self.fill(&mut buf)?;
        if filled < len {
            return Err(truncated(start, len, filled));
        }
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads a 1-byte boolean. With `strict`, bytes other than 0 and 1 are rejected.
    pub fn read_bool(&mut self, strict: bool) -> Result<bool, Error> {
        let start = self.offset;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte if !strict => Ok(byte != 0),
            byte => Err(Error::new(ErrorKind::Decode)
                .with_message(format!("malformed boolean byte 0x{byte:02x}"))
                .with_offset(start)),
        }
    }

    /// Reads a 4-byte length followed by that many raw bytes.
    ///
    /// The payload is pulled through a bounded `take` so a corrupt length never
    /// allocates more than the source actually delivers.
    pub fn read_length_prefixed(&mut self, max_len: usize) -> Result<Vec<u8>, Error> {
        let start = self.offset;
        let len = self.read_u32()? as usize;
        if len > max_len {
            return Err(Error::new(ErrorKind::Decode)
                .with_message(format!("length prefix {len} exceeds limit {max_len}"))
                .with_offset(start));
        }
        let mut out = Vec::with_capacity(len.min(64 * 1024));
        let got = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut out)
            .map_err(|err| stream_error(self.offset, err))?;
        self.offset += got as u64;
        if got < len {
            return Err(Error::new(ErrorKind::Decode)
                .with_message(format!(
                    "length prefix {len} exceeds remaining input ({got} bytes available)"
                ))
                .with_offset(start));
        }
        Ok(out)
    }

    // Fills as much of `buf` as the source provides; short only at end of input.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.offset += n as u64;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(stream_error(self.offset, err)),
            }
        }
        Ok(filled)
    }
}

fn truncated(start: u64, wanted: usize, got: usize) -> Error {
    Error::new(ErrorKind::Stream)
        .with_message(format!("unexpected end of input: wanted {wanted} bytes, got {got}"))
        .with_offset(start)
}

fn stream_error(offset: u64, err: io::Error) -> Error {
    Error::new(ErrorKind::Stream)
        .with_message("read from byte source failed")
        .with_offset(offset)
        .with_source(err)
}
