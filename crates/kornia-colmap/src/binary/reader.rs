use crate::{ColmapError, Location, RecordKind};

/// A bounds-checked little-endian cursor over a binary model buffer.
///
/// Every failure is reported as a [`ColmapError::MalformedRecord`] carrying the
/// record kind, the current record index and the absolute byte offset.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    kind: RecordKind,
    record: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Read a little-endian `", stringify!($ty), "`.")]
        #[inline]
        pub fn $name(&mut self) -> Result<$ty, ColmapError> {
            let bytes = self.take(std::mem::size_of::<$ty>())?;
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of the buffer.
    pub fn new(buf: &'a [u8], kind: RecordKind) -> Self {
        Self {
            buf,
            pos: 0,
            kind,
            record: 0,
        }
    }

    /// Current absolute byte offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Set the index of the record being decoded, used for error reporting.
    #[inline]
    pub fn set_record(&mut self, record: usize) {
        self.record = record;
    }

    /// The location of the cursor, used for error reporting.
    #[inline]
    pub fn location(&self) -> Location {
        Location::Binary {
            record: self.record,
            offset: self.pos,
        }
    }

    /// Build a malformed record error at the current location.
    pub fn error(&self, reason: impl Into<String>) -> ColmapError {
        ColmapError::malformed(self.kind, self.location(), reason)
    }

    /// Borrow the next `n` bytes and advance.
    #[inline]
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ColmapError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                self.error(format!(
                    "unexpected end of buffer: needed {n} bytes, {} remaining",
                    self.remaining()
                ))
            })?;
        let buf: &'a [u8] = self.buf;
        let bytes = &buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Skip `n` bytes.
    #[inline]
    pub fn skip(&mut self, n: usize) -> Result<(), ColmapError> {
        self.take(n).map(|_| ())
    }

    /// Skip `count` elements of `size` bytes each, guarding against overflow.
    pub fn skip_elements(&mut self, count: u64, size: usize) -> Result<(), ColmapError> {
        let n = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(size))
            .ok_or_else(|| self.error(format!("element count {count} overflows the buffer")))?;
        self.skip(n)
    }

    read_le!(read_u8, u8);
    read_le!(read_u32, u32);
    read_le!(read_i32, i32);
    read_le!(read_u64, u64);
    read_le!(read_i64, i64);
    read_le!(read_f64, f64);

    /// Read `N` consecutive little-endian doubles.
    pub fn read_f64_array<const N: usize>(&mut self) -> Result<[f64; N], ColmapError> {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = self.read_f64()?;
        }
        Ok(values)
    }

    /// Read a length prefix and convert it to `usize`.
    pub fn read_len_u64(&mut self) -> Result<usize, ColmapError> {
        let len = self.read_u64()?;
        usize::try_from(len).map_err(|_| self.error(format!("length {len} does not fit in memory")))
    }

    /// Read a null-terminated UTF-8 string.
    pub fn read_cstr(&mut self) -> Result<String, ColmapError> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.error("unterminated string"))?;
        let name = std::str::from_utf8(&rest[..len])
            .map_err(|e| self.error(format!("invalid utf-8 in string: {e}")))?
            .to_string();
        self.pos += len + 1;
        Ok(name)
    }

    /// Read the leading record count of a model file.
    ///
    /// Returns the count and a capacity hint bounded by what the remaining bytes
    /// can actually hold, so that a corrupted header cannot trigger a huge allocation.
    pub fn read_record_count(&mut self, min_record_size: usize) -> Result<(u64, usize), ColmapError> {
        let count = self.read_u64()?;
        let max_records = self.remaining() / min_record_size.max(1);
        let capacity = usize::try_from(count).unwrap_or(usize::MAX).min(max_records);
        Ok((count, capacity))
    }
}
