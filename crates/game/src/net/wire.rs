use bytes::{Buf, BufMut};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("buffer overflow: needed {needed} bytes, {remaining} remaining")]
    Overflow { needed: usize, remaining: usize },
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    Underflow { needed: usize, remaining: usize },
    #[error("unknown command tag {0}")]
    UnknownTag(u8),
    #[error("invalid ip address length {0}")]
    IpLength(u8),
}

/// Little-endian read cursor over a borrowed datagram.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    cursor: &'a [u8],
    consumed: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: data,
            consumed: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub fn position(&self) -> usize {
        self.consumed
    }

    pub fn is_empty(&self) -> bool {
        !self.cursor.has_remaining()
    }

    pub fn rest(&self) -> &'a [u8] {
        self.cursor
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        let remaining = self.cursor.remaining();
        if remaining < needed {
            return Err(WireError::Underflow { needed, remaining });
        }
        Ok(())
    }

    pub fn peek_u8(&self) -> Result<u8, WireError> {
        self.ensure(1)?;
        Ok(self.cursor[0])
    }

    pub fn skip(&mut self, count: usize) -> Result<(), WireError> {
        self.ensure(count)?;
        self.cursor.advance(count);
        self.consumed += count;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        self.ensure(1)?;
        self.consumed += 1;
        Ok(self.cursor.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        self.ensure(2)?;
        self.consumed += 2;
        Ok(self.cursor.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        self.ensure(4)?;
        self.consumed += 4;
        Ok(self.cursor.get_u32_le())
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        self.ensure(8)?;
        self.consumed += 8;
        Ok(self.cursor.get_i64_le())
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        self.ensure(8)?;
        self.consumed += 8;
        Ok(self.cursor.get_u64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        self.ensure(4)?;
        self.consumed += 4;
        Ok(self.cursor.get_f32_le())
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        self.ensure(count)?;
        let (head, tail) = self.cursor.split_at(count);
        self.cursor = tail;
        self.consumed += count;
        Ok(head)
    }

    pub fn read_uuid(&mut self) -> Result<Uuid, WireError> {
        let bytes = self.read_bytes(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(bytes);
        Ok(Uuid::from_bytes(raw))
    }
}

/// Little-endian write cursor over a caller-provided buffer. Every write is
/// bounds checked; nothing is written when the check fails.
#[derive(Debug)]
pub struct WireWriter<'a> {
    cursor: &'a mut [u8],
    written: usize,
}

impl<'a> WireWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            cursor: buf,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining_mut()
    }

    fn ensure(&self, needed: usize) -> Result<(), WireError> {
        let remaining = self.cursor.remaining_mut();
        if remaining < needed {
            return Err(WireError::Overflow { needed, remaining });
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), WireError> {
        self.ensure(1)?;
        self.cursor.put_u8(value);
        self.written += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), WireError> {
        self.ensure(2)?;
        self.cursor.put_u16_le(value);
        self.written += 2;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), WireError> {
        self.ensure(4)?;
        self.cursor.put_u32_le(value);
        self.written += 4;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), WireError> {
        self.ensure(8)?;
        self.cursor.put_i64_le(value);
        self.written += 8;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), WireError> {
        self.ensure(8)?;
        self.cursor.put_u64_le(value);
        self.written += 8;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), WireError> {
        self.ensure(4)?;
        self.cursor.put_f32_le(value);
        self.written += 4;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.ensure(bytes.len())?;
        self.cursor.put_slice(bytes);
        self.written += bytes.len();
        Ok(())
    }

    pub fn write_uuid(&mut self, id: &Uuid) -> Result<(), WireError> {
        self.write_bytes(id.as_bytes())
    }
}
