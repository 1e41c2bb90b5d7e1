use crate::{Error, Result};

/// Bounds-checked cursor over a borrowed block buffer.
#[derive(Debug, Clone, Copy)]
pub struct BlockReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BlockReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let arr = read_array_at::<N>(self.bytes, self.pos)?;
        self.pos += N;
        Ok(arr)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        self.read_array::<4>().map(i32::from_le_bytes)
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.read_array::<8>().map(u64::from_le_bytes)
    }
}

/// `n` bytes starting at `offset`.
pub fn slice_at(bytes: &[u8], offset: usize, n: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(n)
        .ok_or_else(|| Error::Other("decode overflow".to_string()))?;
    bytes
        .get(offset..end)
        .ok_or_else(|| Error::Other("truncated raw block".to_string()))
}

pub fn read_array_at<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    let slice = slice_at(bytes, offset, N)?;
    let mut arr = [0u8; N];
    arr.copy_from_slice(slice);
    Ok(arr)
}

/// Reads a `[u16 length][bytes]` entry at `offset`.
pub fn read_var_entry_at(bytes: &[u8], offset: usize) -> Result<&[u8]> {
    let len = u16::from_le_bytes(read_array_at::<2>(bytes, offset)?) as usize;
    slice_at(bytes, offset + 2, len)
}
