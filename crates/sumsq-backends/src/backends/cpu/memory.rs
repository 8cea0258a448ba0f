//! Memory manager for the CPU device
//!
//! Buffers are plain heap allocations keyed by handle id. The manager is
//! shared between the device (host copies) and its worker thread (match
//! commits) behind an `RwLock`.

use crate::backend::BufferHandle;
use crate::error::{BackendError, Result};
use std::collections::HashMap;

const COUNT_BYTES: usize = std::mem::size_of::<u32>();
const PAIR_BYTES: usize = 2 * std::mem::size_of::<u64>();

/// Handle-addressed host buffers
#[derive(Debug, Default)]
pub struct MemoryManager {
    buffers: HashMap<u64, Vec<u8>>,
    next_buffer_id: u64,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            next_buffer_id: 1,
        }
    }

    /// Allocate a zeroed buffer of `size` bytes
    pub fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, vec![0u8; size]);
        Ok(BufferHandle::new(id))
    }

    pub fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.buffers
            .remove(&handle.id())
            .map(|_| ())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    pub fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let buffer = self.buffer_mut(handle)?;
        check_bounds(0, data.len(), buffer.len())?;
        buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        let buffer = self.buffer(handle)?;
        check_bounds(0, data.len(), buffer.len())?;
        data.copy_from_slice(&buffer[..data.len()]);
        Ok(())
    }

    pub fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        Ok(self.buffer(handle)?.len())
    }

    /// Append `matches` with atomic-increment semantics.
    ///
    /// The count buffer always receives the full number of matches found
    /// (saturating at `u32::MAX`); pair `i` is stored only while
    /// `i < capacity`.
    pub fn commit_matches(
        &mut self,
        count: BufferHandle,
        result: BufferHandle,
        capacity: u32,
        matches: &[(u64, u64)],
    ) -> Result<()> {
        let previous = {
            let count_buf = self.buffer(count)?;
            check_bounds(0, COUNT_BYTES, count_buf.len())?;
            bytemuck::pod_read_unaligned::<u32>(&count_buf[..COUNT_BYTES])
        };

        let result_buf = self.buffer_mut(result)?;
        let stored_limit = (capacity as usize).min(result_buf.len() / PAIR_BYTES);
        let mut index = previous as usize;
        for &(x, y) in matches {
            if index < stored_limit {
                let offset = index * PAIR_BYTES;
                result_buf[offset..offset + 8].copy_from_slice(&x.to_ne_bytes());
                result_buf[offset + 8..offset + PAIR_BYTES].copy_from_slice(&y.to_ne_bytes());
            }
            index += 1;
        }

        let total = u32::try_from(index).unwrap_or(u32::MAX);
        self.buffer_mut(count)?[..COUNT_BYTES].copy_from_slice(&total.to_ne_bytes());
        Ok(())
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&Vec<u8>> {
        self.buffers
            .get(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut Vec<u8>> {
        self.buffers
            .get_mut(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }
}

fn check_bounds(offset: usize, size: usize, buffer_size: usize) -> Result<()> {
    if offset + size > buffer_size {
        return Err(BackendError::BufferOutOfBounds {
            offset,
            size,
            buffer_size,
        });
    }
    Ok(())
}
