//! DMA-able host memory shared with the NIC.
//!
//! The allocator itself is provided by the host kernel. [`DmaBuffer`] owns one allocation
//! and returns it to the allocator when dropped, so no buffer outlives the call or object
//! that allocated it.

use alloc::sync::Arc;
use core::ptr::NonNull;
use volatile::ReadOnly;
use crate::error::NxError;

bitflags! {
    /// Hints passed to the DMA allocator.
    pub struct DmaFlags: u32 {
        /// The memory may sleep to be allocated.
        const MAY_SLEEP = 1 << 0;
        /// The memory is accessed by the device while the host accesses it too.
        const COHERENT  = 1 << 1;
    }
}

/// A contiguous region of DMA memory as handed out by a [`DmaAllocator`].
#[derive(Debug)]
pub struct DmaRegion {
    pub virt: NonNull<u8>,
    pub phys: u64,
    pub size: usize,
}

/// The host kernel's DMA memory service.
pub trait DmaAllocator: Send + Sync {
    /// Allocates `size` bytes of physically contiguous memory, or returns `None`.
    fn alloc(&self, size: usize, flags: DmaFlags) -> Option<DmaRegion>;
    /// Frees a region previously returned by `alloc`.
    fn free(&self, region: DmaRegion);
}


/// An owned, zero-initialised DMA allocation.
pub struct DmaBuffer {
    region: Option<DmaRegion>,
    allocator: Arc<dyn DmaAllocator>,
}

// The buffer exclusively owns its region; shared access only reads.
unsafe impl Send for DmaBuffer {}
unsafe impl Sync for DmaBuffer {}

impl DmaBuffer {
    pub fn new(allocator: &Arc<dyn DmaAllocator>, size: usize, flags: DmaFlags) -> Result<DmaBuffer, NxError> {
        if size == 0 {
            return Err(NxError::InvalidArguments);
        }
        let region = allocator.alloc(size, flags).ok_or_else(|| {
            error!("DmaBuffer: failed to allocate {} bytes of DMA memory", size);
            NxError::NoHostMemory
        })?;
        if region.size < size {
            error!("DmaBuffer: allocator returned {} bytes for a {}-byte request", region.size, size);
            allocator.free(region);
            return Err(NxError::NoHostMemory);
        }
        let mut buffer = DmaBuffer { region: Some(region), allocator: Arc::clone(allocator) };
        buffer.as_slice_mut().fill(0);
        Ok(buffer)
    }

    pub fn phys_addr(&self) -> u64 {
        self.region.as_ref().map_or(0, |r| r.phys)
    }

    pub fn len(&self) -> usize {
        self.region.as_ref().map_or(0, |r| r.size)
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.region {
            // SAFETY: the region is owned by this buffer and `size` bytes long.
            Some(r) => unsafe { core::slice::from_raw_parts(r.virt.as_ptr(), r.size) },
            None => &[],
        }
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        match &mut self.region {
            Some(r) => unsafe { core::slice::from_raw_parts_mut(r.virt.as_ptr(), r.size) },
            None => &mut [],
        }
    }

    /// Reads a little-endian word that the device may be writing concurrently.
    pub fn read_volatile_u64(&self, offset: usize) -> Option<u64> {
        let r = self.region.as_ref()?;
        if offset % 8 != 0 || offset + 8 > r.size {
            return None;
        }
        let word = unsafe { &*(r.virt.as_ptr().add(offset) as *const ReadOnly<u64>) };
        Some(u64::from_le(word.read()))
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            self.allocator.free(region);
        }
    }
}

impl core::fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("phys", &format_args!("{:#x}", self.phys_addr()))
            .field("len", &self.len())
            .finish()
    }
}
