//! Access to the NIC's control register block (CRB) and to the PEXQ doorbell ports.
//!
//! Register offsets depend on the adapter and firmware generation,
//! so they are supplied by the surrounding driver through [`CrbLayout`] and [`LegacyCrbMap`].

use core::ptr::NonNull;
use volatile::{ReadOnly, Volatile};

/// 32-bit access to the control register block of one PCI function.
///
/// Values are in host byte order; implementations convert from the little-endian bus.
pub trait CrbAccess: Send + Sync {
    fn read32(&self, offset: u32) -> u32;
    fn write32(&self, offset: u32, value: u32);
}

/// Offsets of the registers used by the command/response channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrbLayout {
    pub cdrp: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub arg3: u32,
    pub signature: u32,
    /// Reading returns 1 once the hardware semaphore is granted.
    pub sem_lock: u32,
    /// Reading releases the hardware semaphore.
    pub sem_unlock: u32,
    /// Counter the firmware increments while it is alive.
    pub heartbeat: u32,
    /// Non-zero while a firmware reset is requested or in progress.
    pub fw_reset: u32,
}

impl CrbLayout {
    /// Places the five CDRP registers at their fixed positions within the NIC register
    /// window starting at `nic_base`. The semaphore, heartbeat and reset registers
    /// live elsewhere and are given as absolute offsets.
    pub const fn with_cdrp_window(nic_base: u32, sem_lock: u32, sem_unlock: u32, heartbeat: u32, fw_reset: u32) -> CrbLayout {
        CrbLayout {
            cdrp:       nic_base + 0x18,
            arg1:       nic_base + 0x1c,
            arg2:       nic_base + 0x20,
            arg3:       nic_base + 0x24,
            signature:  nic_base + 0x28,
            sem_lock,
            sem_unlock,
            heartbeat,
            fw_reset,
        }
    }
}

/// Per-function registers used by v3.4 firmware, which predates CDRP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCrbMap {
    pub ctx_signature: u32,
    pub ctx_addr_hi: u32,
    pub ctx_addr_lo: u32,
    /// Producer register of each receive descriptor ring (normal, jumbo, LRO).
    pub rds_producers: [u32; netxen_ethernet::legacy::LEGACY_RDS_RINGS],
    /// Consumer register of each status ring.
    pub sds_consumers: [u32; netxen_ethernet::legacy::LEGACY_MAX_SDS_RINGS],
    /// Interrupt mask register of each status ring.
    pub sds_interrupts: [u32; netxen_ethernet::legacy::LEGACY_MAX_SDS_RINGS],
    pub cmd_producer: u32,
}


/// A control register block mapped into the kernel's address space.
pub struct MmioCrb {
    base: NonNull<u8>,
    len: usize,
}

// The mapping is only accessed through volatile reads and writes of aligned words.
unsafe impl Send for MmioCrb {}
unsafe impl Sync for MmioCrb {}

impl MmioCrb {
    /// # Safety
    ///
    /// `base` must point to `len` bytes of mapped device memory that stay mapped
    /// for the lifetime of the returned object.
    pub unsafe fn new(base: NonNull<u8>, len: usize) -> MmioCrb {
        MmioCrb { base, len }
    }

    fn register(&self, offset: u32) -> Option<*mut Volatile<u32>> {
        let offset = offset as usize;
        if offset % 4 != 0 || offset + 4 > self.len {
            error!("MmioCrb: register offset {:#x} is outside the {:#x}-byte window", offset, self.len);
            return None;
        }
        // SAFETY: bounds and alignment checked above, the window is mapped per `new`.
        Some(unsafe { self.base.as_ptr().add(offset) } as *mut Volatile<u32>)
    }
}

impl CrbAccess for MmioCrb {
    fn read32(&self, offset: u32) -> u32 {
        // a read outside the window behaves like a master abort
        self.register(offset).map_or(u32::MAX, |reg| u32::from_le(unsafe { (*reg).read() }))
    }

    fn write32(&self, offset: u32, value: u32) {
        if let Some(reg) = self.register(offset) {
            unsafe { (*reg).write(value.to_le()) }
        }
    }
}


/// The register pair used to ring the PEXQ doorbell of one PCI function.
pub trait DoorbellPort: Send + Sync {
    /// Posts a doorbell word.
    fn ring(&self, value: u64);
    /// Reads back the last doorbell word the hardware received.
    fn reflection(&self) -> u64;
}

/// Doorbell and reflection registers mapped into the kernel's address space.
pub struct MmioDoorbell {
    doorbell: NonNull<Volatile<u64>>,
    reflection: NonNull<ReadOnly<u64>>,
}

unsafe impl Send for MmioDoorbell {}
unsafe impl Sync for MmioDoorbell {}

impl MmioDoorbell {
    /// # Safety
    ///
    /// Both pointers must reference mapped, 8-byte aligned device registers
    /// that stay mapped for the lifetime of the returned object.
    pub unsafe fn new(doorbell: NonNull<u8>, reflection: NonNull<u8>) -> MmioDoorbell {
        MmioDoorbell {
            doorbell: doorbell.cast(),
            reflection: reflection.cast(),
        }
    }
}

impl DoorbellPort for MmioDoorbell {
    fn ring(&self, value: u64) {
        unsafe { (*self.doorbell.as_ptr()).write(value.to_le()) }
    }

    fn reflection(&self) -> u64 {
        u64::from_le(unsafe { self.reflection.as_ref() }.read())
    }
}
