//! The ring context used by v3.4 firmware, which predates the CDRP context requests.
//! The host fills one of these in DMA memory and hands its address to the firmware
//! through per-function signature and address registers.

use core::mem::size_of;
use zerocopy::{AsBytes, FromBytes, Unaligned, U32, U64};
use byteorder::LittleEndian;
use crate::WireError;

/// Number of receive descriptor rings a legacy context always has.
pub const LEGACY_RDS_RINGS: usize = 3;
/// Number of status rings a legacy context can describe.
pub const LEGACY_MAX_SDS_RINGS: usize = 8;
/// The firmware reads one trailing word past the ring context.
pub const LEGACY_CONTEXT_LEN: usize = size_of::<LegacyRingContext>() + size_of::<u32>();


#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct RcvContext {
    ring_addr_lo:   U32<LittleEndian>,
    ring_addr_hi:   U32<LittleEndian>,
    ring_size:      U32<LittleEndian>,
    _rsvd:          U32<LittleEndian>,
}

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct StsRing {
    ring_addr:      U64<LittleEndian>,
    ring_size:      U32<LittleEndian>,
    msix_entry_idx: U32<LittleEndian>,
}

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct LegacyRingContext {
    cmd_consumer_offset:    U64<LittleEndian>,
    cmd_ring_addr_lo:       U32<LittleEndian>,
    cmd_ring_addr_hi:       U32<LittleEndian>,
    cmd_ring_size:          U32<LittleEndian>,
    _rsvd:                  U32<LittleEndian>,
    rcv_contexts:           [RcvContext; LEGACY_RDS_RINGS],
    sts_ring_addr_lo:       U32<LittleEndian>,
    sts_ring_addr_hi:       U32<LittleEndian>,
    sts_ring_size:          U32<LittleEndian>,
    _ctx_id:                U32<LittleEndian>,
    _d3_state_register:     U64<LittleEndian>,
    _dummy_dma_addr_lo:     U32<LittleEndian>,
    _dummy_dma_addr_hi:     U32<LittleEndian>,
    _end_v1_context:        U64<LittleEndian>,
    sts_ring_count:         U32<LittleEndian>,
    _rsvd_2:                U32<LittleEndian>,
    sts_rings:              [StsRing; LEGACY_MAX_SDS_RINGS],
    /// The firmware expects the context to occupy a whole 64-byte multiple.
    _align:                 [u8; 8],
}

const_assert_eq!(size_of::<RcvContext>(), 16);
const_assert_eq!(size_of::<StsRing>(), 16);
const_assert_eq!(size_of::<LegacyRingContext>(), 256);


/// A ring (base address and element count) placed in a legacy ring context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegacyRing {
    pub host_phys_addr: u64,
    pub ring_size: u32,
}

/// A status ring placed in a legacy ring context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegacyStatusRing {
    pub host_phys_addr: u64,
    pub ring_size: u32,
    pub msi_index: u32,
}

/// Everything the host tells v3.4 firmware about an rx/tx context pair.
#[derive(Debug, Clone)]
pub struct LegacyContextRequest<'r> {
    /// Host memory the firmware updates with its command ring consumer index.
    pub cmd_cons_dma_addr: u64,
    pub cmd_ring: LegacyRing,
    pub rcv_rings: &'r [LegacyRing],
    pub sts_rings: &'r [LegacyStatusRing],
}

impl<'r> LegacyContextRequest<'r> {
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        if self.rcv_rings.len() > LEGACY_RDS_RINGS || self.sts_rings.len() > LEGACY_MAX_SDS_RINGS {
            return Err(WireError::TooManyRings);
        }
        if buf.len() < LEGACY_CONTEXT_LEN {
            return Err(WireError::BufferTooSmall);
        }

        let mut ctx = LegacyRingContext::new_zeroed();
        ctx.cmd_consumer_offset.set(self.cmd_cons_dma_addr);
        ctx.cmd_ring_addr_lo.set(self.cmd_ring.host_phys_addr as u32);
        ctx.cmd_ring_addr_hi.set((self.cmd_ring.host_phys_addr >> 32) as u32);
        ctx.cmd_ring_size.set(self.cmd_ring.ring_size);

        for (rcv, ring) in ctx.rcv_contexts.iter_mut().zip(self.rcv_rings) {
            rcv.ring_addr_lo.set(ring.host_phys_addr as u32);
            rcv.ring_addr_hi.set((ring.host_phys_addr >> 32) as u32);
            rcv.ring_size.set(ring.ring_size);
        }

        // The first status ring is also described in the v1 part of the context.
        if let Some(first) = self.sts_rings.first() {
            ctx.sts_ring_addr_lo.set(first.host_phys_addr as u32);
            ctx.sts_ring_addr_hi.set((first.host_phys_addr >> 32) as u32);
            ctx.sts_ring_size.set(first.ring_size);
        }
        for (sts, ring) in ctx.sts_rings.iter_mut().zip(self.sts_rings) {
            sts.ring_addr.set(ring.host_phys_addr);
            sts.ring_size.set(ring.ring_size);
            sts.msix_entry_idx.set(ring.msi_index);
        }
        ctx.sts_ring_count.set(self.sts_rings.len() as u32);

        buf[..LEGACY_CONTEXT_LEN].fill(0);
        ctx.write_to_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        Ok(LEGACY_CONTEXT_LEN)
    }
}

/// Reads back the command ring and status ring count of an encoded legacy context.
pub fn decode_legacy_summary(buf: &[u8]) -> Result<(LegacyRing, u32), WireError> {
    let ctx = LegacyRingContext::read_from_prefix(buf).ok_or(WireError::BufferTooSmall)?;
    let cmd_ring = LegacyRing {
        host_phys_addr: (ctx.cmd_ring_addr_hi.get() as u64) << 32 | ctx.cmd_ring_addr_lo.get() as u64,
        ring_size: ctx.cmd_ring_size.get(),
    };
    Ok((cmd_ring, ctx.sts_ring_count.get()))
}
