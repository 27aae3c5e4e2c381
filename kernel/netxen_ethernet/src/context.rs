//! Layouts of the request and response buffers used to create rx and tx contexts.
//!
//! A request is a fixed header followed by a data area holding the per-ring sub-structures.
//! The header carries the offset of each ring array relative to the start of the data area,
//! so both sides agree on the layout without relying on padding.
//! The firmware writes its response in the same style into a second host buffer
//! whose physical address is passed inside the request.

use alloc::vec::Vec;
use core::mem::size_of;
use zerocopy::{AsBytes, FromBytes, Unaligned, U16, U32, U64};
use byteorder::LittleEndian;
use crate::WireError;
use crate::command::{Capabilities0, HostIntCrbMode, HostRdsCrbMode, RdsRingKind};

/// Size of the reserved area that closes every context header.
const RESERVED_BYTES: usize = 128;


#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct HostRqRxCtx {
    host_rsp_dma_addr:  U64<LittleEndian>,
    capabilities:       [U32<LittleEndian>; 4],
    host_int_crb_mode:  U32<LittleEndian>,
    host_rds_crb_mode:  U32<LittleEndian>,
    rds_ring_offset:    U32<LittleEndian>,
    sds_ring_offset:    U32<LittleEndian>,
    num_rds_rings:      U16<LittleEndian>,
    num_sds_rings:      U16<LittleEndian>,
    _rsvd1:             U16<LittleEndian>,
    _rsvd2:             U16<LittleEndian>,
    _reserved:          [u8; RESERVED_BYTES],
}

const_assert_eq!(size_of::<HostRqRxCtx>(), 176);

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct HostRqRdsRing {
    host_phys_addr: U64<LittleEndian>,
    buff_size:      U64<LittleEndian>,
    ring_size:      U32<LittleEndian>,
    ring_kind:      U32<LittleEndian>,
}

const_assert_eq!(size_of::<HostRqRdsRing>(), 24);

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct HostRqSdsRing {
    host_phys_addr: U64<LittleEndian>,
    ring_size:      U32<LittleEndian>,
    msi_index:      U16<LittleEndian>,
    _rsvd:          U16<LittleEndian>,
}

const_assert_eq!(size_of::<HostRqSdsRing>(), 16);

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct CardRspRxCtx {
    rds_ring_offset:    U32<LittleEndian>,
    sds_ring_offset:    U32<LittleEndian>,
    host_ctx_state:     U32<LittleEndian>,
    num_fn_per_port:    U32<LittleEndian>,
    num_rds_rings:      U16<LittleEndian>,
    num_sds_rings:      U16<LittleEndian>,
    context_id:         U16<LittleEndian>,
    phys_port:          u8,
    virt_port:          u8,
    _reserved:          [u8; RESERVED_BYTES],
}

const_assert_eq!(size_of::<CardRspRxCtx>(), 152);

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct CardRspRdsRing {
    host_producer_crb:  U32<LittleEndian>,
    _rsvd:              U32<LittleEndian>,
}

const_assert_eq!(size_of::<CardRspRdsRing>(), 8);

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct CardRspSdsRing {
    host_consumer_crb:  U32<LittleEndian>,
    interrupt_crb:      U32<LittleEndian>,
}

const_assert_eq!(size_of::<CardRspSdsRing>(), 8);

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct HostRqCdsRing {
    host_phys_addr: U64<LittleEndian>,
    ring_size:      U32<LittleEndian>,
    _rsvd:          U32<LittleEndian>,
}

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct HostRqTxCtx {
    host_rsp_dma_addr:  U64<LittleEndian>,
    cmd_cons_dma_addr:  U64<LittleEndian>,
    dummy_dma_addr:     U64<LittleEndian>,
    capabilities:       [U32<LittleEndian>; 4],
    host_int_crb_mode:  U32<LittleEndian>,
    _rsvd1:             U32<LittleEndian>,
    _rsvd2:             U16<LittleEndian>,
    interrupt_ctl:      U16<LittleEndian>,
    msi_index:          U16<LittleEndian>,
    _rsvd3:             U16<LittleEndian>,
    cds_ring:           HostRqCdsRing,
    _reserved:          [u8; RESERVED_BYTES],
}

const_assert_eq!(size_of::<HostRqTxCtx>(), 200);

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct CardRspTxCtx {
    host_ctx_state:     U32<LittleEndian>,
    context_id:         U16<LittleEndian>,
    phys_port:          u8,
    virt_port:          u8,
    host_producer_crb:  U32<LittleEndian>,
    interrupt_crb:      U32<LittleEndian>,
    _reserved:          [u8; RESERVED_BYTES],
}

const_assert_eq!(size_of::<CardRspTxCtx>(), 144);

#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct CardRspFuncAttrib {
    fenable:    U64<LittleEndian>,
    freq:       U64<LittleEndian>,
}


/// One receive descriptor ring as described to the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdsRingRequest {
    pub host_phys_addr: u64,
    pub ring_size: u32,
    pub ring_kind: RdsRingKind,
    pub buff_size: u64,
}

/// One receive status ring as described to the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdsRingRequest {
    pub host_phys_addr: u64,
    pub ring_size: u32,
    pub msi_index: u16,
}

/// The contents of a "create rx context" request.
#[derive(Debug, Clone)]
pub struct RxContextRequest<'r> {
    /// Physical address of the buffer the firmware writes its response into.
    pub host_rsp_dma_addr: u64,
    pub capabilities: Capabilities0,
    pub int_crb_mode: HostIntCrbMode,
    pub rds_crb_mode: HostRdsCrbMode,
    pub rds_rings: &'r [RdsRingRequest],
    pub sds_rings: &'r [SdsRingRequest],
}

impl<'r> RxContextRequest<'r> {
    /// The size in bytes of a request describing the given number of rings.
    pub const fn encoded_len(num_rds_rings: usize, num_sds_rings: usize) -> usize {
        size_of::<HostRqRxCtx>()
            + num_rds_rings * size_of::<HostRqRdsRing>()
            + num_sds_rings * size_of::<HostRqSdsRing>()
    }

    /// Writes the request into the start of `buf`, returning the number of bytes written.
    /// Bytes of `buf` that are not part of the request are left untouched.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        let num_rds = u16::try_from(self.rds_rings.len()).map_err(|_| WireError::TooManyRings)?;
        let num_sds = u16::try_from(self.sds_rings.len()).map_err(|_| WireError::TooManyRings)?;
        let len = Self::encoded_len(self.rds_rings.len(), self.sds_rings.len());
        if buf.len() < len {
            return Err(WireError::BufferTooSmall);
        }

        let rds_offset = 0usize;
        let sds_offset = rds_offset + self.rds_rings.len() * size_of::<HostRqRdsRing>();

        let mut header = HostRqRxCtx::new_zeroed();
        header.host_rsp_dma_addr.set(self.host_rsp_dma_addr);
        header.capabilities[0].set(self.capabilities.bits());
        header.host_int_crb_mode.set(self.int_crb_mode as u32);
        header.host_rds_crb_mode.set(self.rds_crb_mode as u32);
        header.rds_ring_offset.set(rds_offset as u32);
        header.sds_ring_offset.set(sds_offset as u32);
        header.num_rds_rings.set(num_rds);
        header.num_sds_rings.set(num_sds);
        header.write_to_prefix(&mut buf[..]).ok_or(WireError::BufferTooSmall)?;

        let data = &mut buf[size_of::<HostRqRxCtx>()..len];
        for (i, ring) in self.rds_rings.iter().enumerate() {
            let mut rds = HostRqRdsRing::new_zeroed();
            rds.host_phys_addr.set(ring.host_phys_addr);
            rds.buff_size.set(ring.buff_size);
            rds.ring_size.set(ring.ring_size);
            rds.ring_kind.set(ring.ring_kind as u32);
            let start = rds_offset + i * size_of::<HostRqRdsRing>();
            rds.write_to_prefix(&mut data[start..]).ok_or(WireError::BufferTooSmall)?;
        }
        for (i, ring) in self.sds_rings.iter().enumerate() {
            let mut sds = HostRqSdsRing::new_zeroed();
            sds.host_phys_addr.set(ring.host_phys_addr);
            sds.ring_size.set(ring.ring_size);
            sds.msi_index.set(ring.msi_index);
            let start = sds_offset + i * size_of::<HostRqSdsRing>();
            sds.write_to_prefix(&mut data[start..]).ok_or(WireError::BufferTooSmall)?;
        }
        Ok(len)
    }
}


/// Firmware-assigned registers for one receive status ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdsRingResponse {
    pub host_consumer_crb: u32,
    pub interrupt_crb: u32,
}

/// The decoded firmware response to a "create rx context" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxContextResponse {
    pub host_ctx_state: u32,
    pub num_fn_per_port: u32,
    pub context_id: u16,
    pub phys_port: u8,
    pub virt_port: u8,
    /// The producer CRB of each receive descriptor ring, in request order.
    pub rds_producer_crbs: Vec<u32>,
    pub sds_rings: Vec<SdsRingResponse>,
}

impl RxContextResponse {
    /// The size in bytes of the response buffer needed for the given number of rings.
    pub const fn encoded_len(num_rds_rings: usize, num_sds_rings: usize) -> usize {
        size_of::<CardRspRxCtx>()
            + num_rds_rings * size_of::<CardRspRdsRing>()
            + num_sds_rings * size_of::<CardRspSdsRing>()
    }

    /// Parses a response buffer. The firmware may not report more rings than
    /// `max_rds_rings`/`max_sds_rings`, which are the counts that were requested.
    pub fn decode(buf: &[u8], max_rds_rings: usize, max_sds_rings: usize) -> Result<Self, WireError> {
        let header = CardRspRxCtx::read_from_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        let data = &buf[size_of::<CardRspRxCtx>()..];

        let num_rds = header.num_rds_rings.get() as usize;
        let num_sds = header.num_sds_rings.get() as usize;
        if num_rds > max_rds_rings || num_sds > max_sds_rings {
            return Err(WireError::RingCountMismatch);
        }

        let rds_offset = header.rds_ring_offset.get() as usize;
        let mut rds_producer_crbs = Vec::with_capacity(num_rds);
        for i in 0..num_rds {
            let start = rds_offset + i * size_of::<CardRspRdsRing>();
            let ring = data.get(start..)
                .and_then(CardRspRdsRing::read_from_prefix)
                .ok_or(WireError::OffsetOutOfBounds)?;
            rds_producer_crbs.push(ring.host_producer_crb.get());
        }

        let sds_offset = header.sds_ring_offset.get() as usize;
        let mut sds_rings = Vec::with_capacity(num_sds);
        for i in 0..num_sds {
            let start = sds_offset + i * size_of::<CardRspSdsRing>();
            let ring = data.get(start..)
                .and_then(CardRspSdsRing::read_from_prefix)
                .ok_or(WireError::OffsetOutOfBounds)?;
            sds_rings.push(SdsRingResponse {
                host_consumer_crb: ring.host_consumer_crb.get(),
                interrupt_crb: ring.interrupt_crb.get(),
            });
        }

        Ok(RxContextResponse {
            host_ctx_state: header.host_ctx_state.get(),
            num_fn_per_port: header.num_fn_per_port.get(),
            context_id: header.context_id.get(),
            phys_port: header.phys_port,
            virt_port: header.virt_port,
            rds_producer_crbs,
            sds_rings,
        })
    }

    /// Writes a response in firmware form, with the ring arrays packed right after the header.
    /// Used by firmware models and diagnostics.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        let num_rds = u16::try_from(self.rds_producer_crbs.len()).map_err(|_| WireError::TooManyRings)?;
        let num_sds = u16::try_from(self.sds_rings.len()).map_err(|_| WireError::TooManyRings)?;
        let len = Self::encoded_len(self.rds_producer_crbs.len(), self.sds_rings.len());
        if buf.len() < len {
            return Err(WireError::BufferTooSmall);
        }
        let sds_offset = self.rds_producer_crbs.len() * size_of::<CardRspRdsRing>();

        let mut header = CardRspRxCtx::new_zeroed();
        header.rds_ring_offset.set(0);
        header.sds_ring_offset.set(sds_offset as u32);
        header.host_ctx_state.set(self.host_ctx_state);
        header.num_fn_per_port.set(self.num_fn_per_port);
        header.num_rds_rings.set(num_rds);
        header.num_sds_rings.set(num_sds);
        header.context_id.set(self.context_id);
        header.phys_port = self.phys_port;
        header.virt_port = self.virt_port;
        header.write_to_prefix(&mut buf[..]).ok_or(WireError::BufferTooSmall)?;

        let data = &mut buf[size_of::<CardRspRxCtx>()..len];
        for (i, crb) in self.rds_producer_crbs.iter().enumerate() {
            let mut rds = CardRspRdsRing::new_zeroed();
            rds.host_producer_crb.set(*crb);
            rds.write_to_prefix(&mut data[i * size_of::<CardRspRdsRing>()..])
                .ok_or(WireError::BufferTooSmall)?;
        }
        for (i, ring) in self.sds_rings.iter().enumerate() {
            let mut sds = CardRspSdsRing::new_zeroed();
            sds.host_consumer_crb.set(ring.host_consumer_crb);
            sds.interrupt_crb.set(ring.interrupt_crb);
            sds.write_to_prefix(&mut data[sds_offset + i * size_of::<CardRspSdsRing>()..])
                .ok_or(WireError::BufferTooSmall)?;
        }
        Ok(len)
    }
}

/// Reads the header fields of an rx context request, used by firmware models to
/// find the response buffer and ring counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxContextRequestHeader {
    pub host_rsp_dma_addr: u64,
    pub capabilities: u32,
    pub num_rds_rings: u16,
    pub num_sds_rings: u16,
    pub rds_ring_offset: u32,
    pub sds_ring_offset: u32,
}

impl RxContextRequestHeader {
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let header = HostRqRxCtx::read_from_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        Ok(RxContextRequestHeader {
            host_rsp_dma_addr: header.host_rsp_dma_addr.get(),
            capabilities: header.capabilities[0].get(),
            num_rds_rings: header.num_rds_rings.get(),
            num_sds_rings: header.num_sds_rings.get(),
            rds_ring_offset: header.rds_ring_offset.get(),
            sds_ring_offset: header.sds_ring_offset.get(),
        })
    }

    /// Returns the `index`th receive descriptor ring of the request in `buf`.
    pub fn rds_ring(&self, buf: &[u8], index: usize) -> Result<RdsRingRequest, WireError> {
        let start = size_of::<HostRqRxCtx>() + self.rds_ring_offset as usize + index * size_of::<HostRqRdsRing>();
        let ring = buf.get(start..)
            .and_then(HostRqRdsRing::read_from_prefix)
            .ok_or(WireError::OffsetOutOfBounds)?;
        let ring_kind = RdsRingKind::try_from(ring.ring_kind.get()).unwrap_or(RdsRingKind::Normal);
        Ok(RdsRingRequest {
            host_phys_addr: ring.host_phys_addr.get(),
            ring_size: ring.ring_size.get(),
            ring_kind,
            buff_size: ring.buff_size.get(),
        })
    }

    /// Returns the `index`th receive status ring of the request in `buf`.
    pub fn sds_ring(&self, buf: &[u8], index: usize) -> Result<SdsRingRequest, WireError> {
        let start = size_of::<HostRqRxCtx>() + self.sds_ring_offset as usize + index * size_of::<HostRqSdsRing>();
        let ring = buf.get(start..)
            .and_then(HostRqSdsRing::read_from_prefix)
            .ok_or(WireError::OffsetOutOfBounds)?;
        Ok(SdsRingRequest {
            host_phys_addr: ring.host_phys_addr.get(),
            ring_size: ring.ring_size.get(),
            msi_index: ring.msi_index.get(),
        })
    }
}


/// The command descriptor ring of a tx context as described to the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdsRingRequest {
    pub host_phys_addr: u64,
    pub ring_size: u32,
}

/// The contents of a "create tx context" request.
#[derive(Debug, Clone)]
pub struct TxContextRequest {
    /// Physical address of the buffer the firmware writes its response into.
    pub host_rsp_dma_addr: u64,
    /// Host memory the firmware updates with its command ring consumer index.
    pub cmd_cons_dma_addr: u64,
    pub dummy_dma_addr: u64,
    pub capabilities: Capabilities0,
    pub int_crb_mode: HostIntCrbMode,
    pub interrupt_ctl: u16,
    pub msi_index: u16,
    pub cds_ring: CdsRingRequest,
}

impl TxContextRequest {
    pub const ENCODED_LEN: usize = size_of::<HostRqTxCtx>();

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        let mut rq = HostRqTxCtx::new_zeroed();
        rq.host_rsp_dma_addr.set(self.host_rsp_dma_addr);
        rq.cmd_cons_dma_addr.set(self.cmd_cons_dma_addr);
        rq.dummy_dma_addr.set(self.dummy_dma_addr);
        rq.capabilities[0].set(self.capabilities.bits());
        rq.host_int_crb_mode.set(self.int_crb_mode as u32);
        rq.interrupt_ctl.set(self.interrupt_ctl);
        rq.msi_index.set(self.msi_index);
        rq.cds_ring.host_phys_addr.set(self.cds_ring.host_phys_addr);
        rq.cds_ring.ring_size.set(self.cds_ring.ring_size);
        rq.write_to_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        Ok(Self::ENCODED_LEN)
    }

    /// Parses a request in `buf`, used by firmware models.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let rq = HostRqTxCtx::read_from_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        Ok(TxContextRequest {
            host_rsp_dma_addr: rq.host_rsp_dma_addr.get(),
            cmd_cons_dma_addr: rq.cmd_cons_dma_addr.get(),
            dummy_dma_addr: rq.dummy_dma_addr.get(),
            capabilities: Capabilities0::from_bits_truncate(rq.capabilities[0].get()),
            int_crb_mode: match rq.host_int_crb_mode.get() {
                0 => HostIntCrbMode::Unique,
                2 => HostIntCrbMode::NoRx,
                3 => HostIntCrbMode::NoTx,
                4 => HostIntCrbMode::NoRxTx,
                _ => HostIntCrbMode::Shared,
            },
            interrupt_ctl: rq.interrupt_ctl.get(),
            msi_index: rq.msi_index.get(),
            cds_ring: CdsRingRequest {
                host_phys_addr: rq.cds_ring.host_phys_addr.get(),
                ring_size: rq.cds_ring.ring_size.get(),
            },
        })
    }
}

/// The decoded firmware response to a "create tx context" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxContextResponse {
    pub host_ctx_state: u32,
    pub context_id: u16,
    pub phys_port: u8,
    pub virt_port: u8,
    pub host_producer_crb: u32,
    pub interrupt_crb: u32,
}

impl TxContextResponse {
    pub const ENCODED_LEN: usize = size_of::<CardRspTxCtx>();

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let rsp = CardRspTxCtx::read_from_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        Ok(TxContextResponse {
            host_ctx_state: rsp.host_ctx_state.get(),
            context_id: rsp.context_id.get(),
            phys_port: rsp.phys_port,
            virt_port: rsp.virt_port,
            host_producer_crb: rsp.host_producer_crb.get(),
            interrupt_crb: rsp.interrupt_crb.get(),
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        let mut rsp = CardRspTxCtx::new_zeroed();
        rsp.host_ctx_state.set(self.host_ctx_state);
        rsp.context_id.set(self.context_id);
        rsp.phys_port = self.phys_port;
        rsp.virt_port = self.virt_port;
        rsp.host_producer_crb.set(self.host_producer_crb);
        rsp.interrupt_crb.set(self.interrupt_crb);
        rsp.write_to_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        Ok(Self::ENCODED_LEN)
    }
}


/// Per-function attributes reported by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionAttributes {
    pub fenable: u64,
    pub freq: u64,
}

impl FunctionAttributes {
    pub const ENCODED_LEN: usize = size_of::<CardRspFuncAttrib>();

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let rsp = CardRspFuncAttrib::read_from_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        Ok(FunctionAttributes { fenable: rsp.fenable.get(), freq: rsp.freq.get() })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        let mut rsp = CardRspFuncAttrib::new_zeroed();
        rsp.fenable.set(self.fenable);
        rsp.freq.set(self.freq);
        rsp.write_to_prefix(buf).ok_or(WireError::BufferTooSmall)?;
        Ok(Self::ENCODED_LEN)
    }
}
