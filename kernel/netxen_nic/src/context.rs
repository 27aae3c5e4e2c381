//! Receive and transmit hardware contexts.
//!
//! A context is first allocated on the host, which reserves an id in the device's context
//! table and records its ring descriptors. Creating it binds those rings to the firmware,
//! which answers with the registers the host must use to drive each ring. Destroying it
//! unbinds it again, and freeing it releases the table id.
//!
//! ```text
//! alloc ──> ALLOCATED ──create──> ACTIVE ──destroy──> FREED ──free──> (id released)
//! ```

use alloc::vec::Vec;
use netxen_ethernet::command::{
    Capabilities0, CdrpOpcode, DestroyCommand, HostCtxState, HostIntCrbMode, HostRdsCrbMode, RdsRingKind,
};
use netxen_ethernet::context::{
    CdsRingRequest, RdsRingRequest, RxContextRequest, RxContextResponse, SdsRingRequest,
    TxContextRequest, TxContextResponse,
};
use netxen_ethernet::legacy::{LegacyContextRequest, LegacyRing, LegacyStatusRing, LEGACY_CONTEXT_LEN};
use crate::config::ProtocolVersion;
use crate::device::NicDevice;
use crate::dma::{DmaBuffer, DmaFlags};
use crate::error::NxError;
use crate::regs::LegacyCrbMap;

/// Names an rx context in its device's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RxContextHandle {
    id: u8,
    generation: u32,
}

impl RxContextHandle {
    /// The table id, stable for the lifetime of the context.
    pub fn id(&self) -> u8 {
        self.id
    }
}

/// Names a tx context in its device's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxContextHandle {
    id: u8,
    generation: u32,
}

impl TxContextHandle {
    pub fn id(&self) -> u8 {
        self.id
    }
}

/// How a context is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyMode {
    /// Ask the firmware to reset the context.
    Reset,
    /// Ask the firmware to reset the context for a transition to D3.
    D3Reset,
    /// Only unbind on the host, for firmware that is dead or already reset.
    SkipFirmware,
}

impl DestroyMode {
    fn command(self) -> Option<DestroyCommand> {
        match self {
            DestroyMode::Reset => Some(DestroyCommand::Reset),
            DestroyMode::D3Reset => Some(DestroyCommand::D3Reset),
            DestroyMode::SkipFirmware => None,
        }
    }
}


/// A receive descriptor ring, onto which the host posts empty buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdsRing {
    pub host_phys_addr: u64,
    pub ring_size: u32,
    pub ring_kind: RdsRingKind,
    pub buff_size: u64,
    /// Register the host writes its producer index to, assigned by the firmware.
    pub producer_crb: u32,
}

impl RdsRing {
    pub fn new(host_phys_addr: u64, ring_size: u32, ring_kind: RdsRingKind, buff_size: u64) -> RdsRing {
        RdsRing { host_phys_addr, ring_size, ring_kind, buff_size, producer_crb: 0 }
    }
}

/// A status descriptor ring, on which the firmware reports received packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdsRing {
    pub host_phys_addr: u64,
    pub ring_size: u32,
    pub msi_index: u16,
    /// Register the host writes its consumer index to, assigned by the firmware.
    pub consumer_crb: u32,
    /// Interrupt mask register of the ring, assigned by the firmware.
    pub interrupt_crb: u32,
}

impl SdsRing {
    pub fn new(host_phys_addr: u64, ring_size: u32, msi_index: u16) -> SdsRing {
        SdsRing { host_phys_addr, ring_size, msi_index, consumer_crb: 0, interrupt_crb: 0 }
    }
}

/// The command descriptor ring of a tx context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdsRing {
    pub host_phys_addr: u64,
    pub ring_size: u32,
    pub producer_crb: u32,
}

impl CdsRing {
    pub fn new(host_phys_addr: u64, ring_size: u32) -> CdsRing {
        CdsRing { host_phys_addr, ring_size, producer_crb: 0 }
    }
}


/// Host-side choices for an rx context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxContextOptions {
    /// Ask the firmware for one of several contexts on the port.
    pub multi_context: bool,
    /// Allow jumbo and LRO buffers to be chained instead of contiguous.
    pub chaining_allowed: bool,
    /// Number of receive filter rules. Rx id 0 always gets the rules left over by the rx queues.
    pub num_rules: u16,
}

/// A snapshot of an rx context.
#[derive(Debug, Clone)]
pub struct RxContext {
    pub state: HostCtxState,
    /// The id the firmware assigned when the context was created.
    pub context_id: u16,
    pub port: u8,
    pub num_fn_per_port: u32,
    pub num_rules: u16,
    pub multi_context: bool,
    pub chaining_allowed: bool,
    pub rds_rings: Vec<RdsRing>,
    pub sds_rings: Vec<SdsRing>,
    /// Set while a firmware command for this context is in flight.
    binding: bool,
}

/// Host-side addresses and interrupt settings of a tx context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxContextOptions {
    /// Host memory the firmware writes the command ring consumer index to.
    pub cmd_cons_dma_addr: u64,
    pub dummy_dma_addr: u64,
    pub interrupt_ctl: u16,
    pub msi_index: u16,
}

/// A snapshot of a tx context.
#[derive(Debug, Clone)]
pub struct TxContext {
    pub state: HostCtxState,
    pub context_id: u16,
    pub port: u8,
    pub options: TxContextOptions,
    pub cds_ring: CdsRing,
    pub interrupt_crb: u32,
    binding: bool,
}


impl NicDevice {
    /// Reserves the lowest free rx id and records the context's rings.
    pub fn alloc_rx_context(
        &self,
        rds_rings: Vec<RdsRing>,
        sds_rings: Vec<SdsRing>,
        options: RxContextOptions,
    ) -> Result<RxContextHandle, NxError> {
        if rds_rings.is_empty() || rds_rings.len() > self.config.max_rds_per_ctx
            || sds_rings.is_empty() || sds_rings.len() > self.config.max_sds_per_ctx
        {
            return Err(NxError::InvalidArguments);
        }

        let mut state = self.state.lock();
        let reserved = state.rx_reserved;
        let id = state.rx.find_free(reserved).ok_or(NxError::MaxExceeded)?;
        let num_rules = if id == 0 {
            self.config.max_supported_filters - self.config.num_rx_queues
        } else {
            options.num_rules
        };
        let generation = state.rx.insert(id, RxContext {
            state: HostCtxState::Allocated,
            context_id: 0,
            port: 0,
            num_fn_per_port: 0,
            num_rules,
            multi_context: options.multi_context,
            chaining_allowed: options.chaining_allowed,
            rds_rings,
            sds_rings,
            binding: false,
        });
        debug!("netxen: rx context {} allocated, {} active", id, state.rx.count());
        Ok(RxContextHandle { id, generation })
    }

    /// Reserves the lowest free tx id.
    pub fn alloc_tx_context(&self, cds_ring: CdsRing, options: TxContextOptions) -> Result<TxContextHandle, NxError> {
        let mut state = self.state.lock();
        let id = state.tx.find_free(0).ok_or(NxError::MaxExceeded)?;
        let generation = state.tx.insert(id, TxContext {
            state: HostCtxState::Allocated,
            context_id: 0,
            port: 0,
            options,
            cds_ring,
            interrupt_crb: 0,
            binding: false,
        });
        debug!("netxen: tx context {} allocated, {} active", id, state.tx.count());
        Ok(TxContextHandle { id, generation })
    }

    /// Returns a snapshot of an rx context, or `None` if the handle is stale.
    pub fn rx_context(&self, handle: RxContextHandle) -> Option<RxContext> {
        self.state.lock().rx.get(handle.id, handle.generation).cloned()
    }

    pub fn tx_context(&self, handle: TxContextHandle) -> Option<TxContext> {
        self.state.lock().tx.get(handle.id, handle.generation).cloned()
    }

    /// Binds an allocated rx context to the firmware.
    ///
    /// On success the rings carry the registers assigned by the firmware and the context
    /// becomes the device's default rx context if there was none. On failure it stays
    /// `Allocated`. The request and response buffers never outlive this call.
    pub fn create_rx_context(&self, handle: RxContextHandle) -> Result<(), NxError> {
        if let ProtocolVersion::Legacy(_) = self.config.protocol {
            return Err(NxError::NotSupported);
        }

        let snapshot = {
            let mut state = self.state.lock();
            let ctx = state.rx.get_mut(handle.id, handle.generation).ok_or(NxError::InvalidArguments)?;
            if ctx.state != HostCtxState::Allocated || ctx.binding {
                error!("netxen: rx context {} cannot be created in state {:?}", handle.id, ctx.state);
                return Err(NxError::InvalidState);
            }
            ctx.binding = true;
            ctx.clone()
        };

        let result = self.bind_rx_context(&snapshot);

        let mut state = self.state.lock();
        let ctx = state.rx.get_mut(handle.id, handle.generation).ok_or(NxError::InvalidArguments)?;
        ctx.binding = false;
        let (rsp, ctx_state) = result?;

        for (ring, crb) in ctx.rds_rings.iter_mut().zip(&rsp.rds_producer_crbs) {
            ring.producer_crb = *crb;
        }
        for (ring, crbs) in ctx.sds_rings.iter_mut().zip(&rsp.sds_rings) {
            ring.consumer_crb = crbs.host_consumer_crb;
            ring.interrupt_crb = crbs.interrupt_crb;
        }
        ctx.state = ctx_state;
        ctx.context_id = rsp.context_id;
        ctx.port = rsp.virt_port;
        ctx.num_fn_per_port = rsp.num_fn_per_port;
        if state.default_rx.is_none() {
            state.default_rx = Some(handle);
        }
        debug!("netxen: rx context {} created as firmware context {} in state {:?}",
            handle.id, rsp.context_id, ctx_state);
        Ok(())
    }

    fn bind_rx_context(&self, ctx: &RxContext) -> Result<(RxContextResponse, HostCtxState), NxError> {
        let nrds = ctx.rds_rings.len();
        let nsds = ctx.sds_rings.len();
        let rq_len = RxContextRequest::encoded_len(nrds, nsds);
        let rsp_len = RxContextResponse::encoded_len(nrds, nsds);
        let mut request = DmaBuffer::new(&self.dma, rq_len, DmaFlags::MAY_SLEEP)?;
        let response = DmaBuffer::new(&self.dma, rsp_len, DmaFlags::MAY_SLEEP)?;

        let mut capabilities = Capabilities0::LEGACY_CONTEXT | Capabilities0::LEGACY_MN | Capabilities0::LRO;
        if ctx.multi_context {
            capabilities |= Capabilities0::MULTI_CONTEXT;
        }
        if !ctx.chaining_allowed {
            capabilities |= Capabilities0::JUMBO_CONTIGUOUS | Capabilities0::LRO_CONTIGUOUS;
        }

        let rds: Vec<RdsRingRequest> = ctx.rds_rings.iter().map(|r| RdsRingRequest {
            host_phys_addr: r.host_phys_addr,
            ring_size: r.ring_size,
            ring_kind: r.ring_kind,
            buff_size: r.buff_size,
        }).collect();
        let sds: Vec<SdsRingRequest> = ctx.sds_rings.iter().map(|r| SdsRingRequest {
            host_phys_addr: r.host_phys_addr,
            ring_size: r.ring_size,
            msi_index: r.msi_index,
        }).collect();

        RxContextRequest {
            host_rsp_dma_addr: response.phys_addr(),
            capabilities,
            int_crb_mode: HostIntCrbMode::Shared,
            rds_crb_mode: HostRdsCrbMode::Unique,
            rds_rings: &rds,
            sds_rings: &sds,
        }.encode(request.as_slice_mut())?;

        let phys = request.phys_addr();
        self.issue(CdrpOpcode::CreateRxCtx, [(phys >> 32) as u32, phys as u32, rq_len as u32])?;

        let rsp = RxContextResponse::decode(response.as_slice(), nrds, nsds)?;
        let ctx_state = HostCtxState::try_from(rsp.host_ctx_state).map_err(|_| {
            error!("netxen: firmware reported unknown rx context state {:#x}", rsp.host_ctx_state);
            NxError::MalformedResponse
        })?;
        Ok((rsp, ctx_state))
    }

    /// Binds an allocated tx context to the firmware.
    pub fn create_tx_context(&self, handle: TxContextHandle) -> Result<(), NxError> {
        if let ProtocolVersion::Legacy(_) = self.config.protocol {
            return Err(NxError::NotSupported);
        }

        let snapshot = {
            let mut state = self.state.lock();
            let ctx = state.tx.get_mut(handle.id, handle.generation).ok_or(NxError::InvalidArguments)?;
            if ctx.state != HostCtxState::Allocated || ctx.binding {
                error!("netxen: tx context {} cannot be created in state {:?}", handle.id, ctx.state);
                return Err(NxError::InvalidState);
            }
            ctx.binding = true;
            ctx.clone()
        };

        let result = self.bind_tx_context(&snapshot);

        let mut state = self.state.lock();
        let ctx = state.tx.get_mut(handle.id, handle.generation).ok_or(NxError::InvalidArguments)?;
        ctx.binding = false;
        let (rsp, ctx_state) = result?;

        ctx.cds_ring.producer_crb = rsp.host_producer_crb;
        ctx.interrupt_crb = rsp.interrupt_crb;
        ctx.state = ctx_state;
        ctx.context_id = rsp.context_id;
        ctx.port = rsp.virt_port;
        if state.default_tx.is_none() {
            state.default_tx = Some(handle);
        }
        debug!("netxen: tx context {} created as firmware context {}", handle.id, rsp.context_id);
        Ok(())
    }

    fn bind_tx_context(&self, ctx: &TxContext) -> Result<(TxContextResponse, HostCtxState), NxError> {
        let mut request = DmaBuffer::new(&self.dma, TxContextRequest::ENCODED_LEN, DmaFlags::MAY_SLEEP)?;
        let response = DmaBuffer::new(&self.dma, TxContextResponse::ENCODED_LEN, DmaFlags::MAY_SLEEP)?;

        TxContextRequest {
            host_rsp_dma_addr: response.phys_addr(),
            cmd_cons_dma_addr: ctx.options.cmd_cons_dma_addr,
            dummy_dma_addr: ctx.options.dummy_dma_addr,
            capabilities: Capabilities0::LEGACY_CONTEXT | Capabilities0::LEGACY_MN | Capabilities0::LSO,
            int_crb_mode: HostIntCrbMode::Shared,
            interrupt_ctl: ctx.options.interrupt_ctl,
            msi_index: ctx.options.msi_index,
            cds_ring: CdsRingRequest {
                host_phys_addr: ctx.cds_ring.host_phys_addr,
                ring_size: ctx.cds_ring.ring_size,
            },
        }.encode(request.as_slice_mut())?;

        let phys = request.phys_addr();
        self.issue(CdrpOpcode::CreateTxCtx, [(phys >> 32) as u32, phys as u32, TxContextRequest::ENCODED_LEN as u32])?;

        let rsp = TxContextResponse::decode(response.as_slice())?;
        let ctx_state = HostCtxState::try_from(rsp.host_ctx_state).map_err(|_| {
            error!("netxen: firmware reported unknown tx context state {:#x}", rsp.host_ctx_state);
            NxError::MalformedResponse
        })?;
        Ok((rsp, ctx_state))
    }

    /// Creates an rx context and a tx context together.
    ///
    /// CDRP firmware gets one create command per context; if the tx context fails the rx
    /// context is destroyed again. v3.4 firmware receives both in a single legacy ring context.
    pub fn create_context_pair(&self, rx: RxContextHandle, tx: TxContextHandle) -> Result<(), NxError> {
        match &self.config.protocol {
            ProtocolVersion::Cdrp => {
                self.create_rx_context(rx)?;
                if let Err(e) = self.create_tx_context(tx) {
                    if let Err(undo) = self.destroy_rx_context(rx, DestroyMode::Reset) {
                        warn!("netxen: could not destroy rx context {} after tx creation failed: {}", rx.id, undo);
                    }
                    return Err(e);
                }
                Ok(())
            }
            ProtocolVersion::Legacy(map) => self.create_legacy_pair(map, rx, tx),
        }
    }

    fn create_legacy_pair(&self, map: &LegacyCrbMap, rx: RxContextHandle, tx: TxContextHandle) -> Result<(), NxError> {
        let (rx_snapshot, tx_snapshot) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.legacy_ring_context.is_some() {
                return Err(NxError::InvalidState);
            }
            let rx_ctx = state.rx.get_mut(rx.id, rx.generation).ok_or(NxError::InvalidArguments)?;
            let tx_ctx = state.tx.get_mut(tx.id, tx.generation).ok_or(NxError::InvalidArguments)?;
            if rx_ctx.state != HostCtxState::Allocated || rx_ctx.binding || tx_ctx.state != HostCtxState::Allocated || tx_ctx.binding {
                return Err(NxError::InvalidState);
            }
            // neither half may be destroyed or freed while the firmware is told about it
            rx_ctx.binding = true;
            tx_ctx.binding = true;
            (rx_ctx.clone(), tx_ctx.clone())
        };

        let result = self.bind_legacy_pair(map, &rx_snapshot, &tx_snapshot);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(ctx) = state.rx.get_mut(rx.id, rx.generation) {
            ctx.binding = false;
        }
        if let Some(ctx) = state.tx.get_mut(tx.id, tx.generation) {
            ctx.binding = false;
        }
        // the firmware holds the ring context's address from here on
        state.legacy_ring_context = Some(result?);

        let (rx_ctx, tx_ctx) = match (state.rx.get_mut(rx.id, rx.generation), state.tx.get_mut(tx.id, tx.generation)) {
            (Some(rx_ctx), Some(tx_ctx)) => (rx_ctx, tx_ctx),
            _ => {
                error!("netxen: legacy context pair vanished while it was being created");
                return Err(NxError::InvalidArguments);
            }
        };
        let pci_func = self.config.pci_func;
        for (ring, crb) in rx_ctx.rds_rings.iter_mut().zip(&map.rds_producers) {
            ring.producer_crb = *crb;
        }
        for (i, ring) in rx_ctx.sds_rings.iter_mut().enumerate() {
            ring.consumer_crb = map.sds_consumers[i];
            ring.interrupt_crb = map.sds_interrupts[i];
        }
        rx_ctx.state = HostCtxState::Active;
        rx_ctx.context_id = pci_func as u16;

        tx_ctx.cds_ring.producer_crb = map.cmd_producer;
        tx_ctx.state = HostCtxState::Active;
        tx_ctx.context_id = pci_func as u16;

        if state.default_rx.is_none() {
            state.default_rx = Some(rx);
        }
        if state.default_tx.is_none() {
            state.default_tx = Some(tx);
        }
        debug!("netxen: legacy ring context created for function {}", pci_func);
        Ok(())
    }

    fn bind_legacy_pair(&self, map: &LegacyCrbMap, rx: &RxContext, tx: &TxContext) -> Result<DmaBuffer, NxError> {
        if rx.sds_rings.len() > map.sds_consumers.len() {
            return Err(NxError::InvalidArguments);
        }
        let mut ring_context = DmaBuffer::new(&self.dma, LEGACY_CONTEXT_LEN, DmaFlags::MAY_SLEEP | DmaFlags::COHERENT)?;

        let rcv: Vec<LegacyRing> = rx.rds_rings.iter()
            .map(|r| LegacyRing { host_phys_addr: r.host_phys_addr, ring_size: r.ring_size })
            .collect();
        let sts: Vec<LegacyStatusRing> = rx.sds_rings.iter()
            .map(|r| LegacyStatusRing { host_phys_addr: r.host_phys_addr, ring_size: r.ring_size, msi_index: r.msi_index as u32 })
            .collect();
        LegacyContextRequest {
            cmd_cons_dma_addr: tx.options.cmd_cons_dma_addr,
            cmd_ring: LegacyRing { host_phys_addr: tx.cds_ring.host_phys_addr, ring_size: tx.cds_ring.ring_size },
            rcv_rings: &rcv,
            sts_rings: &sts,
        }.encode(ring_context.as_slice_mut())?;

        self.channel.issue_legacy_command(map, self.config.pci_func, ring_context.phys_addr())?;
        Ok(ring_context)
    }

    /// Unbinds an rx context from the firmware. The default rx context pointer is cleared
    /// if it named this context, whatever the outcome of the firmware command.
    pub fn destroy_rx_context(&self, handle: RxContextHandle, mode: DestroyMode) -> Result<(), NxError> {
        let context_id = {
            let mut state = self.state.lock();
            let ctx = state.rx.get_mut(handle.id, handle.generation).ok_or(NxError::InvalidArguments)?;
            if ctx.binding || ctx.state == HostCtxState::Freed
                || (ctx.state == HostCtxState::Allocated && mode != DestroyMode::SkipFirmware)
            {
                error!("netxen: rx context {} cannot be destroyed in state {:?}", handle.id, ctx.state);
                return Err(NxError::InvalidState);
            }
            ctx.binding = true;
            ctx.context_id
        };

        let result = match (mode.command(), &self.config.protocol) {
            (None, _) => Ok(()),
            (Some(cmd), ProtocolVersion::Cdrp) => self
                .issue(CdrpOpcode::DestroyRxCtx, [context_id as u32, cmd as u32, 0])
                .map(|_| ()),
            (Some(_), ProtocolVersion::Legacy(map)) => self.channel.issue_legacy_reset(map, self.config.pci_func),
        };

        let mut state = self.state.lock();
        if state.default_rx == Some(handle) {
            state.default_rx = None;
        }
        if result.is_ok() {
            // v3.4 firmware has let go of the pair's ring context
            if let ProtocolVersion::Legacy(_) = self.config.protocol {
                state.legacy_ring_context = None;
            }
        }
        let ctx = state.rx.get_mut(handle.id, handle.generation).ok_or(NxError::InvalidArguments)?;
        ctx.binding = false;
        result?;
        ctx.state = HostCtxState::Freed;
        debug!("netxen: rx context {} destroyed ({:?})", handle.id, mode);
        Ok(())
    }

    /// Unbinds a tx context from the firmware.
    /// v3.4 firmware drops the tx half together with the rx context, so only the host side is updated.
    pub fn destroy_tx_context(&self, handle: TxContextHandle, mode: DestroyMode) -> Result<(), NxError> {
        let context_id = {
            let mut state = self.state.lock();
            let ctx = state.tx.get_mut(handle.id, handle.generation).ok_or(NxError::InvalidArguments)?;
            if ctx.binding || ctx.state == HostCtxState::Freed
                || (ctx.state == HostCtxState::Allocated && mode != DestroyMode::SkipFirmware)
            {
                error!("netxen: tx context {} cannot be destroyed in state {:?}", handle.id, ctx.state);
                return Err(NxError::InvalidState);
            }
            ctx.binding = true;
            ctx.context_id
        };

        let result = match (mode.command(), &self.config.protocol) {
            (Some(cmd), ProtocolVersion::Cdrp) => self
                .issue(CdrpOpcode::DestroyTxCtx, [context_id as u32, cmd as u32, 0])
                .map(|_| ()),
            _ => Ok(()),
        };

        let mut state = self.state.lock();
        if state.default_tx == Some(handle) {
            state.default_tx = None;
        }
        let ctx = state.tx.get_mut(handle.id, handle.generation).ok_or(NxError::InvalidArguments)?;
        ctx.binding = false;
        result?;
        ctx.state = HostCtxState::Freed;
        debug!("netxen: tx context {} destroyed ({:?})", handle.id, mode);
        Ok(())
    }

    /// Releases the table id of an rx context that is not bound to the firmware.
    /// A handle that no longer names its slot is rejected as a failed command.
    pub fn free_rx_context(&self, handle: RxContextHandle) -> Result<(), NxError> {
        let mut state = self.state.lock();
        let ctx = state.rx.get(handle.id, handle.generation).ok_or_else(|| {
            error!("netxen: rx context {} does not match its table slot", handle.id);
            NxError::command_failed()
        })?;
        if ctx.binding || !matches!(ctx.state, HostCtxState::Allocated | HostCtxState::Freed) {
            return Err(NxError::InvalidState);
        }
        state.rx.remove(handle.id, handle.generation);
        if state.default_rx == Some(handle) {
            state.default_rx = None;
        }
        debug!("netxen: rx context {} freed, {} active", handle.id, state.rx.count());
        Ok(())
    }

    pub fn free_tx_context(&self, handle: TxContextHandle) -> Result<(), NxError> {
        let mut state = self.state.lock();
        let ctx = state.tx.get(handle.id, handle.generation).ok_or_else(|| {
            error!("netxen: tx context {} does not match its table slot", handle.id);
            NxError::command_failed()
        })?;
        if ctx.binding || !matches!(ctx.state, HostCtxState::Allocated | HostCtxState::Freed) {
            return Err(NxError::InvalidState);
        }
        state.tx.remove(handle.id, handle.generation);
        if state.default_tx == Some(handle) {
            state.default_tx = None;
        }
        debug!("netxen: tx context {} freed, {} active", handle.id, state.tx.count());
        Ok(())
    }
}
