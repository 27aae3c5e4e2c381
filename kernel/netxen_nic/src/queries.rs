//! Firmware limit queries and port settings, each a single CDRP command.

use alloc::sync::Arc;
use netxen_ethernet::command::CdrpOpcode;
use netxen_ethernet::context::FunctionAttributes;
use crate::context::RxContextHandle;
use crate::device::NicDevice;
use crate::dma::{DmaBuffer, DmaFlags};
use crate::error::NxError;
use crate::pexq::SubmissionQueue;
use crate::regs::DoorbellPort;

/// Direction of a flow control setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    Rx = 0,
    Tx = 1,
}

/// Geometry of the firmware side of the doorbell submission queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PexqParameters {
    /// Length of the firmware's queue, in bytes.
    pub queue_length: u32,
    /// Number of flow-control words in the card's array.
    pub card_fc_size: u32,
}

/// Firmware-supplied resources the submission queue needs besides host memory.
pub struct PexqHardware {
    /// Header word of the firmware's DMA engine queue, used for "report completion" messages.
    pub xdma_hdr: u64,
    /// Card address of the flow-control array holding each slot's consumer index.
    pub card_fc_array: u64,
    pub doorbell: Arc<dyn DoorbellPort>,
}

impl NicDevice {
    fn query(&self, opcode: CdrpOpcode, args: [u32; 3]) -> Result<u32, NxError> {
        self.issue(opcode, args).map(|out| out[0])
    }

    /// Exchanges capability words with the firmware and returns the ones it accepted.
    pub fn submit_capabilities(&self, capabilities: [u32; 3]) -> Result<[u32; 3], NxError> {
        self.issue(CdrpOpcode::SubmitCapabilities, capabilities)
    }

    pub fn read_phy(&self, reg: u32) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadPhy, [reg, 0, 0])
    }

    pub fn write_phy(&self, reg: u32, value: u32) -> Result<(), NxError> {
        self.issue(CdrpOpcode::WritePhy, [reg, value, 0]).map(|_| ())
    }

    /// Reads a hardware register of the given unit through the firmware.
    pub fn read_hw_reg(&self, reg: u32, offset_unit: u32) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadHwReg, [reg, offset_unit, 0])
    }

    pub fn flow_control(&self, direction: FlowDirection) -> Result<u32, NxError> {
        self.query(CdrpOpcode::GetFlowCtl, [direction as u32, 0, 0])
    }

    pub fn set_flow_control(&self, direction: FlowDirection, value: u32) -> Result<(), NxError> {
        self.issue(CdrpOpcode::SetFlowCtl, [direction as u32, value, 0]).map(|_| ())
    }

    pub fn max_rds_per_context(&self) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadMaxRdsPerCtx, [0; 3])
    }

    pub fn max_sds_per_context(&self) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadMaxSdsPerCtx, [0; 3])
    }

    pub fn max_rules_per_context(&self) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadMaxRulesPerCtx, [0; 3])
    }

    pub fn max_rx_contexts(&self) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadMaxRxCtx, [0; 3])
    }

    pub fn max_tx_contexts(&self) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadMaxTxCtx, [0; 3])
    }

    pub fn max_mtu(&self) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadMaxMtu, [0; 3])
    }

    pub fn max_lro(&self) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadMaxLro, [0; 3])
    }

    pub fn max_lro_per_board(&self) -> Result<u32, NxError> {
        self.query(CdrpOpcode::ReadMaxLroPerBoard, [0; 3])
    }

    /// Configures speed, duplex and autonegotiation of a GbE port.
    pub fn configure_gbe_port(&self, speed: u32, duplex: u32, autoneg: u32) -> Result<(), NxError> {
        self.issue(CdrpOpcode::ConfigGbePort, [speed, duplex, autoneg]).map(|_| ())
    }

    /// Sets the MTU of a created rx context.
    pub fn set_mtu(&self, rx: RxContextHandle, mtu: u32) -> Result<(), NxError> {
        let context_id = self.rx_context(rx).ok_or(NxError::InvalidArguments)?.context_id;
        self.issue(CdrpOpcode::SetMtu, [context_id as u32, mtu, 0]).map(|_| ())
    }

    /// Reads the function attributes, which the firmware writes into a temporary DMA buffer.
    pub fn function_attributes(&self) -> Result<FunctionAttributes, NxError> {
        let response = DmaBuffer::new(&self.dma, FunctionAttributes::ENCODED_LEN, DmaFlags::MAY_SLEEP)?;
        let taddr = response.phys_addr();
        self.issue(CdrpOpcode::FuncAttrib, [(taddr >> 32) as u32, taddr as u32, 0])?;
        Ok(FunctionAttributes::decode(response.as_slice())?)
    }

    pub fn pexq_parameters(&self) -> Result<PexqParameters, NxError> {
        let out = self.issue(CdrpOpcode::ReadPexqParameters, [0; 3])?;
        Ok(PexqParameters { queue_length: out[0], card_fc_size: out[1] })
    }

    /// Sets up the doorbell submission queue of this function.
    ///
    /// The firmware's queue must be able to hold `max_pending` messages and its
    /// flow-control array must cover every slot of the host ring.
    pub fn init_submission_queue(&self, hardware: PexqHardware) -> Result<&SubmissionQueue, NxError> {
        if self.queue.is_completed() {
            return Err(NxError::InvalidState);
        }
        self.queue.try_call_once(|| {
            let params = self.pexq_parameters()?;
            let queue_cfg = self.config.queue;
            if params.card_fc_size < queue_cfg.slots as u32
                || params.queue_length / 8 < queue_cfg.max_pending as u32
            {
                error!("netxen: firmware queue too small ({:?}) for {} slots and {} pending messages",
                    params, queue_cfg.slots, queue_cfg.max_pending);
                return Err(NxError::NoHostMemory);
            }
            let queue = SubmissionQueue::new(&self.dma, queue_cfg, self.config.pci_func, hardware)?;
            debug!("netxen: submission queue ready, {} slots", queue_cfg.slots);
            Ok(queue)
        })
    }
}
