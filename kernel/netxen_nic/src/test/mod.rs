//! Unit tests that drive a [`NicDevice`] against the software hardware models in
//! `test_support`.

extern crate std;

use self::std::sync::Mutex;
use self::std::vec::Vec;

use alloc::sync::Arc;
use netxen_ethernet::command::{CdrpOpcode, HostCtxState, RdsRingKind};
use netxen_ethernet::context::{
    RxContextRequestHeader, RxContextResponse, SdsRingResponse, TxContextRequest, TxContextResponse,
};
use crate::config::{ChannelConfig, DeviceConfig};
use crate::context::{CdsRing, RdsRing, RxContextOptions, SdsRing, TxContextOptions};
use crate::device::NicDevice;
use crate::test_support::*;
use crate::{RxContextHandle, TxContextHandle};

mod cdrp;
mod pexq;

pub const PCI_FUNC: u8 = 2;
/// Firmware context ids handed out by [`ContextFirmware`] start here.
pub const FIRST_CONTEXT_ID: u16 = 0x10;
pub const PEXQ_QUEUE_LENGTH: u32 = 8192;
pub const PEXQ_CARD_FC_SIZE: u32 = 1024;

pub struct Harness {
    pub crb: Arc<FakeCrb>,
    pub dma: Arc<FakeDma>,
    pub clock: Arc<FakeClock>,
    pub device: Arc<NicDevice>,
}

/// A config with a short polling budget, so timeouts cost few iterations.
pub fn test_config() -> DeviceConfig {
    let mut config = DeviceConfig::new(PCI_FUNC);
    config.channel = ChannelConfig { udelay_us: 10, retry_count: 20 };
    config
}

pub fn harness(config: DeviceConfig) -> Harness {
    let crb = FakeCrb::new();
    let dma = FakeDma::new();
    let clock = FakeClock::new();
    let device = NicDevice::new(config, crb.clone(), LAYOUT, dma.clone(), clock.clone())
        .map(Arc::new)
        .expect("test config is valid");
    Harness { crb, dma, clock, device }
}

/// Commands seen by [`ContextFirmware`], with the decoded context requests.
#[derive(Default)]
pub struct FirmwareLog {
    pub rx_requests: Vec<RxContextRequestHeader>,
    pub tx_requests: Vec<TxContextRequest>,
}

/// A firmware model that creates contexts, answers the PEXQ parameter query,
/// and accepts everything else.
pub struct ContextFirmware {
    dma: Arc<FakeDma>,
    next_context_id: u16,
    pub log: Arc<Mutex<FirmwareLog>>,
    /// Opcodes that fail with the given reason instead.
    pub failures: Vec<(CdrpOpcode, u32)>,
}

impl ContextFirmware {
    pub fn install(h: &Harness) -> Arc<Mutex<FirmwareLog>> {
        Self::install_with_failures(h, Vec::new())
    }

    pub fn install_with_failures(h: &Harness, failures: Vec<(CdrpOpcode, u32)>) -> Arc<Mutex<FirmwareLog>> {
        let log = Arc::new(Mutex::new(FirmwareLog::default()));
        let mut fw = ContextFirmware {
            dma: h.dma.clone(),
            next_context_id: FIRST_CONTEXT_ID,
            log: log.clone(),
            failures,
        };
        h.crb.set_firmware(move |cmd| fw.handle(cmd));
        log
    }

    fn handle(&mut self, cmd: &FwCommand) -> FwReply {
        if let Some((_, reason)) = self.failures.iter().find(|(op, _)| *op == cmd.opcode) {
            return FwReply::Fail(*reason);
        }
        let phys = (cmd.args[0] as u64) << 32 | cmd.args[1] as u64;
        match cmd.opcode {
            CdrpOpcode::CreateRxCtx => {
                let request = self.dma.read(phys, cmd.args[2] as usize);
                let header = RxContextRequestHeader::decode(&request).unwrap();
                let nrds = header.num_rds_rings as usize;
                let nsds = header.num_sds_rings as usize;
                let rsp = RxContextResponse {
                    host_ctx_state: HostCtxState::Active as u32,
                    num_fn_per_port: 4,
                    context_id: self.next_context_id,
                    phys_port: 1,
                    virt_port: 3,
                    rds_producer_crbs: (0..nrds as u32).map(|i| 0x5000 + i * 4).collect(),
                    sds_rings: (0..nsds as u32)
                        .map(|i| SdsRingResponse { host_consumer_crb: 0x6000 + i * 8, interrupt_crb: 0x6004 + i * 8 })
                        .collect(),
                };
                let mut buf = vec![0u8; RxContextResponse::encoded_len(nrds, nsds)];
                rsp.encode(&mut buf).unwrap();
                self.dma.write(header.host_rsp_dma_addr, &buf);
                self.next_context_id += 1;
                self.log.lock().unwrap().rx_requests.push(header);
                FwReply::Ok([0; 3])
            }
            CdrpOpcode::CreateTxCtx => {
                let request = TxContextRequest::decode(&self.dma.read(phys, cmd.args[2] as usize)).unwrap();
                let rsp = TxContextResponse {
                    host_ctx_state: HostCtxState::Active as u32,
                    context_id: self.next_context_id,
                    phys_port: 1,
                    virt_port: 3,
                    host_producer_crb: 0x7000,
                    interrupt_crb: 0x7004,
                };
                let mut buf = [0u8; TxContextResponse::ENCODED_LEN];
                rsp.encode(&mut buf).unwrap();
                self.dma.write(request.host_rsp_dma_addr, &buf);
                self.next_context_id += 1;
                self.log.lock().unwrap().tx_requests.push(request);
                FwReply::Ok([0; 3])
            }
            CdrpOpcode::ReadPexqParameters => FwReply::Ok([PEXQ_QUEUE_LENGTH, PEXQ_CARD_FC_SIZE, 0]),
            _ => FwReply::Ok([0; 3]),
        }
    }
}

pub fn two_rds_one_sds() -> (Vec<RdsRing>, Vec<SdsRing>) {
    (
        vec![
            RdsRing::new(0x8000_0000, 1024, RdsRingKind::Normal, 1536),
            RdsRing::new(0x8010_0000, 256, RdsRingKind::Jumbo, 9000),
        ],
        vec![SdsRing::new(0x8020_0000, 2048, 0)],
    )
}

pub fn cds_ring() -> CdsRing {
    CdsRing::new(0x8030_0000, 512)
}

/// Allocates and creates one rx and one tx context.
pub fn active_pair(h: &Harness) -> (RxContextHandle, TxContextHandle) {
    let (rds, sds) = two_rds_one_sds();
    let rx = h.device.alloc_rx_context(rds, sds, RxContextOptions::default()).unwrap();
    let tx = h.device.alloc_tx_context(cds_ring(), TxContextOptions::default()).unwrap();
    h.device.create_context_pair(rx, tx).unwrap();
    (rx, tx)
}
