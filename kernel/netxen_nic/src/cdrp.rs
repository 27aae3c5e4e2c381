//! The command descriptor/response protocol (CDRP): a synchronous request/response exchange
//! with the NIC firmware through a handful of control registers.
//!
//! A command is issued by writing a signature, three arguments and finally the opcode into the
//! CDRP register, all while holding a hardware semaphore that the firmware shares with every
//! PCI function on the adapter. The firmware answers by clearing the command flag in the CDRP
//! register and leaving its results in the argument registers.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use netxen_ethernet::command::{
    self, CdrpOpcode, CdrpResponse, LEGACY_CONTEXT_RESET, LEGACY_CONTEXT_SIGNATURE,
};
use crate::config::ChannelConfig;
use crate::error::NxError;
use crate::platform::Delay;
use crate::regs::{CrbAccess, CrbLayout, LegacyCrbMap};

/// Value the firmware reset register holds once a reset has been requested.
const FW_RESET_REQUESTED: u32 = 1;

/// The device-wide command/response channel.
pub struct CommandChannel {
    crb: Arc<dyn CrbAccess>,
    layout: CrbLayout,
    delay: Arc<dyn Delay>,
    config: ChannelConfig,
    /// Set once the firmware stopped answering; every later command fails fast.
    fw_dead: AtomicBool,
}

/// Holds the hardware semaphore and releases it when dropped.
struct SemaphoreGuard<'c> {
    channel: &'c CommandChannel,
}

impl<'c> Drop for SemaphoreGuard<'c> {
    fn drop(&mut self) {
        // reading the unlock register releases the semaphore
        let _ = self.channel.crb.read32(self.channel.layout.sem_unlock);
    }
}

impl CommandChannel {
    pub fn new(crb: Arc<dyn CrbAccess>, layout: CrbLayout, delay: Arc<dyn Delay>, config: ChannelConfig) -> CommandChannel {
        CommandChannel {
            crb,
            layout,
            delay,
            config,
            fw_dead: AtomicBool::new(false),
        }
    }

    /// Returns true once a command timed out and the firmware is considered dead.
    pub fn is_dead(&self) -> bool {
        self.fw_dead.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        if !self.fw_dead.swap(true, Ordering::AcqRel) {
            error!("netxen: firmware is not responding, marking the device dead");
        }
    }

    /// Spins on the hardware semaphore with a delay and a yield between attempts.
    fn lock(&self) -> Result<SemaphoreGuard<'_>, NxError> {
        let mut attempts = 0;
        loop {
            if self.crb.read32(self.layout.sem_lock) == 1 {
                return Ok(SemaphoreGuard { channel: self });
            }
            if attempts >= self.config.retry_count {
                error!("netxen: timed out acquiring the CDRP semaphore after {} attempts", attempts);
                self.mark_dead();
                return Err(NxError::LockTimeout);
            }
            attempts += 1;
            self.delay.udelay(self.config.udelay_us);
            self.delay.yield_now();
        }
    }

    /// Polls the CDRP register until the firmware responds.
    /// Returns `None` if the retry budget runs out, or if the heartbeat counter
    /// has not moved by the time half of the budget is used up.
    fn poll_response(&self) -> Option<u32> {
        let initial_heartbeat = self.crb.read32(self.layout.heartbeat);
        let mut polls = 0;
        loop {
            self.delay.udelay(self.config.udelay_us);
            self.delay.yield_now();
            let word = self.crb.read32(self.layout.cdrp);
            polls += 1;

            if command::is_response(word) {
                return Some(word);
            }
            if polls > self.config.retry_count / 2
                && self.crb.read32(self.layout.heartbeat) == initial_heartbeat
            {
                error!("netxen: firmware heartbeat stalled at {:#x} after {} polls", initial_heartbeat, polls);
                return None;
            }
            if polls > self.config.retry_count {
                return None;
            }
        }
    }

    /// Issues one CDRP command and returns the three output arguments.
    pub fn issue_command(
        &self,
        pci_func: u8,
        version: u8,
        args: [u32; 3],
        opcode: CdrpOpcode,
    ) -> Result<[u32; 3], NxError> {
        if self.is_dead() {
            debug!("netxen: {:?} not issued, firmware is dead", opcode);
            return Err(NxError::Timeout);
        }

        let reset_pending = {
            let _sem = self.lock()?;
            self.crb.read32(self.layout.fw_reset)
        };
        if reset_pending != 0 {
            warn!("netxen: {:?} not issued, firmware reset pending ({:#x})", opcode, reset_pending);
            return Err(NxError::Timeout);
        }

        let _sem = self.lock()?;
        trace!("netxen: issuing {:?} args {:x?}", opcode, args);
        self.crb.write32(self.layout.signature, command::command_signature(pci_func, version));
        self.crb.write32(self.layout.arg1, args[0]);
        self.crb.write32(self.layout.arg2, args[1]);
        self.crb.write32(self.layout.arg3, args[2]);
        self.crb.write32(self.layout.cdrp, command::command_word(opcode));

        let response = self.poll_response().map(CdrpResponse::try_from);
        match response {
            Some(Ok(CdrpResponse::Ok)) => Ok([
                self.crb.read32(self.layout.arg1),
                self.crb.read32(self.layout.arg2),
                self.crb.read32(self.layout.arg3),
            ]),
            Some(Ok(CdrpResponse::Fail)) => {
                let reason = self.crb.read32(self.layout.arg1);
                error!("netxen: firmware failed {:?}, reason {:#x}", opcode, reason);
                Err(NxError::CommandFailed(reason))
            }
            Some(Ok(CdrpResponse::Timeout)) | None => {
                error!("netxen: timeout waiting for {:?}, no card response", opcode);
                self.mark_dead();
                if self.crb.read32(self.layout.fw_reset) != FW_RESET_REQUESTED {
                    self.crb.write32(self.layout.fw_reset, FW_RESET_REQUESTED);
                }
                Err(NxError::Timeout)
            }
            Some(Err(_)) => {
                error!("netxen: unknown CDRP response to {:?}", opcode);
                Err(NxError::MalformedResponse)
            }
        }
    }

    /// Hands a legacy ring context to v3.4 firmware. That firmware has no response register,
    /// so nothing is polled.
    pub fn issue_legacy_command(&self, map: &LegacyCrbMap, pci_func: u8, ring_context_phys: u64) -> Result<(), NxError> {
        let _sem = self.lock()?;
        self.crb.write32(map.ctx_signature, LEGACY_CONTEXT_SIGNATURE | pci_func as u32);
        self.crb.write32(map.ctx_addr_hi, (ring_context_phys >> 32) as u32);
        self.crb.write32(map.ctx_addr_lo, ring_context_phys as u32);
        Ok(())
    }

    /// Tells v3.4 firmware to forget the ring context of `pci_func`.
    pub fn issue_legacy_reset(&self, map: &LegacyCrbMap, pci_func: u8) -> Result<(), NxError> {
        let _sem = self.lock()?;
        self.crb.write32(map.ctx_signature, LEGACY_CONTEXT_RESET | pci_func as u32);
        Ok(())
    }
}
