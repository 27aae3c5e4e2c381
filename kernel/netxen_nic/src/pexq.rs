//! The PEXQ doorbell submission queue.
//!
//! Control messages are written into a power-of-two ring of 64-byte slots in host memory.
//! A doorbell write tells the firmware to pull a contiguous run of slots. The firmware never
//! reports progress on its own: every `completion_threshold` slots the queue injects a
//! "report completion" message that makes the firmware's DMA engine copy its consumer index
//! into a completion word in host memory, from which the host reclaims slots.
//!
//! Slot accounting uses four cursors and two counters:
//! * `new_idx`: the next slot to be written.
//! * `needs_doorbell_idx`: the first slot written but not yet announced by a doorbell.
//! * `pending_compl_idx`: the consumer index the firmware last reported.
//! * `free_cnt` and `pending_cnt`: slots available for writing and slots the firmware
//!   has been handed but not yet reported done. Their sum never exceeds the ring size.

use alloc::sync::Arc;
use alloc::vec::Vec;
use netxen_ethernet::message::{self, DoorbellWord, QueueMessage, MESSAGE_SIZE};
use spin::Mutex;
use zerocopy::{AsBytes, FromBytes};
use crate::config::QueueConfig;
use crate::dma::{DmaAllocator, DmaBuffer, DmaFlags};
use crate::error::NxError;
use crate::queries::PexqHardware;
use crate::regs::DoorbellPort;

/// A contiguous run of slots announced by one doorbell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    start: u16,
    len: u32,
}

/// The cursors and counters of a submission queue at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounters {
    pub new_idx: u16,
    pub needs_doorbell_idx: u16,
    pub pending_compl_idx: u16,
    pub free_cnt: u16,
    pub pending_cnt: u16,
}

struct RingState {
    ring: DmaBuffer,
    new_idx: u16,
    needs_doorbell_idx: u16,
    pending_compl_idx: u16,
    free_cnt: u16,
    pending_cnt: u16,
}

/// The doorbell submission queue of one PCI function.
pub struct SubmissionQueue {
    config: QueueConfig,
    pci_func: u8,
    xdma_hdr: u64,
    card_fc_array: u64,
    doorbell: Arc<dyn DoorbellPort>,
    /// The word the firmware DMAs its consumer index into.
    completion: DmaBuffer,
    ring_phys: u64,
    state: Mutex<RingState>,
}

impl SubmissionQueue {
    pub(crate) fn new(
        allocator: &Arc<dyn DmaAllocator>,
        config: QueueConfig,
        pci_func: u8,
        hardware: PexqHardware,
    ) -> Result<SubmissionQueue, NxError> {
        config.validate()?;
        let ring = DmaBuffer::new(allocator, config.ring_bytes(), DmaFlags::COHERENT)?;
        let completion = DmaBuffer::new(allocator, core::mem::size_of::<u64>(), DmaFlags::COHERENT)?;
        let ring_phys = ring.phys_addr();
        Ok(SubmissionQueue {
            config,
            pci_func,
            xdma_hdr: hardware.xdma_hdr,
            card_fc_array: hardware.card_fc_array,
            doorbell: hardware.doorbell,
            completion,
            ring_phys,
            state: Mutex::new(RingState {
                ring,
                new_idx: 0,
                needs_doorbell_idx: 0,
                pending_compl_idx: 0,
                free_cnt: config.slots,
                pending_cnt: 0,
            }),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Physical address of slot 0.
    pub fn ring_phys_addr(&self) -> u64 {
        self.ring_phys
    }

    /// Physical address of the completion word.
    pub fn completion_phys_addr(&self) -> u64 {
        self.completion.phys_addr()
    }

    pub fn counters(&self) -> QueueCounters {
        let state = self.state.lock();
        QueueCounters {
            new_idx: state.new_idx,
            needs_doorbell_idx: state.needs_doorbell_idx,
            pending_compl_idx: state.pending_compl_idx,
            free_cnt: state.free_cnt,
            pending_cnt: state.pending_cnt,
        }
    }

    /// Returns a copy of the message stored in `slot`.
    pub fn slot_message(&self, slot: u16) -> Option<QueueMessage> {
        if slot >= self.config.slots {
            return None;
        }
        let state = self.state.lock();
        let offset = slot as usize * MESSAGE_SIZE;
        QueueMessage::read_from(&state.ring.as_slice()[offset..offset + MESSAGE_SIZE])
    }

    fn next(&self, idx: u16) -> u16 {
        idx.wrapping_add(1) & (self.config.slots - 1)
    }

    /// Reclaims the slots the firmware reported done since the last call.
    /// Returns how many slots were reclaimed, or `NotReady` if the firmware made no progress.
    pub fn reconcile(&self) -> Result<u16, NxError> {
        let mut state = self.state.lock();
        self.reconcile_locked(&mut state)
    }

    fn reconcile_locked(&self, state: &mut RingState) -> Result<u16, NxError> {
        let compl_in = self.completion.read_volatile_u64(0).unwrap_or(0) as u16;
        if compl_in == state.pending_compl_idx {
            return Err(NxError::NotReady);
        }
        if compl_in >= self.config.slots {
            warn!("pexq: completion index {} is outside the {}-slot ring, ignored", compl_in, self.config.slots);
            return Err(NxError::NotReady);
        }

        let mut count = if compl_in < state.pending_compl_idx {
            compl_in + self.config.slots - state.pending_compl_idx
        } else {
            compl_in - state.pending_compl_idx
        };
        if count > state.pending_cnt {
            warn!("pexq: firmware completed {} slots but only {} were pending", count, state.pending_cnt);
            count = state.pending_cnt;
        }

        state.pending_compl_idx = compl_in;
        state.pending_cnt -= count;
        state.free_cnt += count;
        trace!("pexq: reclaimed {} slots up to {}, free {} pending {}",
            count, compl_in, state.free_cnt, state.pending_cnt);
        Ok(count)
    }

    fn write_slot(&self, ring: &mut DmaBuffer, slot: u16, msg: &QueueMessage) {
        let offset = slot as usize * MESSAGE_SIZE;
        ring.as_slice_mut()[offset..offset + MESSAGE_SIZE].copy_from_slice(msg.as_bytes());
    }

    fn completion_report(&self, slot: u16) -> QueueMessage {
        QueueMessage::new(
            self.xdma_hdr,
            message::completion_report_body(
                slot,
                self.config.slots,
                self.pci_func as u16,
                self.card_fc_array,
                self.completion.phys_addr(),
            ),
        )
    }

    /// Enqueues `messages` in order and rings the doorbells that announce them.
    ///
    /// Fails with `NoHostResource` if the ring runs out of free slots, if the batch would
    /// push the pending count to its ceiling, or if it needs more than `max_doorbells` runs.
    /// In that case nothing is committed and nothing is rung; the caller may retry later.
    /// Fails with `NotReady` if the pending count is already at its ceiling and the firmware
    /// has not completed anything since the last call.
    ///
    /// A `Timeout` means the messages were committed but a doorbell write was never
    /// acknowledged within the configured retry limit. The unannounced slots are rung again
    /// before the next batch is written.
    pub fn submit(&self, messages: &[QueueMessage]) -> Result<(), NxError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut guard = self.state.lock();
        let state = &mut *guard;

        self.ring_outstanding(state)?;

        if let Err(NxError::NotReady) = self.reconcile_locked(state) {
            if state.pending_cnt >= self.config.max_pending {
                debug!("pexq: {} slots pending and no completions, not ready", state.pending_cnt);
                return Err(NxError::NotReady);
            }
        }

        let threshold_mask = self.config.completion_threshold - 1;
        let mut idx = state.new_idx;
        let mut free = state.free_cnt;
        let mut pending = state.pending_cnt;
        let mut runs: Vec<Run> = Vec::with_capacity(self.config.max_doorbells);
        let mut run = Run { start: idx, len: 0 };
        let mut input = messages.iter().peekable();

        while let Some(&msg) = input.peek() {
            if free == 0 {
                debug!("pexq: no free slots for {} remaining messages", input.len());
                return Err(NxError::NoHostResource);
            }
            free -= 1;
            if free & threshold_mask == 0 {
                let report = self.completion_report(idx);
                self.write_slot(&mut state.ring, idx, &report);
                trace!("pexq: completion report in slot {}", idx);
            } else {
                self.write_slot(&mut state.ring, idx, msg);
                input.next();
            }
            run.len += 1;
            pending += 1;

            let next_idx = self.next(idx);
            if next_idx < idx || run.len == self.config.max_run {
                self.close_run(&mut runs, run, pending)?;
                run = Run { start: next_idx, len: 0 };
            }
            idx = next_idx;
        }
        if run.len > 0 {
            self.close_run(&mut runs, run, pending)?;
        }

        state.new_idx = idx;
        state.free_cnt = free;
        state.pending_cnt = pending;
        trace!("pexq: {} messages in {} runs, new {} free {} pending {}",
            messages.len(), runs.len(), idx, free, pending);

        for run in runs {
            self.ring_run(state, run)?;
        }
        Ok(())
    }

    fn close_run(&self, runs: &mut Vec<Run>, run: Run, pending: u16) -> Result<(), NxError> {
        if pending >= self.config.max_pending {
            debug!("pexq: pending count {} reached its ceiling", pending);
            return Err(NxError::NoHostResource);
        }
        if runs.len() == self.config.max_doorbells {
            debug!("pexq: batch needs more than {} doorbells", self.config.max_doorbells);
            return Err(NxError::NoHostResource);
        }
        runs.push(run);
        Ok(())
    }

    /// Rings doorbells for any slots that were committed but never acknowledged.
    fn ring_outstanding(&self, state: &mut RingState) -> Result<(), NxError> {
        while state.needs_doorbell_idx != state.new_idx {
            let start = state.needs_doorbell_idx;
            let to_new = if state.new_idx > start {
                (state.new_idx - start) as u32
            } else {
                (self.config.slots - start) as u32
            };
            let len = to_new.min(self.config.max_run);
            warn!("pexq: re-ringing {} unannounced slots from {}", len, start);
            self.ring_run(state, Run { start, len })?;
        }
        Ok(())
    }

    fn ring_run(&self, state: &mut RingState, run: Run) -> Result<(), NxError> {
        let addr = self.ring_phys + run.start as u64 * MESSAGE_SIZE as u64;
        let word = DoorbellWord::for_host_messages(addr, run.len);
        self.ring_doorbell(word)?;
        state.needs_doorbell_idx = ((run.start as u32 + run.len) & (self.config.slots as u32 - 1)) as u16;
        Ok(())
    }

    /// Writes a doorbell word until the reflection register reads it back.
    /// A posted write can be dropped on the way to the card, so the write is repeated
    /// for as long as the reflection differs, bounded only if a retry limit is configured.
    fn ring_doorbell(&self, word: DoorbellWord) -> Result<(), NxError> {
        let value = word.value();
        let mut retries = 0u32;
        loop {
            self.doorbell.ring(value);
            let reflection = self.doorbell.reflection();
            if reflection == value {
                return Ok(());
            }
            warn!("pexq: wrote doorbell {:#x}, read back {:#x}", value, reflection);
            if let Some(limit) = self.config.doorbell_retry_limit {
                if retries >= limit {
                    error!("pexq: doorbell {:#x} not acknowledged after {} retries", value, retries);
                    return Err(NxError::Timeout);
                }
            }
            retries += 1;
        }
    }
}
