//! The per-function device object that owns every piece of mutable NIC state.

use alloc::sync::Arc;
use alloc::vec::Vec;
use bit_field::BitField;
use netxen_ethernet::command::{CdrpOpcode, HOST_INTERFACE_VERSION};
use spin::{Mutex, Once};
use crate::cdrp::CommandChannel;
use crate::config::DeviceConfig;
use crate::context::{RxContext, RxContextHandle, TxContext, TxContextHandle};
use crate::dma::{DmaAllocator, DmaBuffer};
use crate::error::NxError;
use crate::pexq::SubmissionQueue;
use crate::platform::Delay;
use crate::regs::{CrbAccess, CrbLayout};
use crate::request::RequestTracker;

/// A fixed-capacity table of contexts indexed by a small id.
///
/// An id stays the same for the lifetime of the context stored under it.
/// Each slot also counts how many times it has been filled,
/// so a handle to a context that was freed cannot reach its successor.
pub(crate) struct ContextTable<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    occupied: u64,
}

impl<T> ContextTable<T> {
    pub(crate) fn new(capacity: usize) -> ContextTable<T> {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        ContextTable {
            slots,
            generations: alloc::vec![0; capacity],
            occupied: 0,
        }
    }

    /// Returns the lowest id that is neither occupied nor set in `reserved`.
    pub(crate) fn find_free(&self, reserved: u64) -> Option<u8> {
        (0..self.slots.len())
            .find(|&i| !self.occupied.get_bit(i as u8) && !reserved.get_bit(i as u8))
            .map(|i| i as u8)
    }

    /// Stores `value` under the free id `id` and returns the slot's new generation.
    pub(crate) fn insert(&mut self, id: u8, value: T) -> u32 {
        let i = id as usize;
        debug_assert!(self.slots[i].is_none());
        self.generations[i] = self.generations[i].wrapping_add(1);
        self.slots[i] = Some(value);
        self.occupied.set_bit(id, true);
        self.generations[i]
    }

    pub(crate) fn get(&self, id: u8, generation: u32) -> Option<&T> {
        let i = id as usize;
        if *self.generations.get(i)? != generation {
            return None;
        }
        self.slots[i].as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: u8, generation: u32) -> Option<&mut T> {
        let i = id as usize;
        if *self.generations.get(i)? != generation {
            return None;
        }
        self.slots[i].as_mut()
    }

    pub(crate) fn remove(&mut self, id: u8, generation: u32) -> Option<T> {
        let i = id as usize;
        if *self.generations.get(i)? != generation {
            return None;
        }
        let value = self.slots[i].take()?;
        self.occupied.set_bit(id, false);
        Some(value)
    }

    /// Number of occupied slots.
    pub(crate) fn count(&self) -> u32 {
        self.occupied.count_ones()
    }

    pub(crate) fn occupancy(&self) -> u64 {
        self.occupied
    }
}


/// Mutable per-device bookkeeping, guarded by the device lock.
pub(crate) struct DeviceState {
    pub(crate) rx: ContextTable<RxContext>,
    pub(crate) tx: ContextTable<TxContext>,
    pub(crate) rx_reserved: u64,
    pub(crate) default_rx: Option<RxContextHandle>,
    pub(crate) default_tx: Option<TxContextHandle>,
    /// The ring context handed to v3.4 firmware, which keeps reading it while the pair is active.
    pub(crate) legacy_ring_context: Option<DmaBuffer>,
}


/// One PCI function of a NetXen adapter.
///
/// All firmware commands, context tables, the doorbell submission queue and the
/// request waiters of the function hang off this object, and its methods are the
/// only way to change them.
pub struct NicDevice {
    pub(crate) config: DeviceConfig,
    pub(crate) dma: Arc<dyn DmaAllocator>,
    pub(crate) delay: Arc<dyn Delay>,
    pub(crate) channel: CommandChannel,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) queue: Once<SubmissionQueue>,
    pub(crate) requests: RequestTracker,
}

impl NicDevice {
    /// Creates the device object for `config.pci_func`. No firmware command is issued.
    pub fn new(
        config: DeviceConfig,
        crb: Arc<dyn CrbAccess>,
        layout: CrbLayout,
        dma: Arc<dyn DmaAllocator>,
        delay: Arc<dyn Delay>,
    ) -> Result<NicDevice, NxError> {
        config.validate()?;
        let channel = CommandChannel::new(crb, layout, Arc::clone(&delay), config.channel);
        let state = DeviceState {
            rx: ContextTable::new(config.max_rx_contexts),
            tx: ContextTable::new(config.max_tx_contexts),
            rx_reserved: config.rx_reserved_mask,
            default_rx: None,
            default_tx: None,
            legacy_ring_context: None,
        };
        debug!("netxen: function {} device created, {} rx / {} tx context slots",
            config.pci_func, config.max_rx_contexts, config.max_tx_contexts);
        Ok(NicDevice {
            config,
            dma,
            delay,
            channel,
            state: Mutex::new(state),
            queue: Once::new(),
            requests: RequestTracker::new(),
        })
    }

    pub fn pci_func(&self) -> u8 {
        self.config.pci_func
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Returns true once the firmware stopped answering commands.
    pub fn is_firmware_dead(&self) -> bool {
        self.channel.is_dead()
    }

    pub fn active_rx_contexts(&self) -> u32 {
        self.state.lock().rx.count()
    }

    pub fn active_tx_contexts(&self) -> u32 {
        self.state.lock().tx.count()
    }

    /// Bitmap of the occupied rx and tx table ids.
    pub fn context_occupancy(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.rx.occupancy(), state.tx.occupancy())
    }

    pub fn default_rx_context(&self) -> Option<RxContextHandle> {
        self.state.lock().default_rx
    }

    pub fn default_tx_context(&self) -> Option<TxContextHandle> {
        self.state.lock().default_tx
    }

    /// Excludes additional rx ids from allocation. Ids already in use are unaffected.
    pub fn reserve_rx_ids(&self, mask: u64) {
        self.state.lock().rx_reserved |= mask;
    }

    /// Issues a CDRP command on behalf of this function.
    pub(crate) fn issue(&self, opcode: CdrpOpcode, args: [u32; 3]) -> Result<[u32; 3], NxError> {
        self.channel.issue_command(self.config.pci_func, HOST_INTERFACE_VERSION, args, opcode)
    }

    /// Returns the doorbell submission queue once it has been initialised.
    pub fn submission_queue(&self) -> Option<&SubmissionQueue> {
        self.queue.get()
    }
}

impl Drop for NicDevice {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.rx.count() != 0 || state.tx.count() != 0 {
            warn!("netxen: function {} dropped with {} rx and {} tx contexts still allocated",
                self.config.pci_func, state.rx.count(), state.tx.count());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ContextTable;

    #[test]
    fn lowest_unreserved_id_is_used() {
        let mut table = ContextTable::new(4);
        assert_eq!(table.find_free(0b0101), Some(1));
        table.insert(1, "a");
        assert_eq!(table.find_free(0b0101), Some(3));
        table.insert(3, "b");
        assert_eq!(table.find_free(0b0101), None);
        assert_eq!(table.count(), 2);
        assert_eq!(table.occupancy(), 0b1010);
    }

    #[test]
    fn reused_slot_has_new_generation() {
        let mut table = ContextTable::new(2);
        let first = table.insert(0, 10);
        assert_eq!(table.remove(0, first), Some(10));
        let second = table.insert(0, 20);
        assert_ne!(first, second);
        assert_eq!(table.get(0, first), None);
        assert_eq!(table.get(0, second), Some(&20));
        assert_eq!(table.remove(0, first), None);
        assert_eq!(table.count(), 1);
    }
}
