//! Software models of the hardware and kernel services the core talks to,
//! used by the unit tests in place of a real adapter.

extern crate std;

use self::std::boxed::Box;
use self::std::collections::HashMap;
use self::std::sync::Mutex;
use self::std::vec;
use self::std::vec::Vec;

use alloc::sync::Arc;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use netxen_ethernet::command::{self, CdrpOpcode, CdrpResponse};
use crate::dma::{DmaAllocator, DmaFlags, DmaRegion};
use crate::platform::Delay;
use crate::regs::{CrbAccess, CrbLayout, DoorbellPort, LegacyCrbMap};

pub const LAYOUT: CrbLayout = CrbLayout::with_cdrp_window(0x1000, 0x2000, 0x2004, 0x3000, 0x3004);

pub fn legacy_map() -> LegacyCrbMap {
    LegacyCrbMap {
        ctx_signature: 0x4000,
        ctx_addr_hi: 0x4004,
        ctx_addr_lo: 0x4008,
        rds_producers: [0x4100, 0x4104, 0x4108],
        sds_consumers: [0x4200, 0x4204, 0x4208, 0x420c, 0x4210, 0x4214, 0x4218, 0x421c],
        sds_interrupts: [0x4300, 0x4304, 0x4308, 0x430c, 0x4310, 0x4314, 0x4318, 0x431c],
        cmd_producer: 0x4400,
    }
}


/// A command as the firmware model sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwCommand {
    pub opcode: CdrpOpcode,
    pub signature: u32,
    pub args: [u32; 3],
}

/// How the firmware model answers a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FwReply {
    Ok([u32; 3]),
    Fail(u32),
    /// Never write a response.
    Silent,
}

type Firmware = Box<dyn FnMut(&FwCommand) -> FwReply + Send>;
type WriteHook = Box<dyn FnMut(u32) + Send>;

struct CrbState {
    regs: HashMap<u32, u32>,
    writes: Vec<(u32, u32)>,
    commands: Vec<FwCommand>,
    sem_held: bool,
    sem_stuck: bool,
    sem_grants: usize,
    sem_releases: usize,
    heartbeat_running: bool,
    firmware: Option<Firmware>,
    write_hook: Option<(u32, WriteHook)>,
}

/// A register block with a hardware semaphore, a heartbeat counter and a scripted firmware.
pub struct FakeCrb {
    state: Mutex<CrbState>,
}

impl FakeCrb {
    pub fn new() -> Arc<FakeCrb> {
        Arc::new(FakeCrb {
            state: Mutex::new(CrbState {
                regs: HashMap::new(),
                writes: Vec::new(),
                commands: Vec::new(),
                sem_held: false,
                sem_stuck: false,
                sem_grants: 0,
                sem_releases: 0,
                heartbeat_running: true,
                firmware: None,
                write_hook: None,
            }),
        })
    }

    /// Installs the function that answers every command written to the CDRP register.
    pub fn set_firmware(&self, firmware: impl FnMut(&FwCommand) -> FwReply + Send + 'static) {
        self.state.lock().unwrap().firmware = Some(Box::new(firmware));
    }

    /// Calls `hook` with the written value after every write to `offset`.
    /// The hook runs without the register lock held, so it may drive the device.
    pub fn on_write(&self, offset: u32, hook: impl FnMut(u32) + Send + 'static) {
        self.state.lock().unwrap().write_hook = Some((offset, Box::new(hook)));
    }

    pub fn set_heartbeat_running(&self, running: bool) {
        self.state.lock().unwrap().heartbeat_running = running;
    }

    /// Makes the semaphore look held by another PCI function.
    pub fn set_semaphore_stuck(&self, stuck: bool) {
        self.state.lock().unwrap().sem_stuck = stuck;
    }

    pub fn set_reg(&self, offset: u32, value: u32) {
        self.state.lock().unwrap().regs.insert(offset, value);
    }

    pub fn reg(&self, offset: u32) -> u32 {
        self.state.lock().unwrap().regs.get(&offset).copied().unwrap_or(0)
    }

    pub fn commands(&self) -> Vec<FwCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn semaphore_counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.sem_grants, state.sem_releases)
    }

    pub fn semaphore_held(&self) -> bool {
        self.state.lock().unwrap().sem_held
    }
}

impl CrbAccess for FakeCrb {
    fn read32(&self, offset: u32) -> u32 {
        let mut state = self.state.lock().unwrap();
        if offset == LAYOUT.sem_lock {
            if state.sem_stuck || state.sem_held {
                return 0;
            }
            state.sem_held = true;
            state.sem_grants += 1;
            return 1;
        }
        if offset == LAYOUT.sem_unlock {
            if state.sem_held {
                state.sem_held = false;
                state.sem_releases += 1;
            }
            return 0;
        }
        if offset == LAYOUT.heartbeat && state.heartbeat_running {
            let beat = state.regs.entry(offset).or_insert(0);
            *beat += 1;
            return *beat;
        }
        state.regs.get(&offset).copied().unwrap_or(0)
    }

    fn write32(&self, offset: u32, value: u32) {
        self.store(offset, value);

        let hook = {
            let mut state = self.state.lock().unwrap();
            match state.write_hook.take() {
                Some((hooked, hook)) if hooked == offset => Some(hook),
                other => {
                    state.write_hook = other;
                    None
                }
            }
        };
        if let Some(mut hook) = hook {
            hook(value);
            let mut state = self.state.lock().unwrap();
            if state.write_hook.is_none() {
                state.write_hook = Some((offset, hook));
            }
        }
    }
}

impl FakeCrb {
    fn store(&self, offset: u32, value: u32) {
        let mut state = self.state.lock().unwrap();
        state.writes.push((offset, value));
        state.regs.insert(offset, value);
        if offset != LAYOUT.cdrp || command::is_response(value) {
            return;
        }

        let opcode = CdrpOpcode::try_from(value & 0x7fff_ffff).expect("unknown opcode written to CDRP");
        let cmd = FwCommand {
            opcode,
            signature: state.regs.get(&LAYOUT.signature).copied().unwrap_or(0),
            args: [
                state.regs.get(&LAYOUT.arg1).copied().unwrap_or(0),
                state.regs.get(&LAYOUT.arg2).copied().unwrap_or(0),
                state.regs.get(&LAYOUT.arg3).copied().unwrap_or(0),
            ],
        };
        state.commands.push(cmd);
        let reply = match state.firmware.as_mut() {
            Some(firmware) => firmware(&cmd),
            None => FwReply::Ok([0; 3]),
        };
        match reply {
            FwReply::Ok(out) => {
                state.regs.insert(LAYOUT.arg1, out[0]);
                state.regs.insert(LAYOUT.arg2, out[1]);
                state.regs.insert(LAYOUT.arg3, out[2]);
                state.regs.insert(LAYOUT.cdrp, CdrpResponse::Ok as u32);
            }
            FwReply::Fail(reason) => {
                state.regs.insert(LAYOUT.arg1, reason);
                state.regs.insert(LAYOUT.cdrp, CdrpResponse::Fail as u32);
            }
            FwReply::Silent => {}
        }
    }
}


struct Allocation {
    words: *mut u64,
    num_words: usize,
    size: usize,
}

struct DmaState {
    next_phys: u64,
    live: HashMap<u64, Allocation>,
    total: usize,
    fail_at: Option<usize>,
}

/// Heap-backed DMA memory with fake physical addresses.
pub struct FakeDma {
    state: Mutex<DmaState>,
}

// Allocations are only reached through the owning `DmaBuffer` or under the state lock.
unsafe impl Send for FakeDma {}
unsafe impl Sync for FakeDma {}

impl FakeDma {
    pub fn new() -> Arc<FakeDma> {
        Arc::new(FakeDma {
            state: Mutex::new(DmaState {
                next_phys: 0x1000_0000,
                live: HashMap::new(),
                total: 0,
                fail_at: None,
            }),
        })
    }

    /// Makes the allocation with the given zero-based sequence number fail.
    pub fn fail_allocation(&self, nth: usize) {
        self.state.lock().unwrap().fail_at = Some(nth);
    }

    pub fn live_allocations(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn total_allocations(&self) -> usize {
        self.state.lock().unwrap().total
    }

    fn with_bytes<R>(&self, phys: u64, len: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let state = self.state.lock().unwrap();
        let (base, alloc) = state.live.iter()
            .find(|(base, a)| phys >= **base && phys + len as u64 <= **base + a.size as u64)
            .expect("physical range is not inside a live DMA allocation");
        let offset = (phys - base) as usize;
        let bytes = unsafe { core::slice::from_raw_parts_mut(alloc.words as *mut u8, alloc.size) };
        f(&mut bytes[offset..offset + len])
    }

    pub fn read(&self, phys: u64, len: usize) -> Vec<u8> {
        self.with_bytes(phys, len, |bytes| bytes.to_vec())
    }

    pub fn write(&self, phys: u64, data: &[u8]) {
        self.with_bytes(phys, data.len(), |bytes| bytes.copy_from_slice(data))
    }

    pub fn write_u64(&self, phys: u64, value: u64) {
        self.write(phys, &value.to_le_bytes())
    }
}

impl DmaAllocator for FakeDma {
    fn alloc(&self, size: usize, _flags: DmaFlags) -> Option<DmaRegion> {
        let mut state = self.state.lock().unwrap();
        let seq = state.total;
        state.total += 1;
        if state.fail_at == Some(seq) {
            return None;
        }
        let num_words = (size + 7) / 8;
        let words = Box::into_raw(vec![0xa5a5_a5a5_a5a5_a5a5u64; num_words].into_boxed_slice()) as *mut u64;
        let phys = state.next_phys;
        state.next_phys += ((size as u64 + 0xfff) & !0xfff).max(0x1000);
        state.live.insert(phys, Allocation { words, num_words, size });
        Some(DmaRegion {
            virt: NonNull::new(words as *mut u8)?,
            phys,
            size,
        })
    }

    fn free(&self, region: DmaRegion) {
        let mut state = self.state.lock().unwrap();
        let alloc = state.live.remove(&region.phys).expect("freed a DMA region that is not live");
        assert_eq!(alloc.size, region.size);
        drop(unsafe { Box::from_raw(core::ptr::slice_from_raw_parts_mut(alloc.words, alloc.num_words)) });
    }
}


type SleepHook = Box<dyn FnMut(u32) + Send>;

/// A clock that only counts. Sleeping can run a hook, which stands in for work
/// another task would do while the caller sleeps.
pub struct FakeClock {
    pub udelay_us: AtomicU64,
    pub yields: AtomicU32,
    pub slept_ms: AtomicU64,
    sleep_hook: Mutex<Option<SleepHook>>,
}

impl FakeClock {
    pub fn new() -> Arc<FakeClock> {
        Arc::new(FakeClock {
            udelay_us: AtomicU64::new(0),
            yields: AtomicU32::new(0),
            slept_ms: AtomicU64::new(0),
            sleep_hook: Mutex::new(None),
        })
    }

    pub fn on_sleep(&self, hook: impl FnMut(u32) + Send + 'static) {
        *self.sleep_hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl Delay for FakeClock {
    fn udelay(&self, us: u32) {
        self.udelay_us.fetch_add(us as u64, Ordering::Relaxed);
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
    }

    fn sleep_ms(&self, ms: u32) {
        self.slept_ms.fetch_add(ms as u64, Ordering::Relaxed);
        if let Some(hook) = self.sleep_hook.lock().unwrap().as_mut() {
            hook(ms);
        }
    }
}


/// A doorbell register whose reflection can be made to miss a number of writes.
pub struct FakeDoorbell {
    rings: Mutex<Vec<u64>>,
    misses: AtomicU32,
}

impl FakeDoorbell {
    pub fn new() -> Arc<FakeDoorbell> {
        Arc::new(FakeDoorbell { rings: Mutex::new(Vec::new()), misses: AtomicU32::new(0) })
    }

    /// The next `n` reflection reads return a stale value.
    pub fn miss_writes(&self, n: u32) {
        self.misses.store(n, Ordering::SeqCst);
    }

    pub fn rings(&self) -> Vec<u64> {
        self.rings.lock().unwrap().clone()
    }
}

impl DoorbellPort for FakeDoorbell {
    fn ring(&self, value: u64) {
        self.rings.lock().unwrap().push(value);
    }

    fn reflection(&self) -> u64 {
        let last = self.rings.lock().unwrap().last().copied().unwrap_or(0);
        if self.misses.load(Ordering::SeqCst) > 0 {
            self.misses.fetch_sub(1, Ordering::SeqCst);
            return !last;
        }
        last
    }
}
