use netxen_ethernet::message::{DoorbellWord, QueueMessage, MESSAGE_BODY_WORDS, MESSAGE_SIZE};
use crate::config::QueueConfig;
use crate::error::NxError;
use crate::pexq::QueueCounters;
use crate::queries::PexqHardware;
use super::*;

const XDMA_HDR: u64 = 0x0b00_0000_0000_0042;
const CARD_FC_ARRAY: u64 = 0x0004_0000_0000;

fn queue_harness(queue: QueueConfig) -> (Harness, Arc<FakeDoorbell>) {
    let mut config = test_config();
    config.queue = queue;
    let h = harness(config);
    ContextFirmware::install(&h);
    let doorbell = FakeDoorbell::new();
    h.device.init_submission_queue(PexqHardware {
        xdma_hdr: XDMA_HDR,
        card_fc_array: CARD_FC_ARRAY,
        doorbell: doorbell.clone(),
    }).unwrap();
    (h, doorbell)
}

fn small_queue(max_pending: u16, completion_threshold: u16) -> QueueConfig {
    QueueConfig {
        slots: 64,
        max_pending,
        completion_threshold,
        ..Default::default()
    }
}

fn messages(n: usize) -> Vec<QueueMessage> {
    (0..n).map(|i| QueueMessage::new(0x100 + i as u64, [i as u64; MESSAGE_BODY_WORDS])).collect()
}

fn doorbell(ring_phys: u64, start: u16, len: u32) -> u64 {
    DoorbellWord::for_host_messages(ring_phys + start as u64 * MESSAGE_SIZE as u64, len).value()
}

#[test]
fn batch_of_300_splits_into_two_runs() {
    let (h, bell) = queue_harness(QueueConfig { max_pending: 512, completion_threshold: 32, ..Default::default() });
    let queue = h.device.submission_queue().unwrap();
    let msgs = messages(300);

    queue.submit(&msgs).unwrap();

    // 9 completion reports are interleaved, so 309 slots are used
    let phys = queue.ring_phys_addr();
    assert_eq!(bell.rings(), [doorbell(phys, 0, 255), doorbell(phys, 255, 54)]);
    assert_eq!(queue.counters(), QueueCounters {
        new_idx: 309,
        needs_doorbell_idx: 309,
        pending_compl_idx: 0,
        free_cnt: 1024 - 309,
        pending_cnt: 309,
    });

    // with the reports skipped, the slots hold the batch in order
    let queued: Vec<QueueMessage> = (0..309)
        .map(|slot| queue.slot_message(slot).unwrap())
        .filter(|msg| msg.hdr() != XDMA_HDR)
        .collect();
    assert_eq!(queued, msgs);

    let report = queue.slot_message(31).unwrap();
    assert_eq!(report.hdr(), XDMA_HDR);
    assert_eq!(report.body(1), CARD_FC_ARRAY + 8 * 32);
    assert_eq!(report.body(2), queue.completion_phys_addr());
    for slot in [63, 95, 127, 159, 191, 223, 255, 287] {
        assert_eq!(queue.slot_message(slot).unwrap().hdr(), XDMA_HDR);
    }
}

#[test]
fn reconcile_moves_completed_slots_to_free() {
    let (h, _bell) = queue_harness(QueueConfig { max_pending: 512, completion_threshold: 32, ..Default::default() });
    let queue = h.device.submission_queue().unwrap();
    queue.submit(&messages(300)).unwrap();

    h.dma.write_u64(queue.completion_phys_addr(), 100);
    assert_eq!(queue.reconcile(), Ok(100));
    let counters = queue.counters();
    assert_eq!((counters.pending_compl_idx, counters.free_cnt, counters.pending_cnt), (100, 815, 209));

    // nothing new since the last look
    assert_eq!(queue.reconcile(), Err(NxError::NotReady));
    assert_eq!(queue.counters(), counters);

    // an index outside the ring is ignored
    h.dma.write_u64(queue.completion_phys_addr(), 5000);
    assert_eq!(queue.reconcile(), Err(NxError::NotReady));
    assert_eq!(queue.counters(), counters);

    // more completions than pending slots are clamped
    h.dma.write_u64(queue.completion_phys_addr(), 400);
    assert_eq!(queue.reconcile(), Ok(209));
    let counters = queue.counters();
    assert_eq!((counters.free_cnt, counters.pending_cnt), (1024, 0));
}

#[test]
fn pending_ceiling_rejects_whole_batch() {
    let (h, bell) = queue_harness(small_queue(32, 8));
    let queue = h.device.submission_queue().unwrap();
    let before = queue.counters();

    assert_eq!(queue.submit(&messages(40)), Err(NxError::NoHostResource));
    assert_eq!(queue.counters(), before);
    assert!(bell.rings().is_empty());

    // the slots written by the failed call are simply overwritten
    let msgs = messages(20);
    queue.submit(&msgs).unwrap();
    assert_eq!(queue.slot_message(0), Some(msgs[0]));
    assert_eq!(queue.slot_message(7).unwrap().hdr(), XDMA_HDR);
    assert_eq!(queue.counters().pending_cnt, 22);
    assert_eq!(bell.rings(), [doorbell(queue.ring_phys_addr(), 0, 22)]);
}

#[test]
fn free_slots_run_out() {
    let (h, bell) = queue_harness(small_queue(64, 64));
    let queue = h.device.submission_queue().unwrap();
    queue.submit(&messages(50)).unwrap();

    assert_eq!(queue.submit(&messages(20)), Err(NxError::NoHostResource));
    assert_eq!(queue.counters().free_cnt, 14);
    assert_eq!(bell.rings().len(), 1);
}

#[test]
fn batch_needing_too_many_doorbells_fails() {
    let config = QueueConfig {
        max_pending: 1024,
        completion_threshold: 1024,
        max_run: 8,
        ..Default::default()
    };
    let (h, bell) = queue_harness(config);
    let queue = h.device.submission_queue().unwrap();

    assert_eq!(queue.submit(&messages(33)), Err(NxError::NoHostResource));
    assert_eq!(queue.counters().new_idx, 0);
    assert!(bell.rings().is_empty());

    queue.submit(&messages(32)).unwrap();
    let phys = queue.ring_phys_addr();
    assert_eq!(bell.rings(), [
        doorbell(phys, 0, 8),
        doorbell(phys, 8, 8),
        doorbell(phys, 16, 8),
        doorbell(phys, 24, 8),
    ]);
}

#[test]
fn run_is_split_at_ring_wrap() {
    let (h, bell) = queue_harness(small_queue(64, 64));
    let queue = h.device.submission_queue().unwrap();
    queue.submit(&messages(50)).unwrap();

    h.dma.write_u64(queue.completion_phys_addr(), 50);
    queue.submit(&messages(20)).unwrap();

    let phys = queue.ring_phys_addr();
    assert_eq!(bell.rings(), [doorbell(phys, 0, 50), doorbell(phys, 50, 14), doorbell(phys, 0, 6)]);
    let counters = queue.counters();
    assert_eq!(counters.new_idx, 6);
    assert_eq!(counters.free_cnt + counters.pending_cnt, 64);
    assert_eq!(counters.pending_cnt, 20);
}

#[test]
fn doorbell_is_rewritten_until_reflected() {
    let (h, bell) = queue_harness(small_queue(32, 32));
    let queue = h.device.submission_queue().unwrap();
    bell.miss_writes(2);

    queue.submit(&messages(3)).unwrap();

    let expected = doorbell(queue.ring_phys_addr(), 0, 3);
    assert_eq!(bell.rings(), [expected, expected, expected]);
}

#[test]
fn unacknowledged_doorbell_is_rung_again_on_next_submit() {
    let config = QueueConfig { doorbell_retry_limit: Some(1), ..small_queue(32, 32) };
    let (h, bell) = queue_harness(config);
    let queue = h.device.submission_queue().unwrap();
    bell.miss_writes(5);

    assert_eq!(queue.submit(&messages(1)), Err(NxError::Timeout));
    assert_eq!(bell.rings().len(), 2);
    let counters = queue.counters();
    assert_eq!((counters.new_idx, counters.needs_doorbell_idx, counters.pending_cnt), (1, 0, 1));

    bell.miss_writes(0);
    queue.submit(&messages(1)).unwrap();
    let phys = queue.ring_phys_addr();
    assert_eq!(bell.rings()[2..], [doorbell(phys, 0, 1), doorbell(phys, 1, 1)]);
    assert_eq!(queue.counters().needs_doorbell_idx, 2);
}

#[test]
fn queue_is_set_up_once() {
    let (h, _bell) = queue_harness(QueueConfig::default());
    let again = h.device.init_submission_queue(PexqHardware {
        xdma_hdr: 0,
        card_fc_array: 0,
        doorbell: FakeDoorbell::new(),
    });
    assert_eq!(again.err(), Some(NxError::InvalidState));
    // ring and completion word
    assert_eq!(h.dma.live_allocations(), 2);
}

#[test]
fn small_firmware_queue_is_rejected() {
    let h = harness(test_config());
    h.crb.set_firmware(|cmd| match cmd.opcode {
        CdrpOpcode::ReadPexqParameters => FwReply::Ok([PEXQ_QUEUE_LENGTH, 16, 0]),
        _ => FwReply::Ok([0; 3]),
    });
    let hardware = PexqHardware { xdma_hdr: 0, card_fc_array: 0, doorbell: FakeDoorbell::new() };

    assert_eq!(h.device.init_submission_queue(hardware).err(), Some(NxError::NoHostMemory));
    assert!(h.device.submission_queue().is_none());
    assert_eq!(h.dma.live_allocations(), 0);
}
