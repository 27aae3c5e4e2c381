use core::sync::atomic::Ordering;
use netxen_ethernet::command::{command_signature, CdrpOpcode, FirmwareErrorCode, HOST_INTERFACE_VERSION};
use netxen_ethernet::context::FunctionAttributes;
use crate::error::NxError;
use crate::queries::FlowDirection;
use super::*;

#[test]
fn command_returns_output_arguments() {
    let h = harness(test_config());
    h.crb.set_firmware(|cmd| match cmd.opcode {
        CdrpOpcode::ReadMaxMtu => FwReply::Ok([9000, 0, 0]),
        _ => FwReply::Fail(FirmwareErrorCode::CmdNotImpl as u32),
    });

    assert_eq!(h.device.max_mtu(), Ok(9000));

    let cmds = h.crb.commands();
    assert_eq!(cmds.len(), 1);
    assert_eq!(cmds[0].signature, command_signature(PCI_FUNC, HOST_INTERFACE_VERSION));
    assert_eq!(cmds[0].signature, 0xcafe_0102);
    // one lock for the reset check, one for the command, both released
    assert_eq!(h.crb.semaphore_counts(), (2, 2));
    assert!(!h.crb.semaphore_held());
}

#[test]
fn arguments_reach_the_registers_in_order() {
    let h = harness(test_config());
    h.device.set_flow_control(FlowDirection::Tx, 7).unwrap();
    h.device.configure_gbe_port(1000, 1, 0).unwrap();

    let cmds = h.crb.commands();
    assert_eq!(cmds[0].opcode, CdrpOpcode::SetFlowCtl);
    assert_eq!(cmds[0].args, [1, 7, 0]);
    assert_eq!(cmds[1].opcode, CdrpOpcode::ConfigGbePort);
    assert_eq!(cmds[1].args, [1000, 1, 0]);

    // the opcode is the last register written
    let writes = h.crb.writes();
    let cdrp_write = writes.iter().rposition(|(offset, _)| *offset == LAYOUT.cdrp).unwrap();
    assert!(writes[..cdrp_write].iter().any(|(offset, _)| *offset == LAYOUT.arg3));
}

#[test]
fn firmware_failure_carries_reason() {
    let h = harness(test_config());
    h.crb.set_firmware(|_| FwReply::Fail(FirmwareErrorCode::InvalidArgs as u32));

    let err = h.device.read_phy(3).unwrap_err();
    assert_eq!(err, NxError::CommandFailed(6));
    assert_eq!(err.code(), FirmwareErrorCode::InvalidArgs);
    assert!(!h.device.is_firmware_dead());
    assert!(!h.crb.semaphore_held());
}

#[test]
fn stalled_heartbeat_ends_polling_early() {
    let h = harness(test_config());
    h.crb.set_firmware(|_| FwReply::Silent);
    h.crb.set_heartbeat_running(false);

    assert_eq!(h.device.max_lro(), Err(NxError::Timeout));
    // 20 retries: the stall is noticed on the 11th poll
    assert_eq!(h.clock.udelay_us.load(Ordering::Relaxed), 11 * 10);
    assert!(h.device.is_firmware_dead());
    assert_eq!(h.crb.reg(LAYOUT.fw_reset), 1);
    assert!(!h.crb.semaphore_held());
}

#[test]
fn silent_firmware_times_out_after_full_budget() {
    let h = harness(test_config());
    h.crb.set_firmware(|_| FwReply::Silent);

    assert_eq!(h.device.max_lro(), Err(NxError::Timeout));
    assert_eq!(h.clock.udelay_us.load(Ordering::Relaxed), 21 * 10);
    assert!(h.device.is_firmware_dead());
    assert_eq!(h.crb.reg(LAYOUT.fw_reset), 1);
}

#[test]
fn reset_latch_is_written_once() {
    let h = harness(test_config());
    h.crb.set_firmware(|_| FwReply::Silent);

    assert_eq!(h.device.max_lro(), Err(NxError::Timeout));
    let latches = h.crb.writes().iter().filter(|(offset, _)| *offset == LAYOUT.fw_reset).count();
    assert_eq!(latches, 1);
}

#[test]
fn dead_device_fails_fast() {
    let h = harness(test_config());
    h.crb.set_firmware(|_| FwReply::Silent);
    assert_eq!(h.device.max_rx_contexts(), Err(NxError::Timeout));

    h.crb.set_firmware(|_| FwReply::Ok([1, 2, 3]));
    let grants = h.crb.semaphore_counts().0;
    assert_eq!(h.device.max_rx_contexts(), Err(NxError::Timeout));
    assert_eq!(h.crb.commands().len(), 1);
    assert_eq!(h.crb.semaphore_counts().0, grants);
}

#[test]
fn pending_firmware_reset_refuses_commands() {
    let h = harness(test_config());
    h.crb.set_reg(LAYOUT.fw_reset, 1);

    assert_eq!(h.device.max_tx_contexts(), Err(NxError::Timeout));
    assert!(h.crb.commands().is_empty());
    assert!(!h.crb.semaphore_held());
}

#[test]
fn semaphore_timeout_marks_device_dead() {
    let h = harness(test_config());
    h.crb.set_semaphore_stuck(true);

    assert_eq!(h.device.max_mtu(), Err(NxError::LockTimeout));
    assert!(h.device.is_firmware_dead());
    assert!(h.crb.commands().is_empty());
    assert_eq!(h.clock.yields.load(Ordering::Relaxed), 20);
}

#[test]
fn function_attributes_use_a_scratch_buffer() {
    let h = harness(test_config());
    let dma = h.dma.clone();
    h.crb.set_firmware(move |cmd| {
        let phys = (cmd.args[0] as u64) << 32 | cmd.args[1] as u64;
        let mut buf = [0u8; FunctionAttributes::ENCODED_LEN];
        FunctionAttributes { fenable: 0x3, freq: 125_000_000 }.encode(&mut buf).unwrap();
        dma.write(phys, &buf);
        FwReply::Ok([0; 3])
    });

    let attrs = h.device.function_attributes().unwrap();
    assert_eq!(attrs, FunctionAttributes { fenable: 0x3, freq: 125_000_000 });
    assert_eq!(h.dma.live_allocations(), 0);
}

#[test]
fn pexq_parameters_come_from_two_outputs() {
    let h = harness(test_config());
    ContextFirmware::install(&h);

    let params = h.device.pexq_parameters().unwrap();
    assert_eq!(params.queue_length, PEXQ_QUEUE_LENGTH);
    assert_eq!(params.card_fc_size, PEXQ_CARD_FC_SIZE);
}
