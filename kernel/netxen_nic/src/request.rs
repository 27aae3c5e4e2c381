//! NIC requests sent through the submission queue, and the matching of firmware replies
//! to the requests waiting for them.
//!
//! A request that needs a reply takes a completion id (0 to 255) and registers a waiter
//! under it before the message is submitted, so a reply that arrives immediately is never
//! lost. The receive path hands every NIC response to [`NicDevice::handle_response`], which
//! finds the waiter by completion id and wakes it.

use alloc::sync::Arc;
use alloc::vec::Vec;
use bit_field::BitField;
use core::sync::atomic::{AtomicBool, Ordering};
use netxen_ethernet::message::{
    C2hOpcode, H2cOpcode, LinkEvent, MacOp, MacRequest, NicRequestHeader, NicResponse,
    QueueMessage, RequestQueueHeader, MAC_EVENT, MESSAGE_BODY_WORDS, NIC_REQUEST, NX_NIC_HOST_REQUEST,
};
use spin::Mutex;
use crate::config::{RequestConfig, CONFIG_MAX_COMPLETION_IDS};
use crate::context::RxContextHandle;
use crate::device::NicDevice;
use crate::error::NxError;
use crate::platform::Delay;

/// Maximum number of payload words in a request; the first body word is the request header.
pub const MAX_REQUEST_PAYLOAD_WORDS: usize = MESSAGE_BODY_WORDS - 1;

/// What [`NicDevice::handle_response`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEvent {
    /// The request waiting on this completion id was woken.
    Completed(u8),
    /// An unsolicited link status report.
    LinkEvent(LinkEvent),
    /// A response this core does not consume, such as the LRO notifications.
    Ignored(u8),
}

/// Promiscuous receive modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiscuousMode {
    /// Drop frames not addressed to a configured filter.
    DropUnmatched = 0,
    /// Accept every frame.
    AcceptAll = 1,
}

struct Waiter {
    comp_id: u8,
    active: AtomicBool,
    response: Mutex<Option<NicResponse>>,
}

struct TrackerState {
    /// One bit per completion id in use.
    comp_ids: [u64; CONFIG_MAX_COMPLETION_IDS / 64],
    waiters: Vec<Arc<Waiter>>,
}

/// The completion ids and waiters of in-flight requests.
pub(crate) struct RequestTracker {
    state: Mutex<TrackerState>,
}

/// A registered waiter. Dropping it releases the completion id.
pub(crate) struct Registration<'t> {
    tracker: &'t RequestTracker,
    waiter: Arc<Waiter>,
}

impl<'t> Registration<'t> {
    pub(crate) fn comp_id(&self) -> u8 {
        self.waiter.comp_id
    }

    /// Sleeps in slices until the reply arrives or the time limit is used up.
    fn wait(&self, delay: &dyn Delay, config: &RequestConfig) -> Result<NicResponse, NxError> {
        let mut remaining = config.wait_limit_ms;
        loop {
            if let Some(rsp) = self.waiter.response.lock().take() {
                return Ok(rsp);
            }
            if remaining == 0 {
                warn!("netxen: request {} got no reply within {} ms", self.comp_id(), config.wait_limit_ms);
                return Err(NxError::Timeout);
            }
            let slice = remaining.min(config.wait_slice_ms);
            delay.sleep_ms(slice);
            remaining -= slice;
        }
    }
}

impl<'t> Drop for Registration<'t> {
    fn drop(&mut self) {
        self.waiter.active.store(false, Ordering::Release);
        let mut state = self.tracker.state.lock();
        state.waiters.retain(|w| !Arc::ptr_eq(w, &self.waiter));
        let id = self.waiter.comp_id as usize;
        state.comp_ids[id / 64].set_bit((id % 64) as u8, false);
    }
}

impl RequestTracker {
    pub(crate) fn new() -> RequestTracker {
        RequestTracker {
            state: Mutex::new(TrackerState {
                comp_ids: [0; CONFIG_MAX_COMPLETION_IDS / 64],
                waiters: Vec::new(),
            }),
        }
    }

    /// Takes the lowest free completion id and registers a waiter under it.
    pub(crate) fn register(&self) -> Result<Registration<'_>, NxError> {
        let mut state = self.state.lock();
        let id = (0..CONFIG_MAX_COMPLETION_IDS)
            .find(|&i| !state.comp_ids[i / 64].get_bit((i % 64) as u8))
            .ok_or_else(|| {
                warn!("netxen: all {} completion ids are in use", CONFIG_MAX_COMPLETION_IDS);
                NxError::command_failed()
            })?;
        state.comp_ids[id / 64].set_bit((id % 64) as u8, true);
        let waiter = Arc::new(Waiter {
            comp_id: id as u8,
            active: AtomicBool::new(true),
            response: Mutex::new(None),
        });
        state.waiters.push(Arc::clone(&waiter));
        Ok(Registration { tracker: self, waiter })
    }

    fn wake(&self, rsp: NicResponse) -> Result<u8, NxError> {
        let comp_id = rsp.comp_id();
        let waiter = {
            let state = self.state.lock();
            state.waiters.iter().find(|w| w.comp_id == comp_id).cloned()
        };
        let waiter = waiter.ok_or_else(|| {
            warn!("netxen: response {:#x} for unknown completion id {}", rsp.opcode(), comp_id);
            NxError::command_failed()
        })?;
        if !waiter.active.load(Ordering::Acquire) {
            warn!("netxen: response {:#x} for inactive completion id {}", rsp.opcode(), comp_id);
            return Err(NxError::command_failed());
        }
        *waiter.response.lock() = Some(rsp);
        Ok(comp_id)
    }

    /// Number of requests currently waiting for a reply.
    pub(crate) fn outstanding(&self) -> usize {
        self.state.lock().waiters.len()
    }
}


impl NicDevice {
    /// Sends one NIC request through the submission queue on behalf of an rx context.
    ///
    /// With `is_sync` the request asks for a completion and the call blocks until the reply
    /// arrives, returning its body word. A request that times out is not resubmitted.
    /// Without `is_sync` the call returns once the message is queued.
    pub fn send_request(
        &self,
        opcode: H2cOpcode,
        rx: RxContextHandle,
        payload: &[u64],
        is_sync: bool,
    ) -> Result<Option<u64>, NxError> {
        if payload.len() > MAX_REQUEST_PAYLOAD_WORDS {
            return Err(NxError::InvalidArguments);
        }
        let queue = self.queue.get().ok_or_else(|| {
            error!("netxen: request {:?} sent before the submission queue was set up", opcode);
            NxError::InvalidState
        })?;
        let ctx_id = self.rx_context(rx).ok_or(NxError::InvalidArguments)?.context_id;

        // L2 MAC changes still travel under the old request opcode
        let (queue_opcode, request_opcode) = match opcode {
            H2cOpcode::ConfigL2Mac => (NIC_REQUEST, MAC_EVENT),
            _ => (NX_NIC_HOST_REQUEST, opcode as u8),
        };

        let registration = if is_sync { Some(self.requests.register()?) } else { None };

        let hdr = RequestQueueHeader { opcode: queue_opcode, ..Default::default() };
        let req_hdr = NicRequestHeader {
            opcode: request_opcode,
            comp_id: registration.as_ref().map_or(0, |r| r.comp_id()),
            ctx_id,
            need_completion: is_sync,
            sub_opcode: 0,
        };
        let mut body = [0u64; MESSAGE_BODY_WORDS];
        body[0] = req_hdr.to_word();
        body[1..=payload.len()].copy_from_slice(payload);

        trace!("netxen: request {:?} comp_id {} ctx {}", opcode, req_hdr.comp_id, ctx_id);
        queue.submit(&[QueueMessage::new(hdr.to_word(), body)])?;

        match registration {
            Some(registration) => {
                let rsp = registration.wait(&*self.delay, &self.config.request)?;
                if rsp.error_code() != 0 {
                    error!("netxen: request {:?} failed with code {:#x}", opcode, rsp.error_code());
                    return Err(NxError::CommandFailed(rsp.error_code() as u32));
                }
                Ok(Some(rsp.body[0]))
            }
            None => Ok(None),
        }
    }

    /// Dispatches a NIC response received from the firmware.
    ///
    /// Link events are decoded and returned. Every other response must belong to a waiting
    /// request; a response for an unknown or inactive completion id is a failed command.
    pub fn handle_response(&self, rsp: NicResponse) -> Result<ResponseEvent, NxError> {
        match C2hOpcode::try_from(rsp.opcode()) {
            Ok(C2hOpcode::LroDeleteResponse) | Ok(C2hOpcode::LroAddFailureResponse) => {
                trace!("netxen: LRO response {:#x} ignored", rsp.opcode());
                Ok(ResponseEvent::Ignored(rsp.opcode()))
            }
            Ok(C2hOpcode::GetLinkeventResponse) => {
                let event = LinkEvent::from_body(&rsp.body);
                debug!("netxen: link event {:?}", event);
                Ok(ResponseEvent::LinkEvent(event))
            }
            _ => self.requests.wake(rsp).map(ResponseEvent::Completed),
        }
    }

    /// Number of synchronous requests waiting for a reply.
    pub fn outstanding_requests(&self) -> usize {
        self.requests.outstanding()
    }

    /// Requests need live rx and tx contexts and both defaults to route the reply.
    fn validate_for_request(&self) -> Result<RxContextHandle, NxError> {
        let state = self.state.lock();
        match (state.default_rx, state.default_tx) {
            (Some(rx), Some(_)) if state.rx.count() > 0 && state.tx.count() > 0 => Ok(rx),
            _ => {
                debug!("netxen: request refused, no active default contexts");
                Err(NxError::command_failed())
            }
        }
    }

    fn l2_mac_request(&self, rx: RxContextHandle, op: MacOp, mac_addr: [u8; 6]) -> Result<(), NxError> {
        self.validate_for_request()?;
        let req = MacRequest { op, tag: 0, mac_addr };
        self.send_request(H2cOpcode::ConfigL2Mac, rx, &[req.to_word()], false).map(|_| ())
    }

    /// Adds an L2 MAC address filter to an rx context. The request is not acknowledged.
    pub fn add_l2_mac(&self, rx: RxContextHandle, mac_addr: [u8; 6]) -> Result<(), NxError> {
        self.l2_mac_request(rx, MacOp::Add, mac_addr)
    }

    pub fn remove_l2_mac(&self, rx: RxContextHandle, mac_addr: [u8; 6]) -> Result<(), NxError> {
        self.l2_mac_request(rx, MacOp::Delete, mac_addr)
    }

    /// Sets the promiscuous mode of the default rx context.
    pub fn set_promiscuous(&self, mode: PromiscuousMode, is_sync: bool) -> Result<(), NxError> {
        let rx = self.validate_for_request()?;
        self.send_request(H2cOpcode::ConfigPromiscuous, rx, &[mode as u64], is_sync).map(|_| ())
    }

    /// Asks the firmware for the current link state and whether to report later changes.
    /// The answer arrives as a [`ResponseEvent::LinkEvent`].
    pub fn request_link_event(&self, notify_changes: bool) -> Result<(), NxError> {
        let rx = self.validate_for_request()?;
        let mut payload = 0u64;
        payload.set_bits(0..8, notify_changes as u64);
        payload.set_bits(8..16, 1);
        self.send_request(H2cOpcode::GetLinkevent, rx, &[payload], false).map(|_| ())
    }
}
