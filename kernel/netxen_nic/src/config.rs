//! Compile-time defaults and the runtime configuration of a NIC device.

use crate::error::NxError;
use crate::regs::LegacyCrbMap;

/// Delay between two polls of a command register, in microseconds.
pub const CONFIG_CRB_UDELAY_US: u32 = 1000;
/// Number of polls before a command or the hardware semaphore is considered timed out.
pub const CONFIG_CRB_RETRY_COUNT: u32 = 4000;

/// A request waiter sleeps in slices of this many milliseconds.
pub const CONFIG_REQUEST_WAIT_SLICE_MS: u32 = 100;
/// A request waiter gives up after the same budget as a firmware command.
pub const CONFIG_REQUEST_WAIT_LIMIT_MS: u32 = CONFIG_CRB_RETRY_COUNT * CONFIG_CRB_UDELAY_US / 1000;
/// Number of completion ids available to in-flight requests.
pub const CONFIG_MAX_COMPLETION_IDS: usize = 256;

/// The doorbell queue spans 2^4 pages of host memory.
pub const CONFIG_PEXQ_BUF_PAGES: usize = 1 << 4;
pub const CONFIG_PEXQ_PAGE_SIZE: usize = 4096;
/// Number of 64-byte message slots in the doorbell queue.
pub const CONFIG_PEXQ_SLOTS: u16 = (CONFIG_PEXQ_BUF_PAGES * CONFIG_PEXQ_PAGE_SIZE / 64) as u16;
/// Ceiling on slots handed to the firmware but not yet reported complete.
pub const CONFIG_PEXQ_MAX_PENDING: u16 = CONFIG_PEXQ_SLOTS >> 2;
/// Every this many slots, a "report completion" message is injected.
pub const CONFIG_PEXQ_COMPLETION_THRESHOLD: u16 = CONFIG_PEXQ_MAX_PENDING >> 3;
/// Longest run of messages announced by one doorbell.
pub const CONFIG_PEXQ_MAX_RUN: u32 = 255;
/// Most doorbells rung by one submission.
pub const CONFIG_PEXQ_MAX_DOORBELLS: usize = 4;

/// Number of receive filter rules shared by the rx contexts of a function.
pub const CONFIG_MAX_SUPPORTED_FILTERS: u16 = 16;
/// Context tables are tracked with a 64-bit occupancy map.
pub const CONFIG_MAX_CONTEXT_SLOTS: usize = 64;


/// Timing of the command/response channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub udelay_us: u32,
    pub retry_count: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            udelay_us: CONFIG_CRB_UDELAY_US,
            retry_count: CONFIG_CRB_RETRY_COUNT,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), NxError> {
        if self.retry_count == 0 {
            return Err(NxError::InvalidArguments);
        }
        Ok(())
    }
}


/// Geometry and flow control of the doorbell submission queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of message slots, a power of two.
    pub slots: u16,
    pub max_pending: u16,
    /// A power of two no larger than `max_pending`.
    pub completion_threshold: u16,
    pub max_run: u32,
    /// Doorbells one submission may ring, this many inclusive. A batch that needs one more run fails.
    pub max_doorbells: usize,
    /// How many times a doorbell write is retried when its reflection does not match.
    /// `None` retries until the hardware acknowledges the write.
    pub doorbell_retry_limit: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            slots: CONFIG_PEXQ_SLOTS,
            max_pending: CONFIG_PEXQ_MAX_PENDING,
            completion_threshold: CONFIG_PEXQ_COMPLETION_THRESHOLD,
            max_run: CONFIG_PEXQ_MAX_RUN,
            max_doorbells: CONFIG_PEXQ_MAX_DOORBELLS,
            doorbell_retry_limit: None,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), NxError> {
        if !self.slots.is_power_of_two()
            || !self.completion_threshold.is_power_of_two()
            || self.max_pending == 0
            || self.max_pending > self.slots
            || self.completion_threshold > self.max_pending
            || self.max_run == 0
            || self.max_run > netxen_ethernet::message::DoorbellWord::MAX_MESSAGES
            || self.max_doorbells == 0
        {
            return Err(NxError::InvalidArguments);
        }
        Ok(())
    }

    /// Size in bytes of the message ring.
    pub fn ring_bytes(&self) -> usize {
        self.slots as usize * netxen_ethernet::message::MESSAGE_SIZE
    }
}


/// How long a request waits for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestConfig {
    pub wait_slice_ms: u32,
    pub wait_limit_ms: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        RequestConfig {
            wait_slice_ms: CONFIG_REQUEST_WAIT_SLICE_MS,
            wait_limit_ms: CONFIG_REQUEST_WAIT_LIMIT_MS,
        }
    }
}

impl RequestConfig {
    pub fn validate(&self) -> Result<(), NxError> {
        if self.wait_slice_ms == 0 || self.wait_limit_ms == 0 {
            return Err(NxError::InvalidArguments);
        }
        Ok(())
    }
}


/// The generation of the firmware's context creation interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// Contexts are created one at a time with CDRP commands.
    Cdrp,
    /// v3.4 firmware: an rx/tx pair is handed over in one legacy ring context,
    /// and the ring registers are fixed per PCI function.
    Legacy(LegacyCrbMap),
}

/// Everything needed to bring up a [`NicDevice`](crate::NicDevice) for one PCI function.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub pci_func: u8,
    pub protocol: ProtocolVersion,
    pub max_rx_contexts: usize,
    pub max_tx_contexts: usize,
    pub max_rds_per_ctx: usize,
    pub max_sds_per_ctx: usize,
    /// Number of rx queues the driver uses, which reduces the filter rules of rx context 0.
    pub num_rx_queues: u16,
    pub max_supported_filters: u16,
    /// Rx table ids that must never be handed out.
    pub rx_reserved_mask: u64,
    pub channel: ChannelConfig,
    pub queue: QueueConfig,
    pub request: RequestConfig,
}

impl DeviceConfig {
    pub fn new(pci_func: u8) -> DeviceConfig {
        DeviceConfig {
            pci_func,
            protocol: ProtocolVersion::Cdrp,
            max_rx_contexts: 8,
            max_tx_contexts: 8,
            max_rds_per_ctx: 3,
            max_sds_per_ctx: 8,
            num_rx_queues: 1,
            max_supported_filters: CONFIG_MAX_SUPPORTED_FILTERS,
            rx_reserved_mask: 0,
            channel: ChannelConfig::default(),
            queue: QueueConfig::default(),
            request: RequestConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), NxError> {
        if self.max_rx_contexts == 0 || self.max_rx_contexts > CONFIG_MAX_CONTEXT_SLOTS
            || self.max_tx_contexts == 0 || self.max_tx_contexts > CONFIG_MAX_CONTEXT_SLOTS
            || self.max_rds_per_ctx == 0 || self.max_sds_per_ctx == 0
            || self.num_rx_queues > self.max_supported_filters
        {
            return Err(NxError::InvalidArguments);
        }
        self.channel.validate()?;
        self.queue.validate()?;
        self.request.validate()
    }
}
