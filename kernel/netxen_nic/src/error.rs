use netxen_ethernet::WireError;
use netxen_ethernet::command::FirmwareErrorCode;

/// Possible reasons for failure of an operation on the NIC core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NxError {
    /// A DMA or host allocation failed
    NoHostMemory,
    /// A host resource (queue slot, completion id) is exhausted; the call can be retried later
    NoHostResource,
    /// An argument was out of range or inconsistent
    InvalidArguments,
    /// The context is not in the lifecycle state the operation requires
    InvalidState,
    /// The firmware did not answer in time; the device is now considered dead
    Timeout,
    /// The hardware semaphore guarding the command registers could not be acquired
    LockTimeout,
    /// The firmware rejected the request, with the reason code it reported
    CommandFailed(u32),
    /// A context table or id space is full
    MaxExceeded,
    /// The submission queue has no completed slots to reclaim yet
    NotReady,
    /// The operation does not exist for the firmware generation in use
    NotSupported,
    /// The firmware wrote a response that could not be parsed
    MalformedResponse,
}

impl NxError {
    /// Returns the firmware result code that corresponds to this error.
    pub fn code(&self) -> FirmwareErrorCode {
        match self {
            NxError::NoHostMemory => FirmwareErrorCode::NoHostMem,
            NxError::NoHostResource => FirmwareErrorCode::NoHostResource,
            NxError::InvalidArguments => FirmwareErrorCode::InvalidArgs,
            NxError::InvalidState => FirmwareErrorCode::InvalidState,
            NxError::Timeout | NxError::LockTimeout => FirmwareErrorCode::Timeout,
            NxError::CommandFailed(code) => FirmwareErrorCode::try_from(*code)
                .unwrap_or(FirmwareErrorCode::CmdFailed),
            NxError::MaxExceeded => FirmwareErrorCode::MaxExceeded,
            NxError::NotReady => FirmwareErrorCode::NotReady,
            NxError::NotSupported => FirmwareErrorCode::NotSupported,
            NxError::MalformedResponse => FirmwareErrorCode::CmdFailed,
        }
    }

    /// Builds a `CommandFailed` error carrying the generic "command failed" reason.
    pub(crate) fn command_failed() -> NxError {
        NxError::CommandFailed(FirmwareErrorCode::CmdFailed as u32)
    }
}

impl From<WireError> for NxError {
    fn from(error: WireError) -> Self {
        match error {
            WireError::BufferTooSmall | WireError::OffsetOutOfBounds | WireError::RingCountMismatch => NxError::MalformedResponse,
            WireError::TooManyRings => NxError::InvalidArguments,
        }
    }
}

impl From<NxError> for &'static str {
    fn from(error: NxError) -> Self {
        match error {
            NxError::NoHostMemory => "Could not allocate host memory",
            NxError::NoHostResource => "Host resources are exhausted, retry later",
            NxError::InvalidArguments => "Invalid arguments",
            NxError::InvalidState => "Context is in the wrong state for this operation",
            NxError::Timeout => "Firmware did not respond in time",
            NxError::LockTimeout => "Timed out acquiring the hardware semaphore",
            NxError::CommandFailed(_) => "Firmware rejected the command",
            NxError::MaxExceeded => "Maximum number of contexts or ids exceeded",
            NxError::NotReady => "Submission queue has no completed slots",
            NxError::NotSupported => "Operation is not supported by this firmware",
            NxError::MalformedResponse => "Firmware response could not be parsed",
        }
    }
}

impl core::fmt::Display for NxError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let msg: &'static str = (*self).into();
        match self {
            NxError::CommandFailed(code) => write!(f, "{} (reason {:#x})", msg, code),
            _ => f.write_str(msg),
        }
    }
}
