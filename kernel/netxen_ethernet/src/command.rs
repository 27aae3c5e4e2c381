//! Defines the words exchanged through the CDRP control registers:
//! the command signature, the opcodes, the response codes and the firmware result codes.

use num_enum::TryFromPrimitive;

/// Version of the host interface that is encoded into every command signature.
pub const HOST_INTERFACE_VERSION: u8 = 1;

/// Fixed magic in the upper half of every command signature.
const SIGNATURE_MAGIC: u32 = 0xcafe;
/// Set by the host in the CDRP register when writing a command, cleared by the firmware when it responds.
const COMMAND_FLAG: u32 = 0x8000_0000;

/// Signature written to the legacy (v3.4 firmware) per-function context signature register.
pub const LEGACY_CONTEXT_SIGNATURE: u32 = 0x0002_dee0;
/// Written to the same register to make v3.4 firmware drop the ring context of a function.
pub const LEGACY_CONTEXT_RESET: u32 = 0xbad0;

/// Returns the signature word identifying the PCI function and interface version of a command.
pub const fn command_signature(pci_func: u8, version: u8) -> u32 {
    (pci_func as u32) | ((version as u32) << 8) | (SIGNATURE_MAGIC << 16)
}

/// Returns the word written to the CDRP register to start executing `opcode`.
pub const fn command_word(opcode: CdrpOpcode) -> u32 {
    COMMAND_FLAG | opcode as u32
}

/// Returns true if the CDRP register holds a response rather than a pending command.
pub const fn is_response(word: u32) -> bool {
    word & COMMAND_FLAG == 0
}


/// Command opcodes written by SW into the CDRP register.
#[derive(PartialEq, Eq, Debug, TryFromPrimitive, Copy, Clone)]
#[repr(u32)]
pub enum CdrpOpcode {
    SubmitCapabilities      = 0x01,
    ReadMaxRdsPerCtx        = 0x02,
    ReadMaxSdsPerCtx        = 0x03,
    ReadMaxRulesPerCtx      = 0x04,
    ReadMaxRxCtx            = 0x05,
    ReadMaxTxCtx            = 0x06,
    CreateRxCtx             = 0x07,
    DestroyRxCtx            = 0x08,
    CreateTxCtx             = 0x09,
    DestroyTxCtx            = 0x0a,
    SetupStatistics         = 0x0e,
    GetStatistics           = 0x0f,
    DeleteStatistics        = 0x10,
    ConfigGbePort           = 0x11,
    SetMtu                  = 0x12,
    ReadPhy                 = 0x13,
    WritePhy                = 0x14,
    ReadHwReg               = 0x15,
    GetFlowCtl              = 0x16,
    SetFlowCtl              = 0x17,
    ReadMaxMtu              = 0x18,
    ReadMaxLro              = 0x19,
    ConfigureToe            = 0x1a,
    FuncAttrib              = 0x1b,
    ReadPexqParameters      = 0x1c,
    GetLicenseCapabilities  = 0x1d,
    ReadMaxLroPerBoard      = 0x1e,
}


/// Response codes written by the firmware into the CDRP register.
#[derive(PartialEq, Eq, Debug, TryFromPrimitive, Copy, Clone)]
#[repr(u32)]
pub enum CdrpResponse {
    Ok      = 1,
    Fail    = 2,
    Timeout = 3,
}


/// Result codes used by the firmware, returned in argument register 1 when a command fails.
#[derive(PartialEq, Eq, Debug, TryFromPrimitive, Copy, Clone)]
#[repr(u32)]
pub enum FirmwareErrorCode {
    Success         = 0,
    NoHostMem       = 1,
    NoHostResource  = 2,
    NoCardCrb       = 3,
    NoCardMem       = 4,
    NoCardResource  = 5,
    InvalidArgs     = 6,
    InvalidAction   = 7,
    InvalidState    = 8,
    NotSupported    = 9,
    NotPermitted    = 10,
    NotReady        = 11,
    DoesNotExist    = 12,
    AlreadyExists   = 13,
    BadSignature    = 14,
    CmdNotImpl      = 15,
    CmdInvalid      = 16,
    Timeout         = 17,
    CmdFailed       = 18,
    FatalTemp       = 19,
    MaxExceeded     = 20,
}


/// The state of a host context as tracked by both the host and the firmware.
#[derive(PartialEq, Eq, Debug, TryFromPrimitive, Copy, Clone)]
#[repr(u32)]
pub enum HostCtxState {
    Freed       = 0,
    Allocated   = 1,
    Active      = 2,
    Disabled    = 3,
    Quiescent   = 4,
}


/// How the firmware should tear down a context, passed as the second argument of a destroy command.
#[derive(PartialEq, Eq, Debug, TryFromPrimitive, Copy, Clone)]
#[repr(u32)]
pub enum DestroyCommand {
    Reset   = 0,
    D3Reset = 1,
}


/// Interrupt CRB mode requested for a context.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u32)]
pub enum HostIntCrbMode {
    Unique  = 0,
    Shared  = 1,
    NoRx    = 2,
    NoTx    = 3,
    NoRxTx  = 4,
}

/// Receive descriptor producer CRB mode requested for an rx context.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u32)]
pub enum HostRdsCrbMode {
    Unique  = 0,
    Shared  = 1,
    Custom  = 2,
}

/// The kind of buffers posted on a receive descriptor ring.
#[derive(PartialEq, Eq, Debug, TryFromPrimitive, Copy, Clone)]
#[repr(u32)]
pub enum RdsRingKind {
    Normal  = 0,
    Jumbo   = 1,
    Lro     = 2,
}


bitflags! {
    /// The first capability word sent with context creation requests.
    pub struct Capabilities0: u32 {
        const LEGACY_CONTEXT    = 1 << 0;
        const MULTI_CONTEXT     = 1 << 1;
        const LEGACY_MN         = 1 << 2;
        const LEGACY_MS         = 1 << 3;
        const CUT_THROUGH       = 1 << 4;
        const LRO               = 1 << 5;
        const LSO               = 1 << 6;
        const JUMBO_CONTIGUOUS  = 1 << 7;
        const LRO_CONTIGUOUS    = 1 << 8;
    }
}
