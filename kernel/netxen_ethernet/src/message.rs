//! Messages carried by the PEXQ doorbell queue and the words that describe them:
//! the 64-byte queue message, the doorbell word, and the NIC request/response headers.

use core::mem::size_of;
use core::ops::Range;
use bit_field::BitField;
use zerocopy::{AsBytes, FromBytes, Unaligned, U64};
use byteorder::LittleEndian;
use num_enum::TryFromPrimitive;

/// Number of 64-bit words in a message body.
pub const MESSAGE_BODY_WORDS: usize = 7;
/// Size of a queue message in bytes.
pub const MESSAGE_SIZE: usize = size_of::<QueueMessage>();

/// A fixed-size message as stored in a queue slot: one header word and seven body words.
#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct QueueMessage {
    hdr:    U64<LittleEndian>,
    body:   [U64<LittleEndian>; MESSAGE_BODY_WORDS],
}

const_assert_eq!(size_of::<QueueMessage>(), 64);

impl QueueMessage {
    pub fn new(hdr: u64, body: [u64; MESSAGE_BODY_WORDS]) -> QueueMessage {
        let mut msg = QueueMessage::new_zeroed();
        msg.hdr.set(hdr);
        for (word, value) in msg.body.iter_mut().zip(body) {
            word.set(value);
        }
        msg
    }

    pub fn hdr(&self) -> u64 {
        self.hdr.get()
    }

    pub fn set_hdr(&mut self, hdr: u64) {
        self.hdr.set(hdr);
    }

    /// Returns body word `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`MESSAGE_BODY_WORDS`].
    pub fn body(&self, index: usize) -> u64 {
        self.body[index].get()
    }

    pub fn set_body(&mut self, index: usize, value: u64) {
        self.body[index].set(value);
    }
}

impl core::fmt::Debug for QueueMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut body = [0u64; MESSAGE_BODY_WORDS];
        for (out, word) in body.iter_mut().zip(self.body.iter()) {
            *out = word.get();
        }
        f.debug_struct("QueueMessage")
            .field("hdr", &format_args!("{:#x}", self.hdr.get()))
            .field("body", &format_args!("{:x?}", body))
            .finish()
    }
}


/// Message size classes understood by the doorbell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum QwordsPerMessage {
    Two     = 0,
    Four    = 1,
    Eight   = 2,
}

/// A value written to a PEXQ doorbell register, describing a run of contiguous messages
/// in host memory that the firmware should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorbellWord(u64);

impl DoorbellWord {
    const ADDR_BITS: Range<u8> = 0..40;
    const NUM_MSGS_BITS: Range<u8> = 40..48;
    const MSG_SIZE_BITS: Range<u8> = 48..50;
    const DISABLE_COMPL_BIT: u8 = 51;
    const COMPL_HDR_FROM_REG_BIT: u8 = 52;
    const DATA_IN_HOST_BIT: u8 = 53;

    /// The largest number of messages that one doorbell can announce.
    pub const MAX_MESSAGES: u32 = 0xff;

    /// Builds the doorbell word for `num_msgs` 64-byte messages starting at physical address `addr`.
    /// Inline completions are disabled, the completion header comes from the register,
    /// and the data is fetched from host memory.
    pub fn for_host_messages(addr: u64, num_msgs: u32) -> DoorbellWord {
        let mut word = 0u64;
        word.set_bits(Self::ADDR_BITS, addr.get_bits(Self::ADDR_BITS));
        word.set_bits(Self::NUM_MSGS_BITS, (num_msgs & Self::MAX_MESSAGES) as u64);
        word.set_bits(Self::MSG_SIZE_BITS, QwordsPerMessage::Eight as u64);
        word.set_bit(Self::DISABLE_COMPL_BIT, true);
        word.set_bit(Self::COMPL_HDR_FROM_REG_BIT, true);
        word.set_bit(Self::DATA_IN_HOST_BIT, true);
        DoorbellWord(word)
    }

    pub fn from_raw(word: u64) -> DoorbellWord {
        DoorbellWord(word)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn address(&self) -> u64 {
        self.0.get_bits(Self::ADDR_BITS)
    }

    pub fn num_messages(&self) -> u32 {
        self.0.get_bits(Self::NUM_MSGS_BITS) as u32
    }
}


/// Builds the body of a "report completion" message. When the firmware executes it,
/// a DMA engine copies the card's flow-control word for the slot after `slot`
/// (which holds the current consumer index) into the host completion word at `compl_in_paddr`.
pub fn completion_report_body(
    slot: u16,
    num_slots: u16,
    pci_func: u16,
    card_fc_array: u64,
    compl_in_paddr: u64,
) -> [u64; MESSAGE_BODY_WORDS] {
    let pci_func = pci_func as u64;
    let next = (slot as u64 + 1) % num_slots as u64;

    let mut control = 0u64;
    control.set_bits(0..26, 8);                              // transfer length
    control.set_bits(26..48, pci_func >> 2);
    let mut flags = 4u64;                                    // card to host
    flags |= (pci_func & 0x3) << 4;
    flags.set_bit(14, true);                                 // end of chain
    flags.set_bit(15, true);                                 // command valid
    control |= flags << 48;

    let mut body = [0u64; MESSAGE_BODY_WORDS];
    body[0] = control;
    body[1] = card_fc_array + 8 * next;
    body[2] = compl_in_paddr;
    body
}


/// Queue message opcode marking a NIC request for the firmware's NIC handler.
pub const NX_NIC_HOST_REQUEST: u8 = 0x13;
/// Older queue message opcode, still used for L2 MAC filter changes.
pub const NIC_REQUEST: u8 = 0x14;
/// Request header opcode used together with [`NIC_REQUEST`] for L2 MAC filter changes.
pub const MAC_EVENT: u8 = 1;

/// Host-to-card NIC request opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum H2cOpcode {
    ConfigRss                   = 1,
    ConfigRssTbl                = 2,
    ConfigIntrCoalesce          = 3,
    ConfigLed                   = 4,
    ConfigPromiscuous           = 5,
    ConfigL2Mac                 = 6,
    LroRequest                  = 7,
    GetSnmpStats                = 8,
    ProxyStartRequest           = 9,
    ProxyStopRequest            = 10,
    ProxySetMtu                 = 11,
    ProxySetVportMissMode       = 12,
    GetFingerPrintRequest       = 13,
    InstallLicenseRequest       = 14,
    GetLicenseCapabilityRequest = 15,
    GetNetStatsRequest          = 16,
    ProxyUpdateP2v              = 17,
    ConfigIpaddr                = 18,
    ConfigLoopback              = 19,
    ProxyStopDone               = 20,
    GetLinkevent                = 21,
    ConfigBridging              = 23,
}

/// Card-to-host NIC response opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum C2hOpcode {
    ConfigRssResponse               = 129,
    ConfigRssTblResponse            = 130,
    ConfigMacResponse               = 131,
    ConfigPromiscuousResponse       = 132,
    ConfigL2MacResponse             = 133,
    LroDeleteResponse               = 134,
    LroAddFailureResponse           = 135,
    GetSnmpStats                    = 136,
    GetFingerPrintReply             = 137,
    InstallLicenseReply             = 138,
    GetLicenseCapabilitiesReply     = 139,
    GetNetStatsResponse             = 140,
    GetLinkeventResponse            = 141,
}


/// The queue header word of a NIC request message, which routes it to a firmware queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestQueueHeader {
    pub dst_minor: u32,
    pub dst_subq: bool,
    pub dst_major: u8,
    pub opcode: u8,
    pub msginfo: u32,
    pub qmsg_type: u8,
}

impl RequestQueueHeader {
    pub fn to_word(&self) -> u64 {
        let mut word = 0u64;
        word.set_bits(0..18, self.dst_minor as u64 & 0x3_ffff);
        word.set_bit(18, self.dst_subq);
        word.set_bits(19..23, self.dst_major as u64 & 0xf);
        word.set_bits(23..29, self.opcode as u64 & 0x3f);
        word.set_bits(32..56, self.msginfo as u64 & 0xff_ffff);
        word.set_bits(58..64, self.qmsg_type as u64 & 0x3f);
        word
    }

    pub fn from_word(word: u64) -> RequestQueueHeader {
        RequestQueueHeader {
            dst_minor: word.get_bits(0..18) as u32,
            dst_subq: word.get_bit(18),
            dst_major: word.get_bits(19..23) as u8,
            opcode: word.get_bits(23..29) as u8,
            msginfo: word.get_bits(32..56) as u32,
            qmsg_type: word.get_bits(58..64) as u8,
        }
    }
}


/// The first body word of a NIC request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NicRequestHeader {
    pub opcode: u8,
    pub comp_id: u8,
    pub ctx_id: u16,
    pub need_completion: bool,
    pub sub_opcode: u8,
}

impl NicRequestHeader {
    pub fn to_word(&self) -> u64 {
        let mut word = 0u64;
        word.set_bits(0..8, self.opcode as u64);
        word.set_bits(8..16, self.comp_id as u64);
        word.set_bits(16..32, self.ctx_id as u64);
        word.set_bit(32, self.need_completion);
        word.set_bits(56..64, self.sub_opcode as u64);
        word
    }

    pub fn from_word(word: u64) -> NicRequestHeader {
        NicRequestHeader {
            opcode: word.get_bits(0..8) as u8,
            comp_id: word.get_bits(8..16) as u8,
            ctx_id: word.get_bits(16..32) as u16,
            need_completion: word.get_bit(32),
            sub_opcode: word.get_bits(56..64) as u8,
        }
    }
}


/// Number of body words in a NIC response. Link events use both.
pub const RESPONSE_BODY_WORDS: usize = 2;

/// A NIC response from the card: a header word and the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NicResponse {
    pub hdr: u64,
    pub body: [u64; RESPONSE_BODY_WORDS],
}

impl NicResponse {
    pub fn new(hdr: u64, body: [u64; RESPONSE_BODY_WORDS]) -> NicResponse {
        NicResponse { hdr, body }
    }

    /// A response whose body is a single word, which covers every reply except link events.
    pub fn with_word(hdr: u64, word: u64) -> NicResponse {
        NicResponse { hdr, body: [word, 0] }
    }

    /// Builds a response header the way the firmware lays it out.
    pub fn header_word(opcode: u8, comp_id: u8, error_code: u16) -> u64 {
        let mut word = 0u64;
        word.set_bits(16..32, error_code as u64);
        word.set_bits(32..40, opcode as u64);
        word.set_bits(40..48, comp_id as u64);
        word
    }

    pub fn error_code(&self) -> u16 {
        self.hdr.get_bits(16..32) as u16
    }

    pub fn opcode(&self) -> u8 {
        self.hdr.get_bits(32..40) as u8
    }

    pub fn comp_id(&self) -> u8 {
        self.hdr.get_bits(40..48) as u8
    }

    pub fn desc_cnt(&self) -> u8 {
        self.hdr.get_bits(53..56) as u8
    }

    pub fn qmsg_type(&self) -> u8 {
        self.hdr.get_bits(58..64) as u8
    }
}


/// The body of a link event response.
///
/// The first body word describes the cable and the speed, the second one the link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEvent {
    pub cable_oui: u32,
    pub cable_len: u16,
    /// In Mbps.
    pub link_speed: u16,
    pub link_up: bool,
    pub module: u8,
    pub full_duplex: bool,
    pub autoneg: bool,
}

impl LinkEvent {
    pub fn from_body(body: &[u64; RESPONSE_BODY_WORDS]) -> LinkEvent {
        let cable = body[0];
        let status = body[1].to_le_bytes();
        LinkEvent {
            cable_oui: cable.get_bits(0..32) as u32,
            cable_len: cable.get_bits(32..48) as u16,
            link_speed: cable.get_bits(48..64) as u16,
            link_up: status[0] != 0,
            module: status[1],
            full_duplex: status[2] != 0,
            autoneg: status[3] != 0,
        }
    }

    pub fn to_body(&self) -> [u64; RESPONSE_BODY_WORDS] {
        let mut cable = 0u64;
        cable.set_bits(0..32, self.cable_oui as u64);
        cable.set_bits(32..48, self.cable_len as u64);
        cable.set_bits(48..64, self.link_speed as u64);
        let status = u64::from_le_bytes([
            self.link_up as u8,
            self.module,
            self.full_duplex as u8,
            self.autoneg as u8,
            0, 0, 0, 0,
        ]);
        [cable, status]
    }
}


/// Operation requested on an L2 MAC filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum MacOp {
    Noop    = 0,
    Add     = 1,
    Delete  = 2,
}

/// An L2 MAC filter change, packed into one request body word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacRequest {
    pub op: MacOp,
    pub tag: u8,
    pub mac_addr: [u8; 6],
}

impl MacRequest {
    pub fn to_word(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[0] = self.op as u8;
        bytes[1] = self.tag;
        bytes[2..].copy_from_slice(&self.mac_addr);
        u64::from_le_bytes(bytes)
    }

    pub fn from_word(word: u64) -> Option<MacRequest> {
        let bytes = word.to_le_bytes();
        let mut mac_addr = [0u8; 6];
        mac_addr.copy_from_slice(&bytes[2..]);
        Some(MacRequest {
            op: MacOp::try_from(bytes[0]).ok()?,
            tag: bytes[1],
            mac_addr,
        })
    }
}
