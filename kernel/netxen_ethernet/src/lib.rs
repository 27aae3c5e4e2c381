//! This crate defines the layout of memory objects that make up the software interface between
//! the NetXen NIC's embedded control processor and the host driver,
//! as well as functions to encode and decode the different fields of these objects.
//!
//! There are two ways the host talks to the firmware:
//! * the CDRP (command descriptor/response protocol) which passes a few 32-bit words through
//!   control registers and, for context creation, a pointer to a request structure in host memory.
//!   See [`command`] and [`context`].
//! * the PEXQ doorbell queue, a ring of 64-byte messages in host memory that the firmware
//!   pulls after a doorbell write. See [`message`].
//!
//! All multi-byte fields are little-endian on the wire.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use] extern crate static_assertions;
#[macro_use] extern crate bitflags;
extern crate zerocopy;
extern crate byteorder;
extern crate bit_field;
extern crate num_enum;

pub mod command;
pub mod context;
pub mod legacy;
pub mod message;


/// Possible reasons for failure when encoding or decoding a wire structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// The buffer is smaller than the structure being encoded or decoded
    BufferTooSmall,
    /// More rings were given than the layout can describe
    TooManyRings,
    /// An offset field in a response points outside the response buffer
    OffsetOutOfBounds,
    /// A response reports more rings than were requested
    RingCountMismatch,
}

impl From<WireError> for &'static str {
    fn from(error: WireError) -> Self {
        match error {
            WireError::BufferTooSmall => "Buffer is too small for the wire structure",
            WireError::TooManyRings => "Too many rings for the wire structure",
            WireError::OffsetOutOfBounds => "Ring offset points outside of the response buffer",
            WireError::RingCountMismatch => "Response reports more rings than were requested",
        }
    }
}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str((*self).into())
    }
}
