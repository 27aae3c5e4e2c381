//! The host-side control core of a driver for NetXen (QLogic NX3031/NX2031) NICs.
//!
//! This crate does not move packets. It brings a PCI function of the adapter to the point
//! where packets can move, and lets the rest of the driver reconfigure it afterwards:
//! * [`cdrp`]: the register-based command/response channel to the firmware.
//! * [`context`]: allocation, creation and teardown of rx and tx hardware contexts.
//! * [`queries`]: single-command limit queries and port settings.
//! * [`pexq`]: the doorbell submission queue through which control messages are posted.
//! * [`request`]: NIC requests on top of that queue, and the matching of replies to waiters.
//!
//! Everything the core needs from the host kernel comes in through three traits:
//! register access ([`CrbAccess`], [`DoorbellPort`]), DMA memory ([`DmaAllocator`])
//! and time ([`Delay`]). The wire layouts live in the `netxen_ethernet` crate.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[macro_use] extern crate log;
#[macro_use] extern crate bitflags;
extern crate spin;
extern crate volatile;
extern crate bit_field;
extern crate zerocopy;
extern crate num_enum;
extern crate netxen_ethernet;

mod error;
pub mod config;
pub mod regs;
pub mod platform;
pub mod dma;
pub mod cdrp;
mod device;
pub mod context;
pub mod queries;
pub mod pexq;
pub mod request;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod test;

pub use config::{DeviceConfig, ProtocolVersion};
pub use context::{DestroyMode, RxContextHandle, TxContextHandle};
pub use device::NicDevice;
pub use dma::{DmaAllocator, DmaBuffer};
pub use error::NxError;
pub use pexq::SubmissionQueue;
pub use platform::Delay;
pub use regs::{CrbAccess, CrbLayout, DoorbellPort};
pub use request::ResponseEvent;
