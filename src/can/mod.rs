//! SocketCAN transport layer
//!
//! A thin wrapper around a Linux SocketCAN raw endpoint. The socket layer
//! knows nothing about the servo protocol: it moves [`CanFrame`]s in and out
//! of the kernel, installs kernel-side receive filters, and runs an optional
//! background receive thread with a bounded poll so shutdown stays prompt.
//!
//! - [`frame`]: standard-frame and filter types plus `libc::can_frame`
//!   conversions
//! - [`socket`]: open/bind/filter/send/receive lifecycle on one interface

pub mod frame;
pub mod socket;

pub use frame::{CanFilter, CanFrame, CAN_SFF_MASK};
pub use socket::CanSocket;
