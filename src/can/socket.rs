//! Raw SocketCAN endpoint
//!
//! Wraps one bound CAN_RAW socket with the lifecycle a board needs:
//! `open -> set_filters -> start_receiving -> ... -> close`. The receive
//! thread polls with a 10 ms timeout so `stop_receiving` and `close` return
//! within one poll interval even when the bus is silent.
//!
//! # Locking
//!
//! `open`, `close` and `set_filters` serialize on a mutex protecting the
//! file descriptor so the receive loop can never observe a torn fd. `send`
//! and the receive path snapshot the descriptor under the lock and perform
//! the blocking syscall outside it; the kernel makes concurrent `write` and
//! `read` on one CAN socket safe. The `receiving` flag is atomic and is
//! consulted without the mutex.
//!
//! # Ordering
//!
//! After `stop_receiving` returns, the receive callback is not invoked
//! again: the flag is cleared before the thread is joined, and the loop
//! re-checks it after every poll before dispatching.

use crate::can::frame::{CanFilter, CanFrame};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Poll timeout for the background receive loop; bounds shutdown latency
const RX_POLL_TIMEOUT_MS: i32 = 10;

/// Frame receive callback invoked from the background receive thread
pub type ReceiveCallback = Box<dyn Fn(CanFrame) + Send + Sync + 'static>;

/// A raw SocketCAN endpoint bound to one interface
pub struct CanSocket {
    interface: String,
    fd: Mutex<Option<RawFd>>,
    receiving: AtomicBool,
    rx_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CanSocket {
    /// Create an unopened socket for the named interface
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            fd: Mutex::new(None),
            receiving: AtomicBool::new(false),
            rx_handle: Mutex::new(None),
        }
    }

    /// CAN interface name this socket binds to
    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    /// Whether the socket is open and bound
    pub fn is_open(&self) -> bool {
        self.fd.lock().is_some()
    }

    /// Whether the background receive thread is live
    pub fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::Relaxed)
    }

    /// Create, bind and keep a CAN_RAW socket on the configured interface
    ///
    /// Idempotent: opening an already-open socket succeeds without side
    /// effects.
    pub fn open(&self) -> Result<()> {
        let mut guard = self.fd.lock();
        if guard.is_some() {
            return Ok(());
        }

        let ifname = CString::new(self.interface.as_str())
            .map_err(|_| Error::InterfaceNotFound(self.interface.clone()))?;

        let fd = unsafe { libc::socket(libc::PF_CAN, libc::SOCK_RAW, libc::CAN_RAW) };
        if fd < 0 {
            return Err(Error::SocketCreate(io::Error::last_os_error()));
        }

        let ifindex = unsafe { libc::if_nametoindex(ifname.as_ptr()) };
        if ifindex == 0 {
            unsafe { libc::close(fd) };
            return Err(Error::InterfaceNotFound(self.interface.clone()));
        }

        let mut addr: libc::sockaddr_can = unsafe { mem::zeroed() };
        addr.can_family = libc::AF_CAN as libc::sa_family_t;
        addr.can_ifindex = ifindex as libc::c_int;

        let bound = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_can as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_can>() as libc::socklen_t,
            )
        };
        if bound < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(Error::SocketBind {
                interface: self.interface.clone(),
                source: err,
            });
        }

        log::debug!("Opened CAN socket on {}", self.interface);
        *guard = Some(fd);
        Ok(())
    }

    /// Stop receiving, then close the file descriptor
    ///
    /// Idempotent; safe to call on a never-opened socket.
    pub fn close(&self) {
        self.stop_receiving();

        let mut guard = self.fd.lock();
        if let Some(fd) = guard.take() {
            unsafe { libc::close(fd) };
            log::debug!("Closed CAN socket on {}", self.interface);
        }
    }

    /// Install the kernel-side receive filter list
    ///
    /// Must be called while the socket is open, normally before
    /// `start_receiving`.
    pub fn set_filters(&self, filters: &[CanFilter]) -> Result<()> {
        let fd = (*self.fd.lock()).ok_or(Error::SocketClosed)?;

        let raw: Vec<libc::can_filter> = filters.iter().map(CanFilter::to_raw).collect();
        let set = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_CAN_RAW,
                libc::CAN_RAW_FILTER,
                raw.as_ptr() as *const libc::c_void,
                mem::size_of_val(raw.as_slice()) as libc::socklen_t,
            )
        };
        if set < 0 {
            return Err(Error::FilterSetup(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Write exactly one frame
    ///
    /// A partial kernel write is a hard error for that frame; callers log
    /// and do not retry.
    pub fn send(&self, frame: &CanFrame) -> Result<()> {
        let fd = (*self.fd.lock()).ok_or(Error::SocketClosed)?;

        let raw = frame.to_raw();
        let expected = mem::size_of::<libc::can_frame>();
        let written = unsafe {
            libc::write(fd, &raw as *const libc::can_frame as *const libc::c_void, expected)
        };
        if written < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        if written as usize != expected {
            return Err(Error::WriteShort {
                written: written as usize,
                expected,
            });
        }
        Ok(())
    }

    /// Blocking single-frame read with an optional poll timeout
    ///
    /// Returns `None` on timeout, on a short read, or when the socket is
    /// closed underneath the caller. A non-positive timeout blocks until a
    /// frame arrives.
    pub fn receive_one(&self, timeout_ms: i32) -> Option<CanFrame> {
        let fd = (*self.fd.lock())?;

        if timeout_ms > 0 {
            let mut pfd = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if ready <= 0 {
                return None;
            }
        }

        // Re-check under the lock: close() may have raced with the poll and
        // the descriptor number may even have been reused.
        let guard = self.fd.lock();
        match *guard {
            Some(current) if current == fd => {}
            _ => return None,
        }

        let mut raw: libc::can_frame = unsafe { mem::zeroed() };
        let expected = mem::size_of::<libc::can_frame>();
        let read = unsafe {
            libc::read(fd, &mut raw as *mut libc::can_frame as *mut libc::c_void, expected)
        };
        if read as usize != expected {
            return None;
        }

        CanFrame::from_raw(&raw)
    }

    /// Spawn the background receive thread
    ///
    /// The callback runs on that thread for every received standard data
    /// frame, as long as `receiving` is still set when the frame arrives.
    pub fn start_receiving(self: &Arc<Self>, callback: ReceiveCallback) -> Result<()> {
        if self.receiving.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        if !self.is_open() {
            self.receiving.store(false, Ordering::Relaxed);
            return Err(Error::SocketClosed);
        }

        let socket = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("can-rx-{}", self.interface))
            .spawn(move || {
                while socket.receiving.load(Ordering::Relaxed) {
                    if let Some(frame) = socket.receive_one(RX_POLL_TIMEOUT_MS) {
                        if socket.receiving.load(Ordering::Relaxed) {
                            callback(frame);
                        }
                    }
                }
            });

        match handle {
            Ok(handle) => {
                *self.rx_handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.receiving.store(false, Ordering::Relaxed);
                Err(Error::Io(e))
            }
        }
    }

    /// Stop the background receive thread and join it
    ///
    /// Safe to call when not receiving; returns once the callback can no
    /// longer be invoked.
    pub fn stop_receiving(&self) {
        if !self.receiving.swap(false, Ordering::Relaxed) {
            return;
        }
        if let Some(handle) = self.rx_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CanSocket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests exercise the closed/degraded paths so they hold on hosts
    // without a CAN interface configured.

    #[test]
    fn test_open_unknown_interface() {
        let socket = CanSocket::new("can-does-not-exist");
        match socket.open() {
            Err(Error::InterfaceNotFound(name)) => assert_eq!(name, "can-does-not-exist"),
            other => panic!("expected InterfaceNotFound, got {:?}", other.err()),
        }
        assert!(!socket.is_open());
    }

    #[test]
    fn test_send_while_closed() {
        let socket = CanSocket::new("can-does-not-exist");
        let frame = CanFrame::new(0x10, &[0x13]).unwrap();
        assert!(matches!(socket.send(&frame), Err(Error::SocketClosed)));
    }

    #[test]
    fn test_set_filters_while_closed() {
        let socket = CanSocket::new("can-does-not-exist");
        let result = socket.set_filters(&[CanFilter::exact(0x10)]);
        assert!(matches!(result, Err(Error::SocketClosed)));
    }

    #[test]
    fn test_start_receiving_while_closed() {
        let socket = Arc::new(CanSocket::new("can-does-not-exist"));
        let result = socket.start_receiving(Box::new(|_| {}));
        assert!(matches!(result, Err(Error::SocketClosed)));
        assert!(!socket.is_receiving());
    }

    #[test]
    fn test_close_and_stop_are_idempotent() {
        let socket = CanSocket::new("can-does-not-exist");
        assert_eq!(socket.interface_name(), "can-does-not-exist");
        socket.stop_receiving();
        socket.close();
        socket.close();
        assert!(!socket.is_open());
    }

    #[test]
    fn test_receive_one_while_closed() {
        let socket = CanSocket::new("can-does-not-exist");
        assert!(socket.receive_one(1).is_none());
    }
}
