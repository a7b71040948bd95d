//! Linux SocketCAN backend over a raw `PF_CAN` socket.
//!
//! Narrow frames map their four words little-endian onto the 8 data bytes;
//! wide frames carry their 64-bit word little-endian. Identifiers are standard
//! 11-bit ids.
use soc_traits::{AddressFilter, Bus, NarrowFrame, WideFrame};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::error::{BusError, Result};

pub struct SocketCanBus {
    fd: OwnedFd,
    interface: String,
}

impl SocketCanBus {
    /// Open a raw CAN socket bound to `interface` (e.g. `can0`, `vcan0`).
    pub fn open(interface: &str) -> Result<Self> {
        let name =
            CString::new(interface).map_err(|_| BusError::Interface(interface.to_string()))?;
        // SAFETY: `name` is a valid NUL-terminated string.
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            return Err(BusError::Interface(interface.to_string()));
        }

        // SAFETY: plain syscall; the returned descriptor is checked below.
        let raw = unsafe { libc::socket(libc::PF_CAN, libc::SOCK_RAW, libc::CAN_RAW) };
        if raw < 0 {
            return Err(io::Error::last_os_error().into());
        }
        // SAFETY: `raw` is a freshly opened descriptor we exclusively own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_can is plain old data; all-zero is a valid value.
        let mut addr: libc::sockaddr_can = unsafe { mem::zeroed() };
        addr.can_family = libc::AF_CAN as libc::sa_family_t;
        addr.can_ifindex = ifindex as libc::c_int;
        // SAFETY: `addr` is a properly initialised sockaddr_can of the given size.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&raw const addr).cast::<libc::sockaddr>(),
                mem::size_of::<libc::sockaddr_can>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
        tracing::info!(interface, ifindex, "socketcan bound");
        Ok(Self {
            fd,
            interface: interface.to_string(),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn set_filter(&self, filter: AddressFilter) -> Result<()> {
        let f = libc::can_filter {
            can_id: filter.id,
            can_mask: filter.mask,
        };
        // SAFETY: `f` outlives the call and the length matches its type.
        let rc = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_CAN_RAW,
                libc::CAN_RAW_FILTER,
                (&raw const f).cast::<libc::c_void>(),
                mem::size_of::<libc::can_filter>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    fn write_raw(&self, id: u32, len: u8, data: [u8; 8]) -> Result<()> {
        // SAFETY: can_frame is plain old data; all-zero is a valid value.
        let mut frame: libc::can_frame = unsafe { mem::zeroed() };
        frame.can_id = id;
        frame.can_dlc = len.min(8);
        frame.data = data;
        let size = mem::size_of::<libc::can_frame>();
        // SAFETY: writes exactly one initialised can_frame.
        let n = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                (&raw const frame).cast::<libc::c_void>(),
                size,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if n as usize != size {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short CAN write").into());
        }
        Ok(())
    }

    fn read_raw(&self) -> Result<(u32, u8, [u8; 8])> {
        // SAFETY: can_frame is plain old data; all-zero is a valid value.
        let mut frame: libc::can_frame = unsafe { mem::zeroed() };
        let size = mem::size_of::<libc::can_frame>();
        // SAFETY: the buffer is exactly one can_frame long.
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                (&raw mut frame).cast::<libc::c_void>(),
                size,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if n as usize != size {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short CAN read").into());
        }
        Ok((frame.can_id & libc::CAN_SFF_MASK, frame.can_dlc, frame.data))
    }
}

fn words_to_bytes(words: [u16; 4]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (chunk, w) in out.chunks_exact_mut(2).zip(words) {
        chunk.copy_from_slice(&w.to_le_bytes());
    }
    out
}

fn bytes_to_words(bytes: [u8; 8]) -> [u16; 4] {
    let mut out = [0u16; 4];
    for (w, chunk) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *w = u16::from_le_bytes([chunk[0], chunk[1]]);
    }
    out
}

impl Bus for SocketCanBus {
    fn bind(
        &mut self,
        filter: AddressFilter,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.set_filter(filter)?;
        Ok(())
    }

    fn send_narrow(
        &mut self,
        frame: &NarrowFrame,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_raw(frame.id, frame.len, words_to_bytes(frame.data))?;
        Ok(())
    }

    fn recv_narrow(
        &mut self,
    ) -> std::result::Result<NarrowFrame, Box<dyn std::error::Error + Send + Sync>> {
        let (id, len, data) = self.read_raw()?;
        Ok(NarrowFrame {
            id,
            len,
            data: bytes_to_words(data),
        })
    }

    fn send_wide(
        &mut self,
        frame: &WideFrame,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_raw(frame.id, frame.len, frame.data.to_le_bytes())?;
        Ok(())
    }

    fn recv_wide(
        &mut self,
    ) -> std::result::Result<WideFrame, Box<dyn std::error::Error + Send + Sync>> {
        let (id, len, data) = self.read_raw()?;
        Ok(WideFrame {
            id,
            len,
            data: u64::from_le_bytes(data),
        })
    }
}
