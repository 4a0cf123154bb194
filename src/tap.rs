//! TAP device access and the readiness notifier.
//!
//! The data path is a plain file descriptor: raw Ethernet frames, no
//! metadata header (`IFF_NO_PI`), non-blocking. Everything here speaks
//! `std::io::Error`; policy (abort vs log-and-continue) lives with the
//! callers.

use std::ffi::CStr;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

// _IOW('T', 202, int)
const TUNSETIFF: libc::c_ulong = 0x4004_54CA;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;

/// A Layer-2 virtual interface handle.
///
/// Usually opened through `/dev/net/tun`, but any frame-granular,
/// readable/writable descriptor works (pre-created interfaces, test
/// socketpairs), which is what [`TapDevice::from_fd`] is for.
pub struct TapDevice {
    fd: OwnedFd,
    name: String,
}

impl TapDevice {
    /// Create a TAP interface named `requested` (or kernel-assigned when
    /// empty) and set it non-blocking.
    pub fn open(requested: &str) -> io::Result<Self> {
        let raw = unsafe {
            libc::open(c"/dev/net/tun".as_ptr(), libc::O_RDWR | libc::O_CLOEXEC)
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
        if requested.len() >= req.ifr_name.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("interface name too long: {requested}"),
            ));
        }
        for (dst, src) in req.ifr_name.iter_mut().zip(requested.bytes()) {
            *dst = src as libc::c_char;
        }
        req.ifr_ifru.ifru_flags = IFF_TAP | IFF_NO_PI;

        if unsafe { libc::ioctl(fd.as_raw_fd(), TUNSETIFF as _, &mut req) } < 0 {
            return Err(io::Error::last_os_error());
        }

        // The kernel may have picked the name (e.g. "tap%d" patterns).
        let name = unsafe { CStr::from_ptr(req.ifr_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        set_nonblocking(fd.as_raw_fd())?;
        Ok(Self { fd, name })
    }

    /// Wrap an externally obtained frame descriptor, forcing it
    /// non-blocking.
    pub fn from_fd(fd: OwnedFd, name: &str) -> io::Result<Self> {
        set_nonblocking(fd.as_raw_fd())?;
        Ok(Self {
            fd,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read one frame. `WouldBlock` means the device is drained.
    pub fn read_frame(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

impl AsRawFd for TapDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Write one frame to a peer descriptor.
///
/// The fd number is immutable after setup, so directions can hold each
/// other's write target without sharing the device itself.
pub fn write_frame(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Zero-timeout readability notifier for one descriptor, backed by epoll.
pub struct ReadinessPoller {
    epoll: OwnedFd,
}

impl ReadinessPoller {
    pub fn new(watch_fd: RawFd) -> io::Result<Self> {
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let epoll = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: watch_fd as u64,
        };
        if unsafe {
            libc::epoll_ctl(epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, watch_fd, &mut event)
        } < 0
        {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epoll })
    }

    /// Whether the watched descriptor is readable right now. Never blocks.
    pub fn readable_now(&self) -> io::Result<bool> {
        let mut events: [libc::epoll_event; 1] = unsafe { std::mem::zeroed() };
        let n = unsafe { libc::epoll_wait(self.epoll.as_raw_fd(), events.as_mut_ptr(), 1, 0) };
        if n < 0 {
            let err = io::Error::last_os_error();
            // A signal between ticks is not an error worth surfacing.
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(n > 0 && events[0].events & libc::EPOLLIN as u32 != 0)
    }
}
