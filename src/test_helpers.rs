#![cfg(any(test, feature = "test-internals"))]
#![allow(dead_code)] // Helpers are shared by library tests, not the binary.

//! Shared fixtures for exercising the pipeline without TAP privileges.
//!
//! A `TestLink` stands in for one direction: a datagram socketpair plays
//! the TAP device (datagrams keep frame boundaries) and a second pair
//! plays the peer interface.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::endpoint::TapEndpoint;
use crate::frame::MAX_FRAME_LEN;
use crate::link::LinkConfig;
use crate::shaper::LinkShaper;
use crate::stats::DirectionStats;
use crate::tap::{TapDevice, write_frame};

/// A connected, non-blocking `AF_UNIX` datagram pair.
pub fn socketpair_fds() -> (OwnedFd, OwnedFd) {
    let mut fds = [0i32; 2];
    let rc = unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            0,
            fds.as_mut_ptr(),
        )
    };
    assert_eq!(rc, 0, "socketpair: {}", std::io::Error::last_os_error());
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

/// A deterministic shaper for a given parameter set.
pub fn seeded_shaper(config: LinkConfig, seed: u64) -> LinkShaper {
    LinkShaper::with_rng(config, StdRng::seed_from_u64(seed))
}

/// A syntactically plausible Ethernet frame: MACs, IPv4 EtherType, then a
/// counter-patterned payload.
pub fn test_frame(len: usize) -> Vec<u8> {
    assert!((14..=MAX_FRAME_LEN).contains(&len));
    let mut data = vec![0u8; len];
    data[..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    data[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    data[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
    for (i, byte) in data[14..].iter_mut().enumerate() {
        *byte = i as u8;
    }
    data
}

/// One direction of the emulator wired to in-process descriptors.
pub struct TestLink {
    pub endpoint: TapEndpoint,
    /// Frames written here appear on the endpoint's "TAP".
    inject: OwnedFd,
    /// The peer interface the endpoint writes into. Held to keep the fd
    /// alive for the endpoint's lifetime.
    peer: OwnedFd,
    /// Frames the endpoint forwarded arrive here.
    receive: OwnedFd,
}

impl TestLink {
    pub fn new(config: LinkConfig) -> Self {
        Self::build(config, None)
    }

    /// A link whose delay queue holds at most `capacity` frames.
    pub fn with_queue_capacity(config: LinkConfig, capacity: usize) -> Self {
        Self::build(config, Some(capacity))
    }

    fn build(config: LinkConfig, capacity: Option<usize>) -> Self {
        let (tap_end, inject) = socketpair_fds();
        let (peer, receive) = socketpair_fds();

        let dev = TapDevice::from_fd(tap_end, "testtap").expect("wrap test fd");
        let mut endpoint = TapEndpoint::new(dev, config.clone(), DirectionStats::new())
            .expect("create endpoint")
            .with_shaper(seeded_shaper(config, 42));
        if let Some(capacity) = capacity {
            endpoint = endpoint.with_queue_capacity(capacity);
        }
        endpoint.set_peer(peer.as_raw_fd());

        Self {
            endpoint,
            inject,
            peer,
            receive,
        }
    }

    pub fn inject_frame(&self, payload: &[u8]) {
        write_frame(self.inject.as_raw_fd(), payload).expect("inject frame");
    }

    /// One forwarded frame, if any is waiting.
    pub fn try_receive(&self) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; MAX_FRAME_LEN];
        let n = unsafe {
            libc::read(
                self.receive.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock, "receive: {err}");
            return None;
        }
        buf.truncate(n as usize);
        Some(buf)
    }

    /// Drain everything currently forwarded.
    pub fn drain_received(&self) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| self.try_receive()).collect()
    }
}
