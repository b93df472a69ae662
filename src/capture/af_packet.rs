//! AF_PACKET socket implementation

use super::Capture;
use crate::{Error, Result};
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;
use tracing::debug;

/// Raw link-layer socket bound to one interface
pub struct AfPacketSocket {
    async_fd: AsyncFd<OwnedFd>,
    ifname: String,
    ifindex: i32,
    promisc: bool,
}

impl AfPacketSocket {
    /// Capture socket: receives every frame seen on `ifname`, in promiscuous
    /// mode
    pub fn capture(ifname: &str) -> Result<Self> {
        let mut socket = Self::open(ifname, (libc::ETH_P_ALL as u16).to_be())?;
        set_promisc(socket.async_fd.get_ref().as_raw_fd(), socket.ifindex, true)?;
        socket.promisc = true;
        Ok(socket)
    }

    /// Transmit-only socket; protocol 0 means the kernel queues nothing for
    /// it to read
    pub fn transmit(ifname: &str) -> Result<Self> {
        Self::open(ifname, 0)
    }

    fn open(ifname: &str, protocol_be: u16) -> Result<Self> {
        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                protocol_be as i32,
            )
        };
        if raw < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        // Closed on every early return below
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let ifindex = ifindex(fd.as_raw_fd(), ifname)?;

        let sockaddr = libc::sockaddr_ll {
            sll_family: libc::AF_PACKET as u16,
            sll_protocol: protocol_be,
            sll_ifindex: ifindex,
            sll_hatype: 0,
            sll_pkttype: 0,
            sll_halen: 0,
            sll_addr: [0; 8],
        };
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sockaddr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        debug!(interface = ifname, ifindex, "AF_PACKET socket bound");
        Ok(Self {
            async_fd: AsyncFd::new(fd)?,
            ifname: ifname.to_string(),
            ifindex,
            promisc: false,
        })
    }

    /// Receive one frame arriving on the interface
    ///
    /// Frames the host itself transmits on the interface are skipped.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.readable_mut().await?;

            let result = guard.try_io(|inner| {
                let mut from: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
                let mut from_len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
                let n = unsafe {
                    libc::recvfrom(
                        inner.get_ref().as_raw_fd(),
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                        0,
                        &mut from as *mut _ as *mut libc::sockaddr,
                        &mut from_len,
                    )
                };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok((n as usize, from.sll_pkttype))
                }
            });

            match result {
                Ok(Ok((_, pkttype))) if pkttype == libc::PACKET_OUTGOING as u8 => continue,
                Ok(Ok((len, _))) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }

    /// Transmit one frame
    pub async fn send(&mut self, frame: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self.async_fd.writable_mut().await?;

            let result = guard.try_io(|inner| {
                let n = unsafe {
                    libc::send(
                        inner.get_ref().as_raw_fd(),
                        frame.as_ptr() as *const libc::c_void,
                        frame.len(),
                        0,
                    )
                };
                if n < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match result {
                Ok(Ok(len)) => return Ok(len),
                Ok(Err(e)) => return Err(Error::Io(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

fn ifindex(fd: RawFd, ifname: &str) -> Result<i32> {
    let not_found = || Error::InterfaceNotFound {
        name: ifname.to_string(),
    };

    let name = CString::new(ifname).map_err(|_| not_found())?;
    let name = name.as_bytes_with_nul();

    let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
    if name.len() > ifr.ifr_name.len() {
        return Err(not_found());
    }
    for (dst, &src) in ifr.ifr_name.iter_mut().zip(name) {
        *dst = src as libc::c_char;
    }

    let ret = unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut ifr) };
    if ret < 0 {
        return Err(not_found());
    }

    Ok(unsafe { ifr.ifr_ifru.ifru_ifindex })
}

fn set_promisc(fd: RawFd, ifindex: i32, enable: bool) -> Result<()> {
    let mreq = libc::packet_mreq {
        mr_ifindex: ifindex,
        mr_type: libc::PACKET_MR_PROMISC as u16,
        mr_alen: 0,
        mr_address: [0; 8],
    };

    let optname = if enable {
        libc::PACKET_ADD_MEMBERSHIP
    } else {
        libc::PACKET_DROP_MEMBERSHIP
    };

    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            optname,
            &mreq as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    Ok(())
}

impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        if self.promisc {
            let _ = set_promisc(self.async_fd.get_ref().as_raw_fd(), self.ifindex, false);
        }
    }
}

impl Capture for AfPacketSocket {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        AfPacketSocket::recv(self, buf).await
    }

    async fn send(&mut self, frame: &[u8]) -> Result<usize> {
        AfPacketSocket::send(self, frame).await
    }
}

impl std::fmt::Debug for AfPacketSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AfPacketSocket")
            .field("ifname", &self.ifname)
            .field("ifindex", &self.ifindex)
            .field("promisc", &self.promisc)
            .finish()
    }
}
