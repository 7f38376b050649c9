//! Basic TCP socket stuff made a bit less boring.

use std::mem::{size_of, size_of_val, zeroed};
use std::net::Ipv4Addr;
use libc::{bind, c_void, close, fcntl, listen, setsockopt, sockaddr, sockaddr_in, socket,
    AF_INET, EAGAIN, EINTR, EWOULDBLOCK, F_GETFL, F_SETFL, INADDR_ANY, IPPROTO_TCP, O_NONBLOCK,
    SOCK_STREAM, SOL_SOCKET, SO_REUSEADDR, SO_REUSEPORT, TCP_NODELAY};
use crate::util::{error, error_str};

/// Owned endpoint descriptor. The wrapper guarantees release on every
/// exit path because dropping it closes the descriptor.
pub struct Fd(i32);

impl Fd {
    pub fn new(fd: i32) -> Fd {
        Fd(fd)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        if self.0 != -1 {
            // May be already closed, just ignore errors
            unsafe { close(self.0); }
        }
    }
}

/// Open the listening endpoint. SO_REUSEPORT lets several independent
/// instances bind the same port and have the kernel spread incoming
/// connections across them, which is how this server scales past one
/// core.
pub fn tcp_server(port: u16, bindaddr: &str, backlog: i32) -> Result<i32, String> {
    let mut _sock = -1;
    let on = 1;
    let mut sa: sockaddr_in;

    unsafe {
        _sock = socket(AF_INET, SOCK_STREAM, 0);
        if _sock == -1 {
            return Err(format!("socket: {}", error_str()));
        }
        if setsockopt(_sock, SOL_SOCKET, SO_REUSEADDR, &on as *const _ as *const c_void, size_of::<i32>() as u32) == -1 {
            close(_sock);
            return Err(format!("setsockopt SO_REUSEADDR: {}", error_str()));
        }
        if setsockopt(_sock, SOL_SOCKET, SO_REUSEPORT, &on as *const _ as *const c_void, size_of::<i32>() as u32) == -1 {
            close(_sock);
            return Err(format!("setsockopt SO_REUSEPORT: {}", error_str()));
        }
        sa = zeroed();
        sa.sin_family = AF_INET as u16;
        sa.sin_port = port.to_be();     // Network byte order is big endian, or most significant byte first
        sa.sin_addr.s_addr = INADDR_ANY.to_be();
        if !bindaddr.is_empty() {
            let addr: Ipv4Addr;
            match bindaddr.parse() {
                Ok(a) => {
                    addr = a;
                    sa.sin_addr.s_addr = u32::from(addr).to_be();
                },
                Err(e) => {
                    close(_sock);
                    return Err(format!("Invalid bind address '{}': {}", bindaddr, e));
                },
            }
        }

        if bind(_sock, &sa as *const _ as *const sockaddr, size_of::<sockaddr>() as u32) == -1 {
            close(_sock);
            return Err(format!("bind: {}", error_str()));
        }

        if listen(_sock, backlog) == -1 {
            close(_sock);
            return Err(format!("listen: {}", error_str()));
        }
    }
    Ok(_sock)
}

/// Accept one connection. `Ok(None)` means the nonblocking listener is
/// drained; the caller's accept loop stops there.
pub fn accept(serversock: i32) -> Result<Option<(i32, u32, u16)>, String> {
    let mut sa: sockaddr_in;
    loop {
        unsafe {
            sa = zeroed();
            let mut len = size_of::<sockaddr>() as u32;
            let fd = libc::accept(serversock, &mut sa as *mut _ as *mut sockaddr, &mut len);
            if fd == -1 {
                if error() == EINTR {
                    continue;
                }
                if error() == EAGAIN || error() == EWOULDBLOCK {
                    return Ok(None);
                }
                return Err(format!("accept: {}", error_str()));
            }
            let c_ip = u32::from_be(sa.sin_addr.s_addr);
            let c_port = u16::from_be(sa.sin_port);
            return Ok(Some((fd, c_ip, c_port)));
        }
    }
}

pub fn nonblock(fd: i32) -> Result<(), String> {
    // Set the socket nonblocking.
    // Note that fcntl(2) for F_GETFL and F_SETFL can't be
    // interrupted by a signal.
    unsafe {
        let flag = fcntl(fd, F_GETFL);
        if flag == -1 {
            return Err(format!("fcntl(F_GETFL): {}", error_str()));
        }
        if fcntl(fd, F_SETFL, flag | O_NONBLOCK) == -1 {
            return Err(format!("fcntl(F_SETFL,O_NONBLOCK): {}", error_str()));
        }
    }
    Ok(())
}

pub fn tcp_no_delay(fd: i32) -> Result<(), String> {
    let yes = 1;
    unsafe {
        if setsockopt(fd, IPPROTO_TCP, TCP_NODELAY, &yes as *const _ as *const c_void, size_of_val(&yes) as u32) == -1 {
            return Err(format!("setsockopt TCP_NODELAY: {}", error_str()));
        }
    }
    Ok(())
}
