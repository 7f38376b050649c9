//! I/O multiplexing for the event loop: a thin wrapper over epoll in
//! edge-triggered mode. Edge triggering fires once per transition to
//! ready, so every consumer of these notifications must drain its
//! descriptor until the operation reports would-block.

use std::ops::BitOr;
use libc::{close, epoll_create, epoll_ctl, epoll_event, epoll_wait, EINTR, EPOLLERR, EPOLLET,
    EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD};
use crate::util::{error, error_str};

/// Max events delivered by one wait.
pub const EVENT_BATCH: usize = 1024 * 10;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Mask {
    None,
    Readable,
    Writable,
    ReadWritable,
}

impl Mask {
    pub fn is_readable(&self) -> bool {
        *self == Self::Readable || *self == Self::ReadWritable
    }

    pub fn is_writable(&self) -> bool {
        *self == Self::Writable || *self == Self::ReadWritable
    }
}

impl BitOr for Mask {
    type Output = Mask;

    fn bitor(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::None, r) => r,
            (l, Self::None) => l,
            (Self::ReadWritable, _) | (_, Self::ReadWritable) => Self::ReadWritable,
            (Self::Readable, Self::Writable) | (Self::Writable, Self::Readable) => Self::ReadWritable,
            (l, _) => l,
        }
    }
}

pub struct FiredEvent {
    pub fd: i32,
    pub mask: Mask,
}

/// Owns the epoll descriptor and the kernel-filled event array.
pub struct Poller {
    epfd: i32,
    events: Vec<epoll_event>,
}

impl Poller {
    pub fn create() -> Result<Poller, String> {
        let epfd = unsafe { epoll_create(1024) };  // 1024 is just an hint for the kernel
        if epfd == -1 {
            return Err(format!("epoll_create: {}", error_str()));
        }
        Ok(Poller { epfd, events: vec![epoll_event { events: 0, u64: 0 }; EVENT_BATCH] })
    }

    /// Register `fd` for edge-triggered read readiness.
    pub fn add_readable(&self, fd: i32) -> Result<(), String> {
        self.ctl(EPOLL_CTL_ADD, fd, (EPOLLIN | EPOLLET) as u32)
    }

    /// Add write readiness to an already registered descriptor.
    pub fn enable_writable(&self, fd: i32) -> Result<(), String> {
        self.ctl(EPOLL_CTL_MOD, fd, (EPOLLIN | EPOLLOUT | EPOLLET) as u32)
    }

    pub fn disable_writable(&self, fd: i32) -> Result<(), String> {
        self.ctl(EPOLL_CTL_MOD, fd, (EPOLLIN | EPOLLET) as u32)
    }

    pub fn remove(&self, fd: i32) -> Result<(), String> {
        // Note, Kernel < 2.6.9 requires a non null event pointer even
        // for EPOLL_CTL_DEL.
        self.ctl(EPOLL_CTL_DEL, fd, 0)
    }

    fn ctl(&self, op: i32, fd: i32, events: u32) -> Result<(), String> {
        let mut ee = epoll_event { events, u64: fd as u64 };
        if unsafe { epoll_ctl(self.epfd, op, fd, &mut ee) } == -1 {
            return Err(format!("epoll_ctl: {}", error_str()));
        }
        Ok(())
    }

    /// Block until readiness events arrive, then translate them into
    /// the fired vector. A signal interrupting the wait reports zero
    /// events so the caller can notice its stop flag; any other
    /// failure of the facility is fatal to the caller.
    pub fn poll(&mut self, fired: &mut Vec<FiredEvent>) -> Result<usize, String> {
        fired.clear();
        let ret_val = unsafe { epoll_wait(self.epfd, self.events.as_mut_ptr(), EVENT_BATCH as i32, -1) };
        if ret_val == -1 {
            if error() == EINTR {
                return Ok(0);
            }
            return Err(format!("epoll_wait: {}", error_str()));
        }

        for j in 0..ret_val as usize {
            let e = self.events[j];
            let mut mask = Mask::None;

            // Errors and hangups surface as readable so the next read
            // observes them and tears the connection down.
            if e.events & (EPOLLIN | EPOLLERR | EPOLLHUP) as u32 != 0 {
                mask = mask | Mask::Readable;
            }
            if e.events & EPOLLOUT as u32 != 0 {
                mask = mask | Mask::Writable;
            }

            fired.push(FiredEvent { fd: e.u64 as i32, mask });
        }

        Ok(ret_val as usize)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe {
            if close(self.epfd) == -1 {
                eprintln!("Poller.drop failed: {}", error_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_or() {
        assert_eq!(Mask::Readable | Mask::Writable, Mask::ReadWritable);
        assert_eq!(Mask::None | Mask::Writable, Mask::Writable);
        assert!((Mask::Readable | Mask::None).is_readable());
        assert!(!Mask::Readable.is_writable());
    }

    #[test]
    fn test_poller_create() {
        assert!(Poller::create().is_ok());
    }
}
