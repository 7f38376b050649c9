//! Per-connection receive and reply accumulators.

/// Receive buffer capacity. A single command must fit; a client whose
/// command fills the whole buffer without parsing is protocol
/// violating.
pub const RX_CAP: usize = 4096;

/// With multiplexing we need to take per-client state: the bytes read
/// but not yet parsed, and the replies not yet written. Created on
/// accept, dropped on disconnect.
///
/// Invariant: `prx <= lrx <= RX_CAP`. `rx[prx..lrx]` is the region the
/// parser has not consumed yet.
pub struct ClientBuffer {
    pub rx: [u8; RX_CAP],
    pub lrx: usize,
    pub prx: usize,
    pub tx: Vec<u8>,
    pub close_after_reply: bool,
}

impl ClientBuffer {
    pub fn new() -> ClientBuffer {
        ClientBuffer {
            rx: [0u8; RX_CAP],
            lrx: 0,
            prx: 0,
            tx: Vec::new(),
            close_after_reply: false,
        }
    }

    /// Move the unconsumed tail to offset 0 so the next read has the
    /// largest possible contiguous free region.
    pub fn compact(&mut self) {
        if self.prx == 0 {
            return;
        }
        self.rx.copy_within(self.prx..self.lrx, 0);
        self.lrx -= self.prx;
        self.prx = 0;
    }

    /// Bytes received but not yet consumed by the parser.
    pub fn unconsumed(&self) -> usize {
        self.lrx - self.prx
    }
}

impl Default for ClientBuffer {
    fn default() -> ClientBuffer {
        ClientBuffer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_moves_tail_to_front() {
        let mut buf = ClientBuffer::new();
        buf.rx[..10].copy_from_slice(b"0123456789");
        buf.lrx = 10;
        buf.prx = 6;
        buf.compact();
        assert_eq!(buf.prx, 0);
        assert_eq!(buf.lrx, 4);
        assert_eq!(&buf.rx[..4], b"6789");
    }

    #[test]
    fn compact_is_a_noop_at_offset_zero() {
        let mut buf = ClientBuffer::new();
        buf.rx[..3].copy_from_slice(b"abc");
        buf.lrx = 3;
        buf.compact();
        assert_eq!(buf.lrx, 3);
        assert_eq!(&buf.rx[..3], b"abc");
    }

    #[test]
    fn unconsumed_tracks_the_cursor() {
        let mut buf = ClientBuffer::new();
        buf.lrx = 8;
        buf.prx = 5;
        assert_eq!(buf.unconsumed(), 3);
    }
}
