//! Memif-style shared-memory ring transport.
//!
//! Each direction of the face is a single-producer single-consumer byte
//! ring: the producer owns the write index, the consumer owns the read
//! index, and frames are stored with a 2-byte length prefix. Release/Acquire
//! ordering on the indices publishes the frame bytes to the peer thread.
//!
//! [`memif_pair`] builds two connected endpoints sharing a pair of rings,
//! which is how the tests and the loopback scenarios wire a consumer
//! directly to a producer in one process.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ndnft_common::{Error, Result};

use crate::transport::{TransportRx, TransportTx};

/// Frames the sender will buffer per direction before send blocks.
const RING_DEPTH_FRAMES: usize = 64;

/// How long a send spins on a full ring before giving up.
const SEND_RETRY_LIMIT: Duration = Duration::from_millis(100);

struct RingShared {
    storage: UnsafeCell<Box<[u8]>>,
    mask: usize,
    /// Consumer position; monotonically increasing, masked on access.
    read: AtomicUsize,
    /// Producer position; monotonically increasing, masked on access.
    write: AtomicUsize,
    /// Set when either endpoint of this direction is dropped.
    closed: AtomicBool,
}

// The producer writes only bytes in [write, read + capacity) and the
// consumer reads only bytes in [read, write), so the two threads never
// touch the same byte between a matching Release store and Acquire load.
unsafe impl Sync for RingShared {}
unsafe impl Send for RingShared {}

impl RingShared {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        Self {
            storage: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            mask: capacity - 1,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn capacity(&self) -> usize {
        self.mask + 1
    }

    unsafe fn put(&self, index: usize, byte: u8) {
        (*self.storage.get())[index & self.mask] = byte;
    }

    unsafe fn get(&self, index: usize) -> u8 {
        (*self.storage.get())[index & self.mask]
    }

    /// Append one length-prefixed frame. Returns false if the ring lacks
    /// space; the producer retries after the consumer drains.
    fn try_push(&self, frame: &[u8]) -> bool {
        let needed = frame.len() + 2;
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Relaxed);

        if self.capacity() - (write - read) < needed {
            return false;
        }

        unsafe {
            self.put(write, (frame.len() & 0xFF) as u8);
            self.put(write + 1, (frame.len() >> 8) as u8);
            for (i, &byte) in frame.iter().enumerate() {
                self.put(write + 2 + i, byte);
            }
        }

        self.write.store(write + needed, Ordering::Release);
        true
    }

    /// Remove one frame, if available.
    fn try_pop(&self, dst: &mut [u8]) -> Result<Option<usize>> {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Relaxed);

        if write == read {
            return Ok(None);
        }

        let len = unsafe { self.get(read) as usize | (self.get(read + 1) as usize) << 8 };
        if dst.len() < len {
            return Err(Error::Transport(format!(
                "receive buffer too small: frame {} bytes, buffer {}",
                len,
                dst.len()
            )));
        }

        unsafe {
            for (i, slot) in dst[..len].iter_mut().enumerate() {
                *slot = self.get(read + 2 + i);
            }
        }

        self.read.store(read + 2 + len, Ordering::Release);
        Ok(Some(len))
    }
}

/* ---------------------------------------------------------------- *
 * Transport endpoints
 * ---------------------------------------------------------------- */

pub struct MemifTx {
    ring: Arc<RingShared>,
    dataroom: usize,
}

pub struct MemifRx {
    ring: Arc<RingShared>,
}

impl TransportTx for MemifTx {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.dataroom {
            return Err(Error::Transport(format!(
                "frame of {} bytes exceeds dataroom {}",
                frame.len(),
                self.dataroom
            )));
        }

        let deadline = Instant::now() + SEND_RETRY_LIMIT;
        loop {
            if self.ring.closed.load(Ordering::Acquire) {
                return Err(Error::Transport("peer closed the ring".into()));
            }
            if self.ring.try_push(frame) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Transport("ring full, peer not draining".into()));
            }
            thread::sleep(Duration::from_micros(50));
        }
    }
}

impl TransportRx for MemifRx {
    fn try_recv(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        // Drain remaining frames before reporting a closed ring
        match self.ring.try_pop(dst)? {
            Some(n) => Ok(Some(n)),
            None if self.ring.closed.load(Ordering::Acquire) => {
                Err(Error::Transport("peer closed the ring".into()))
            }
            None => Ok(None),
        }
    }
}

impl Drop for MemifTx {
    fn drop(&mut self) {
        self.ring.closed.store(true, Ordering::Release);
    }
}

impl Drop for MemifRx {
    fn drop(&mut self) {
        self.ring.closed.store(true, Ordering::Release);
    }
}

/// Build two connected memif-style endpoints sharing a pair of rings.
///
/// Returns `(near, far)`; frames sent on one endpoint's tx half appear on
/// the other endpoint's rx half.
pub fn memif_pair(dataroom: usize) -> ((MemifTx, MemifRx), (MemifTx, MemifRx)) {
    let capacity = (dataroom + 2) * RING_DEPTH_FRAMES;
    let ring_ab = Arc::new(RingShared::with_capacity(capacity));
    let ring_ba = Arc::new(RingShared::with_capacity(capacity));

    let near = (
        MemifTx {
            ring: Arc::clone(&ring_ab),
            dataroom,
        },
        MemifRx {
            ring: Arc::clone(&ring_ba),
        },
    );
    let far = (
        MemifTx {
            ring: ring_ba,
            dataroom,
        },
        MemifRx { ring: ring_ab },
    );

    (near, far)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cross_the_pair_in_order() {
        let ((mut tx, _), (_far_tx, mut rx)) = memif_pair(1500);
        let mut buf = [0u8; 1500];

        assert!(rx.try_recv(&mut buf).unwrap().is_none());

        tx.send(b"one").unwrap();
        tx.send(b"two").unwrap();

        assert_eq!(rx.try_recv(&mut buf).unwrap(), Some(3));
        assert_eq!(&buf[..3], b"one");
        assert_eq!(rx.try_recv(&mut buf).unwrap(), Some(3));
        assert_eq!(&buf[..3], b"two");
        assert!(rx.try_recv(&mut buf).unwrap().is_none());
    }

    #[test]
    fn wraparound_preserves_frames() {
        let ((mut tx, _), (_far_tx, mut rx)) = memif_pair(64);
        let mut buf = [0u8; 64];

        // Push enough traffic through a small ring to wrap several times
        for round in 0..10_000u32 {
            let frame = round.to_be_bytes();
            tx.send(&frame).unwrap();
            let n = rx.try_recv(&mut buf).unwrap().unwrap();
            assert_eq!(&buf[..n], frame);
        }
    }

    #[test]
    fn oversized_frame_rejected() {
        let ((mut tx, _), _far) = memif_pair(64);
        assert!(tx.send(&[0u8; 65]).is_err());
    }

    #[test]
    fn send_fails_once_peer_drops() {
        let ((mut tx, _rx), far) = memif_pair(64);
        drop(far);
        assert!(tx.send(b"x").is_err());
    }

    #[test]
    fn receiver_drains_before_reporting_close() {
        let ((mut tx, _rx), (far_tx, mut far_rx)) = memif_pair(64);
        tx.send(b"last").unwrap();
        drop(tx);
        drop(far_tx);

        let mut buf = [0u8; 64];
        assert_eq!(far_rx.try_recv(&mut buf).unwrap(), Some(4));
        assert_eq!(&buf[..4], b"last");
        assert!(far_rx.try_recv(&mut buf).is_err());
    }

    #[test]
    fn concurrent_producer_consumer() {
        let ((mut tx, _), (_far_tx, mut rx)) = memif_pair(256);

        let producer = thread::spawn(move || {
            for i in 0..50_000u32 {
                tx.send(&i.to_be_bytes()).unwrap();
            }
        });

        let mut buf = [0u8; 256];
        let mut expected = 0u32;
        while expected < 50_000 {
            if let Some(n) = rx.try_recv(&mut buf).unwrap() {
                assert_eq!(n, 4);
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&buf[..4]);
                assert_eq!(u32::from_be_bytes(raw), expected);
                expected += 1;
            }
        }

        producer.join().unwrap();
    }
}
