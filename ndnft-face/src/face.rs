//! The data-plane face: LP framing over a transport pair.
//!
//! A face owns the transport send half and spawns one receive thread that
//! decodes inbound frames into [`FaceEvent`]s on a channel. The owner of
//! the face (the pipeline worker on the consumer side, the packet-handler
//! driver on the producer side) is the sole sender and the sole event
//! consumer, which keeps both directions single-threaded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, trace, warn};

use ndnft_common::lp::{self, LpPayload, PitToken};
use ndnft_common::metrics::Counter;
use ndnft_common::ndn::{Data, Interest, Nack, NackReason, MAX_NDN_PACKET_SIZE};
use ndnft_common::{Error, Result};

use crate::transport::{TransportRx, TransportTx};

/// Capacity of the face event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Events delivered by the face receive thread.
#[derive(Debug)]
pub enum FaceEvent {
    /// An Interest arrived, with its PIT token if LP-tagged.
    Interest {
        interest: Interest,
        token: Option<PitToken>,
    },
    /// A Data arrived for the given PIT token.
    Data {
        data: Data,
        token: Option<PitToken>,
    },
    /// A Nack arrived for the given PIT token.
    Nack {
        nack: Nack,
        token: Option<PitToken>,
    },
    /// The transport failed; the face is no longer usable.
    Down,
}

/// Counters kept by the face, readable from any thread.
#[derive(Debug, Default)]
pub struct FaceCounters {
    pub tx_frames: Counter,
    pub rx_frames: Counter,
    pub rx_decode_errors: Counter,
}

pub struct Face {
    id: u32,
    tx: Box<dyn TransportTx>,
    events: Receiver<FaceEvent>,
    up: Arc<AtomicBool>,
    counters: Arc<FaceCounters>,
    rx_thread: Option<JoinHandle<()>>,
}

impl Face {
    /// Create a face over a transport pair, spawning the receive thread.
    pub fn new(id: u32, tx: Box<dyn TransportTx>, rx: Box<dyn TransportRx>) -> Result<Self> {
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let up = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(FaceCounters::default());

        let rx_thread = {
            let up = Arc::clone(&up);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name(format!("ndnft-face-{}-rx", id))
                .spawn(move || run_rx(id, rx, event_tx, up, counters))?
        };

        Ok(Self {
            id,
            tx,
            events: event_rx,
            up,
            counters,
            rx_thread: Some(rx_thread),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// True until the transport reports a fatal error or the face closes.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub fn counters(&self) -> Arc<FaceCounters> {
        Arc::clone(&self.counters)
    }

    /// Send an Interest tagged with the given PIT token.
    pub fn express(&mut self, interest: &Interest, token: PitToken) -> Result<()> {
        self.send_frame(&lp::encode_interest(interest, token))
    }

    /// Send a Data, echoing the requester's PIT token.
    pub fn put_data(&mut self, data: &Data, token: Option<PitToken>) -> Result<()> {
        self.send_frame(&lp::encode_data(data, token))
    }

    /// Send a Nack for the given Interest.
    pub fn put_nack(
        &mut self,
        interest: Interest,
        reason: NackReason,
        token: Option<PitToken>,
    ) -> Result<()> {
        self.send_frame(&lp::encode_nack(&Nack::new(interest, reason), token))
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        if !self.is_up() {
            return Err(Error::Transport("face is down".into()));
        }
        match self.tx.send(frame) {
            Ok(()) => {
                self.counters.tx_frames.increment();
                Ok(())
            }
            Err(e) => {
                warn!("[face {}] send failed: {}", self.id, e);
                self.up.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Fetch the next event without blocking.
    pub fn try_next_event(&self) -> Option<FaceEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_event_timeout(&self, timeout: Duration) -> Option<FaceEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Shut the face down and join the receive thread.
    pub fn close(&mut self) {
        self.up.store(false, Ordering::Release);
        if let Some(handle) = self.rx_thread.take() {
            let _ = handle.join();
        }
        debug!("[face {}] closed", self.id);
    }
}

impl Drop for Face {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_rx(
    id: u32,
    mut rx: Box<dyn TransportRx>,
    events: Sender<FaceEvent>,
    up: Arc<AtomicBool>,
    counters: Arc<FaceCounters>,
) {
    // LP framing adds a small header on top of the packet proper, and the
    // dataroom may exceed the packet limit; leave generous headroom
    let mut buf = vec![0u8; 2 * MAX_NDN_PACKET_SIZE];
    let mut idle_spins = 0u32;

    while up.load(Ordering::Acquire) {
        match rx.try_recv(&mut buf) {
            Ok(Some(n)) => {
                idle_spins = 0;
                counters.rx_frames.increment();
                match lp::decode_frame(&buf[..n]) {
                    Ok(frame) => {
                        let mut event = match frame.payload {
                            LpPayload::Interest(interest) => FaceEvent::Interest {
                                interest,
                                token: frame.pit_token,
                            },
                            LpPayload::Data(data) => FaceEvent::Data {
                                data,
                                token: frame.pit_token,
                            },
                            LpPayload::Nack(nack) => FaceEvent::Nack {
                                nack,
                                token: frame.pit_token,
                            },
                        };
                        // Never block indefinitely here: close() joins this
                        // thread and must not wait on a full channel
                        loop {
                            match events.try_send(event) {
                                Ok(()) => break,
                                Err(TrySendError::Full(e)) => {
                                    if !up.load(Ordering::Acquire) {
                                        return;
                                    }
                                    event = e;
                                    thread::sleep(Duration::from_micros(50));
                                }
                                Err(TrySendError::Disconnected(_)) => return,
                            }
                        }
                    }
                    Err(e) => {
                        counters.rx_decode_errors.increment();
                        trace!("[face {}] dropping undecodable frame: {}", id, e);
                    }
                }
            }
            Ok(None) => {
                // Spin briefly for low latency, then yield the core
                idle_spins += 1;
                if idle_spins < 64 {
                    std::hint::spin_loop();
                } else {
                    thread::sleep(Duration::from_micros(50));
                }
            }
            Err(e) => {
                debug!("[face {}] transport failed: {}", id, e);
                up.store(false, Ordering::Release);
                let _ = events.send(FaceEvent::Down);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memif::memif_pair;
    use ndnft_common::ndn::Name;

    fn face_pair() -> (Face, Face) {
        let ((tx_a, rx_a), (tx_b, rx_b)) = memif_pair(8800);
        (
            Face::new(1, Box::new(tx_a), Box::new(rx_a)).unwrap(),
            Face::new(2, Box::new(tx_b), Box::new(rx_b)).unwrap(),
        )
    }

    fn wait_event(face: &Face) -> FaceEvent {
        face.next_event_timeout(Duration::from_secs(1))
            .expect("expected a face event")
    }

    #[test]
    fn interest_and_data_cross_the_faces() {
        let (mut consumer, mut producer) = face_pair();

        let interest = Interest::new(Name::from_string("/ping/1"));
        let token = PitToken::new(0x1_0000_0001);
        consumer.express(&interest, token).unwrap();

        match wait_event(&producer) {
            FaceEvent::Interest {
                interest: received,
                token: received_token,
            } => {
                assert_eq!(received, interest);
                assert_eq!(received_token, Some(token));

                let mut data = Data::new(received.name.clone(), &b"pong"[..]);
                data.sign_digest();
                producer.put_data(&data, received_token).unwrap();
            }
            other => panic!("expected Interest event, got {:?}", other),
        }

        match wait_event(&consumer) {
            FaceEvent::Data { data, token: t } => {
                assert_eq!(t, Some(token));
                assert_eq!(data.content.as_ref(), b"pong");
            }
            other => panic!("expected Data event, got {:?}", other),
        }
    }

    #[test]
    fn nack_crosses_the_faces() {
        let (mut consumer, mut producer) = face_pair();

        let interest = Interest::new(Name::from_string("/nowhere"));
        let token = PitToken::new(7);
        consumer.express(&interest, token).unwrap();

        match wait_event(&producer) {
            FaceEvent::Interest { interest, token } => {
                producer
                    .put_nack(interest, NackReason::NoRoute, token)
                    .unwrap();
            }
            other => panic!("expected Interest event, got {:?}", other),
        }

        match wait_event(&consumer) {
            FaceEvent::Nack { nack, token: t } => {
                assert_eq!(t, Some(token));
                assert_eq!(nack.reason, NackReason::NoRoute);
            }
            other => panic!("expected Nack event, got {:?}", other),
        }
    }

    #[test]
    fn peer_drop_brings_face_down() {
        let (mut consumer, producer) = face_pair();
        drop(producer);

        // The rx thread notices the closed ring and posts Down
        match wait_event(&consumer) {
            FaceEvent::Down => {}
            other => panic!("expected Down event, got {:?}", other),
        }
        assert!(!consumer.is_up());

        let interest = Interest::new(Name::from_string("/x"));
        assert!(consumer.express(&interest, PitToken::new(1)).is_err());
    }
}
