//! Packet-handler base: event dispatch plus Interest lifetime tracking.
//!
//! A [`Driver`] binds an application component to a face. It dispatches
//! inbound packets to the [`PacketHandler`] hooks, assigns PIT tokens to
//! outgoing Interests, and reports expired Interests through `on_timeout`
//! during its periodic scan. The file-transfer producer runs on top of
//! this; the consumer-side pipeline embeds the same deadline machinery in
//! its own worker instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;

use ndnft_common::lp::PitToken;
use ndnft_common::ndn::{Data, Interest, Nack};
use ndnft_common::Result;

use crate::deadline::DeadlineIndex;
use crate::face::{Face, FaceEvent};
use crate::token::PitTokenGenerator;
use crate::TIMEOUT_SCAN_INTERVAL_MS;

/// Hooks invoked by the driver. Implementations that never express
/// Interests can ignore everything but `process_interest`.
pub trait PacketHandler: Send {
    /// An Interest arrived on the face.
    fn process_interest(&mut self, face: &mut Face, interest: Interest, token: Option<PitToken>);

    /// A Data arrived for an Interest this handler expressed.
    fn process_data(&mut self, _data: Data, _token: Option<PitToken>) {}

    /// A Nack arrived for an Interest this handler expressed.
    fn process_nack(&mut self, _nack: Nack, _token: Option<PitToken>) {}

    /// An expressed Interest reached its lifetime without a reply.
    fn on_timeout(&mut self, _token: PitToken) {}
}

pub struct Driver<H: PacketHandler> {
    face: Face,
    handler: H,
    deadlines: DeadlineIndex,
    tokens: PitTokenGenerator,
    stopping: Arc<AtomicBool>,
    next_scan: Instant,
}

impl<H: PacketHandler> Driver<H> {
    pub fn new(face: Face, handler: H) -> Self {
        Self {
            face,
            handler,
            deadlines: DeadlineIndex::new(),
            tokens: PitTokenGenerator::new(),
            stopping: Arc::new(AtomicBool::new(false)),
            next_scan: Instant::now(),
        }
    }

    /// A flag other threads (or a signal handler's deferred action) can set
    /// to stop [`Driver::run`].
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopping)
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Assign a token to `interest`, record its deadline and send it.
    pub fn express_interest(&mut self, interest: &Interest) -> Result<PitToken> {
        let token = self.tokens.next();
        self.face.express(interest, token)?;
        self.deadlines
            .insert(token.value(), Instant::now() + interest.lifetime());
        Ok(token)
    }

    /// Run one dispatch iteration, waiting up to `wait` for an event.
    /// Returns false once the face is down or the stop flag is set.
    pub fn poll(&mut self, wait: Duration) -> bool {
        if self.stopping.load(Ordering::Acquire) || !self.face.is_up() {
            return false;
        }

        if let Some(event) = self.face.next_event_timeout(wait) {
            match event {
                FaceEvent::Interest { interest, token } => {
                    self.handler.process_interest(&mut self.face, interest, token);
                }
                FaceEvent::Data { data, token } => {
                    if let Some(token) = token {
                        self.deadlines.remove(token.value());
                    }
                    self.handler.process_data(data, token);
                }
                FaceEvent::Nack { nack, token } => {
                    if let Some(token) = token {
                        self.deadlines.remove(token.value());
                    }
                    self.handler.process_nack(nack, token);
                }
                FaceEvent::Down => return false,
            }
        }

        let now = Instant::now();
        if now >= self.next_scan {
            for token in self.deadlines.pop_expired(now) {
                self.handler.on_timeout(PitToken::new(token));
            }
            self.next_scan = now + Duration::from_millis(TIMEOUT_SCAN_INTERVAL_MS);
        }

        true
    }

    /// Dispatch until stopped or the face goes down; returns the handler
    /// so callers can read final statistics.
    pub fn run(mut self) -> H {
        while self.poll(Duration::from_millis(1)) {}
        debug!("driver loop exiting");
        self.face.close();
        self.handler
    }
}
