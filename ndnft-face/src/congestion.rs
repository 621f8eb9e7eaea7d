//! Pluggable congestion control for the Interest pipeline.
//!
//! The pipeline worker holds one controller and signals it on every Data
//! (ack) and on every loss (timeout or congestion Nack); the window bounds
//! the number of in-flight Interests.

use std::time::{Duration, Instant};

/// The interface between the pipeline worker and a window policy.
pub trait CongestionControl: Send {
    /// A tracked Interest was satisfied by Data.
    fn on_ack(&mut self);

    /// A tracked Interest was lost: it timed out or drew a congestion Nack.
    fn on_loss(&mut self);

    /// An RTT sample for a satisfied Interest.
    fn on_rtt(&mut self, _rtt: Duration) {}

    /// Current window, in Interests.
    fn window(&self) -> usize;
}

/* ---------------------------------------------------------------- *
 * Fixed window
 * ---------------------------------------------------------------- */

/// A constant window; ack and loss signals are ignored.
#[derive(Debug)]
pub struct FixedWindow {
    window: usize,
}

impl FixedWindow {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl CongestionControl for FixedWindow {
    fn on_ack(&mut self) {}

    fn on_loss(&mut self) {}

    fn window(&self) -> usize {
        self.window
    }
}

/* ---------------------------------------------------------------- *
 * AIMD
 * ---------------------------------------------------------------- */

/// Smallest window AIMD will shrink to.
const MIN_WINDOW: f64 = 2.0;

/// Largest window AIMD will grow to.
const MAX_WINDOW: f64 = 1024.0;

/// RTT estimate used before any sample arrives.
const INITIAL_RTT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AimdMode {
    SlowStart,
    CongestionAvoidance,
}

/// Reno-style additive-increase/multiplicative-decrease window.
///
/// Slow start grows the window by one per ack until it reaches ssthresh,
/// congestion avoidance by 1/window per ack. A loss halves the window,
/// floored at [`MIN_WINDOW`]. Losses arriving within one smoothed RTT of
/// the previous decrease are treated as the same congestion event and do
/// not shrink the window again.
#[derive(Debug)]
pub struct Aimd {
    cwnd: f64,
    ssthresh: f64,
    mode: AimdMode,
    srtt: Duration,
    last_decrease: Option<Instant>,
}

impl Aimd {
    pub fn new(ssthresh: usize) -> Self {
        Self {
            cwnd: MIN_WINDOW,
            ssthresh: (ssthresh as f64).clamp(MIN_WINDOW, MAX_WINDOW),
            mode: AimdMode::SlowStart,
            srtt: INITIAL_RTT,
            last_decrease: None,
        }
    }

    /// Current slow-start threshold.
    pub fn ssthresh(&self) -> usize {
        self.ssthresh as usize
    }

    fn in_decrease_holdoff(&self, now: Instant) -> bool {
        match self.last_decrease {
            Some(at) => now.duration_since(at) < self.srtt,
            None => false,
        }
    }
}

impl CongestionControl for Aimd {
    fn on_ack(&mut self) {
        match self.mode {
            AimdMode::SlowStart => {
                self.cwnd += 1.0;
                if self.cwnd >= self.ssthresh {
                    self.mode = AimdMode::CongestionAvoidance;
                }
            }
            AimdMode::CongestionAvoidance => {
                self.cwnd += 1.0 / self.cwnd;
            }
        }
        self.cwnd = self.cwnd.min(MAX_WINDOW);
    }

    fn on_loss(&mut self) {
        let now = Instant::now();
        if self.in_decrease_holdoff(now) {
            return;
        }

        self.ssthresh = (self.cwnd / 2.0).max(MIN_WINDOW);
        self.cwnd = self.ssthresh;
        self.mode = AimdMode::CongestionAvoidance;
        self.last_decrease = Some(now);
    }

    fn on_rtt(&mut self, rtt: Duration) {
        // Standard EWMA smoothing, alpha = 1/8
        self.srtt = (self.srtt * 7 + rtt) / 8;
    }

    fn window(&self) -> usize {
        self.cwnd as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_window_ignores_signals() {
        let mut cc = FixedWindow::new(8);
        for _ in 0..100 {
            cc.on_ack();
            cc.on_loss();
        }
        assert_eq!(cc.window(), 8);
    }

    #[test]
    fn slow_start_grows_by_one_until_ssthresh() {
        let mut cc = Aimd::new(8);
        assert_eq!(cc.window(), 2);

        for expected in 3..=8 {
            cc.on_ack();
            assert_eq!(cc.window(), expected);
        }

        // Past ssthresh growth is sublinear
        cc.on_ack();
        assert_eq!(cc.window(), 8);
    }

    #[test]
    fn single_loss_halves_the_window() {
        let mut cc = Aimd::new(64);
        for _ in 0..62 {
            cc.on_ack();
        }
        assert_eq!(cc.window(), 64);

        cc.on_loss();
        assert_eq!(cc.window(), 32);
        assert_eq!(cc.ssthresh(), 32);
    }

    #[test]
    fn window_floors_at_two() {
        let mut cc = Aimd::new(4);
        // Space the losses out past the holdoff by zeroing the RTT estimate
        cc.srtt = Duration::ZERO;
        for _ in 0..10 {
            cc.on_loss();
        }
        assert_eq!(cc.window(), 2);
        assert_eq!(cc.ssthresh(), 2);
    }

    #[test]
    fn burst_losses_decrease_once() {
        let mut cc = Aimd::new(64);
        for _ in 0..62 {
            cc.on_ack();
        }

        // All of these land within one RTT estimate of the first
        cc.on_loss();
        cc.on_loss();
        cc.on_loss();
        assert_eq!(cc.window(), 32);
    }

    #[test]
    fn ssthresh_non_increasing_across_spaced_losses() {
        let mut cc = Aimd::new(256);
        cc.srtt = Duration::ZERO;

        let mut last = usize::MAX;
        for _ in 0..5 {
            for _ in 0..50 {
                cc.on_ack();
            }
            cc.on_loss();
            assert!(cc.ssthresh() <= last);
            assert!(cc.window() >= 2);
            last = cc.ssthresh();
        }
    }

    #[test]
    fn synthetic_loss_trace_keeps_invariants() {
        // 10 000 segment acks with a deterministic 1% loss pattern
        let mut cc = Aimd::new(512);
        cc.srtt = Duration::ZERO;

        for i in 1..=10_000u32 {
            let ssthresh_before = cc.ssthresh();
            if i % 100 == 0 {
                // A decrease never raises ssthresh above the window it halved
                cc.on_loss();
                assert!(cc.ssthresh() >= 2);
                assert!(cc.ssthresh() <= ssthresh_before.max(cc.window() * 2 + 1));
            } else {
                // Acks leave ssthresh alone
                cc.on_ack();
                assert_eq!(cc.ssthresh(), ssthresh_before);
            }
            assert!(cc.window() >= 2);
            assert!(cc.window() <= MAX_WINDOW as usize);
        }

        // The trace must have settled into congestion avoidance
        assert_eq!(cc.mode, AimdMode::CongestionAvoidance);
    }

    #[test]
    fn window_never_exceeds_cap() {
        let mut cc = Aimd::new(4096);
        for _ in 0..5000 {
            cc.on_ack();
        }
        assert_eq!(cc.window(), MAX_WINDOW as usize);
    }
}
