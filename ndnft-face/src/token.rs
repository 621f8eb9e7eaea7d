//! PIT token generation.

use ndnft_common::lp::PitToken;
use rand::Rng;

/// Produces the per-Interest PIT tokens carried in the LP header.
///
/// The sequence is seeded from OS randomness into `[2^32, 2^64)` so tokens
/// from restarted consumers do not collide with stale forwarder state, then
/// incremented per Interest. Wraparound is 2^63 increments away and not
/// handled.
#[derive(Debug)]
pub struct PitTokenGenerator {
    sequence: u64,
}

impl PitTokenGenerator {
    pub fn new() -> Self {
        let sequence = rand::thread_rng().gen_range(u32::MAX as u64..u64::MAX);
        Self { sequence }
    }

    /// The next token in the sequence.
    pub fn next(&mut self) -> PitToken {
        self.sequence = self.sequence.wrapping_add(1);
        PitToken::new(self.sequence)
    }

    /// The most recently issued sequence value.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Default for PitTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_start_above_u32_range() {
        let mut gen = PitTokenGenerator::new();
        assert!(gen.next().value() > u32::MAX as u64);
    }

    #[test]
    fn tokens_are_monotonic_and_unique() {
        let mut gen = PitTokenGenerator::new();
        let mut seen = HashSet::new();
        let mut last = 0u64;

        for _ in 0..10_000 {
            let token = gen.next().value();
            assert!(token > last);
            assert!(seen.insert(token));
            last = token;
        }
    }

    #[test]
    fn token_wire_roundtrip_preserves_value() {
        let mut gen = PitTokenGenerator::new();
        for _ in 0..100 {
            let token = gen.next();
            let wire = token.to_wire();
            assert_eq!(
                ndnft_common::lp::PitToken::from_wire(&wire).unwrap().value(),
                token.value()
            );
        }
    }
}
