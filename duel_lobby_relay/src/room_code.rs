// Room code generator.
//
// Codes are the only thing standing between a stranger and a room: anyone
// who knows one can join. The server therefore seeds from the OS through
// `rand` unless `RelayConfig::seed` pins a seed for a reproducible run (the
// tests always pin one).

use duel_lobby_protocol::RoomCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of distinct codes in `RoomCode::MIN..=RoomCode::MAX`.
pub const CODE_SPACE: u32 = RoomCode::MAX - RoomCode::MIN + 1;

#[derive(Clone, Debug)]
pub struct CodeGenerator {
    rng: StdRng,
}

impl CodeGenerator {
    /// Seed from a `u64`. Equal seeds produce equal code sequences.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed from the thread-local OS-seeded generator.
    pub fn from_entropy() -> Self {
        Self::new(rand::rng().random())
    }

    /// Uniform integer in `[0, bound)`. A zero `bound` is treated as 1.
    pub fn below(&mut self, bound: u32) -> u32 {
        self.rng.random_range(0..bound.max(1))
    }

    /// Uniform code in `RoomCode::MIN..=RoomCode::MAX`.
    pub fn next_code(&mut self) -> RoomCode {
        RoomCode(self.rng.random_range(RoomCode::MIN..=RoomCode::MAX))
    }
}
