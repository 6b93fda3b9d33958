//! Identifier generation.
//!
//! Ids are `<random>_<millis>.<ext>`. The random part is drawn from the OS
//! CSPRNG: two uploads landing on the same name would hand one uploader's
//! image to the other, so a predictable generator is not acceptable here.

use crate::{models::object_id::ObjectId, services::clock::Clock};
use rand::{Rng, rngs::OsRng};
use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

/// Alphabet for the random component (36 symbols).
pub const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Default length of the random component.
pub const DEFAULT_ID_LENGTH: usize = 12;

pub struct IdGenerator {
    length: usize,
    clock: Arc<dyn Clock>,
    /// Highest timestamp handed out so far.
    last_millis: AtomicI64,
}

impl IdGenerator {
    pub fn new(length: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            length,
            clock,
            last_millis: AtomicI64::new(i64::MIN),
        }
    }

    /// Produce a fresh id with the given extension (no leading dot).
    ///
    /// The timestamp never goes backwards within one generator, even if
    /// the wall clock is stepped back.
    pub fn generate(&self, extension: &str) -> ObjectId {
        let now = self.clock.now().timestamp_millis();
        let millis = self.last_millis.fetch_max(now, Ordering::SeqCst).max(now);

        let random: String = (0..self.length)
            .map(|_| ID_CHARSET[OsRng.gen_range(0..ID_CHARSET.len())] as char)
            .collect();

        ObjectId::from_parts(&random, millis, extension)
    }
}
