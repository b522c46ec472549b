//! Chronologically sortable child keys
//!
//! A push id is 8 characters of millisecond timestamp followed by 12 random
//! characters, drawn from an alphabet whose ASCII order matches its value
//! order. Ids allocated within the same millisecond increment the random
//! part, so lexicographic order is allocation order.

use rand::Rng;

const ALPHABET: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const RANDOM_LEN: usize = 12;

/// Stateful push-id allocator. One per store instance.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_ms: i64,
    last_random: [u8; RANDOM_LEN],
}

impl PushIdGenerator {
    /// Create an allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id for a write at `now_ms`.
    pub fn next_id(&mut self, now_ms: i64) -> String {
        // Clock going backwards must not break ordering: stay on the last millisecond.
        let now_ms = now_ms.max(self.last_ms);
        if now_ms == self.last_ms && self.last_ms != 0 {
            increment(&mut self.last_random);
        } else {
            let mut rng = rand::thread_rng();
            for slot in self.last_random.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }
        self.last_ms = now_ms;

        let mut id = String::with_capacity(8 + RANDOM_LEN);
        let mut ts = now_ms.max(0) as u64;
        let mut ts_chars = [0u8; 8];
        for slot in ts_chars.iter_mut().rev() {
            *slot = ALPHABET[(ts % 64) as usize];
            ts /= 64;
        }
        id.extend(ts_chars.iter().map(|b| *b as char));
        id.extend(self.last_random.iter().map(|i| ALPHABET[*i as usize] as char));
        id
    }
}

fn increment(random: &mut [u8; RANDOM_LEN]) {
    for slot in random.iter_mut().rev() {
        if *slot == 63 {
            *slot = 0;
        } else {
            *slot += 1;
            return;
        }
    }
}
