//! Subscription id generation.
//!
//! Ids look like `rs3fa9c01b:7`: a random per-generator prefix plus a
//! monotonically increasing counter. Two clients (or two connections of the
//! same process) never share a generator, so their ids never collide.

use std::sync::Mutex;

/// Generates subscription ids unique to one relay connection.
#[derive(Debug)]
pub struct SubscriptionIds {
    prefix: String,
    next: Mutex<u64>,
}

impl SubscriptionIds {
    /// Create a generator with a fresh random prefix.
    ///
    /// If the OS RNG is unavailable the prefix falls back to a process-wide
    /// counter mixed with the process id, which is still unique within the
    /// process.
    pub fn new() -> Self {
        let mut bytes = [0u8; 4];
        let prefix = match getrandom::getrandom(&mut bytes) {
            Ok(()) => format!("rs{}", hex::encode(bytes)),
            Err(_) => format!("rs{:08x}", fallback_seed()),
        };
        Self::with_prefix(prefix)
    }

    /// Create a generator with a fixed prefix (deterministic ids for tests).
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: Mutex::new(0),
        }
    }

    /// The prefix shared by every id from this generator.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Return the next id. Safe to call from multiple tasks.
    pub fn next_id(&self) -> String {
        // A poisoned counter is still a valid counter.
        let mut next = self
            .next
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let n = *next;
        *next = next.wrapping_add(1);
        format!("{}:{}", self.prefix, n)
    }
}

impl Default for SubscriptionIds {
    fn default() -> Self {
        Self::new()
    }
}

fn fallback_seed() -> u32 {
    static COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    n.wrapping_mul(0x9e37_79b9) ^ std::process::id()
}
