//! Identifier allocation for requests and wrapped objects.
//!
//! Cheap monotone integers in the common case; once the counter nears the
//! largest integer a JSON peer can represent exactly, switch to 128-bit
//! random identifiers so the sequence never wraps and never collides.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::message::Id;

/// Largest integer representable exactly by every JSON peer (2^53 - 1).
pub const SAFE_ID_LIMIT: u64 = 9_007_199_254_740_991;

/// Margin below [`SAFE_ID_LIMIT`] at which allocation goes random.
pub const RANDOM_ID_MARGIN: u64 = 1_000;

/// Allocates process-unique identifiers.
///
/// Re-entrancy safe by construction: a single atomic counter, or fresh
/// randomness once the counter regime is exhausted.
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start the counter regime at `first`. Mostly useful for exercising the
    /// regime switch without ticking through 2^53 allocations.
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Return a fresh identifier.
    pub fn next(&self) -> Id {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        if n < SAFE_ID_LIMIT - RANDOM_ID_MARGIN {
            Id::Num(n)
        } else {
            Id::Str(Uuid::new_v4().simple().to_string())
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

static ALLOCATOR: IdAllocator = IdAllocator::new();

/// Allocate from the process-wide allocator.
///
/// Request ids and object ids share one sequence, so every identifier the
/// process puts on a wire is unique for the process lifetime.
pub fn next_id() -> Id {
    ALLOCATOR.next()
}
