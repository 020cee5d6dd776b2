use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use lazy_static::lazy_static;
use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::basetypes::{SpanID, TraceID};

/// IDGenerator produces the identifiers for new traces and spans.
///
/// Implementations must never return the all-zero id.
pub trait IDGenerator: fmt::Debug {
    /// new_trace_id returns a fresh, non-zero trace id.
    fn new_trace_id(&self) -> TraceID;
    /// new_span_id returns a fresh, non-zero span id.
    fn new_span_id(&self) -> SpanID;
}

lazy_static! {
    pub(crate) static ref DEFAULT_ID_GENERATOR: Arc<dyn IDGenerator + Send + Sync> =
        Arc::new(DefaultIDGenerator::new());
}

/// default_id_generator returns the process-wide generator.
pub fn default_id_generator() -> Arc<dyn IDGenerator + Send + Sync> {
    Arc::clone(&DEFAULT_ID_GENERATOR)
}

/// generate_trace_id returns a random 16-byte trace id from the default generator.
pub fn generate_trace_id() -> TraceID {
    DEFAULT_ID_GENERATOR.new_trace_id()
}

/// generate_span_id returns a random 8-byte span id from the default generator.
pub fn generate_span_id() -> SpanID {
    DEFAULT_ID_GENERATOR.new_span_id()
}

/// DefaultIDGenerator draws ids from a xoshiro256++ stream seeded from the
/// operating system's entropy source.
///
/// Seeding panics if the OS cannot provide entropy: there is no safe fallback
/// for producing identifiers that must not collide.
pub struct DefaultIDGenerator {
    source: Mutex<Xoshiro256PlusPlus>,
}

impl DefaultIDGenerator {
    /// new seeds a generator from OS entropy.
    pub fn new() -> Self {
        DefaultIDGenerator {
            source: Mutex::new(Xoshiro256PlusPlus::from_entropy()),
        }
    }

    fn fill(&self, buf: &mut [u8]) {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            source.fill_bytes(buf);
            if buf.iter().any(|b| *b != 0) {
                return;
            }
        }
    }
}

impl Default for DefaultIDGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultIDGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultIDGenerator")
    }
}

impl IDGenerator for DefaultIDGenerator {
    fn new_trace_id(&self) -> TraceID {
        let mut trace_id: [u8; 16] = [0; 16];
        self.fill(&mut trace_id[..]);
        TraceID(trace_id)
    }

    fn new_span_id(&self) -> SpanID {
        let mut span_id: [u8; 8] = [0; 8];
        self.fill(&mut span_id[..]);
        SpanID(span_id)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    /// Hands out sequential ids starting at 1 so tests can predict them.
    #[derive(Debug, Default)]
    pub struct SequentialIDGenerator(AtomicU64);

    impl IDGenerator for SequentialIDGenerator {
        fn new_trace_id(&self) -> TraceID {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            TraceID(u128::from(n).to_be_bytes())
        }

        fn new_span_id(&self) -> SpanID {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            SpanID(n.to_be_bytes())
        }
    }
}
