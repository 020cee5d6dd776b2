use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

use crate::basetypes::TraceID;
use crate::context::TraceContext;

/// Sampler decides whether a trace should be sampled and exported.
pub type Sampler = Arc<dyn Fn(SamplingParameters<'_>) -> SamplingDecision + Send + Sync>;

/// SamplingParameters contains the values passed to a Sampler.
pub struct SamplingParameters<'a> {
    /// The inherited context, none when starting a new trace.
    pub parent_context: Option<&'a TraceContext>,
    /// The trace being sampled.
    pub trace_id: &'a TraceID,
    /// The name of the span being started.
    pub name: &'a str,
}

/// SamplingDecision is the result of consulting a Sampler.
pub struct SamplingDecision {
    /// Whether the trace is recorded and exported.
    pub sample: bool,
}

fn upper_bound(fraction: f64) -> u64 {
    (fraction * ((1_u64) << 63) as f64).floor() as u64
}

fn trace_id_position(trace_id: &TraceID) -> u64 {
    BigEndian::read_u64(&trace_id.0[0..8]) >> 1
}

/// should_sample maps the leading eight bytes of trace_id onto [0, 1) and
/// compares the result against rate.
///
/// The answer depends only on its arguments, so every service evaluating the
/// same trace at the same rate agrees without sharing state.
pub fn should_sample(trace_id: &TraceID, rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if !(rate > 0.0) {
        return false;
    }
    trace_id_position(trace_id) < upper_bound(rate)
}

/// probability_sampler returns a Sampler that samples a given fraction of traces.
///
/// It also samples spans whose parents are sampled.
pub fn probability_sampler(mut fraction: f64) -> Sampler {
    if !(fraction > 0.0) {
        fraction = 0.0;
    } else if fraction >= 1.0 {
        return always_sample();
    }

    Arc::new(move |sampling_params: SamplingParameters<'_>| {
        if let Some(parent_context) = sampling_params.parent_context {
            if parent_context.is_sampled() {
                return SamplingDecision { sample: true };
            }
        }
        SamplingDecision {
            sample: should_sample(sampling_params.trace_id, fraction),
        }
    })
}

/// always_sample returns a Sampler that samples every trace.
/// Be careful about using this sampler in a production application with
/// significant traffic: a new trace will be started and exported for every
/// request.
pub fn always_sample() -> Sampler {
    Arc::new(|_sampling_params| SamplingDecision { sample: true })
}

/// never_sample returns a Sampler that samples no traces.
pub fn never_sample() -> Sampler {
    Arc::new(|_sampling_params| SamplingDecision { sample: false })
}
