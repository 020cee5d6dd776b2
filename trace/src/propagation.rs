use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::basetypes::{SpanID, TraceFlags, TraceID};
use crate::context::TraceContext;

/// TRACEPARENT_HEADER is the header carrying the trace context. Lookup is
/// case-insensitive.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const SUPPORTED_VERSION: &str = "00";

/// traceparent format:
///
/// `<version>-<trace_id>-<span_id>-<trace_flags>`
///
/// version: 2 hex characters, only `00` is understood.
/// trace_id: 32 hex characters, not all zero.
/// span_id: 16 hex characters, not all zero. This is the span id of the
/// caller, which becomes the parent of the receiver's spans.
/// trace_flags: 2 hex characters, bit 0 is "sampled".
///
/// All hex is lowercase. Valid value example:
///
/// `00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
const TRACEPARENT_FORMAT: &str = r"^([0-9a-f]{2})-([0-9a-f]{32})-([0-9a-f]{16})-([0-9a-f]{2})$";

lazy_static! {
    static ref TRACEPARENT_RE: Regex = Regex::new(TRACEPARENT_FORMAT).unwrap();
}

/// parse_traceparent returns the TraceContext represented by header.
///
/// A malformed header, an unsupported version, or an all-zero trace or span
/// id yields None. The parsed context has no parent span id: the wire format
/// does not carry one.
pub fn parse_traceparent(header: &str) -> Option<TraceContext> {
    let caps = TRACEPARENT_RE.captures(header.trim())?;
    if &caps[1] != SUPPORTED_VERSION {
        return None;
    }

    let trace_id = TraceID::from_hex(&caps[2])?;
    let span_id = SpanID::from_hex(&caps[3])?;
    if !trace_id.is_valid() || !span_id.is_valid() {
        return None;
    }
    let trace_flags = TraceFlags(u8::from_str_radix(&caps[4], 16).ok()?);

    Some(TraceContext {
        trace_id,
        span_id,
        parent_span_id: None,
        trace_flags,
    })
}

/// format_traceparent returns the header value for trace_context, always at
/// version 00.
pub fn format_traceparent(trace_context: &TraceContext) -> String {
    format!(
        "{}-{}-{}-{:02x}",
        SUPPORTED_VERSION, trace_context.trace_id, trace_context.span_id, trace_context.trace_flags.0
    )
}

/// Extractor reads header values from an incoming carrier.
pub trait Extractor {
    /// get returns the value of key, matching the name case-insensitively.
    fn get(&self, key: &str) -> Option<&str>;
}

/// Injector writes header values into an outgoing carrier.
pub trait Injector {
    /// set stores value under key, replacing any previous value.
    fn set(&mut self, key: &str, value: String);
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        if let Some(value) = HashMap::get(self, key) {
            return Some(value.as_str());
        }
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.retain(|k, _| !k.eq_ignore_ascii_case(key));
        self.insert(key.to_string(), value);
    }
}

impl Extractor for [(String, String)] {
    fn get(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

impl Extractor for Vec<(String, String)> {
    fn get(&self, key: &str) -> Option<&str> {
        Extractor::get(self.as_slice(), key)
    }
}

impl Injector for Vec<(String, String)> {
    fn set(&mut self, key: &str, value: String) {
        self.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.push((key.to_string(), value));
    }
}

/// extract reads the traceparent header from headers.
pub fn extract(headers: &dyn Extractor) -> Option<TraceContext> {
    headers.get(TRACEPARENT_HEADER).and_then(parse_traceparent)
}

/// inject writes trace_context into headers under the traceparent header.
pub fn inject(trace_context: &TraceContext, headers: &mut dyn Injector) {
    headers.set(TRACEPARENT_HEADER, format_traceparent(trace_context));
}
