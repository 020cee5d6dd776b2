use std::fmt;

/// TraceID is a 16-byte identifier for a set of spans.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct TraceID(pub [u8; 16]);

/// SpanID is an 8-byte identifier for a single span.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct SpanID(pub [u8; 8]);

impl TraceID {
    /// The all-zero trace id, reserved as invalid by the wire format.
    pub const INVALID: TraceID = TraceID([0; 16]);

    /// is_valid reports whether at least one byte is non-zero.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// from_hex decodes exactly 32 hex characters.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u128::from_str_radix(s, 16)
            .ok()
            .map(|v| TraceID(v.to_be_bytes()))
    }
}

impl SpanID {
    /// The all-zero span id, reserved as invalid by the wire format.
    pub const INVALID: SpanID = SpanID([0; 8]);

    /// is_valid reports whether at least one byte is non-zero.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// from_hex decodes exactly 16 hex characters.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(s, 16)
            .ok()
            .map(|v| SpanID(v.to_be_bytes()))
    }
}

impl fmt::Display for TraceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for val in self.0.iter() {
            write!(f, "{:02x}", val)?;
        }
        Ok(())
    }
}

impl fmt::Display for SpanID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for val in self.0.iter() {
            write!(f, "{:02x}", val)?;
        }
        Ok(())
    }
}

/// TraceFlags carries the trace-wide option bits. Bit 0 is "sampled".
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct TraceFlags(pub u8);

impl TraceFlags {
    /// Flag bit set when the trace should be recorded and exported.
    pub const SAMPLED: u8 = 0x01;

    /// Whether the trace should be sampled.
    pub fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED == Self::SAMPLED
    }

    /// with_sampled returns a copy with the sampled bit set or cleared, other
    /// bits untouched.
    pub fn with_sampled(self, sampled: bool) -> Self {
        if sampled {
            TraceFlags(self.0 | Self::SAMPLED)
        } else {
            TraceFlags(self.0 & !Self::SAMPLED)
        }
    }
}

/// All available span kinds.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub enum SpanKind {
    /// Work internal to the service, the default.
    #[default]
    Internal,
    /// Handling of an incoming request.
    Server,
    /// An outgoing request to another service.
    Client,
    /// Work handed off to be processed later.
    Producer,
    /// Processing of work handed off by a producer.
    Consumer,
}

impl SpanKind {
    /// as_str returns the lowercase name used by exporters.
    pub fn as_str(self) -> &'static str {
        match self {
            SpanKind::Internal => "internal",
            SpanKind::Server => "server",
            SpanKind::Client => "client",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AttributeValues are the values of attributes on a span.
#[derive(Clone, PartialEq, Debug)]
pub enum AttributeValue {
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    Int(i64),
    /// A floating point value.
    Float(f64),
    /// A string value.
    String(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

/// Attributes is the key-value set recorded on a span.
///
/// Keys are unique: inserting an existing key replaces its value in place, so
/// iteration follows first-insertion order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Attributes(Vec<(String, AttributeValue)>);

impl Attributes {
    /// new returns an empty set.
    pub fn new() -> Self {
        Attributes(Vec::new())
    }

    /// insert sets key to value, last write wins.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// extend merges every pair of attrs in order.
    pub fn extend<K, V>(&mut self, attrs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        for (k, v) in attrs {
            self.insert(k, v);
        }
    }

    /// get returns the value of key.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// len is the number of distinct keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// is_empty reports whether no attribute is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// iter visits the pairs in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for Attributes {
    type Item = (String, AttributeValue);
    type IntoIter = std::vec::IntoIter<(String, AttributeValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        attrs.extend(iter);
        attrs
    }
}

/// Status is the outcome of a Span.
///
/// Once a span reaches `Ok` or `Error` the status is final.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Status {
    /// No outcome recorded yet.
    #[default]
    Unset,
    /// The work succeeded.
    Ok,
    /// The work failed.
    Error {
        /// description is a human-readable account of the failure.
        description: String,
    },
}

impl Status {
    /// is_unset reports whether no outcome has been recorded.
    pub fn is_unset(&self) -> bool {
        *self == Status::Unset
    }

    /// as_str returns the lowercase name used by exporters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unset => "unset",
            Status::Ok => "ok",
            Status::Error { .. } => "error",
        }
    }
}
