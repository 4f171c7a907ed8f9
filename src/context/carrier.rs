//! Immutable per-request trace/correlation carrier.
//!
//! Identifiers follow the W3C Trace Context wire format: a 128-bit trace id
//! and 64-bit span ids, hex-rendered in the `traceparent` header. Baggage is
//! an ordered list of key/value pairs carried alongside.

use std::fmt;

use uuid::Uuid;

/// Name of the W3C trace context header.
pub const TRACEPARENT: &str = "traceparent";

/// Name of the W3C baggage header.
pub const BAGGAGE: &str = "baggage";

/// Opaque 128-bit trace identifier shared by every span of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Generate a fresh non-zero trace id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    /// Parse from 32 lowercase hex characters. Zero is invalid per spec.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 {
            return None;
        }
        u128::from_str_radix(s, 16).ok().filter(|v| *v != 0).map(Self)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Opaque 64-bit span identifier, unique within one trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Generate a fresh non-zero span id.
    pub fn generate() -> Self {
        Self(fastrand::u64(1..=u64::MAX))
    }

    /// Parse from 16 lowercase hex characters. Zero is invalid per spec.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 {
            return None;
        }
        u64::from_str_radix(s, 16).ok().filter(|v| *v != 0).map(Self)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Immutable per-request identifiers used to correlate logs, metrics, and
/// traces across every asynchronous hop.
///
/// A carrier is created once at request ingress and passed by value through
/// every downstream call. [`ContextCarrier::derive_child`] produces a new
/// carrier for a sub-operation; neither call mutates the original.
#[derive(Debug, Clone)]
pub struct ContextCarrier {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    baggage: Vec<(String, String)>,
}

impl ContextCarrier {
    /// Fresh root carrier: new trace, new span, no parent.
    pub fn new() -> Self {
        Self {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            baggage: Vec::new(),
        }
    }

    /// Derive a child carrier: same trace id, fresh span id, parent set to
    /// this carrier's span. Baggage is inherited.
    pub fn derive_child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: Some(self.span_id),
            baggage: self.baggage.clone(),
        }
    }

    /// Parse trace identifiers from inbound headers.
    ///
    /// A valid `traceparent` continues the remote trace: the local span is a
    /// fresh child of the remote span. Absent or malformed identifiers fall
    /// back to fresh generation; extraction never fails a request.
    pub fn extract<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut traceparent = None;
        let mut baggage_raw = None;
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(TRACEPARENT) {
                traceparent = Some(value);
            } else if name.eq_ignore_ascii_case(BAGGAGE) {
                baggage_raw = Some(value);
            }
        }

        let mut carrier = match traceparent.and_then(parse_traceparent) {
            Some((trace_id, remote_span)) => Self {
                trace_id,
                span_id: SpanId::generate(),
                parent_span_id: Some(remote_span),
                baggage: Vec::new(),
            },
            None => Self::new(),
        };

        if let Some(raw) = baggage_raw {
            carrier.baggage = parse_baggage(raw);
        }

        carrier
    }

    /// Attach this carrier's identifiers to an outbound header list.
    ///
    /// Writes `traceparent` and, when baggage is present, `baggage`. The
    /// carrier itself is not mutated.
    pub fn inject(&self, headers: &mut Vec<(String, String)>) {
        headers.push((TRACEPARENT.to_string(), self.traceparent()));
        if !self.baggage.is_empty() {
            let encoded = self
                .baggage
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            headers.push((BAGGAGE.to_string(), encoded));
        }
    }

    /// Render the W3C `traceparent` value for this carrier.
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }

    /// New carrier with one baggage entry appended. Insertion order is
    /// preserved.
    pub fn with_baggage(&self, key: &str, value: &str) -> Self {
        let mut child = self.clone();
        child.baggage.push((key.to_string(), value.to_string()));
        child
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// Baggage entries in insertion order.
    pub fn baggage(&self) -> &[(String, String)] {
        &self.baggage
    }
}

impl Default for ContextCarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `00-{trace_id}-{span_id}-{flags}`. Any deviation yields `None`.
fn parse_traceparent(value: &str) -> Option<(TraceId, SpanId)> {
    let mut parts = value.trim().split('-');
    let version = parts.next()?;
    if version != "00" {
        return None;
    }
    let trace_id = TraceId::from_hex(parts.next()?)?;
    let span_id = SpanId::from_hex(parts.next()?)?;
    // Flags must be present (ignored beyond that).
    parts.next()?;
    Some((trace_id, span_id))
}

fn parse_baggage(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            let k = k.trim();
            let v = v.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shares_trace_id() {
        let root = ContextCarrier::new();
        let child = root.derive_child();
        assert_eq!(child.trace_id(), root.trace_id());
        assert_ne!(child.span_id(), root.span_id());
        assert_eq!(child.parent_span_id(), Some(root.span_id()));
    }

    #[test]
    fn test_extract_valid_traceparent() {
        let headers = vec![(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
        )];
        let carrier = ContextCarrier::extract(headers);
        assert_eq!(
            carrier.trace_id().to_string(),
            "0af7651916cd43dd8448eb211c80319c"
        );
        // Local span is a fresh child of the remote span.
        assert_eq!(
            carrier.parent_span_id().unwrap().to_string(),
            "b7ad6b7169203331"
        );
        assert_ne!(carrier.span_id().to_string(), "b7ad6b7169203331");
    }

    #[test]
    fn test_extract_malformed_falls_back_to_fresh() {
        for bad in [
            "garbage",
            "00-short-b7ad6b7169203331-01",
            "00-00000000000000000000000000000000-b7ad6b7169203331-01",
            "ff-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319c-0000000000000000-01",
        ] {
            let carrier = ContextCarrier::extract(vec![("traceparent", bad)]);
            assert!(carrier.parent_span_id().is_none(), "accepted: {}", bad);
        }
    }

    #[test]
    fn test_extract_absent_generates_fresh() {
        let a = ContextCarrier::extract(Vec::<(&str, &str)>::new());
        let b = ContextCarrier::extract(Vec::<(&str, &str)>::new());
        assert_ne!(a.trace_id(), b.trace_id());
        assert!(a.parent_span_id().is_none());
    }

    #[test]
    fn test_inject_round_trips() {
        let root = ContextCarrier::new().with_baggage("tenant", "acme");
        let mut headers = Vec::new();
        root.inject(&mut headers);

        let extracted = ContextCarrier::extract(
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        assert_eq!(extracted.trace_id(), root.trace_id());
        assert_eq!(extracted.parent_span_id(), Some(root.span_id()));
        assert_eq!(extracted.baggage(), root.baggage());
    }

    #[test]
    fn test_baggage_preserves_order() {
        let carrier = ContextCarrier::new()
            .with_baggage("b", "2")
            .with_baggage("a", "1");
        let keys: Vec<_> = carrier.baggage().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
