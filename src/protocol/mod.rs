use chrono::Utc;

/// Metric type letter carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Timer,
}

impl MetricKind {
    /// Maps the wire suffix (`c`, `g`, `ms`) to a kind.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "c" => Some(Self::Counter),
            "g" => Some(Self::Gauge),
            "ms" => Some(Self::Timer),
            _ => None,
        }
    }

    /// Returns the kind name for logging and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Timer => "timer",
        }
    }
}

/// A single parsed in-flight sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    /// Metric identifier, non-empty.
    pub name: String,
    /// Finite sample value.
    pub value: f64,
    /// Routing kind.
    pub kind: MetricKind,
    /// Ingestion wall-clock time, Unix seconds.
    pub timestamp: i64,
}

/// Parses one textual sample of the form `<name>:<value>|<type>`.
///
/// The value grammar is `[0-9.]+`: no sign, no exponent. The name may itself
/// contain `:`; the split happens at the last colon. Leading/trailing
/// whitespace and a trailing newline are tolerated. Anything that does not
/// match yields `None` and is dropped by the caller without further notice.
pub fn parse_line(line: &str) -> Option<Datapoint> {
    let line = line.trim();
    let (name, rest) = line.rsplit_once(':')?;
    let (value_str, kind_str) = rest.split_once('|')?;

    if name.is_empty() || value_str.is_empty() {
        return None;
    }

    if !value_str.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }

    let kind = MetricKind::from_wire(kind_str)?;

    // Grammar-valid strings like "1.2.3" still fail float parsing; finite is
    // guaranteed by the grammar but checked anyway.
    let value: f64 = value_str.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(Datapoint {
        name: name.to_string(),
        value,
        kind,
        timestamp: Utc::now().timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counter() {
        let d = parse_line("hits:1|c").expect("valid counter");
        assert_eq!(d.name, "hits");
        assert_eq!(d.value, 1.0);
        assert_eq!(d.kind, MetricKind::Counter);
    }

    #[test]
    fn test_parse_gauge_with_fraction() {
        let d = parse_line("temp:72.5|g").expect("valid gauge");
        assert_eq!(d.name, "temp");
        assert!((d.value - 72.5).abs() < f64::EPSILON);
        assert_eq!(d.kind, MetricKind::Gauge);
    }

    #[test]
    fn test_parse_timer() {
        let d = parse_line("lat:10|ms").expect("valid timer");
        assert_eq!(d.name, "lat");
        assert_eq!(d.value, 10.0);
        assert_eq!(d.kind, MetricKind::Timer);
    }

    #[test]
    fn test_parse_name_with_colons() {
        // The name capture is greedy: split at the last colon.
        let d = parse_line("app:web:requests:5|c").expect("valid");
        assert_eq!(d.name, "app:web:requests");
        assert_eq!(d.value, 5.0);
    }

    #[test]
    fn test_parse_tolerates_trailing_newline() {
        let d = parse_line("hits:1|c\n").expect("valid");
        assert_eq!(d.name, "hits");
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        let d = parse_line("  hits:3|c  ").expect("valid");
        assert_eq!(d.value, 3.0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_line("garbage").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line("no pipes here:12").is_none());
    }

    #[test]
    fn test_parse_rejects_negative_value() {
        assert!(parse_line("x:-1|c").is_none());
    }

    #[test]
    fn test_parse_rejects_exponent() {
        assert!(parse_line("x:1e3|c").is_none());
    }

    #[test]
    fn test_parse_rejects_multi_dot_value() {
        assert!(parse_line("x:1.2.3|c").is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(parse_line("x:1|q").is_none());
        assert!(parse_line("x:1|msx").is_none());
        assert!(parse_line("x:1|").is_none());
    }

    #[test]
    fn test_parse_rejects_empty_name() {
        assert!(parse_line(":1|c").is_none());
    }

    #[test]
    fn test_parse_rejects_empty_value() {
        assert!(parse_line("x:|c").is_none());
    }

    #[test]
    fn test_ingest_timestamp_is_now() {
        let before = Utc::now().timestamp();
        let d = parse_line("hits:1|c").expect("valid");
        let after = Utc::now().timestamp();
        assert!(d.timestamp >= before && d.timestamp <= after);
    }
}
