//! Stream identity: hashing (metric, attribute set) into a stable key.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a metric (name and unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u64);

impl MetricId {
    pub fn new(name: &str, unit: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        unit.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// An attribute value on a data point.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Double(f64),
}

impl Hash for AttrValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Str(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            Self::Bool(v) => {
                1u8.hash(state);
                v.hash(state);
            }
            Self::Int(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            Self::Double(v) => {
                3u8.hash(state);
                v.to_bits().hash(state);
            }
        }
    }
}

/// Attribute set of a data point. Ordered so the hash does not depend on
/// insertion order.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Identity of a single time series: the metric plus a hash of its
/// attribute set. Two points with the same `StreamId` belong to the same
/// series.
///
/// The hash is stable for the lifetime of the process, which is all the
/// stream map needs; it is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId {
    metric: MetricId,
    attrs: u64,
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}", self.metric.0, self.attrs)
    }
}

/// Builds the stream identity for a data point.
pub fn identify(metric: MetricId, attrs: &Attributes) -> StreamId {
    let mut hasher = DefaultHasher::new();
    for (key, value) in attrs {
        key.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    StreamId {
        metric,
        attrs: hasher.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttrValue)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_same_identity_same_id() {
        let metric = MetricId::new("http_requests_total", "1");
        let a = identify(metric, &attrs(&[("method", AttrValue::Str("GET".into()))]));
        let b = identify(metric, &attrs(&[("method", AttrValue::Str("GET".into()))]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let metric = MetricId::new("http_requests_total", "1");
        let a = identify(
            metric,
            &attrs(&[
                ("method", AttrValue::Str("GET".into())),
                ("code", AttrValue::Int(200)),
            ]),
        );
        let b = identify(
            metric,
            &attrs(&[
                ("code", AttrValue::Int(200)),
                ("method", AttrValue::Str("GET".into())),
            ]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_attributes_different_id() {
        let metric = MetricId::new("http_requests_total", "1");
        let a = identify(metric, &attrs(&[("code", AttrValue::Int(200))]));
        let b = identify(metric, &attrs(&[("code", AttrValue::Int(500))]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_metric_different_id() {
        let attrs = attrs(&[("host", AttrValue::Str("a".into()))]);
        let a = identify(MetricId::new("requests", "1"), &attrs);
        let b = identify(MetricId::new("errors", "1"), &attrs);
        assert_ne!(a, b);
    }
}
