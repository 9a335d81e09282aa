//! A sample value: an `f32` with `NaN` meaning "missing" and a custom
//! (de)serialization that maps `NaN` to JSON `null`, matching the wire
//! format used by [`CheckpointFile`](crate::checkpoint::CheckpointFile).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single metric sample value.
///
/// `NaN` is the sentinel for "no data at this slot". Two `MetricValue`s
/// compare equal if they are bit-identical or both `NaN` — ordinary `f32`
/// equality treats `NaN != NaN`, which would break buffer round-trip tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricValue(f32);

impl MetricValue {
    pub const NAN: Self = Self(f32::NAN);

    #[inline]
    pub fn new(v: f32) -> Self {
        Self(v)
    }

    #[inline]
    pub fn is_nan(self) -> bool {
        self.0.is_nan()
    }

    #[inline]
    pub fn get(self) -> f32 {
        self.0
    }

    #[inline]
    pub fn scale(self, factor: f32) -> Self {
        if self.is_nan() {
            self
        } else {
            Self(self.0 * factor)
        }
    }
}

impl PartialEq for MetricValue {
    fn eq(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.0 == other.0
    }
}

impl From<f32> for MetricValue {
    fn from(v: f32) -> Self {
        Self(v)
    }
}

impl From<MetricValue> for f32 {
    fn from(v: MetricValue) -> Self {
        v.0
    }
}

impl Serialize for MetricValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_f32(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<f32>::deserialize(deserializer)?;
        Ok(Self(opt.unwrap_or(f32::NAN)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_round_trips_through_json_as_null() {
        let v = MetricValue::NAN;
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "null");
        let back: MetricValue = serde_json::from_str(&json).unwrap();
        assert!(back.is_nan());
    }

    #[test]
    fn finite_value_round_trips() {
        let v = MetricValue::new(1.5);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "1.5");
        let back: MetricValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn nan_equals_nan() {
        assert_eq!(MetricValue::NAN, MetricValue::NAN);
        assert_ne!(MetricValue::new(1.0), MetricValue::NAN);
    }
}
