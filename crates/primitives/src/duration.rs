//! Serde adapters for [`Duration`] fields.

use std::time::Duration;

/// (De)serializes a [`Duration`] as a whole number of seconds.
pub mod secs {
    use super::*;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let secs = <u64 as serde::Deserialize>::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// (De)serializes a [`Duration`] as fractional milliseconds.
pub mod millis {
    use super::*;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let millis = <f64 as serde::Deserialize>::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(serde::de::Error::custom(format!("invalid duration: {millis}ms")));
        }
        Ok(Duration::from_secs_f64(millis / 1000.0))
    }
}
