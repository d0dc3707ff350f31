//! Serde adapters for config and status fields
//!
//! Durations are written as plain integers so the TOML stays hand-editable,
//! and key material as standard base64 strings.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

fn write_duration<S: Serializer>(value: u128, serializer: S) -> Result<S::Ok, S::Error> {
    let value = u64::try_from(value).map_err(serde::ser::Error::custom)?;
    serializer.serialize_u64(value)
}

/// `Duration` as whole seconds
///
/// ```ignore
/// #[serde(with = "hv_core::config::serde_utils::duration_secs")]
/// timeout: Duration,
/// ```
pub mod duration_secs {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        write_duration(u128::from(duration.as_secs()), serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// `Duration` as whole milliseconds, for short poll intervals
pub mod duration_millis {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        write_duration(duration.as_millis(), serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Byte blob as a standard base64 string
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::de::Error;

    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timings {
        #[serde(with = "duration_secs")]
        timeout: Duration,
        #[serde(with = "duration_millis")]
        poll: Duration,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn test_durations_in_toml() {
        let timings = Timings {
            timeout: Duration::from_secs(30),
            poll: Duration::from_millis(250),
        };
        let text = toml::to_string(&timings).unwrap();
        assert_eq!(text, "timeout = 30\npoll = 250\n");
        assert_eq!(toml::from_str::<Timings>(&text).unwrap(), timings);
    }

    #[test]
    fn test_sub_second_timeout_truncates() {
        let timings = Timings {
            timeout: Duration::from_millis(1500),
            poll: Duration::ZERO,
        };
        let value = serde_json::to_value(&timings).unwrap();
        assert_eq!(value["timeout"], 1);
    }

    #[test]
    fn test_base64_bytes() {
        let blob = Blob {
            data: vec![0, 1, 2, 255],
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, r#"{"data":"AAEC/w=="}"#);
        assert!(serde_json::from_str::<Blob>(r#"{"data":"%%"}"#).is_err());
    }
}
