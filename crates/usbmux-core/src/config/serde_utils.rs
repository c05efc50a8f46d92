//! Shared serialization/deserialization utilities for configuration

/// Helper module for Duration serialization as seconds
///
/// Timeouts and retry delays are written as whole seconds in TOML files.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "usbmux_core::config::serde_utils::duration_secs")]
///     dial_timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize a Duration as seconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize a Duration from seconds (u64)
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Helper for string lists that may also be written as one comma-separated
/// string, the way command-line flags supply them. Empty items are dropped.
pub mod string_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    /// Split a comma-separated string, dropping empty items
    pub fn split(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn serialize<S>(items: &[String], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        items.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(value) => split(&value),
            OneOrMany::Many(items) => items.into_iter().filter(|i| !i.is_empty()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs")]
        timeout: Duration,
        #[serde(with = "string_list", default)]
        files: Vec<String>,
    }

    #[test]
    fn test_duration_secs_serialize() {
        let config = TestConfig {
            timeout: Duration::from_secs(30),
            files: vec![],
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"timeout":30,"files":[]}"#);
    }

    #[test]
    fn test_duration_secs_deserialize() {
        let config: TestConfig = toml::from_str("timeout = 5").unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_string_list_accepts_comma_string() {
        let config: TestConfig =
            toml::from_str(r#"timeout = 1
files = "/local,,/remote,a.dylib,""#).unwrap();
        assert_eq!(config.files, vec!["/local", "/remote", "a.dylib"]);
    }

    #[test]
    fn test_string_list_accepts_array() {
        let config: TestConfig =
            toml::from_str(r#"timeout = 1
files = ["uname", "-a"]"#).unwrap();
        assert_eq!(config.files, vec!["uname", "-a"]);
    }
}
