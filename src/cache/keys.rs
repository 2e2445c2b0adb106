//! Key descriptor parsing and version composition
//!
//! Keys can carry metadata in string conventions: a `$` prefix routes the
//! entry to the disk tier and an `@` suffix embeds a version
//! (`"$report@3"`). The conventions are parsed exactly once, at the API
//! boundary, into a [`KeyInfo`]; everything below the boundary works with
//! the structured form.

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// Marker prefix routing a key to the disk-resident tier
pub const DISK_PREFIX: char = '$';

/// Separator embedding a version into a key string
pub const VERSION_SEPARATOR: char = '@';

/// Structured form of a raw key string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Bare key name, markers stripped
    pub name: String,
    /// Version constraint, from the `@` suffix or the explicit argument
    pub version: Option<String>,
    /// Whether the entry is disk-resident
    pub disk: bool,
}

impl KeyInfo {
    /// Parse a raw key, combining it with an optionally supplied version
    ///
    /// An embedded `@` version takes precedence over the explicit argument.
    pub fn parse(raw: &str, explicit_version: Option<&str>) -> Self {
        let (rest, disk) = match raw.strip_prefix(DISK_PREFIX) {
            Some(stripped) => (stripped, true),
            None => (raw, false),
        };
        let (name, embedded) = match rest.rsplit_once(VERSION_SEPARATOR) {
            Some((name, version)) if !version.is_empty() => (name, Some(version)),
            _ => (rest, None),
        };
        Self {
            name: name.to_string(),
            version: embedded
                .map(str::to_string)
                .or_else(|| explicit_version.map(str::to_string)),
            disk,
        }
    }
}

/// Minor component of a `(major, minor)` version pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Minor {
    /// Substitute the per-process session identifier, so entries written in
    /// one run are invalidated in the next
    Auto,
    /// Use the given number as-is
    Value(i64),
    /// Replace the whole combined version string verbatim
    Custom(String),
}

/// Combine a `(major, minor)` pair into a single version string
pub fn combine_version(major: u32, minor: Minor) -> String {
    match minor {
        Minor::Auto => format!("{major}.{}", app_session_id()),
        Minor::Value(n) => format!("{major}.{n}"),
        Minor::Custom(custom) => custom,
    }
}

/// Resolve a raw key plus a `(major, minor)` pair into `(name, version)`
///
/// A version embedded in the key wins over the combined pair.
pub fn key_and_version(raw: &str, major: u32, minor: Minor) -> (String, String) {
    let info = KeyInfo::parse(raw, None);
    let version = info
        .version
        .unwrap_or_else(|| combine_version(major, minor));
    (info.name, version)
}

static SESSION_ID: Lazy<RwLock<i64>> =
    Lazy::new(|| RwLock::new(i64::from(rand::random::<u32>())));

/// The session identifier established once for this process run
pub fn app_session_id() -> i64 {
    *SESSION_ID
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Override the session identifier, for deterministic version defaults in tests
pub fn override_app_session_id(id: i64) {
    *SESSION_ID
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = id;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_plain_key() {
        let info = KeyInfo::parse("simple", None);
        assert_eq!(info.name, "simple");
        assert_eq!(info.version, None);
        assert!(!info.disk);
    }

    #[test]
    fn test_parse_embedded_version() {
        let info = KeyInfo::parse("name@3", None);
        assert_eq!(info.name, "name");
        assert_eq!(info.version.as_deref(), Some("3"));
    }

    #[test]
    fn test_parse_disk_marker() {
        let info = KeyInfo::parse("$report@2", None);
        assert_eq!(info.name, "report");
        assert_eq!(info.version.as_deref(), Some("2"));
        assert!(info.disk);
    }

    #[test]
    fn test_embedded_version_wins() {
        let info = KeyInfo::parse("name@5", Some("2"));
        assert_eq!(info.version.as_deref(), Some("5"));

        let info = KeyInfo::parse("name", Some("2"));
        assert_eq!(info.version.as_deref(), Some("2"));
    }

    #[test]
    fn test_trailing_separator_is_not_a_version() {
        let info = KeyInfo::parse("name@", None);
        assert_eq!(info.name, "name@");
        assert_eq!(info.version, None);
    }

    #[test]
    #[serial]
    fn test_combine_version() {
        assert_eq!(combine_version(1, Minor::Value(2)), "1.2");
        assert_eq!(
            combine_version(1, Minor::Custom("-custom".to_string())),
            "-custom"
        );

        override_app_session_id(424_242);
        assert_eq!(combine_version(3, Minor::Auto), "3.424242");
    }

    #[test]
    #[serial]
    fn test_key_and_version() {
        override_app_session_id(7);

        let (name, version) = key_and_version("mykey", 1, Minor::Value(2));
        assert_eq!(name, "mykey");
        assert_eq!(version, "1.2");

        let (name, version) = key_and_version("mykey@5", 1, Minor::Value(2));
        assert_eq!(name, "mykey");
        assert_eq!(version, "5");

        let (_, version) = key_and_version("mykey", 1, Minor::Auto);
        assert_eq!(version, "1.7");
    }

    #[test]
    #[serial]
    fn test_session_id_override() {
        let original = app_session_id();
        override_app_session_id(99_999);
        assert_eq!(app_session_id(), 99_999);
        override_app_session_id(original);
    }
}
