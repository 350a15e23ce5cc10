//! Request handlers

pub mod audit;
pub mod auth;
pub mod automation;
pub mod companies;
pub mod custom_fields;
pub mod health;
pub mod mcp;
pub mod notifications;
pub mod statuses;
pub mod tickets;
pub mod tracking;

use serde::{Deserialize, Deserializer};

/// Deserializer for nullable patch fields: an absent field stays `None`
/// via `#[serde(default)]`, an explicit `null` becomes `Some(None)`, and a
/// value becomes `Some(Some(value))`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        note: Option<Option<String>>,
    }

    #[test]
    fn test_double_option_distinguishes_absent_null_and_value() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.note, None);

        let null: Patch = serde_json::from_str(r#"{"note": null}"#).unwrap();
        assert_eq!(null.note, Some(None));

        let value: Patch = serde_json::from_str(r#"{"note": "x"}"#).unwrap();
        assert_eq!(value.note, Some(Some("x".to_string())));
    }
}
