//! Text-blob codec.
//!
//! Serialized-collection properties are stored in a sibling TEXT column on
//! the same row. The codec contract is deliberately narrow: one function
//! each way, JSON-backed.

use crate::Result;
use crate::error::Error;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialize a value into its text-column form.
#[allow(clippy::result_large_err)]
pub fn to_text<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Serde(e.to_string()))
}

/// Deserialize a value from its text-column form.
#[allow(clippy::result_large_err)]
pub fn from_text<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| Error::Serde(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Tags {
        names: Vec<String>,
    }

    #[test]
    fn round_trip() {
        let tags = Tags {
            names: vec!["a".to_string(), "b".to_string()],
        };
        let text = to_text(&tags).unwrap();
        let back: Tags = from_text(&text).unwrap();
        assert_eq!(back, tags);
    }

    #[test]
    fn malformed_text_is_a_serde_error() {
        let err = from_text::<Tags>("{not json").unwrap_err();
        assert!(matches!(err, Error::Serde(_)));
    }
}
