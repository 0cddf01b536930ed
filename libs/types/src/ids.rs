//! Identifier types for series, datasets, vintages and runs
//!
//! Series and dataset identifiers are opaque strings supplied by the catalog.
//! Vintage and run identifiers use UUID v7 so archived versions and run
//! reports sort chronologically by their embedded timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of one series (the catalog's `px_code`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeriesId(String);

impl SeriesId {
    /// Create a new SeriesId
    ///
    /// # Panics
    /// Panics if the identifier is empty
    pub fn new(id: impl Into<String>) -> Self {
        let s = id.into();
        assert!(!s.trim().is_empty(), "SeriesId must not be empty");
        Self(s)
    }

    /// Try to create a SeriesId, returning None if empty
    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        let s = id.into();
        if s.trim().is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SeriesId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl TryFrom<String> for SeriesId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::try_new(s).ok_or_else(|| "SeriesId must not be empty".to_string())
    }
}

impl From<SeriesId> for String {
    fn from(id: SeriesId) -> Self {
        id.0
    }
}

/// Dataset a series belongs to (e.g. "ipca", "pnadct").
///
/// Stored lowercase so catalog spelling differences do not split a dataset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for an archived vintage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VintageId(Uuid);

impl VintageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VintageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VintageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_id_creation() {
        let id = SeriesId::new("PX_IPCA_0001");
        assert_eq!(id.as_str(), "PX_IPCA_0001");
        assert_eq!(id.to_string(), "PX_IPCA_0001");
    }

    #[test]
    fn test_series_id_try_new() {
        assert!(SeriesId::try_new("PX_1").is_some());
        assert!(SeriesId::try_new("   ").is_none());
    }

    #[test]
    #[should_panic(expected = "SeriesId must not be empty")]
    fn test_series_id_empty() {
        SeriesId::new("");
    }

    #[test]
    fn test_series_id_serialization() {
        let id = SeriesId::new("PX_PMC_12");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"PX_PMC_12\"");
        let back: SeriesId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_series_id_empty_rejected_on_deserialize() {
        assert!(serde_json::from_str::<SeriesId>("\"\"").is_err());
        assert!(serde_json::from_str::<SeriesId>("\"  \"").is_err());
    }

    #[test]
    fn test_dataset_id_normalized() {
        assert_eq!(DatasetId::new(" IPCA "), DatasetId::new("ipca"));
    }

    #[test]
    fn test_vintage_id_creation() {
        let a = VintageId::new();
        let b = VintageId::new();
        assert_ne!(a, b);
    }
}
