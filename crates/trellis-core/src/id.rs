//! Validated identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Unique, stable, human-readable project identifier.
///
/// Project IDs are strings like `"weather-bot"` or `"ping2"`. They must be
/// non-empty and contain only lowercase alphanumeric characters and hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProjectId(String);

/// Deserialize with validation — rejects malformed IDs (e.g. path traversal
/// payloads in crafted project records).
impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl ProjectId {
    /// Create a new `ProjectId`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is empty or contains invalid characters.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        validate_slug_like("project id", &id)?;
        Ok(Self(id))
    }

    /// Create a `ProjectId` without validation (for tests and internal use).
    #[must_use]
    pub fn from_static(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// URL-facing project name, the `{slug}` segment of `/r/{slug}/...`.
///
/// Slugs obey the same character rules as [`ProjectId`] but are a distinct
/// type: the collaborator store owns the slug → project mapping and slugs
/// may be renamed independently of the stable id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProjectSlug(String);

impl<'de> Deserialize<'de> for ProjectSlug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl ProjectSlug {
    /// Create a new `ProjectSlug`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the slug is empty or contains invalid characters.
    pub fn new(slug: impl Into<String>) -> CoreResult<Self> {
        let slug = slug.into();
        validate_slug_like("project slug", &slug)?;
        Ok(Self(slug))
    }

    /// Create a `ProjectSlug` without validation (for tests and internal use).
    #[must_use]
    pub fn from_static(slug: &str) -> Self {
        Self(slug.to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque index into a service instance's handler table.
///
/// Routes, scheduled jobs, and delayed tasks all reference their script-side
/// handler through one of these. The value is assigned by the script during
/// boot and only meaningful to that instance generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(pub u32);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn validate_slug_like(kind: &str, value: &str) -> CoreResult<()> {
    if value.is_empty() {
        return Err(CoreError::InvalidId(format!("{kind} must not be empty")));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(CoreError::InvalidId(format!(
            "{kind} must contain only lowercase alphanumeric characters and hyphens, got: {value}"
        )));
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(CoreError::InvalidId(format!(
            "{kind} must not start or end with a hyphen, got: {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_project_ids() {
        assert!(ProjectId::new("weather-bot").is_ok());
        assert!(ProjectId::new("ping2").is_ok());
        assert!(ProjectId::new("a").is_ok());
    }

    #[test]
    fn invalid_project_ids() {
        assert!(ProjectId::new("").is_err());
        assert!(ProjectId::new("WeatherBot").is_err());
        assert!(ProjectId::new("my project").is_err());
        assert!(ProjectId::new("my_project").is_err());
        assert!(ProjectId::new("-project").is_err());
        assert!(ProjectId::new("project-").is_err());
        assert!(ProjectId::new("../escape").is_err());
    }

    #[test]
    fn project_id_display() {
        let id = ProjectId::new("my-project").unwrap();
        assert_eq!(id.to_string(), "my-project");
        assert_eq!(id.as_str(), "my-project");
    }

    #[test]
    fn project_id_serde_round_trip() {
        let id = ProjectId::new("my-project").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"my-project\"");
        let back: ProjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn project_id_deserialize_rejects_invalid() {
        let result: Result<ProjectId, _> = serde_json::from_str("\"../escape\"");
        assert!(result.is_err());
    }

    #[test]
    fn slug_validation_matches_id_rules() {
        assert!(ProjectSlug::new("my-service").is_ok());
        assert!(ProjectSlug::new("My-Service").is_err());
        assert!(ProjectSlug::new("").is_err());
    }

    #[test]
    fn handler_id_is_transparent_in_json() {
        let id = HandlerId(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: HandlerId = serde_json::from_str("7").unwrap();
        assert_eq!(back, id);
    }
}
