// ── Core identity type ──
//
// Every entity the backend pushes is named `<domain>.<object_id>`
// (e.g. `weather.home`, `calendar.family`). The domain prefix decides
// which attribute shape the entity carries.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Canonical identifier for a backend entity.
///
/// Stored verbatim; identifiers without a `.` have an empty domain and
/// are treated as generic entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the first `.`, or `""` if there is none.
    pub fn domain(&self) -> &str {
        self.0.split_once('.').map_or("", |(domain, _)| domain)
    }

    /// The part after the first `.`, or the whole id if there is none.
    pub fn object_id(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(_, object)| object)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn splits_domain_and_object_id() {
        let id = EntityId::from("weather.home");
        assert_eq!(id.domain(), "weather");
        assert_eq!(id.object_id(), "home");
    }

    #[test]
    fn only_first_dot_separates_domain() {
        let id = EntityId::from("calendar.work.shared");
        assert_eq!(id.domain(), "calendar");
        assert_eq!(id.object_id(), "work.shared");
    }

    #[test]
    fn id_without_domain() {
        let id = EntityId::from("orphan");
        assert_eq!(id.domain(), "");
        assert_eq!(id.object_id(), "orphan");
    }

    #[test]
    fn parses_and_displays_verbatim() {
        let id: EntityId = "sensor.living_room".parse().unwrap();
        assert_eq!(id.to_string(), "sensor.living_room");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = EntityId::from("calendar.a");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"calendar.a\"");
    }
}
