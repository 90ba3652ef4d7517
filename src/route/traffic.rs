//! Traffic incident feed.

use serde::{Deserialize, Serialize};

use super::ProviderError;
use crate::core::{BoundingBox, GeoPoint};

/// Incident severity, as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    #[default]
    Minor,
    Moderate,
    Major,
}

/// A reported incident (accident, closure, roadworks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub location: GeoPoint,
    pub description: String,
    #[serde(default)]
    pub severity: IncidentSeverity,
}

/// Source of traffic incidents inside a bounding box.
pub trait TrafficFeed: Send + Sync {
    fn incidents(&self, bbox: &BoundingBox) -> Result<Vec<Incident>, ProviderError>;
}

/// Fixed incident list, filtered by bounding box.
#[derive(Debug, Clone, Default)]
pub struct StaticTrafficFeed {
    incidents: Vec<Incident>,
}

impl StaticTrafficFeed {
    pub fn new(incidents: Vec<Incident>) -> Self {
        Self { incidents }
    }

    /// Load a JSON array of incidents.
    pub fn load(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&content)?))
    }
}

impl TrafficFeed for StaticTrafficFeed {
    fn incidents(&self, bbox: &BoundingBox) -> Result<Vec<Incident>, ProviderError> {
        Ok(self
            .incidents
            .iter()
            .filter(|i| bbox.contains(&i.location))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_feed_filters_by_bbox() {
        let feed = StaticTrafficFeed::new(vec![
            Incident {
                id: "a".into(),
                location: GeoPoint::new(0.001, 0.001),
                description: "Accident".into(),
                severity: IncidentSeverity::Major,
            },
            Incident {
                id: "b".into(),
                location: GeoPoint::new(1.0, 1.0),
                description: "Roadworks".into(),
                severity: IncidentSeverity::Minor,
            },
        ]);
        let bbox = BoundingBox {
            min: GeoPoint::new(0.0, 0.0),
            max: GeoPoint::new(0.01, 0.01),
        };

        let found = feed.incidents(&bbox).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[test]
    fn test_incident_json_defaults() {
        let json = r#"[{"id":"x","location":{"latitude":1.0,"longitude":2.0},"description":"Closure"}]"#;
        let incidents: Vec<Incident> = serde_json::from_str(json).unwrap();
        assert_eq!(incidents[0].severity, IncidentSeverity::Minor);
    }
}
