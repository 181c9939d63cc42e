use crate::types::*;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// On-disk form of a family graph
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub persons: Vec<Person>,
    #[serde(default)]
    pub edges: Vec<SnapshotEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEdge {
    #[serde(default)]
    pub edge_id: Option<EdgeId>,
    pub person_id: PersonId,
    pub related_person_id: PersonId,
    pub relationship_type: RelationshipType,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotFormat {
    Json,
    Yaml,
}

impl SnapshotFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                SnapshotFormat::Yaml
            }
            _ => SnapshotFormat::Json,
        }
    }
}

impl SnapshotEdge {
    pub fn into_edge(self, edge_id: EdgeId) -> KinshipEdge {
        KinshipEdge {
            edge_id,
            person_id: self.person_id,
            related_person_id: self.related_person_id,
            relationship_type: self.relationship_type,
            is_active: self.is_active,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

impl From<&KinshipEdge> for SnapshotEdge {
    fn from(edge: &KinshipEdge) -> Self {
        Self {
            edge_id: Some(edge.edge_id),
            person_id: edge.person_id,
            related_person_id: edge.related_person_id,
            relationship_type: edge.relationship_type,
            is_active: edge.is_active,
            start_date: edge.start_date,
            end_date: edge.end_date,
        }
    }
}

impl GraphSnapshot {
    /// Load a snapshot; `.yml`/`.yaml` files are read as YAML, anything else as JSON
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading graph snapshot from: {:?}", path);

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph snapshot from {:?}", path))?;

        let snapshot: GraphSnapshot = match SnapshotFormat::for_path(path) {
            SnapshotFormat::Json => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON graph snapshot {:?}", path))?,
            SnapshotFormat::Yaml => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML graph snapshot {:?}", path))?,
        };

        info!(
            "Loaded graph snapshot with {} persons and {} edges",
            snapshot.persons.len(),
            snapshot.edges.len()
        );
        Ok(snapshot)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = match SnapshotFormat::for_path(path) {
            SnapshotFormat::Json => serde_json::to_string_pretty(self)?,
            SnapshotFormat::Yaml => serde_yaml::to_string(self)?,
        };

        fs::write(path, content)
            .with_context(|| format!("Failed to write graph snapshot to {:?}", path))?;
        info!("Graph snapshot written to: {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::Builder;

    fn sample() -> GraphSnapshot {
        GraphSnapshot {
            persons: vec![
                Person {
                    person_id: 1,
                    first_name: "Ravi".to_string(),
                    last_name: "Sharma".to_string(),
                    gender_id: Some(1),
                    birth_year: Some(1960),
                    ..Default::default()
                },
                Person {
                    person_id: 2,
                    first_name: "Meena".to_string(),
                    last_name: "Sharma".to_string(),
                    gender_id: Some(2),
                    ..Default::default()
                },
            ],
            edges: vec![SnapshotEdge {
                edge_id: None,
                person_id: 1,
                related_person_id: 2,
                relationship_type: RelationshipType::Wife,
                is_active: true,
                start_date: NaiveDate::from_ymd_opt(1985, 2, 14),
                end_date: None,
            }],
        }
    }

    #[test]
    fn test_snapshot_save_and_load_json() {
        let file = Builder::new().suffix(".json").tempfile().unwrap();
        let snapshot = sample();

        snapshot.save_to_file(file.path()).unwrap();
        let loaded = GraphSnapshot::load_from_file(file.path()).unwrap();

        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_snapshot_save_and_load_yaml() {
        let file = Builder::new().suffix(".yaml").tempfile().unwrap();
        let snapshot = sample();

        snapshot.save_to_file(file.path()).unwrap();
        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("relationship_type: WIFE"));

        let loaded = GraphSnapshot::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_edge_rows_default_to_active() {
        let json = r#"{
            "persons": [],
            "edges": [{"person_id": 1, "related_person_id": 2, "relationship_type": "SPOUSE"}]
        }"#;
        let snapshot: GraphSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.edges[0].is_active);
        assert_eq!(snapshot.edges[0].edge_id, None);
    }
}
