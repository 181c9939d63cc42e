/// Configuration management for the kinship graph service
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::traversal::partner_match::DEFAULT_PARTNER_MAX_DEPTH;
use crate::types::{default_gender_entries, Depth, GenderEntry, GenderTable};

pub const ENV_PREFIX: &str = "KINSHIP";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub traversal: TraversalSettings,
    pub genders: Vec<GenderEntry>,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraversalSettings {
    pub default_partner_max_depth: Depth,
    /// Ceiling for any caller-supplied depth
    pub max_depth_limit: Depth,
    pub default_living_only: bool,
    pub query_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    /// JSON or YAML graph snapshot loaded by the CLI
    pub snapshot_path: Option<PathBuf>,
}

impl Default for TraversalSettings {
    fn default() -> Self {
        Self {
            default_partner_max_depth: DEFAULT_PARTNER_MAX_DEPTH,
            max_depth_limit: 10,
            default_living_only: true,
            query_timeout_seconds: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            traversal: TraversalSettings::default(),
            genders: default_gender_entries(),
            store: StoreSettings::default(),
        }
    }
}

impl Config {
    /// Layer defaults, then the optional YAML file, then `KINSHIP_*` variables.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `KINSHIP_TRAVERSAL__MAX_DEPTH_LIMIT=8`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Config::default())
            .context("Failed to build default configuration")?;

        let mut builder = ::config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, without environment overrides
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn gender_table(&self) -> GenderTable {
        GenderTable::new(self.genders.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let traversal = &self.traversal;

        if traversal.max_depth_limit == 0 {
            return Err(anyhow::anyhow!("max_depth_limit must be greater than 0"));
        }

        if traversal.default_partner_max_depth == 0
            || traversal.default_partner_max_depth > traversal.max_depth_limit
        {
            return Err(anyhow::anyhow!(
                "default_partner_max_depth must be between 1 and max_depth_limit ({})",
                traversal.max_depth_limit
            ));
        }

        if traversal.query_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Query timeout must be greater than 0"));
        }

        if self.genders.is_empty() {
            return Err(anyhow::anyhow!("At least one gender entry is required"));
        }

        for (i, entry) in self.genders.iter().enumerate() {
            let duplicate = self.genders[..i]
                .iter()
                .any(|other| other.id == entry.id || other.code.eq_ignore_ascii_case(&entry.code));
            if duplicate {
                return Err(anyhow::anyhow!(
                    "Duplicate gender entry {} ({})",
                    entry.id,
                    entry.code
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sex;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_config_save_and_load() {
        let mut config = Config::default();
        config.store.snapshot_path = Some(PathBuf::from("family.json"));
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).await.unwrap();
        let loaded_config = Config::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config, loaded_config);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.traversal.query_timeout_seconds = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.traversal.default_partner_max_depth = 11;
        assert!(config.validate().is_err());

        config = Config::default();
        config.genders.push(GenderEntry {
            id: 4,
            code: "m".to_string(),
            sex: Some(Sex::Male),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_gender_table() {
        let table = Config::default().gender_table();
        assert_eq!(table.id_for_code("M"), Some(1));
        assert_eq!(table.sex_of(Some(2)), Some(Sex::Female));
    }

    /// The only test touching `KINSHIP_*` variables, so it cannot race another
    #[test]
    fn test_layering_defaults_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "traversal:\n  max_depth_limit: 8\n  query_timeout_seconds: 5\nstore:\n  snapshot_path: graph.yaml"
        )
        .unwrap();

        std::env::set_var("KINSHIP_TRAVERSAL__QUERY_TIMEOUT_SECONDS", "12");
        let config = Config::load(Some(file.path()));
        std::env::remove_var("KINSHIP_TRAVERSAL__QUERY_TIMEOUT_SECONDS");
        let config = config.unwrap();

        // File beats defaults, environment beats file
        assert_eq!(config.traversal.max_depth_limit, 8);
        assert_eq!(config.traversal.query_timeout_seconds, 12);
        assert_eq!(config.traversal.default_partner_max_depth, 5);
        assert_eq!(config.store.snapshot_path, Some(PathBuf::from("graph.yaml")));
        assert_eq!(config.genders, default_gender_entries());

        assert!(Config::load(Some(Path::new("/nonexistent/kinship.yaml"))).is_err());
    }
}
