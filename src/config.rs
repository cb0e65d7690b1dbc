//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.fedttest.toml` files.

use crate::models::{OrganizationId, TestMethod};
use crate::privacy;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".fedttest.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Participating organizations.
    #[serde(default)]
    pub organizations: Vec<OrganizationConfig>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Significance level used for presentation and `--fail-on-significant`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Test used to compare the two organizations.
    #[serde(default)]
    pub method: TestMethod,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: OutputFormat::default(),
            alpha: default_alpha(),
            method: TestMethod::default(),
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("ttest_report.md")
}

fn default_alpha() -> f64 {
    0.05
}

/// Settings of the dispatch to organizations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-organization timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    300
}

/// One organization (data station).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    /// Organization identifier used in requests.
    pub id: OrganizationId,

    /// Human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// CSV dataset for an in-process node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<PathBuf>,

    /// Base URL of a remote node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Organization-local privacy threshold (in-process nodes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_number_of_records: Option<u64>,
}

/// Where an organization's partial computation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeLocation<'a> {
    Dataset(&'a Path),
    Endpoint(&'a str),
}

impl OrganizationConfig {
    /// Resolve the node location; exactly one of `dataset` and `endpoint`.
    pub fn location(&self) -> Result<NodeLocation<'_>> {
        match (&self.dataset, &self.endpoint) {
            (Some(path), None) => Ok(NodeLocation::Dataset(path)),
            (None, Some(url)) => Ok(NodeLocation::Endpoint(url)),
            (Some(_), Some(_)) => bail!(
                "Organization {} sets both 'dataset' and 'endpoint'",
                self.id
            ),
            (None, None) => bail!(
                "Organization {} needs either 'dataset' or 'endpoint'",
                self.id
            ),
        }
    }

    /// Minimum record count: configured value, then environment, then default.
    pub fn minimum_records(&self) -> u64 {
        self.minimum_number_of_records
            .unwrap_or_else(privacy::minimum_from_env)
    }

    /// Name for display, falling back to the id.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("organization {}", self.id))
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check organization entries for duplicates and bad locations.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for org in &self.organizations {
            if !seen.insert(org.id) {
                bail!("Organization {} is configured more than once", org.id);
            }
            org.location()?;
        }

        if !(self.general.alpha > 0.0 && self.general.alpha < 1.0) {
            bail!("alpha must be between 0 and 1 (exclusive)");
        }
        if self.dispatch.timeout_seconds == 0 {
            bail!("timeout_seconds must be at least 1");
        }

        Ok(())
    }

    /// Look up an organization by id.
    pub fn organization(&self, id: OrganizationId) -> Option<&OrganizationConfig> {
        self.organizations.iter().find(|o| o.id == id)
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::AggregateArgs) {
        if let Some(ref output) = args.output {
            self.general.output = output.clone();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if let Some(alpha) = args.alpha {
            self.general.alpha = alpha;
        }
        if let Some(method) = args.method {
            self.general.method = method;
        }
        if let Some(timeout) = args.timeout {
            self.dispatch.timeout_seconds = timeout;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.organizations = vec![
            OrganizationConfig {
                id: 1,
                name: Some("station-a".to_string()),
                dataset: Some(PathBuf::from("data/station_a.csv")),
                endpoint: None,
                minimum_number_of_records: Some(privacy::DEFAULT_MINIMUM_NUMBER_OF_RECORDS),
            },
            OrganizationConfig {
                id: 2,
                name: Some("station-b".to_string()),
                dataset: None,
                endpoint: Some("http://station-b.example:8080".to_string()),
                minimum_number_of_records: None,
            },
        ];
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
