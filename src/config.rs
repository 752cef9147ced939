//! Configuration loading
//!
//! The config file (`shorewall.toml` or `shorewall.json`) holds the node
//! identity, module settings, custom content classes and the module
//! parameters. Command-line flags are layered on top by the commands.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::FileAttributes;
use crate::paths;
use crate::resource::Provider;
use crate::template::{ProviderRegistry, TemplateProvider, TemplateRegistry};

/// Base name of the config file inside the config directory
const CONFIG_NAME: &str = "shorewall";

/// Parameters of the module, the knobs a user turns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Exact package version to pin
    pub version: Option<String>,
    /// Remove the package and its configuration
    pub absent: bool,
    /// Compute changes without applying them
    pub noop: bool,
    /// Template reference for the configuration file
    pub template: Option<String>,
    /// Extra template variables
    pub options: BTreeMap<String, String>,
    /// Source URI for the configuration file
    pub source: Option<String>,
    /// Source URI for the whole configuration directory
    pub source_dir: Option<String>,
    /// Remove local files that are not in `source_dir`
    pub source_dir_purge: bool,
    /// Content provider class for the configuration file
    pub my_class: Option<String>,
}

/// Where the module puts things on the managed host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub package: String,
    pub config_file: String,
    pub config_dir: String,
    pub default_template: String,
    pub attributes: FileAttributes,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            package: "shorewall".to_string(),
            config_file: "/etc/shorewall/shorewall.conf".to_string(),
            config_dir: "/etc/shorewall".to_string(),
            default_template: crate::template::DEFAULT_TEMPLATE.to_string(),
            attributes: FileAttributes::default(),
        }
    }
}

/// The managed node as seen by templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub fqdn: String,
    pub facts: BTreeMap<String, String>,
}

/// Contents of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the managed node; detected when unset
    pub fqdn: Option<String>,
    /// Package backend used by `apply`
    pub provider: Provider,
    /// Root of modules holding `templates/` and `files/`
    pub module_path: Option<String>,
    pub facts: BTreeMap<String, String>,
    pub module: ModuleSettings,
    /// Custom content classes, class name to template reference
    pub classes: BTreeMap<String, String>,
    pub params: Parameters,
}

impl Config {
    /// Load the config from an explicit path, or from the config directory
    ///
    /// A missing default config yields the defaults; a missing explicit
    /// path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(path),
            None => {
                let dir = paths::config_dir()?;
                match find_config(&dir) {
                    Some(path) => Self::load_file(&path),
                    None => {
                        log::debug!("No config in {}, using defaults", dir.display());
                        Ok(Self::default())
                    }
                }
            }
        }
    }

    /// Parse a TOML or JSON config file, chosen by extension
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        log::debug!("Loading config from {}", path.display());

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display())),
            Some("toml") | None => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display())),
            Some(other) => bail!("Unsupported config format: .{other}"),
        }
    }

    /// Expanded module path
    pub fn module_path(&self) -> Option<PathBuf> {
        self.module_path.as_deref().map(paths::expand)
    }

    /// Template registry with built-ins and the module path
    pub fn templates(&self) -> TemplateRegistry {
        TemplateRegistry::with_builtins().with_module_path(self.module_path())
    }

    /// Provider registry with built-ins and the configured classes
    pub fn providers(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::with_builtins();
        for (class, template) in &self.classes {
            registry.register(class.clone(), Box::new(TemplateProvider::new(template.clone())));
        }
        registry
    }

    /// Resolve the node, letting `fqdn_override` win
    pub fn node(&self, fqdn_override: Option<&str>) -> Node {
        let fqdn = fqdn_override
            .map(str::to_string)
            .or_else(|| self.fqdn.clone())
            .unwrap_or_else(detect_fqdn);
        Node {
            fqdn,
            facts: self.facts.clone(),
        }
    }
}

fn find_config(dir: &Path) -> Option<PathBuf> {
    ["toml", "json"]
        .iter()
        .map(|ext| dir.join(format!("{CONFIG_NAME}.{ext}")))
        .find(|p| p.is_file())
}

/// Best effort host name: $HOSTNAME, then /etc/hostname, then "localhost"
fn detect_fqdn() -> String {
    if let Ok(name) = std::env::var("HOSTNAME")
        && !name.trim().is_empty()
    {
        return name.trim().to_string();
    }
    if let Ok(name) = fs::read_to_string("/etc/hostname")
        && !name.trim().is_empty()
    {
        return name.trim().to_string();
    }
    log::warn!("Could not determine host name, using 'localhost'");
    "localhost".to_string()
}

/// Parse `key=value` pairs given on the command line
pub fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Expected key=value, got '{pair}'"))?;
            Ok((key.trim().to_string(), value.to_string()))
        })
        .collect()
}
