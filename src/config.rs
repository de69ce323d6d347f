use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::TargetName;
use crate::error::CollateError;

pub const DEFAULT_CONFIG_FILENAME: &str = "config.json";
pub const DEFAULT_MANIFEST_PATH: &str = "processing/database/crystals.json";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub target_name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputEntry>,
    #[serde(default)]
    pub overrides: Overrides,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputEntry {
    Shorthand(Utf8PathBuf),
    Detailed(InputEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct InputEntryObject {
    pub dir: Utf8PathBuf,
    #[serde(default)]
    pub manifest: Option<Utf8PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Overrides {
    #[serde(default)]
    pub deprecations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    pub dir: Utf8PathBuf,
    pub manifest: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_path: Option<Utf8PathBuf>,
    pub base_dir: Option<Utf8PathBuf>,
    pub output_dir: Utf8PathBuf,
    pub target_name: TargetName,
    pub inputs: Vec<InputSource>,
    pub deprecations: BTreeMap<String, String>,
}

impl ResolvedConfig {
    pub fn expand(&self, path: &Utf8Path) -> Utf8PathBuf {
        crate::fs_util::prepend_base(self.base_dir.as_deref(), path)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&Utf8Path>) -> Result<ResolvedConfig, CollateError> {
        let config_path = path
            .map(Utf8Path::to_owned)
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_CONFIG_FILENAME));

        if !config_path.as_std_path().exists() {
            return Err(CollateError::MissingConfig(config_path));
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| CollateError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CollateError::ConfigParse(err.to_string()))?;

        let mut resolved = Self::resolve_config(config)?;
        resolved.config_path = Some(config_path);
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CollateError> {
        let output_dir = config
            .output_dir
            .ok_or_else(|| CollateError::ConfigParse("output_dir is not defined".to_string()))?;
        let target_name = config
            .target_name
            .ok_or_else(|| CollateError::ConfigParse("target_name is not defined".to_string()))?
            .parse()?;
        if config.inputs.is_empty() {
            return Err(CollateError::ConfigParse(
                "inputs are not defined".to_string(),
            ));
        }

        let inputs = config
            .inputs
            .into_iter()
            .map(|entry| match entry {
                InputEntry::Shorthand(dir) => InputSource {
                    manifest: dir.join(DEFAULT_MANIFEST_PATH),
                    dir,
                },
                InputEntry::Detailed(obj) => InputSource {
                    manifest: match obj.manifest {
                        Some(manifest) if manifest.is_absolute() => manifest,
                        Some(manifest) => obj.dir.join(manifest),
                        None => obj.dir.join(DEFAULT_MANIFEST_PATH),
                    },
                    dir: obj.dir,
                },
            })
            .collect();

        Ok(ResolvedConfig {
            config_path: None,
            base_dir: config.base_dir,
            output_dir,
            target_name,
            inputs,
            deprecations: config.overrides.deprecations,
        })
    }
}
