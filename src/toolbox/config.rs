//! BusyBox build configuration and `.config` patching.

use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BuildError;
use crate::loader;

/// Options every toolbox build starts from.
pub const DEFAULT_CONFIG: &[(&str, &str)] = &[("CONFIG_TC", "n"), ("CONFIG_STATIC", "y")];

/// An ordered `KEY -> VALUE` list of Kconfig options.
pub type ConfigOptions = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolboxBuildConfig {
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    /// Mirrors, tried in order.
    pub urls: Vec<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub cross_compile: CrossCompile,
    #[serde(default)]
    pub config_patch: Vec<String>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub extra_config: ConfigOptions,
    /// Relative to the rootfs; defaults to the rootfs root.
    #[serde(default)]
    pub install_prefix: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CrossCompile {
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub compiler_prefix: Option<String>,
    #[serde(default)]
    pub cflags: String,
    #[serde(default)]
    pub ldflags: String,
}

impl ToolboxBuildConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = loader::load(path)?;
        if let Err(message) = config.validate() {
            return Err(BuildError::ConfigSchema {
                path: path.to_path_buf(),
                message,
            }
            .into());
        }
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.version.trim().is_empty() {
            return Err("'version' is empty".into());
        }
        if self.version.contains('/') {
            return Err(format!("'version' must not contain '/': {}", self.version));
        }
        if self.urls.iter().all(|url| url.trim().is_empty()) {
            return Err("'urls' must list at least one mirror".into());
        }
        if let Some(sum) = &self.sha256 {
            if sum.len() != 64 || !sum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(format!("'sha256' is not a hex SHA-256 digest: {}", sum));
            }
        }
        if let Some(prefix) = &self.install_prefix {
            if crate::fhs::rootfs_path(&prefix.to_string_lossy()).is_err() && !is_rootfs_root(prefix) {
                return Err(format!(
                    "'install_prefix' must stay inside the rootfs: {}",
                    prefix.display()
                ));
            }
        }
        Ok(())
    }

    /// `busybox-<version>`
    pub fn source_dir_name(&self) -> String {
        format!("busybox-{}", self.version)
    }

    pub fn tarball_name(&self) -> String {
        format!("{}.tar.bz2", self.source_dir_name())
    }

    /// Effective options: defaults, then `config_patch`, then `extra_config`.
    pub fn effective_options(&self) -> ConfigOptions {
        let defaults: ConfigOptions = DEFAULT_CONFIG
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        resolve_config_layers(&defaults, &parse_patch_list(&self.config_patch), &self.extra_config)
    }
}

/// `/` or `.`: the rootfs itself.
pub(crate) fn is_rootfs_root(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, std::path::Component::RootDir | std::path::Component::CurDir))
}

/// Parse `KEY=VALUE` lines; blank lines, `#` comments and lines without `=` are skipped.
pub fn parse_patch_list(lines: &[String]) -> ConfigOptions {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Merge option layers, later layers winning.
///
/// A key keeps the position of its first appearance; only its value changes.
pub fn resolve_config_layers(
    defaults: &[(String, String)],
    patch: &[(String, String)],
    extra: &[(String, String)],
) -> ConfigOptions {
    let mut merged: ConfigOptions = Vec::new();
    for (key, value) in defaults.iter().chain(patch).chain(extra) {
        match merged.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.clone(),
            None => merged.push((key.clone(), value.clone())),
        }
    }
    merged
}

/// Set each option in Kconfig text.
///
/// The first `KEY=...` or `# KEY is not set` line is replaced in place,
/// otherwise `KEY=VALUE` is appended.
pub fn apply_config_options(text: &str, options: &[(String, String)]) -> String {
    let mut lines: Vec<String> = text.lines().map(String::from).collect();

    for (key, value) in options {
        let assignment = format!("{}=", key);
        let unset = format!("# {} is not set", key);
        let replacement = format!("{}={}", key, value);

        match lines
            .iter_mut()
            .find(|line| line.starts_with(&assignment) || line.trim_end() == unset)
        {
            Some(line) => *line = replacement,
            None => lines.push(replacement),
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Patch `<source_dir>/.config` in place.
pub fn patch_config_file(source_dir: &Path, options: &[(String, String)]) -> Result<()> {
    let config = source_dir.join(".config");
    if !config.is_file() {
        return Err(BuildError::MissingArtifact {
            what: "BusyBox .config (did defconfig run?)".to_string(),
            path: config,
        }
        .into());
    }

    let text = fs::read_to_string(&config)
        .with_context(|| format!("Failed to read {}", config.display()))?;
    fs::write(&config, apply_config_options(&text, options))
        .with_context(|| format!("Failed to write {}", config.display()))?;

    let keys: Vec<&str> = options.iter().map(|(k, _)| k.as_str()).collect();
    tracing::info!("Patched .config: {}", keys.join(", "));
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    fn into_kconfig(self) -> String {
        match self {
            Scalar::Bool(true) => "y".to_string(),
            Scalar::Bool(false) => "n".to_string(),
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Str(s) => s,
        }
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(Scalar::into_kconfig)
}

/// A mapping of scalars, kept in document order.
fn scalar_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ConfigOptions, D::Error> {
    struct ScalarMapVisitor;

    impl<'de> Visitor<'de> for ScalarMapVisitor {
        type Value = ConfigOptions;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of option names to scalar values")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut options = Vec::new();
            while let Some((key, value)) = map.next_entry::<String, Scalar>()? {
                options.push((key, value.into_kconfig()));
            }
            Ok(options)
        }
    }

    deserializer.deserialize_any(ScalarMapVisitor)
}
