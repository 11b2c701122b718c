//! Configuration file parsing for skein.toml.

use serde::Deserialize;
use skein_analysis::{FlagTable, ModuleConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Config file names searched for, in order, in each directory.
const CONFIG_NAMES: &[&str] = &["skein.toml", ".skein.toml"];

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Worker threads; `0` or absent picks a default
    pub threads: Option<usize>,

    /// Configuration every module starts from
    #[serde(default)]
    pub analysis: ModuleConfig,

    /// Tunables applied before the command line's `--flag` options
    #[serde(default)]
    pub flags: BTreeMap<String, FlagSetting>,

    /// Module lookup settings
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Directory of the file this was loaded from
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

/// Value of a `[flags]` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FlagSetting {
    Bool(bool),
    Int(i64),
}

/// Module lookup configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ResolveConfig {
    /// Directories searched for required modules, relative to the config file
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

impl Config {
    /// The `[flags]` table as a flag table.
    pub fn flag_table(&self) -> FlagTable {
        self.flags
            .iter()
            .fold(FlagTable::new(), |table, (name, setting)| match *setting {
                FlagSetting::Bool(value) => table.with_bool(name.as_str(), value),
                FlagSetting::Int(value) => table.with_int(name.as_str(), value),
            })
    }

    /// Search directories with relative entries anchored at the config file.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.resolve
            .paths
            .iter()
            .map(|path| match &self.root {
                Some(root) if path.is_relative() => root.join(path),
                _ => path.clone(),
            })
            .collect()
    }
}

/// Load configuration from a file or search for a default config file.
///
/// An explicit `path` must exist; without one, a missing config file just
/// means defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        return parse_config_file(path);
    }

    let found = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file(&cwd));
    match found {
        Some(path) => parse_config_file(&path),
        None => Ok(Config::default()),
    }
}

fn parse_config_file(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    config.root = path.parent().map(Path::to_path_buf);
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Search for a configuration file in `start` and its ancestors.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_analysis::{LintCode, Mode};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.threads.is_none());
        assert_eq!(config.analysis, ModuleConfig::default());
        assert!(config.flag_table().is_empty());
        assert!(config.search_paths().is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
threads = 4

[analysis]
mode = "strict"
globals = ["game", "workspace"]
fatal_lint = ["LocalUnused"]

[flags]
DebugLogCheckToJson = true
ParseErrorLimit = 10

[resolve]
paths = ["src", "/opt/lib"]
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.root = Some(PathBuf::from("/project"));

        assert_eq!(config.threads, Some(4));
        assert_eq!(config.analysis.mode, Mode::Strict);
        assert!(config.analysis.is_global("workspace"));
        assert!(config.analysis.fatal_lint.contains(LintCode::LocalUnused));

        let flags: Vec<_> = config.flag_table().entries().map(|(n, _)| n.to_string()).collect();
        assert_eq!(flags, vec!["DebugLogCheckToJson", "ParseErrorLimit"]);

        assert_eq!(
            config.search_paths(),
            vec![PathBuf::from("/project/src"), PathBuf::from("/opt/lib")]
        );
    }

    #[test]
    fn test_unknown_lint_rule_is_rejected() {
        let toml = "[analysis]\nfatal_lint = [\"NoSuchRule\"]\n";
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_find_config_in_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(find_config_file(&nested).is_none());

        std::fs::write(dir.path().join("skein.toml"), "threads = 2\n").unwrap();
        assert_eq!(find_config_file(&nested), Some(dir.path().join("skein.toml")));
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[resolve]\npaths = [\"lib\"]\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.root.as_deref(), Some(dir.path()));
        assert_eq!(config.search_paths(), vec![dir.path().join("lib")]);

        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_malformed_config_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skein.toml");
        std::fs::write(&path, "threads = \"many\"\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err().to_string();
        assert!(err.contains("skein.toml"), "{err}");
    }
}
