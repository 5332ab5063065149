use crate::errors::CassetteError;
use crate::recorder::RecordMode;
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "CASSETTE_CONFIG";
pub const RECORD_MODE_ENV: &str = "CASSETTE_RECORD_MODE";

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub mode: Option<RecordMode>,
}

impl ConfigOverrides {
    /// Read overrides from the environment through `lookup`.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CassetteError> {
        let mode = match lookup(RECORD_MODE_ENV) {
            Some(raw) => Some(raw.parse::<RecordMode>().map_err(|e| {
                CassetteError::InvalidConfig(format!("{RECORD_MODE_ENV}: {e}"))
            })?),
            None => None,
        };
        Ok(Self {
            config_path: lookup(CONFIG_PATH_ENV).map(PathBuf::from),
            mode,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CassetteConfig {
    pub recorder: RecorderConfig,
    pub collaborators: BTreeMap<String, CollaboratorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RecorderConfig {
    pub mode: RecordMode,
    pub cassette: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CollaboratorConfig {
    #[serde(default)]
    pub side_effects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialCassetteConfig {
    recorder: Option<PartialRecorderConfig>,
    collaborators: Option<BTreeMap<String, CollaboratorConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecorderConfig {
    mode: Option<RecordMode>,
    cassette: Option<PathBuf>,
}

pub fn load_config(
    overrides: &ConfigOverrides,
    fs: &dyn FileSystem,
) -> Result<CassetteConfig, CassetteError> {
    let mut cfg = CassetteConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialCassetteConfig = toml::from_str(&file_contents)
            .map_err(|e| CassetteError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
        if let Some(base) = path.parent() {
            absolutize_cassette(&mut cfg, base);
        }
    }

    if let Some(mode) = overrides.mode {
        cfg.recorder.mode = mode;
    }

    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut CassetteConfig, partial: PartialCassetteConfig) {
    if let Some(recorder) = partial.recorder {
        if let Some(mode) = recorder.mode {
            cfg.recorder.mode = mode;
        }
        if let Some(cassette) = recorder.cassette {
            cfg.recorder.cassette = Some(cassette);
        }
    }

    if let Some(collaborators) = partial.collaborators {
        cfg.collaborators = collaborators;
    }
}

// Cassette paths in a config file are relative to that file.
fn absolutize_cassette(cfg: &mut CassetteConfig, base: &Path) {
    if let Some(path) = &cfg.recorder.cassette {
        if path.is_relative() {
            cfg.recorder.cassette = Some(base.join(path));
        }
    }
}

fn validate_config(cfg: &CassetteConfig) -> Result<(), CassetteError> {
    for (name, collaborator) in &cfg.collaborators {
        if name.trim().is_empty() {
            return Err(CassetteError::InvalidConfig(
                "collaborator names must not be blank".to_string(),
            ));
        }
        if name.contains('-') {
            return Err(CassetteError::InvalidConfig(format!(
                "collaborator name `{name}` must not contain `-`"
            )));
        }
        if collaborator.side_effects.iter().any(|m| m.trim().is_empty()) {
            return Err(CassetteError::InvalidConfig(format!(
                "collaborators.{name}.side_effects contains a blank method name"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_config, ConfigOverrides, RECORD_MODE_ENV};
    use crate::errors::CassetteError;
    use crate::recorder::RecordMode;
    use crate::runtime::FakeFileSystem;
    use std::path::PathBuf;

    fn overrides(path: &str) -> ConfigOverrides {
        ConfigOverrides {
            config_path: Some(PathBuf::from(path)),
            mode: None,
        }
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let cfg = load_config(&ConfigOverrides::default(), &FakeFileSystem::default())
            .expect("defaults");
        assert_eq!(cfg.recorder.mode, RecordMode::NewEpisodes);
        assert!(cfg.recorder.cassette.is_none());
        assert!(cfg.collaborators.is_empty());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let fs = FakeFileSystem::with_file(
            "/repo/tests/cassette.toml",
            r#"
[recorder]
mode = "none"
cassette = "fixtures/tape.jsonl"

[collaborators.Counter]
side_effects = ["increment", "reset"]

[collaborators.Clock]
"#,
        );
        let cfg = load_config(&overrides("/repo/tests/cassette.toml"), &fs).expect("load");
        assert_eq!(cfg.recorder.mode, RecordMode::None);
        assert_eq!(
            cfg.recorder.cassette,
            Some(PathBuf::from("/repo/tests/fixtures/tape.jsonl"))
        );
        assert_eq!(cfg.collaborators["Counter"].side_effects, ["increment", "reset"]);
        assert!(cfg.collaborators["Clock"].side_effects.is_empty());
    }

    #[test]
    fn explicit_mode_override_wins_over_file() {
        let fs = FakeFileSystem::with_file("/c.toml", "[recorder]\nmode = \"none\"\n");
        let cfg = load_config(
            &ConfigOverrides {
                config_path: Some(PathBuf::from("/c.toml")),
                mode: Some(RecordMode::All),
            },
            &fs,
        )
        .expect("load");
        assert_eq!(cfg.recorder.mode, RecordMode::All);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let fs = FakeFileSystem::with_file("/c.toml", "[recorder\nmode=");
        let err = load_config(&overrides("/c.toml"), &fs).expect_err("parse error");
        assert!(matches!(err, CassetteError::ConfigParse(_)));
    }

    #[test]
    fn dashed_collaborator_names_are_rejected() {
        let fs = FakeFileSystem::with_file("/c.toml", "[collaborators.Http-Client]\n");
        let err = load_config(&overrides("/c.toml"), &fs).expect_err("invalid");
        assert!(matches!(err, CassetteError::InvalidConfig(_)));
    }

    #[test]
    fn blank_side_effect_names_are_rejected() {
        let fs = FakeFileSystem::with_file(
            "/c.toml",
            "[collaborators.Counter]\nside_effects = [\"increment\", \"  \"]\n",
        );
        let err = load_config(&overrides("/c.toml"), &fs).expect_err("invalid");
        assert!(err.to_string().contains("blank method name"));
    }

    #[test]
    fn env_overrides_parse_mode_and_path() {
        let parsed = ConfigOverrides::from_env(|name| match name {
            "CASSETTE_CONFIG" => Some("/etc/cassette.toml".to_string()),
            "CASSETTE_RECORD_MODE" => Some("all".to_string()),
            _ => None,
        })
        .expect("env");
        assert_eq!(parsed.config_path, Some(PathBuf::from("/etc/cassette.toml")));
        assert_eq!(parsed.mode, Some(RecordMode::All));

        let err = ConfigOverrides::from_env(|name| {
            (name == RECORD_MODE_ENV).then(|| "sometimes".to_string())
        })
        .expect_err("bad mode");
        assert!(err.to_string().contains(RECORD_MODE_ENV));
    }
}
