//! YAML loading with the `!include`, `!secret` and `!env_var` tags

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;

pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files being loaded, outermost first
    stack: Vec<PathBuf>,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            stack: Vec::new(),
        }
    }

    /// Load `path`, relative to the config directory unless absolute
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.config_dir.join(path.as_ref());
        self.read(path)
    }

    fn read(&mut self, path: PathBuf) -> ConfigResult<Value> {
        if self.stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }
        debug!(?path, "loading YAML");
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;

        self.stack.push(path.clone());
        let loaded = self.load_str(&content, &path);
        self.stack.pop();
        loaded
    }

    /// Parse `content` as if read from `origin`, which anchors `!include`
    pub fn load_str(&mut self, content: &str, origin: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::ParseYaml {
            path: origin.to_path_buf(),
            source,
        })?;
        self.resolve(value, origin)
    }

    fn resolve(&mut self, value: Value, origin: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, origin),
            Value::Mapping(map) => {
                let mut resolved = Mapping::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve(value, origin)?);
                }
                Ok(Value::Mapping(resolved))
            }
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item, origin))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, origin: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!(%tag, "resolving tag");
        match tag.as_str() {
            "!include" => {
                let relative = tag_argument(&tag, &tagged.value)?;
                let base = origin.parent().unwrap_or(&self.config_dir).to_path_buf();
                self.read(base.join(relative))
            }
            "!secret" => {
                let key = tag_argument(&tag, &tagged.value)?;
                Ok(Value::String(self.secrets.get(key)?.to_string()))
            }
            "!env_var" => {
                // `!env_var NAME [default]`
                let argument = tag_argument(&tag, &tagged.value)?;
                let (name, default) = match argument.split_once(char::is_whitespace) {
                    Some((name, default)) => (name, Some(default.trim())),
                    None => (argument, None),
                };
                match (std::env::var(name), default) {
                    (Ok(value), _) => Ok(Value::String(value)),
                    (Err(_), Some(default)) => Ok(Value::String(default.to_string())),
                    (Err(_), None) => Err(ConfigError::EnvVarNotFound { var: name.to_string() }),
                }
            }
            _ => {
                let value = self.resolve(tagged.value, origin)?;
                Ok(Value::Tagged(Box::new(TaggedValue { tag: tagged.tag, value })))
            }
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn tag_argument<'a>(tag: &str, value: &'a Value) -> ConfigResult<&'a str> {
    value.as_str().ok_or_else(|| ConfigError::TagArgument {
        tag: tag.to_string(),
        found: format!("{value:?}"),
    })
}

/// Load `file` from `config_dir` with tags resolved
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn get<'a>(value: &'a Value, key: &str) -> &'a Value {
        &value[key]
    }

    #[test]
    fn test_include_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("helpers")).unwrap();
        fs::write(dir.path().join("helpers/numbers.yaml"), "tv_volume:\n  min: 0\n  max: 100\n").unwrap();
        fs::write(dir.path().join("helpers/all.yaml"), "input_number: !include numbers.yaml\n").unwrap();
        fs::write(dir.path().join("configuration.yaml"), "helpers: !include helpers/all.yaml\n").unwrap();

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        let max = &get(get(get(&value, "helpers"), "input_number"), "tv_volume")["max"];
        assert_eq!(max.as_u64(), Some(100));
    }

    #[test]
    fn test_secret_and_env_var() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secrets.yaml"), "broker_password: hunter2\n").unwrap();
        std::env::set_var("HA_CONFIG_TEST_BROKER", "10.0.0.5");
        fs::write(
            dir.path().join("configuration.yaml"),
            "mqtt:\n  host: !env_var HA_CONFIG_TEST_BROKER\n  password: !secret broker_password\n  client_id: !env_var HA_CONFIG_TEST_UNSET fallback\n",
        )
        .unwrap();

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        let mqtt = get(&value, "mqtt");
        assert_eq!(mqtt["host"].as_str(), Some("10.0.0.5"));
        assert_eq!(mqtt["password"].as_str(), Some("hunter2"));
        assert_eq!(mqtt["client_id"].as_str(), Some("fallback"));
        std::env::remove_var("HA_CONFIG_TEST_BROKER");
    }

    #[test]
    fn test_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), "b: !include b.yaml\n").unwrap();
        fs::write(dir.path().join("b.yaml"), "a: !include a.yaml\n").unwrap();
        fs::write(dir.path().join("secret.yaml"), "password: !secret nope\n").unwrap();
        fs::write(dir.path().join("env.yaml"), "host: !env_var HA_CONFIG_TEST_NEVER_SET\n").unwrap();

        assert!(matches!(
            load_yaml(dir.path(), "a.yaml"),
            Err(ConfigError::CircularInclude { .. })
        ));
        assert!(matches!(
            load_yaml(dir.path(), "secret.yaml"),
            Err(ConfigError::SecretNotFound { .. })
        ));
        assert!(matches!(
            load_yaml(dir.path(), "env.yaml"),
            Err(ConfigError::EnvVarNotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_tags_are_kept() {
        let dir = TempDir::new().unwrap();
        let mut loader = YamlLoader::with_secrets(dir.path(), Secrets::default());
        let value = loader
            .load_str("icon: !custom mdi:tv\n", &dir.path().join("inline.yaml"))
            .unwrap();
        assert!(matches!(value["icon"], Value::Tagged(_)));
    }
}
