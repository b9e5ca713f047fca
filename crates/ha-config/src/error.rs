use std::path::PathBuf;

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("secret '{key}' not found in secrets.yaml")]
    SecretNotFound { key: String },

    #[error("environment variable '{var}' not set")]
    EnvVarNotFound { var: String },

    #[error("{tag} expects a string, got {found}")]
    TagArgument { tag: String, found: String },

    #[error("circular include of {path}")]
    CircularInclude { path: PathBuf },

    #[error("invalid `{section}` section: {source}")]
    Section {
        section: String,
        #[source]
        source: serde_yaml::Error,
    },
}
