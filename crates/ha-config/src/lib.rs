//! Configuration loading
//!
//! `configuration.yaml` is read from the config directory with these tags
//! resolved:
//!
//! - `!include path` - another YAML file, relative to the including one
//! - `!secret key` - a value from `secrets.yaml`
//! - `!env_var NAME [default]` - an environment variable
//!
//! ```ignore
//! let config = Configuration::load("/config")?;
//! ```

mod configuration;
mod error;
mod loader;
mod secrets;

pub use configuration::{Configuration, CoreConfig, CONFIG_FILE};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;
