// Configuration management module
// TOML settings plus the console helpers behind the `config` command

pub mod display;
pub mod settings;

pub use display::{init_config, show_config};
pub use settings::{Config, ConfigError, GenerationConfig, OllamaConfig};
