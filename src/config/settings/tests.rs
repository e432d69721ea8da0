use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.generation.model, "gemma2:2b");
    assert_eq!(config.generation.max_attempts, 3);
    assert_eq!(config.generation.retry_delay_ms, 2000);
    assert_eq!(config.generation.query_token_budget, 16);
    assert_eq!(config.generation.summary_token_budget, 64);
    assert!(!config.generation.semantic_cache);
    assert_eq!(config.chunking.max_chars, 800);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.generation.max_attempts = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidAttempts(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.generation.temperature = 3.5;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.generation.semantic_cache_max_distance = Some(-1.0);
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.chunking.max_chars = 10;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidChunkSize(10))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_config_uses_defaults() {
    let partial_toml = r#"
        [generation]
        model = "llama3"
        semantic_cache = true
    "#;

    let config: Config = toml::from_str(partial_toml).expect("partial config should parse");
    assert_eq!(config.generation.model, "llama3");
    assert!(config.generation.semantic_cache);
    assert_eq!(config.generation.max_attempts, 3);
    assert_eq!(config.ollama.port, 11434);
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::load(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.generation, GenerationConfig::default());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut config = Config {
        base_dir: temp_dir.path().join("nested"),
        ..Config::default()
    };
    config.generation.semantic_cache = true;
    config.generation.semantic_cache_max_distance = Some(0.25);
    config.save().expect("should save config");

    let loaded = Config::load(temp_dir.path().join("nested")).expect("should load config");
    assert_eq!(config, loaded);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[generation]\nmax_attempts = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn derived_paths() {
    let config = Config {
        base_dir: PathBuf::from("/data/rag"),
        ..Config::default()
    };
    assert_eq!(
        config.document_index_path(),
        PathBuf::from("/data/rag/document_index")
    );
    assert_eq!(
        config.semantic_cache_path(),
        PathBuf::from("/data/rag/response_cache")
    );
    assert_eq!(
        config.document_path(),
        PathBuf::from("/data/rag/document.json")
    );
}
