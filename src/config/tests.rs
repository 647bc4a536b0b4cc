use super::*;
use serial_test::serial;

fn clear_env() {
    for var in [
        "RECALL_QDRANT_URL",
        "RECALL_REDIS_URL",
        "RECALL_EMBEDDING_ENDPOINT",
        "RECALL_EMBEDDING_API_KEY",
        "RECALL_EMBEDDING_MODEL",
        "RECALL_EMBEDDING_DIM",
        "RECALL_EMBEDDING_MAX_CHARS",
        "RECALL_EMBEDDING_MAX_RETRIES",
        "RECALL_DENSE_WEIGHT",
        "RECALL_SPARSE_WEIGHT",
        "RECALL_RERANK_ENABLED",
        "RECALL_RERANK_THRESHOLD",
        "RECALL_CALL_TIMEOUT_MS",
    ] {
        unsafe { env::remove_var(var) };
    }
}

#[test]
#[serial]
fn test_defaults_when_env_unset() {
    clear_env();
    let config = Config::from_env().expect("defaults should load");

    assert_eq!(config.qdrant_url, DEFAULT_QDRANT_URL);
    assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
    assert_eq!(config.embedding_dim, 1536);
    assert!(config.rerank_enabled);
    assert_eq!(config.default_weights.dense, 0.7);
    assert_eq!(config.default_weights.sparse, 0.3);
}

#[test]
#[serial]
fn test_env_overrides_are_read() {
    clear_env();
    unsafe {
        env::set_var("RECALL_QDRANT_URL", "http://qdrant.internal:6334");
        env::set_var("RECALL_EMBEDDING_DIM", "768");
        env::set_var("RECALL_DENSE_WEIGHT", "0.5");
        env::set_var("RECALL_SPARSE_WEIGHT", "0.5");
        env::set_var("RECALL_RERANK_ENABLED", "false");
        env::set_var("RECALL_CALL_TIMEOUT_MS", "2500");
    }

    let config = Config::from_env().expect("overrides should load");
    assert_eq!(config.qdrant_url, "http://qdrant.internal:6334");
    assert_eq!(config.embedding_dim, 768);
    assert_eq!(config.default_weights.dense, 0.5);
    assert!(!config.rerank_enabled);
    assert_eq!(config.call_timeout, Duration::from_millis(2500));

    clear_env();
}

#[test]
#[serial]
fn test_invalid_dim_rejected() {
    clear_env();
    unsafe { env::set_var("RECALL_EMBEDDING_DIM", "not-a-number") };
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::ParseError { .. })
    ));
    clear_env();
}

#[test]
#[serial]
fn test_out_of_range_weight_rejected() {
    clear_env();
    unsafe { env::set_var("RECALL_DENSE_WEIGHT", "1.5") };
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidWeight { .. })
    ));
    clear_env();
}

#[test]
#[serial]
fn test_blank_api_key_treated_as_unset() {
    clear_env();
    unsafe { env::set_var("RECALL_EMBEDDING_API_KEY", "   ") };
    let config = Config::from_env().expect("config should load");
    assert!(config.embedding_api_key.is_none());
    clear_env();
}
