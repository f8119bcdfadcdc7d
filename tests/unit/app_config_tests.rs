/*!
 * Tests for configuration loading, defaults and backend selection
 */

use transhub::app_config::{Config, LogLevel, PipelineMode, TranslationProvider};
use transhub::translation::backend_from_config;

use crate::common::{create_temp_dir, create_test_file};

#[test]
fn test_loadOrCreate_missingFile_shouldWriteDefaults() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("transhub.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config.source_language, "en");
    assert_eq!(config.language, "pt-BR");
    assert_eq!(config.mode, PipelineMode::Direct);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.review_output.is_none());

    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded.translation.common.batch_size, config.translation.common.batch_size);
    assert_eq!(reloaded.translation.available_providers.len(), 8);
}

#[test]
fn test_loadOrCreate_existingFile_shouldReadValues() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(
        dir.path(),
        "transhub.json",
        r#"{
            "language": "es",
            "mode": "quality",
            "translation": {
                "provider": "ollama",
                "available_providers": [{"type": "ollama", "model": "qwen2.5:7b"}],
                "common": {"batch_size": 25, "max_concurrent_batches": 2}
            },
            "quality": {"threshold": 0.9},
            "log_level": "debug"
        }"#,
    )
    .unwrap();

    let config = Config::load_or_create(&path).unwrap();

    assert_eq!(config.language, "es");
    assert_eq!(config.mode, PipelineMode::Quality);
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.get_model(), "qwen2.5:7b");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:11434");
    assert_eq!(config.translation.common.batch_size, 25);
    assert_eq!(config.translation.common.max_retry_wait_seconds, 60);
    assert_eq!(config.quality.threshold, 0.9);
    assert_eq!(config.quality.max_length_ratio, 3.0);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.validate().is_ok());
}

#[test]
fn test_loadOrCreate_invalidJson_shouldFailWithPath() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(dir.path(), "transhub.json", "{ not json").unwrap();

    let error = Config::load_or_create(&path).unwrap_err();

    assert!(format!("{:#}", error).contains("Failed to parse config file"));
}

#[test]
fn test_validate_apiKeyOverride_shouldPassForRemoteProvider() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Anthropic;
    assert!(config.validate().is_err());

    config.translation.active_provider_config_mut().api_key = "sk-test".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_badLengthRatios_shouldFail() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Mock;
    config.quality.min_length_ratio = 2.0;
    config.quality.max_length_ratio = 1.0;

    assert!(config.validate().is_err());
}

#[test]
fn test_backendFromConfig_shouldNameSelectedProvider() {
    let mut config = Config::default();
    config.translation.active_provider_config_mut().api_key = "key".to_string();

    let cases = [
        (TranslationProvider::Gemini, "Gemini"),
        (TranslationProvider::Groq, "Groq"),
        (TranslationProvider::OpenRouter, "OpenRouter"),
        (TranslationProvider::OpenAI, "OpenAI"),
        (TranslationProvider::Anthropic, "Anthropic"),
        (TranslationProvider::Ollama, "Ollama"),
        (TranslationProvider::LMStudio, "LM Studio"),
        (TranslationProvider::Mock, "Mock"),
    ];

    for (provider, name) in cases {
        config.translation.provider = provider;
        let backend = backend_from_config(&config.translation).unwrap();
        assert_eq!(backend.name(), name);
    }
}
