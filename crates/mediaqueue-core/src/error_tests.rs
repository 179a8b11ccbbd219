//! Error module tests

use crate::error::{Error, Result};
use crate::providers::Provider;

#[test]
fn test_invalid_payload_error() {
    let error = Error::InvalidPayload("text-to-image requires a prompt".to_string());
    assert_eq!(error.code(), "E002");
    assert_eq!(
        error.to_string(),
        "Invalid job type or payload: text-to-image requires a prompt"
    );
    assert!(error.is_always_fatal());
}

#[test]
fn test_missing_credential_messages() {
    let cases = [
        (Provider::Gemini, "Gemini API key is missing.", "MEDIAQUEUE_GEMINI_API_KEYS"),
        (Provider::PhotoRoom, "PhotoRoom API key is missing.", "MEDIAQUEUE_PHOTOROOM_API_KEY"),
        (Provider::SeedDream, "Seed Dream API key is missing.", "MEDIAQUEUE_SEEDREAM_API_KEY"),
    ];

    for (provider, message, env_var) in cases {
        let error = Error::MissingCredential(provider);
        assert_eq!(error.code(), "E100");
        assert_eq!(error.to_string(), message);
        assert_eq!(error.suggestion(), Some(format!("export {}=<key>", env_var)));
        assert!(error.is_always_fatal());
    }
}

#[test]
fn test_provider_http_error_embeds_status() {
    let error = Error::ProviderHttp {
        provider: Provider::Gemini,
        status: 503,
        message: "The model is overloaded.".to_string(),
    };
    assert_eq!(error.code(), "E300");
    assert_eq!(error.to_string(), "Gemini error 503: The model is overloaded.");
    assert!(!error.is_always_fatal());
    assert_eq!(error.suggestion(), None);
}

#[test]
fn test_provider_auth_error_suggestion() {
    let error = Error::ProviderHttp {
        provider: Provider::PhotoRoom,
        status: 403,
        message: "Forbidden".to_string(),
    };
    assert_eq!(
        error.suggestion(),
        Some("Check the value of MEDIAQUEUE_PHOTOROOM_API_KEY".to_string())
    );
}

#[test]
fn test_generation_failed_displays_message_verbatim() {
    let error = Error::GenerationFailed(
        "No image was generated. The response may have been blocked.".to_string(),
    );
    assert_eq!(error.code(), "E301");
    assert_eq!(
        error.to_string(),
        "No image was generated. The response may have been blocked."
    );
}

#[test]
fn test_unsupported_is_fatal() {
    let error = Error::Unsupported("Seed Dream remix is not supported".to_string());
    assert_eq!(error.code(), "E302");
    assert!(error.is_always_fatal());
}

#[test]
fn test_timeout_error() {
    let error = Error::Timeout("video generation".to_string());
    assert_eq!(error.code(), "E303");
    assert!(error.to_string().contains("video generation"));
    assert!(!error.is_always_fatal());
}

#[test]
fn test_archive_error_from_zip() {
    let error: Error = zip::result::ZipError::FileNotFound.into();
    assert_eq!(error.code(), "E402");
    assert!(error.to_string().starts_with("Archive error"));
}

#[test]
fn test_config_error() {
    let error = Error::ConfigError("bad value".to_string());
    assert_eq!(error.code(), "E600");
    assert_eq!(error.suggestion(), Some("mediaqueue config list".to_string()));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    assert_eq!(error.code(), "E9999");
    assert!(error.to_string().contains("file not found"));
}

#[test]
fn test_result_type_alias() {
    fn returns_ok() -> Result<i32> {
        Ok(42)
    }

    fn returns_err() -> Result<i32> {
        Err(Error::QueueShutdown)
    }

    assert_eq!(returns_ok().ok(), Some(42));
    assert_eq!(returns_err().unwrap_err().code(), "E003");
}
