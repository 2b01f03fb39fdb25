//! Range checks on configuration values.

use thiserror::Error;

use crate::config::{AudioConfig, ClientConfig, Config};

/// Largest accepted block length.
pub const MAX_VECTOR_SIZE: usize = 4096;

/// A configuration value out of range.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Sample rate is zero.
    #[error("sample rate must be positive, got {0}")]
    SampleRate(u32),

    /// Block length is not a power of two in range.
    #[error("vector size must be a power of two between 1 and {MAX_VECTOR_SIZE}, got {0}")]
    VectorSize(usize),

    /// Pull interval is zero.
    #[error("pull interval must be positive")]
    PullInterval,

    /// Session name is empty.
    #[error("session name must not be empty")]
    EmptySession,

    /// Multiple validation errors.
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Checks the audio section.
pub fn validate_audio(audio: &AudioConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if audio.sample_rate == 0 {
        errors.push(ValidationError::SampleRate(audio.sample_rate));
    }
    if !audio.vector_size.is_power_of_two() || audio.vector_size > MAX_VECTOR_SIZE {
        errors.push(ValidationError::VectorSize(audio.vector_size));
    }
    errors
}

/// Checks the client section.
pub fn validate_client(client: &ClientConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if client.pull_interval_ms == 0 {
        errors.push(ValidationError::PullInterval);
    }
    if client.session.trim().is_empty() {
        errors.push(ValidationError::EmptySession);
    }
    errors
}

/// Checks a whole configuration, collecting every problem.
pub fn validate_config(config: &Config) -> ValidationResult<()> {
    let mut errors = validate_client(&config.client);
    errors.extend(validate_audio(&config.audio));
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}
