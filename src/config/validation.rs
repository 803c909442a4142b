use std::{collections::HashSet, net::SocketAddr};

use http::{HeaderName, HeaderValue};
use tracing::level_filters::LevelFilter;

use crate::{
    config::models::{BasicAuthConfig, CorsConfig, ServerConfig, StaticMountConfig},
    core::url::{UrlLimits, is_ascii},
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Mount conflict detected: {message}")]
    MountConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

const MAX_CREDENTIAL_LEN: usize = 255;

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem at once
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        errors.extend(Self::validate_limits(&config.limits));

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        for mount in &config.static_files {
            errors.extend(Self::validate_static_mount(mount));
        }

        if let Err(e) = Self::check_mount_conflicts(&config.static_files) {
            errors.extend(e);
        }

        if let Some(cors) = &config.cors {
            errors.extend(Self::validate_cors(cors));
        }

        if let Some(auth) = &config.basic_auth {
            errors.extend(Self::validate_basic_auth(auth));
        }

        for (name, value) in &config.headers {
            if name.parse::<HeaderName>().is_err() || HeaderValue::from_str(value).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("headers.{name}"),
                    message: "Not a valid HTTP header".to_string(),
                });
            }
        }

        if config.logging.level.parse::<LevelFilter>().is_err() {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: format!("Unknown log level '{}'", config.logging.level),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_limits(limits: &UrlLimits) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("limits.max_url_len", limits.max_url_len),
            ("limits.max_path_len", limits.max_path_len),
            ("limits.max_query_keys", limits.max_query_keys),
        ] {
            if value == 0 {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
        }

        if limits.max_path_len > limits.max_url_len {
            errors.push(ValidationError::InvalidField {
                field: "limits.max_path_len".to_string(),
                message: "Cannot exceed limits.max_url_len".to_string(),
            });
        }

        errors
    }

    fn validate_static_mount(mount: &StaticMountConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !mount.prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("static_files prefix: {}", mount.prefix),
                message: "Prefixes must start with '/'".to_string(),
            });
        }

        if mount.root.is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("static_files '{}' root", mount.prefix),
            });
        }

        if let Some(index_file) = &mount.index_file {
            if index_file.is_empty() || index_file.contains('/') || index_file.contains('\\') {
                errors.push(ValidationError::InvalidField {
                    field: format!("static_files '{}' index_file", mount.prefix),
                    message: "Must be a plain file name".to_string(),
                });
            }
        }

        errors
    }

    /// Two mounts on the same prefix would make the second unreachable for
    /// every file the first one has.
    fn check_mount_conflicts(mounts: &[StaticMountConfig]) -> Result<(), Vec<ValidationError>> {
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for mount in mounts {
            let prefix = mount.prefix.trim_end_matches('/');
            let prefix = if prefix.is_empty() { "/" } else { prefix };

            if !seen.insert((prefix.to_string(), mount.root.clone())) {
                errors.push(ValidationError::MountConflict {
                    message: format!(
                        "Duplicate static mount for prefix '{}' and root '{}'",
                        mount.prefix, mount.root
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_cors(cors: &CorsConfig) -> Vec<ValidationError> {
        cors.origins
            .iter()
            .filter(|origin| origin.is_empty() || *origin == "*" || *origin == "null")
            .map(|origin| ValidationError::InvalidField {
                field: "cors.origins".to_string(),
                message: format!("Origin '{origin}' is not allowed (list explicit origins)"),
            })
            .collect()
    }

    fn validate_basic_auth(auth: &BasicAuthConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let mut check = |field: &str, value: &str| {
            if value.len() > MAX_CREDENTIAL_LEN || !is_ascii(value) {
                errors.push(ValidationError::InvalidField {
                    field: format!("basic_auth.{field}"),
                    message: format!("Must be ASCII and at most {MAX_CREDENTIAL_LEN} bytes"),
                });
            }
        };

        if let Some(username) = &auth.username {
            check("username", username);
        }
        check("password", &auth.password);

        if auth.password.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "basic_auth.password".to_string(),
            });
        }

        if let Some(realm) = &auth.realm {
            if realm.contains('"') || !is_ascii(realm) {
                errors.push(ValidationError::InvalidField {
                    field: "basic_auth.realm".to_string(),
                    message: "Must be ASCII without quotes".to_string(),
                });
            }
        }

        errors
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
