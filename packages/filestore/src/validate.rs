use thiserror::Error;

use crate::entity::{blob, storage_policy};

/// Reasons a policy refuses to hold an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("size {size} exceeds policy limit of {limit} bytes")]
    SizeExceeded { size: i64, limit: i64 },
    #[error("extension '{0}' is not allowed by the policy")]
    ExtensionNotAllowed(String),
    #[error("policy is read-only")]
    ReadOnly,
    #[error("invalid name: {0}")]
    InvalidName(String),
    /// Entities can only be attached to regular files.
    #[error("file {0} is a folder")]
    NotAFile(i32),
}

/// Checks a candidate entity against a destination policy before bytes are committed.
pub trait EntityValidator: Send + Sync {
    fn validate(
        &self,
        policy: &storage_policy::Model,
        entity: &blob::Model,
        file_name: &str,
    ) -> Result<(), ValidationError>;
}

/// Enforces the policy's own size ceiling, extension allow-list and read-only flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyValidator;

impl EntityValidator for PolicyValidator {
    fn validate(
        &self,
        policy: &storage_policy::Model,
        entity: &blob::Model,
        file_name: &str,
    ) -> Result<(), ValidationError> {
        if policy.flags().is_read_only() {
            return Err(ValidationError::ReadOnly);
        }

        if policy.max_size > 0 && entity.size > policy.max_size {
            return Err(ValidationError::SizeExceeded {
                size: entity.size,
                limit: policy.max_size,
            });
        }

        let allowed = &policy.settings.allowed_extensions;
        if !allowed.is_empty() {
            let ext = file_name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_lowercase())
                .unwrap_or_default();
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
                return Err(ValidationError::ExtensionNotAllowed(ext));
            }
        }

        Ok(())
    }
}
