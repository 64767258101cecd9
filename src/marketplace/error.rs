use super::store::StoreError;

/// Typed failure surfaced by every marketplace operation.
///
/// Applying twice is not represented here; see [`super::ApplyOutcome::Duplicate`].
#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MarketplaceError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub(crate) fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }
}

/// Trimmed `value`, or a validation error naming `field` when it is blank.
pub(crate) fn required(field: &str, value: &str) -> Result<String, MarketplaceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(MarketplaceError::validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}
