//! Admin error type and its HTTP status mapping.

use axum::http::StatusCode;

/// Errors raised while resolving, loading, cleaning or persisting admin entities.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("section not found: {0}")]
    SectionNotFound(String),

    #[error("entity not found: {section}/{entity}")]
    EntityNotFound { section: String, entity: String },

    #[error("{entity} with primary key {key} does not exist")]
    RecordNotFound { entity: String, key: String },

    #[error("invalid primary key: {0}")]
    InvalidPrimaryKey(String),

    #[error("invalid value for field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("unknown list action: {0}")]
    UnknownAction(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SectionNotFound(_) | Self::EntityNotFound { .. } | Self::RecordNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidPrimaryKey(_) | Self::InvalidField { .. } | Self::UnknownAction(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Registration(_) | Self::Database(_) | Self::Template(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SectionNotFound(_) => "section_not_found",
            Self::EntityNotFound { .. } => "entity_not_found",
            Self::RecordNotFound { .. } => "record_not_found",
            Self::InvalidPrimaryKey(_) => "invalid_primary_key",
            Self::InvalidField { .. } => "invalid_field",
            Self::UnknownAction(_) => "unknown_action",
            Self::Registration(_) => "registration",
            Self::Database(_) => "database",
            Self::Template(_) => "template",
        }
    }

    /// Message safe to show to the admin user. Internal failures stay in the logs.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            "An internal error occurred. Check the server logs for details.".to_string()
        } else {
            self.to_string()
        }
    }

    pub(crate) fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<diesel::result::Error> for AdminError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Database(e.to_string())
    }
}
