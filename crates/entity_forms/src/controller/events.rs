//! Form events and submission error modeling.

use client_core::ClientError;
use shared::error::ErrorCode;

use crate::schema::FieldErrors;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    FieldChanged { field: String },
    SubmitStarted,
    ValidationFailed(FieldErrors),
    Saved { entity: &'static str, id: String },
    SubmitFailed(SubmitError),
    Navigated { route: String },
    Unmounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorCategory {
    Auth,
    Validation,
    NotFound,
    Conflict,
    Transport,
    Unknown,
}

/// The single error captured from a failed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitError {
    category: SubmitErrorCategory,
    status: Option<u16>,
    message: String,
}

impl SubmitError {
    pub fn from_client_error(err: &ClientError) -> Self {
        let category = match err {
            ClientError::Api { error, .. } => match error.code {
                ErrorCode::Unauthorized | ErrorCode::Forbidden => SubmitErrorCategory::Auth,
                ErrorCode::Validation => SubmitErrorCategory::Validation,
                ErrorCode::NotFound => SubmitErrorCategory::NotFound,
                ErrorCode::Conflict => SubmitErrorCategory::Conflict,
                ErrorCode::Internal => SubmitErrorCategory::Unknown,
            },
            ClientError::Transport { .. } | ClientError::InvalidUrl { .. } => {
                SubmitErrorCategory::Transport
            }
            ClientError::Decode { .. } => SubmitErrorCategory::Unknown,
        };
        let message = match err.api_error() {
            Some(api_error) => api_error.message.clone(),
            None => err.to_string(),
        };

        Self {
            category,
            status: err.status(),
            message,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == SubmitErrorCategory::Auth
    }

    pub fn category(&self) -> SubmitErrorCategory {
        self.category
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text shown once above the form.
    pub fn display_message(&self) -> String {
        match self.category {
            SubmitErrorCategory::Auth => {
                format!("Not allowed: {}. Sign in again and retry.", self.message)
            }
            SubmitErrorCategory::Transport => {
                "Server unreachable; check the API URL or network and retry.".to_string()
            }
            SubmitErrorCategory::Validation => {
                format!("The server rejected the values: {}", self.message)
            }
            SubmitErrorCategory::NotFound => format!("Not found: {}", self.message),
            SubmitErrorCategory::Conflict => format!("Conflict: {}", self.message),
            SubmitErrorCategory::Unknown => format!("Request failed: {}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_api_codes() {
        let cases = [
            (401, ErrorCode::Unauthorized, SubmitErrorCategory::Auth),
            (403, ErrorCode::Forbidden, SubmitErrorCategory::Auth),
            (422, ErrorCode::Validation, SubmitErrorCategory::Validation),
            (404, ErrorCode::NotFound, SubmitErrorCategory::NotFound),
            (409, ErrorCode::Conflict, SubmitErrorCategory::Conflict),
            (500, ErrorCode::Internal, SubmitErrorCategory::Unknown),
        ];
        for (status, code, expected) in cases {
            let error = SubmitError::from_client_error(&ClientError::api(status, code, "nope"));
            assert_eq!(error.category(), expected);
            assert_eq!(error.status(), Some(status));
            assert_eq!(error.message(), "nope");
        }
    }

    #[test]
    fn auth_failures_require_reauth() {
        let error = SubmitError::from_client_error(&ClientError::api(
            403,
            ErrorCode::Forbidden,
            "missing permission book:create",
        ));
        assert!(error.requires_reauth());
        assert!(error
            .display_message()
            .contains("missing permission book:create"));
    }

    #[test]
    fn invalid_url_is_a_transport_failure() {
        let error = SubmitError::from_client_error(&ClientError::InvalidUrl {
            url: "nowhere".into(),
            reason: "relative URL without a base".into(),
        });
        assert_eq!(error.category(), SubmitErrorCategory::Transport);
        assert_eq!(error.status(), None);
        assert!(!error.requires_reauth());
    }
}
