use anyhow::Error as AnyError;
use serde::Serialize;
use thiserror::Error;

use crate::body::Body;
use crate::http::{Method, Response, StatusCode};
use crate::response::{json_response, IntoResponse};

/// Body every error is rendered as: `{"error": "<message>"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Every failure the proxy can report, each tied to the status code sent to the caller.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{message}")]
    BadRequest { message: String },
    #[error("no route matched path: {path}")]
    NotFound { path: String },
    #[error("Method Not Allowed. This endpoint only supports {allowed} requests.")]
    MethodNotAllowed { method: Method, allowed: String },
    #[error("API key not configured on the server. Please contact the administrator.")]
    MissingApiKey,
    #[error("Unauthorized: Invalid API Key or missing API Key. Please check the server environment variables.")]
    Unauthorized,
    #[error("Payment Required: API quota exceeded. Try again later.")]
    QuotaExceeded,
    #[error("No recipes found. Try broader filters.")]
    NoRecipes,
    #[error("No recipes found for the given criteria. Try adjusting your selections.")]
    NoMatchingRecipes,
    #[error("Failed to fetch recipe: {status} - {status_text}. Details: {details}")]
    Upstream {
        status: u16,
        status_text: String,
        details: String,
    },
    #[error("An unexpected error occurred. Please check your network connection.")]
    Transport { source: AnyError },
    #[error("internal error: {source}")]
    Internal { source: AnyError },
}

impl ProxyError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ProxyError::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        ProxyError::NotFound { path: path.into() }
    }

    pub fn method_not_allowed(method: &Method, allowed: &[Method]) -> Self {
        let mut names = allowed
            .iter()
            .map(|m| m.as_str().to_string())
            .collect::<Vec<_>>();
        names.sort();
        let allowed = if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        };
        ProxyError::MethodNotAllowed {
            method: method.clone(),
            allowed,
        }
    }

    pub fn upstream(status: StatusCode, details: impl Into<String>) -> Self {
        ProxyError::Upstream {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            details: details.into(),
        }
    }

    pub fn transport<E>(error: E) -> Self
    where
        E: Into<AnyError>,
    {
        ProxyError::Transport {
            source: error.into(),
        }
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<AnyError>,
    {
        ProxyError::Internal {
            source: error.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ProxyError::NotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::MissingApiKey
            | ProxyError::Unauthorized
            | ProxyError::QuotaExceeded
            | ProxyError::NoRecipes
            | ProxyError::NoMatchingRecipes
            | ProxyError::Upstream { .. }
            | ProxyError::Transport { .. }
            | ProxyError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Transport causes stay out of it; they are for operator logs.
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn source(&self) -> Option<&AnyError> {
        match self {
            ProxyError::Transport { source } | ProxyError::Internal { source } => Some(source),
            _ => None,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            error: self.message(),
        };
        let body = Body::json(&payload).unwrap_or_else(|_| Body::text(r#"{"error":"internal error"}"#));
        json_response(self.status(), body)
    }
}
