//! Page-level error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::html;

/// Errors a page handler can return
#[derive(Debug, Error)]
pub enum UiError {
    #[error(transparent)]
    Storage(#[from] peal_common::Error),
}

pub type UiResult<T> = std::result::Result<T, UiError>;

impl UiError {
    pub fn status(&self) -> StatusCode {
        use peal_common::Error::*;
        match self {
            UiError::Storage(e) => match e {
                NotFound(_) => StatusCode::NOT_FOUND,
                Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Conflict(_) | ReferentialIntegrity(_) => StatusCode::CONFLICT,
                BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for UiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let UiError::Storage(err) = &self;

        let (title, message) = match err {
            _ if err.is_retryable() => {
                error!("{}", err);
                (
                    "Storage unavailable",
                    "The data store could not be reached. Please try again in a moment."
                        .to_string(),
                )
            }
            peal_common::Error::Config(detail) => {
                error!("Configuration error: {}", detail);
                ("Server error", "The server is misconfigured.".to_string())
            }
            peal_common::Error::NotFound(_) => ("Not found", err.to_string()),
            _ => {
                warn!("Request rejected: {}", err);
                ("Could not save", err.to_string())
            }
        };

        let body = format!(
            concat!(
                r#"{}<p><a href="javascript:history.back()">Go back</a> or "#,
                r#"<a href="/">return to the dashboard</a>.</p>"#,
            ),
            html::error_box(&message)
        );
        (status, html::page(title, &body)).into_response()
    }
}
