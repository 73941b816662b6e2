// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::refresh::RefreshError;

/// Error codes for the admission API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateError {
    BadRequest,
    MethodNotAllowed,
    UpstreamError,
    StoreUnavailable,
    Internal,
}

impl GateError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::MethodNotAllowed => 405,
            Self::UpstreamError => 502,
            Self::StoreUnavailable => 503,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Plain-text reason phrase, used verbatim as the body of input errors.
    pub fn reason(&self) -> &'static str {
        self.status().canonical_reason().unwrap_or("Internal Server Error")
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let body = ErrorResponse { error: self.to_error_body(message) };
        (self.status(), Json(body))
    }
}

impl From<&RefreshError> for GateError {
    fn from(err: &RefreshError) -> Self {
        match err {
            RefreshError::UpstreamAuth { .. } | RefreshError::UpstreamDirectory { .. } => {
                Self::UpstreamError
            }
            RefreshError::Store(_) => Self::StoreUnavailable,
        }
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
