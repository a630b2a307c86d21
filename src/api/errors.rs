// Copyright (c) 2025 Aithena
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::CryptoError;
use crate::upstream::UpstreamError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    NotFound(String),
    /// Inbound payload could not be processed. Decryption failures land
    /// here with a deliberately non-specific message.
    InvalidRequest(String),
    ServiceUnavailable(String),
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self) -> ErrorResponse {
        let (error_type, message) = match self {
            ApiError::NotFound(msg) => ("not_found", msg.clone()),
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone()),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone()),
            ApiError::InternalError(msg) => ("internal_error", msg.clone()),
        };
        ErrorResponse {
            error_type: error_type.to_string(),
            message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidRequest(_) => 400,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::InternalError(_) => 500,
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        match err {
            // Non-specific by contract: the caller learns only that the
            // request could not be processed.
            CryptoError::Decryption => ApiError::InvalidRequest("cannot process request".into()),
            CryptoError::KeyFormat { reason } => ApiError::InvalidRequest(reason),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}
