use axum::http::HeaderMap;
use gaspos_core::sync::protocol::API_KEY_HEADER;
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// Shared-secret check for the exchange endpoints.
#[derive(Clone)]
pub struct ApiKeyVerifier {
    expected: String,
}

impl ApiKeyVerifier {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let presented = extract_api_key(headers)?;
        let matches: bool = presented
            .as_bytes()
            .ct_eq(self.expected.as_bytes())
            .into();
        if matches {
            Ok(())
        } else {
            Err(AppError::unauthorized("Invalid sync API key"))
        }
    }
}

pub fn extract_api_key(headers: &HeaderMap) -> Result<&str, AppError> {
    let key = headers
        .get(API_KEY_HEADER)
        .ok_or_else(|| AppError::unauthorized(format!("Missing {API_KEY_HEADER} header")))?
        .to_str()
        .map_err(|_| AppError::unauthorized(format!("{API_KEY_HEADER} header is not valid UTF-8")))?
        .trim();

    if key.is_empty() {
        return Err(AppError::unauthorized(format!(
            "{API_KEY_HEADER} header is empty"
        )));
    }
    Ok(key)
}
