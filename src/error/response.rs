use serde::{Deserialize, Serialize};

use super::CursordError;

/// Error body returned by every HTTP endpoint.
///
/// Mirrors the cursor response envelope so clients can branch on `error`
/// without inspecting the status line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: bool,
    pub code: u16,
    pub error_num: u32,
    pub error_message: String,
}

impl ErrorResponse {
    /// Build the response body for an error.
    pub fn from_error(err: &CursordError) -> Self {
        Self {
            error: true,
            code: err.http_code(),
            error_num: err.error_num(),
            error_message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CursorError;

    #[test]
    fn test_error_response_shape() {
        let err = CursordError::from(CursorError::NotFound("123".into()));
        let value = serde_json::to_value(ErrorResponse::from_error(&err)).unwrap();
        assert_eq!(value["error"], true);
        assert_eq!(value["code"], 404);
        assert_eq!(value["errorNum"], 1600);
        assert!(value["errorMessage"].as_str().unwrap().contains("123"));
    }
}
