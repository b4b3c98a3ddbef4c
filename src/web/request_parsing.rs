// Request parsing utilities for HTTP handlers

use hyper::{Body, Response};
use log::{debug, warn};
use serde::de::DeserializeOwned;

use super::error::SidecarError;
use super::response_helpers::error_response;

/// Parse JSON request body into a typed structure.
///
/// Malformed JSON and missing or mistyped fields become a 422 response with a
/// `detail` message; the caller returns it as is.
pub async fn parse_json_body<T: DeserializeOwned>(body: Body) -> Result<T, Response<Body>> {
    let body_bytes = hyper::body::to_bytes(body).await.map_err(|e| {
        warn!("Failed to read request body: {e}");
        error_response(&SidecarError::Validation(format!(
            "Failed to read request body: {e}"
        )))
    })?;

    if let Ok(body_str) = std::str::from_utf8(&body_bytes) {
        if !body_str.is_empty() {
            debug!("[REQUEST] Body: {body_str}");
        }
    }

    parse_json_bytes(&body_bytes).map_err(|e| error_response(&e))
}

/// Like [`parse_json_body`], but an empty body yields `T::default()`.
pub async fn parse_optional_json_body<T: DeserializeOwned + Default>(
    body: Body,
) -> Result<T, Response<Body>> {
    let body_bytes = hyper::body::to_bytes(body)
        .await
        .map_err(|e| error_response(&SidecarError::Validation(e.to_string())))?;

    if body_bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json_bytes(&body_bytes).map_err(|e| error_response(&e))
}

fn parse_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SidecarError> {
    serde_json::from_slice::<T>(bytes).map_err(|e| {
        warn!("[REQUEST] JSON parsing error: {e}");
        SidecarError::Validation(format!("Invalid request body: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::models::LoadRequest;
    use hyper::StatusCode;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    struct Empty {}

    #[tokio::test]
    async fn test_valid_body_parses() {
        let parsed: LoadRequest = parse_json_body(Body::from(r#"{"model_path":"a/b"}"#))
            .await
            .unwrap();
        assert_eq!(parsed.model_path, "a/b");
    }

    #[tokio::test]
    async fn test_missing_field_is_unprocessable() {
        let response = parse_json_body::<LoadRequest>(Body::from("{}")).await.unwrap_err();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_malformed_json_is_unprocessable() {
        let response = parse_json_body::<LoadRequest>(Body::from("{not json"))
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_optional_body_accepts_empty() {
        assert!(parse_optional_json_body::<Empty>(Body::empty()).await.is_ok());
        assert!(parse_optional_json_body::<Empty>(Body::from("{}")).await.is_ok());
        assert!(parse_optional_json_body::<Empty>(Body::from("[")).await.is_err());
    }
}
