//! Envelope responses and request extraction shared by both gateways

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use hv_core::{ClientError, KeyringError, ValidationError};
use hv_protocol::Envelope;

/// A handler failure rendered as an error envelope
#[derive(Debug)]
pub struct ApiError(pub ClientError);

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(err.into())
    }
}

impl From<KeyringError> for ApiError {
    fn from(err: KeyringError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", self.0.code(), self.0);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.0.code(), self.0);
        }
        (
            status,
            Json(Envelope::<()>::err(self.0.code(), self.0.to_string())),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<(StatusCode, Json<Envelope<T>>), ApiError>;

/// 200 with a result
pub fn ok<T: Serialize>(result: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(Envelope::ok(Some(result)))))
}

/// 201 with a result
pub fn created<T: Serialize>(result: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(Envelope::ok(Some(result)))))
}

/// 200 without a result
pub fn done() -> ApiResult<()> {
    Ok((StatusCode::OK, Json(Envelope::ok(None))))
}

/// JSON body whose rejection is reported as a malformed-request envelope
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError(ClientError::Malformed(rejection.body_text()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let response = ApiError(ClientError::Busy).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let json = body(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], 1005);
        assert!(json.get("result").is_none());
    }

    #[tokio::test]
    async fn test_empty_result_is_omitted() {
        let response = done().unwrap().into_response();
        let json = body(response).await;
        assert_eq!(json, serde_json::json!({"success": true}));
    }
}
