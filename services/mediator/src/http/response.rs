use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt::Display;

use mediator_protocol::HttpErrorEnvelope;

pub type HttpResponse = Response;

pub(crate) fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> HttpResponse {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.into(),
            message: message.into(),
            details: None,
        }),
    )
        .into_response()
}

pub fn internal_error(err: impl Display) -> HttpResponse {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        err.to_string(),
    )
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

/// Endpoint known but nobody is there to take the message.
pub fn gone(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::GONE, "RECIPIENT_INACTIVE", message)
}

/// Only the push fallback could deliver, and it is not configured.
pub fn misdirected(message: impl Into<String>) -> HttpResponse {
    json_error(
        StatusCode::MISDIRECTED_REQUEST,
        "FCM_NOT_CONFIGURED",
        message,
    )
}

pub fn unsupported_media_type(message: impl Into<String>) -> HttpResponse {
    json_error(
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
        "UNSUPPORTED_CONTENT_TYPE",
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn assert_error_response(
        response: Response,
        expected_status: StatusCode,
        expected_code: &str,
    ) {
        assert_eq!(response.status(), expected_status);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body should be readable");
        let parsed: HttpErrorEnvelope =
            serde_json::from_slice(&body).expect("response body should be valid error json");
        assert_eq!(parsed.code, expected_code);
        assert_eq!(parsed.details, None);
    }

    #[tokio::test]
    async fn gone_sets_recipient_inactive_contract() {
        let response = gone("recipient is registered but is not active");
        assert_error_response(response, StatusCode::GONE, "RECIPIENT_INACTIVE").await;
    }

    #[tokio::test]
    async fn misdirected_sets_fcm_contract() {
        let response = misdirected("firebase cloud messaging is not configured on server side");
        assert_error_response(
            response,
            StatusCode::MISDIRECTED_REQUEST,
            "FCM_NOT_CONFIGURED",
        )
        .await;
    }

    #[tokio::test]
    async fn unsupported_media_type_sets_contract() {
        let response = unsupported_media_type("bad content type");
        assert_error_response(
            response,
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_CONTENT_TYPE",
        )
        .await;
    }

    #[tokio::test]
    async fn not_found_sets_contract() {
        let response = not_found("unknown endpoint");
        assert_error_response(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
    }
}
