//!
//! HTTP rendering of operation results
//! -----------------------------------
//! The routing layer calls the gatekeeper and returns what it gets back; these
//! `IntoResponse` impls decide the status code and JSON body.
//!
//! - success: `{"results": [...], "metadata": {"totalCount": n}}`, or 204 with no body
//!   for deletes;
//! - failure: `{"success": false, "code": ..., "message": ..., "errors": [{code, field, message}]}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::acl::{Document, Metadata, OperationOutcome};
use crate::error::{AppError, FieldError};

#[derive(Debug, Serialize)]
pub struct ResultsBody<'a> {
    pub results: &'a [Document],
    pub metadata: &'a Metadata,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub success: bool,
    pub code: &'a str,
    pub message: &'a str,
    pub errors: &'a [FieldError],
}

impl<'a> From<&'a AppError> for ErrorBody<'a> {
    fn from(e: &'a AppError) -> Self {
        Self { success: false, code: e.code_str(), message: e.message(), errors: e.errors() }
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::to_value(ErrorBody::from(&self)).unwrap_or_default();
        (status(self.http_status()), Json(body)).into_response()
    }
}

impl IntoResponse for OperationOutcome {
    fn into_response(self) -> Response {
        if self.status == 204 {
            return StatusCode::NO_CONTENT.into_response();
        }
        let body = serde_json::to_value(ResultsBody { results: &self.results, metadata: &self.metadata }).unwrap_or_default();
        (status(self.status), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn mixed_errors_render_400_with_every_field() {
        let err = AppError::from_field_errors(vec![
            FieldError::unauthorised("field1"),
            FieldError::new("ERROR_VALUE_INVALID", "field2", "must be a string"),
        ])
        .unwrap();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = body_json(resp).await;
        assert_eq!(v["success"], json!(false));
        assert_eq!(v["errors"][0]["code"], json!("ERROR_UNAUTHORISED"));
        assert_eq!(v["errors"][1]["field"], json!("field2"));
    }

    #[tokio::test]
    async fn results_render_with_metadata() {
        let mut doc = Document::new();
        doc.insert("_id".into(), json!("1"));
        let outcome = OperationOutcome { status: 200, results: vec![doc], metadata: Metadata { total_count: 1, ..Default::default() } };
        let resp = outcome.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["metadata"]["totalCount"], json!(1));
        assert_eq!(v["results"][0]["_id"], json!("1"));
    }

    #[tokio::test]
    async fn delete_renders_no_content() {
        let outcome = OperationOutcome { status: 204, results: vec![], metadata: Metadata::default() };
        assert_eq!(outcome.into_response().status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn not_found_renders_404() {
        let resp = AppError::not_found("gone").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["code"], json!("ERROR_NOT_FOUND"));
    }
}
