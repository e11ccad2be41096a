//! Axum extractors for resource submissions
//!
//! [`Submission`] accepts either a JSON object body or an HTML form body and
//! yields one ordered field map, so a browser form post and an API client hit
//! the exact same binding path. Field coercion happens later, against the
//! schema, which is why form values stay strings here.

use axum::Form;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header;
use indexmap::IndexMap;
use serde_json::Value;

use crate::core::error::EngineError;

/// The submitted field map of a create/edit/replace request
#[derive(Debug, Clone, Default)]
pub struct Submission(pub IndexMap<String, Value>);

impl<S> FromRequest<S> for Submission
where
    S: Send + Sync,
{
    type Rejection = EngineError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| EngineError::BadRequest {
                    message: format!("invalid form body: {}", e),
                })?;
            return Ok(Self(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| EngineError::BadRequest {
                message: format!("unreadable body: {}", e),
            })?;
        if bytes.is_empty() {
            return Ok(Self(IndexMap::new()));
        }

        let value: Value = serde_json::from_slice(&bytes)?;
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            _ => Err(EngineError::BadRequest {
                message: "body must be a JSON object".to_string(),
            }),
        }
    }
}
