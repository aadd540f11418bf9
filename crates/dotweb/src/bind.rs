//! Decoding request data into user types.
//!
//! The decoder is picked from the request's content type: JSON and XML
//! bodies go through their serde deserializers, urlencoded and multipart
//! forms through `serde_urlencoded`, and a request without a content type
//! binds from its query string. Field names follow the target type's serde
//! attributes.

use serde::de::DeserializeOwned;

use crate::error::{DotwebError, Result};
use crate::request::{
    MIME_APPLICATION_FORM, MIME_APPLICATION_JSON, MIME_APPLICATION_XML, MIME_MULTIPART_FORM,
    MIME_TEXT_XML, Request,
};

pub async fn bind_request<T: DeserializeOwned>(req: &mut Request) -> Result<T> {
    let content_type = req.content_type();
    match content_type.as_str() {
        "" => from_pairs(&req.query_strings()),
        MIME_APPLICATION_FORM | MIME_MULTIPART_FORM => {
            let pairs = first_per_key(req.form().await?);
            from_pairs(&pairs)
        }
        MIME_APPLICATION_XML | MIME_TEXT_XML => {
            let body = req.post_body().await?;
            if body.is_empty() {
                return Err(DotwebError::EmptyBody);
            }
            let text = std::str::from_utf8(&body)
                .map_err(|e| DotwebError::Bind(format!("xml body is not utf-8: {e}")))?;
            quick_xml::de::from_str(text).map_err(|e| DotwebError::Bind(format!("invalid xml body: {e}")))
        }
        ct if ct == MIME_APPLICATION_JSON || ct.ends_with("+json") => {
            let body = req.post_body().await?;
            if body.is_empty() {
                return Err(DotwebError::EmptyBody);
            }
            serde_json::from_slice(&body).map_err(|e| DotwebError::Bind(format!("invalid json body: {e}")))
        }
        other => Err(DotwebError::UnsupportedMediaType(other.to_string())),
    }
}

/// Keep the first value seen for each key.
fn first_per_key(pairs: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut seen = std::collections::HashSet::new();
    pairs
        .into_iter()
        .filter(|(k, _)| seen.insert(k.clone()))
        .collect()
}

fn from_pairs<T: DeserializeOwned>(pairs: &[(String, String)]) -> Result<T> {
    let encoded = serde_urlencoded::to_string(pairs)
        .map_err(|e| DotwebError::Bind(format!("invalid form data: {e}")))?;
    serde_urlencoded::from_str(&encoded).map_err(|e| DotwebError::Bind(format!("invalid form data: {e}")))
}
