use std::collections::HashMap;

use axum::http::HeaderMap;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::AppError;

/// A file part received in a multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub data: Bytes,
}

/// A decoded write request: scalar fields plus any uploaded files.
#[derive(Debug, Default)]
pub struct Payload {
    pub fields: Map<String, Value>,
    pub files: HashMap<String, Upload>,
}

/// Decode a request body based on its Content-Type header.
pub async fn parse(headers: &HeaderMap, body: Bytes) -> Result<Payload, AppError> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");

    if content_type.contains("multipart/form-data") {
        return parse_multipart(content_type, body).await;
    }

    let fields = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else if content_type.contains("application/json") {
        parse_json(&body)?
    } else if content_type.contains("application/x-www-form-urlencoded") {
        parse_form_urlencoded(&body)?
    } else {
        parse_json(&body).or_else(|_| parse_form_urlencoded(&body))?
    };

    Ok(Payload {
        fields,
        files: HashMap::new(),
    })
}

fn parse_json(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::BadRequest(
            "Invalid data. Expected a dictionary.".to_string(),
        )),
        Err(e) => Err(AppError::BadRequest(format!("JSON parse error: {e}"))),
    }
}

fn parse_form_urlencoded(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    let body_str = std::str::from_utf8(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid UTF-8: {e}")))?;

    let mut map = Map::new();
    for (k, v) in form_urlencoded::parse(body_str.as_bytes()) {
        map.insert(k.into_owned(), Value::String(v.into_owned()));
    }
    Ok(map)
}

async fn parse_multipart(content_type: &str, body: Bytes) -> Result<Payload, AppError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| AppError::BadRequest("Missing multipart boundary".to_string()))?;

    let stream = futures_util::stream::once(async { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut payload = Payload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Field read error: {e}")))?;
                // Browsers send an empty part for a file input left blank.
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                payload.fields.remove(&name);
                payload.files.insert(
                    name,
                    Upload {
                        file_name: Some(file_name).filter(|n| !n.is_empty()),
                        data,
                    },
                );
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Field read error: {e}")))?;
                payload.fields.insert(name, Value::String(value));
            }
        }
    }

    Ok(payload)
}
