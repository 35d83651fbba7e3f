//! Standard response envelope: `{ code, data, msg }`, with `code == 200` meaning success.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope {
            code: StatusCode::OK.as_u16(),
            data,
            msg: None,
        }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == StatusCode::OK.as_u16()
    }
}

impl Envelope<serde_json::Value> {
    pub fn failure(status: StatusCode, msg: String) -> Self {
        Envelope {
            code: status.as_u16(),
            data: serde_json::Value::Null,
            msg: Some(msg),
        }
    }
}

/// Page of a list endpoint, nested under `data`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub list: Vec<T>,
    pub total: u64,
}

pub fn success<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::OK, Json(Envelope::ok(data)))
}

pub fn success_msg<T: Serialize>(data: T, msg: &str) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::OK, Json(Envelope::ok(data).with_msg(msg)))
}
