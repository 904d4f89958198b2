//! Turns heterogeneous upstream payloads into one canonical shape.
//!
//! Structured bodies must be JSON (`application/json` or any `+json` type).
//! Anything else is a [`FailureKind::MalformedResponse`], never a silent
//! default.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::ErrorBody;
use crate::model::ActionAck;
use crate::outcome::{Failure, FailureKind, Outcome};

/// Whether `content_type` names a structured format we can parse.
pub fn is_structured(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let essence = ct
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Parses a structured body into a JSON value.
pub fn parse_structured(content_type: Option<&str>, body: &[u8]) -> Outcome<Value> {
    if !is_structured(content_type) {
        return Err(Failure::malformed(format!(
            "unsupported content type: {}",
            content_type.unwrap_or("<none>")
        )));
    }
    serde_json::from_slice(body).map_err(|e| Failure::malformed(format!("invalid json body: {e}")))
}

/// Parses and decodes a structured body into a typed record.
pub fn decode<T: DeserializeOwned>(content_type: Option<&str>, body: &[u8]) -> Outcome<T> {
    let value = parse_structured(content_type, body)?;
    serde_json::from_value(value)
        .map_err(|e| Failure::malformed(format!("unexpected response shape: {e}")))
}

/// Upstream `detail` message of an error body, if it has one.
pub fn error_detail(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message())
}

/// Loose truthiness used by schema-flexible endpoints.
///
/// null/false/0/NaN/"" are false; arrays and objects (even empty) are true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Which part of a payload decided its on/off state. Variants are listed in
/// precedence order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerSignal<'a> {
    /// `status` field.
    Status(&'a Value),
    /// `isOn` field.
    IsOn(&'a Value),
    /// `online` field.
    Online(&'a Value),
    /// `powered` field.
    Powered(&'a Value),
    /// No recognized field; the whole payload is coerced.
    ///
    /// This is a compatibility shim for upstream schema drift: `{}` reads as
    /// on. Kept lenient until the intended contract for unknown shapes is
    /// confirmed.
    Payload(&'a Value),
}

impl<'a> PowerSignal<'a> {
    /// Picks the first recognized field of an object payload.
    pub fn detect(payload: &'a Value) -> Self {
        let Some(obj) = payload.as_object() else {
            return Self::Payload(payload);
        };
        if let Some(v) = obj.get("status") {
            Self::Status(v)
        } else if let Some(v) = obj.get("isOn") {
            Self::IsOn(v)
        } else if let Some(v) = obj.get("online") {
            Self::Online(v)
        } else if let Some(v) = obj.get("powered") {
            Self::Powered(v)
        } else {
            Self::Payload(payload)
        }
    }

    /// Power state this signal reports.
    pub fn is_on(&self) -> bool {
        match self {
            Self::Status(Value::String(s)) => {
                s.eq_ignore_ascii_case("on") || s.eq_ignore_ascii_case("online")
            }
            Self::Status(v) | Self::IsOn(v) | Self::Online(v) | Self::Powered(v) => truthy(v),
            Self::Payload(v) => truthy(v),
        }
    }
}

/// On/off state of an already-parsed payload.
pub fn power_state(payload: &Value) -> bool {
    let signal = PowerSignal::detect(payload);
    if matches!(signal, PowerSignal::Payload(_)) {
        tracing::debug!("no recognized power field; coercing whole payload");
    }
    signal.is_on()
}

/// On/off state of a raw response body.
pub fn normalize_boolean(content_type: Option<&str>, body: &[u8]) -> Outcome<bool> {
    parse_structured(content_type, body).map(|v| power_state(&v))
}

/// Best-effort acknowledgment of a device command.
///
/// JSON bodies may carry `success` and `message`; a missing `success` counts
/// as accepted since the request itself returned 2xx. Plain-text bodies are
/// taken as the message. Other content types are malformed.
pub fn decode_ack(content_type: Option<&str>, body: &[u8]) -> Outcome<ActionAck> {
    if is_structured(content_type) {
        let value = parse_structured(content_type, body)?;
        let success = value.get("success").map(truthy).unwrap_or(true);
        let message = match value.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "accepted".to_string(),
        };
        return Ok(ActionAck { success, message });
    }

    let is_text = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("text/"))
        .unwrap_or(true);
    if !is_text {
        return Err(Failure::new(
            FailureKind::MalformedResponse,
            format!("unsupported content type: {}", content_type.unwrap_or("<none>")),
        ));
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    Ok(ActionAck {
        success: true,
        message: if text.is_empty() { "accepted".to_string() } else { text },
    })
}
