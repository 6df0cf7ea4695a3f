use crate::{Result, SalesError};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// Payment token descriptor nested in a sale event (`payment_token.*`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentToken {
    pub symbol: Option<String>,
    pub address: Option<String>,
    pub name: Option<String>,
}

/// Fields the pipeline reads from an event. Typed loosely so that an
/// unexpected shape in one field never rejects the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
struct EventProjection {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    created_date: Value,
    #[serde(default)]
    payment_token: Value,
}

/// One completed marketplace sale as returned by the events API.
///
/// The raw JSON text is kept verbatim and is what gets persisted; the
/// projection only exposes the handful of fields the pipeline relies on.
#[derive(Debug, Clone)]
pub struct EventDocument {
    raw: Box<RawValue>,
    projection: EventProjection,
}

impl EventDocument {
    /// Wrap a raw JSON value. Fails if the value is not a JSON object.
    pub fn from_raw(raw: Box<RawValue>) -> Result<Self> {
        if !raw.get().trim_start().starts_with('{') {
            return Err(SalesError::InvalidEvent(format!(
                "expected a JSON object, got: {}",
                truncate(raw.get(), 64)
            )));
        }

        let projection: EventProjection = serde_json::from_str(raw.get())
            .map_err(|e| SalesError::InvalidEvent(e.to_string()))?;

        Ok(Self { raw, projection })
    }

    /// Parse a document from JSON text, keeping the text as-is
    pub fn from_json(json: &str) -> Result<Self> {
        let raw = RawValue::from_string(json.to_string())
            .map_err(|e| SalesError::InvalidEvent(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// The document exactly as received from the API
    pub fn raw_json(&self) -> &str {
        self.raw.get()
    }

    /// Identifier assigned by the upstream API. Numbers are rendered in
    /// their JSON form so `42` and `"42"` group together.
    pub fn source_id(&self) -> Option<String> {
        match &self.projection.id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn created_date(&self) -> Option<&str> {
        self.projection.created_date.as_str()
    }

    /// Typed view of `payment_token`, if present and an object
    pub fn payment_token(&self) -> Option<PaymentToken> {
        let token = self.projection.payment_token.as_object()?;
        let field = |key: &str| token.get(key).and_then(Value::as_str).map(str::to_string);

        Some(PaymentToken {
            symbol: field("symbol"),
            address: field("address"),
            name: field("name"),
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
