//! Delivery of submission payloads to third-party form relays.
//!
//! Each endpoint carries exactly one wire contract: the body encoding, the
//! envelope the relay expects around the fields, and whether a bot-mitigation
//! token must accompany the request.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::domain::{DeliveryReceipt, SubmissionPayload};

/// Body encoding a relay accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    FormUrlEncoded,
    Json,
}

impl PayloadEncoding {
    pub fn content_type(self) -> mime::Mime {
        match self {
            PayloadEncoding::FormUrlEncoded => mime::APPLICATION_WWW_FORM_URLENCODED,
            PayloadEncoding::Json => mime::APPLICATION_JSON,
        }
    }
}

/// Wrapper a relay expects around the submitted fields.
#[derive(Clone, PartialEq, Eq)]
pub enum RelayEnvelope {
    /// Fields are sent as top-level keys.
    Flat,
    /// Fields at top level plus the account `access_key`.
    Web3Forms { access_key: String },
    /// EmailJS REST shape; fields travel inside `template_params`. Always JSON.
    EmailJs {
        service_id: String,
        template_id: String,
        public_key: String,
    },
}

impl fmt::Debug for RelayEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEnvelope::Flat => f.write_str("Flat"),
            RelayEnvelope::Web3Forms { .. } => f
                .debug_struct("Web3Forms")
                .field("access_key", &"[REDACTED]")
                .finish(),
            RelayEnvelope::EmailJs {
                service_id,
                template_id,
                ..
            } => f
                .debug_struct("EmailJs")
                .field("service_id", service_id)
                .field("template_id", template_id)
                .field("public_key", &"[REDACTED]")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MitigationPolicy {
    Required,
    Disabled,
}

/// A relay URL and the contract it speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    pub name: String,
    pub url: Url,
    pub encoding: PayloadEncoding,
    pub envelope: RelayEnvelope,
    pub mitigation: MitigationPolicy,
    pub token_field: String,
    pub recipient_field: Option<String>,
    pub source_field: Option<String>,
    /// Form field name -> key the relay expects. Unmapped fields keep their name.
    pub field_names: BTreeMap<String, String>,
}

impl RelayEndpoint {
    pub fn new(name: impl Into<String>, url: Url, encoding: PayloadEncoding) -> Self {
        Self {
            name: name.into(),
            url,
            encoding,
            envelope: RelayEnvelope::Flat,
            mitigation: MitigationPolicy::Disabled,
            token_field: "g-recaptcha-response".to_string(),
            recipient_field: None,
            source_field: None,
            field_names: BTreeMap::new(),
        }
    }

    pub fn with_envelope(mut self, envelope: RelayEnvelope) -> Self {
        if matches!(envelope, RelayEnvelope::EmailJs { .. }) {
            self.encoding = PayloadEncoding::Json;
        }
        self.envelope = envelope;
        self
    }

    pub fn requiring_mitigation(mut self) -> Self {
        self.mitigation = MitigationPolicy::Required;
        self
    }

    pub fn with_token_field(mut self, field: &str) -> Self {
        self.token_field = field.to_string();
        self
    }

    pub fn with_recipient_field(mut self, field: &str) -> Self {
        self.recipient_field = Some(field.to_string());
        self
    }

    pub fn with_source_field(mut self, field: &str) -> Self {
        self.source_field = Some(field.to_string());
        self
    }

    pub fn map_field(mut self, form_field: &str, relay_key: &str) -> Self {
        self.field_names
            .insert(form_field.to_string(), relay_key.to_string());
        self
    }

    pub fn requires_mitigation(&self) -> bool {
        self.mitigation == MitigationPolicy::Required
    }

    fn relay_key<'a>(&'a self, field: &'a str) -> &'a str {
        self.field_names
            .get(field)
            .map(String::as_str)
            .unwrap_or(field)
    }
}

/// Encoded request body, ready for the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayBody {
    Form(Vec<(String, String)>),
    Json(Value),
}

/// Lay out `payload` in the key order and envelope the endpoint expects.
pub fn encode_payload(payload: &SubmissionPayload, endpoint: &RelayEndpoint) -> RelayBody {
    let mut pairs: Vec<(String, String)> = payload
        .fields
        .iter()
        .map(|(name, value)| (endpoint.relay_key(name).to_string(), value.clone()))
        .collect();

    if let Some(field) = &endpoint.recipient_field {
        pairs.push((field.clone(), payload.recipient.clone()));
    }
    if let Some(field) = &endpoint.source_field {
        pairs.push((field.clone(), payload.source.clone()));
    }
    if let Some(token) = &payload.mitigation_token {
        pairs.push((endpoint.token_field.clone(), token.clone()));
    }

    match &endpoint.envelope {
        RelayEnvelope::EmailJs {
            service_id,
            template_id,
            public_key,
        } => {
            let mut envelope = Map::new();
            envelope.insert("service_id".to_string(), Value::from(service_id.clone()));
            envelope.insert("template_id".to_string(), Value::from(template_id.clone()));
            envelope.insert("user_id".to_string(), Value::from(public_key.clone()));
            envelope.insert("template_params".to_string(), json_object(pairs));
            RelayBody::Json(Value::Object(envelope))
        }
        RelayEnvelope::Web3Forms { access_key } => {
            pairs.insert(0, ("access_key".to_string(), access_key.clone()));
            flat_body(pairs, endpoint.encoding)
        }
        RelayEnvelope::Flat => flat_body(pairs, endpoint.encoding),
    }
}

fn flat_body(pairs: Vec<(String, String)>, encoding: PayloadEncoding) -> RelayBody {
    match encoding {
        PayloadEncoding::FormUrlEncoded => RelayBody::Form(pairs),
        PayloadEncoding::Json => RelayBody::Json(json_object(pairs)),
    }
}

fn json_object(pairs: Vec<(String, String)>) -> Value {
    Value::Object(
        pairs
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect(),
    )
}

/// Pull a human-readable message out of a relay error body.
///
/// Understands `{"error": ".."}`, `{"message": ".."}` and Formspree's
/// `{"errors": [{"message": ".."}]}`.
pub fn relay_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = value
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| value.get("message").and_then(Value::as_str))
        .or_else(|| {
            value
                .get("errors")
                .and_then(Value::as_array)
                .and_then(|errors| errors.first())
                .and_then(|first| first.get("message"))
                .and_then(Value::as_str)
        })?;

    let trimmed = message.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("relay unreachable: {0}")]
    Network(String),
    #[error("relay responded with status {status}")]
    Rejected { status: u16, body: String },
    #[error("relay client could not be built: {0}")]
    Client(String),
}

/// Sends one payload to one endpoint. Implementations perform exactly one
/// request per call and never retry.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn deliver(
        &self,
        payload: &SubmissionPayload,
        endpoint: &RelayEndpoint,
    ) -> Result<DeliveryReceipt, RelayError>;
}

/// `reqwest`-backed relay transport with a bounded request time.
#[derive(Debug, Clone)]
pub struct HttpRelay {
    http: reqwest::Client,
}

impl HttpRelay {
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RelayError::Client(err.to_string()))?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn deliver(
        &self,
        payload: &SubmissionPayload,
        endpoint: &RelayEndpoint,
    ) -> Result<DeliveryReceipt, RelayError> {
        let request = self
            .http
            .post(endpoint.url.clone())
            .header(ACCEPT, mime::APPLICATION_JSON.as_ref());

        let request = match encode_payload(payload, endpoint) {
            RelayBody::Form(pairs) => request.form(&pairs),
            RelayBody::Json(body) => request.json(&body),
        };

        let response = request
            .send()
            .await
            .map_err(|err| RelayError::Network(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| RelayError::Network(err.to_string()))?;

        if !(200..300).contains(&status) {
            warn!(relay = %endpoint.name, status, "relay rejected submission");
            return Err(RelayError::Rejected { status, body });
        }

        debug!(
            relay = %endpoint.name,
            content_type = %endpoint.encoding.content_type(),
            status,
            "relay accepted submission"
        );
        Ok(DeliveryReceipt {
            status,
            reference: receipt_reference(&body),
        })
    }
}

fn receipt_reference(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
