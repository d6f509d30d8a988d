//! Transport-layer callback → both registries.

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::Utf8Bytes;
use axum::Json;
use cosmo_core::{parse_send_time, Envelope};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::broadcast::broadcast_frame;
use crate::errors::ReceiveError;
use crate::http::HttpState;
use crate::metrics::RECEIVES_TOTAL;

/// Body posted by the transport layer once a message has "arrived".
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub send_time: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReceiveResponse {
    pub status: &'static str,
    pub message: &'static str,
}

impl ReceiveRequest {
    /// Validate and rebuild the envelope delivered to both nodes.
    pub fn into_envelope(self) -> Result<Envelope, ReceiveError> {
        let username = required(self.username, "username")?;
        let send_time = required(self.send_time, "sendTime")?;
        let message = required(self.message, "message")?;
        let id = parse_send_time(&send_time)
            .map_err(|e| ReceiveError::InvalidFormat(e.to_string()))?;
        let error = self.error.filter(|e| !e.is_empty());
        Ok(Envelope::delivered(username, message, id, error))
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ReceiveError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReceiveError::InvalidFormat(format!("missing {field}")))
}

/// `POST /receive`
///
/// The body is read raw so that non-JSON input gets the same 400 answer as a
/// missing field.
pub async fn receive(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<Json<ReceiveResponse>, ReceiveError> {
    let result = handle(&state, &body);
    let status = match &result {
        Ok(_) => "success",
        Err(ReceiveError::InvalidFormat(_)) => "invalid",
        Err(ReceiveError::Internal(_)) => "error",
    };
    counter!(RECEIVES_TOTAL, "status" => status).increment(1);
    result
}

fn handle(state: &HttpState, body: &[u8]) -> Result<Json<ReceiveResponse>, ReceiveError> {
    let request: ReceiveRequest = serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "unreadable transport-layer callback");
        ReceiveError::InvalidFormat(e.to_string())
    })?;
    let envelope = request.into_envelope().inspect_err(|e| {
        warn!(error = %e, "rejected transport-layer callback");
    })?;

    let frame = serde_json::to_string(&envelope)
        .map(Utf8Bytes::from)
        .map_err(|e| ReceiveError::Internal(e.to_string()))?;
    let earth = broadcast_frame(&state.earth, &frame);
    let mars = broadcast_frame(&state.mars, &frame);
    info!(
        username = %envelope.username,
        id = envelope.id,
        lost = envelope.error.is_some(),
        earth_delivered = earth.delivered,
        mars_delivered = mars.delivered,
        "message received from transport layer"
    );

    Ok(Json(ReceiveResponse {
        status: "success",
        message: "Message received and broadcasted to Mars and Earth",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: Option<&str>, send_time: Option<&str>, message: Option<&str>) -> ReceiveRequest {
        ReceiveRequest {
            username: username.map(Into::into),
            send_time: send_time.map(Into::into),
            message: message.map(Into::into),
            error: None,
        }
    }

    #[test]
    fn valid_request_rebuilds_envelope() {
        let env = request(Some("Alice"), Some("2023-11-14T22:13:21.000Z"), Some("hi"))
            .into_envelope()
            .unwrap();
        assert_eq!(env, Envelope::delivered("Alice".into(), "hi".into(), 1_700_000_001_000, None));
    }

    #[test]
    fn missing_fields_are_invalid() {
        let cases = [
            request(None, Some("2023-11-14T22:13:21.000Z"), Some("hi")),
            request(Some("Alice"), None, Some("hi")),
            request(Some("Alice"), Some("2023-11-14T22:13:21.000Z"), None),
            request(Some(""), Some("2023-11-14T22:13:21.000Z"), Some("hi")),
            request(Some("Alice"), Some("2023-11-14T22:13:21.000Z"), Some("")),
        ];
        for case in cases {
            assert!(matches!(case.into_envelope(), Err(ReceiveError::InvalidFormat(_))));
        }
    }

    #[test]
    fn bad_send_time_is_invalid() {
        let result = request(Some("Alice"), Some("soon"), Some("hi")).into_envelope();
        assert!(matches!(result, Err(ReceiveError::InvalidFormat(_))));
    }

    #[test]
    fn error_is_carried_over() {
        let mut req = request(Some("Alice"), Some("2023-11-14T22:13:21.000Z"), Some("hi"));
        req.error = Some("lost in a dust storm".into());
        let env = req.into_envelope().unwrap();
        assert_eq!(env.error.as_deref(), Some("lost in a dust storm"));
    }

    #[test]
    fn empty_error_is_dropped() {
        let mut req = request(Some("Alice"), Some("2023-11-14T22:13:21.000Z"), Some("hi"));
        req.error = Some(String::new());
        assert!(req.into_envelope().unwrap().error.is_none());
    }

    #[test]
    fn request_deserializes_camel_case() {
        let req: ReceiveRequest = serde_json::from_str(
            r#"{"username":"A","sendTime":"2023-11-14T22:13:21.000Z","message":"m","error":"e"}"#,
        )
        .unwrap();
        assert_eq!(req.send_time.as_deref(), Some("2023-11-14T22:13:21.000Z"));
        assert_eq!(req.error.as_deref(), Some("e"));
    }
}
