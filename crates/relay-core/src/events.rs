//! Duplex-channel events and their wire form.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.

use serde::Serialize;
use serde_json::Value;

pub const BACKEND_STATUS: &str = "backend_status";
pub const OTP_RECEIVED: &str = "otp_received";
pub const REQUEST_OTP_SIMULATION: &str = "request_otp_simulation";

/// Server → browser events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    BackendStatus { message: String },
    OtpReceived { otp: String },
}

impl ServerEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::BackendStatus {
            message: message.into(),
        }
    }

    pub fn otp(otp: impl Into<String>) -> Self {
        Self::OtpReceived { otp: otp.into() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BackendStatus { .. } => BACKEND_STATUS,
            Self::OtpReceived { .. } => OTP_RECEIVED,
        }
    }

    pub fn to_wire(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Browser → server events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    RequestOtpSimulation,
    Unknown(String),
}

/// Why a client frame could not be read.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON")]
    InvalidJson,
    #[error("frame has no event name")]
    MissingEvent,
}

impl ClientEvent {
    /// Parse a client frame. Payloads are ignored; no client event carries one.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| FrameError::InvalidJson)?;
        let name = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingEvent)?;
        Ok(match name {
            REQUEST_OTP_SIMULATION => Self::RequestOtpSimulation,
            other => Self::Unknown(other.to_string()),
        })
    }
}
