//! Message envelopes exchanged with the recognition service.
//!
//! Each message travels as a single JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{detection::RawRecognitionUpdate, Result, VigiaError};

pub const EVENT_CLIENT_FRAME: &str = "client_frame";
pub const EVENT_ENABLE_MULTICAM: &str = "enable_multicam";
pub const EVENT_DISABLE_MULTICAM: &str = "disable_multicam";
pub const EVENT_SUBMIT_FACE_SAMPLES: &str = "submit_face_samples";
pub const EVENT_REGISTER_CAMERA: &str = "register_camera";

pub const EVENT_RECOGNITION_UPDATE: &str = "recognition_update";
pub const EVENT_SERVER_INFO: &str = "server_info";
pub const EVENT_MULTICAM_STARTED: &str = "multicam_started";
pub const EVENT_MULTICAM_STOPPED: &str = "multicam_stopped";
pub const EVENT_SUBMIT_RESULT: &str = "submit_result";
pub const EVENT_CAMERA_REGISTERED: &str = "camera_registered";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "dataURL")]
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceSamples {
    pub name: String,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraRegistration {
    pub camera_id: String,
    pub url: String,
}

/// Messages the client sends to the recognition service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    ClientFrame(ClientFrame),
    EnableMulticam(EmptyPayload),
    DisableMulticam(EmptyPayload),
    SubmitFaceSamples(FaceSamples),
    RegisterCamera(CameraRegistration),
}

impl OutboundMessage {
    pub fn client_frame(data_url: impl Into<String>) -> Self {
        Self::ClientFrame(ClientFrame {
            data_url: data_url.into(),
        })
    }

    pub fn enable_multicam() -> Self {
        Self::EnableMulticam(EmptyPayload::default())
    }

    pub fn disable_multicam() -> Self {
        Self::DisableMulticam(EmptyPayload::default())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ClientFrame(_) => EVENT_CLIENT_FRAME,
            Self::EnableMulticam(_) => EVENT_ENABLE_MULTICAM,
            Self::DisableMulticam(_) => EVENT_DISABLE_MULTICAM,
            Self::SubmitFaceSamples(_) => EVENT_SUBMIT_FACE_SAMPLES,
            Self::RegisterCamera(_) => EVENT_REGISTER_CAMERA,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub ok: bool,
    #[serde(default)]
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Messages the recognition service pushes to the client.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    RecognitionUpdate(RawRecognitionUpdate),
    ServerInfo { status: String },
    MulticamStarted { started: Vec<String> },
    MulticamStopped { ok: bool },
    SubmitResult(SubmitResult),
    CameraRegistered { camera_id: String },
    Unknown { event: String, data: Value },
}

#[derive(Deserialize)]
struct ServerInfoPayload {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct MulticamStartedPayload {
    #[serde(default)]
    started: Vec<String>,
}

#[derive(Deserialize)]
struct MulticamStoppedPayload {
    #[serde(default)]
    ok: bool,
}

#[derive(Deserialize)]
struct CameraRegisteredPayload {
    camera_id: String,
}

impl InboundMessage {
    pub fn event_name(&self) -> &str {
        match self {
            Self::RecognitionUpdate(_) => EVENT_RECOGNITION_UPDATE,
            Self::ServerInfo { .. } => EVENT_SERVER_INFO,
            Self::MulticamStarted { .. } => EVENT_MULTICAM_STARTED,
            Self::MulticamStopped { .. } => EVENT_MULTICAM_STOPPED,
            Self::SubmitResult(_) => EVENT_SUBMIT_RESULT,
            Self::CameraRegistered { .. } => EVENT_CAMERA_REGISTERED,
            Self::Unknown { event, .. } => event,
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        let Envelope { event, data } = envelope;
        let message = match event.as_str() {
            EVENT_RECOGNITION_UPDATE => Self::RecognitionUpdate(payload(&event, data)?),
            EVENT_SERVER_INFO => {
                let p: ServerInfoPayload = payload(&event, data)?;
                Self::ServerInfo { status: p.status }
            }
            EVENT_MULTICAM_STARTED => {
                let p: MulticamStartedPayload = payload(&event, data)?;
                Self::MulticamStarted { started: p.started }
            }
            EVENT_MULTICAM_STOPPED => {
                let p: MulticamStoppedPayload = payload(&event, data)?;
                Self::MulticamStopped { ok: p.ok }
            }
            EVENT_SUBMIT_RESULT => Self::SubmitResult(payload(&event, data)?),
            EVENT_CAMERA_REGISTERED => {
                let p: CameraRegisteredPayload = payload(&event, data)?;
                Self::CameraRegistered {
                    camera_id: p.camera_id,
                }
            }
            _ => Self::Unknown { event, data },
        };
        Ok(message)
    }

    pub fn to_envelope(&self) -> Result<Envelope> {
        let data = match self {
            Self::RecognitionUpdate(raw) => to_value(raw)?,
            Self::ServerInfo { status } => serde_json::json!({ "status": status }),
            Self::MulticamStarted { started } => serde_json::json!({ "started": started }),
            Self::MulticamStopped { ok } => serde_json::json!({ "ok": ok }),
            Self::SubmitResult(result) => to_value(result)?,
            Self::CameraRegistered { camera_id } => serde_json::json!({ "camera_id": camera_id }),
            Self::Unknown { data, .. } => data.clone(),
        };
        Ok(Envelope {
            event: self.event_name().to_string(),
            data,
        })
    }
}

fn payload<T: for<'de> Deserialize<'de>>(event: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|err| VigiaError::Protocol(format!("invalid '{event}' payload: {err}")))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|err| VigiaError::Protocol(format!("failed to encode payload: {err}")))
}

/// Encodes an outbound message as one wire line (without the trailing newline).
pub fn encode_outbound(message: &OutboundMessage) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|err| VigiaError::Protocol(format!("failed to encode {}: {err}", message.event_name())))
}

pub fn decode_outbound(line: &str) -> Result<OutboundMessage> {
    serde_json::from_str(line)
        .map_err(|err| VigiaError::Protocol(format!("invalid outbound line: {err}")))
}

pub fn encode_inbound(message: &InboundMessage) -> Result<String> {
    let envelope = message.to_envelope()?;
    serde_json::to_string(&envelope)
        .map_err(|err| VigiaError::Protocol(format!("failed to encode {}: {err}", envelope.event)))
}

/// Decodes one wire line received from the service.
pub fn decode_inbound(line: &str) -> Result<InboundMessage> {
    let envelope: Envelope = serde_json::from_str(line)
        .map_err(|err| VigiaError::Protocol(format!("invalid inbound line: {err}")))?;
    InboundMessage::from_envelope(envelope)
}
