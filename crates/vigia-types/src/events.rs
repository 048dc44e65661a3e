use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable event envelope published by the stream controller for
/// dashboards, logging, and telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecyclePhase),
    FrameSent { bytes: usize },
    Rendered(RenderEvent),
    FeedCreated { camera_id: String },
    FeedsCleared { count: usize },
    Multicam { enabled: bool },
    Server { message: String },
    Alert { message: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Boot,
    CameraReady,
    CameraUnavailable,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderEvent {
    pub camera_id: String,
    pub labels: Vec<String>,
    pub with_background: bool,
}

impl ClientEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn lifecycle(phase: LifecyclePhase) -> Self {
        Self::new(EventPayload::Lifecycle(phase))
    }

    pub fn alert(message: impl Into<String>) -> Self {
        Self::new(EventPayload::Alert {
            message: message.into(),
        })
    }
}
