use std::time::Duration;

use futures::{stream::BoxStream, StreamExt};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};
use vigia_capture::VideoSource;
use vigia_network::{network_error, RecognitionChannel};
use vigia_types::{
    config::EnrollmentConfig,
    protocol::{CameraRegistration, FaceSamples, InboundMessage, OutboundMessage, SubmitResult},
    Result, VigiaError,
};
use vigia_vision::FrameEncoder;

/// Grabs `config.samples` stills from `source`, `config.spacing_ms` apart.
/// Ticks where the source has no frame are skipped, so fewer samples may
/// come back.
pub async fn capture_samples(
    source: &dyn VideoSource,
    config: &EnrollmentConfig,
) -> Result<Vec<String>> {
    let mut encoder = FrameEncoder::new(config.jpeg_quality);
    let spacing = Duration::from_millis(config.spacing_ms);
    let mut samples = Vec::with_capacity(config.samples);

    for index in 0..config.samples {
        match encoder.encode(source)? {
            Some(frame) => samples.push(frame.data_url),
            None => debug!("No frame available for sample {}", index + 1),
        }
        if index + 1 < config.samples {
            sleep(spacing).await;
        }
    }
    Ok(samples)
}

/// Captures face samples for `name` and submits them, waiting for the
/// service's verdict.
pub async fn enroll<C>(
    channel: &C,
    name: &str,
    source: &dyn VideoSource,
    config: &EnrollmentConfig,
) -> Result<SubmitResult>
where
    C: RecognitionChannel + ?Sized,
{
    let name = name.trim();
    if name.is_empty() {
        return Err(enrollment_error("a name is required"));
    }
    let samples = capture_samples(source, config).await?;
    if samples.is_empty() {
        return Err(enrollment_error("camera produced no frames to submit"));
    }

    let mut replies = channel.subscribe();
    info!("Submitting {} sample(s) for {name}", samples.len());
    channel
        .emit(OutboundMessage::SubmitFaceSamples(FaceSamples {
            name: name.to_string(),
            samples,
        }))
        .await?;

    let wait = Duration::from_millis(config.reply_timeout_ms);
    await_reply(&mut replies, wait, |message| match message {
        InboundMessage::SubmitResult(result) => Some(result),
        _ => None,
    })
    .await
}

/// Registers an additional camera stream with the service and returns the
/// identifier it acknowledged.
pub async fn register_camera<C>(
    channel: &C,
    camera_id: &str,
    url: &str,
    wait: Duration,
) -> Result<String>
where
    C: RecognitionChannel + ?Sized,
{
    let url = url.trim();
    if url.is_empty() {
        return Err(enrollment_error("a camera URL is required"));
    }

    let mut replies = channel.subscribe();
    channel
        .emit(OutboundMessage::RegisterCamera(CameraRegistration {
            camera_id: camera_id.trim().to_string(),
            url: url.to_string(),
        }))
        .await?;

    let registered = await_reply(&mut replies, wait, |message| match message {
        InboundMessage::CameraRegistered { camera_id } => Some(camera_id),
        _ => None,
    })
    .await?;
    info!("Camera {registered} registered");
    Ok(registered)
}

async fn await_reply<T, F>(
    replies: &mut BoxStream<'static, InboundMessage>,
    wait: Duration,
    pick: F,
) -> Result<T>
where
    F: Fn(InboundMessage) -> Option<T>,
{
    let reply = async {
        while let Some(message) = replies.next().await {
            if let Some(value) = pick(message) {
                return Ok(value);
            }
        }
        Err(network_error("connection closed before the service replied"))
    };
    timeout(wait, reply)
        .await
        .map_err(|_| network_error(format!("no reply within {}ms", wait.as_millis())))?
}

pub fn enrollment_error(message: impl Into<String>) -> VigiaError {
    VigiaError::Enrollment(message.into())
}
