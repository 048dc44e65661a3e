//! Offline stand-in for the recognition service, used by `--offline` runs
//! and integration tests.

use std::time::Duration;

use futures::{stream::BoxStream, StreamExt};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use vigia_capture::{SyntheticCamera, VideoSource};
use vigia_network::LocalChannel;
use vigia_types::{
    detection::{DetectionResult, RecognitionUpdate, MAIN_CAMERA_ID},
    geometry::{BoundingBox, Size},
    protocol::{InboundMessage, OutboundMessage, SubmitResult},
};
use vigia_vision::{
    decode_data_url,
    encoder::{encode_jpeg, to_data_url},
};

const DEMO_JPEG_QUALITY: u8 = 70;

struct DemoCamera {
    id: String,
    name: Option<String>,
    camera: SyntheticCamera,
}

/// Answers client messages over a [`LocalChannel`] the way a recognition
/// server would, with synthetic detections.
pub struct DemoService {
    channel: LocalChannel,
    cameras: Vec<DemoCamera>,
    tile: Size,
    period: Duration,
    multicam: bool,
    greeted: bool,
    tick: u64,
}

impl DemoService {
    pub fn new(channel: LocalChannel, tile: Size, period: Duration) -> Self {
        let cameras = [("demo-1", Some("Alice")), ("demo-2", None)]
            .into_iter()
            .map(|(id, name)| DemoCamera {
                id: id.to_string(),
                name: name.map(str::to_string),
                camera: SyntheticCamera::new(tile, Duration::ZERO),
            })
            .collect();
        Self {
            channel,
            cameras,
            tile,
            period: period.max(Duration::from_millis(1)),
            multicam: false,
            greeted: false,
            tick: 0,
        }
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras.iter().map(|c| c.id.clone()).collect()
    }

    /// Subscribes to client messages before returning, so nothing emitted
    /// after this call is missed.
    pub fn spawn(self) -> JoinHandle<()> {
        let requests = self.channel.outbound();
        tokio::spawn(self.serve(requests))
    }

    async fn serve(mut self, mut requests: BoxStream<'static, OutboundMessage>) {
        info!("Demo recognition service running with {} camera(s)", self.cameras.len());
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                request = requests.next() => match request {
                    Some(request) => self.answer(request),
                    None => break,
                },
                _ = ticker.tick(), if self.multicam => self.publish_feeds(),
            }
        }
        debug!("Demo recognition service stopped");
    }

    fn answer(&mut self, request: OutboundMessage) {
        match request {
            OutboundMessage::ClientFrame(frame) => {
                if !self.greeted {
                    self.greeted = true;
                    self.channel.deliver(InboundMessage::ServerInfo {
                        status: "demo service connected".into(),
                    });
                }
                match decode_data_url(&frame.data_url) {
                    Ok(image) => {
                        let (width, height) = image.dimensions();
                        let face = centered_box(Size::new(width, height), 0);
                        let update = RecognitionUpdate::new(
                            MAIN_CAMERA_ID,
                            vec![DetectionResult::new(face, None)],
                        )
                        .with_source(width as f32, height as f32);
                        self.channel
                            .deliver(InboundMessage::RecognitionUpdate(update.into_raw()));
                    }
                    Err(err) => warn!("Demo service could not read client frame: {err}"),
                }
            }
            OutboundMessage::EnableMulticam(_) => {
                self.multicam = true;
                self.channel.deliver(InboundMessage::MulticamStarted {
                    started: self.camera_ids(),
                });
            }
            OutboundMessage::DisableMulticam(_) => {
                self.multicam = false;
                self.channel
                    .deliver(InboundMessage::MulticamStopped { ok: true });
            }
            OutboundMessage::SubmitFaceSamples(submitted) => {
                let count = submitted.samples.len() as u32;
                let ok = count > 0;
                let msg = if ok {
                    format!("{} enrolled with {count} sample(s)", submitted.name)
                } else {
                    "no samples received".to_string()
                };
                self.channel
                    .deliver(InboundMessage::SubmitResult(SubmitResult {
                        ok,
                        msg,
                        count: Some(count),
                    }));
            }
            OutboundMessage::RegisterCamera(registration) => {
                if !self.cameras.iter().any(|c| c.id == registration.camera_id) {
                    self.cameras.push(DemoCamera {
                        id: registration.camera_id.clone(),
                        name: None,
                        camera: SyntheticCamera::new(self.tile, Duration::ZERO),
                    });
                }
                self.channel.deliver(InboundMessage::CameraRegistered {
                    camera_id: registration.camera_id,
                });
            }
        }
    }

    fn publish_feeds(&mut self) {
        self.tick += 1;
        for demo in &self.cameras {
            let Some(frame) = demo.camera.current_frame() else {
                continue;
            };
            let jpeg = match encode_jpeg(&frame, DEMO_JPEG_QUALITY) {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    warn!("Demo frame for {} not encoded: {err}", demo.id);
                    continue;
                }
            };
            let (width, height) = frame.dimensions();
            let face = centered_box(Size::new(width, height), self.tick);
            let update = RecognitionUpdate::new(
                demo.id.clone(),
                vec![DetectionResult::new(face, demo.name.clone())],
            )
            .with_source(width as f32, height as f32)
            .with_frame_image(to_data_url(&jpeg));
            self.channel
                .deliver(InboundMessage::RecognitionUpdate(update.into_raw()));
        }
    }
}

/// Quarter-size box near the centre, drifting sideways with `tick`.
fn centered_box(frame: Size, tick: u64) -> BoundingBox {
    let w = frame.width as f32 / 4.0;
    let h = frame.height as f32 / 4.0;
    let drift = ((tick % 9) as f32 - 4.0) * w / 8.0;
    BoundingBox::new(
        (frame.width as f32 - w) / 2.0 + drift,
        (frame.height as f32 - h) / 2.0,
        w,
        h,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::{Rgba, RgbaImage};
    use vigia_network::RecognitionChannel;

    #[test]
    fn centered_box_is_a_quarter_of_the_frame() {
        let face = centered_box(Size::new(320, 240), 4);
        assert_relative_eq!(face.w, 80.0);
        assert_relative_eq!(face.h, 60.0);
        assert_relative_eq!(face.x, 120.0);
        assert_relative_eq!(face.y, 90.0);
    }

    #[tokio::test]
    async fn answers_client_frames_with_main_camera_updates() {
        let channel = LocalChannel::new(32);
        let mut inbound = channel.subscribe();
        DemoService::new(channel.clone(), Size::new(32, 24), Duration::from_millis(10)).spawn();

        let jpeg = encode_jpeg(&RgbaImage::from_pixel(64, 48, Rgba([1, 2, 3, 255])), 80)
            .expect("encode jpeg");
        channel
            .emit(OutboundMessage::client_frame(to_data_url(&jpeg)))
            .await
            .expect("emit");

        let mut saw_info = false;
        loop {
            match inbound.next().await.expect("inbound message") {
                InboundMessage::ServerInfo { .. } => saw_info = true,
                InboundMessage::RecognitionUpdate(raw) => {
                    let update = RecognitionUpdate::from_raw(raw).expect("valid update");
                    assert!(update.is_main());
                    assert_eq!(update.results.len(), 1);
                    assert_eq!(update.source.width, Some(64.0));
                    break;
                }
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert!(saw_info);
    }

    #[tokio::test]
    async fn multicam_streams_frames_for_each_demo_camera() {
        let channel = LocalChannel::new(64);
        let mut inbound = channel.subscribe();
        DemoService::new(channel.clone(), Size::new(32, 24), Duration::from_millis(5)).spawn();
        channel
            .emit(OutboundMessage::enable_multicam())
            .await
            .expect("emit");

        match inbound.next().await {
            Some(InboundMessage::MulticamStarted { started }) => {
                assert_eq!(started, vec!["demo-1".to_string(), "demo-2".to_string()])
            }
            other => panic!("unexpected message: {other:?}"),
        }
        match inbound.next().await {
            Some(InboundMessage::RecognitionUpdate(raw)) => {
                let update = RecognitionUpdate::from_raw(raw).expect("valid update");
                assert_eq!(update.camera_id, "demo-1");
                assert!(update.frame_image.is_some());
                assert_eq!(update.results[0].name.as_deref(), Some("Alice"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
