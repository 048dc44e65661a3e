use std::time::Duration;

use futures::StreamExt;
use image::{Rgba, RgbaImage};
use tokio::{sync::mpsc, time::timeout};
use vigia_capture::SyntheticDevice;
use vigia_network::LocalChannel;
use vigia_ops::TelemetryStore;
use vigia_orchestrator::{ControllerEvent, DemoService, StreamController, UserCommand};
use vigia_types::{
    config::VigiaConfig,
    detection::{DetectionResult, RecognitionUpdate},
    events::{EventPayload, LifecyclePhase},
    geometry::{BoundingBox, Size},
    protocol::{InboundMessage, OutboundMessage},
};
use vigia_vision::encoder::{encode_jpeg, to_data_url};

fn alice_update() -> InboundMessage {
    let frame = RgbaImage::from_pixel(320, 240, Rgba([30, 30, 30, 255]));
    let jpeg = encode_jpeg(&frame, 80).expect("encode jpeg");
    let update = RecognitionUpdate::new(
        "cam2",
        vec![DetectionResult::new(
            BoundingBox::new(10.0, 10.0, 20.0, 20.0),
            Some("Alice".into()),
        )],
    )
    .with_source(320.0, 240.0)
    .with_frame_image(to_data_url(&jpeg));
    InboundMessage::RecognitionUpdate(update.into_raw())
}

#[tokio::test]
async fn remote_camera_feed_is_created_painted_and_annotated() {
    let channel = LocalChannel::new(32);
    let mut sent = channel.outbound();
    let mut controller = StreamController::new(
        &VigiaConfig::default(),
        channel.clone(),
        SyntheticDevice::new(Size::new(64, 48)),
        TelemetryStore::new(),
    )
    .expect("controller");
    let mut events = controller.subscribe_events();

    controller
        .handle_event(ControllerEvent::Command(UserCommand::SetMulticam(true)))
        .await;
    assert_eq!(sent.next().await, Some(OutboundMessage::enable_multicam()));

    controller
        .handle_event(ControllerEvent::MessageReceived(alice_update()))
        .await;
    controller.process_next_internal().await;

    let feed = controller.registry().get("cam2").expect("cam2 feed");
    assert_eq!(feed.title(), "Câmera cam2");
    let surface = feed.surface();
    assert_eq!(surface.size(), Size::new(320, 240));
    assert_eq!(
        surface.background().map(|b| b.dimensions()),
        Some((320, 240))
    );

    // Marker's left edge, the translucent label band clamped to the top row,
    // and nothing elsewhere.
    let overlay = surface.overlay().image();
    assert_eq!(overlay.get_pixel(10, 25).0, [0, 255, 0, 255]);
    assert_eq!(overlay.get_pixel(74, 1).0, [0, 0, 0, 128]);
    assert_eq!(overlay.get_pixel(300, 200).0[3], 0);
    assert!(controller.main_feed().surface().overlay().is_blank());

    let rendered = std::iter::from_fn(|| events.try_recv().ok())
        .find_map(|event| match event.payload {
            EventPayload::Rendered(render) => Some(render),
            _ => None,
        })
        .expect("render event");
    assert_eq!(rendered.camera_id, "cam2");
    assert_eq!(rendered.labels, vec!["Alice".to_string()]);
    assert!(rendered.with_background);
}

#[tokio::test]
async fn offline_session_runs_against_demo_service() {
    let mut config = VigiaConfig::default();
    config.capture.interval_ms = 10;
    let channel = LocalChannel::new(256);
    DemoService::new(channel.clone(), Size::new(64, 48), Duration::from_millis(10)).spawn();

    let mut controller = StreamController::new(
        &config,
        channel,
        SyntheticDevice::new(Size::new(64, 48)),
        TelemetryStore::new(),
    )
    .expect("controller");
    let telemetry = controller.telemetry().clone();
    let (commands, rx) = mpsc::channel(8);

    let session = tokio::spawn(async move {
        controller.run(rx).await;
        controller
    });

    commands
        .send(UserCommand::SetMulticam(true))
        .await
        .expect("enable multicam");
    timeout(Duration::from_secs(5), async {
        loop {
            let stats = telemetry.session().await;
            if stats.frames_sent > 0
                && stats.renders_by_camera.contains_key("main")
                && stats.renders_by_camera.contains_key("demo-1")
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session produced renders for local and remote cameras");

    commands.send(UserCommand::Shutdown).await.expect("shutdown");
    let controller = session.await.expect("session task");
    assert!(controller.multicam_enabled());
    assert!(controller.registry().contains("demo-1"));
    assert!(controller.main_feed().video().source().is_none());
    let last = telemetry.snapshot_events().await.pop().expect("events");
    assert!(matches!(
        last.payload,
        EventPayload::Lifecycle(LifecyclePhase::Shutdown)
    ));
}
