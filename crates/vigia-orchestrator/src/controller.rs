//! Session event loop tying the local camera, the recognition channel, and
//! the displayed surfaces together.

use std::{future::pending, path::PathBuf, sync::Arc, time::Duration};

use futures::StreamExt;
use image::RgbaImage;
use tokio::{
    sync::{broadcast, mpsc},
    time::{interval, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, trace, warn};
use vigia_capture::{MediaDevice, VideoSource};
use vigia_network::RecognitionChannel;
use vigia_ops::{SnapshotWriter, TelemetryStore};
use vigia_types::{
    config::VigiaConfig,
    detection::{DetectionResult, RecognitionUpdate, SourceDims, MAIN_CAMERA_ID},
    events::{ClientEvent, EventPayload, LifecyclePhase, RenderEvent},
    geometry::Size,
    protocol::{InboundMessage, OutboundMessage},
    Result,
};
use vigia_vision::{decode_data_url, FrameEncoder, OverlayRenderer, OverlayStyle};

use crate::registry::{CameraFeed, CameraRegistry};

const EVENT_BUS_CAPACITY: usize = 256;

/// Requests coming from the user interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    SetMulticam(bool),
    ToggleMulticam,
    Snapshot,
    ResizeMain(Size),
    ResizeGrid(Size),
    Shutdown,
}

/// Surface a decoded frame belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceTarget {
    Main,
    Feed { camera_id: String, generation: u64 },
}

/// Completed background decode, delivered back to the event loop.
pub struct DecodedFrame {
    pub target: SurfaceTarget,
    pub seq: u64,
    pub image: Result<RgbaImage>,
    pub results: Vec<DetectionResult>,
    pub source: SourceDims,
}

/// Everything the controller reacts to. Handlers run one at a time.
pub enum ControllerEvent {
    PermissionResolved(Result<Arc<dyn VideoSource>>),
    TimerTick,
    MessageReceived(InboundMessage),
    ImageDecoded(DecodedFrame),
    Command(UserCommand),
}

pub struct StreamController<C, D>
where
    C: RecognitionChannel,
    D: MediaDevice,
{
    channel: C,
    device: Arc<D>,
    main: CameraFeed,
    registry: CameraRegistry,
    encoder: FrameEncoder,
    renderer: OverlayRenderer,
    multicam: bool,
    connected: bool,
    capture_interval: Duration,
    snapshot_interval: Option<Duration>,
    snapshots: Option<SnapshotWriter>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    bus: broadcast::Sender<ClientEvent>,
    telemetry: TelemetryStore,
}

impl<C, D> StreamController<C, D>
where
    C: RecognitionChannel,
    D: MediaDevice + 'static,
{
    pub fn new(
        config: &VigiaConfig,
        channel: C,
        device: D,
        telemetry: TelemetryStore,
    ) -> Result<Self> {
        let snapshots = config
            .ops
            .snapshot_dir
            .as_deref()
            .map(SnapshotWriter::new)
            .transpose()?;
        let snapshot_interval = (snapshots.is_some() && config.ops.snapshot_interval_ms > 0)
            .then(|| Duration::from_millis(config.ops.snapshot_interval_ms));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        let connected = channel.is_connected();

        Ok(Self {
            channel,
            device: Arc::new(device),
            main: CameraFeed::new(MAIN_CAMERA_ID, config.display.main_size),
            registry: CameraRegistry::new(config.display.grid_tile_size),
            encoder: FrameEncoder::new(config.capture.jpeg_quality),
            renderer: OverlayRenderer::new(OverlayStyle::from(&config.overlay)),
            multicam: false,
            connected,
            capture_interval: Duration::from_millis(config.capture.interval_ms.max(1)),
            snapshot_interval,
            snapshots,
            events_tx,
            events_rx,
            bus,
            telemetry,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.bus.subscribe()
    }

    pub fn main_feed(&self) -> &CameraFeed {
        &self.main
    }

    pub fn registry(&self) -> &CameraRegistry {
        &self.registry
    }

    pub fn multicam_enabled(&self) -> bool {
        self.multicam
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    /// Publishes `Boot` and requests camera access in the background. The
    /// outcome arrives as [`ControllerEvent::PermissionResolved`].
    pub async fn start(&mut self) {
        self.publish(ClientEvent::lifecycle(LifecyclePhase::Boot))
            .await;
        let device = Arc::clone(&self.device);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = device.open().await;
            let _ = events.send(ControllerEvent::PermissionResolved(outcome));
        });
    }

    /// Requests the camera, connects, then serves events until shutdown is
    /// requested, the command sender goes away, or the recognition channel
    /// closes. An unreachable service does not stop the session: the camera
    /// stays bound and capture resumes once the channel reports a connection.
    /// The camera is released on every exit path.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<UserCommand>) {
        let mut inbound = self.channel.subscribe();
        self.start().await;
        match self.channel.connect().await {
            Ok(()) => self.connected = self.channel.is_connected(),
            Err(err) => {
                warn!("Recognition service unavailable: {err}");
                self.connected = false;
                self.publish(ClientEvent::alert(format!(
                    "Recognition service unavailable: {err}"
                )))
                .await;
            }
        }

        let mut capture = interval(self.capture_interval);
        capture.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut snapshot_timer = self.snapshot_interval.map(|period| {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer
        });

        loop {
            let event = tokio::select! {
                Some(event) = self.events_rx.recv() => event,
                message = inbound.next() => match message {
                    Some(message) => ControllerEvent::MessageReceived(message),
                    None => {
                        warn!("Recognition channel closed; stopping stream");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(UserCommand::Shutdown) | None => break,
                    Some(command) => ControllerEvent::Command(command),
                },
                _ = capture.tick() => ControllerEvent::TimerTick,
                _ = next_tick(&mut snapshot_timer) => ControllerEvent::Command(UserCommand::Snapshot),
            };
            self.handle_event(event).await;
        }

        self.shutdown().await;
    }

    /// Waits for the next internally produced event (camera permission or a
    /// finished decode) and handles it.
    pub async fn process_next_internal(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event).await;
        }
    }

    pub async fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::PermissionResolved(Ok(source)) => {
                info!("Camera '{}' ready", source.label());
                self.encoder.reset();
                self.main.video_mut().bind(source);
                self.publish(ClientEvent::lifecycle(LifecyclePhase::CameraReady))
                    .await;
            }
            ControllerEvent::PermissionResolved(Err(err)) => {
                error!("Unable to access webcam: {err}");
                self.publish(ClientEvent::alert(format!("Unable to access webcam: {err}")))
                    .await;
                self.publish(ClientEvent::lifecycle(LifecyclePhase::CameraUnavailable))
                    .await;
            }
            ControllerEvent::TimerTick => self.capture_and_send().await,
            ControllerEvent::MessageReceived(message) => self.handle_inbound(message).await,
            ControllerEvent::ImageDecoded(frame) => self.apply_decoded(frame).await,
            ControllerEvent::Command(command) => self.handle_command(command).await,
        }
    }

    async fn capture_and_send(&mut self) {
        self.track_connection().await;
        if !self.connected {
            return;
        }
        let Some(source) = self.main.video().source().cloned() else {
            return;
        };
        let frame = match self.encoder.encode(source.as_ref()) {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(err) => {
                warn!("Frame capture failed: {err}");
                return;
            }
        };
        let bytes = frame.jpeg_bytes;
        if let Err(err) = self
            .channel
            .emit(OutboundMessage::client_frame(frame.data_url))
            .await
        {
            warn!("Unable to send frame: {err}");
            return;
        }
        self.publish(ClientEvent::new(EventPayload::FrameSent { bytes }))
            .await;
    }

    async fn track_connection(&mut self) {
        let connected = self.channel.is_connected();
        if connected == self.connected {
            return;
        }
        self.connected = connected;
        if !connected {
            warn!("Lost connection to recognition service; capture paused");
            self.publish(ClientEvent::alert("Lost connection to recognition service"))
                .await;
            return;
        }

        info!("Connection to recognition service restored");
        // A restarted service has no memory of the multicam request.
        if self.multicam {
            if let Err(err) = self.channel.emit(OutboundMessage::enable_multicam()).await {
                warn!("Unable to restore multicam: {err}");
            }
        }
        self.publish(server_event("connection restored")).await;
    }

    async fn handle_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::RecognitionUpdate(raw) => match RecognitionUpdate::from_raw(raw) {
                Some(update) => self.handle_update(update).await,
                None => debug!("Dropping recognition update without camera_id"),
            },
            InboundMessage::ServerInfo { status } => {
                info!("Server: {status}");
                self.publish(server_event(status)).await;
            }
            InboundMessage::MulticamStarted { started } => {
                info!("Server started {} camera stream(s)", started.len());
                self.publish(server_event(format!(
                    "multicam started: {}",
                    started.join(", ")
                )))
                .await;
            }
            InboundMessage::MulticamStopped { ok } => {
                info!("Server stopped camera streams (ok={ok})");
                self.publish(server_event(format!("multicam stopped (ok={ok})")))
                    .await;
            }
            InboundMessage::CameraRegistered { camera_id } => {
                info!("Camera {camera_id} registered on server");
            }
            InboundMessage::SubmitResult(result) => {
                debug!("Ignoring submit result outside enrollment: {}", result.msg);
            }
            InboundMessage::Unknown { event, .. } => debug!("Ignoring unknown event '{event}'"),
        }
    }

    async fn handle_update(&mut self, update: RecognitionUpdate) {
        let RecognitionUpdate {
            camera_id,
            results,
            frame_image,
            source,
        } = update;
        let is_main = camera_id == MAIN_CAMERA_ID;
        let created = !is_main && !self.registry.contains(&camera_id);

        let (feed, target, frame_image) = if is_main {
            if frame_image.is_some() {
                trace!("Main camera renders over the live video; ignoring frame image");
            }
            (&mut self.main, SurfaceTarget::Main, None)
        } else {
            let feed = self.registry.resolve(&camera_id);
            let target = SurfaceTarget::Feed {
                camera_id: camera_id.clone(),
                generation: feed.generation(),
            };
            (feed, target, frame_image)
        };
        let seq = feed.next_sequence();

        let rendered = match frame_image {
            Some(encoded) => {
                let events = self.events_tx.clone();
                tokio::task::spawn_blocking(move || {
                    let image = decode_data_url(&encoded);
                    let _ = events.send(ControllerEvent::ImageDecoded(DecodedFrame {
                        target,
                        seq,
                        image,
                        results,
                        source,
                    }));
                });
                None
            }
            None => {
                feed.surface_mut().sync_layout();
                Some(render_overlay(feed, &self.renderer, seq, &results, source, false))
            }
        };

        if created {
            self.publish(ClientEvent::new(EventPayload::FeedCreated { camera_id }))
                .await;
        }
        if let Some(render) = rendered {
            self.publish(ClientEvent::new(EventPayload::Rendered(render)))
                .await;
        }
    }

    async fn apply_decoded(&mut self, frame: DecodedFrame) {
        let DecodedFrame {
            target,
            seq,
            image,
            results,
            source,
        } = frame;
        let feed = match &target {
            SurfaceTarget::Main => &mut self.main,
            SurfaceTarget::Feed {
                camera_id,
                generation,
            } => match self.registry.get_mut(camera_id) {
                Some(feed) if feed.generation() == *generation => feed,
                _ => {
                    debug!("Discarding decoded frame for removed feed {camera_id}");
                    return;
                }
            },
        };
        if !feed.accepts(seq) {
            debug!("Dropping superseded frame #{seq} for {}", feed.camera_id());
            return;
        }
        let image = match image {
            Ok(image) => image,
            Err(err) => {
                warn!("Skipping frame for {}: {err}", feed.camera_id());
                return;
            }
        };

        feed.surface_mut().sync_layout();
        feed.surface_mut().paint_background(image);
        let render = render_overlay(feed, &self.renderer, seq, &results, source, true);
        self.publish(ClientEvent::new(EventPayload::Rendered(render)))
            .await;
    }

    async fn handle_command(&mut self, command: UserCommand) {
        match command {
            UserCommand::SetMulticam(enabled) => self.set_multicam(enabled).await,
            UserCommand::ToggleMulticam => {
                let enabled = !self.multicam;
                self.set_multicam(enabled).await;
            }
            UserCommand::Snapshot => {
                self.snapshot();
            }
            UserCommand::ResizeMain(size) => {
                self.main.video().set_rendered_size(size);
                self.main.surface_mut().sync_layout();
            }
            UserCommand::ResizeGrid(size) => self.registry.resize_tiles(size),
            UserCommand::Shutdown => self.shutdown().await,
        }
    }

    async fn set_multicam(&mut self, enabled: bool) {
        if enabled == self.multicam {
            debug!("Multicam already {}", if enabled { "on" } else { "off" });
            return;
        }
        let message = if enabled {
            OutboundMessage::enable_multicam()
        } else {
            OutboundMessage::disable_multicam()
        };
        if let Err(err) = self.channel.emit(message).await {
            warn!("Unable to notify server of multicam change: {err}");
        }
        self.multicam = enabled;

        if enabled {
            info!("Multicam enabled");
        } else {
            let count = self.registry.clear();
            info!("Multicam disabled; removed {count} feed(s)");
            self.publish(ClientEvent::new(EventPayload::FeedsCleared { count }))
                .await;
        }
        self.publish(ClientEvent::new(EventPayload::Multicam { enabled }))
            .await;
    }

    /// Writes the composited main view and every grid tile to the snapshot
    /// directory. Returns the files written.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        let Some(writer) = &self.snapshots else {
            debug!("Snapshot requested without ops.snapshot_dir");
            return Vec::new();
        };
        let live = self.main.video().current_frame();
        let mut composites = vec![(self.main.camera_id(), self.main.surface().composite(live.as_ref()))];
        composites.extend(
            self.registry
                .feeds()
                .into_iter()
                .map(|feed| (feed.camera_id(), feed.surface().composite(None))),
        );

        composites
            .into_iter()
            .filter_map(|(camera_id, image)| match writer.write(camera_id, &image) {
                Ok(path) => {
                    debug!("Snapshot of {camera_id} written to {}", path.display());
                    Some(path)
                }
                Err(err) => {
                    warn!("Snapshot of {camera_id} failed: {err}");
                    None
                }
            })
            .collect()
    }

    async fn shutdown(&mut self) {
        if let Some(source) = self.main.video_mut().unbind() {
            source.stop();
        }
        self.encoder.reset();
        info!("Stream controller stopped");
        self.publish(ClientEvent::lifecycle(LifecyclePhase::Shutdown))
            .await;
    }

    async fn publish(&self, event: ClientEvent) {
        let _ = self.bus.send(event.clone());
        if let Err(err) = self.telemetry.record_event(event).await {
            warn!("Telemetry record failed: {err}");
        }
    }
}

fn render_overlay(
    feed: &mut CameraFeed,
    renderer: &OverlayRenderer,
    seq: u64,
    results: &[DetectionResult],
    source: SourceDims,
    with_background: bool,
) -> RenderEvent {
    renderer.render(feed.surface_mut().overlay_mut(), results, source);
    feed.mark_rendered(seq);
    let unknown = renderer.style().unknown_label.as_str();
    RenderEvent {
        camera_id: feed.camera_id().to_string(),
        labels: results
            .iter()
            .map(|result| result.label(unknown).to_string())
            .collect(),
        with_background,
    }
}

fn server_event(message: impl Into<String>) -> ClientEvent {
    ClientEvent::new(EventPayload::Server {
        message: message.into(),
    })
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream::BoxStream;
    use image::Rgba;
    use tokio::time::timeout;
    use vigia_capture::SyntheticDevice;
    use vigia_network::{network_error, LocalChannel};
    use vigia_types::{detection::RawRecognitionUpdate, geometry::BoundingBox};
    use vigia_vision::encoder::{encode_jpeg, to_data_url};

    type TestController = StreamController<LocalChannel, SyntheticDevice>;

    fn controller(channel: &LocalChannel, camera: Size) -> TestController {
        StreamController::new(
            &VigiaConfig::default(),
            channel.clone(),
            SyntheticDevice::new(camera),
            TelemetryStore::new(),
        )
        .expect("controller")
    }

    fn update(camera_id: &str, frame: Option<String>) -> ControllerEvent {
        ControllerEvent::MessageReceived(InboundMessage::RecognitionUpdate(RawRecognitionUpdate {
            camera_id: Some(camera_id.into()),
            results: Some(vec![DetectionResult::new(
                BoundingBox::new(40.0, 40.0, 60.0, 60.0),
                Some("Alice".into()),
            )]),
            frame_image: frame,
            frame_width: Some(320.0),
            frame_height: Some(240.0),
        }))
    }

    fn jpeg_frame(width: u32, height: u32) -> String {
        let image = RgbaImage::from_pixel(width, height, Rgba([20, 80, 160, 255]));
        to_data_url(&encode_jpeg(&image, 80).expect("encode jpeg"))
    }

    async fn next_sent(sent: &mut BoxStream<'static, OutboundMessage>) -> OutboundMessage {
        sent.next().await.expect("outbound message")
    }

    #[tokio::test]
    async fn sends_frames_once_camera_is_ready() {
        let channel = LocalChannel::new(16);
        let mut sent = channel.outbound();
        let mut controller = controller(&channel, Size::new(64, 48));

        controller.handle_event(ControllerEvent::TimerTick).await;
        controller.start().await;
        controller.process_next_internal().await;
        assert!(controller.main_feed().video().source().is_some());

        controller.handle_event(ControllerEvent::TimerTick).await;
        match next_sent(&mut sent).await {
            OutboundMessage::ClientFrame(frame) => {
                assert!(frame.data_url.starts_with("data:image/jpeg;base64,"))
            }
            other => panic!("unexpected outbound message: {other:?}"),
        }
        assert_eq!(controller.telemetry().session().await.frames_sent, 1);
    }

    #[tokio::test]
    async fn camera_failure_raises_alert_and_sends_nothing() {
        let channel = LocalChannel::new(16);
        let mut controller = controller(&channel, Size::zero());
        let mut events = controller.subscribe_events();

        controller.start().await;
        controller.process_next_internal().await;
        controller.handle_event(ControllerEvent::TimerTick).await;

        let phases: Vec<EventPayload> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.payload)
            .collect();
        assert!(matches!(phases[0], EventPayload::Lifecycle(LifecyclePhase::Boot)));
        assert!(matches!(&phases[1], EventPayload::Alert { message } if message.contains("webcam")));
        assert!(matches!(
            phases[2],
            EventPayload::Lifecycle(LifecyclePhase::CameraUnavailable)
        ));
        let session = controller.telemetry().session().await;
        assert_eq!(session.frames_sent, 0);
        assert_eq!(session.alerts.len(), 1);
    }

    #[tokio::test]
    async fn main_updates_render_on_main_surface_only() {
        let channel = LocalChannel::new(16);
        let mut controller = controller(&channel, Size::new(64, 48));

        controller.handle_event(update(MAIN_CAMERA_ID, None)).await;
        assert!(controller.registry().is_empty());
        assert!(!controller.main_feed().surface().overlay().is_blank());
        assert_eq!(controller.main_feed().last_rendered(), Some(0));
    }

    #[tokio::test]
    async fn update_without_camera_id_changes_nothing() {
        let channel = LocalChannel::new(16);
        let mut controller = controller(&channel, Size::new(64, 48));

        controller
            .handle_event(ControllerEvent::MessageReceived(
                InboundMessage::RecognitionUpdate(RawRecognitionUpdate {
                    results: Some(Vec::new()),
                    ..Default::default()
                }),
            ))
            .await;
        assert!(controller.registry().is_empty());
        assert!(controller.main_feed().surface().overlay().is_blank());
        assert!(controller
            .telemetry()
            .session()
            .await
            .renders_by_camera
            .is_empty());
    }

    #[tokio::test]
    async fn remote_frame_is_decoded_then_painted() {
        let channel = LocalChannel::new(16);
        let mut controller = controller(&channel, Size::new(64, 48));

        controller
            .handle_event(update("cam2", Some(jpeg_frame(320, 240))))
            .await;
        assert_eq!(controller.registry().len(), 1);
        controller.process_next_internal().await;

        let feed = controller.registry().get("cam2").expect("cam2 feed");
        assert_eq!(feed.surface().size(), Size::new(320, 240));
        assert!(feed.surface().background().is_some());
        assert!(!feed.surface().overlay().is_blank());
        let session = controller.telemetry().session().await;
        assert_eq!(session.renders_by_camera.get("cam2"), Some(&1));
    }

    #[tokio::test]
    async fn decode_finishing_after_clear_is_ignored() {
        let channel = LocalChannel::new(16);
        let mut controller = controller(&channel, Size::new(64, 48));

        controller
            .handle_event(ControllerEvent::Command(UserCommand::SetMulticam(true)))
            .await;
        controller
            .handle_event(update("cam2", Some(jpeg_frame(32, 24))))
            .await;
        controller
            .handle_event(ControllerEvent::Command(UserCommand::SetMulticam(false)))
            .await;
        assert!(controller.registry().is_empty());

        controller.process_next_internal().await;
        assert!(controller.registry().is_empty());
    }

    #[tokio::test]
    async fn superseded_decode_does_not_overwrite_newer_render() {
        let channel = LocalChannel::new(16);
        let mut controller = controller(&channel, Size::new(64, 48));

        controller
            .handle_event(update("cam2", Some(jpeg_frame(32, 24))))
            .await;
        controller.handle_event(update("cam2", None)).await;
        controller.process_next_internal().await;

        let feed = controller.registry().get("cam2").expect("cam2 feed");
        assert!(feed.surface().background().is_none());
        assert_eq!(feed.last_rendered(), Some(1));
    }

    #[tokio::test]
    async fn multicam_toggle_emits_and_clears_feeds() {
        let channel = LocalChannel::new(16);
        let mut sent = channel.outbound();
        let mut controller = controller(&channel, Size::new(64, 48));

        controller
            .handle_event(ControllerEvent::Command(UserCommand::ToggleMulticam))
            .await;
        assert!(controller.multicam_enabled());
        assert_eq!(next_sent(&mut sent).await, OutboundMessage::enable_multicam());

        controller.handle_event(update("cam1", None)).await;
        controller.handle_event(update("cam2", None)).await;
        assert_eq!(controller.registry().len(), 2);

        controller
            .handle_event(ControllerEvent::Command(UserCommand::SetMulticam(false)))
            .await;
        assert!(!controller.multicam_enabled());
        assert!(controller.registry().is_empty());
        assert_eq!(next_sent(&mut sent).await, OutboundMessage::disable_multicam());
    }

    #[tokio::test]
    async fn resize_main_resizes_and_clears_overlay() {
        let channel = LocalChannel::new(16);
        let mut controller = controller(&channel, Size::new(64, 48));
        controller.handle_event(update(MAIN_CAMERA_ID, None)).await;

        controller
            .handle_event(ControllerEvent::Command(UserCommand::ResizeMain(Size::new(
                800, 600,
            ))))
            .await;
        let surface = controller.main_feed().surface();
        assert_eq!(surface.size(), Size::new(800, 600));
        assert!(surface.overlay().is_blank());
    }

    /// Service that refuses every connection attempt.
    struct UnreachableChannel {
        emitted: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl RecognitionChannel for UnreachableChannel {
        async fn connect(&self) -> Result<()> {
            Err(network_error("connection refused"))
        }

        async fn emit(&self, _message: OutboundMessage) -> Result<()> {
            self.emitted.fetch_add(1, Ordering::SeqCst);
            Err(network_error("not connected"))
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn subscribe(&self) -> BoxStream<'static, InboundMessage> {
            futures::stream::pending().boxed()
        }
    }

    #[tokio::test]
    async fn unreachable_service_keeps_camera_and_skips_capture() {
        let mut config = VigiaConfig::default();
        config.capture.interval_ms = 5;
        let emitted = Arc::new(AtomicUsize::new(0));
        let mut controller = StreamController::new(
            &config,
            UnreachableChannel {
                emitted: Arc::clone(&emitted),
            },
            SyntheticDevice::new(Size::new(64, 48)),
            TelemetryStore::new(),
        )
        .expect("controller");
        let mut events = controller.subscribe_events();
        let (commands, rx) = mpsc::channel(4);
        let session = tokio::spawn(async move {
            controller.run(rx).await;
            controller
        });

        timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("event bus open");
                if matches!(
                    event.payload,
                    EventPayload::Lifecycle(LifecyclePhase::CameraReady)
                ) {
                    break;
                }
            }
        })
        .await
        .expect("camera bound without a connection");
        // Let several capture ticks pass while disconnected.
        tokio::time::sleep(Duration::from_millis(50)).await;

        commands
            .send(UserCommand::Shutdown)
            .await
            .expect("queue shutdown");
        let controller = session.await.expect("session task");
        assert_eq!(emitted.load(Ordering::SeqCst), 0);
        let stats = controller.telemetry().session().await;
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.alerts.len(), 1);
        assert!(stats.alerts[0].contains("unavailable"));
    }

    #[tokio::test]
    async fn shutdown_command_releases_camera() {
        let channel = LocalChannel::new(16);
        let mut controller = controller(&channel, Size::new(64, 48));
        let (commands, rx) = mpsc::channel(4);
        commands
            .send(UserCommand::Shutdown)
            .await
            .expect("queue shutdown");

        controller.run(rx).await;
        assert!(controller.main_feed().video().source().is_none());
        let events = controller.telemetry().snapshot_events().await;
        assert!(matches!(
            events.last().map(|event| &event.payload),
            Some(EventPayload::Lifecycle(LifecyclePhase::Shutdown))
        ));
    }
}
