use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{
        broadcast,
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};
use vigia_types::{
    config::NetworkConfig,
    protocol::{decode_inbound, encode_outbound, InboundMessage, OutboundMessage},
    Result,
};

use crate::{network_error, receiver_stream, RecognitionChannel};

const OUTBOUND_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 256;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

type SharedWriter = Arc<Mutex<Option<mpsc::Sender<String>>>>;

/// Connection settings plus the state shared with the background tasks.
#[derive(Clone)]
struct Link {
    addr: String,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    max_line: usize,
    writer: SharedWriter,
    inbound: broadcast::Sender<InboundMessage>,
}

impl Link {
    async fn open(&self) -> Result<OwnedReadHalf> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| network_error(format!("timed out connecting to {}", self.addr)))?
            .map_err(|err| network_error(format!("unable to connect to {}: {err}", self.addr)))?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY not applied: {err}");
        }
        let (read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        tokio::spawn(write_loop(write_half, rx));
        self.set_writer(Some(tx));
        Ok(read_half)
    }

    fn writer(&self) -> Option<mpsc::Sender<String>> {
        self.writer.lock().ok().and_then(|guard| guard.clone())
    }

    fn set_writer(&self, writer: Option<mpsc::Sender<String>>) {
        if let Ok(mut guard) = self.writer.lock() {
            *guard = writer;
        }
    }
}

/// Newline-delimited JSON envelopes over TCP. Once connected, the channel
/// keeps reconnecting in the background whenever the service goes away;
/// subscriber streams survive reconnects and end when the channel is dropped.
pub struct TcpChannel {
    link: Link,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl TcpChannel {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_QUEUE);
        Self {
            link: Link {
                addr: addr.into(),
                connect_timeout,
                reconnect_delay: DEFAULT_RECONNECT_DELAY,
                max_line: DEFAULT_MAX_LINE,
                writer: Arc::new(Mutex::new(None)),
                inbound,
            },
            supervisor: Mutex::new(None),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(
            config.server_addr.clone(),
            Duration::from_millis(config.connect_timeout_ms),
        )
        .with_reconnect_delay(Duration::from_millis(config.reconnect_delay_ms))
        .with_max_line(config.max_line_bytes)
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.link.reconnect_delay = delay.max(Duration::from_millis(1));
        self
    }

    /// Inbound lines longer than `bytes` drop the connection.
    pub fn with_max_line(mut self, bytes: usize) -> Self {
        self.link.max_line = bytes.max(1);
        self
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.supervisor.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
        self.link.set_writer(None);
    }
}

#[async_trait]
impl RecognitionChannel for TcpChannel {
    /// Starts the connection task and waits for its first attempt. A failed
    /// first attempt is reported, but the task keeps retrying.
    async fn connect(&self) -> Result<()> {
        let first_attempt = {
            let mut supervisor = self
                .supervisor
                .lock()
                .map_err(|_| network_error("connection state poisoned"))?;
            if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                *supervisor = Some(tokio::spawn(supervise(self.link.clone(), tx)));
                Some(rx)
            }
        };

        match first_attempt {
            Some(rx) => rx
                .await
                .map_err(|_| network_error("connection task stopped"))?,
            None if self.is_connected() => Ok(()),
            None => Err(network_error(format!(
                "still reconnecting to {}",
                self.link.addr
            ))),
        }
    }

    async fn emit(&self, message: OutboundMessage) -> Result<()> {
        let line = encode_outbound(&message)?;
        let writer = self
            .link
            .writer()
            .ok_or_else(|| network_error(format!("not connected to {}", self.link.addr)))?;
        writer.try_send(line).map_err(|err| match err {
            TrySendError::Full(_) => network_error(format!(
                "outbound queue to {} is full; {} dropped",
                self.link.addr,
                message.event_name()
            )),
            TrySendError::Closed(_) => {
                network_error(format!("connection to {} is closed", self.link.addr))
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.link.writer().is_some_and(|tx| !tx.is_closed())
    }

    fn subscribe(&self) -> BoxStream<'static, InboundMessage> {
        receiver_stream(self.link.inbound.subscribe())
    }
}

async fn supervise(link: Link, first_attempt: oneshot::Sender<Result<()>>) {
    let mut first_attempt = Some(first_attempt);
    loop {
        match link.open().await {
            Ok(reader) => {
                info!("Connected to recognition service at {}", link.addr);
                if let Some(tx) = first_attempt.take() {
                    let _ = tx.send(Ok(()));
                }
                read_loop(reader, &link.inbound, link.max_line).await;
                link.set_writer(None);
                warn!(
                    "Lost connection to {}; reconnecting every {:?}",
                    link.addr, link.reconnect_delay
                );
            }
            Err(err) => match first_attempt.take() {
                Some(tx) => {
                    let _ = tx.send(Err(err));
                }
                None => debug!("Reconnect attempt failed: {err}"),
            },
        }
        sleep(link.reconnect_delay).await;
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<String>) {
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if let Err(err) = writer.write_all(line.as_bytes()).await {
            warn!("Write to recognition service failed: {err}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    reader: OwnedReadHalf,
    inbound: &broadcast::Sender<InboundMessage>,
    max_line: usize,
) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        // One byte past the limit tells an overlong line from one that fits.
        let read = (&mut reader)
            .take(max_line as u64 + 1)
            .read_until(b'\n', &mut line)
            .await;
        match read {
            Ok(0) => {
                info!("Recognition service closed the connection");
                break;
            }
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                } else if line.len() > max_line {
                    warn!("Inbound line exceeds {max_line} bytes; dropping connection");
                    break;
                }
                dispatch(&line, inbound);
            }
            Err(err) => {
                warn!("Read from recognition service failed: {err}");
                break;
            }
        }
    }
}

fn dispatch(line: &[u8], inbound: &broadcast::Sender<InboundMessage>) {
    let Ok(text) = std::str::from_utf8(line) else {
        warn!("Dropping inbound line that is not UTF-8");
        return;
    };
    let text = text.trim_end_matches('\r');
    if text.trim().is_empty() {
        return;
    }
    match decode_inbound(text) {
        Ok(message) => {
            let _ = inbound.send(message);
        }
        Err(err) => warn!("Dropping inbound line: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::net::TcpListener;
    use vigia_types::protocol::{decode_outbound, encode_inbound};

    async fn wait_until(check: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !check() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition reached in time");
    }

    fn server_info_line(status: &str) -> String {
        let reply = encode_inbound(&InboundMessage::ServerInfo {
            status: status.into(),
        })
        .expect("encode reply");
        format!("{reply}\n")
    }

    #[tokio::test]
    async fn exchanges_lines_with_a_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr").to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let first = lines.next_line().await.expect("read").expect("line");

            write_half.write_all(b"not json\n").await.expect("write garbage");
            write_half
                .write_all(server_info_line("connected").as_bytes())
                .await
                .expect("write reply");
            first
        });

        let channel = TcpChannel::new(addr, Duration::from_secs(2))
            .with_reconnect_delay(Duration::from_secs(60));
        let mut inbound = channel.subscribe();
        channel.connect().await.expect("connect");
        assert!(channel.is_connected());
        channel
            .emit(OutboundMessage::client_frame("data:image/jpeg;base64,AA"))
            .await
            .expect("emit");

        let first = server.await.expect("server task");
        assert_eq!(
            decode_outbound(&first).expect("decode outbound"),
            OutboundMessage::client_frame("data:image/jpeg;base64,AA")
        );

        match inbound.next().await {
            Some(InboundMessage::ServerInfo { status }) => assert_eq!(status, "connected"),
            other => panic!("unexpected inbound message: {other:?}"),
        }
        // The server task dropped its socket.
        wait_until(|| !channel.is_connected()).await;
    }

    #[tokio::test]
    async fn emit_before_connect_fails() {
        let channel = TcpChannel::new("127.0.0.1:9", Duration::from_millis(100));
        let err = channel
            .emit(OutboundMessage::enable_multicam())
            .await
            .expect_err("not connected");
        assert!(err.to_string().contains("not connected"));
    }

    #[tokio::test]
    async fn stalled_peer_never_blocks_emit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        let (release, hold) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            // Accepts, then never reads.
            let (socket, _) = listener.accept().await.expect("accept");
            let _ = hold.await;
            drop(socket);
        });

        let channel = TcpChannel::new(addr, Duration::from_secs(2))
            .with_reconnect_delay(Duration::from_secs(60));
        channel.connect().await.expect("connect");

        let payload = "A".repeat(64 * 1024);
        let mut refused = 0;
        for _ in 0..(OUTBOUND_QUEUE * 2) {
            let frame = OutboundMessage::client_frame(format!("data:image/jpeg;base64,{payload}"));
            let sent = timeout(Duration::from_secs(1), channel.emit(frame))
                .await
                .expect("emit returns without waiting on the peer");
            if let Err(err) = sent {
                assert!(err.to_string().contains("queue"));
                refused += 1;
            }
        }
        assert!(refused > 0);
        assert!(channel.is_connected());

        let _ = release.send(());
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn overlong_line_drops_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        let (release, hold) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            socket.write_all(&[b'x'; 64]).await.expect("write");
            let _ = hold.await;
        });

        let channel = TcpChannel::new(addr, Duration::from_secs(2))
            .with_reconnect_delay(Duration::from_secs(60))
            .with_max_line(16);
        channel.connect().await.expect("connect");
        wait_until(|| !channel.is_connected()).await;

        let _ = release.send(());
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn reconnects_and_keeps_subscribers_after_service_restart() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        let server = tokio::spawn(async move {
            let (first, _) = listener.accept().await.expect("accept first");
            drop(first);

            let (second, _) = listener.accept().await.expect("accept second");
            let (read_half, mut write_half) = second.into_split();
            write_half
                .write_all(server_info_line("back").as_bytes())
                .await
                .expect("write reply");
            let mut lines = BufReader::new(read_half).lines();
            lines.next_line().await.expect("read").expect("line")
        });

        let channel = TcpChannel::new(addr, Duration::from_secs(2))
            .with_reconnect_delay(Duration::from_millis(20));
        let mut inbound = channel.subscribe();
        channel.connect().await.expect("connect");

        let message = timeout(Duration::from_secs(5), inbound.next())
            .await
            .expect("message after reconnect");
        assert!(matches!(
            message,
            Some(InboundMessage::ServerInfo { status }) if status == "back"
        ));
        channel
            .emit(OutboundMessage::enable_multicam())
            .await
            .expect("emit on new connection");

        let line = server.await.expect("server task");
        assert_eq!(
            decode_outbound(&line).expect("decode outbound"),
            OutboundMessage::enable_multicam()
        );
    }
}
