//! Message channel to the recognition service.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use vigia_types::{
    protocol::{InboundMessage, OutboundMessage},
    Result, VigiaError,
};

mod tcp;

pub use tcp::TcpChannel;

/// Bidirectional, message-typed connection to the recognition service.
#[async_trait]
pub trait RecognitionChannel: Send + Sync {
    async fn connect(&self) -> Result<()>;
    /// Queues a message for the service. Never waits on the peer: when the
    /// connection is down or backed up the message is refused with an error.
    async fn emit(&self, message: OutboundMessage) -> Result<()>;
    fn is_connected(&self) -> bool;
    /// Stream of messages pushed by the service. Ends when the connection closes.
    fn subscribe(&self) -> BoxStream<'static, InboundMessage>;
}

#[async_trait]
impl<T: RecognitionChannel + ?Sized> RecognitionChannel for Box<T> {
    async fn connect(&self) -> Result<()> {
        (**self).connect().await
    }

    async fn emit(&self, message: OutboundMessage) -> Result<()> {
        (**self).emit(message).await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn subscribe(&self) -> BoxStream<'static, InboundMessage> {
        (**self).subscribe()
    }
}

/// In-process channel backed by broadcast queues. The "service" side is
/// driven through [`LocalChannel::deliver`] and [`LocalChannel::outbound`].
#[derive(Clone)]
pub struct LocalChannel {
    outbound: broadcast::Sender<OutboundMessage>,
    inbound: broadcast::Sender<InboundMessage>,
}

impl LocalChannel {
    pub fn new(capacity: usize) -> Self {
        let (outbound, _) = broadcast::channel(capacity);
        let (inbound, _) = broadcast::channel(capacity);
        Self { outbound, inbound }
    }

    /// Pushes a message to every subscriber, as if the service had sent it.
    pub fn deliver(&self, message: InboundMessage) -> usize {
        self.inbound.send(message).unwrap_or(0)
    }

    /// Everything the client emits from now on.
    pub fn outbound(&self) -> BoxStream<'static, OutboundMessage> {
        BroadcastStream::new(self.outbound.subscribe())
            .filter_map(|message| async move { message.ok() })
            .boxed()
    }
}

#[async_trait]
impl RecognitionChannel for LocalChannel {
    async fn connect(&self) -> Result<()> {
        info!("Using in-process recognition channel");
        Ok(())
    }

    async fn emit(&self, message: OutboundMessage) -> Result<()> {
        let _ = self.outbound.send(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn subscribe(&self) -> BoxStream<'static, InboundMessage> {
        receiver_stream(self.inbound.subscribe())
    }
}

/// Adapts a broadcast receiver into a stream, logging lag instead of ending.
pub fn receiver_stream<T>(mut rx: broadcast::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + 'static,
{
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(message) => yield message,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged; {} messages dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    .boxed()
}

pub fn network_error(message: impl Into<String>) -> VigiaError {
    VigiaError::Network(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigia_types::detection::RawRecognitionUpdate;

    #[tokio::test]
    async fn local_channel_carries_both_directions() {
        let channel = LocalChannel::new(16);
        channel.connect().await.expect("connect");
        let mut sent = channel.outbound();
        let mut received = channel.subscribe();

        channel
            .emit(OutboundMessage::enable_multicam())
            .await
            .expect("emit");
        assert_eq!(sent.next().await, Some(OutboundMessage::enable_multicam()));

        let delivered = channel.deliver(InboundMessage::RecognitionUpdate(RawRecognitionUpdate {
            camera_id: Some("cam1".into()),
            ..Default::default()
        }));
        assert_eq!(delivered, 1);
        let message = received.next().await.expect("inbound message");
        assert_eq!(message.event_name(), "recognition_update");
    }

    #[tokio::test]
    async fn receiver_stream_ends_when_sender_dropped() {
        let (tx, rx) = broadcast::channel::<u32>(4);
        let mut stream = receiver_stream(rx);
        tx.send(7).expect("send");
        drop(tx);
        assert_eq!(stream.next().await, Some(7));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn receiver_stream_survives_lag() {
        let (tx, rx) = broadcast::channel::<u32>(2);
        let stream = receiver_stream(rx);
        for i in 0..5 {
            tx.send(i).expect("send");
        }
        drop(tx);
        let collected: Vec<u32> = stream.collect().await;
        assert_eq!(collected, vec![3, 4]);
    }
}
