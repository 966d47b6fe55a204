//! In-process publish/subscribe channels.
//!
//! Channels are exact names (no pattern subscriptions). Publishing reports
//! how many subscribers were listening on that channel, which is what a
//! set-command publisher gets back as its acknowledgement.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// A message delivered on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: String,
}

/// Receiving side of one channel.
pub struct Subscription {
    channel: String,
    inner: BroadcastStream<PublishedMessage>,
}

impl Subscription {
    fn new(channel: impl Into<String>, receiver: broadcast::Receiver<PublishedMessage>) -> Self {
        Self {
            channel: channel.into(),
            inner: BroadcastStream::new(receiver),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message. `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<PublishedMessage> {
        self.next().await
    }
}

impl Stream for Subscription {
    type Item = PublishedMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => return Poll::Ready(Some(message)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged");
                    continue;
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// A set of named broadcast channels.
#[derive(Clone)]
pub struct PubSub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<PublishedMessage>>>>,
    capacity: usize,
}

impl PubSub {
    /// Create channels buffering up to `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Deliver `payload` to every current subscriber of `channel`.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, channel: &str, payload: &str) -> u64 {
        let mut channels = self.channels.lock();
        let Some(sender) = channels.get(channel) else {
            return 0;
        };
        let message = PublishedMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        match sender.send(message) {
            Ok(reached) => reached as u64,
            // Nobody is listening any more.
            Err(_) => {
                channels.remove(channel);
                0
            }
        }
    }

    /// Subscribe to `channel`. Only messages published afterwards are seen.
    ///
    /// Channels whose subscribers have all gone away are dropped here.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let mut channels = self.channels.lock();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Subscription::new(channel, sender.subscribe())
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of channels currently held open.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new(1024)
    }
}
