use std::sync::Mutex;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

use super::lock;

struct ActiveSubscription {
    key: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveSubscription {
    fn stop(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Holds at most one live stream consumer.
///
/// Replacing the subscription cancels exactly the previous consumer of this slot and
/// nothing else.
#[derive(Default)]
pub struct SubscriptionSlot {
    current: Mutex<Option<ActiveSubscription>>,
}

impl SubscriptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume `stream` on a background task, calling `on_item` for each item, after
    /// cancelling the previous consumer. `key` identifies what is being watched.
    pub fn replace<S, T, F>(&self, key: impl Into<String>, stream: S, mut on_item: F)
    where
        S: Stream<Item = T> + Send + Unpin + 'static,
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let key = key.into();
        let token = CancellationToken::new();
        let child = token.clone();
        let mut stream = stream;

        let handle = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = child.cancelled() => break,
                        item = stream.next() => match item {
                            Some(item) => on_item(item),
                            None => break,
                        },
                    }
                }
            }
            .instrument(Span::current()),
        );

        let previous = lock(&self.current).replace(ActiveSubscription { key, token, handle });
        if let Some(previous) = previous {
            debug!(key = %previous.key, "Replacing subscription");
            previous.stop();
        }
    }

    pub fn cancel(&self) {
        if let Some(previous) = lock(&self.current).take() {
            previous.stop();
        }
    }

    pub fn current_key(&self) -> Option<String> {
        lock(&self.current)
            .as_ref()
            .filter(|active| !active.handle.is_finished())
            .map(|active| active.key.clone())
    }
}

impl Drop for SubscriptionSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
