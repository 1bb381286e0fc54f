//! SSE Broker (C6) — bridges a long-running orchestrator coroutine to
//! late-joining HTTP subscribers.
//!
//! Grounded in the per-connection `mpsc::channel` pattern of
//! `mira-chat/src/server.rs`'s SSE handler, generalized with a bounded
//! `VecDeque` replay ring (for late-join catch-up, P7) feeding a
//! `tokio::sync::broadcast::Sender` (for live fan-out). Idle eviction
//! follows the hourly-sweep shape of `mira-chat/src/main.rs`'s maintenance
//! task, scaled down to the broker's configured idle TTL.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::orchestrator::DebateEvent;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("debate {0} already registered")]
    Duplicate(String),
    #[error("debate {0} not found")]
    NotFound(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ChannelState {
    Active,
    Completed,
}

#[derive(Debug)]
struct Channel {
    replay: VecDeque<DebateEvent>,
    sender: broadcast::Sender<DebateEvent>,
    state: ChannelState,
    last_touched: Instant,
}

/// A clonable handle the orchestrator's driver uses to publish events for one
/// debate id.
#[derive(Clone, Debug)]
pub struct Publisher {
    id: String,
    broker: Arc<Broker>,
}

impl Publisher {
    pub async fn publish(&self, event: DebateEvent) {
        self.broker.publish(&self.id, event).await;
    }

    pub async fn complete(&self) {
        self.broker.complete(&self.id).await;
    }

    pub async fn fail(&self) {
        self.broker.fail(&self.id).await;
    }
}

#[derive(Debug)]
pub struct Broker {
    channels: Mutex<HashMap<String, Channel>>,
    replay_capacity: usize,
    idle_ttl: Duration,
}

impl Broker {
    pub fn new(replay_capacity: usize, idle_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
            replay_capacity,
            idle_ttl,
        })
    }

    /// Register a new debate id before the orchestrator starts. Returns a
    /// `Publisher` the orchestrator's driver uses to push events.
    pub async fn register(self: &Arc<Self>, id: String) -> Result<Publisher, BrokerError> {
        let mut channels = self.channels.lock().await;
        if channels.contains_key(&id) {
            return Err(BrokerError::Duplicate(id));
        }
        let (sender, _) = broadcast::channel(self.replay_capacity.max(16));
        channels.insert(
            id.clone(),
            Channel {
                replay: VecDeque::with_capacity(self.replay_capacity.min(256)),
                sender,
                state: ChannelState::Active,
                last_touched: Instant::now(),
            },
        );
        Ok(Publisher { id, broker: self.clone() })
    }

    async fn publish(&self, id: &str, event: DebateEvent) {
        let mut channels = self.channels.lock().await;
        let Some(channel) = channels.get_mut(id) else {
            warn!(debate_id = id, "publish for unregistered or evicted debate, dropping");
            return;
        };
        channel.last_touched = Instant::now();
        if channel.replay.len() == self.replay_capacity {
            // Back-pressure: drop the oldest non-terminal buffered event
            // before dropping a terminal one (spec.md §5).
            if let Some(pos) = channel.replay.iter().position(|e| !e.is_terminal()) {
                channel.replay.remove(pos);
            } else {
                channel.replay.pop_front();
            }
        }
        channel.replay.push_back(event.clone());
        // No active subscriber is not an error; broadcast::send fails only
        // when there are zero receivers, which is the common case here.
        let _ = channel.sender.send(event);
    }

    async fn complete(&self, id: &str) {
        self.finish(id, ChannelState::Completed).await;
    }

    async fn fail(&self, id: &str) {
        self.finish(id, ChannelState::Completed).await;
    }

    async fn finish(&self, id: &str, state: ChannelState) {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get_mut(id) {
            channel.state = state;
            channel.last_touched = Instant::now();
        }
    }

    /// Subscribe to a debate's event sequence. Replays everything buffered
    /// so far before handing back a live receiver for subsequent events.
    pub async fn subscribe(
        &self,
        id: &str,
    ) -> Result<(Vec<DebateEvent>, Option<broadcast::Receiver<DebateEvent>>), BrokerError> {
        let mut channels = self.channels.lock().await;
        let channel = channels.get_mut(id).ok_or_else(|| BrokerError::NotFound(id.to_string()))?;
        channel.last_touched = Instant::now();
        let replay: Vec<DebateEvent> = channel.replay.iter().cloned().collect();
        let receiver = match channel.state {
            ChannelState::Active => Some(channel.sender.subscribe()),
            ChannelState::Completed => None,
        };
        Ok((replay, receiver))
    }

    /// Evict completed channels idle past `idle_ttl`. Intended to run on a
    /// periodic background sweep.
    pub async fn sweep_idle(&self) {
        let mut channels = self.channels.lock().await;
        let idle_ttl = self.idle_ttl;
        let before = channels.len();
        channels.retain(|_, channel| {
            !(channel.state == ChannelState::Completed && channel.last_touched.elapsed() > idle_ttl)
        });
        let evicted = before - channels.len();
        if evicted > 0 {
            debug!(evicted, "broker evicted idle completed debate channels");
        }
    }

    pub async fn spawn_idle_sweeper(self: &Arc<Self>) {
        let broker = self.clone();
        let interval_period = self.idle_ttl.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_period);
            interval.tick().await;
            loop {
                interval.tick().await;
                broker.sweep_idle().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(round: u32) -> DebateEvent {
        DebateEvent::RoundStarted { round }
    }

    #[tokio::test]
    async fn registering_the_same_id_twice_fails() {
        let broker = Broker::new(8, Duration::from_secs(60));
        broker.register("d1".to_string()).await.unwrap();
        let err = broker.register("d1".to_string()).await.unwrap_err();
        assert!(matches!(err, BrokerError::Duplicate(id) if id == "d1"));
    }

    #[tokio::test]
    async fn subscribe_replays_buffered_events_before_live_ones() {
        let broker = Broker::new(8, Duration::from_secs(60));
        let publisher = broker.register("d1".to_string()).await.unwrap();
        publisher.publish(event(1)).await;
        publisher.publish(event(2)).await;

        let (replay, live) = broker.subscribe("d1").await.unwrap();
        assert_eq!(replay.len(), 2);
        assert!(matches!(replay[0], DebateEvent::RoundStarted { round: 1 }));
        assert!(live.is_some());

        let mut live = live.unwrap();
        publisher.publish(event(3)).await;
        let next = live.recv().await.unwrap();
        assert!(matches!(next, DebateEvent::RoundStarted { round: 3 }));
    }

    #[tokio::test]
    async fn completed_channel_has_no_live_receiver_but_still_replays() {
        let broker = Broker::new(8, Duration::from_secs(60));
        let publisher = broker.register("d1".to_string()).await.unwrap();
        publisher.publish(event(1)).await;
        publisher.complete().await;

        let (replay, live) = broker.subscribe("d1").await.unwrap();
        assert_eq!(replay.len(), 1);
        assert!(live.is_none());
    }

    #[tokio::test]
    async fn subscribing_to_an_unknown_id_is_not_found() {
        let broker = Broker::new(8, Duration::from_secs(60));
        let err = broker.subscribe("missing").await.unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn sweep_evicts_only_completed_channels_past_the_idle_ttl() {
        let broker = Broker::new(8, Duration::from_millis(0));
        let publisher = broker.register("d1".to_string()).await.unwrap();
        publisher.complete().await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        broker.sweep_idle().await;
        assert!(broker.subscribe("d1").await.is_err());
    }
}
