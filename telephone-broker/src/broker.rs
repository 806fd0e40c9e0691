//! Message broker
//!
//! Sits between the peer network and the local node: every inbound message
//! is claimed in the dedup cache, refined, counted as one more hop, shown on
//! the display and flooded on. Messages composed locally are flooded as-is.

use crate::dedup_cache::{DedupCache, DedupConfig};
use crate::display::MessageDisplay;
use crate::error::ConfigError;
use crate::refiner::Refiner;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use telephone_network::{NetworkError, NetworkInterface};
use telephone_types::{Message, MessageId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Broker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub dedup: DedupConfig,
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dedup.validate()
    }
}

/// Result of handling one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// First sighting; the body was refined and the hop count is now `hops`
    Refined { hops: u32 },
    /// Already seen inside the dedup window; nothing was changed
    Duplicate(MessageId),
}

impl ProcessOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ProcessOutcome::Duplicate(_))
    }
}

/// Broker counters
#[derive(Debug, Default)]
struct BrokerCounters {
    processed: AtomicU64,
    duplicates: AtomicU64,
    originated: AtomicU64,
}

/// Point-in-time copy of the broker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub processed: u64,
    pub duplicates: u64,
    pub originated: u64,
}

/// Dedups, refines and floods messages for one node
pub struct MessageBroker {
    network: Arc<dyn NetworkInterface>,
    cache: Arc<DedupCache<MessageId>>,
    refiner: Arc<dyn Refiner>,
    display: Arc<dyn MessageDisplay>,
    config: BrokerConfig,
    counters: BrokerCounters,
}

impl MessageBroker {
    pub fn new(
        network: Arc<dyn NetworkInterface>,
        refiner: Arc<dyn Refiner>,
        display: Arc<dyn MessageDisplay>,
        config: BrokerConfig,
    ) -> Result<Self, ConfigError> {
        let cache = Arc::new(DedupCache::from_config(&config.dedup)?);
        Ok(Self {
            network,
            cache,
            refiner,
            display,
            config,
            counters: BrokerCounters::default(),
        })
    }

    /// Handle one message in place.
    ///
    /// The id is claimed before anything else, so concurrent deliveries of
    /// the same message produce exactly one refinement.
    pub fn process(&self, message: &mut Message) -> ProcessOutcome {
        let id = message.id();
        if !self.cache.try_claim(id) {
            self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            return ProcessOutcome::Duplicate(id);
        }

        let refined = self.refiner.refine(message.body());
        let original = message.set_body(refined);
        let hops = message.increment_hops();

        self.display
            .on_message_refined(&original, message.body(), hops);
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        debug!(message_id = %id, hops, "Message refined");
        ProcessOutcome::Refined { hops }
    }

    /// Receive, process and relay messages until `cancel` fires.
    ///
    /// Also runs the dedup sweeper for as long as the loop is alive.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), NetworkError> {
        let sweeper_cancel = cancel.child_token();
        let sweeper = self
            .cache
            .spawn_sweeper(self.config.dedup.sweep_interval(), sweeper_cancel.clone());

        info!("Message broker started");
        let result = self.receive_loop(&cancel).await;

        sweeper_cancel.cancel();
        if let Err(e) = sweeper.await {
            warn!(error = %e, "Dedup sweeper task failed");
        }

        let stats = self.stats();
        info!(
            processed = stats.processed,
            duplicates = stats.duplicates,
            originated = stats.originated,
            "Message broker stopped"
        );
        result
    }

    async fn receive_loop(&self, cancel: &CancellationToken) -> Result<(), NetworkError> {
        loop {
            let inbound = match self.network.next_inbound(cancel).await {
                Ok(inbound) => inbound,
                Err(NetworkError::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            };

            let session_id = inbound.session_id;
            let mut message = inbound.message;

            match self.process(&mut message) {
                ProcessOutcome::Refined { hops } => {
                    let sent = self.network.forward(message, session_id);
                    debug!(session_id, hops, sent, "Relayed message");
                }
                ProcessOutcome::Duplicate(id) => {
                    debug!(session_id, message_id = %id, "Dropped duplicate message");
                }
            }
        }
    }

    /// Flood a new message composed at this node.
    ///
    /// The id is recorded first so the copy that loops back is dropped.
    pub fn send_text(&self, text: impl Into<String>) -> MessageId {
        let message = Message::new(text);
        let id = message.id();

        self.cache.insert(id);
        let sent = self.network.post_outbound(message);
        self.counters.originated.fetch_add(1, Ordering::Relaxed);

        info!(message_id = %id, sent, "Message sent");
        id
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            originated: self.counters.originated.load(Ordering::Relaxed),
        }
    }

    pub fn dedup_cache(&self) -> &DedupCache<MessageId> {
        &self.cache
    }

    pub fn network(&self) -> &Arc<dyn NetworkInterface> {
        &self.network
    }
}
