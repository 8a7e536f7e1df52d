//! Subscription registry: deferral, modes, and subscriber lookup.
//!
//! The registry buffers subscription requests until the bus lifecycle
//! signals start, then routes them through the configured mode. Lookups
//! always go through the lazily filled subscriber cache.

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub mod cache;

#[cfg(test)]
mod tests;

use crate::config::{ConfigError, SubscribeMode};
use crate::gateway::StoreError;
use crate::message::{EndpointAddress, Message, MessageType};
use crate::node::NodeIdentity;
use crate::store::SubscriptionStore;
use cache::SubscriberCache;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registration and lookup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Schema bootstrap failed for a reason other than the benign
    /// duplicate-object race.
    #[error("subscription store bootstrap failed: {0}")]
    Bootstrap(#[source] StoreError),

    #[error("cannot register subscriptions: node has no receiving inbox")]
    InputQueueRequired,

    /// Validate mode found message types with no persisted row.
    #[error("no subscription rows found for: {}", missing.join(", "))]
    MissingSubscriptions { missing: Vec<String> },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Registry lifecycle. The transition is one-way.
///
/// The deferred buffer lives inside the `Deferring` state, so buffer
/// appends and the start transition share one lock.
enum Lifecycle {
    /// Bus not started: subscription requests are buffered, unvalidated.
    Deferring(Vec<MessageType>),
    /// Bus started: subscription requests hit the store directly.
    Active,
}

/// Records which inboxes want which message types and answers
/// "who should receive message type X?".
pub struct SubscriptionRegistry {
    store: SubscriptionStore,
    node: NodeIdentity,
    mode: SubscribeMode,
    lifecycle: Mutex<Lifecycle>,
    cache: SubscriberCache,
}

impl SubscriptionRegistry {
    /// Build a registry over a bootstrapped store.
    ///
    /// Bootstraps the backing schema as part of construction; a
    /// non-benign bootstrap failure aborts with [`RegistryError::Bootstrap`].
    /// The registry starts in the deferring state.
    pub async fn new(
        store: SubscriptionStore,
        node: NodeIdentity,
        mode: SubscribeMode,
    ) -> Result<Self> {
        store.bootstrap().await.map_err(RegistryError::Bootstrap)?;
        Ok(Self {
            store,
            node,
            mode,
            lifecycle: Mutex::new(Lifecycle::Deferring(Vec::new())),
            cache: SubscriberCache::new(),
        })
    }

    /// Handle the bus "started" signal.
    ///
    /// Flips the lifecycle to active and flushes the deferred buffer
    /// through the normal mode-dependent path, once, in original order.
    /// A flush failure propagates with the buffer already drained; there
    /// is no retry. A second start signal is ignored.
    pub async fn start(&self) -> Result<()> {
        let deferred = {
            let mut lifecycle = self.lifecycle.lock().await;
            match std::mem::replace(&mut *lifecycle, Lifecycle::Active) {
                Lifecycle::Deferring(buffer) => buffer,
                Lifecycle::Active => {
                    warn!("bus start signalled twice; ignoring");
                    return Ok(());
                }
            }
        };

        info!("subscription registry active");
        if deferred.is_empty() {
            return Ok(());
        }
        debug!(count = deferred.len(), "flushing deferred subscriptions");
        self.register(&deferred).await
    }

    /// Request subscriptions for a set of message types.
    ///
    /// Before the bus has started this buffers the types and returns
    /// immediately: no persistence, no validation, no error even on a
    /// node without an inbox. Afterwards it runs the mode-dependent
    /// registration path. Types are processed in the order given.
    pub async fn subscribe(&self, message_types: &[MessageType]) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if let Lifecycle::Deferring(buffer) = &mut *lifecycle {
                buffer.extend(message_types.iter().cloned());
                debug!(count = message_types.len(), "deferred subscription request");
                return Ok(());
            }
        }
        self.register(message_types).await
    }

    /// Subscribe to a single message type by explicit name.
    pub async fn subscribe_name(&self, name: &str) -> Result<()> {
        self.subscribe(&[MessageType::new(name)]).await
    }

    /// Subscribe to the message type of `message`.
    pub async fn subscribe_message<M: Message>(&self, _message: &M) -> Result<()> {
        self.subscribe_type::<M>().await
    }

    /// Subscribe to the message type of `M`.
    pub async fn subscribe_type<M: Message>(&self) -> Result<()> {
        self.subscribe(&[MessageType::of::<M>()]).await
    }

    /// All endpoint addresses subscribed to the type of `message`.
    ///
    /// The first lookup per message type loads from the store; the
    /// result is then fixed for the process lifetime. An unknown type
    /// yields an empty sequence, not an error.
    pub async fn subscribed_uris<M: Message>(&self, _message: &M) -> Result<Vec<EndpointAddress>> {
        self.subscribed_uris_for(&MessageType::of::<M>()).await
    }

    /// Name-addressed form of [`subscribed_uris`](Self::subscribed_uris).
    pub async fn subscribed_uris_for(
        &self,
        message_type: &MessageType,
    ) -> Result<Vec<EndpointAddress>> {
        let uris = self
            .cache
            .get_or_load(message_type, || self.store.subscribers(message_type))
            .await?;
        Ok(uris)
    }

    /// The mode-dependent registration path.
    async fn register(&self, message_types: &[MessageType]) -> Result<()> {
        if self.node.is_worker_only() || self.mode == SubscribeMode::Ignore {
            debug!("subscription registration skipped");
            return Ok(());
        }

        let inbox = self
            .node
            .inbox()
            .ok_or(RegistryError::InputQueueRequired)?;

        match self.mode {
            SubscribeMode::Register => {
                for message_type in message_types {
                    self.store.upsert(message_type, inbox).await?;
                    debug!(
                        message_type = %message_type,
                        endpoint = %inbox,
                        "subscription registered"
                    );
                }
                Ok(())
            }
            SubscribeMode::Validate => {
                let mut missing = Vec::new();
                for message_type in message_types {
                    if !self.store.exists(message_type, inbox).await? {
                        missing.push(message_type.to_string());
                    }
                }
                if missing.is_empty() {
                    return Ok(());
                }
                for message_type in &missing {
                    error!(
                        message_type = %message_type,
                        endpoint = %inbox,
                        "no subscription row provisioned for message type"
                    );
                }
                Err(RegistryError::MissingSubscriptions { missing })
            }
            SubscribeMode::Ignore => Ok(()),
        }
    }
}

/// Initialize a registry from configuration.
///
/// Validates the configuration, opens the store named by the provider
/// identifier, and constructs (bootstrapping) the registry.
#[cfg(feature = "sqlite")]
pub async fn init_registry(
    config: &crate::config::RegistryConfig,
    node: NodeIdentity,
) -> Result<SubscriptionRegistry> {
    use std::sync::Arc;

    use crate::gateway::sqlite::SqliteQueryGateway;

    config.validate()?;
    info!(
        "Subscription store: {} at {}",
        config.provider, config.connection
    );

    match config.provider.as_str() {
        "sqlite" => {
            let gateway = SqliteQueryGateway::connect(&config.connection).await?;
            let store = SubscriptionStore::new(Arc::new(gateway));
            SubscriptionRegistry::new(store, node, config.mode).await
        }
        other => Err(ConfigError::UnknownProvider(other.to_string()).into()),
    }
}
