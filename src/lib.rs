//! Rollcall - durable subscription registry for pub/sub messaging.
//!
//! Records which endpoint inboxes want which message types, persists the
//! mapping through an abstract query gateway, and answers "who should
//! receive message type X?" from a lazily filled in-memory cache.
//! Subscription requests made before the bus starts are buffered and
//! flushed through the configured mode (register, validate, or ignore)
//! when the start signal fires.

pub mod config;
pub mod gateway;
pub mod message;
pub mod node;
pub mod registry;
pub mod store;
pub mod utils;

pub use config::{ConfigError, RegistryConfig, SubscribeMode};
pub use gateway::{QueryGateway, StoreError, StoreQuery, TabularRow};
pub use message::{EndpointAddress, Message, MessageType};
pub use node::NodeIdentity;
pub use registry::{RegistryError, SubscriptionRegistry};
pub use store::SubscriptionStore;

#[cfg(feature = "sqlite")]
pub use registry::init_registry;
