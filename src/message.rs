//! Message and endpoint identity types.
//!
//! Subscriptions are keyed by the pair of these two identifiers: the
//! message type names *what* is published, the endpoint address names
//! *where* a copy should be delivered.

use std::fmt;

/// A kind of message that can be published and subscribed to.
///
/// The trait supplies the wire name used as the subscription key.
/// The default derives it from the Rust type path, which is already
/// fully qualified; override `type_name` when the logical name must
/// stay stable across refactors.
pub trait Message {
    /// Fully qualified name identifying this message kind.
    fn type_name() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

/// Opaque, fully-qualified identifier for a message kind.
///
/// Immutable once created. Derived from a message type via [`MessageType::of`]
/// or supplied as an explicit name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageType(String);

impl MessageType {
    /// Create a message type from an explicit name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the message type of `M`.
    pub fn of<M: Message>() -> Self {
        Self(M::type_name().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// URI of a node's receiving inbox / work queue.
///
/// Supplied by node configuration; immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointAddress(String);

impl EndpointAddress {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointAddress {
    fn from(uri: &str) -> Self {
        Self(uri.to_string())
    }
}

impl From<String> for EndpointAddress {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}
