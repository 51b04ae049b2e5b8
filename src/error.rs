//! Crate-level error types for DTO mapping, persistence, and store access.

use std::fmt;

/// A record failed validation on its way into the domain model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// The payload was JSON `null`.
    #[error("failed to map DTO to domain model: DTO is null")]
    Null,

    /// A list endpoint or storage key did not hold an array.
    #[error("failed to map DTO array to domain models: expected array but got {found}")]
    NotAnArray {
        /// JSON type actually found.
        found: &'static str,
    },

    /// A field is missing or has the wrong type.
    #[error("invalid {entity} DTO: {field} must be {requirement}")]
    InvalidField {
        /// Entity being mapped (`"checklist"` or `"checklist item"`).
        entity: &'static str,
        /// Wire name of the offending field.
        field: &'static str,
        /// What the field should have been.
        requirement: &'static str,
    },

    /// An element of an array failed to map.
    #[error("failed to map DTO array to domain models: item at index {index}: {source}")]
    Element {
        /// Zero-based position of the failing element.
        index: usize,
        /// Why the element failed.
        #[source]
        source: Box<MappingError>,
    },
}

/// Error returned by a persistence gateway (local storage or HTTP).
///
/// Stores never propagate these to callers. They are rendered to a message
/// and written into the store's `error` field.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Reading or writing local storage failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value is not valid JSON.
    #[error("malformed data under key '{key}': {source}")]
    Decode {
        /// Storage key that held the bad value.
        key: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// A collection could not be serialized for storage.
    #[error("failed to encode data for key '{key}': {source}")]
    Encode {
        /// Storage key being written.
        key: String,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// The configured API base URL cannot be used to build request paths.
    #[error("invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request never produced a response (connect, timeout, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server responded with {status} for {method} {path}")]
    Status {
        /// HTTP method of the request.
        method: reqwest::Method,
        /// Request path relative to the base URL.
        path: String,
        /// Status code returned.
        status: u16,
    },

    /// The payload was delivered but failed validation.
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Error returned by store handles.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The actor backing this store has exited, so the message was not
    /// accepted.
    #[error("store actor is no longer running")]
    ActorGone,

    /// A [`wait_for`](crate::ChecklistStore::wait_for) deadline elapsed
    /// before the predicate held.
    #[error("timed out waiting for store state")]
    Timeout,
}

/// Render `err` as the human-readable message stored in a snapshot's
/// `error` field, prefixed with what was being attempted.
///
/// Falls back to `context` alone when the error renders empty.
pub(crate) fn error_message(context: &str, err: &impl fmt::Display) -> String {
    let detail = err.to_string();
    if detail.is_empty() {
        context.to_owned()
    } else {
        format!("{context}: {detail}")
    }
}
