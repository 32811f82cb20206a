//! # wayfarer-core
//!
//! Session-resumable client core for the Wayfarer hub.
//!
//! This crate provides the stateful pieces of the client:
//!
//! - **SessionStore** - Load, reconcile, update, and persist the session
//! - **EventLog** - Append-only, locally numbered record of room events
//! - **CommandRouter** - Turn user input into outgoing frames
//! - **ConnectionManager** - Own the connection lifecycle and wire it all together
//!
//! ## Architecture
//!
//! ```text
//!                      ┌───────────────┐     ┌─────────────┐
//! user input ─────────▶│ CommandRouter │────▶│  transport  │
//!                      └───────────────┘     └─────────────┘
//!                              │ echo               │
//!                              ▼                    ▼
//!                      ┌───────────────┐   ┌───────────────────┐
//!                      │   EventLog    │◀──│ ConnectionManager │
//!                      └───────────────┘   └───────────────────┘
//!                                                   │ ack / bookmark
//!                                                   ▼
//!                                          ┌───────────────┐
//!                                          │ SessionStore  │
//!                                          └───────────────┘
//! ```

pub mod command;
pub mod connection;
pub mod error;
pub mod event_log;
pub mod identity;
pub mod metrics;
pub mod session;
pub mod storage;

pub use command::{CommandRouter, OutgoingEnvelope, Routed};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::ClientError;
pub use event_log::{Event, EventKind, EventLog};
pub use identity::{hub_url, Identity};
pub use session::{Bookmark, Session, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, SESSION_KEY};
