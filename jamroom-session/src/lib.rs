//! # jamroom-session: live collaborative recording rooms
//!
//! Performers stream raw audio into a shared room; the room mixes every
//! performer's stream in fixed-size blocks, fans the mix out to listeners
//! and archives it for export when the session ends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌───────────────┐
//! │ Performer   │ ─────────────────► │ SessionServer │
//! │ Listener    │ ◄───────────────── │               │
//! └─────────────┘   bincode events   └───────┬───────┘
//!                                            │
//!                                            ▼
//!                              ┌──────────────────────────┐
//!                              │ RoomSessionCoordinator   │
//!                              │ rooms, attendance, Outbox│
//!                              └────────────┬─────────────┘
//!                                           │ one worker per room
//!                                           ▼
//!                              ┌──────────────────────────┐
//!                              │ Room                     │
//!                              │  roster                  │
//!                              │  MixingEngine            │
//!                              │   ├─ PerformerChannel × N│
//!                              │   ├─ ProcessingGraph     │
//!                              │   └─ SessionArchive      │
//!                              └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`channel`]: per-performer FIFO sample buffer
//! - [`graph`]: pluggable processing graph, summing bus by default
//! - [`engine`]: block synchronization and the mix cycle
//! - [`archive`]: append-only session recording with 16-bit export
//! - [`room`]: roster, capacity and host rules for one room
//! - [`coordinator`]: room registry and per-room workers
//! - [`outbox`]: per-member outbound mailboxes
//! - [`protocol`]: tagged client/server events and wire codec
//! - [`server`]: WebSocket transport
//! - [`sink`]: hand-off of finished sessions to storage

pub mod archive;
pub mod channel;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod graph;
pub mod outbox;
pub mod protocol;
pub mod room;
pub mod server;
pub mod sink;

// Re-exports for convenience
pub use archive::SessionArchive;
pub use channel::PerformerChannel;
pub use coordinator::{GraphFactory, RoomSessionCoordinator, SessionConfig};
pub use engine::{MixerConfig, MixingEngine};
pub use error::SessionError;
pub use graph::{Insert, MixBus, ProcessingGraph};
pub use outbox::{Outbox, OutboxStats};
pub use protocol::{
    ClientEvent, CompositionMetadata, Member, PinCheck, ProtocolError, Role, RoomSpec,
    RoomState, RoomSummary, RosterEntry, ServerEvent,
};
pub use server::{ServerConfig, ServerStats, SessionServer};
pub use sink::{CompositionSink, LogSink, MemorySink, SessionArtifact};
