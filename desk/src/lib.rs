//! # Support Desk
//!
//! Client-side state synchronization for a support desk: ticket lifecycle,
//! conversation escalation to human agents, and direct messages delivered
//! realtime first with a reliable fallback.
//!
//! ## Layout
//!
//! - [`app`]: the state tree, the combined reducer and [`SyncLayer`]
//! - [`slices`]: one state slice per domain with its event mapping table
//! - [`tickets`]: ticket and escalation operations
//! - [`messaging`]: message send/fetch and realtime intake
//! - [`delivery`]: realtime, reliable and fallback transports
//! - [`api`]: backend contract and its HTTP implementation
//!
//! ## Flow
//!
//! ```text
//! TicketService / MessageService ──emit──▶ EventHub
//!                                            │
//!                          ActionBridge (mapping tables)
//!                                            │
//!                                   DeskStore::dispatch
//!                                            │
//!                         auth │ support │ messages │ ... slices
//! ```
//!
//! Services never write state directly; every change goes through an event.

pub mod api;
pub mod app;
pub mod config;
pub mod delivery;
pub mod device;
pub mod error;
pub mod messaging;
pub mod mocks;
pub mod permissions;
pub mod slices;
pub mod telemetry;
pub mod tickets;
pub mod types;

pub use app::{AppAction, AppState, DeskStore, SyncLayer};
pub use config::DeskConfig;
pub use error::{ApiError, DeskError, ValidationError, Violation};
pub use messaging::{MessageService, RealtimeSync};
pub use tickets::{EscalationView, TicketDraft, TicketService};
pub use types::{conversation_id, ConversationId, TicketId};
