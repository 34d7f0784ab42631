//! One state slice per domain.
//!
//! Each module owns its state, actions and reducer, and exposes `mappings()`:
//! the table translating its hub events into application actions.

pub mod auth;
pub mod caixinha_invites;
pub mod connections;
pub mod invites;
pub mod messages;
pub mod notifications;
pub mod preferences;
pub mod support;
