//! Error types for the support desk.
//!
//! Every public service operation returns [`DeskError`], whose `Display` is a
//! human-readable message suitable for showing to the user as is.

use crate::delivery::DeliveryError;
use crate::types::{ConversationId, EscalationStatus, TicketId, TicketStatus};
use std::fmt;
use thiserror::Error;

/// Minimum ticket title length, in characters
pub const MIN_TITLE_LEN: usize = 5;

/// Minimum ticket description length, in characters
pub const MIN_DESCRIPTION_LEN: usize = 10;

/// One violated input rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A category must be chosen
    CategoryRequired,
    /// Title shorter than [`MIN_TITLE_LEN`]
    TitleTooShort {
        /// Characters supplied
        actual: usize,
    },
    /// Description shorter than [`MIN_DESCRIPTION_LEN`]
    DescriptionTooShort {
        /// Characters supplied
        actual: usize,
    },
    /// Resolving needs resolution notes
    ResolutionRequired,
    /// Notes cannot be blank
    NoteRequired,
    /// Messages cannot be blank
    MessageContentRequired,
    /// Sender and recipient are the same user
    SelfConversation,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CategoryRequired => f.write_str("category is required"),
            Self::TitleTooShort { actual } => write!(
                f,
                "title must be at least {MIN_TITLE_LEN} characters (got {actual})"
            ),
            Self::DescriptionTooShort { actual } => write!(
                f,
                "description must be at least {MIN_DESCRIPTION_LEN} characters (got {actual})"
            ),
            Self::ResolutionRequired => f.write_str("resolution notes are required"),
            Self::NoteRequired => f.write_str("note cannot be empty"),
            Self::MessageContentRequired => f.write_str("message cannot be empty"),
            Self::SelfConversation => f.write_str("cannot start a conversation with yourself"),
        }
    }
}

/// Input rejected before any network call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    /// Collect violations; `Ok(())` if there are none
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every violation.
    pub fn check(violations: Vec<Violation>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self { violations })
        }
    }

    /// The violated rules, in checking order
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalid input: ")?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<Violation> for ValidationError {
    fn from(violation: Violation) -> Self {
        Self {
            violations: vec![violation],
        }
    }
}

/// Illegal lifecycle move
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Operation not allowed from the ticket's current status
    #[error("Cannot {operation} ticket {ticket_id} while it is {from}")]
    Ticket {
        /// Ticket concerned
        ticket_id: TicketId,
        /// Status at the time
        from: TicketStatus,
        /// Attempted operation
        operation: &'static str,
    },

    /// Only the agent holding a ticket may resolve it
    #[error("Ticket {ticket_id} is not assigned to {agent}")]
    NotAssignee {
        /// Ticket concerned
        ticket_id: TicketId,
        /// Agent who tried
        agent: String,
    },

    /// Escalation status move not allowed
    #[error("Escalation of {conversation_id} cannot go from {from} to {to}")]
    Escalation {
        /// Conversation concerned
        conversation_id: ConversationId,
        /// Status at the time
        from: EscalationStatus,
        /// Requested status
        to: EscalationStatus,
    },
}

/// Backend interaction failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (connect, timeout, TLS)
    #[error("Network error: {0}")]
    Transport(String),

    /// Non-2xx response
    #[error("Server error (status {status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Body or backend message
        message: String,
    },

    /// The backend answered `success: false`
    #[error("{0}")]
    Rejected(String),

    /// The response body did not match the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether another attempt might succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::Decode(_) => false,
        }
    }
}

/// Error returned by every public desk operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeskError {
    /// Input rejected locally
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Nobody is signed in
    #[error("You must be signed in to {operation}")]
    NotAuthenticated {
        /// Attempted operation
        operation: &'static str,
    },

    /// The actor lacks support permissions
    #[error("You do not have permission to {operation}")]
    PermissionDenied {
        /// Attempted operation
        operation: &'static str,
    },

    /// Another agent claimed the ticket first
    #[error("Ticket {ticket_id} was already claimed: {reason}")]
    AlreadyClaimed {
        /// Ticket concerned
        ticket_id: TicketId,
        /// Backend explanation
        reason: String,
    },

    /// Illegal lifecycle move
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Backend failure
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Message delivery failure
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_rule() {
        let error = ValidationError::check(vec![
            Violation::TitleTooShort { actual: 2 },
            Violation::DescriptionTooShort { actual: 3 },
        ])
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            "Invalid input: title must be at least 5 characters (got 2); \
             description must be at least 10 characters (got 3)"
        );
    }

    #[test]
    fn empty_violations_pass() {
        assert!(ValidationError::check(Vec::new()).is_ok());
    }

    #[test]
    fn transient_api_errors() {
        assert!(ApiError::Transport("reset".into()).is_transient());
        assert!(ApiError::Status { status: 503, message: String::new() }.is_transient());
        assert!(!ApiError::Status { status: 409, message: String::new() }.is_transient());
        assert!(!ApiError::Rejected("already assigned".into()).is_transient());
    }
}
