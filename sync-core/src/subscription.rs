//! Subscription state machine for relaysync.
//!
//! One REQ/EVENT/EOSE exchange with one relay, modelled as a pure state
//! machine. It takes inputs (caller requests, parsed relay messages,
//! cancellation, transport loss) and produces a new state plus a list of
//! actions to execute.
//!
//! Event verification happens here: an `EVENT` only ever turns into
//! [`Action::Deliver`] carrying a [`VerifiedEvent`]. The actual I/O (sending
//! frames, calling the sink) is performed by sync-client.

use std::fmt;

use relaysync_types::{ClientMessage, Filter, RelayMessage, VerifiedEvent, VerifyError};

/// Subscription state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Nothing requested yet.
    Idle,
    /// REQ sent, waiting for events and EOSE.
    Subscribed {
        /// Id sent in the REQ.
        id: String,
    },
    /// Finished; every further input is ignored.
    Done,
}

impl SubscriptionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an input and return the new state plus actions to execute.
    pub fn on_event(self, input: Input) -> (Self, Vec<Action>) {
        match (self, input) {
            // From Idle
            (Self::Idle, Input::Subscribe { id, filter }) => {
                let req = ClientMessage::req(id.clone(), filter);
                (Self::Subscribed { id }, vec![Action::Send(req)])
            }

            // From Subscribed
            (Self::Subscribed { id }, Input::Message(message)) => on_message(id, message),
            (Self::Subscribed { id }, Input::Cancelled) => (
                Self::Done,
                vec![
                    Action::SendClose(ClientMessage::close(id)),
                    Action::Finish(SubscriptionEnd::Cancelled),
                ],
            ),
            (Self::Subscribed { .. }, Input::ConnectionLost { reason }) => (
                Self::Done,
                vec![Action::Finish(SubscriptionEnd::ConnectionLost { reason })],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// The active subscription id, if subscribed.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::Subscribed { id } => Some(id),
            _ => None,
        }
    }

    /// Check if the subscription has finished.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::new()
    }
}

fn on_message(id: String, message: RelayMessage) -> (SubscriptionState, Vec<Action>) {
    if let Some(other) = message.subscription_id() {
        if other != id {
            return (
                SubscriptionState::Subscribed { id },
                vec![Action::Ignore {
                    reason: "other subscription",
                }],
            );
        }
    }

    match message {
        RelayMessage::Event { event, .. } => {
            let event_id = event.id.clone();
            let action = match (*event).verify() {
                Ok(verified) => Action::Deliver(verified),
                Err(error) => Action::Reject { event_id, error },
            };
            (SubscriptionState::Subscribed { id }, vec![action])
        }
        RelayMessage::Eose { .. } => (
            SubscriptionState::Done,
            vec![
                Action::SendClose(ClientMessage::close(id)),
                Action::Finish(SubscriptionEnd::Eose),
            ],
        ),
        RelayMessage::Closed { reason, .. } => (
            SubscriptionState::Done,
            vec![Action::Finish(SubscriptionEnd::Closed { reason })],
        ),
        RelayMessage::Notice { message } => (
            SubscriptionState::Subscribed { id },
            vec![Action::Notice(message)],
        ),
        RelayMessage::Ok { .. } => (
            SubscriptionState::Subscribed { id },
            vec![Action::Ignore { reason: "OK" }],
        ),
        RelayMessage::Auth { .. } => (
            SubscriptionState::Subscribed { id },
            vec![Action::Ignore { reason: "AUTH" }],
        ),
    }
}

/// Inputs to the subscription state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Caller asked to open the subscription.
    Subscribe {
        /// Connection-unique subscription id.
        id: String,
        /// Filter to send in the REQ.
        filter: Filter,
    },
    /// A parsed message arrived from the relay.
    Message(RelayMessage),
    /// Caller cancelled the subscription.
    Cancelled,
    /// The transport failed or the relay closed the socket.
    ConnectionLost {
        /// Description of the failure.
        reason: String,
    },
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a message; failure aborts the subscription.
    Send(ClientMessage),
    /// Send a CLOSE; failure is logged and otherwise ignored.
    SendClose(ClientMessage),
    /// Hand a verified event to the sink.
    Deliver(VerifiedEvent),
    /// An event failed verification and was dropped.
    Reject {
        /// The id the relay claimed for the event.
        event_id: String,
        /// Why verification failed.
        error: VerifyError,
    },
    /// Relay sent a NOTICE.
    Notice(String),
    /// The message was valid but irrelevant to this subscription.
    Ignore {
        /// Short description for logs.
        reason: &'static str,
    },
    /// The subscription is over.
    Finish(SubscriptionEnd),
}

/// How a subscription ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEnd {
    /// The relay sent EOSE; backfill is complete.
    Eose,
    /// The relay closed the subscription.
    Closed {
        /// Reason given by the relay (may be empty).
        reason: String,
    },
    /// The caller cancelled.
    Cancelled,
    /// The connection dropped.
    ConnectionLost {
        /// Description of the failure.
        reason: String,
    },
}

impl SubscriptionEnd {
    /// True for the two endings a relay reports as success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Eose | Self::Closed { .. })
    }
}

impl fmt::Display for SubscriptionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eose => write!(f, "eose"),
            Self::Closed { reason } if reason.is_empty() => write!(f, "closed by relay"),
            Self::Closed { reason } => write!(f, "closed by relay: {reason}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ConnectionLost { reason } => write!(f, "connection lost: {reason}"),
        }
    }
}
