//! NIP-01 client and relay messages.
//!
//! Both directions are JSON arrays whose first element is a label:
//!
//! ```text
//! client → relay   ["REQ", <sub id>, <filter>...]   ["CLOSE", <sub id>]
//! relay → client   ["EVENT", <sub id>, <event>]     ["EOSE", <sub id>]
//!                  ["NOTICE", <message>]            ["CLOSED", <sub id>, <reason>]
//! ```

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;

use crate::{Event, Filter, MessageError};

/// Messages sent from this client to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Open a subscription.
    Req {
        /// Connection-unique subscription id.
        subscription_id: String,
        /// Filters; the relay ORs them together.
        filters: Vec<Filter>,
    },
    /// Close a subscription.
    Close {
        /// The subscription to close.
        subscription_id: String,
    },
}

impl ClientMessage {
    /// A REQ with a single filter.
    pub fn req(subscription_id: impl Into<String>, filter: Filter) -> Self {
        Self::Req {
            subscription_id: subscription_id.into(),
            filters: vec![filter],
        }
    }

    /// A CLOSE for the given subscription.
    pub fn close(subscription_id: impl Into<String>) -> Self {
        Self::Close {
            subscription_id: subscription_id.into(),
        }
    }

    /// Serialize to the JSON text sent in a WebSocket text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut seq = serializer.serialize_seq(Some(2 + filters.len()))?;
                seq.serialize_element("REQ")?;
                seq.serialize_element(subscription_id)?;
                for filter in filters {
                    seq.serialize_element(filter)?;
                }
                seq.end()
            }
            Self::Close { subscription_id } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("CLOSE")?;
                seq.serialize_element(subscription_id)?;
                seq.end()
            }
        }
    }
}

/// Messages received from a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// A stored or live event for a subscription. Not yet verified.
    Event {
        /// Subscription the event belongs to.
        subscription_id: String,
        /// The unverified event.
        event: Box<Event>,
    },
    /// End of stored events for a subscription.
    Eose {
        /// The subscription whose backfill is complete.
        subscription_id: String,
    },
    /// Human-readable message from the relay.
    Notice {
        /// The notice text.
        message: String,
    },
    /// The relay ended a subscription on its own.
    Closed {
        /// The subscription that was closed.
        subscription_id: String,
        /// Machine-prefixed reason, e.g. `auth-required: ...`.
        reason: String,
    },
    /// Result of an EVENT publish. Not used by the read path.
    Ok {
        /// Event id the result refers to.
        event_id: String,
        /// Whether the relay accepted the event.
        accepted: bool,
        /// Optional explanation.
        message: String,
    },
    /// NIP-42 authentication challenge.
    Auth {
        /// Challenge string.
        challenge: String,
    },
}

impl RelayMessage {
    /// Parse a relay message from WebSocket text.
    pub fn from_json(text: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(mut items) = value else {
            return Err(MessageError::NotAnArray);
        };
        let label = items
            .first()
            .and_then(Value::as_str)
            .ok_or(MessageError::NotAnArray)?
            .to_string();

        match label.as_str() {
            "EVENT" => {
                expect_arity("EVENT", &items, 3, 3)?;
                let subscription_id = string_at("EVENT", &items, 1)?;
                let event = serde_json::from_value::<Event>(items[2].take()).map_err(|e| {
                    MessageError::InvalidField {
                        label: "EVENT",
                        reason: e.to_string(),
                    }
                })?;
                Ok(Self::Event {
                    subscription_id,
                    event: Box::new(event),
                })
            }
            "EOSE" => {
                expect_arity("EOSE", &items, 2, 2)?;
                Ok(Self::Eose {
                    subscription_id: string_at("EOSE", &items, 1)?,
                })
            }
            "NOTICE" => {
                expect_arity("NOTICE", &items, 2, 2)?;
                Ok(Self::Notice {
                    message: string_at("NOTICE", &items, 1)?,
                })
            }
            "CLOSED" => {
                expect_arity("CLOSED", &items, 2, 3)?;
                let reason = match items.get(2) {
                    Some(_) => string_at("CLOSED", &items, 2)?,
                    None => String::new(),
                };
                Ok(Self::Closed {
                    subscription_id: string_at("CLOSED", &items, 1)?,
                    reason,
                })
            }
            "OK" => {
                expect_arity("OK", &items, 3, 4)?;
                let accepted = items[2].as_bool().ok_or_else(|| MessageError::InvalidField {
                    label: "OK",
                    reason: "accepted flag is not a boolean".into(),
                })?;
                let message = match items.get(3) {
                    Some(_) => string_at("OK", &items, 3)?,
                    None => String::new(),
                };
                Ok(Self::Ok {
                    event_id: string_at("OK", &items, 1)?,
                    accepted,
                    message,
                })
            }
            "AUTH" => {
                expect_arity("AUTH", &items, 2, 2)?;
                Ok(Self::Auth {
                    challenge: string_at("AUTH", &items, 1)?,
                })
            }
            _ => Err(MessageError::UnknownLabel(label)),
        }
    }

    /// The subscription this message addresses, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::Event {
                subscription_id, ..
            }
            | Self::Eose { subscription_id }
            | Self::Closed {
                subscription_id, ..
            } => Some(subscription_id),
            Self::Notice { .. } | Self::Ok { .. } | Self::Auth { .. } => None,
        }
    }
}

fn expect_arity(
    label: &'static str,
    items: &[Value],
    min: usize,
    max: usize,
) -> Result<(), MessageError> {
    if items.len() < min || items.len() > max {
        return Err(MessageError::WrongArity {
            label,
            actual: items.len(),
        });
    }
    Ok(())
}

fn string_at(label: &'static str, items: &[Value], index: usize) -> Result<String, MessageError> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MessageError::InvalidField {
            label,
            reason: format!("element {index} is not a string"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::signed_note;
    use serde_json::json;

    // ===========================================
    // Client Message Tests
    // ===========================================

    #[test]
    fn req_serializes_as_array() {
        let msg = ClientMessage::req("sub:1", Filter::new().kinds([1]).limit(10));
        assert_eq!(
            msg.to_json().unwrap(),
            r#"["REQ","sub:1",{"kinds":[1],"limit":10}]"#
        );
    }

    #[test]
    fn close_serializes_as_array() {
        assert_eq!(
            ClientMessage::close("sub:1").to_json().unwrap(),
            r#"["CLOSE","sub:1"]"#
        );
    }

    // ===========================================
    // Relay Message Tests
    // ===========================================

    #[test]
    fn parses_event() {
        let ev = signed_note("hi");
        let text = json!(["EVENT", "s", ev]).to_string();
        match RelayMessage::from_json(&text).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                assert_eq!(subscription_id, "s");
                assert_eq!(*event, ev);
            }
            other => panic!("Expected Event, got {:?}", other),
        }
    }

    #[test]
    fn parses_eose_notice_closed() {
        assert_eq!(
            RelayMessage::from_json(r#"["EOSE","s"]"#).unwrap(),
            RelayMessage::Eose {
                subscription_id: "s".into()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["NOTICE","slow down"]"#).unwrap(),
            RelayMessage::Notice {
                message: "slow down".into()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["CLOSED","s","auth-required: log in"]"#).unwrap(),
            RelayMessage::Closed {
                subscription_id: "s".into(),
                reason: "auth-required: log in".into()
            }
        );
    }

    #[test]
    fn closed_without_reason_defaults_to_empty() {
        assert_eq!(
            RelayMessage::from_json(r#"["CLOSED","s"]"#).unwrap(),
            RelayMessage::Closed {
                subscription_id: "s".into(),
                reason: String::new()
            }
        );
    }

    #[test]
    fn parses_ok_and_auth() {
        assert!(matches!(
            RelayMessage::from_json(r#"["OK","abc",false,"blocked"]"#).unwrap(),
            RelayMessage::Ok { accepted: false, .. }
        ));
        assert!(matches!(
            RelayMessage::from_json(r#"["AUTH","challenge"]"#).unwrap(),
            RelayMessage::Auth { .. }
        ));
    }

    #[test]
    fn event_with_wrong_arity_is_rejected() {
        let result = RelayMessage::from_json(r#"["EVENT","s"]"#);
        assert!(matches!(
            result,
            Err(MessageError::WrongArity {
                label: "EVENT",
                actual: 2
            })
        ));
    }

    #[test]
    fn event_with_bad_body_is_rejected() {
        let result = RelayMessage::from_json(r#"["EVENT","s",{"id":1}]"#);
        assert!(matches!(
            result,
            Err(MessageError::InvalidField { label: "EVENT", .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            RelayMessage::from_json("not json"),
            Err(MessageError::Json(_))
        ));
        assert!(matches!(
            RelayMessage::from_json("{}"),
            Err(MessageError::NotAnArray)
        ));
        assert!(matches!(
            RelayMessage::from_json("[]"),
            Err(MessageError::NotAnArray)
        ));
        assert!(matches!(
            RelayMessage::from_json(r#"["COUNT","s",{"count":1}]"#),
            Err(MessageError::UnknownLabel(_))
        ));
    }

    #[test]
    fn subscription_id_accessor() {
        let eose = RelayMessage::from_json(r#"["EOSE","abc"]"#).unwrap();
        assert_eq!(eose.subscription_id(), Some("abc"));
        let notice = RelayMessage::from_json(r#"["NOTICE","x"]"#).unwrap();
        assert_eq!(notice.subscription_id(), None);
    }
}
