//! Saga events and the wire codec for the stream envelope.
//!
//! Every record on the stream is a flat JSON object carrying a discriminator
//! field (`event_type`) next to the variant's own fields:
//!
//! ```json
//! {"event_type":"PurchaseCompleted","order_id":"o1","user_id":"u1","amount":3500}
//! ```
//!
//! # Design
//!
//! The four saga steps form a closed enum, [`SagaEvent`]. Dispatch on the event
//! type is an exhaustive `match`, so a new variant cannot be silently ignored by
//! the choreographer.
//!
//! Decoding is two-phase:
//!
//! 1. The payload is parsed generically and the discriminator is extracted.
//!    Unknown discriminators are reported as [`DecodeError::UnknownEventType`].
//! 2. The payload is re-decoded into the strongly-typed variant. A payload that
//!    does not match its declared type is reported as
//!    [`DecodeError::InvalidPayload`].
//!
//! Both functions are pure.
//!
//! # Example
//!
//! ```
//! use paysaga_core::event::{decode, encode, PurchaseCompleted, SagaEvent};
//!
//! let event = SagaEvent::from(PurchaseCompleted {
//!     order_id: "o1".to_string(),
//!     user_id: "u1".to_string(),
//!     amount: 3500,
//! });
//!
//! let bytes = encode(&event).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), event);
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of the discriminator field in the wire envelope.
pub const EVENT_TYPE_FIELD: &str = "event_type";

/// Errors produced while decoding a raw stream record.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is not a JSON document.
    #[error("Malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The payload has no string `event_type` field.
    #[error("Envelope has no `event_type` discriminator")]
    MissingEventType,

    /// The discriminator names an event this system does not know.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The payload does not match the fields of its declared event type.
    #[error("Invalid {event_type} payload: {source}")]
    InvalidPayload {
        /// The declared event type.
        event_type: EventType,
        /// The underlying decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Short, stable label used for log fields and metric labels.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::MissingEventType => "missing_event_type",
            Self::UnknownEventType(_) => "unknown_event_type",
            Self::InvalidPayload { .. } => "invalid_payload",
        }
    }
}

/// Failure to serialize an event into the wire envelope.
#[derive(Error, Debug)]
#[error("Failed to encode {event_type} event: {source}")]
pub struct EncodeError {
    /// The event type that failed to encode.
    pub event_type: EventType,
    /// The underlying serializer failure.
    #[source]
    pub source: serde_json::Error,
}

/// Discriminator of a [`SagaEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A customer finished a purchase.
    PurchaseCompleted,
    /// A deferred-payment promise was created for a purchase.
    PaymentPromiseCreated,
    /// A bill was issued to the member.
    MemberBillCreated,
    /// The member paid a bill.
    PaymentCompleted,
}

impl EventType {
    /// All event types, in saga order.
    pub const ALL: [Self; 4] = [
        Self::PurchaseCompleted,
        Self::PaymentPromiseCreated,
        Self::MemberBillCreated,
        Self::PaymentCompleted,
    ];

    /// The discriminator written on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PurchaseCompleted => "PurchaseCompleted",
            Self::PaymentPromiseCreated => "PaymentPromiseCreated",
            Self::MemberBillCreated => "MemberBillCreated",
            Self::PaymentCompleted => "PaymentCompleted",
        }
    }

    /// Resolve a wire discriminator.
    ///
    /// Older producers suffix the name with `Event` (`PurchaseCompletedEvent`);
    /// both spellings resolve to the same type. Only the tag is translated: a
    /// legacy record still has to carry every field of the current shape, so a
    /// `PaymentPromiseCreatedEvent` without `amount` is an invalid payload.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let name = tag.strip_suffix("Event").unwrap_or(tag);
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| DecodeError::UnknownEventType(s.to_string()))
    }
}

/// How a promise will be settled.
///
/// Older producers wrote the Japanese labels (`月まとめ払い`, `すぐ払い`); they
/// decode to the same modes and are re-encoded in `snake_case`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Purchases are collected into one bill per month.
    #[serde(alias = "月まとめ払い")]
    MonthlyConsolidated,
    /// The bill is issued and paid straight away.
    #[serde(alias = "すぐ払い")]
    Immediate,
}

impl PaymentMode {
    /// Stored and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MonthlyConsolidated => "monthly_consolidated",
            Self::Immediate => "immediate",
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly_consolidated" | "月まとめ払い" => Ok(Self::MonthlyConsolidated),
            "immediate" | "すぐ払い" => Ok(Self::Immediate),
            other => Err(format!("unknown payment mode: {other}")),
        }
    }
}

/// A customer completed a purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseCompleted {
    /// Order identifier.
    pub order_id: String,
    /// Purchasing member.
    pub user_id: String,
    /// Purchase total in minor currency units.
    pub amount: i64,
}

/// A payment promise was created for a purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPromiseCreated {
    /// Promise identifier, minted by the choreographer.
    pub promise_id: String,
    /// Order the promise settles.
    pub order_id: String,
    /// Member who owes the amount.
    pub user_id: String,
    /// Promised amount, carried over from the purchase.
    pub amount: i64,
    /// Date by which the member has to pay.
    pub due_date: NaiveDate,
    /// How the promise will be billed.
    pub payment_mode: PaymentMode,
}

/// A bill was issued to a member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBillCreated {
    /// Bill identifier, minted by the bill-creation command.
    pub bill_id: String,
    /// Promise the bill collects.
    pub promise_id: String,
    /// Billed member.
    pub user_id: String,
    /// Billed amount.
    pub amount: i64,
    /// Issue date.
    pub issued_date: NaiveDate,
}

/// A member paid a bill.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    /// The bill that was paid.
    pub bill_id: String,
    /// Paying member.
    pub user_id: String,
    /// Paid amount.
    pub amount: i64,
    /// Payment date.
    pub paid_date: NaiveDate,
}

/// Every event that circulates on the saga stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum SagaEvent {
    /// See [`PurchaseCompleted`].
    PurchaseCompleted(PurchaseCompleted),
    /// See [`PaymentPromiseCreated`].
    PaymentPromiseCreated(PaymentPromiseCreated),
    /// See [`MemberBillCreated`].
    MemberBillCreated(MemberBillCreated),
    /// See [`PaymentCompleted`].
    PaymentCompleted(PaymentCompleted),
}

impl SagaEvent {
    /// The discriminator of this event.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::PurchaseCompleted(_) => EventType::PurchaseCompleted,
            Self::PaymentPromiseCreated(_) => EventType::PaymentPromiseCreated,
            Self::MemberBillCreated(_) => EventType::MemberBillCreated,
            Self::PaymentCompleted(_) => EventType::PaymentCompleted,
        }
    }

    /// The member this event concerns.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::PurchaseCompleted(e) => &e.user_id,
            Self::PaymentPromiseCreated(e) => &e.user_id,
            Self::MemberBillCreated(e) => &e.user_id,
            Self::PaymentCompleted(e) => &e.user_id,
        }
    }
}

impl From<PurchaseCompleted> for SagaEvent {
    fn from(event: PurchaseCompleted) -> Self {
        Self::PurchaseCompleted(event)
    }
}

impl From<PaymentPromiseCreated> for SagaEvent {
    fn from(event: PaymentPromiseCreated) -> Self {
        Self::PaymentPromiseCreated(event)
    }
}

impl From<MemberBillCreated> for SagaEvent {
    fn from(event: MemberBillCreated) -> Self {
        Self::MemberBillCreated(event)
    }
}

impl From<PaymentCompleted> for SagaEvent {
    fn from(event: PaymentCompleted) -> Self {
        Self::PaymentCompleted(event)
    }
}

/// Decode a raw stream record into a [`SagaEvent`].
///
/// # Errors
///
/// - [`DecodeError::Malformed`] if the bytes are not JSON
/// - [`DecodeError::MissingEventType`] if there is no string discriminator
/// - [`DecodeError::UnknownEventType`] if the discriminator is not recognized
/// - [`DecodeError::InvalidPayload`] if the fields do not match the declared type
pub fn decode(bytes: &[u8]) -> Result<SagaEvent, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Malformed)?;

    let tag = value
        .get(EVENT_TYPE_FIELD)
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingEventType)?;
    let event_type = tag.parse::<EventType>()?;

    let invalid = |source| DecodeError::InvalidPayload { event_type, source };
    let event = match event_type {
        EventType::PurchaseCompleted => {
            SagaEvent::PurchaseCompleted(serde_json::from_value(value).map_err(invalid)?)
        },
        EventType::PaymentPromiseCreated => {
            SagaEvent::PaymentPromiseCreated(serde_json::from_value(value).map_err(invalid)?)
        },
        EventType::MemberBillCreated => {
            SagaEvent::MemberBillCreated(serde_json::from_value(value).map_err(invalid)?)
        },
        EventType::PaymentCompleted => {
            SagaEvent::PaymentCompleted(serde_json::from_value(value).map_err(invalid)?)
        },
    };

    Ok(event)
}

/// Encode an event into the flat wire envelope.
///
/// # Errors
///
/// Returns [`EncodeError`] if serialization fails.
pub fn encode(event: &SagaEvent) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(event).map_err(|source| EncodeError {
        event_type: event.event_type(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn encode_writes_a_flat_envelope() {
        let event = SagaEvent::from(MemberBillCreated {
            bill_id: "b1".to_string(),
            promise_id: "p1".to_string(),
            user_id: "u1".to_string(),
            amount: 3500,
            issued_date: date(2024, 2, 1),
        });

        let value: Value = serde_json::from_slice(&encode(&event).unwrap()).unwrap();

        assert_eq!(value["event_type"], "MemberBillCreated");
        assert_eq!(value["bill_id"], "b1");
        assert_eq!(value["issued_date"], "2024-02-01");
    }

    #[test]
    fn decodes_hand_written_payload() {
        let raw = br#"{"event_type":"PaymentCompleted","bill_id":"b1","user_id":"u1","amount":3500,"paid_date":"2024-02-10"}"#;

        let event = decode(raw).unwrap();

        assert_eq!(
            event,
            SagaEvent::PaymentCompleted(PaymentCompleted {
                bill_id: "b1".to_string(),
                user_id: "u1".to_string(),
                amount: 3500,
                paid_date: date(2024, 2, 10),
            })
        );
    }

    #[test]
    fn accepts_legacy_suffixed_discriminator() {
        let raw = br#"{"event_type":"PurchaseCompletedEvent","order_id":"o1","user_id":"u1","amount":10}"#;
        assert_eq!(decode(raw).unwrap().event_type(), EventType::PurchaseCompleted);
    }

    #[test]
    fn legacy_promise_with_japanese_mode_decodes() {
        let raw = r#"{"event_type":"PaymentPromiseCreatedEvent","promise_id":"p1","order_id":"o1","user_id":"u1","amount":3500,"due_date":"2024-01-31","payment_mode":"月まとめ払い"}"#;

        let event = decode(raw.as_bytes()).unwrap();

        assert_eq!(
            event,
            SagaEvent::PaymentPromiseCreated(PaymentPromiseCreated {
                promise_id: "p1".to_string(),
                order_id: "o1".to_string(),
                user_id: "u1".to_string(),
                amount: 3500,
                due_date: date(2024, 1, 31),
                payment_mode: PaymentMode::MonthlyConsolidated,
            })
        );
        let value: Value = serde_json::from_slice(&encode(&event).unwrap()).unwrap();
        assert_eq!(value["payment_mode"], "monthly_consolidated");
        assert_eq!(value["event_type"], "PaymentPromiseCreated");
    }

    #[test]
    fn legacy_promise_without_amount_is_invalid() {
        let raw = r#"{"event_type":"PaymentPromiseCreatedEvent","promise_id":"p1","order_id":"o1","user_id":"u1","due_date":"2024-01-31","payment_mode":"すぐ払い"}"#;

        let err = decode(raw.as_bytes()).unwrap_err();

        assert!(matches!(
            err,
            DecodeError::InvalidPayload {
                event_type: EventType::PaymentPromiseCreated,
                ..
            }
        ));
    }

    #[test]
    fn unknown_discriminator_is_rejected() {
        let raw = br#"{"event_type":"OrderShipped","order_id":"o1"}"#;
        let err = decode(raw).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventType(ref t) if t == "OrderShipped"));
        assert_eq!(err.reason(), "unknown_event_type");
    }

    #[test]
    fn missing_discriminator_is_rejected() {
        assert!(matches!(
            decode(br#"{"order_id":"o1"}"#),
            Err(DecodeError::MissingEventType)
        ));
        assert!(matches!(
            decode(br#"{"event_type":42}"#),
            Err(DecodeError::MissingEventType)
        ));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn wrong_fields_for_known_type_are_invalid() {
        let raw = br#"{"event_type":"MemberBillCreated","bill_id":"b1","amount":"lots"}"#;
        let err = decode(raw).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidPayload {
                event_type: EventType::MemberBillCreated,
                ..
            }
        ));
    }

    #[test]
    fn bad_date_is_invalid() {
        let raw = br#"{"event_type":"PaymentCompleted","bill_id":"b1","user_id":"u1","amount":1,"paid_date":"10/02/2024"}"#;
        assert!(matches!(decode(raw), Err(DecodeError::InvalidPayload { .. })));
    }

    #[test]
    fn payment_mode_parses_its_own_display() {
        for mode in [PaymentMode::MonthlyConsolidated, PaymentMode::Immediate] {
            assert_eq!(mode.to_string().parse::<PaymentMode>().unwrap(), mode);
        }
        assert_eq!("すぐ払い".parse::<PaymentMode>().unwrap(), PaymentMode::Immediate);
        assert!("weekly".parse::<PaymentMode>().is_err());
    }

    fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (2000i32..2100, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| date(y, m, d))
    }

    fn arb_event() -> impl Strategy<Value = SagaEvent> {
        let id = "[a-z0-9-]{1,16}";
        prop_oneof![
            (id, id, any::<i64>()).prop_map(|(order_id, user_id, amount)| {
                SagaEvent::from(PurchaseCompleted { order_id, user_id, amount })
            }),
            (id, id, id, any::<i64>(), arb_date(), any::<bool>()).prop_map(
                |(promise_id, order_id, user_id, amount, due_date, monthly)| {
                    SagaEvent::from(PaymentPromiseCreated {
                        promise_id,
                        order_id,
                        user_id,
                        amount,
                        due_date,
                        payment_mode: if monthly {
                            PaymentMode::MonthlyConsolidated
                        } else {
                            PaymentMode::Immediate
                        },
                    })
                }
            ),
            (id, id, id, any::<i64>(), arb_date()).prop_map(
                |(bill_id, promise_id, user_id, amount, issued_date)| {
                    SagaEvent::from(MemberBillCreated {
                        bill_id,
                        promise_id,
                        user_id,
                        amount,
                        issued_date,
                    })
                }
            ),
            (id, id, any::<i64>(), arb_date()).prop_map(|(bill_id, user_id, amount, paid_date)| {
                SagaEvent::from(PaymentCompleted { bill_id, user_id, amount, paid_date })
            }),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(event in arb_event()) {
            let bytes = encode(&event).unwrap();
            prop_assert_eq!(decode(&bytes).unwrap(), event);
        }
    }
}
