//! Wire format for facts in transit.
//!
//! A [`FactEnvelope`] is what actually moves through the event bus: the
//! fact body serialized as self-describing JSON text, plus the header
//! metadata a broker or a troubleshooting human needs (event type,
//! partition key, correlation id, timestamp).
//!
//! Dead letters reuse the same envelope. When a consumer exhausts its
//! retries, the envelope is re-addressed to `<topic>.DLT` with the original
//! payload intact and the failure details recorded in [`FactEnvelope::metadata`].

use crate::fact::Fact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when encoding or decoding fact payloads.
#[derive(Error, Debug)]
pub enum FactError {
    /// The fact body could not be serialized to JSON.
    #[error("failed to encode {event_type}: {reason}")]
    Encode {
        /// Event type being encoded.
        event_type: &'static str,
        /// Underlying serializer message.
        reason: String,
    },

    /// The payload could not be deserialized into the expected fact.
    #[error("failed to decode {expected}: {reason}")]
    Decode {
        /// Event type the caller expected.
        expected: &'static str,
        /// Underlying deserializer message.
        reason: String,
    },

    /// The envelope holds a different event type than the caller expected.
    #[error("envelope holds '{actual}', expected '{expected}'")]
    TypeMismatch {
        /// Event type the caller expected.
        expected: &'static str,
        /// Event type found in the envelope.
        actual: String,
    },
}

/// A serialized fact ready for transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FactEnvelope {
    /// Topic the fact was (or will be) published to.
    pub topic: String,

    /// Version-suffixed event-type identifier (e.g. `"ReservationCreated.v1"`).
    pub event_type: String,

    /// The fact body as JSON text.
    pub payload: String,

    /// Partition key; facts sharing a key are delivered in order.
    pub partition_key: Option<String>,

    /// Correlation id linking related facts across services.
    pub correlation_id: String,

    /// When the envelope was created.
    pub occurred_at: DateTime<Utc>,

    /// Optional metadata. Dead letters record their failure details here
    /// (`error_type`, `failed_at`, `attempts`, `source_topic`).
    pub metadata: Option<serde_json::Value>,
}

impl FactEnvelope {
    /// Wrap a fact for publication.
    ///
    /// The correlation id defaults to `<topic>-<partition key>`, mirroring
    /// the `reservation-<id>` style identifiers the services log with.
    ///
    /// # Errors
    ///
    /// Returns [`FactError::Encode`] if the fact body cannot be serialized.
    pub fn from_fact<F: Fact>(fact: &F) -> Result<Self, FactError> {
        let payload = serde_json::to_string(fact).map_err(|e| FactError::Encode {
            event_type: F::EVENT_TYPE,
            reason: e.to_string(),
        })?;
        let key = fact.partition_key();
        Ok(Self {
            topic: F::TOPIC.to_string(),
            event_type: F::EVENT_TYPE.to_string(),
            payload,
            correlation_id: format!("{}-{key}", F::TOPIC),
            partition_key: Some(key),
            occurred_at: Utc::now(),
            metadata: None,
        })
    }

    /// Decode the payload into the expected fact type.
    ///
    /// # Errors
    ///
    /// Returns [`FactError::TypeMismatch`] if the envelope holds a different
    /// event type, or [`FactError::Decode`] if the payload is malformed.
    pub fn decode<F: Fact>(&self) -> Result<F, FactError> {
        if self.event_type != F::EVENT_TYPE {
            return Err(FactError::TypeMismatch {
                expected: F::EVENT_TYPE,
                actual: self.event_type.clone(),
            });
        }
        serde_json::from_str(&self.payload).map_err(|e| FactError::Decode {
            expected: F::EVENT_TYPE,
            reason: e.to_string(),
        })
    }

    /// Re-address this envelope to the dead-letter topic.
    ///
    /// The original payload, event type, partition key and correlation id
    /// are preserved; the failure details ride in [`Self::metadata`].
    #[must_use]
    pub fn into_dead_letter(self, error_type: &str, attempts: usize, failed_at: DateTime<Utc>) -> Self {
        let source_topic = self.topic.clone();
        Self {
            topic: crate::bus::dead_letter_topic(&source_topic),
            metadata: Some(serde_json::json!({
                "error_type": error_type,
                "failed_at": failed_at.to_rfc3339(),
                "attempts": attempts,
                "source_topic": source_topic,
            })),
            ..self
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::fact::{DinnerId, GuestId, ReservationCreated, ReservationId};

    fn sample_reservation_created() -> ReservationCreated {
        ReservationCreated {
            reservation_id: ReservationId::generate(),
            dinner_id: DinnerId(11),
            guest_id: GuestId(5),
            reservation_time: Utc::now(),
            restaurant_name: "Chez Amina".to_string(),
        }
    }

    #[test]
    fn reservation_created_roundtrips_through_the_envelope() {
        let fact = sample_reservation_created();
        let envelope = FactEnvelope::from_fact(&fact).expect("encoding should succeed");

        assert_eq!(envelope.topic, "reservation-created");
        assert_eq!(envelope.event_type, "ReservationCreated.v1");
        assert_eq!(
            envelope.partition_key.as_deref(),
            Some(fact.reservation_id.to_string().as_str())
        );

        let decoded: ReservationCreated = envelope.decode().expect("decoding should succeed");
        assert_eq!(decoded.reservation_id, fact.reservation_id);
        assert_eq!(decoded.dinner_id, fact.dinner_id);
        assert_eq!(decoded.guest_id, fact.guest_id);
        assert_eq!(decoded.reservation_time, fact.reservation_time);
        assert_eq!(decoded.restaurant_name, fact.restaurant_name);
    }

    #[test]
    fn decoding_the_wrong_type_is_rejected() {
        let fact = sample_reservation_created();
        let envelope = FactEnvelope::from_fact(&fact).expect("encoding should succeed");

        let err = envelope
            .decode::<crate::fact::GuestCreated>()
            .expect_err("mismatched type must not decode");
        assert!(matches!(err, FactError::TypeMismatch { .. }));
    }

    #[test]
    fn dead_letters_keep_the_original_payload() {
        let fact = sample_reservation_created();
        let envelope = FactEnvelope::from_fact(&fact).expect("encoding should succeed");
        let payload = envelope.payload.clone();

        let dead = envelope.into_dead_letter("handler exploded", 3, Utc::now());

        assert_eq!(dead.topic, "reservation-created.DLT");
        assert_eq!(dead.payload, payload);
        assert_eq!(dead.event_type, "ReservationCreated.v1");
        let metadata = dead.metadata.expect("failure metadata should be recorded");
        assert_eq!(metadata["error_type"], "handler exploded");
        assert_eq!(metadata["attempts"], 3);
        assert_eq!(metadata["source_topic"], "reservation-created");
    }
}
