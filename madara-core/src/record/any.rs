//! The dynamically-typed `Any` record variant.
//!
//! Modeled as a trait object rather than a raw C-style vtable struct (the
//! idiomatic Rust translation called for in the design notes): any type
//! that wants to live inside a Record implements `AnyValue` and registers
//! a decoder under a string tag. Lazy deserialization is supported: a
//! record may carry raw bytes plus a tag and only materialize into a
//! concrete `Box<dyn AnyValue>` on first typed access.

use crate::error::BadAnyAccess;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// Implemented by any type that can be stored in an `Any` record.
pub trait AnyValue: fmt::Debug + Send + Sync + std::any::Any {
    /// The registration tag for this type, e.g. `"pose3d"`.
    fn tag(&self) -> &'static str;
    fn serialize(&self) -> Vec<u8>;
    fn clone_box(&self) -> Box<dyn AnyValue>;
    fn fmt_json(&self) -> serde_json::Value;
    /// Type-erased equality, used by `Record`'s `PartialEq`.
    fn eq_any(&self, other: &dyn AnyValue) -> bool;
    /// Upcast for `std::any::Any` downcasting in `Record::as_any`.
    fn as_any(&self) -> &dyn std::any::Any;
}

impl Clone for Box<dyn AnyValue> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn AnyValue> {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag() && self.eq_any(other.as_ref())
    }
}

type Decoder = dyn Fn(&[u8]) -> Option<Box<dyn AnyValue>> + Send + Sync;

static REGISTRY: Lazy<RwLock<HashMap<String, Box<Decoder>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers a decoder for `tag`. Re-registering a tag replaces the
/// previous decoder.
pub fn register(tag: &str, decoder: impl Fn(&[u8]) -> Option<Box<dyn AnyValue>> + Send + Sync + 'static) {
    REGISTRY.write().insert(tag.to_string(), Box::new(decoder));
}

pub fn is_registered(tag: &str) -> bool {
    REGISTRY.read().contains_key(tag)
}

fn decode(tag: &str, bytes: &[u8]) -> Result<Box<dyn AnyValue>, BadAnyAccess> {
    let registry = REGISTRY.read();
    let decoder = registry
        .get(tag)
        .ok_or_else(|| BadAnyAccess::UnregisteredTag {
            tag: tag.to_string(),
        })?;
    decoder(bytes).ok_or(BadAnyAccess::Empty)
}

/// Whether `Any` payloads decode eagerly (on ingest, if a decoder is
/// registered for the tag) or lazily (only on first typed access).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyDecodePolicy {
    Lazy,
    Eager,
}

/// The payload carried by an `Any` record: either raw bytes awaiting
/// decode, or an already-materialized value.
#[derive(Debug, Clone)]
pub enum AnyPayload {
    Raw { tag: String, bytes: Vec<u8> },
    Decoded(Box<dyn AnyValue>),
}

impl PartialEq for AnyPayload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AnyPayload::Raw { tag: t1, bytes: b1 }, AnyPayload::Raw { tag: t2, bytes: b2 }) => {
                t1 == t2 && b1 == b2
            }
            (AnyPayload::Decoded(a), AnyPayload::Decoded(b)) => a == b,
            // Cross-form equality is intentionally conservative: without
            // decoding we cannot prove equivalence, so treat mixed
            // representations of the same tag+bytes as unequal unless both
            // sides have been materialized.
            _ => false,
        }
    }
}

impl AnyPayload {
    pub fn tag(&self) -> &str {
        match self {
            AnyPayload::Raw { tag, .. } => tag,
            AnyPayload::Decoded(v) => v.tag(),
        }
    }

    /// Materializes the payload into a concrete value, decoding raw bytes
    /// if necessary. Returns `BadAnyAccess` if no decoder is registered.
    pub fn ensure_decoded(&mut self) -> Result<&dyn AnyValue, BadAnyAccess> {
        if let AnyPayload::Raw { tag, bytes } = self {
            let decoded = decode(tag, bytes)?;
            *self = AnyPayload::Decoded(decoded);
        }
        match self {
            AnyPayload::Decoded(v) => Ok(&**v),
            AnyPayload::Raw { .. } => unreachable!("just decoded above"),
        }
    }

    pub fn fmt_json(&self) -> serde_json::Value {
        match self {
            AnyPayload::Decoded(v) => v.fmt_json(),
            AnyPayload::Raw { tag, bytes } => serde_json::json!({
                "tag": tag,
                "raw_len": bytes.len(),
            }),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            AnyPayload::Decoded(v) => v.serialize(),
            AnyPayload::Raw { bytes, .. } => bytes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(i64);

    impl AnyValue for Counter {
        fn tag(&self) -> &'static str {
            "counter"
        }
        fn serialize(&self) -> Vec<u8> {
            self.0.to_le_bytes().to_vec()
        }
        fn clone_box(&self) -> Box<dyn AnyValue> {
            Box::new(self.clone())
        }
        fn fmt_json(&self) -> serde_json::Value {
            serde_json::json!({"counter": self.0})
        }
        fn eq_any(&self, other: &dyn AnyValue) -> bool {
            other
                .fmt_json()
                .get("counter")
                .and_then(|v| v.as_i64())
                .map(|v| v == self.0)
                .unwrap_or(false)
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct OtherThing;

    impl AnyValue for OtherThing {
        fn tag(&self) -> &'static str {
            "other_thing"
        }
        fn serialize(&self) -> Vec<u8> {
            vec![]
        }
        fn clone_box(&self) -> Box<dyn AnyValue> {
            Box::new(self.clone())
        }
        fn fmt_json(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn eq_any(&self, other: &dyn AnyValue) -> bool {
            other.tag() == self.tag()
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn lazy_decode_materializes_on_access() {
        register("counter_test", |bytes| {
            let arr: [u8; 8] = bytes.try_into().ok()?;
            Some(Box::new(Counter(i64::from_le_bytes(arr))) as Box<dyn AnyValue>)
        });
        let mut payload = AnyPayload::Raw {
            tag: "counter_test".into(),
            bytes: 42i64.to_le_bytes().to_vec(),
        };
        assert!(matches!(payload, AnyPayload::Raw { .. }));
        let decoded = payload.ensure_decoded().unwrap();
        assert_eq!(decoded.fmt_json()["counter"], 42);
        assert!(matches!(payload, AnyPayload::Decoded(_)));
    }

    #[test]
    fn unregistered_tag_is_bad_any_access() {
        let mut payload = AnyPayload::Raw {
            tag: "nonexistent_tag_xyz".into(),
            bytes: vec![],
        };
        let err = payload.ensure_decoded().unwrap_err();
        assert!(matches!(err, BadAnyAccess::UnregisteredTag { .. }));
    }

    #[test]
    fn decoded_value_downcasts_only_to_its_own_concrete_type() {
        register("other_thing_test", |_bytes| Some(Box::new(OtherThing) as Box<dyn AnyValue>));
        let mut payload = AnyPayload::Raw {
            tag: "other_thing_test".into(),
            bytes: vec![],
        };
        let decoded = payload.ensure_decoded().unwrap();
        assert!(decoded.as_any().downcast_ref::<OtherThing>().is_some());
        assert!(decoded.as_any().downcast_ref::<Counter>().is_none());
    }
}
