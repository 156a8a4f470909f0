//! Message envelope and payload.
//!
//! A [`Payload`] stores every entry as a `serde_json::Value`: inserting a
//! value serializes it, which is the defensive copy that keeps concurrently
//! delivered messages from aliasing each other. Anything whose `Serialize`
//! implementation refuses (a live [`Variable`](crate::variable::Variable)
//! in particular) is rejected at insertion time.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::DcopError;

/// Small heterogeneous key/value payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    entries: BTreeMap<String, serde_json::Value>,
}

impl Payload {
    /// An empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `value` into the payload under `key`.
    pub fn insert<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<(), DcopError> {
        let json = serde_json::to_value(value).map_err(|e| DcopError::NonSerializable(e.to_string()))?;
        self.entries.insert(key.into(), json);
        Ok(())
    }

    /// Builder-style [`Payload::insert`].
    pub fn with<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Result<Self, DcopError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Decode the entry under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, DcopError> {
        let raw = self
            .entries
            .get(key)
            .ok_or_else(|| DcopError::MissingField(key.to_string()))?;
        serde_json::from_value(raw.clone()).map_err(|e| DcopError::Payload {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Decode the entry under `key`, treating absence (or `null`) as `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DcopError> {
        match self.entries.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(_) => self.get(key).map(Some),
        }
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact structured-text form.
    pub fn to_text(&self) -> Result<String, DcopError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Inverse of [`Payload::to_text`].
    pub fn from_text(text: &str) -> Result<Self, DcopError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Typed envelope exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    source: Option<Address>,
    kind: String,
    payload: Payload,
}

impl Message {
    /// Message from `source` with an empty payload.
    pub fn new(source: &Address, kind: impl Into<String>) -> Self {
        Self {
            source: Some(source.clone()),
            kind: kind.into(),
            payload: Payload::new(),
        }
    }

    /// Control message with no sender (driver-issued).
    pub fn control(kind: impl Into<String>) -> Self {
        Self {
            source: None,
            kind: kind.into(),
            payload: Payload::new(),
        }
    }

    /// Attach an entry to the payload.
    pub fn with<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Result<Self, DcopError> {
        self.payload.insert(key, value)?;
        Ok(self)
    }

    /// Sender, if any.
    pub fn source(&self) -> Option<&Address> {
        self.source.as_ref()
    }

    /// Type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether the type tag equals `kind`.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Payload entries.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Shorthand for `payload().get(key)`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, DcopError> {
        self.payload.get(key)
    }

    /// Compact structured-text form, for logging and replay.
    pub fn to_text(&self) -> Result<String, DcopError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Inverse of [`Message::to_text`].
    pub fn from_text(text: &str) -> Result<Self, DcopError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{AssignmentMap, CostMap};
    use crate::domain::{Domain, Fixed, Value};
    use crate::variable::Variable;
    use proptest::prelude::*;

    #[test]
    fn test_payload_rejects_live_variable() {
        let v = Variable::new("x", Domain::boolean());
        let mut payload = Payload::new();
        let err = payload.insert("var", &v).unwrap_err();
        assert!(matches!(err, DcopError::NonSerializable(_)));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_payload_is_a_copy() {
        let x = Address::new("x");
        let mut context = AssignmentMap::new();
        context.set(x.clone(), Value::Int(0));
        let payload = Payload::new().with("context", &context).unwrap();
        context.set(x.clone(), Value::Int(9));
        let carried: AssignmentMap = payload.get("context").unwrap();
        assert_eq!(carried.get(&x), Some(&Value::Int(0)));
    }

    #[test]
    fn test_missing_and_malformed_entries() {
        let payload = Payload::new().with("n", &3u32).unwrap();
        assert!(matches!(payload.get::<u32>("m"), Err(DcopError::MissingField(k)) if k == "m"));
        assert!(matches!(payload.get::<String>("n"), Err(DcopError::Payload { .. })));
        assert_eq!(payload.get_opt::<u32>("m").unwrap(), None);
        assert_eq!(payload.get_opt::<u32>("n").unwrap(), Some(3));
    }

    #[test]
    fn test_non_finite_costs_are_rejected_at_insert() {
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let costs: CostMap = vec![(Value::Int(0), bad), (Value::Int(1), 0.0)].into();
            let mut payload = Payload::new();
            let err = payload.insert("costs", &costs).unwrap_err();
            assert!(matches!(err, DcopError::NonSerializable(_)));
            assert!(!payload.contains("costs"));
        }
        let finite: CostMap = vec![(Value::Int(0), f64::MAX), (Value::Int(1), -1e300)].into();
        let payload = Payload::new().with("costs", &finite).unwrap();
        assert_eq!(payload.get::<CostMap>("costs").unwrap(), finite);
    }

    #[test]
    fn test_message_text_roundtrip() {
        let source = Address::new("a");
        let costs: CostMap = vec![(Value::Int(0), 1.5), (Value::Int(1), 0.0)].into();
        let msg = Message::new(&source, "cocoa.cost")
            .with("costs", &costs)
            .unwrap()
            .with("domain", &Domain::int_range(0, 1).unwrap())
            .unwrap();
        let text = msg.to_text().unwrap();
        assert!(!text.contains('\n'));
        let back = Message::from_text(&text).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.source(), Some(&source));
        assert_eq!(back.get::<CostMap>("costs").unwrap(), costs);
    }

    #[test]
    fn test_control_message_has_no_source() {
        let msg = Message::control("cocoa.activate");
        assert!(msg.source().is_none());
        assert!(msg.is("cocoa.activate"));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::Int),
            any::<bool>().prop_map(Value::Bool),
            (any::<i32>(), 0u8..6).prop_map(|(u, s)| Value::Fixed(Fixed::new(i64::from(u), s).unwrap())),
            "[a-z]{0,8}".prop_map(Value::Symbol),
        ]
    }

    proptest! {
        #[test]
        fn prop_payload_roundtrip(values in proptest::collection::vec(arb_value(), 0..6), cost in -1e9f64..1e9) {
            let x = Address::new("x");
            let context: AssignmentMap = values
                .iter()
                .map(|v| (Address::new("n"), v.clone()))
                .collect();
            let costs: CostMap = values.iter().map(|v| (v.clone(), cost)).collect();
            let payload = Payload::new()
                .with("values", &values).unwrap()
                .with("context", &context).unwrap()
                .with("costs", &costs).unwrap()
                .with("target", &x).unwrap();
            let back = Payload::from_text(&payload.to_text().unwrap()).unwrap();
            prop_assert_eq!(&back, &payload);
            prop_assert_eq!(back.get::<Vec<Value>>("values").unwrap(), values);
            prop_assert_eq!(back.get::<AssignmentMap>("context").unwrap(), context);
            prop_assert_eq!(back.get::<Address>("target").unwrap(), x);
        }
    }
}
