use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

pub const ECHO: &str = "echo";
pub const PROGRESSBAR_INIT: &str = "progressbar.init";
pub const PROGRESSBAR_STEP: &str = "progressbar.step";
pub const PROGRESSBAR_CLEAR: &str = "progressbar.clear";
/// Published locally every time the push connection (re)opens.
pub const CONSOLE_CLEAR: &str = "console.clear";
/// Published locally once automatic reconnection has given up.
pub const CONNECTION_EXHAUSTED: &str = "connection.exhausted";

/// A named event with a statically known payload shape.
///
/// The bus stays keyed by name so unknown server events can still be
/// subscribed to with raw JSON, while known events decode into their payload
/// type at the subscriber boundary.
pub trait BusEvent {
    const NAME: &'static str;
    type Payload: Serialize + DeserializeOwned;
}

/// Payload for events that carry no data. Accepts whatever the server sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoPayload;

impl Serialize for NoPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_unit()
    }
}

impl<'de> Deserialize<'de> for NoPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(NoPayload)
    }
}

macro_rules! bus_event {
    ($name:ident, $wire:expr, $payload:ty) => {
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl BusEvent for $name {
            const NAME: &'static str = $wire;
            type Payload = $payload;
        }
    };
}

bus_event!(Echo, ECHO, String);
bus_event!(ProgressInit, PROGRESSBAR_INIT, NoPayload);
bus_event!(ProgressStep, PROGRESSBAR_STEP, f64);
bus_event!(ProgressClear, PROGRESSBAR_CLEAR, NoPayload);
bus_event!(ConsoleClear, CONSOLE_CLEAR, NoPayload);
bus_event!(ConnectionExhausted, CONNECTION_EXHAUSTED, NoPayload);

/// One message on the push channel: event names mapped to payloads, in the
/// order they appeared on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    events: Map<String, Value>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an inbound text frame.
    ///
    /// Blank text, `null`, and `{}` carry nothing to dispatch and yield
    /// `Ok(None)`. Anything else that is not a JSON object is an error.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(text)? {
            Value::Null => Ok(None),
            Value::Object(events) if events.is_empty() => Ok(None),
            Value::Object(events) => Ok(Some(Self { events })),
            Value::Bool(_) => Err(ProtocolError::NotAnObject("boolean")),
            Value::Number(_) => Err(ProtocolError::NotAnObject("number")),
            Value::String(_) => Err(ProtocolError::NotAnObject("string")),
            Value::Array(_) => Err(ProtocolError::NotAnObject("array")),
        }
    }

    pub fn with_event(mut self, name: impl Into<String>, payload: Value) -> Self {
        self.events.insert(name.into(), payload);
        self
    }

    pub fn push_typed<E: BusEvent>(&mut self, payload: &E::Payload) -> Result<(), ProtocolError> {
        self.events
            .insert(E::NAME.to_string(), serde_json::to_value(payload)?);
        Ok(())
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.events.iter().map(|(name, payload)| (name.as_str(), payload))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&self.events)?)
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.events.serialize(serializer)
    }
}

/// Decodes a raw payload into the typed payload of `E`.
pub fn decode_payload<E: BusEvent>(payload: &Value) -> Result<E::Payload, ProtocolError> {
    Ok(E::Payload::deserialize(payload)?)
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
