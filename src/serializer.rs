//! Payload serialization
//!
//! The server only moves bytes; turning application objects into those bytes
//! is the job of a [`PacketSerializer`].

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encodes application payloads for the wire.
///
/// Implementations must be deterministic and free of side effects.
pub trait PacketSerializer: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn serialize<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Vec<u8>, Self::Error>;

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error>;
}

/// JSON encoding via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl PacketSerializer for JsonSerializer {
    type Error = serde_json::Error;

    fn serialize<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Vec<u8>, Self::Error> {
        serde_json::to_vec(payload)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Greeting {
        id: u32,
        text: String,
    }

    #[test]
    fn test_json_serializer_is_deterministic() {
        let greeting = Greeting {
            id: 7,
            text: "hello".into(),
        };
        let a = JsonSerializer.serialize(&greeting).unwrap();
        let b = JsonSerializer.serialize(&greeting).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, br#"{"id":7,"text":"hello"}"#.to_vec());
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        let result: Result<Greeting, _> = JsonSerializer.deserialize(b"\x01\x02");
        assert!(result.is_err());
    }
}
