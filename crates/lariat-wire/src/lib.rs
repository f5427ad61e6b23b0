// Wire-level data model shared by clients and the servers they talk to.
// Every bus frame is a serde_json-encoded envelope; application payloads
// travel inside a schema-tagged container so receivers can refuse a
// mistyped body before deserializing it.
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("response envelope carries neither payload nor error")]
    EmptyResponse,
}

/// A message type that can travel inside a [`Payload`] container.
///
/// `SCHEMA` is the stable tag written next to the encoded body; decoding
/// checks it before touching the bytes.
pub trait Packet: Serialize + DeserializeOwned + Send + Sync + 'static {
    const SCHEMA: &'static str;
}

/// Schema-tagged polymorphic payload container.
///
/// ```
/// use lariat_wire::{Packet, Payload};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Greeting { text: String }
///
/// impl Packet for Greeting {
///     const SCHEMA: &'static str = "example.Greeting";
/// }
///
/// let original = Greeting { text: "hello".into() };
/// let payload = Payload::pack(&original).expect("pack");
/// let restored: Greeting = payload.unpack().expect("unpack");
/// assert_eq!(restored, original);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub type_url: String,
    pub data: Bytes,
}

impl Payload {
    pub fn pack<T: Packet>(message: &T) -> Result<Self> {
        let data = serde_json::to_vec(message).map_err(Error::Encode)?;
        Ok(Self {
            type_url: T::SCHEMA.to_string(),
            data: Bytes::from(data),
        })
    }

    // Downcast guarded by the schema tag; a mismatch is an error, not a
    // best-effort decode.
    pub fn unpack<T: Packet>(&self) -> Result<T> {
        if self.type_url != T::SCHEMA {
            return Err(Error::SchemaMismatch {
                expected: T::SCHEMA,
                found: self.type_url.clone(),
            });
        }
        serde_json::from_slice(&self.data).map_err(Error::Decode)
    }

    pub fn schema(&self) -> &str {
        &self.type_url
    }
}

/// Request published by a client to every server listening on a method
/// channel. Immutable once built; timestamps are nanoseconds since the
/// Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub client_id: String,
    pub sent_at: i64,
    pub expiry: i64,
    pub multi: bool,
    pub payload: Payload,
}

/// A server's bid to handle a request, weighted by affinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEnvelope {
    pub request_id: String,
    pub server_id: String,
    pub affinity: f32,
}

/// The client's election message naming the one server that won a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionEnvelope {
    pub request_id: String,
    pub server_id: String,
}

/// A server's answer: a payload on success, an error body otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub server_id: String,
    pub payload: Option<Payload>,
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

impl ResponseEnvelope {
    pub fn ok(request_id: impl Into<String>, server_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            request_id: request_id.into(),
            server_id: server_id.into(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(
        request_id: impl Into<String>,
        server_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            server_id: server_id.into(),
            payload: None,
            error: Some(ResponseError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

// Frame codec used for everything that crosses the bus.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes> {
    let data = serde_json::to_vec(value).map_err(Error::Encode)?;
    Ok(Bytes::from(data))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    serde_json::from_slice(frame).map_err(Error::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        text: String,
    }

    impl Packet for Ping {
        const SCHEMA: &'static str = "test.Ping";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pong {
        text: String,
    }

    impl Packet for Pong {
        const SCHEMA: &'static str = "test.Pong";
    }

    #[test]
    fn payload_round_trip() {
        let message = Ping {
            text: "round trip".into(),
        };
        let payload = Payload::pack(&message).expect("pack");
        assert_eq!(payload.schema(), "test.Ping");
        let restored: Ping = payload.unpack().expect("unpack");
        assert_eq!(restored, message);
    }

    #[test]
    fn unpack_rejects_schema_mismatch() {
        let payload = Payload::pack(&Ping {
            text: "typed".into(),
        })
        .expect("pack");
        let err = payload.unpack::<Pong>().expect_err("mismatch");
        match err {
            Error::SchemaMismatch { expected, found } => {
                assert_eq!(expected, "test.Pong");
                assert_eq!(found, "test.Ping");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn request_envelope_round_trip() {
        let envelope = RequestEnvelope {
            request_id: "REQ_1".into(),
            client_id: "client-a".into(),
            sent_at: 1_000,
            expiry: 2_000,
            multi: false,
            payload: Payload::pack(&Ping {
                text: "enveloped".into(),
            })
            .expect("pack"),
        };
        let frame = encode(&envelope).expect("encode");
        let restored: RequestEnvelope = decode(&frame).expect("decode");
        assert_eq!(restored, envelope);
    }

    #[test]
    fn claim_envelope_round_trip() {
        let claim = ClaimEnvelope {
            request_id: "REQ_2".into(),
            server_id: "server-b".into(),
            affinity: 0.75,
        };
        let frame = encode(&claim).expect("encode");
        let restored: ClaimEnvelope = decode(&frame).expect("decode");
        assert_eq!(restored, claim);
    }

    #[test]
    fn election_envelope_round_trip() {
        let election = ElectionEnvelope {
            request_id: "REQ_5".into(),
            server_id: "server-d".into(),
        };
        let frame = encode(&election).expect("encode");
        let restored: ElectionEnvelope = decode(&frame).expect("decode");
        assert_eq!(restored, election);
    }

    #[test]
    fn response_envelope_ok_round_trip() {
        let envelope = ResponseEnvelope::ok(
            "REQ_4",
            "server-c",
            Payload::pack(&Pong {
                text: "done".into(),
            })
            .expect("pack"),
        );
        let frame = encode(&envelope).expect("encode");
        let restored: ResponseEnvelope = decode(&frame).expect("decode");
        assert_eq!(restored, envelope);
        let pong: Pong = restored.payload.expect("payload").unpack().expect("unpack");
        assert_eq!(pong.text, "done");
    }

    #[test]
    fn response_envelope_error_body() {
        let envelope = ResponseEnvelope::error("REQ_3", "server-c", "not_found", "no such row");
        let frame = encode(&envelope).expect("encode");
        let restored: ResponseEnvelope = decode(&frame).expect("decode");
        assert!(restored.payload.is_none());
        let error = restored.error.expect("error body");
        assert_eq!(error.code, "not_found");
        assert_eq!(error.message, "no such row");
    }
}
