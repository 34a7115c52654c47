//! Declarative record definitions composed from the type codec, and a
//! tagged-union `Handler` dispatching on a message's type byte.
//!
//! The upstream protocol generates these put/get pairs and the dispatch
//! table with token-pasting macros over a field-list descriptor. Rust
//! already has sum types and generics for this: each schema variant is a
//! plain struct implementing [`Record`], and [`Handler`] dispatches with
//! an exhaustive `match` on the variant's type byte rather than any
//! macro or code-generation step.

use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;

/// A schema variant: a declarative field list whose encode/decode is a
/// straight sequence of type-codec calls in field order.
pub trait Record: Sized {
    /// The message type byte this record is dispatched under.
    const TYPE: u8;

    fn put(&self, message: &mut Message) -> Result<()>;
    fn get(message: &mut Message) -> Result<Self>;
}

/// Request to open a database by path.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub path: String,
}

impl Record for OpenRequest {
    const TYPE: u8 = 1;

    fn put(&self, message: &mut Message) -> Result<()> {
        message
            .body_put_text(&self.path)
            .map_err(|e| e.context("path"))
    }

    fn get(message: &mut Message) -> Result<Self> {
        let path = message.body_get_text().map_err(|e| e.context("path"))?;
        Ok(Self { path })
    }
}

/// Request to prepare and run one statement with its bind parameters
/// already framed in the message body (consumed directly by
/// `crate::statement::bind`, not by this record).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecRequest {
    pub sql: String,
}

impl Record for ExecRequest {
    const TYPE: u8 = 2;

    fn put(&self, message: &mut Message) -> Result<()> {
        message
            .body_put_text(&self.sql)
            .map_err(|e| e.context("sql"))
    }

    fn get(message: &mut Message) -> Result<Self> {
        let sql = message.body_get_text().map_err(|e| e.context("sql"))?;
        Ok(Self { sql })
    }
}

/// A plain acknowledgement response carrying a row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckResponse {
    pub rows_affected: u64,
}

impl Record for AckResponse {
    const TYPE: u8 = 3;

    fn put(&self, message: &mut Message) -> Result<()> {
        message
            .body_put_uint64(self.rows_affected)
            .map_err(|e| e.context("rows_affected"))
    }

    fn get(message: &mut Message) -> Result<Self> {
        let rows_affected = message
            .body_get_uint64()
            .map_err(|e| e.context("rows_affected"))?;
        Ok(Self { rows_affected })
    }
}

/// A closed tagged union over the request/response variants this crate
/// defines. Dispatch is by the message header's type byte; an unknown
/// type is a protocol error, not a panic.
#[derive(Debug, Clone, PartialEq)]
pub enum Handler {
    Open(OpenRequest),
    Exec(ExecRequest),
    Ack(AckResponse),
}

impl Handler {
    /// Stamp the header with the variant's type and encode it into
    /// `message`.
    pub fn put(&self, message: &mut Message) -> Result<()> {
        let (ty, result) = match self {
            Handler::Open(v) => (OpenRequest::TYPE, v.put(message)),
            Handler::Exec(v) => (ExecRequest::TYPE, v.put(message)),
            Handler::Ack(v) => (AckResponse::TYPE, v.put(message)),
        };
        message.header_put(ty, 0);
        result
    }

    /// Decode a handler whose header's type byte has already been read
    /// by the caller and passed in as `msg_type`.
    pub fn get(msg_type: u8, message: &mut Message) -> Result<Self> {
        match msg_type {
            OpenRequest::TYPE => Ok(Handler::Open(OpenRequest::get(message)?)),
            ExecRequest::TYPE => Ok(Handler::Exec(ExecRequest::get(message)?)),
            AckResponse::TYPE => Ok(Handler::Ack(AckResponse::get(message)?)),
            other => Err(Error::new(
                ErrorKind::Proto,
                format!("unknown message type {}", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_request_round_trips() {
        let req = OpenRequest {
            path: "test.db".to_string(),
        };
        let mut message = Message::new();
        req.put(&mut message).unwrap();
        message.finish();
        let bytes = message.encoded_body();
        let mut reader = Message::decode(0, 0, message.words(), &bytes).unwrap();
        assert_eq!(OpenRequest::get(&mut reader).unwrap(), req);
    }

    #[test]
    fn handler_dispatches_by_type_byte() {
        let handler = Handler::Ack(AckResponse { rows_affected: 7 });
        let mut message = Message::new();
        handler.put(&mut message).unwrap();
        message.finish();
        assert_eq!(message.msg_type(), AckResponse::TYPE);
        let bytes = message.encoded_body();
        let mut reader = Message::decode(message.msg_type(), message.flags(), message.words(), &bytes)
            .unwrap();
        let decoded = Handler::get(message.msg_type(), &mut reader).unwrap();
        assert_eq!(decoded, handler);
    }

    #[test]
    fn unknown_type_byte_is_a_protocol_error() {
        let mut message = Message::with_header(99, 0, 0);
        let err = Handler::get(99, &mut message).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Proto);
    }
}
