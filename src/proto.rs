//! Wire framing for control messages and responses.
//!
//! Every message on the control socket is exactly one line of ASCII text
//! terminated by `\n`. A control message is a single code character
//! immediately followed by an optional argument; a response is either a
//! plain or port-bearing acknowledgement, or an error carrying a one-line
//! human-readable reason.
//!
//! See <https://github.com/jk977/simple-ftp> for the protocol this crate
//! reimplements.
#![deny(missing_docs)]
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use std::fmt;
use std::io::prelude::*;

use crate::command::Kind;
use crate::lineio::{read_line, write_line};

/// The control port the server listens on by default.
pub const CONTROL_PORT: u16 = 49999;

/// Listen backlog used by the connection acceptor.
pub const LISTEN_BACKLOG: i32 = 4;

/// A protocol-layer failure: a malformed control message or response, an
/// unexpected EOF where a response was expected, or similar.
#[derive(Debug, Clone)]
pub struct ProtocolError(String);

impl ProtocolError {
    /// Build a protocol error with the given description.
    pub fn new<S: Into<String>>(s: S) -> Self {
        ProtocolError(s.into())
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol error: {}", self.0)
    }
}

impl std::error::Error for ProtocolError {}

/// A control message: a wire code plus an optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    /// The command kind this message carries.
    pub kind: Kind,
    /// The argument, if the kind requires one.
    pub arg: Option<String>,
}

impl ControlMessage {
    /// Build a control message for `kind` with no argument.
    pub fn new(kind: Kind) -> Self {
        Self { kind, arg: None }
    }

    /// Build a control message for `kind` carrying `arg`.
    pub fn with_arg(kind: Kind, arg: impl Into<String>) -> Self {
        Self { kind, arg: Some(arg.into()) }
    }

    /// Write this message as `<code><argument?>\n`.
    pub fn write<W: Write>(&self, dst: &mut W) -> Result<()> {
        let code = self
            .kind
            .wire_code()
            .ok_or_else(|| ProtocolError::new(format!("{:?} has no wire code", self.kind)))?;
        let mut line = String::new();
        line.push(code);
        if let Some(arg) = &self.arg {
            line.push_str(arg);
        }
        write_line(dst, line.as_bytes()).wrap_err("writing control message")?;
        Ok(())
    }

    /// Read a control message from `src`.
    ///
    /// A zero-length line (the EOF response) is returned as `Ok(None)` so
    /// callers can distinguish a graceful close from a malformed message.
    pub fn read<R: Read>(src: &mut R) -> Result<Option<Self>> {
        let mut buf = Vec::new();
        let n = read_line(src, &mut buf).wrap_err("reading control message")?;
        if n == 0 {
            return Ok(None);
        }
        let line = std::str::from_utf8(&buf[..n])
            .wrap_err_with(|| ProtocolError::new("control message is not valid UTF-8"))?;
        let mut chars = line.chars();
        let code = chars
            .next()
            .ok_or_else(|| ProtocolError::new("empty control message"))?;
        let kind = Kind::from_wire_code(code)
            .ok_or_else(|| ProtocolError::new(format!("unrecognized wire code {code:?}")))?;
        let rest: String = chars.collect();
        let arg = if rest.is_empty() { None } else { Some(rest) };
        Ok(Some(Self { kind, arg }))
    }
}

/// A response on the control socket: a plain or port-bearing acknowledgement,
/// or an error with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `A\n` - a plain acknowledgement.
    Ack,
    /// `A<port>\n` - acknowledgement carrying the server's ephemeral data
    /// port. Sent only in reply to the `Data` control message.
    AckPort(u16),
    /// `E<reason>\n` - an error with a single-line, human-readable reason.
    Error(String),
}

impl Response {
    /// Write this response.
    pub fn write<W: Write>(&self, dst: &mut W) -> Result<()> {
        let line = match self {
            Response::Ack => "A".to_string(),
            Response::AckPort(port) => format!("A{port}"),
            Response::Error(reason) => format!("E{reason}"),
        };
        write_line(dst, line.as_bytes()).wrap_err("writing response")?;
        Ok(())
    }

    /// Read a response from `src`.
    ///
    /// The EOF response (an empty read, i.e. the peer closed the socket
    /// before sending anything) is always a protocol error here: unlike a
    /// control message, a response is always expected once a request has
    /// been sent, so there is no graceful interpretation of EOF.
    pub fn read<R: Read>(src: &mut R) -> Result<Self> {
        let mut buf = Vec::new();
        let n = read_line(src, &mut buf).wrap_err("reading response")?;
        if n == 0 {
            bail!(ProtocolError::new("unexpected EOF waiting for response"));
        }
        let line = std::str::from_utf8(&buf[..n])
            .wrap_err_with(|| ProtocolError::new("response is not valid UTF-8"))?;
        let mut chars = line.chars();
        match chars.next() {
            Some('A') => {
                let rest: String = chars.collect();
                if rest.is_empty() {
                    Ok(Response::Ack)
                } else {
                    let port: u16 = rest.parse().wrap_err_with(|| {
                        ProtocolError::new(format!("malformed ack port {rest:?}"))
                    })?;
                    Ok(Response::AckPort(port))
                }
            }
            Some('E') => Ok(Response::Error(chars.collect())),
            Some(other) => bail!(ProtocolError::new(format!(
                "unrecognized response kind {other:?}"
            ))),
            None => bail!(ProtocolError::new("empty response line")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn control_message_round_trips() {
        let msg = ControlMessage::with_arg(Kind::Get, "report.txt");
        let mut buf = Vec::new();
        msg.write(&mut buf).unwrap();
        assert_eq!(buf, b"Greport.txt\n");
        let mut src = Cursor::new(buf);
        let read_back = ControlMessage::read(&mut src).unwrap().unwrap();
        assert_eq!(read_back, msg);
    }

    #[test]
    fn control_message_without_argument() {
        let msg = ControlMessage::new(Kind::Exit);
        let mut buf = Vec::new();
        msg.write(&mut buf).unwrap();
        assert_eq!(buf, b"Q\n");
    }

    #[test]
    fn control_message_eof_is_none() {
        let mut src = Cursor::new(Vec::new());
        assert!(ControlMessage::read(&mut src).unwrap().is_none());
    }

    #[test]
    fn ack_round_trips() {
        let mut buf = Vec::new();
        Response::Ack.write(&mut buf).unwrap();
        assert_eq!(buf, b"A\n");
        let mut src = Cursor::new(buf);
        assert_eq!(Response::read(&mut src).unwrap(), Response::Ack);
    }

    #[test]
    fn ack_port_round_trips() {
        let mut buf = Vec::new();
        Response::AckPort(53921).write(&mut buf).unwrap();
        assert_eq!(buf, b"A53921\n");
        let mut src = Cursor::new(buf);
        assert_eq!(Response::read(&mut src).unwrap(), Response::AckPort(53921));
    }

    #[test]
    fn error_round_trips() {
        let mut buf = Vec::new();
        Response::Error("no such file".to_string()).write(&mut buf).unwrap();
        assert_eq!(buf, b"Eno such file\n");
        let mut src = Cursor::new(buf);
        assert_eq!(
            Response::read(&mut src).unwrap(),
            Response::Error("no such file".to_string())
        );
    }

    #[test]
    fn response_eof_is_error() {
        let mut src = Cursor::new(Vec::new());
        assert!(Response::read(&mut src).is_err());
    }

    #[test]
    fn response_with_bad_kind_is_error() {
        let mut src = Cursor::new(b"Zwhatever\n".to_vec());
        assert!(Response::read(&mut src).is_err());
    }
}
