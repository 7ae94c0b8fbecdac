//! The closed vocabulary of user-level commands: their names, argument
//! shape, and (for remote commands) their single-character wire code.
#![deny(missing_docs)]
use std::fmt;

/// A parsed user command: its kind plus an optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Which command this is.
    pub kind: Kind,
    /// The argument text, if the kind requires one.
    pub arg: Option<String>,
}

/// The closed set of command kinds, user-visible plus the internal `Data`
/// handshake kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `exit` - graceful shutdown of the session.
    Exit,
    /// `cd PATH` - change the client's local working directory.
    Cd,
    /// `rcd PATH` - change the server's working directory.
    Rcd,
    /// `ls` - list the client's local working directory.
    Ls,
    /// `rls` - list the server's working directory.
    Rls,
    /// `get PATH` - fetch a file from the server into the client's cwd.
    Get,
    /// `show PATH` - fetch a file from the server and page it.
    Show,
    /// `put PATH` - send a local file to the server's cwd.
    Put,
    /// internal: open the data channel ahead of a data-bearing command.
    Data,
}

impl Kind {
    /// Does this kind require a non-empty argument?
    pub fn has_argument(self) -> bool {
        matches!(self, Kind::Cd | Kind::Rcd | Kind::Get | Kind::Show | Kind::Put)
    }

    /// Is this kind executed purely on the client, with no control traffic?
    pub fn is_local(self) -> bool {
        matches!(self, Kind::Cd | Kind::Ls)
    }

    /// Does this kind cross the wire to the server? The complement of
    /// [`Kind::is_local`].
    pub fn is_remote(self) -> bool {
        !self.is_local()
    }

    /// Does this kind open and use a data connection?
    pub fn needs_data(self) -> bool {
        matches!(self, Kind::Rls | Kind::Get | Kind::Show | Kind::Put)
    }

    /// The single-character wire code for this kind, or `None` for local
    /// kinds which never cross the wire.
    pub fn wire_code(self) -> Option<char> {
        match self {
            Kind::Exit => Some('Q'),
            Kind::Rcd => Some('C'),
            Kind::Rls => Some('L'),
            Kind::Get => Some('G'),
            Kind::Show => Some('S'),
            Kind::Put => Some('P'),
            Kind::Data => Some('D'),
            Kind::Cd | Kind::Ls => None,
        }
    }

    /// Look up the kind for a wire code, if any kind is assigned to it.
    pub fn from_wire_code(code: char) -> Option<Kind> {
        match code {
            'Q' => Some(Kind::Exit),
            'C' => Some(Kind::Rcd),
            'L' => Some(Kind::Rls),
            'G' => Some(Kind::Get),
            'S' => Some(Kind::Show),
            'P' => Some(Kind::Put),
            'D' => Some(Kind::Data),
            _ => None,
        }
    }

    /// The user-typed name for this kind, or `None` for the internal `Data`
    /// kind (which a user never types).
    pub fn user_name(self) -> Option<&'static str> {
        match self {
            Kind::Exit => Some("exit"),
            Kind::Cd => Some("cd"),
            Kind::Rcd => Some("rcd"),
            Kind::Ls => Some("ls"),
            Kind::Rls => Some("rls"),
            Kind::Get => Some("get"),
            Kind::Show => Some("show"),
            Kind::Put => Some("put"),
            Kind::Data => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_name().unwrap_or("<data>"))
    }
}

/// A user input line failed to parse into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first word didn't match any known command name.
    Unrecognized(String),
    /// The command requires an argument but none was given.
    MissingArgument(Kind),
    /// The command forbids an argument but one was given.
    UnexpectedArgument(Kind),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Unrecognized(word) => write!(f, "Unrecognized command: {word}"),
            ParseError::MissingArgument(kind) => write!(f, "{kind} requires an argument"),
            ParseError::UnexpectedArgument(kind) => write!(f, "{kind} takes no argument"),
        }
    }
}

impl std::error::Error for ParseError {}

const ALL_USER_KINDS: &[Kind] = &[
    Kind::Exit,
    Kind::Cd,
    Kind::Rcd,
    Kind::Ls,
    Kind::Rls,
    Kind::Get,
    Kind::Show,
    Kind::Put,
];

/// Parse a raw user input line into a [`Command`].
///
/// The first whitespace-delimited word selects the kind by an exact match
/// against the user-name table; the remainder of the line, trimmed on the
/// left, is the argument if non-empty. `line` should already have any
/// trailing newline stripped.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim_start();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim_start()),
        None => (line, ""),
    };

    let kind = ALL_USER_KINDS
        .iter()
        .copied()
        .find(|k| k.user_name() == Some(word))
        .ok_or_else(|| ParseError::Unrecognized(word.to_string()))?;

    let arg = if rest.is_empty() { None } else { Some(rest.to_string()) };

    match (kind.has_argument(), &arg) {
        (true, None) => Err(ParseError::MissingArgument(kind)),
        (false, Some(_)) => Err(ParseError::UnexpectedArgument(kind)),
        _ => Ok(Command { kind, arg }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_no_argument_commands() {
        assert_eq!(parse("exit").unwrap(), Command { kind: Kind::Exit, arg: None });
        assert_eq!(parse("ls").unwrap(), Command { kind: Kind::Ls, arg: None });
        assert_eq!(parse("rls").unwrap(), Command { kind: Kind::Rls, arg: None });
    }

    #[test]
    fn parses_argument_commands() {
        let cmd = parse("get foo.txt").unwrap();
        assert_eq!(cmd.kind, Kind::Get);
        assert_eq!(cmd.arg.as_deref(), Some("foo.txt"));
    }

    #[test]
    fn trims_extra_whitespace_around_argument() {
        let cmd = parse("cd    /tmp/some dir  ").unwrap();
        assert_eq!(cmd.arg.as_deref(), Some("/tmp/some dir  "));
    }

    #[test]
    fn rejects_unknown_command() {
        assert_eq!(parse("frobnicate").unwrap_err(), ParseError::Unrecognized("frobnicate".to_string()));
    }

    #[test]
    fn rejects_missing_argument() {
        assert_eq!(parse("get").unwrap_err(), ParseError::MissingArgument(Kind::Get));
    }

    #[test]
    fn rejects_unexpected_argument() {
        assert_eq!(parse("exit now").unwrap_err(), ParseError::UnexpectedArgument(Kind::Exit));
    }

    #[test]
    fn wire_codes_are_unique_and_round_trip() {
        let mut seen = std::collections::HashSet::new();
        for kind in ALL_USER_KINDS.iter().copied().chain([Kind::Data]) {
            if let Some(code) = kind.wire_code() {
                assert!(seen.insert(code), "duplicate wire code {code}");
                assert_eq!(Kind::from_wire_code(code), Some(kind));
            }
        }
    }

    #[test]
    fn has_argument_matches_wire_table() {
        for kind in ALL_USER_KINDS.iter().copied() {
            let expected = matches!(kind, Kind::Cd | Kind::Rcd | Kind::Get | Kind::Show | Kind::Put);
            assert_eq!(kind.has_argument(), expected);
        }
    }

    #[test]
    fn unknown_wire_code_is_none() {
        assert_eq!(Kind::from_wire_code('Z'), None);
    }

    #[test]
    fn is_remote_is_exactly_not_local() {
        for kind in ALL_USER_KINDS.iter().copied().chain([Kind::Data]) {
            assert_eq!(kind.is_remote(), !kind.is_local());
        }
    }
}
