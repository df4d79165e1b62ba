//! Text command grammar carried inside frames
//!
//! A payload is `<verb>(" " <arg>)*`. Arguments are split on single spaces,
//! so joining them back with one space reproduces the sent text exactly.

use std::fmt;

/// Known command verbs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// Client authentication attempt (0 or 1 args)
    Password,
    /// Handshake name exchange (1 arg)
    Username,
    /// Chat text from host to joiner
    ServerMessage,
    /// Chat text from joiner to host
    ClientMessage,
    Ping,
    Pong,
    /// Anything else; discarded by both roles
    Unknown(String),
}

impl Verb {
    pub fn as_str(&self) -> &str {
        match self {
            Verb::Password => "password",
            Verb::Username => "username",
            Verb::ServerMessage => "servermessage",
            Verb::ClientMessage => "clientmessage",
            Verb::Ping => "ping",
            Verb::Pong => "pong",
            Verb::Unknown(s) => s,
        }
    }

    /// Whether the verb wraps user-visible chat text (everything else is internal)
    pub fn is_chat(&self) -> bool {
        matches!(self, Verb::ServerMessage | Verb::ClientMessage)
    }
}

impl From<&str> for Verb {
    fn from(s: &str) -> Self {
        match s {
            "password" => Verb::Password,
            "username" => Verb::Username,
            "servermessage" => Verb::ServerMessage,
            "clientmessage" => Verb::ClientMessage,
            "ping" => Verb::Ping,
            "pong" => Verb::Pong,
            other => Verb::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub args: Vec<String>,
}

impl Command {
    /// Parse a payload. Never fails: unknown verbs are kept as [`Verb::Unknown`].
    pub fn parse(payload: &str) -> Self {
        let mut parts = payload.split(' ');
        let verb = Verb::from(parts.next().unwrap_or_default());
        let args = parts.map(str::to_string).collect();
        Self { verb, args }
    }

    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            args: Vec::new(),
        }
    }

    /// Build a command whose single logical argument is free text
    pub fn with_text(verb: Verb, text: &str) -> Self {
        Self {
            verb,
            args: text.split(' ').map(str::to_string).collect(),
        }
    }

    pub fn password(password: &str) -> Self {
        if password.is_empty() {
            Self::new(Verb::Password)
        } else {
            Self::with_text(Verb::Password, password)
        }
    }

    pub fn username(name: &str) -> Self {
        Self::with_text(Verb::Username, name)
    }

    pub fn ping() -> Self {
        Self::new(Verb::Ping)
    }

    pub fn pong() -> Self {
        Self::new(Verb::Pong)
    }

    /// Everything after the verb, i.e. the chat text of a message command
    pub fn text(&self) -> String {
        self.args.join(" ")
    }

    /// The single argument, if exactly one was given
    pub fn single_arg(&self) -> Option<&str> {
        match self.args.as_slice() {
            [arg] => Some(arg),
            _ => None,
        }
    }

    /// Render back into a frame payload
    pub fn to_payload(&self) -> String {
        if self.args.is_empty() {
            self.verb.as_str().to_string()
        } else {
            format!("{} {}", self.verb, self.args.join(" "))
        }
    }
}
