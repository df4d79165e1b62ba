//! Peer sessions
//!
//! A session owns the framed conversation with one peer and runs the
//! role-specific handshake on top of it. Both roles expose the same
//! [`Session`] capability set so the coordinator never depends on which one
//! it is driving.

mod client;
mod server;

use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, trace, warn};

pub use client::ClientSession;
pub use server::ServerSession;

use crate::error::Error;
use crate::frame::{encode_frame, FramedChannel};
use crate::protocol::Command;
use crate::transport::{LinkId, SocketErrorKind, Transport, TransportEvent};

/// Pong value reported when no ping was outstanding
pub const UNSOLICITED_PONG: i64 = -1;

/// Which side of the conversation a session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Joiner,
}

/// Why a server could not be created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    /// The session is already listening
    Exists,
    /// Binding the listener failed
    Listen,
}

/// Why a join failed, or why an established join ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinFailure {
    /// The server did not complete the welcome handshake
    Untrusted,
    Closed,
    NotFound,
    Refused,
    Unknown,
}

impl From<SocketErrorKind> for JoinFailure {
    fn from(kind: SocketErrorKind) -> Self {
        match kind {
            SocketErrorKind::RemoteClosed => JoinFailure::Closed,
            SocketErrorKind::HostNotFound => JoinFailure::NotFound,
            SocketErrorKind::ConnectionRefused => JoinFailure::Refused,
            SocketErrorKind::Other => JoinFailure::Unknown,
        }
    }
}

/// Something a session wants its owner to know
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Server listener is bound
    Listening { addr: std::net::SocketAddr },
    CreateFailed(CreateFailure),
    /// Server listener was closed after a local `close()`
    ListenerClosed,
    /// Joining peer completed the handshake
    PeerConnected { name: String },
    /// Joining peer went away; `name` is unset if it never sent one
    PeerDisconnected { name: Option<String> },
    /// Client was welcomed by the host
    Joined { peer_name: String },
    JoinFailed(JoinFailure),
    /// Client connection closed after a local `close()`
    Left,
    ChatReceived(String),
    ChatSent,
    /// Chat was requested before the handshake completed
    NotConnected,
    /// Chat text does not fit in a frame
    MessageTooLarge,
    /// Round-trip time in milliseconds, or [`UNSOLICITED_PONG`]
    Pong(i64),
}

/// Capability set shared by both roles
pub trait Session: Send {
    fn role(&self) -> Role;

    /// Send user chat text to the peer
    fn send_chat(&mut self, text: &str, net: &mut dyn Transport) -> Vec<SessionEvent>;

    /// Start a round-trip measurement
    fn ping(&mut self, net: &mut dyn Transport) -> Vec<SessionEvent>;

    /// Cooperative close; completion is reported when the transport confirms it
    fn close(&mut self, net: &mut dyn Transport) -> Vec<SessionEvent>;

    /// Release every transport resource right away, without reporting
    fn shutdown(&mut self, net: &mut dyn Transport);

    /// React to a transport notification
    fn handle(&mut self, event: TransportEvent, net: &mut dyn Transport) -> Vec<SessionEvent>;
}

/// One live connection and its decoder
#[derive(Debug)]
struct Link {
    id: LinkId,
    channel: FramedChannel,
}

impl Link {
    fn new(id: LinkId) -> Self {
        Self {
            id,
            channel: FramedChannel::new(),
        }
    }

    /// Encode and queue a command
    fn send(&self, cmd: &Command, net: &mut dyn Transport) -> Result<(), Error> {
        let frame: Bytes = encode_frame(&cmd.to_payload())?;
        trace!(link = self.id, verb = %cmd.verb, internal = !cmd.verb.is_chat(), "Sending");
        net.send(self.id, frame);
        Ok(())
    }

    /// Queue an internal control command; these are always tiny
    fn send_internal(&self, cmd: &Command, net: &mut dyn Transport) {
        if let Err(e) = self.send(cmd, net) {
            warn!(link = self.id, error = %e, "Failed to encode control message");
        }
    }

    /// Feed bytes and decode every complete command, in arrival order
    ///
    /// Decoding stops at the first undecodable frame, which is returned last.
    fn receive(&mut self, bytes: &[u8]) -> Vec<Result<Command, Error>> {
        self.channel.push(bytes);
        let mut commands = Vec::new();
        for payload in self.channel.payloads() {
            let failed = payload.is_err();
            commands.push(payload.map(|p| Command::parse(&p)));
            if failed {
                break;
            }
        }
        trace!(
            link = self.id,
            decoded = commands.len(),
            pending = self.channel.buffered(),
            "Received"
        );
        commands
    }
}

/// Outstanding round-trip measurement
#[derive(Debug, Default)]
struct PingClock {
    started: Option<Instant>,
}

impl PingClock {
    fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Elapsed milliseconds for the pending ping, or [`UNSOLICITED_PONG`]
    fn finish(&mut self) -> i64 {
        match self.started.take() {
            Some(started) => started.elapsed().as_millis() as i64,
            None => {
                debug!("Pong without outstanding ping");
                UNSOLICITED_PONG
            }
        }
    }

    fn clear(&mut self) {
        self.started = None;
    }
}
