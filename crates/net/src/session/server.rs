//! Host side of a conversation
//!
//! Listens for one joining peer at a time and gates it behind a password.
//! A later inbound connection replaces the current one.

use tracing::{debug, info, warn};

use super::{CreateFailure, Link, PingClock, Role, Session, SessionEvent};
use crate::protocol::{Command, Verb};
use crate::transport::{LinkId, Transport, TransportEvent};

/// Host session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No listener; `create()` may be called
    Unbound,
    /// Listener bound, no peer
    Listening,
    /// Peer connected, waiting for `password`
    AwaitingAuth,
    /// Password accepted, waiting for the peer's `username`
    Authenticated,
    /// Handshake complete; chat allowed
    Ready,
    /// Peer is being dropped; inbound traffic is ignored until it is gone
    Closed,
}

/// Host session
pub struct ServerSession {
    password: String,
    player_name: String,
    state: ServerState,
    link: Option<Link>,
    peer_name: Option<String>,
    ping: PingClock,
    closing_by_us: bool,
}

impl ServerSession {
    pub fn new(player_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            player_name: player_name.into(),
            state: ServerState::Unbound,
            link: None,
            peer_name: None,
            ping: PingClock::default(),
            closing_by_us: false,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    /// Bind the listener. Fails without retrying if already bound or if
    /// the bind itself fails.
    pub fn create(&mut self, net: &mut dyn Transport) -> Vec<SessionEvent> {
        if self.state != ServerState::Unbound {
            return vec![SessionEvent::CreateFailed(CreateFailure::Exists)];
        }

        match net.listen() {
            Ok(addr) => {
                info!(addr = %addr, player = %self.player_name, "Server created");
                self.state = ServerState::Listening;
                self.closing_by_us = false;
                vec![SessionEvent::Listening { addr }]
            }
            Err(e) => {
                warn!(error = %e, "Could not start server");
                vec![SessionEvent::CreateFailed(CreateFailure::Listen)]
            }
        }
    }

    fn accepts(&self, cmd: &Command) -> bool {
        match cmd.args.as_slice() {
            [] => self.password.is_empty(),
            [given] => !self.password.is_empty() && *given == self.password,
            _ => false,
        }
    }

    fn on_accepted(&mut self, link: LinkId, net: &mut dyn Transport) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if self.state == ServerState::Unbound {
            debug!(link, "Connection without listener, dropping");
            net.disconnect(link);
            return events;
        }

        if let Some(old) = self.link.take() {
            debug!(old = old.id, new = link, "New peer supersedes current one");
            net.disconnect(old.id);
            if self.state == ServerState::Ready {
                events.push(SessionEvent::PeerDisconnected {
                    name: self.peer_name.take(),
                });
            }
        }

        self.link = Some(Link::new(link));
        self.peer_name = None;
        self.ping.clear();
        self.state = ServerState::AwaitingAuth;
        events
    }

    fn on_disconnected(&mut self, net: &mut dyn Transport) -> Vec<SessionEvent> {
        debug!("Peer disconnected on server side");
        self.link = None;
        self.ping.clear();
        let mut events = vec![SessionEvent::PeerDisconnected {
            name: self.peer_name.take(),
        }];

        if self.closing_by_us {
            net.close_listener();
            self.closing_by_us = false;
            self.state = ServerState::Unbound;
            events.push(SessionEvent::ListenerClosed);
        } else {
            self.state = ServerState::Listening;
        }
        events
    }

    /// Drop the current peer without waiting for anything further from it
    fn reject(&mut self, net: &mut dyn Transport) {
        if let Some(link) = &self.link {
            net.disconnect(link.id);
        }
        self.state = ServerState::Closed;
    }

    fn dispatch(&mut self, cmd: Command, net: &mut dyn Transport) -> Vec<SessionEvent> {
        let Some(link) = &self.link else {
            return Vec::new();
        };

        match self.state {
            ServerState::AwaitingAuth => {
                if cmd.verb == Verb::Password && self.accepts(&cmd) {
                    info!(link = link.id, "Client authenticated, sending username");
                    self.state = ServerState::Authenticated;
                    link.send_internal(&Command::username(&self.player_name), net);
                } else {
                    info!(link = link.id, verb = %cmd.verb, "Authentication failure, disconnecting");
                    self.reject(net);
                }
                Vec::new()
            }
            ServerState::Authenticated | ServerState::Ready => match cmd.verb {
                Verb::Username if self.state == ServerState::Authenticated => {
                    match cmd.single_arg() {
                        Some(name) => {
                            info!(peer = %name, "Peer joined server");
                            self.peer_name = Some(name.to_string());
                            self.state = ServerState::Ready;
                            vec![SessionEvent::PeerConnected {
                                name: name.to_string(),
                            }]
                        }
                        None => {
                            debug!(args = cmd.args.len(), "Malformed username ignored");
                            Vec::new()
                        }
                    }
                }
                Verb::ClientMessage => vec![SessionEvent::ChatReceived(cmd.text())],
                Verb::Ping => {
                    link.send_internal(&Command::pong(), net);
                    Vec::new()
                }
                Verb::Pong => vec![SessionEvent::Pong(self.ping.finish())],
                _ => {
                    debug!(verb = %cmd.verb, "Discarding message");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }
}

impl Session for ServerSession {
    fn role(&self) -> Role {
        Role::Host
    }

    fn send_chat(&mut self, text: &str, net: &mut dyn Transport) -> Vec<SessionEvent> {
        let link = match &self.link {
            Some(link) if self.state == ServerState::Ready => link,
            _ => return vec![SessionEvent::NotConnected],
        };

        match link.send(&Command::with_text(Verb::ServerMessage, text), net) {
            Ok(()) => vec![SessionEvent::ChatSent],
            Err(e) => {
                warn!(error = %e, "Chat message not sent");
                vec![SessionEvent::MessageTooLarge]
            }
        }
    }

    fn ping(&mut self, net: &mut dyn Transport) -> Vec<SessionEvent> {
        match &self.link {
            // The joiner expects our username before anything else
            Some(link)
                if matches!(
                    self.state,
                    ServerState::Authenticated | ServerState::Ready
                ) =>
            {
                self.ping.start();
                link.send_internal(&Command::ping(), net);
            }
            _ => debug!("Ping without peer ignored"),
        }
        Vec::new()
    }

    fn close(&mut self, net: &mut dyn Transport) -> Vec<SessionEvent> {
        match &self.link {
            Some(link) => {
                self.closing_by_us = true;
                net.disconnect(link.id);
                Vec::new()
            }
            None if self.state != ServerState::Unbound => {
                net.close_listener();
                self.state = ServerState::Unbound;
                vec![SessionEvent::ListenerClosed]
            }
            None => Vec::new(),
        }
    }

    fn shutdown(&mut self, net: &mut dyn Transport) {
        if let Some(link) = self.link.take() {
            net.disconnect(link.id);
        }
        if self.state != ServerState::Unbound {
            net.close_listener();
        }
        self.state = ServerState::Unbound;
        self.peer_name = None;
        self.ping.clear();
        self.closing_by_us = false;
    }

    fn handle(&mut self, event: TransportEvent, net: &mut dyn Transport) -> Vec<SessionEvent> {
        if let TransportEvent::Accepted { link, peer } = event {
            debug!(link, peer = %peer, "Inbound connection");
            return self.on_accepted(link, net);
        }

        if self.link.as_ref().map(|l| l.id) != Some(event.link()) {
            return Vec::new();
        }

        match event {
            TransportEvent::Data { bytes, .. } => {
                let decoded = match self.link.as_mut() {
                    Some(link) => link.receive(&bytes),
                    None => return Vec::new(),
                };

                let mut events = Vec::new();
                for cmd in decoded {
                    if matches!(self.state, ServerState::Closed) {
                        break;
                    }
                    match cmd {
                        Ok(cmd) => events.extend(self.dispatch(cmd, net)),
                        Err(e) => {
                            warn!(error = %e, "Undecodable frame from peer");
                            self.reject(net);
                        }
                    }
                }
                events
            }
            TransportEvent::Failed { kind, .. } => {
                debug!(?kind, "Peer link failed");
                Vec::new()
            }
            TransportEvent::Disconnected { .. } => self.on_disconnected(net),
            TransportEvent::Accepted { .. } | TransportEvent::Connected { .. } => Vec::new(),
        }
    }
}
