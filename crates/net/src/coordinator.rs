//! Connection coordinator
//!
//! The single entry point for the outside world. Owns at most one session,
//! enforces host/join exclusivity, gates everything on network availability,
//! and relabels session events into one role-agnostic event set.

use std::net::{IpAddr, SocketAddr};

use tracing::{debug, info, warn};

use crate::endpoint::EndpointSelector;
use crate::error::{GeneralError, JoinError, ServerError};
use crate::session::{
    ClientSession, CreateFailure, JoinFailure, Role, ServerSession, Session, SessionEvent,
};
use crate::transport::{Transport, TransportEvent};

/// What the coordinator is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Hosting,
    Joined,
}

/// Events exposed to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    NetworkReady,
    NetworkUnavailable,
    MultiplayerEnabled,
    /// Network went away while a session was active
    MultiplayerDisabled,
    ServerStarted { ip: IpAddr, port: u16 },
    ServerError(ServerError),
    ServerClosed,
    PeerConnected(String),
    PeerDisconnected(Option<String>),
    JoinSucceeded(String),
    JoinError(JoinError),
    LeftGame,
    MessageSent,
    MessageReceived(String),
    GeneralError(GeneralError),
    /// Round-trip milliseconds, or -1 for a pong nobody asked for
    Pong(i64),
}

impl From<CreateFailure> for ServerError {
    fn from(failure: CreateFailure) -> Self {
        match failure {
            CreateFailure::Exists => ServerError::AlreadyRunning,
            CreateFailure::Listen => ServerError::CannotListen,
        }
    }
}

impl From<JoinFailure> for JoinError {
    fn from(failure: JoinFailure) -> Self {
        match failure {
            JoinFailure::Untrusted => JoinError::ServerNotTrusted,
            JoinFailure::Closed => JoinError::ServerClosedConnection,
            JoinFailure::NotFound => JoinError::ServerNotFound,
            JoinFailure::Refused => JoinError::ServerRefusedConnection,
            JoinFailure::Unknown => JoinError::Unknown,
        }
    }
}

/// Player names travel as a single protocol argument
fn valid_player_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(' ')
}

/// Owns the active session and the transport it runs on
pub struct Coordinator<T: Transport> {
    transport: T,
    endpoint: Box<dyn EndpointSelector>,
    session: Option<Box<dyn Session>>,
    network_ready: bool,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(transport: T, endpoint: Box<dyn EndpointSelector>) -> Self {
        Self {
            transport,
            endpoint,
            session: None,
            network_ready: false,
        }
    }

    pub fn mode(&self) -> Mode {
        match self.session.as_ref().map(|s| s.role()) {
            None => Mode::Idle,
            Some(Role::Host) => Mode::Hosting,
            Some(Role::Joiner) => Mode::Joined,
        }
    }

    pub fn network_ready(&self) -> bool {
        self.network_ready
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// React to the network becoming available or going away
    pub fn enable_mode(&mut self, available: bool) -> Vec<CoordinatorEvent> {
        let mut events = Vec::new();

        if available {
            if !self.network_ready {
                info!("Network ready");
                events.push(CoordinatorEvent::NetworkReady);
            }
            self.network_ready = true;
            events.push(CoordinatorEvent::MultiplayerEnabled);
            return events;
        }

        let was_active = self.session.is_some();
        events.extend(self.close_connection());
        self.network_ready = false;
        if was_active {
            info!("Network lost, multiplayer disabled");
            events.push(CoordinatorEvent::MultiplayerDisabled);
        } else {
            info!("No network available");
            events.push(CoordinatorEvent::NetworkUnavailable);
        }
        events
    }

    pub fn start_server(&mut self, player_name: &str, password: &str) -> Vec<CoordinatorEvent> {
        let rejection = if !self.network_ready {
            Some(ServerError::NotInMultiplayerMode)
        } else if !valid_player_name(player_name) {
            Some(ServerError::InvalidPlayerName)
        } else {
            match self.mode() {
                Mode::Hosting => Some(ServerError::AlreadyRunning),
                Mode::Joined => Some(ServerError::JoinedAsClient),
                Mode::Idle => None,
            }
        };
        if let Some(error) = rejection {
            debug!(%error, "Start server rejected");
            return vec![CoordinatorEvent::ServerError(error)];
        }

        let mut server = ServerSession::new(player_name, password);
        let created = server.create(&mut self.transport);
        self.session = Some(Box::new(server));
        self.absorb(created)
    }

    pub fn close_server(&mut self) -> Vec<CoordinatorEvent> {
        if self.mode() != Mode::Hosting {
            return vec![CoordinatorEvent::GeneralError(GeneralError::NotConnected)];
        }
        self.teardown()
    }

    pub fn join_game(
        &mut self,
        player_name: &str,
        ip: &str,
        port: &str,
        password: &str,
    ) -> Vec<CoordinatorEvent> {
        let port_number = port.trim().parse::<u16>().ok().filter(|p| *p != 0);

        let rejection = if self.mode() == Mode::Hosting {
            Some(JoinError::AlreadyHosting)
        } else if !self.network_ready {
            Some(JoinError::NotInMultiplayerMode)
        } else if !valid_player_name(player_name) {
            Some(JoinError::InvalidPlayerName)
        } else if ip.trim().is_empty() {
            Some(JoinError::InvalidServerIp)
        } else if port_number.is_none() {
            Some(JoinError::InvalidServerPort)
        } else if self.mode() == Mode::Joined {
            Some(JoinError::AlreadyConnected)
        } else {
            None
        };
        let (Some(port), None) = (port_number, rejection) else {
            let error = rejection.unwrap_or(JoinError::InvalidServerPort);
            debug!(%error, "Join rejected");
            return vec![CoordinatorEvent::JoinError(error)];
        };

        info!(ip = %ip, port, "Trying to join a game");
        let mut client = ClientSession::new(player_name, password);
        client.join(ip.trim(), port, &mut self.transport);
        self.session = Some(Box::new(client));
        Vec::new()
    }

    pub fn leave_game(&mut self) -> Vec<CoordinatorEvent> {
        match self.session.as_mut() {
            Some(session) if session.role() == Role::Joiner => {
                let events = session.close(&mut self.transport);
                self.absorb(events)
            }
            _ => vec![CoordinatorEvent::GeneralError(GeneralError::NotConnected)],
        }
    }

    pub fn send_message(&mut self, text: &str) -> Vec<CoordinatorEvent> {
        if text.is_empty() {
            return vec![CoordinatorEvent::GeneralError(GeneralError::MessageEmpty)];
        }
        match self.session.as_mut() {
            Some(session) => {
                let events = session.send_chat(text, &mut self.transport);
                self.absorb(events)
            }
            None => vec![CoordinatorEvent::GeneralError(GeneralError::NotConnected)],
        }
    }

    pub fn ping(&mut self) -> Vec<CoordinatorEvent> {
        match self.session.as_mut() {
            Some(session) => {
                let events = session.ping(&mut self.transport);
                self.absorb(events)
            }
            None => Vec::new(),
        }
    }

    /// Tear down whichever session exists
    pub fn close_connection(&mut self) -> Vec<CoordinatorEvent> {
        if self.session.is_none() {
            return Vec::new();
        }
        self.teardown()
    }

    /// Route a transport notification to the active session
    pub fn handle_transport(&mut self, event: TransportEvent) -> Vec<CoordinatorEvent> {
        match self.session.as_mut() {
            Some(session) => {
                let events = session.handle(event, &mut self.transport);
                self.absorb(events)
            }
            None => {
                // Late notification for a session that is already gone
                if let TransportEvent::Accepted { link, .. } = event {
                    self.transport.disconnect(link);
                }
                Vec::new()
            }
        }
    }

    fn teardown(&mut self) -> Vec<CoordinatorEvent> {
        let Some(mut session) = self.session.take() else {
            return Vec::new();
        };
        session.shutdown(&mut self.transport);
        match session.role() {
            Role::Host => {
                info!("Server closed");
                vec![CoordinatorEvent::ServerClosed]
            }
            Role::Joiner => {
                info!("Left game");
                vec![CoordinatorEvent::LeftGame]
            }
        }
    }

    /// Relabel session events, dropping the session when it has finished
    fn absorb(&mut self, events: Vec<SessionEvent>) -> Vec<CoordinatorEvent> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let mapped = match event {
                SessionEvent::Listening { addr } => {
                    let advertised: SocketAddr = self.endpoint.advertise(addr);
                    info!(ip = %advertised.ip(), port = advertised.port(), "Server started");
                    CoordinatorEvent::ServerStarted {
                        ip: advertised.ip(),
                        port: advertised.port(),
                    }
                }
                SessionEvent::CreateFailed(failure) => {
                    warn!(?failure, "Server error");
                    self.session = None;
                    CoordinatorEvent::ServerError(failure.into())
                }
                SessionEvent::ListenerClosed => {
                    self.session = None;
                    CoordinatorEvent::ServerClosed
                }
                SessionEvent::PeerConnected { name } => CoordinatorEvent::PeerConnected(name),
                SessionEvent::PeerDisconnected { name } => CoordinatorEvent::PeerDisconnected(name),
                SessionEvent::Joined { peer_name } => {
                    info!(peer = %peer_name, "Successfully joined a game");
                    CoordinatorEvent::JoinSucceeded(peer_name)
                }
                SessionEvent::JoinFailed(failure) => {
                    warn!(?failure, "Unable to join game");
                    self.session = None;
                    CoordinatorEvent::JoinError(failure.into())
                }
                SessionEvent::Left => {
                    self.session = None;
                    CoordinatorEvent::LeftGame
                }
                SessionEvent::ChatReceived(text) => CoordinatorEvent::MessageReceived(text),
                SessionEvent::ChatSent => CoordinatorEvent::MessageSent,
                SessionEvent::NotConnected => {
                    CoordinatorEvent::GeneralError(GeneralError::NotConnected)
                }
                SessionEvent::MessageTooLarge => {
                    CoordinatorEvent::GeneralError(GeneralError::MessageTooLarge)
                }
                SessionEvent::Pong(ms) => CoordinatorEvent::Pong(ms),
            };
            out.push(mapped);
        }
        out
    }
}
