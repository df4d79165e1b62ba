//! Joining side of a conversation

use tracing::{debug, info, warn};

use super::{JoinFailure, Link, PingClock, Role, Session, SessionEvent};
use crate::protocol::{Command, Verb};
use crate::transport::{Transport, TransportEvent};

/// Joiner session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// `join()` not called yet
    Idle,
    /// Transport connect in flight
    Connecting,
    /// Connected, waiting for the host's `username`
    AwaitingWelcome,
    /// Handshake complete; chat allowed
    Welcomed,
    /// Finished; a new session is needed to join again
    Closed,
}

/// Joiner session
pub struct ClientSession {
    password: String,
    player_name: String,
    state: ClientState,
    link: Option<Link>,
    peer_name: Option<String>,
    ping: PingClock,
    closing_by_us: bool,
}

impl ClientSession {
    pub fn new(player_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            player_name: player_name.into(),
            state: ClientState::Idle,
            link: None,
            peer_name: None,
            ping: PingClock::default(),
            closing_by_us: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    /// Start connecting to a host
    pub fn join(&mut self, host: &str, port: u16, net: &mut dyn Transport) {
        info!(host = %host, port, "Joining");
        self.link = Some(Link::new(net.connect(host, port)));
        self.state = ClientState::Connecting;
    }

    fn on_connected(&mut self, net: &mut dyn Transport) {
        let Some(link) = &self.link else {
            return;
        };
        debug!(link = link.id, "Connected, awaiting welcome");
        self.state = ClientState::AwaitingWelcome;
        // An empty password goes out as a bare `password`
        link.send_internal(&Command::password(&self.password), net);
    }

    /// Terminal failure: drop the link and report once
    fn fail(&mut self, failure: JoinFailure, net: &mut dyn Transport) -> Vec<SessionEvent> {
        if self.state == ClientState::Closed {
            return Vec::new();
        }
        if let Some(link) = &self.link {
            net.disconnect(link.id);
        }
        self.state = ClientState::Closed;
        self.ping.clear();
        vec![SessionEvent::JoinFailed(failure)]
    }

    fn dispatch(&mut self, cmd: Command, net: &mut dyn Transport) -> Vec<SessionEvent> {
        let Some(link) = &self.link else {
            return Vec::new();
        };

        match self.state {
            ClientState::AwaitingWelcome => match (&cmd.verb, cmd.single_arg()) {
                (Verb::Username, Some(name)) => {
                    info!(peer = %name, "Welcomed by server");
                    self.peer_name = Some(name.to_string());
                    link.send_internal(&Command::username(&self.player_name), net);
                    self.state = ClientState::Welcomed;
                    vec![SessionEvent::Joined {
                        peer_name: name.to_string(),
                    }]
                }
                _ => {
                    warn!(verb = %cmd.verb, "Unexpected welcome, server not trusted");
                    self.fail(JoinFailure::Untrusted, net)
                }
            },
            ClientState::Welcomed => match cmd.verb {
                Verb::ServerMessage => vec![SessionEvent::ChatReceived(cmd.text())],
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

impl Session for ClientSession {
    fn role(&self) -> Role {
        Role::Joiner
    }

    fn send_chat(&mut self, text: &str, net: &mut dyn Transport) -> Vec<SessionEvent> {
        let link = match &self.link {
            Some(link) if self.state == ClientState::Welcomed => link,
            _ => return vec![SessionEvent::NotConnected],
        };

        match link.send(&Command::with_text(Verb::ClientMessage, text), net) {
            Ok(()) => vec![SessionEvent::ChatSent],
            Err(e) => {
                warn!(error = %e, "Chat message not sent");
                vec![SessionEvent::MessageTooLarge]
            }
        }
    }

    fn ping(&mut self, net: &mut dyn Transport) -> Vec<SessionEvent> {
        match &self.link {
            Some(link)
                if matches!(
                    self.state,
                    ClientState::AwaitingWelcome | ClientState::Welcomed
                ) =>
            {
                self.ping.start();
                link.send_internal(&Command::ping(), net);
            }
            _ => debug!("Ping without connection ignored"),
        }
        Vec::new()
    }

    fn close(&mut self, net: &mut dyn Transport) -> Vec<SessionEvent> {
        match &self.link {
            Some(link) if self.state != ClientState::Closed => {
                info!(link = link.id, "Closing connection to server");
                self.closing_by_us = true;
                net.disconnect(link.id);
            }
            _ => debug!("Close without connection ignored"),
        }
        Vec::new()
    }

    fn shutdown(&mut self, net: &mut dyn Transport) {
        if let Some(link) = self.link.take() {
            net.disconnect(link.id);
        }
        self.state = ClientState::Closed;
        self.ping.clear();
    }

    fn handle(&mut self, event: TransportEvent, net: &mut dyn Transport) -> Vec<SessionEvent> {
        if self.link.as_ref().map(|l| l.id) != Some(event.link()) {
            return Vec::new();
        }

        match event {
            TransportEvent::Connected { .. } => {
                if self.state == ClientState::Connecting {
                    self.on_connected(net);
                }
                Vec::new()
            }
            TransportEvent::Data { bytes, .. } => {
                let decoded = match self.link.as_mut() {
                    Some(link) => link.receive(&bytes),
                    None => return Vec::new(),
                };

                let mut events = Vec::new();
                for cmd in decoded {
                    if self.state == ClientState::Closed {
                        break;
                    }
                    match cmd {
                        Ok(cmd) => events.extend(self.dispatch(cmd, net)),
                        Err(e) => {
                            warn!(error = %e, "Undecodable frame from server");
                            events.extend(self.fail(JoinFailure::Untrusted, net));
                        }
                    }
                }
                events
            }
            TransportEvent::Failed { kind, .. } => {
                if self.closing_by_us {
                    // A connect that fails after close() gets no Disconnected
                    debug!(?kind, "Connection failed while closing");
                    self.link = None;
                    self.closing_by_us = false;
                    self.state = ClientState::Closed;
                    return vec![SessionEvent::Left];
                }
                warn!(?kind, "Connection to server failed");
                self.fail(kind.into(), net)
            }
            TransportEvent::Disconnected { .. } => {
                self.link = None;
                if self.closing_by_us {
                    self.closing_by_us = false;
                    self.state = ClientState::Closed;
                    vec![SessionEvent::Left]
                } else {
                    // Dropped without a preceding failure report
                    self.fail(JoinFailure::Closed, net)
                }
            }
            TransportEvent::Accepted { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::UNSOLICITED_PONG;
    use crate::transport::testing::{data, RecordingTransport};
    use crate::transport::{LinkId, SocketErrorKind};

    fn connected(password: &str) -> (ClientSession, RecordingTransport, LinkId) {
        let mut net = RecordingTransport::new();
        let mut client = ClientSession::new("me", password);
        client.join("10.0.0.1", 4000, &mut net);
        assert_eq!(client.state(), ClientState::Connecting);
        assert_eq!(net.connects, vec![("10.0.0.1".to_string(), 4000)]);

        let link = client.link.as_ref().unwrap().id;
        client.handle(TransportEvent::Connected { link }, &mut net);
        assert_eq!(client.state(), ClientState::AwaitingWelcome);
        (client, net, link)
    }

    fn welcomed() -> (ClientSession, RecordingTransport, LinkId) {
        let (mut client, mut net, link) = connected("");
        net.take_sent();
        client.handle(data(link, "username Alice"), &mut net);
        net.take_sent();
        (client, net, link)
    }

    #[test]
    fn test_password_sent_on_connect() {
        let (_, net, link) = connected("hunter2");
        assert_eq!(net.sent_on(link), vec!["password hunter2".to_string()]);
    }

    #[test]
    fn test_empty_password_sends_bare_command() {
        let (_, net, link) = connected("");
        assert_eq!(net.sent_on(link), vec!["password".to_string()]);
    }

    #[test]
    fn test_welcome_completes_join() {
        let (mut client, mut net, link) = connected("");
        net.take_sent();
        let events = client.handle(data(link, "username Alice"), &mut net);

        assert_eq!(
            events,
            vec![SessionEvent::Joined {
                peer_name: "Alice".into()
            }]
        );
        assert_eq!(client.state(), ClientState::Welcomed);
        assert_eq!(client.peer_name(), Some("Alice"));
        assert_eq!(net.sent_on(link), vec!["username me".to_string()]);
    }

    #[test]
    fn test_bad_welcome_is_untrusted() {
        for first in ["servermessage hi", "username", "username two words", "ping"] {
            let (mut client, mut net, link) = connected("");
            let events = client.handle(data(link, first), &mut net);
            assert_eq!(
                events,
                vec![SessionEvent::JoinFailed(JoinFailure::Untrusted)],
                "case {:?}",
                first
            );
            assert_eq!(client.state(), ClientState::Closed);
            assert_eq!(net.disconnects, vec![link]);

            // The transport's follow-up notifications add nothing
            let events = client.handle(TransportEvent::Disconnected { link }, &mut net);
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_chat_requires_welcome() {
        let (mut client, mut net, _) = connected("");
        net.take_sent();
        assert_eq!(
            client.send_chat("hello", &mut net),
            vec![SessionEvent::NotConnected]
        );
        assert!(net.sent.is_empty());
    }

    #[test]
    fn test_chat_in_both_directions() {
        let (mut client, mut net, link) = welcomed();

        let events = client.handle(data(link, "servermessage hello  joiner"), &mut net);
        assert_eq!(events, vec![SessionEvent::ChatReceived("hello  joiner".into())]);

        assert_eq!(client.send_chat("hey", &mut net), vec![SessionEvent::ChatSent]);
        assert_eq!(net.sent_on(link), vec!["clientmessage hey".to_string()]);

        // Our own direction's verb coming back is discarded
        let events = client.handle(data(link, "clientmessage echo"), &mut net);
        assert!(events.is_empty());
        // So is a second welcome
        let events = client.handle(data(link, "username Mallory"), &mut net);
        assert!(events.is_empty());
        assert_eq!(client.peer_name(), Some("Alice"));
    }

    #[test]
    fn test_ping_pong() {
        let (mut client, mut net, link) = welcomed();

        client.handle(data(link, "ping"), &mut net);
        assert_eq!(net.take_sent(), vec!["pong".to_string()]);

        let events = client.handle(data(link, "pong"), &mut net);
        assert_eq!(events, vec![SessionEvent::Pong(UNSOLICITED_PONG)]);

        client.ping(&mut net);
        assert_eq!(net.take_sent(), vec!["ping".to_string()]);
        let events = client.handle(data(link, "pong"), &mut net);
        assert!(matches!(events.as_slice(), [SessionEvent::Pong(ms)] if *ms >= 0));
    }

    #[test]
    fn test_connect_failures_are_classified() {
        let cases = [
            (SocketErrorKind::RemoteClosed, JoinFailure::Closed),
            (SocketErrorKind::HostNotFound, JoinFailure::NotFound),
            (SocketErrorKind::ConnectionRefused, JoinFailure::Refused),
            (SocketErrorKind::Other, JoinFailure::Unknown),
        ];
        for (kind, expected) in cases {
            let mut net = RecordingTransport::new();
            let mut client = ClientSession::new("me", "");
            client.join("nowhere", 1, &mut net);
            let link = client.link.as_ref().unwrap().id;

            let events = client.handle(TransportEvent::Failed { link, kind }, &mut net);
            assert_eq!(events, vec![SessionEvent::JoinFailed(expected)]);
            assert_eq!(client.state(), ClientState::Closed);
        }
    }

    #[test]
    fn test_peer_drop_reports_closed_not_left() {
        let (mut client, mut net, link) = welcomed();
        let events = client.handle(
            TransportEvent::Failed {
                link,
                kind: SocketErrorKind::RemoteClosed,
            },
            &mut net,
        );
        assert_eq!(events, vec![SessionEvent::JoinFailed(JoinFailure::Closed)]);

        let events = client.handle(TransportEvent::Disconnected { link }, &mut net);
        assert!(events.is_empty());
    }

    #[test]
    fn test_close_reports_left_on_disconnect() {
        let (mut client, mut net, link) = welcomed();
        assert!(client.close(&mut net).is_empty());
        assert_eq!(net.disconnects, vec![link]);

        let events = client.handle(TransportEvent::Disconnected { link }, &mut net);
        assert_eq!(events, vec![SessionEvent::Left]);
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[test]
    fn test_close_while_connecting() {
        let mut net = RecordingTransport::new();
        let mut client = ClientSession::new("me", "");
        client.join("10.0.0.1", 4000, &mut net);
        let link = client.link.as_ref().unwrap().id;

        client.close(&mut net);
        let events = client.handle(TransportEvent::Disconnected { link }, &mut net);
        assert_eq!(events, vec![SessionEvent::Left]);
    }

    #[test]
    fn test_close_then_connect_failure_reports_left() {
        let mut net = RecordingTransport::new();
        let mut client = ClientSession::new("me", "");
        client.join("nowhere", 4000, &mut net);
        let link = client.link.as_ref().unwrap().id;

        assert!(client.close(&mut net).is_empty());
        let events = client.handle(
            TransportEvent::Failed {
                link,
                kind: SocketErrorKind::HostNotFound,
            },
            &mut net,
        );
        assert_eq!(events, vec![SessionEvent::Left]);
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[test]
    fn test_events_for_other_links_ignored() {
        let (mut client, mut net, link) = connected("");
        let events = client.handle(data(link + 50, "username Alice"), &mut net);
        assert!(events.is_empty());
        assert_eq!(client.state(), ClientState::AwaitingWelcome);
    }
}
