//! Async service wrapping the coordinator
//!
//! One tokio task owns the [`Coordinator`] and its [`TokioTransport`]. Requests
//! arrive over a command channel, socket activity over the transport channel,
//! and availability changes over a watch. Everything that touches protocol
//! state therefore runs on that one task, one event at a time.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::availability::NetworkSignal;
use crate::config::NetConfig;
use crate::coordinator::{Coordinator, CoordinatorEvent};
use crate::endpoint::LocalEndpoint;
use crate::error::{Error, Result};
use crate::transport::{TokioTransport, TransportEvent};

enum ServiceCommand {
    StartServer {
        player_name: String,
        password: String,
    },
    CloseServer,
    JoinGame {
        player_name: String,
        ip: String,
        port: String,
        password: String,
    },
    LeaveGame,
    SendMessage(String),
    Ping,
    CloseConnection,
}

/// Handle to a running chat service
pub struct ChatService {
    cmd_tx: mpsc::Sender<ServiceCommand>,
    event_rx: mpsc::Receiver<CoordinatorEvent>,
    network: NetworkSignal,
}

impl ChatService {
    /// Spawn the service task. Must be called from within a tokio runtime.
    ///
    /// Multiplayer mode follows `network`: the service enables it whenever the
    /// signal reports the network available, including right at start.
    pub fn spawn(config: NetConfig, network: NetworkSignal) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (transport_tx, transport_rx) = mpsc::channel(64);

        let transport = TokioTransport::new(config.listen_addr(), transport_tx);
        let endpoint = LocalEndpoint::new(config.advertise_addr);
        let coordinator = Coordinator::new(transport, Box::new(endpoint));

        tokio::spawn(service_task(
            coordinator,
            cmd_rx,
            transport_rx,
            network.subscribe(),
            event_tx,
        ));

        Self {
            cmd_tx,
            event_rx,
            network,
        }
    }

    /// Get the next event
    pub async fn next_event(&mut self) -> Option<CoordinatorEvent> {
        self.event_rx.recv().await
    }

    /// Get the next event without waiting
    pub fn try_next_event(&mut self) -> Option<CoordinatorEvent> {
        self.event_rx.try_recv().ok()
    }

    /// The availability signal the service follows
    pub fn network(&self) -> &NetworkSignal {
        &self.network
    }

    pub async fn start_server(&self, player_name: &str, password: &str) -> Result<()> {
        self.send(ServiceCommand::StartServer {
            player_name: player_name.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn close_server(&self) -> Result<()> {
        self.send(ServiceCommand::CloseServer).await
    }

    pub async fn join_game(
        &self,
        player_name: &str,
        ip: &str,
        port: &str,
        password: &str,
    ) -> Result<()> {
        self.send(ServiceCommand::JoinGame {
            player_name: player_name.to_string(),
            ip: ip.to_string(),
            port: port.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn leave_game(&self) -> Result<()> {
        self.send(ServiceCommand::LeaveGame).await
    }

    pub async fn send_message(&self, text: &str) -> Result<()> {
        self.send(ServiceCommand::SendMessage(text.to_string())).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.send(ServiceCommand::Ping).await
    }

    /// Tear down whatever session is active
    pub async fn close_connection(&self) -> Result<()> {
        self.send(ServiceCommand::CloseConnection).await
    }

    async fn send(&self, cmd: ServiceCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// Main service task
async fn service_task(
    mut coordinator: Coordinator<TokioTransport>,
    mut cmd_rx: mpsc::Receiver<ServiceCommand>,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    mut network_rx: watch::Receiver<bool>,
    event_tx: mpsc::Sender<CoordinatorEvent>,
) {
    let initially_available = *network_rx.borrow_and_update();
    if initially_available {
        emit(&event_tx, coordinator.enable_mode(true)).await;
    }

    loop {
        let events = tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => handle_command(&mut coordinator, cmd),
                    None => {
                        debug!("Service command channel closed");
                        break;
                    }
                }
            }

            Some(event) = transport_rx.recv() => coordinator.handle_transport(event),

            changed = network_rx.changed() => {
                if changed.is_err() {
                    debug!("Network signal dropped");
                    break;
                }
                let available = *network_rx.borrow_and_update();
                coordinator.enable_mode(available)
            }
        };

        if !emit(&event_tx, events).await {
            break;
        }
    }

    coordinator.close_connection();
    info!("Chat service stopped");
}

fn handle_command(
    coordinator: &mut Coordinator<TokioTransport>,
    cmd: ServiceCommand,
) -> Vec<CoordinatorEvent> {
    match cmd {
        ServiceCommand::StartServer {
            player_name,
            password,
        } => coordinator.start_server(&player_name, &password),
        ServiceCommand::CloseServer => coordinator.close_server(),
        ServiceCommand::JoinGame {
            player_name,
            ip,
            port,
            password,
        } => coordinator.join_game(&player_name, &ip, &port, &password),
        ServiceCommand::LeaveGame => coordinator.leave_game(),
        ServiceCommand::SendMessage(text) => coordinator.send_message(&text),
        ServiceCommand::Ping => coordinator.ping(),
        ServiceCommand::CloseConnection => coordinator.close_connection(),
    }
}

/// Forward events; false once nobody is listening any more
async fn emit(event_tx: &mpsc::Sender<CoordinatorEvent>, events: Vec<CoordinatorEvent>) -> bool {
    for event in events {
        if event_tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GeneralError, JoinError};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::time::timeout;

    fn loopback_config() -> NetConfig {
        NetConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port: 0,
            advertise_addr: None,
        }
    }

    async fn next(service: &mut ChatService) -> CoordinatorEvent {
        timeout(Duration::from_secs(5), service.next_event())
            .await
            .expect("timed out waiting for event")
            .expect("service stopped")
    }

    async fn expect_enabled(service: &mut ChatService) {
        assert_eq!(next(service).await, CoordinatorEvent::NetworkReady);
        assert_eq!(next(service).await, CoordinatorEvent::MultiplayerEnabled);
    }

    async fn start_host(password: &str) -> (ChatService, u16) {
        let mut host = ChatService::spawn(loopback_config(), NetworkSignal::new(true));
        expect_enabled(&mut host).await;
        host.start_server("host", password).await.unwrap();
        match next(&mut host).await {
            CoordinatorEvent::ServerStarted { ip, port } => {
                assert_eq!(ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
                (host, port)
            }
            other => panic!("Expected ServerStarted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_host_and_join_chat() {
        let (mut host, port) = start_host("secret").await;

        let mut guest = ChatService::spawn(loopback_config(), NetworkSignal::new(true));
        expect_enabled(&mut guest).await;
        guest
            .join_game("guest", "127.0.0.1", &port.to_string(), "secret")
            .await
            .unwrap();

        assert_eq!(
            next(&mut guest).await,
            CoordinatorEvent::JoinSucceeded("host".into())
        );
        assert_eq!(
            next(&mut host).await,
            CoordinatorEvent::PeerConnected("guest".into())
        );

        guest.send_message("hello  host").await.unwrap();
        assert_eq!(next(&mut guest).await, CoordinatorEvent::MessageSent);
        assert_eq!(
            next(&mut host).await,
            CoordinatorEvent::MessageReceived("hello  host".into())
        );

        host.send_message("hi guest").await.unwrap();
        assert_eq!(next(&mut host).await, CoordinatorEvent::MessageSent);
        assert_eq!(
            next(&mut guest).await,
            CoordinatorEvent::MessageReceived("hi guest".into())
        );

        guest.ping().await.unwrap();
        match next(&mut guest).await {
            CoordinatorEvent::Pong(ms) => assert!(ms >= 0),
            other => panic!("Expected Pong, got {:?}", other),
        }

        guest.leave_game().await.unwrap();
        assert_eq!(next(&mut guest).await, CoordinatorEvent::LeftGame);
        assert_eq!(
            next(&mut host).await,
            CoordinatorEvent::PeerDisconnected(Some("guest".into()))
        );

        host.close_server().await.unwrap();
        assert_eq!(next(&mut host).await, CoordinatorEvent::ServerClosed);
    }

    #[tokio::test]
    async fn test_join_without_password() {
        let (mut host, port) = start_host("").await;

        let mut guest = ChatService::spawn(loopback_config(), NetworkSignal::new(true));
        expect_enabled(&mut guest).await;
        guest
            .join_game("guest", "127.0.0.1", &port.to_string(), "")
            .await
            .unwrap();

        assert_eq!(
            next(&mut guest).await,
            CoordinatorEvent::JoinSucceeded("host".into())
        );
        assert_eq!(
            next(&mut host).await,
            CoordinatorEvent::PeerConnected("guest".into())
        );
    }

    #[tokio::test]
    async fn test_wrong_password_is_dropped() {
        let (mut host, port) = start_host("secret").await;

        let mut guest = ChatService::spawn(loopback_config(), NetworkSignal::new(true));
        expect_enabled(&mut guest).await;
        guest
            .join_game("guest", "127.0.0.1", &port.to_string(), "nope")
            .await
            .unwrap();

        assert_eq!(
            next(&mut guest).await,
            CoordinatorEvent::JoinError(JoinError::ServerClosedConnection)
        );
        assert_eq!(
            next(&mut host).await,
            CoordinatorEvent::PeerDisconnected(None)
        );

        // Sending after the failed join has nowhere to go
        guest.send_message("anyone?").await.unwrap();
        assert_eq!(
            next(&mut guest).await,
            CoordinatorEvent::GeneralError(GeneralError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_network_toggle() {
        let signal = NetworkSignal::new(false);
        let mut service = ChatService::spawn(loopback_config(), signal.clone());

        service.start_server("host", "").await.unwrap();
        assert_eq!(
            next(&mut service).await,
            CoordinatorEvent::ServerError(crate::error::ServerError::NotInMultiplayerMode)
        );

        signal.set(true);
        expect_enabled(&mut service).await;

        service.start_server("host", "").await.unwrap();
        assert!(matches!(
            next(&mut service).await,
            CoordinatorEvent::ServerStarted { .. }
        ));

        signal.set(false);
        assert_eq!(next(&mut service).await, CoordinatorEvent::ServerClosed);
        assert_eq!(
            next(&mut service).await,
            CoordinatorEvent::MultiplayerDisabled
        );
        assert!(!service.network().is_available());
    }
}
