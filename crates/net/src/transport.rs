//! Byte transport underneath the sessions
//!
//! Sessions never touch sockets. They issue requests through the
//! [`Transport`] trait and react to [`TransportEvent`]s delivered back to
//! their owner. [`TokioTransport`] is the TCP implementation; each link runs
//! in its own task and reports through an mpsc channel.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Identifies one connection for the lifetime of a transport
pub type LinkId = u64;

/// Read buffer size per link
const READ_CHUNK: usize = 4096;

/// Closed taxonomy of socket failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketErrorKind {
    RemoteClosed,
    HostNotFound,
    ConnectionRefused,
    Other,
}

impl SocketErrorKind {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => SocketErrorKind::ConnectionRefused,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => SocketErrorKind::RemoteClosed,
            io::ErrorKind::NotFound | io::ErrorKind::AddrNotAvailable => {
                SocketErrorKind::HostNotFound
            }
            _ => SocketErrorKind::Other,
        }
    }
}

/// Notification from the transport about one link
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An inbound connection was accepted by the listener
    Accepted { link: LinkId, peer: SocketAddr },
    /// An outbound connection was established
    Connected { link: LinkId },
    /// Bytes arrived
    Data { link: LinkId, bytes: Bytes },
    /// The link failed; a peer-initiated close reports `RemoteClosed`
    Failed { link: LinkId, kind: SocketErrorKind },
    /// The link is gone. Not sent when an outbound connect fails.
    Disconnected { link: LinkId },
}

impl TransportEvent {
    pub fn link(&self) -> LinkId {
        match self {
            TransportEvent::Accepted { link, .. }
            | TransportEvent::Connected { link }
            | TransportEvent::Data { link, .. }
            | TransportEvent::Failed { link, .. }
            | TransportEvent::Disconnected { link } => *link,
        }
    }
}

/// Requests a session can make of its transport
///
/// All calls return immediately; outcomes arrive later as [`TransportEvent`]s.
pub trait Transport: Send {
    /// Bind the listening endpoint and start accepting
    fn listen(&mut self) -> io::Result<SocketAddr>;

    /// Stop accepting. Existing links are unaffected.
    fn close_listener(&mut self);

    /// Start an outbound connection
    fn connect(&mut self, host: &str, port: u16) -> LinkId;

    /// Queue an encoded frame for writing
    fn send(&mut self, link: LinkId, frame: Bytes);

    /// Request that a link be closed
    fn disconnect(&mut self, link: LinkId);
}

enum LinkCommand {
    Write(Bytes),
    Disconnect,
}

type LinkRegistry = Arc<Mutex<HashMap<LinkId, mpsc::UnboundedSender<LinkCommand>>>>;

/// TCP transport backed by tokio tasks
///
/// Must be created and used from within a tokio runtime.
pub struct TokioTransport {
    bind_addr: SocketAddr,
    events: mpsc::Sender<TransportEvent>,
    links: LinkRegistry,
    next_link: Arc<AtomicU64>,
    listener_shutdown: Option<broadcast::Sender<()>>,
}

impl TokioTransport {
    pub fn new(bind_addr: SocketAddr, events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            bind_addr,
            events,
            links: Arc::new(Mutex::new(HashMap::new())),
            next_link: Arc::new(AtomicU64::new(1)),
            listener_shutdown: None,
        }
    }

    fn link_sender(&self, link: LinkId) -> Option<mpsc::UnboundedSender<LinkCommand>> {
        lock_links(&self.links).get(&link).cloned()
    }
}

fn lock_links(
    links: &LinkRegistry,
) -> std::sync::MutexGuard<'_, HashMap<LinkId, mpsc::UnboundedSender<LinkCommand>>> {
    links.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Transport for TokioTransport {
    fn listen(&mut self) -> io::Result<SocketAddr> {
        if self.listener_shutdown.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                "listener already running",
            ));
        }

        let std_listener = std::net::TcpListener::bind(self.bind_addr)?;
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Listening for peers");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(accept_loop(
            listener,
            self.links.clone(),
            self.next_link.clone(),
            self.events.clone(),
            shutdown_rx,
        ));
        self.listener_shutdown = Some(shutdown_tx);

        Ok(bound_addr)
    }

    fn close_listener(&mut self) {
        if let Some(shutdown_tx) = self.listener_shutdown.take() {
            let _ = shutdown_tx.send(());
            debug!("Listener shutdown requested");
        }
    }

    fn connect(&mut self, host: &str, port: u16) -> LinkId {
        let link = self.next_link.fetch_add(1, Ordering::Relaxed);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        lock_links(&self.links).insert(link, cmd_tx);

        tokio::spawn(connect_task(
            link,
            host.to_string(),
            port,
            self.links.clone(),
            self.events.clone(),
            cmd_rx,
        ));

        link
    }

    fn send(&mut self, link: LinkId, frame: Bytes) {
        match self.link_sender(link) {
            Some(tx) => {
                if tx.send(LinkCommand::Write(frame)).is_err() {
                    debug!(link, "Link task gone, dropping frame");
                }
            }
            None => debug!(link, "Send on unknown link"),
        }
    }

    fn disconnect(&mut self, link: LinkId) {
        if let Some(tx) = self.link_sender(link) {
            let _ = tx.send(LinkCommand::Disconnect);
        }
    }
}

impl Drop for TokioTransport {
    fn drop(&mut self) {
        self.close_listener();
        for tx in lock_links(&self.links).values() {
            let _ = tx.send(LinkCommand::Disconnect);
        }
    }
}

/// Accept incoming connections until shut down
async fn accept_loop(
    listener: TcpListener,
    links: LinkRegistry,
    next_link: Arc<AtomicU64>,
    events: mpsc::Sender<TransportEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let link = next_link.fetch_add(1, Ordering::Relaxed);
                        debug!(link, peer = %peer, "New connection");

                        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                        lock_links(&links).insert(link, cmd_tx);

                        if events.send(TransportEvent::Accepted { link, peer }).await.is_err() {
                            break;
                        }
                        tokio::spawn(link_task(link, stream, links.clone(), events.clone(), cmd_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Resolve and connect, then hand the stream to [`link_task`]
async fn connect_task(
    link: LinkId,
    host: String,
    port: u16,
    links: LinkRegistry,
    events: mpsc::Sender<TransportEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<LinkCommand>,
) {
    info!(link, host = %host, port, "Connecting to server");

    let connecting = resolve_and_connect(&host, port);
    tokio::pin!(connecting);

    let outcome = loop {
        tokio::select! {
            result = &mut connecting => break Some(result),
            cmd = cmd_rx.recv() => match cmd {
                // Nothing can be written before the stream exists
                Some(LinkCommand::Write(_)) => continue,
                Some(LinkCommand::Disconnect) | None => break None,
            },
        }
    };

    match outcome {
        Some(Ok(stream)) => {
            if events.send(TransportEvent::Connected { link }).await.is_ok() {
                link_task(link, stream, links, events, cmd_rx).await;
            } else {
                lock_links(&links).remove(&link);
            }
        }
        Some(Err(kind)) => {
            lock_links(&links).remove(&link);
            let _ = events.send(TransportEvent::Failed { link, kind }).await;
        }
        None => {
            debug!(link, "Connect abandoned");
            lock_links(&links).remove(&link);
            let _ = events.send(TransportEvent::Disconnected { link }).await;
        }
    }
}

async fn resolve_and_connect(host: &str, port: u16) -> Result<TcpStream, SocketErrorKind> {
    let addrs: Vec<SocketAddr> = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            warn!(host = %host, error = %e, "Host lookup failed");
            return Err(SocketErrorKind::HostNotFound);
        }
    };
    if addrs.is_empty() {
        return Err(SocketErrorKind::HostNotFound);
    }

    let mut last = SocketErrorKind::Other;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(addr = %addr, error = %e, "Connect attempt failed");
                last = SocketErrorKind::from_io(&e);
            }
        }
    }
    Err(last)
}

/// Pump one established connection until either side closes it
async fn link_task(
    link: LinkId,
    stream: TcpStream,
    links: LinkRegistry,
    events: mpsc::Sender<TransportEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<LinkCommand>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let failure = loop {
        tokio::select! {
            result = reader.read_buf(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!(link, "Peer closed connection");
                        break Some(SocketErrorKind::RemoteClosed);
                    }
                    Ok(_) => {
                        let bytes = buf.split().freeze();
                        if events.send(TransportEvent::Data { link, bytes }).await.is_err() {
                            break None;
                        }
                    }
                    Err(e) => {
                        warn!(link, error = %e, "Read error");
                        break Some(SocketErrorKind::from_io(&e));
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(LinkCommand::Write(frame)) => {
                        let written = async {
                            writer.write_all(&frame).await?;
                            writer.flush().await
                        };
                        if let Err(e) = written.await {
                            warn!(link, error = %e, "Write error");
                            break Some(SocketErrorKind::from_io(&e));
                        }
                    }
                    Some(LinkCommand::Disconnect) | None => {
                        debug!(link, "Disconnect requested");
                        let _ = writer.shutdown().await;
                        break None;
                    }
                }
            }
        }
    };

    lock_links(&links).remove(&link);
    if let Some(kind) = failure {
        let _ = events.send(TransportEvent::Failed { link, kind }).await;
    }
    let _ = events.send(TransportEvent::Disconnected { link }).await;
}

/// In-memory transport for exercising sessions without sockets
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::frame::FramedChannel;

    /// Records every request and decodes outbound frames per link
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub listen_result: Option<io::ErrorKind>,
        pub listening: bool,
        pub listens: usize,
        pub connects: Vec<(String, u16)>,
        pub sent: Vec<(LinkId, String)>,
        pub disconnects: Vec<LinkId>,
        next_link: LinkId,
        decoders: HashMap<LinkId, FramedChannel>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self {
                next_link: 100,
                ..Default::default()
            }
        }

        pub fn failing_listen(kind: io::ErrorKind) -> Self {
            Self {
                listen_result: Some(kind),
                ..Self::new()
            }
        }

        /// Payloads written to one link, oldest first
        pub fn sent_on(&self, link: LinkId) -> Vec<String> {
            self.sent
                .iter()
                .filter(|(l, _)| *l == link)
                .map(|(_, p)| p.clone())
                .collect()
        }

        pub fn take_sent(&mut self) -> Vec<String> {
            self.sent.drain(..).map(|(_, p)| p).collect()
        }
    }

    impl Transport for RecordingTransport {
        fn listen(&mut self) -> io::Result<SocketAddr> {
            self.listens += 1;
            if let Some(kind) = self.listen_result {
                return Err(io::Error::new(kind, "listen refused by test"));
            }
            self.listening = true;
            Ok(SocketAddr::from(([0, 0, 0, 0], 40123)))
        }

        fn close_listener(&mut self) {
            self.listening = false;
        }

        fn connect(&mut self, host: &str, port: u16) -> LinkId {
            self.connects.push((host.to_string(), port));
            self.next_link += 1;
            self.next_link
        }

        fn send(&mut self, link: LinkId, frame: Bytes) {
            let decoder = self.decoders.entry(link).or_default();
            decoder.push(&frame);
            while let Some(payload) = decoder.next_payload().unwrap() {
                self.sent.push((link, payload));
            }
        }

        fn disconnect(&mut self, link: LinkId) {
            self.disconnects.push(link);
        }
    }

    /// Frame a payload as the remote side would send it
    pub(crate) fn data(link: LinkId, payload: &str) -> TransportEvent {
        TransportEvent::Data {
            link,
            bytes: crate::frame::encode_frame(payload).unwrap(),
        }
    }
}
