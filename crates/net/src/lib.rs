//! Chatter Network Library
//!
//! Two-peer chat over a single trusted TCP connection.
//!
//! # Architecture
//!
//! - **Frame**: 2-byte length-prefixed UTF-8 text
//! - **Session**: per-role handshake state machines (host gates with a
//!   password, joiner waits for a welcome)
//! - **Coordinator**: owns at most one session and exposes role-agnostic events
//! - **Service**: tokio task driving the coordinator over real sockets
//!
//! # Usage
//!
//! ```ignore
//! let mut service = ChatService::spawn(NetConfig::default(), NetworkSignal::new(true));
//! service.start_server("alice", "secret").await?;
//!
//! while let Some(event) = service.next_event().await {
//!     match event {
//!         CoordinatorEvent::MessageReceived(text) => { /* handle */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod availability;
pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transport;

pub use availability::NetworkSignal;
pub use config::NetConfig;
pub use coordinator::{Coordinator, CoordinatorEvent, Mode};
pub use error::{Error, GeneralError, JoinError, Result, ServerError};
pub use service::ChatService;
pub use session::{ClientSession, Role, ServerSession, Session, SessionEvent};
pub use transport::{TokioTransport, Transport, TransportEvent};
