//! Network error types

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Reasons a server could not be started
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    #[error("Multiplayer mode not enabled")]
    NotInMultiplayerMode,

    #[error("Player name not valid")]
    InvalidPlayerName,

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Cannot start listening to network socket")]
    CannotListen,

    #[error("Cannot host, already joined as client")]
    JoinedAsClient,
}

/// Reasons a join attempt failed or an established join was lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Multiplayer mode not enabled")]
    NotInMultiplayerMode,

    #[error("Player name not valid")]
    InvalidPlayerName,

    #[error("Server IP not valid")]
    InvalidServerIp,

    #[error("Server port not valid")]
    InvalidServerPort,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Cannot join as client, already connected as server")]
    AlreadyHosting,

    #[error("Server closed the connection")]
    ServerClosedConnection,

    #[error("Server not found")]
    ServerNotFound,

    #[error("Server refused the connection")]
    ServerRefusedConnection,

    #[error("Server is not trusted, not connecting")]
    ServerNotTrusted,

    #[error("Client got unknown error")]
    Unknown,
}

/// Usage errors not tied to a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeneralError {
    #[error("Cannot send message, not connected")]
    NotConnected,

    #[error("Cannot send empty message")]
    MessageEmpty,

    #[error("Message does not fit in a single frame")]
    MessageTooLarge,
}
