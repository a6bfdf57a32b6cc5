/// [Result] alias for return types of the crate API
pub type Result<T> = std::result::Result<T, Error>;

/// Error enum type
#[derive(Debug)]
pub enum Error {
    /// The OS refused to bind or dial one of the UDP sockets.
    Connect(std::io::Error),
    /// The drone did not acknowledge the connection request in time.
    ConnectTimeout,
    /// Connect called while a connection is already established.
    AlreadyConnected,
    /// Connect called while a connection attempt is in progress.
    ConnectionInProgress,
    /// A command was issued while the control channel is disconnected.
    NotConnected,
    /// An autopilot was started on an axis group that is already navigating.
    AlreadyNavigating,
    /// An autopilot target lies outside the permitted range.
    NavigationLimitExceeded,
    /// AutoFlyToXY called before a home point was set.
    HomeNotSet,
    /// A flight-data stream is already running.
    AlreadyStreaming,
    /// A stick listener is already running.
    AlreadyListening,
    /// An incoming frame could not be decoded. The String contains the reason.
    ProtocolError(String),
    /// Socket I/O failed on an established connection.
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Connect(e) => write!(f, "cannot open connection: {}", e),
            Error::ConnectTimeout => {
                write!(f, "timeout waiting for response to connection request")
            }
            Error::AlreadyConnected => write!(f, "already connected"),
            Error::ConnectionInProgress => write!(f, "connection attempt already in progress"),
            Error::NotConnected => write!(f, "not connected"),
            Error::AlreadyNavigating => write!(f, "already navigating on this axis group"),
            Error::NavigationLimitExceeded => write!(f, "navigation target outside limits"),
            Error::HomeNotSet => write!(f, "home point has not been set (or is invalid)"),
            Error::AlreadyStreaming => write!(f, "flight data is already being streamed"),
            Error::AlreadyListening => write!(f, "a stick listener is already running"),
            Error::ProtocolError(reason) => write!(f, "protocol error: {}", reason),
            Error::Io(e) => write!(f, "socket error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}
