use thiserror::Error;

/// Errors produced by the gateway and its management tooling.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gateway already running on port {port} (pid {pid})")]
    AlreadyRunning { pid: u32, port: u16 },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("control error: {0}")]
    Control(String),

    #[error("process record error: {0}")]
    Record(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
