/// Shared error type used across all toolmesh crates.
///
/// Variants are grouped by where the failure originates: the transport
/// (encode/decode, timeouts, missing responders), the registry control
/// protocol, tool handlers, and the model client.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    // ── Transport ───────────────────────────────────────────────────
    #[error("encode: {0}")]
    Encode(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("no responders on topic {0}")]
    NoResponders(String),

    #[error("subscribe {topic}: {message}")]
    Subscribe { topic: String, message: String },

    #[error("bus: {0}")]
    Bus(String),

    // ── Registry protocol ───────────────────────────────────────────
    #[error("registry: {0}")]
    Registry(String),

    // ── Tool business ───────────────────────────────────────────────
    #[error("tool {name}: {message}")]
    Tool { name: String, message: String },

    // ── Model protocol ──────────────────────────────────────────────
    #[error("model returned a malformed function call")]
    MalformedFunctionCall,

    #[error("turn limit reached after {0} model round-trips")]
    TurnLimit(usize),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the failure came from the transport rather than from the
    /// remote side having run and answered.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Encode(_)
                | Error::Decode(_)
                | Error::Timeout(_)
                | Error::NoResponders(_)
                | Error::Subscribe { .. }
                | Error::Bus(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
