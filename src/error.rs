use derive_more::From;
use k8s_openapi::serde_json;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Json(serde_json::Error),

    #[from]
    Kube(kube::Error),

    #[from]
    Infer(kube::config::InferConfigError),

    #[from]
    Io(std::io::Error),

    /// Object is not present in the informer's local cache
    NotFound { resource: String, name: String },

    /// Lookup against an index name the indexer was never given
    IndexNotFound(String),

    /// Operation only valid before the informer's run loop starts
    AlreadyStarted(String),

    /// Watch resource version is too old (HTTP 410); a relist is required
    ResourceExpired(String),

    /// Error event received on a watch stream
    WatchFailed { code: u16, message: String },

    /// Custom error message
    Custom(String),
}

impl Error {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// HTTP 410 Gone, whether reported as a watch error event or as the
    /// response to opening the watch
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self {
            Self::ResourceExpired(_) => true,
            Self::Kube(kube::Error::Api(response)) => response.code == 410,
            _ => false,
        }
    }
}


impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}
