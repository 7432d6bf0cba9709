use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Auth(String),
    UpstreamData { path: &'static str },
    Malformed { path: String, source: serde_json::Error },
    NotAuthenticated,
    Halted,
    Io(std::io::Error),
}

impl Error {
    /// True when the only remedy is new credentials: the host should stop
    /// polling and prompt for re-entry instead of retrying on a timer.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Halted)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Auth(msg) => write!(f, "authentication failed: {msg}"),
            Error::UpstreamData { path } => {
                write!(f, "unexpected response shape: missing {path}")
            }
            Error::Malformed { path, source } => {
                write!(f, "malformed response at {path}: {source}")
            }
            Error::NotAuthenticated => write!(f, "not authenticated (login first)"),
            Error::Halted => write!(f, "coordinator halted (needs reauthentication)"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Malformed { source, .. } => Some(source),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
