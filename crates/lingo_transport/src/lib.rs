use std::io::Read;
use std::path::{Path, PathBuf};

use ureq::Error as UreqError;
use url::Url;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Byte transport capability: fetch the raw contents of one catalog path.
///
/// Implementations are selected by the embedding application at engine
/// construction time; the engine itself never sniffs its environment.
pub trait Transport: Send + Sync {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, TransportError>;
}

/// Filesystem transport. Paths are used as given, relative to the process
/// working directory when not absolute.
#[derive(Debug, Default)]
pub struct FsTransport;

impl FsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for FsTransport {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let bytes = std::fs::read(Path::new(path))
            .map_err(|err| TransportError::new(format!("read {path}: {err}")))?;
        tracing::debug!(path, len = bytes.len(), "read catalog file");
        Ok(bytes)
    }
}

/// HTTP(S) transport backed by a shared ureq agent.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::agent(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .agent
            .get(path)
            .call()
            .map_err(|err| TransportError::new(http_error_message(err)))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|err| TransportError::new(format!("read body of {path}: {err}")))?;
        tracing::debug!(path, len = bytes.len(), "fetched catalog");
        Ok(bytes)
    }
}

fn http_error_message(err: UreqError) -> String {
    match err {
        UreqError::Status(code, _) => format!("http status {code}"),
        UreqError::Transport(err) => err.to_string(),
    }
}

/// Pick a transport for a catalog base and normalize the base to the form
/// that transport expects. `http(s)://` bases get the HTTP transport;
/// `file://` URLs are converted to plain paths; anything else is treated as
/// a filesystem path.
pub fn transport_for_base(base: &str) -> (Box<dyn Transport>, String) {
    match Url::parse(base) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            (Box::new(HttpTransport::new()), base.to_string())
        }
        Ok(url) if url.scheme() == "file" => {
            let path = url
                .to_file_path()
                .map(|path: PathBuf| path.display().to_string())
                .unwrap_or_else(|_| base.to_string());
            (Box::new(FsTransport::new()), path)
        }
        _ => (Box::new(FsTransport::new()), base.to_string()),
    }
}
