use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The input could not be opened or read.
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The input is not a well-formed binary or XML property list.
    #[error("malformed plist: {0}")]
    Parse(String),
    #[error("unsupported binary plist version {0:?}")]
    UnsupportedVersion(String),
    /// A value has no JSON representation under the active policy.
    #[error("{kind} at {path} has no JSON representation")]
    UnsupportedType { kind: &'static str, path: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// True for the malformed-content family: `Parse` and `UnsupportedVersion`.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::UnsupportedVersion(_))
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&str>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => Error::parse("unexpected end of input"),
            nom::Err::Error(e) | nom::Err::Failure(e) => Error::Parse(format!(
                "{:?} near {:?}",
                e.code,
                e.input.chars().take(32).collect::<String>()
            )),
        }
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => Error::parse("unexpected end of input"),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                Error::Parse(format!("{:?} with {} bytes left", e.code, e.input.len()))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
