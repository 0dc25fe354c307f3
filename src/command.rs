//! Encoding of the commands carried by replicated log entries.
//!
//! An encoded command is a single version byte followed by a JSON body. Every
//! node decodes the same bytes the same way, so an entry that fails to decode
//! fails on all of them.

use serde::Deserialize;
use serde::Serialize;

/// Version byte written in front of every encoded command.
pub const CODEC_VERSION: u8 = 1;

/// The operation a command performs on the user map.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Set,

    /// Any tag this build does not recognize.
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub op: Op,
    pub username: String,
    pub password: String,
}

impl Command {
    pub fn set(username: impl ToString, password: impl ToString) -> Self {
        Self {
            op: Op::Set,
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("empty command")]
    Empty,

    #[error("unsupported command version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed command: {0}")]
    Malformed(String),
}

pub fn encode(cmd: &Command) -> Result<Vec<u8>, CodecError> {
    let mut buf = vec![CODEC_VERSION];
    serde_json::to_writer(&mut buf, cmd).map_err(|e| CodecError::Malformed(e.to_string()))?;
    Ok(buf)
}

pub fn decode(buf: &[u8]) -> Result<Command, CodecError> {
    let (version, body) = buf.split_first().ok_or(CodecError::Empty)?;
    if *version != CODEC_VERSION {
        return Err(CodecError::UnsupportedVersion(*version));
    }
    serde_json::from_slice(body).map_err(|e| CodecError::Malformed(e.to_string()))
}
