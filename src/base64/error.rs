use std::io;

use crate::common::cancel::Cancelled;
use crate::common::io::ReadError;
use crate::common::io_error_msg;

/// Why a single encode or decode invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum Base64Error {
    /// The cancellation token fired. Never a data problem.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("read error: {}", io_error_msg(.0))]
    Read(#[source] io::Error),

    /// Input is not valid padded RFC 4648 base64.
    #[error("invalid input")]
    Decode,

    #[error("write error: {}", io_error_msg(.0))]
    Write(#[source] io::Error),
}

impl Base64Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Base64Error::Cancelled(_))
    }
}

impl From<ReadError> for Base64Error {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Cancelled(c) => Base64Error::Cancelled(c),
            ReadError::Io(e) => Base64Error::Read(e),
        }
    }
}
