//! Errors returned by the SD block-device adapter

use embedded_io::{blocking::ReadExactError, Error, ErrorKind};
use snafu::prelude::*;

/// Every failure the adapter can report. Any variant means the operation did
/// not complete; the host status codes are carried for diagnostics only and
/// are not interpreted at this layer.
#[derive(Debug, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SdError {
    #[snafu(display("(SD) Host controller initialization failed!"))]
    InitFailed { code: i32 },
    #[snafu(display("(SD) Card information query failed!"))]
    CardInfoFailed { code: i32 },
    #[snafu(display("(SD) Host refused the read transfer!"))]
    ReadFailed { code: i32 },
    #[snafu(display("(SD) Host refused the write transfer!"))]
    WriteFailed { code: i32 },
    #[snafu(display("(SD) Card stayed busy for the whole status window!"))]
    StatusTimeout { timeout_ms: u32 },
    #[snafu(display("(SD) Transfer did not complete in time!"))]
    TransferTimeout { timeout_ms: u32 },
    #[snafu(display("(SD) Card reported an error state!"))]
    CardFault {},
    #[snafu(display("(SD) Adapter used before a successful init!"))]
    NotInitialized {},
    #[snafu(display("(SD) A transfer is already armed!"))]
    TransferInFlight {},
    #[snafu(display("(SD) Bad transfer buffer length!"))]
    BufferLength {},
    #[snafu(display("(SD) Position is past the end of the card!"))]
    OutOfRange {},
    #[snafu(display("(IO) Unexpected EOF!"))]
    IoUnexpectedEof {},
}

impl Error for SdError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl From<SdError> for ReadExactError<SdError> {
    fn from(e: SdError) -> ReadExactError<SdError> {
        Self::Other(e)
    }
}

impl From<ReadExactError<SdError>> for SdError {
    fn from(e: ReadExactError<SdError>) -> SdError {
        match e {
            ReadExactError::UnexpectedEof => Self::IoUnexpectedEof {},
            ReadExactError::Other(e) => e,
        }
    }
}
