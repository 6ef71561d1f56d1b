use thiserror::Error;

/// Errors that can occur while discovering devices, opening connections, or
/// performing control transfers.
///
/// The transport layer performs no retries and no silent recovery; every
/// failure carries enough context (operation and, where the OS provides one,
/// a native error description) for the caller to log or display. Higher
/// layers are expected to wrap these in domain-specific messages without
/// discarding the underlying kind.
#[derive(Error, Debug)]
pub enum Error {
    /// The device is already opened exclusively by another connection or
    /// another process. This one is user-actionable, so it is surfaced
    /// distinctly from all other open failures.
    #[error(
        "Access was denied when trying to connect to the device. Try closing all other programs that are using the device."
    )]
    AccessDenied,
    /// The device is no longer present, or an instance reference vanished
    /// mid-call. Callers should re-enumerate rather than retry.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// The requested operation is not available on this USB backend. For
    /// enumeration, callers should fall back to the alternate mode.
    #[error("{0} is not supported by this USB backend")]
    NotSupported(&'static str),
    /// Malformed request caught before any native call was made.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The OS returned a device instance id that does not have the expected
    /// `USB\VID_xxxx&PID_xxxx\<serial>` shape.
    #[error("Malformed device instance id: '{id}'")]
    MalformedInstanceId {
        /// The instance id string as returned by the OS.
        id: String,
    },
    /// A native call failed. Includes stalls and generic I/O errors; `detail`
    /// carries the OS error description or code.
    #[error("{operation} failed: {detail}")]
    TransferFailed {
        /// The operation that was being performed.
        operation: &'static str,
        /// Native error description or code.
        detail: String,
    },
    /// A control transfer that was expected to have no data stage moved data.
    #[error(
        "The control transfer was expected to have no data stage, but {transferred} bytes were transferred."
    )]
    UnexpectedDataStage {
        /// Number of bytes the transport reported moving.
        transferred: usize,
    },
    /// The fixed control-transfer timeout elapsed before completion.
    #[error("Timeout waiting for the control transfer to complete")]
    Timeout,
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
