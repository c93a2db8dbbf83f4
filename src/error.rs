//! Error types for the backplane controller.

/// Top level error type. Module specific failures are listed as their
/// own variants; collaborator drivers report textual descriptions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum Error {
    /// Error caused by a low level peripheral driver
    DriverError(&'static str),
    /// Error caused by a faulty configuration
    ConfigurationError(&'static str),
    /// Error caused by a high level device driver
    DeviceError(&'static str),
    /// Electrically invalid or unreadable connector lines
    SignalFault,
    ChecksumMismatch,
    UnknownOpcode(u8),
    MalformedFrame,
    IndexOutOfRange(u8),
    NotPermitted,
    ResponseTooLong,
    RecordNotFound,
    RecordCorrupt,
    RecordTooLarge,
    MalformedRecord,
    WriteVerifyFailed,
    DuplicateRoute,
    RouteOutOfRange,
    TooManyRoutes,
    TooManyConnectors,
}

/// Classification of every error by how the controller recovers from it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(target_arch = "arm", derive(defmt::Format))]
pub enum Kind {
    /// Transient. The connector goes `Unknown` until the lines settle.
    SignalFault,
    /// Reported to the host as a failure status. No state changes.
    ProtocolError,
    /// Factory defaults are used and a host readable fault flag is raised.
    ConfigCorrupt,
    /// The controller halts with the change detect line asserted.
    FatalInitFault,
    /// A collaborator driver failed. The operation may be retried.
    DeviceError,
}

impl Error {
    pub fn kind(&self) -> Kind {
        match self {
            Error::SignalFault => Kind::SignalFault,
            Error::ChecksumMismatch
            | Error::UnknownOpcode(_)
            | Error::MalformedFrame
            | Error::IndexOutOfRange(_)
            | Error::NotPermitted
            | Error::ResponseTooLong => Kind::ProtocolError,
            Error::RecordCorrupt | Error::MalformedRecord => Kind::ConfigCorrupt,
            Error::ConfigurationError(_)
            | Error::DuplicateRoute
            | Error::RouteOutOfRange
            | Error::TooManyRoutes
            | Error::TooManyConnectors => Kind::FatalInitFault,
            Error::DriverError(_)
            | Error::DeviceError(_)
            | Error::RecordNotFound
            | Error::RecordTooLarge
            | Error::WriteVerifyFailed => Kind::DeviceError,
        }
    }

    pub fn is_fatal(&self) -> bool { self.kind() == Kind::FatalInitFault }

    /// Reports the error through the logging backend.
    pub fn report(&self) {
        match self {
            Error::DriverError(text) => error!("[Driver Error] -> {}", text),
            Error::ConfigurationError(text) => error!("[Configuration Error] -> {}", text),
            Error::DeviceError(text) => error!("[Device Error] -> {}", text),
            Error::UnknownOpcode(opcode) => error!("[Protocol Error] -> Unknown opcode {}", opcode),
            Error::IndexOutOfRange(index) => {
                error!("[Protocol Error] -> Index {} out of range", index)
            }
            other => error!("[{:?}] -> {:?}", other.kind(), other),
        }
    }
}

/// Conversion from driver specific errors. Implementing it for a driver
/// error is enough to use `?` on that driver's results.
pub trait Convertible {
    fn into(self) -> Error;
}

impl<T: Convertible> From<T> for Error {
    fn from(t: T) -> Self { t.into() }
}

/// Exposes a report_unwrap() method that behaves like
/// unwrap(), but also reports any errors before panicking.
pub trait ReportOnUnwrap<T> {
    fn report_unwrap(self) -> T;
}

impl<T> ReportOnUnwrap<T> for Result<T, Error> {
    fn report_unwrap(self) -> T {
        match self {
            Ok(value) => value,
            Err(error) => {
                error.report();
                panic!();
            }
        }
    }
}
