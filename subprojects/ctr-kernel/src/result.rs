//! Result codes returned to the emulated guest.
//!
//! Every kernel operation and every IPC reply reports its outcome to the guest as a 32-bit result
//! code. A failing call must surface as one of these codes rather than as a host-side fault, so all
//! the typed error enums in this workspace implement [`ToRawResultCode`].
//!
//! # Structure
//!
//! The 32-bit result code is structured as follows:
//!
//! - **Bits 0-9:** Description
//! - **Bits 10-17:** Module
//! - **Bits 18-20:** Reserved
//! - **Bits 21-26:** Summary
//! - **Bits 27-31:** Level
//!
//! A raw value of `0` is success.
//!
//! # References
//! - [3dbrew: Error codes](https://www.3dbrew.org/wiki/Error_codes)

/// Type alias for Result with [`Error`] as the error type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Mask for the description field (10 bits)
const DESCRIPTION_MASK: u32 = 0x3FF;
/// Mask for the module field (8 bits)
const MODULE_MASK: u32 = 0xFF;
/// Shift amount for the module field
const MODULE_SHIFT: u32 = 10;
/// Mask for the summary field (6 bits)
const SUMMARY_MASK: u32 = 0x3F;
/// Shift amount for the summary field
const SUMMARY_SHIFT: u32 = 21;
/// Mask for the level field (5 bits)
const LEVEL_MASK: u32 = 0x1F;
/// Shift amount for the level field
const LEVEL_SHIFT: u32 = 27;

/// A raw guest-visible result code.
///
/// This is the value written into the first reply word of a command buffer.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
#[repr(transparent)]
pub struct ResultCode(u32);

/// Successful result code
pub const RESULT_SUCCESS: ResultCode = ResultCode(0);

impl ResultCode {
    /// Creates a new [`ResultCode`] from a raw value
    #[inline]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Get the raw value of the [`ResultCode`]
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Creates a new [`ResultCode`] from its constituent fields
    #[inline]
    pub const fn new(
        description: u32,
        module: ErrorModule,
        summary: ErrorSummary,
        level: ErrorLevel,
    ) -> Self {
        Self(
            (description & DESCRIPTION_MASK)
                | ((module as u32 & MODULE_MASK) << MODULE_SHIFT)
                | ((summary as u32 & SUMMARY_MASK) << SUMMARY_SHIFT)
                | ((level as u32 & LEVEL_MASK) << LEVEL_SHIFT),
        )
    }

    /// Returns true if the [`ResultCode`] represents a success
    #[inline]
    pub const fn is_success(&self) -> bool {
        self.0 == RESULT_SUCCESS.0
    }

    /// Returns true if the [`ResultCode`] represents a failure
    #[inline]
    pub const fn is_error(&self) -> bool {
        !self.is_success()
    }

    /// Returns the description value
    #[inline]
    pub const fn description(&self) -> u32 {
        self.0 & DESCRIPTION_MASK
    }

    /// Returns the raw module number that reported the error
    #[inline]
    pub const fn module(&self) -> u8 {
        ((self.0 >> MODULE_SHIFT) & MODULE_MASK) as u8
    }

    /// Returns the raw summary value
    #[inline]
    pub const fn summary(&self) -> u8 {
        ((self.0 >> SUMMARY_SHIFT) & SUMMARY_MASK) as u8
    }

    /// Returns the raw level value
    #[inline]
    pub const fn level(&self) -> u8 {
        ((self.0 >> LEVEL_SHIFT) & LEVEL_MASK) as u8
    }

    /// Converts this code into a [`Result`], mapping success to `Ok(())`.
    #[inline]
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error(self))
        }
    }
}

impl core::fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResultCode")
            .field("raw", &format_args!("{:#010X}", self.0))
            .field("description", &self.description())
            .field("module", &self.module())
            .field("summary", &self.summary())
            .field("level", &self.level())
            .finish()
    }
}

/// The error type for failing result codes.
///
/// Wraps a non-success [`ResultCode`] so it composes with `?` and `core::error::Error`.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct Error(ResultCode);

impl Error {
    /// Returns the wrapped result code
    #[inline]
    pub const fn code(&self) -> ResultCode {
        self.0
    }

    /// Returns the raw value (`u32`) of this error code
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0.to_raw()
    }
}

impl core::fmt::Display for Error {
    /// Formats the error as `0xLLLLLLLL (module M, description D)`.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:#010X} (module {}, description {})",
            self.0.to_raw(),
            self.0.module(),
            self.0.description()
        )
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Error").field(&self.0).finish()
    }
}

impl core::error::Error for Error {}

impl From<ResultCode> for Error {
    fn from(value: ResultCode) -> Self {
        Self(value)
    }
}

/// Conversion from a typed error into the raw code the guest observes.
pub trait ToRawResultCode {
    /// Returns the guest-visible result code for this error.
    fn to_rc(self) -> ResultCode;
}

impl ToRawResultCode for Error {
    fn to_rc(self) -> ResultCode {
        self.0
    }
}

/// Module that reported a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorModule {
    Common = 0,
    Kernel = 1,
    Util = 2,
    FileServer = 3,
    LoaderServer = 4,
    Os = 6,
    Fs = 17,
    Hid = 19,
    Srv = 25,
    Soc = 28,
    Applet = 51,
    Cec = 66,
    Ir = 67,
    Application = 254,
    InvalidResult = 255,
}

/// Broad category of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorSummary {
    Success = 0,
    NothingHappened = 1,
    WouldBlock = 2,
    OutOfResource = 3,
    NotFound = 4,
    InvalidState = 5,
    NotSupported = 6,
    InvalidArgument = 7,
    WrongArgument = 8,
    Canceled = 9,
    StatusChanged = 10,
    Internal = 11,
    InvalidResultValue = 63,
}

/// Severity of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorLevel {
    Success = 0,
    Info = 1,
    Status = 25,
    Temporary = 26,
    Permanent = 27,
    Usage = 28,
    Reinitialize = 29,
    Reset = 30,
    Fatal = 31,
}

/// Common description values shared by all modules.
pub mod description {
    pub const INVALID_SECTION: u32 = 1000;
    pub const TOO_LARGE: u32 = 1001;
    pub const NOT_AUTHORIZED: u32 = 1002;
    pub const ALREADY_DONE: u32 = 1003;
    pub const INVALID_SIZE: u32 = 1004;
    pub const INVALID_ENUM_VALUE: u32 = 1005;
    pub const INVALID_COMBINATION: u32 = 1006;
    pub const NO_DATA: u32 = 1007;
    pub const BUSY: u32 = 1008;
    pub const MISALIGNED_ADDRESS: u32 = 1009;
    pub const MISALIGNED_SIZE: u32 = 1010;
    pub const OUT_OF_MEMORY: u32 = 1011;
    pub const NOT_IMPLEMENTED: u32 = 1012;
    pub const INVALID_ADDRESS: u32 = 1013;
    pub const INVALID_POINTER: u32 = 1014;
    pub const INVALID_HANDLE: u32 = 1015;
    pub const NOT_INITIALIZED: u32 = 1016;
    pub const ALREADY_INITIALIZED: u32 = 1017;
    pub const NOT_FOUND: u32 = 1018;
    pub const CANCEL_REQUESTED: u32 = 1019;
    pub const ALREADY_EXISTS: u32 = 1020;
    pub const OUT_OF_RANGE: u32 = 1021;
    pub const TIMEOUT: u32 = 1022;
    pub const INVALID_RESULT_VALUE: u32 = 1023;
}

/// Kernel-specific description values.
pub mod kernel_description {
    pub const OUT_OF_HANDLES: u32 = 19;
    pub const SESSION_CLOSED_BY_REMOTE: u32 = 26;
    pub const PORT_NAME_TOO_LONG: u32 = 30;
    pub const WRONG_PERMISSION: u32 = 46;
    pub const INVALID_BUFFER_DESCRIPTOR: u32 = 48;
    pub const MAX_CONNECTIONS_REACHED: u32 = 52;
    pub const COMMAND_TOO_LARGE: u32 = 54;
}

/// The command buffer declares more words than fit in the IPC buffer, or a handle descriptor
/// claims more payload words than the message carries.
pub const ERR_COMMAND_TOO_LARGE: ResultCode = ResultCode::new(
    kernel_description::COMMAND_TOO_LARGE,
    ErrorModule::Os,
    ErrorSummary::InvalidState,
    ErrorLevel::Status,
);

/// The destination handle table has no free slot.
pub const ERR_OUT_OF_HANDLES: ResultCode = ResultCode::new(
    kernel_description::OUT_OF_HANDLES,
    ErrorModule::Kernel,
    ErrorSummary::OutOfResource,
    ErrorLevel::Permanent,
);

/// The handle does not name a live table entry.
pub const ERR_INVALID_HANDLE: ResultCode = ResultCode::new(
    description::INVALID_HANDLE,
    ErrorModule::Kernel,
    ErrorSummary::InvalidArgument,
    ErrorLevel::Permanent,
);

/// A translate-region word does not encode a supported descriptor.
pub const ERR_INVALID_BUFFER_DESCRIPTOR: ResultCode = ResultCode::new(
    kernel_description::INVALID_BUFFER_DESCRIPTOR,
    ErrorModule::Os,
    ErrorSummary::InvalidArgument,
    ErrorLevel::Permanent,
);

/// The address is not mapped in the process address space.
pub const ERR_INVALID_ADDRESS: ResultCode = ResultCode::new(
    description::INVALID_ADDRESS,
    ErrorModule::Os,
    ErrorSummary::InvalidArgument,
    ErrorLevel::Usage,
);

/// A semaphore release would exceed its maximum count.
pub const ERR_OUT_OF_RANGE_KERNEL: ResultCode = ResultCode::new(
    description::OUT_OF_RANGE,
    ErrorModule::Kernel,
    ErrorSummary::InvalidArgument,
    ErrorLevel::Permanent,
);
