//! Error taxonomy and C-ABI error codes for ipam_core

use crate::types::IndexKey;
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

/// Errors reported by a [`crate::storage::Storage`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("storage call cancelled")]
    Cancelled,
    #[error("storage backend: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed claim: none or several of address/prefix/range, bad
    /// literal, missing dynamic size.
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("ownership conflict: {prefix} is owned by claim {claim} ({owner})")]
    OwnershipConflict { prefix: String, claim: String, owner: String },
    #[error("no parent: {0}")]
    NoParent(String),
    #[error("nesting violation: {0}")]
    NestingViolation(String),
    #[error("exhausted pool: {0}")]
    ExhaustedPool(String),
    #[error("index {0} is not initialized")]
    NotInitialized(IndexKey),
    #[error("inconsistent range: {0}")]
    InconsistentRange(String),
    #[error("index {0} not found")]
    IndexNotFound(IndexKey),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("json: {0}")]
    Json(String),
}

impl Error {
    /// Stable reason string, used in failed claim conditions and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Syntax(_) => "SyntaxError",
            Error::OwnershipConflict { .. } => "OwnershipConflict",
            Error::NoParent(_) => "NoParent",
            Error::NestingViolation(_) => "NestingViolation",
            Error::ExhaustedPool(_) => "ExhaustedPool",
            Error::NotInitialized(_) => "NotInitialized",
            Error::InconsistentRange(_) => "InconsistentRange",
            Error::IndexNotFound(_) => "IndexNotFound",
            Error::Storage(_) => "StorageError",
            Error::Json(_) => "SyntaxError",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ───────────────────────── C ABI ─────────────────────────────────────── //

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    SyntaxError = 1,
    OwnershipConflict = 2,
    NoParent = 3,
    NestingViolation = 4,
    ExhaustedPool = 5,
    NotInitialized = 6,
    InconsistentRange = 7,
    NotFound = 8,
    StorageFailed = 9,
    InvalidHandle = 10,
    Utf8Error = 11,
    BufferTooSmall = 12,
    Unknown = 255,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::SyntaxError => "Syntax error",
            ErrorCode::OwnershipConflict => "Ownership conflict",
            ErrorCode::NoParent => "No parent",
            ErrorCode::NestingViolation => "Nesting violation",
            ErrorCode::ExhaustedPool => "Exhausted pool",
            ErrorCode::NotInitialized => "Index not initialized",
            ErrorCode::InconsistentRange => "Inconsistent range",
            ErrorCode::NotFound => "Not found",
            ErrorCode::StorageFailed => "Storage failed",
            ErrorCode::InvalidHandle => "Invalid handle",
            ErrorCode::Utf8Error => "UTF-8 conversion error",
            ErrorCode::BufferTooSmall => "Buffer too small",
            ErrorCode::Unknown => "Unknown error",
        }
    }

    /// NUL-terminated variant of [`ErrorCode::as_str`] for C callers.
    pub fn as_cstr(self) -> &'static [u8] {
        match self {
            ErrorCode::Success => b"Success\0",
            ErrorCode::SyntaxError => b"Syntax error\0",
            ErrorCode::OwnershipConflict => b"Ownership conflict\0",
            ErrorCode::NoParent => b"No parent\0",
            ErrorCode::NestingViolation => b"Nesting violation\0",
            ErrorCode::ExhaustedPool => b"Exhausted pool\0",
            ErrorCode::NotInitialized => b"Index not initialized\0",
            ErrorCode::InconsistentRange => b"Inconsistent range\0",
            ErrorCode::NotFound => b"Not found\0",
            ErrorCode::StorageFailed => b"Storage failed\0",
            ErrorCode::InvalidHandle => b"Invalid handle\0",
            ErrorCode::Utf8Error => b"UTF-8 conversion error\0",
            ErrorCode::BufferTooSmall => b"Buffer too small\0",
            ErrorCode::Unknown => b"Unknown error\0",
        }
    }
}

// Thread-local last error for C-ABI
thread_local! {
    static LAST_ERROR: RefCell<(ErrorCode, CString)> =
        RefCell::new((ErrorCode::Success, CString::default()));
}

pub fn set_last_error(code: ErrorCode, message: &str) {
    let msg = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|cell| *cell.borrow_mut() = (code, msg));
}

pub fn get_last_error() -> ErrorCode {
    LAST_ERROR.with(|cell| cell.borrow().0)
}

pub fn get_last_error_message() -> String {
    LAST_ERROR.with(|cell| cell.borrow().1.to_string_lossy().into_owned())
}

#[no_mangle]
pub extern "C" fn ipam_last_error() -> ErrorCode {
    get_last_error()
}

/// Copies the last error message (NUL-terminated, truncated) into `buf`.
/// Returns the full message length without the terminator.
///
/// # Safety
/// `buf` must be null or valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn ipam_last_error_message(buf: *mut c_char, len: usize) -> usize {
    LAST_ERROR.with(|cell| {
        let cell = cell.borrow();
        let bytes = cell.1.as_bytes();
        if !buf.is_null() && len > 0 {
            let n = bytes.len().min(len - 1);
            std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, buf, n);
            *buf.add(n) = 0;
        }
        bytes.len()
    })
}

#[no_mangle]
pub extern "C" fn ipam_strerror(code: ErrorCode) -> *const c_char {
    code.as_cstr().as_ptr() as *const c_char
}

// Map internal Error to ErrorCode
pub fn map_error(e: &Error) -> ErrorCode {
    match e {
        Error::Syntax(_) | Error::Json(_) => ErrorCode::SyntaxError,
        Error::OwnershipConflict { .. } => ErrorCode::OwnershipConflict,
        Error::NoParent(_) => ErrorCode::NoParent,
        Error::NestingViolation(_) => ErrorCode::NestingViolation,
        Error::ExhaustedPool(_) => ErrorCode::ExhaustedPool,
        Error::NotInitialized(_) => ErrorCode::NotInitialized,
        Error::InconsistentRange(_) => ErrorCode::InconsistentRange,
        Error::IndexNotFound(_) | Error::Storage(StorageError::NotFound(_)) => ErrorCode::NotFound,
        Error::Storage(_) => ErrorCode::StorageFailed,
    }
}
