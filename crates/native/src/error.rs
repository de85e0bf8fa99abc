//! Native call failures.

/// Win32 `ERROR_INVALID_WINDOW_HANDLE`.
pub const ERROR_INVALID_WINDOW_HANDLE: u32 = 1400;
/// Win32 `ERROR_INVALID_MENU_HANDLE`.
pub const ERROR_INVALID_MENU_HANDLE: u32 = 1401;
/// Win32 `ERROR_MENU_ITEM_NOT_FOUND`.
pub const ERROR_MENU_ITEM_NOT_FOUND: u32 = 1456;
/// Win32 `ERROR_ALREADY_EXISTS`.
pub const ERROR_ALREADY_EXISTS: u32 = 183;
/// Win32 `ERROR_NOT_FOUND`.
pub const ERROR_NOT_FOUND: u32 = 1168;
/// Win32 `ERROR_GEN_FAILURE`, used when a call fails without setting an error code.
pub const ERROR_GEN_FAILURE: u32 = 31;

/// A failed native call together with the platform error code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: Win32 error {code}")]
pub struct NativeError {
    pub operation: &'static str,
    pub code: u32,
}

impl NativeError {
    pub fn new(operation: &'static str, code: u32) -> Self {
        Self { operation, code }
    }
}

/// Result alias for native calls.
pub type NativeResult<T> = Result<T, NativeError>;
