//! Unified error codes
//!
//! Error codes are shared by the server responses and the client decoder:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 6xxx: Product / stock errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,

    // ==================== 1xxx: Auth ====================
    /// Caller identity missing or malformed
    NotAuthenticated = 1001,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order already reached the terminal status
    OrderAlreadyTerminal = 4002,
    /// Order items can no longer be changed
    OrderLocked = 4003,
    /// Status name or number outside the known vocabulary
    UnknownOrderStatus = 4004,
    /// Caller's view of the status is out of date
    OrderStatusConflict = 4005,

    // ==================== 6xxx: Product / Stock ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product has invalid price
    ProductInvalidPrice = 6002,
    /// Not enough available stock for the reservation
    InsufficientStock = 6003,
    /// Release larger than the reserved amount
    InvalidRelease = 6004,
    /// Confirm larger than the reserved amount or the stock
    InvalidConfirm = 6005,
    /// Product still has outstanding reservations
    ProductInUse = 6006,
    /// Quantity must be greater than zero
    InvalidQuantity = 6007,
    /// Stock would drop below the reserved amount
    InvalidStock = 6008,

    // ==================== 9xxx: System ====================
    /// Internal error
    InternalError = 9001,
    /// Persistence collaborator failed
    StorageError = 9002,
    /// Transport failure between client and server
    NetworkError = 9003,
    /// Operation timed out
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// Client disconnected
    ClientDisconnected = 9301,
}

impl ErrorCode {
    /// Get the numeric value of this error code
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Transient failures the caller may retry
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::StorageError | ErrorCode::NetworkError | ErrorCode::TimeoutError
        )
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",

            // Auth
            ErrorCode::NotAuthenticated => "Caller identity is missing",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::OrderAlreadyTerminal => "Order has already been delivered",
            ErrorCode::OrderLocked => "Order can no longer be modified",
            ErrorCode::UnknownOrderStatus => "Unknown order status",
            ErrorCode::OrderStatusConflict => "Order status has changed",

            // Product / Stock
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductInvalidPrice => "Product has invalid price",
            ErrorCode::InsufficientStock => "Not enough stock",
            ErrorCode::InvalidRelease => "Release exceeds reserved quantity",
            ErrorCode::InvalidConfirm => "Confirm exceeds reserved quantity",
            ErrorCode::ProductInUse => "Product has outstanding reservations",
            ErrorCode::InvalidQuantity => "Quantity must be greater than zero",
            ErrorCode::InvalidStock => "Stock cannot drop below reserved quantity",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::StorageError => "Storage error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::ClientDisconnected => "Client disconnected",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when converting an unknown u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderAlreadyTerminal),
            4003 => Ok(ErrorCode::OrderLocked),
            4004 => Ok(ErrorCode::UnknownOrderStatus),
            4005 => Ok(ErrorCode::OrderStatusConflict),

            // Product / Stock
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductInvalidPrice),
            6003 => Ok(ErrorCode::InsufficientStock),
            6004 => Ok(ErrorCode::InvalidRelease),
            6005 => Ok(ErrorCode::InvalidConfirm),
            6006 => Ok(ErrorCode::ProductInUse),
            6007 => Ok(ErrorCode::InvalidQuantity),
            6008 => Ok(ErrorCode::InvalidStock),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::StorageError),
            9003 => Ok(ErrorCode::NetworkError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),
            9301 => Ok(ErrorCode::ClientDisconnected),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
