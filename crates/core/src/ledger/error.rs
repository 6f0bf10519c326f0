//! Ledger error types.
//!
//! Every failure of a ledger operation is one `LedgerError` variant, grouped
//! into validation, not-found, idempotency, concurrency, compensation and
//! storage errors. `kind()` classifies a variant for callers.

use coffer_shared::AppError;
use coffer_shared::types::{BalanceLogId, OperationalGroupId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

use super::saga::{SagaState, SagaStep};
use crate::storage::StorageError;

/// Coarse classification of a ledger error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong; no state was changed.
    InvalidInput,
    /// A caller-supplied identifier does not resolve.
    NotFound,
    /// The request collides with existing state (duplicate reference, taken name).
    Conflict,
    /// A transient condition; the request may be retried unchanged.
    Unavailable,
    /// Persistence or compensation failure.
    Internal,
}

impl ErrorKind {
    /// Returns true for errors caused by the caller's input.
    ///
    /// Not-found and conflict errors reflect caller-supplied identifiers and
    /// keys, so they count as invalid input.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidInput | Self::NotFound | Self::Conflict)
    }
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Amount must be strictly positive.
    #[error("Amount must be greater than zero, got {0}")]
    InvalidAmount(Decimal),

    /// Amount has more decimal places than the currency allows.
    #[error("Amount {amount} has more than {scale} decimal places allowed for {currency}")]
    AmountPrecision {
        /// Requested amount.
        amount: Decimal,
        /// The currency.
        currency: String,
        /// Allowed decimal places.
        scale: u32,
    },

    /// Amount or resulting balance exceeds what a balance column holds.
    #[error("Amount {amount} overflows the {currency} balance")]
    AmountOverflow {
        /// Requested amount.
        amount: Decimal,
        /// The currency.
        currency: String,
    },

    /// Converted amount rounds to nothing in the target currency.
    #[error("Exchanging {amount} {from} to {to} yields zero after rounding")]
    ExchangeAmountTooSmall {
        /// Source amount.
        amount: Decimal,
        /// Source currency code.
        from: String,
        /// Target currency code.
        to: String,
    },

    /// Sort direction is neither `asc` nor `desc`.
    #[error("Invalid sort option for {field}: {value}")]
    InvalidSortOption {
        /// Sorted column.
        field: &'static str,
        /// The rejected direction.
        value: String,
    },

    /// Component is neither real money nor bonus money.
    #[error("Unknown balance component: {0}")]
    UnknownComponent(String),

    /// Currency is neither the virtual currency nor an ISO 4217 code.
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Source and target currencies must be different.
    #[error("Source and target currencies must be different")]
    SameCurrencyExchange,

    /// Stored exchange rate is not positive.
    #[error("Exchange rate {rate} for {from} to {to} must be positive")]
    InvalidExchangeRate {
        /// Source currency code.
        from: String,
        /// Target currency code.
        to: String,
        /// The stored rate.
        rate: Decimal,
    },

    /// Group does not exist or is not a deposit/withdrawal group.
    #[error("Unknown operational group: {0}")]
    UnknownOperationalGroup(String),

    /// Type does not exist or does not belong to the group.
    #[error("Unknown operational type: {0}")]
    UnknownOperationalType(String),

    /// A required field is empty.
    #[error("{0} can not be empty")]
    MissingField(&'static str),

    /// A required identifier is nil.
    #[error("Invalid {0}: nil id")]
    InvalidId(&'static str),

    /// Not enough funds for a debit.
    #[error(
        "Insufficient funds for user {user_id} in {currency}: available {available}, requested {requested}"
    )]
    InsufficientFunds {
        /// The user.
        user_id: UserId,
        /// The currency.
        currency: String,
        /// Current component value.
        available: Decimal,
        /// Requested debit.
        requested: Decimal,
    },

    /// Amount exceeds the administrator's funding limit.
    #[error("Funding amount {amount} exceeds admin {admin_id} limit of {limit}")]
    FundingLimitExceeded {
        /// The administrator.
        admin_id: UserId,
        /// Requested amount.
        amount: Decimal,
        /// Configured limit.
        limit: Decimal,
    },

    // ========== Not Found Errors ==========
    /// User has no balance in the currency.
    #[error("User {user_id} has no balance in {currency}")]
    NoBalance {
        /// The user.
        user_id: UserId,
        /// The currency.
        currency: String,
    },

    /// No exchange rate for the pair.
    #[error("Unable to get conversion for {from} to {to}")]
    NoExchangeRate {
        /// Source currency code.
        from: String,
        /// Target currency code.
        to: String,
    },

    /// User does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Administrator does not exist.
    #[error("Admin not found: {0}")]
    AdminNotFound(UserId),

    /// Balance log entry does not exist.
    #[error("Balance log not found: {0}")]
    BalanceLogNotFound(BalanceLogId),

    /// Operational group does not exist.
    #[error("Operational group not found: {0}")]
    OperationalGroupNotFound(OperationalGroupId),

    // ========== Idempotency Errors ==========
    /// Payment reference was already credited.
    #[error("Payment reference already processed: {0}")]
    DuplicatePaymentReference(String),

    /// A uniquely named record already exists.
    #[error("{entity} already exists: {name}")]
    AlreadyExists {
        /// Entity kind.
        entity: &'static str,
        /// The taken name.
        name: String,
    },

    // ========== Concurrency Errors ==========
    /// The per-user lock was not acquired in time.
    #[error("Timed out after {waited_ms}ms waiting for the lock of user {user_id}, please retry")]
    LockTimeout {
        /// The user whose lock was contended.
        user_id: UserId,
        /// How long the caller waited.
        waited_ms: u64,
    },

    // ========== Compensation Errors ==========
    /// A later step failed and the earlier steps were undone.
    #[error("{operation} reverted after {failed_step} failed: {source}")]
    Reverted {
        /// Operation name.
        operation: &'static str,
        /// The step that failed.
        failed_step: SagaStep,
        /// Cause of the failure.
        #[source]
        source: StorageError,
    },

    /// Undoing a partially applied operation failed; state is inconsistent.
    #[error("Unable to revert {operation}: {cause}")]
    CompensationFailed {
        /// Operation name.
        operation: &'static str,
        /// Description of the original and the compensation failure.
        cause: String,
    },

    /// Saga moved between states in an order it does not allow.
    #[error("Illegal {operation} transition from {from:?} to {to:?}")]
    IllegalTransition {
        /// Operation name.
        operation: &'static str,
        /// Current state.
        from: SagaState,
        /// Requested state.
        to: SagaState,
    },

    // ========== Storage Errors ==========
    /// Storage collaborator failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::AmountPrecision { .. }
            | Self::AmountOverflow { .. }
            | Self::ExchangeAmountTooSmall { .. }
            | Self::InvalidSortOption { .. }
            | Self::UnknownComponent(_)
            | Self::InvalidCurrency(_)
            | Self::SameCurrencyExchange
            | Self::InvalidExchangeRate { .. }
            | Self::UnknownOperationalGroup(_)
            | Self::UnknownOperationalType(_)
            | Self::MissingField(_)
            | Self::InvalidId(_)
            | Self::InsufficientFunds { .. }
            | Self::FundingLimitExceeded { .. } => ErrorKind::InvalidInput,

            Self::NoBalance { .. }
            | Self::NoExchangeRate { .. }
            | Self::UserNotFound(_)
            | Self::AdminNotFound(_)
            | Self::BalanceLogNotFound(_)
            | Self::OperationalGroupNotFound(_) => ErrorKind::NotFound,

            Self::DuplicatePaymentReference(_) | Self::AlreadyExists { .. } => ErrorKind::Conflict,

            Self::LockTimeout { .. } => ErrorKind::Unavailable,

            Self::Storage(err) => match err {
                StorageError::AlreadyExists { .. } => ErrorKind::Conflict,
                StorageError::NotFound { .. } => ErrorKind::NotFound,
                StorageError::Unavailable(_) => ErrorKind::Unavailable,
                StorageError::Backend(_) => ErrorKind::Internal,
            },

            Self::Reverted { .. }
            | Self::CompensationFailed { .. }
            | Self::IllegalTransition { .. }
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::AmountPrecision { .. } => "AMOUNT_PRECISION",
            Self::AmountOverflow { .. } => "AMOUNT_OVERFLOW",
            Self::ExchangeAmountTooSmall { .. } => "EXCHANGE_AMOUNT_TOO_SMALL",
            Self::InvalidSortOption { .. } => "INVALID_SORT_OPTION",
            Self::UnknownComponent(_) => "UNKNOWN_COMPONENT",
            Self::InvalidCurrency(_) => "INVALID_CURRENCY",
            Self::SameCurrencyExchange => "SAME_CURRENCY_EXCHANGE",
            Self::InvalidExchangeRate { .. } => "INVALID_EXCHANGE_RATE",
            Self::UnknownOperationalGroup(_) => "UNKNOWN_OPERATIONAL_GROUP",
            Self::UnknownOperationalType(_) => "UNKNOWN_OPERATIONAL_TYPE",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidId(_) => "INVALID_ID",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::FundingLimitExceeded { .. } => "FUNDING_LIMIT_EXCEEDED",
            Self::NoBalance { .. } => "NO_BALANCE",
            Self::NoExchangeRate { .. } => "NO_EXCHANGE_RATE",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::AdminNotFound(_) => "ADMIN_NOT_FOUND",
            Self::BalanceLogNotFound(_) => "BALANCE_LOG_NOT_FOUND",
            Self::OperationalGroupNotFound(_) => "OPERATIONAL_GROUP_NOT_FOUND",
            Self::DuplicatePaymentReference(_) => "DUPLICATE_PAYMENT_REFERENCE",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::Reverted { .. } => "OPERATION_REVERTED",
            Self::CompensationFailed { .. } => "COMPENSATION_FAILED",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 422 Unprocessable - business rules on valid input
            Self::InsufficientFunds { .. } | Self::FundingLimitExceeded { .. } => 422,
            _ => match self.kind() {
                ErrorKind::InvalidInput => 400,
                ErrorKind::NotFound => 404,
                ErrorKind::Conflict => 409,
                ErrorKind::Unavailable => 503,
                ErrorKind::Internal => 500,
            },
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match (&err, err.kind()) {
            (
                LedgerError::InsufficientFunds { .. } | LedgerError::FundingLimitExceeded { .. },
                _,
            ) => Self::BusinessRule(message),
            (_, ErrorKind::InvalidInput) => Self::Validation(message),
            (_, ErrorKind::NotFound) => Self::NotFound(message),
            (_, ErrorKind::Conflict) => Self::Conflict(message),
            (_, ErrorKind::Unavailable) => Self::Unavailable(message),
            (LedgerError::Storage(_), ErrorKind::Internal) => Self::Database(message),
            (_, ErrorKind::Internal) => Self::Internal(message),
        }
    }
}
