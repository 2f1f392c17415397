//! Result type definitions and utilities for the application
//!
//! Result alias, error-mapping extensions and async helpers (timeouts,
//! retries) shared by the services.

use crate::core::error::AppError;

/// Application result type alias
///
/// ```rust
/// use solana_dashboard::core::result::AppResult;
/// use solana_dashboard::core::error::AppError;
///
/// fn check(amount: i64) -> AppResult<i64> {
///     if amount <= 0 {
///         return Err(AppError::validation("amount must be positive"));
///     }
///     Ok(amount)
/// }
/// ```
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Extension trait for `Result` to provide additional utility methods
pub trait ResultExt<T> {
    /// Map an error to a configuration error, keeping the original message
    fn map_config_err<F>(self, f: F) -> AppResult<T>
    where
        F: FnOnce() -> String;

    /// Map an error to a database error with table and operation context
    fn map_db_err(self, table: &str, operation: &str) -> AppResult<T>;

    /// Map an error to a validation error with field context
    fn map_validation_err(self, field: &str) -> AppResult<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn map_config_err<F>(self, f: F) -> AppResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::config(format!("{}: {}", f(), e)))
    }

    fn map_db_err(self, table: &str, operation: &str) -> AppResult<T> {
        self.map_err(|e| AppError::table(table, operation, e.to_string()))
    }

    fn map_validation_err(self, field: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: Some(field.to_string()),
            value: None,
        })
    }
}

/// Utility functions for working with results
pub mod utils {
    use super::*;
    use std::future::Future;
    use tokio::time::{timeout, Duration};

    /// Execute a future with a timeout, converting timeout to AppError
    pub async fn with_timeout<F, T>(duration: Duration, operation: &str, future: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match timeout(duration, future).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(
                format!("Operation '{}' timed out", operation),
                operation,
                duration.as_millis() as u64,
            )),
        }
    }

    /// Retry an operation with exponential backoff
    ///
    /// `max_attempts` counts every call, so `3` means one try plus two retries.
    /// Non-retryable errors are returned immediately unless `retry_all` is set.
    pub async fn retry_with_backoff<F, Fut, T>(
        mut operation: F,
        max_attempts: u32,
        initial_delay: Duration,
        operation_name: &str,
        retry_all: bool,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if attempt >= max_attempts || !(retry_all || error.is_retryable()) {
                        return Err(error);
                    }

                    let delay = initial_delay * 2_u32.pow(attempt - 1);
                    tracing::warn!(
                        "🔄 Operation '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                        operation_name,
                        attempt,
                        max_attempts,
                        delay,
                        error
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Return early with a configuration error
#[macro_export]
macro_rules! bail_config {
    ($msg:expr) => {
        return Err($crate::core::error::AppError::config($msg))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::core::error::AppError::config(format!($fmt, $($arg)*)))
    };
}

/// Return early with a validation error
#[macro_export]
macro_rules! bail_validation {
    ($msg:expr) => {
        return Err($crate::core::error::AppError::validation($msg))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::core::error::AppError::validation(format!($fmt, $($arg)*)))
    };
}

/// Return early with the given error unless the condition holds
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}
