use thiserror::Error;
use tracing::warn;

/// Failures reported by the UI driver.
///
/// Everything except [`DriverError::SessionLost`] is a transient UI condition
/// that the scraper recovers from locally.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    NoSuchElement(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("driver command failed: {0}")]
    Command(String),

    #[error("driver session lost: {0}")]
    SessionLost(String),
}

impl DriverError {
    /// Only a lost session ends the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SessionLost(_))
    }
}

/// Swallows transient driver failures, keeping fatal ones.
pub trait Transient<T> {
    /// `Ok(Some(v))` on success, `Ok(None)` after logging a transient failure,
    /// `Err` only when the session is gone.
    fn transient(self, action: &str) -> Result<Option<T>, DriverError>;
}

impl<T> Transient<T> for Result<T, DriverError> {
    fn transient(self, action: &str) -> Result<Option<T>, DriverError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("⚠️ {} failed: {}", action, e);
                Ok(None)
            }
        }
    }
}
