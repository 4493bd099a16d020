use std::time::Duration;

/// Convenience result type used across the crate.
pub type HeadlessResult<T> = Result<T, HeadlessError>;

/// Error taxonomy for discovery, sampling and the resources they acquire.
#[derive(thiserror::Error, Debug)]
pub enum HeadlessError {
    /// Invalid caller input (timeouts, ports, ranges).
    #[error("config error: {0}")]
    Config(String),

    /// The browser process could not be started. Never retried.
    #[error("browser launch error: {0}")]
    BrowserLaunch(String),

    /// The content server could not be started.
    #[error("server start error: {0}")]
    ServerStart(String),

    /// The page crashed, closed or navigated away while work was in flight.
    #[error("page crash error: {0}")]
    PageCrash(String),

    /// Code running inside the page threw.
    #[error("script error{}: {message}", frame_suffix(.frame))]
    Script {
        /// Page-side error message.
        message: String,
        /// Page-side stack trace, when one was reported.
        stack: Option<String>,
        /// Frame being evaluated when the error surfaced.
        frame: Option<u64>,
    },

    /// A deadline elapsed before the page answered.
    #[error("timeout error: {stage} did not complete within {}ms", millis(.after))]
    Timeout {
        /// Pipeline stage that timed out.
        stage: &'static str,
        /// Configured deadline.
        after: Duration,
    },

    /// Composition metadata returned by the page is malformed.
    #[error("invalid composition error: composition '{id}': {reason}")]
    InvalidComposition {
        /// Offending composition id (or `#<index>` when the entry has no id).
        id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Errors when serializing or deserializing page payloads.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Releasing resources failed; the root cause, if any, is kept alongside.
    #[error("cleanup error: {}", cleanup_summary(.primary, .failures))]
    Cleanup {
        /// Error that aborted the pipeline before cleanup ran.
        primary: Option<Box<HeadlessError>>,
        /// Every disposal failure, in the order the disposers ran.
        failures: Vec<HeadlessError>,
    },

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HeadlessError {
    /// Build a [`HeadlessError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`HeadlessError::BrowserLaunch`] value.
    pub fn browser_launch(msg: impl Into<String>) -> Self {
        Self::BrowserLaunch(msg.into())
    }

    /// Build a [`HeadlessError::ServerStart`] value.
    pub fn server_start(msg: impl Into<String>) -> Self {
        Self::ServerStart(msg.into())
    }

    /// Build a [`HeadlessError::PageCrash`] value.
    pub fn page_crash(msg: impl Into<String>) -> Self {
        Self::PageCrash(msg.into())
    }

    /// Build a [`HeadlessError::Script`] value without stack or frame context.
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script {
            message: msg.into(),
            stack: None,
            frame: None,
        }
    }

    /// Build a [`HeadlessError::Timeout`] value.
    pub fn timeout(stage: &'static str, after: Duration) -> Self {
        Self::Timeout { stage, after }
    }

    /// Build a [`HeadlessError::InvalidComposition`] value.
    pub fn invalid_composition(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidComposition {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`HeadlessError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Attach frame context to a script error; other variants pass through unchanged.
    pub fn at_frame(self, at: Option<u64>) -> Self {
        match self {
            Self::Script {
                message,
                stack,
                frame,
            } => Self::Script {
                message,
                stack,
                frame: frame.or(at),
            },
            other => other,
        }
    }

    /// Whether a failed prop injection may be attempted again.
    ///
    /// Crashed pages must be re-acquired, and bad input stays bad.
    pub fn is_retryable_injection(&self) -> bool {
        !matches!(self, Self::PageCrash(_) | Self::Config(_))
    }

    /// Root cause for a [`HeadlessError::Cleanup`], or `self` for every other variant.
    pub fn root_cause(&self) -> &HeadlessError {
        match self {
            Self::Cleanup {
                primary: Some(primary),
                ..
            } => primary.root_cause(),
            other => other,
        }
    }
}

fn frame_suffix(frame: &Option<u64>) -> String {
    frame.map(|f| format!(" at frame {f}")).unwrap_or_default()
}

fn millis(after: &Duration) -> u128 {
    after.as_millis()
}

fn cleanup_summary(primary: &Option<Box<HeadlessError>>, failures: &[HeadlessError]) -> String {
    let failed = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    match primary {
        Some(primary) => format!("{primary} (cleanup also failed: {failed})"),
        None => format!("resource disposal failed: {failed}"),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
