use std::sync::Arc;

/// Console message category reported by the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleType {
    /// `console.log`
    Log,
    /// `console.debug`
    Debug,
    /// `console.info`
    Info,
    /// `console.warn`
    Warning,
    /// `console.error`
    Error,
    /// `console.trace`
    Trace,
    /// Anything else (`table`, `dir`, `assert`, ...).
    Other,
}

impl ConsoleType {
    /// Map a protocol-level console type name.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "log" => Self::Log,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warning,
            "error" => Self::Error,
            "trace" => Self::Trace,
            _ => Self::Other,
        }
    }
}

/// One frame of a page-side stack trace.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Script URL.
    pub url: String,
    /// Function name, empty for anonymous code.
    pub function_name: String,
    /// 0-based line number.
    pub line: u32,
    /// 0-based column number.
    pub column: u32,
}

/// Console message captured from a page.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserLog {
    /// Rendered message text.
    pub text: String,
    /// Console method that produced the message.
    #[serde(rename = "type")]
    pub log_type: ConsoleType,
    /// Stack captured at the call site.
    pub stack_trace: Vec<StackFrame>,
}

impl BrowserLog {
    /// Message text as written to the log, optionally indented under the host's own output.
    pub fn display_line(&self, indent: bool) -> String {
        if indent {
            self.text
                .lines()
                .map(|line| format!("    {line}"))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            self.text.clone()
        }
    }
}

/// Caller callback receiving forwarded console messages.
pub type LogCallback = Arc<dyn Fn(&BrowserLog) + Send + Sync>;

#[cfg(test)]
#[path = "../../tests/unit/browser/log.rs"]
mod tests;
