use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::driver::{Browser, LaunchOptions};
use crate::browser::log::LogCallback;
use crate::foundation::error::{HeadlessError, HeadlessResult};
use crate::server::manager::ContentServer;

/// Deadline applied when the caller does not set one.
pub const DEFAULT_TIMEOUT_MS: f64 = 30_000.0;

/// How often the readiness flag is polled.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Retries granted to input-prop injection by default.
pub const DEFAULT_PROP_RETRIES: u32 = 2;

/// Options accepted by [`crate::discover`] and reused by [`crate::sample_asset_positions`].
#[derive(Clone)]
pub struct DiscoverOptions {
    /// Props handed to the bundle; must serialize to a JSON object.
    pub input_props: serde_json::Value,
    /// Environment variables exposed to the bundle.
    pub env_variables: BTreeMap<String, String>,
    /// Per-stage deadline in milliseconds. `None` means [`DEFAULT_TIMEOUT_MS`].
    pub timeout_ms: Option<f64>,
    /// Browser launch configuration.
    pub chromium_options: LaunchOptions,
    /// Desired port for a newly started bundle server.
    pub port: Option<u16>,
    /// Browser binary to launch instead of the engine default.
    pub browser_executable: Option<PathBuf>,
    /// Receives every console message of the page.
    pub on_browser_log: Option<LogCallback>,
    /// Reuse an already running browser. It is left running afterwards.
    pub browser_instance: Option<Arc<dyn Browser>>,
    /// Reuse an already running content server. It is left running afterwards.
    pub server: Option<Arc<ContentServer>>,
    /// Log served files and browser console output.
    pub verbose: bool,
    /// Retry budget for input-prop injection.
    pub prop_retries: u32,
    /// Names of the globals the bundle exposes.
    pub page_contract: PageContract,
    /// Indent browser console lines in verbose logs. Deprecated.
    #[doc(hidden)]
    pub indent: bool,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            input_props: serde_json::Value::Object(serde_json::Map::new()),
            env_variables: BTreeMap::new(),
            timeout_ms: None,
            chromium_options: LaunchOptions::default(),
            port: None,
            browser_executable: None,
            on_browser_log: None,
            browser_instance: None,
            server: None,
            verbose: false,
            prop_retries: DEFAULT_PROP_RETRIES,
            page_contract: PageContract::default(),
            indent: false,
        }
    }
}

impl fmt::Debug for DiscoverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverOptions")
            .field("input_props", &self.input_props)
            .field("env_variables", &self.env_variables.keys().collect::<Vec<_>>())
            .field("timeout_ms", &self.timeout_ms)
            .field("chromium_options", &self.chromium_options)
            .field("port", &self.port)
            .field("browser_executable", &self.browser_executable)
            .field("on_browser_log", &self.on_browser_log.is_some())
            .field("browser_instance", &self.browser_instance.is_some())
            .field("server", &self.server.is_some())
            .field("verbose", &self.verbose)
            .field("prop_retries", &self.prop_retries)
            .finish_non_exhaustive()
    }
}

/// Names of the page globals making up the host/bundle protocol.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageContract {
    /// Function switching the bundle between evaluation and composition mode.
    pub set_bundle_mode: String,
    /// Boolean flag the bundle sets once it can be queried.
    pub ready_flag: String,
    /// Function returning the composition list.
    pub get_compositions: String,
    /// Global receiving the input props.
    pub input_props: String,
    /// Global receiving the environment variables.
    pub env_variables: String,
    /// Global receiving the first frame to show.
    pub initial_frame: String,
    /// Global receiving the auxiliary server port.
    pub proxy_port: String,
    /// Global toggling audio playback.
    pub audio_enabled: String,
    /// Global toggling video playback.
    pub video_enabled: String,
    /// Function moving the composition to a frame.
    pub seek: String,
    /// Function listing the media elements mounted at the current frame.
    pub collect_assets: String,
}

impl Default for PageContract {
    fn default() -> Self {
        Self {
            set_bundle_mode: "wavyte_setBundleMode".to_owned(),
            ready_flag: "wavyte_ready".to_owned(),
            get_compositions: "wavyte_getStaticCompositions".to_owned(),
            input_props: "wavyte_inputProps".to_owned(),
            env_variables: "wavyte_envVariables".to_owned(),
            initial_frame: "wavyte_initialFrame".to_owned(),
            proxy_port: "wavyte_proxyPort".to_owned(),
            audio_enabled: "wavyte_audioEnabled".to_owned(),
            video_enabled: "wavyte_videoEnabled".to_owned(),
            seek: "wavyte_seek".to_owned(),
            collect_assets: "wavyte_collectAssets".to_owned(),
        }
    }
}

impl PageContract {
    /// Function source calling global function `name` with its own arguments.
    pub(crate) fn call(name: &str) -> HeadlessResult<String> {
        let key = quoted(name)?;
        Ok(format!("(...args) => window[{key}](...args)"))
    }

    /// Function source reading global `name`.
    pub(crate) fn read(name: &str) -> HeadlessResult<String> {
        let key = quoted(name)?;
        Ok(format!("() => window[{key}]"))
    }

    /// Function source reporting whether global `name` is callable.
    pub(crate) fn is_function(name: &str) -> HeadlessResult<String> {
        let key = quoted(name)?;
        Ok(format!("() => typeof window[{key}] === 'function'"))
    }
}

fn quoted(name: &str) -> HeadlessResult<String> {
    if name.is_empty() {
        return Err(HeadlessError::config("page contract names must be non-empty"));
    }
    serde_json::to_string(name).map_err(|e| HeadlessError::serde(e.to_string()))
}

/// Validate a caller deadline: positive and finite. `None` yields the default.
pub fn validate_timeout(timeout_ms: Option<f64>) -> HeadlessResult<Duration> {
    let ms = timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    if !ms.is_finite() {
        return Err(HeadlessError::config(format!(
            "timeout must be a finite number of milliseconds, got {ms}"
        )));
    }
    if ms <= 0.0 {
        return Err(HeadlessError::config(format!(
            "timeout must be positive, got {ms}"
        )));
    }
    Duration::try_from_secs_f64(ms / 1000.0)
        .map_err(|e| HeadlessError::config(format!("timeout {ms}ms is out of range: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/discovery/options.rs"]
mod tests;
