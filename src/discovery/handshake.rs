//! Host side of the in-page protocol: prop injection, bundle mode, readiness.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::browser::driver::Page;
use crate::browser::evaluate::evaluate;
use crate::discovery::options::{PageContract, READY_POLL_INTERVAL};
use crate::foundation::error::{HeadlessError, HeadlessResult};

/// Runtime mode the bundle is switched into before it is queried.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BundleMode {
    /// Only list compositions; no playback.
    Evaluation,
    /// Mount one composition so it can be seeked frame by frame.
    Composition {
        /// Composition to mount.
        #[serde(rename = "compositionName")]
        composition_name: String,
    },
}

/// Everything written into the page before its own scripts run.
pub(crate) struct Injection<'a> {
    pub(crate) serve_url: &'a str,
    pub(crate) input_props: &'a Value,
    pub(crate) env_variables: &'a BTreeMap<String, String>,
    pub(crate) initial_frame: u64,
    pub(crate) proxy_port: u16,
    pub(crate) audio_enabled: bool,
    pub(crate) video_enabled: bool,
    pub(crate) contract: &'a PageContract,
    pub(crate) timeout: Duration,
}

/// Script assigning the injected globals.
pub(crate) fn init_script(inj: &Injection<'_>) -> HeadlessResult<String> {
    if !inj.input_props.is_object() {
        return Err(HeadlessError::config("input props must be a JSON object"));
    }
    let c = inj.contract;
    let globals: [(&str, Value); 6] = [
        (c.input_props.as_str(), inj.input_props.clone()),
        (
            c.env_variables.as_str(),
            serde_json::to_value(inj.env_variables).map_err(encode_err)?,
        ),
        (c.initial_frame.as_str(), Value::from(inj.initial_frame)),
        (c.proxy_port.as_str(), Value::from(inj.proxy_port)),
        (c.audio_enabled.as_str(), Value::Bool(inj.audio_enabled)),
        (c.video_enabled.as_str(), Value::Bool(inj.video_enabled)),
    ];

    let mut script = String::new();
    for (name, value) in globals {
        let key = serde_json::to_string(name).map_err(encode_err)?;
        let value = serde_json::to_string(&value).map_err(encode_err)?;
        script.push_str(&format!("window[{key}] = {value};\n"));
    }
    Ok(script)
}

fn encode_err(e: serde_json::Error) -> HeadlessError {
    HeadlessError::serde(format!("encode injected globals: {e}"))
}

/// Install the injected globals, navigate to the bundle and check it speaks the protocol.
///
/// Navigation races the init script, so a failed attempt is retried up to `retries_remaining`
/// times. Crashed pages and bad input fail at once.
pub(crate) async fn set_props_and_env(
    page: &dyn Page,
    inj: &Injection<'_>,
    retries_remaining: u32,
) -> HeadlessResult<()> {
    let script = init_script(inj)?;
    page.add_init_script(&script).await?;

    let mut retries = retries_remaining;
    loop {
        match navigate_and_verify(page, inj).await {
            Ok(()) => return Ok(()),
            Err(e) if retries > 0 && e.is_retryable_injection() => {
                warn!(error = %e, retries_remaining = retries, "prop injection failed, retrying");
                retries -= 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn navigate_and_verify(page: &dyn Page, inj: &Injection<'_>) -> HeadlessResult<()> {
    debug!(url = inj.serve_url, "navigating");
    tokio::time::timeout(inj.timeout, page.goto(inj.serve_url))
        .await
        .map_err(|_| HeadlessError::timeout("navigation", inj.timeout))??;

    let setter = &inj.contract.set_bundle_mode;
    let defined: bool =
        evaluate(page, &PageContract::is_function(setter)?, &[], None, inj.timeout).await?;
    if !defined {
        return Err(HeadlessError::script(format!(
            "page at {} does not define window.{setter}; it is not a compatible bundle",
            inj.serve_url
        )));
    }
    Ok(())
}

/// Switch the bundle's runtime mode.
pub(crate) async fn set_bundle_mode(
    page: &dyn Page,
    contract: &PageContract,
    mode: &BundleMode,
    timeout: Duration,
) -> HeadlessResult<()> {
    let payload = serde_json::to_value(mode)
        .map_err(|e| HeadlessError::serde(format!("encode bundle mode: {e}")))?;
    let _: Value = evaluate(
        page,
        &PageContract::call(&contract.set_bundle_mode)?,
        &[payload],
        None,
        timeout,
    )
    .await?;
    Ok(())
}

/// Poll the readiness flag until it is `true`.
///
/// Fails with a `readiness` timeout, distinct from evaluation errors, when the deadline
/// passes first.
pub(crate) async fn wait_for_ready(
    page: &dyn Page,
    contract: &PageContract,
    frame: Option<u64>,
    timeout: Duration,
) -> HeadlessResult<()> {
    let probe = PageContract::read(&contract.ready_flag)?;
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(HeadlessError::timeout("readiness", timeout));
        }
        let ready: Value = match evaluate(page, &probe, &[], frame, remaining).await {
            Ok(v) => v,
            Err(HeadlessError::Timeout { .. }) => {
                return Err(HeadlessError::timeout("readiness", timeout));
            }
            Err(e) => return Err(e),
        };
        if ready == Value::Bool(true) {
            return Ok(());
        }
        tokio::time::sleep(READY_POLL_INTERVAL.min(remaining)).await;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/discovery/handshake.rs"]
mod tests;
