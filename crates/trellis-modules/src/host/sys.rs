//! Logging, environment, and goal accessors.

use extism::{CurrentPlugin, Error, UserData, Val};

use trellis_core::script_abi::LogLevel;

use crate::binding::HostState;

use super::util::write_output;

// ---------------------------------------------------------------------------
// trellis_log(level, message)
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn log_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    _outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let level: String = plugin.memory_get_val(&inputs[0])?;
    let message: String = plugin.memory_get_val(&inputs[1])?;

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let project = state.project_id.as_str().to_owned();
    let log = state.log.clone();
    drop(state);

    let parsed_level: LogLevel =
        serde_json::from_str(&format!("\"{level}\"")).unwrap_or(LogLevel::Info);
    log.append(parsed_level, &message);

    match parsed_level {
        LogLevel::Trace => tracing::trace!(project = %project, "{message}"),
        LogLevel::Debug => tracing::debug!(project = %project, "{message}"),
        LogLevel::Info => tracing::info!(project = %project, "{message}"),
        LogLevel::Warn => tracing::warn!(project = %project, "{message}"),
        LogLevel::Error => tracing::error!(project = %project, "{message}"),
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// trellis_env_get(key) -> value
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn env_get_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let key: String = plugin.memory_get_val(&inputs[0])?;

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let value = state.env.get(&key).cloned().unwrap_or_default();
    drop(state);

    write_output(plugin, outputs, &value)
}

// ---------------------------------------------------------------------------
// trellis_goal_get(name) -> value_json
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn goal_get_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let name: String = plugin.memory_get_val(&inputs[0])?;

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let value = state.goals.get(&name).cloned();
    drop(state);

    let result = match value {
        Some(v) => serde_json::to_string(&v).unwrap_or_default(),
        None => String::new(),
    };

    write_output(plugin, outputs, &result)
}
