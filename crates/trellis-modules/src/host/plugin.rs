//! Script-to-plugin call dispatch.

use extism::{CurrentPlugin, Error, UserData, Val};

use crate::binding::{HostState, PluginCallError};

use super::util::{reply_err, reply_ok_value, write_output};

// ---------------------------------------------------------------------------
// trellis_plugin_call(plugin, function, payload_json) -> envelope_json
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn call_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let plugin_name: String = plugin.memory_get_val(&inputs[0])?;
    let function: String = plugin.memory_get_val(&inputs[1])?;
    let payload: String = plugin.memory_get_val(&inputs[2])?;

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let dispatch = state.plugins.clone();
    drop(state);

    // Plugin failures are script-visible, not traps; a missing plugin
    // should not kill the calling handler.
    let envelope = match dispatch.call(&plugin_name, &function, &payload) {
        Ok(reply) => {
            let value = serde_json::from_str(&reply)
                .unwrap_or_else(|_| serde_json::Value::String(reply));
            reply_ok_value(value)
        },
        Err(e @ (PluginCallError::Unknown { .. } | PluginCallError::Failed(_))) => {
            reply_err(&e.to_string())
        },
    };

    write_output(plugin, outputs, &envelope)
}
