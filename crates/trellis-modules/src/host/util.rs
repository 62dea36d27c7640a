//! Shared helpers for host function implementations.

use extism::{CurrentPlugin, Error, Val};

use trellis_core::HandlerId;

/// Write a string into plugin memory as the single output.
pub(super) fn write_output(
    plugin: &mut CurrentPlugin,
    outputs: &mut [Val],
    value: &str,
) -> Result<(), Error> {
    let mem = plugin.memory_new(&value.to_owned())?;
    outputs[0] = plugin.memory_to_val(mem);
    Ok(())
}

/// Success envelope with no payload.
pub(super) fn reply_ok() -> String {
    r#"{"ok":true}"#.to_owned()
}

/// Success envelope carrying a value.
pub(super) fn reply_ok_value(value: serde_json::Value) -> String {
    serde_json::json!({ "ok": true, "value": value }).to_string()
}

/// Failure envelope the script can inspect.
pub(super) fn reply_err(message: &str) -> String {
    serde_json::json!({ "ok": false, "error": message }).to_string()
}

/// Parse a decimal handler index as passed over the ABI.
pub(super) fn parse_handler(raw: &str) -> Result<HandlerId, String> {
    raw.trim()
        .parse::<u32>()
        .map(HandlerId)
        .map_err(|_| format!("invalid handler reference: {raw:?}"))
}
