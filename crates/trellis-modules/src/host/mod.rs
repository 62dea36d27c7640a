//! Extism host functions backing the capability modules.
//!
//! Every function takes string inputs and returns string outputs through
//! plugin memory. Functions that can fail for reasons the script should
//! handle (bad trigger spec, saturated pool, unknown plugin) reply with a
//! JSON envelope `{"ok":bool,...}` instead of trapping the guest; only
//! host-side faults (poisoned lock, storage backend down) trap.
//!
//! Async storage calls are bridged with `Handle::block_on`, which requires
//! the multi-threaded tokio runtime.

use extism::{PTR, PluginBuilder, UserData};

use crate::binding::HostState;

mod crypto;
mod files;
mod http;
mod kv;
mod plugin;
mod register;
mod sys;
mod util;

pub use http::{HttpRequest, HttpResponse};

/// Attach the full capability surface to a plugin builder.
///
/// This is the single wiring point; the set of functions a script sees is
/// exactly what is registered here.
#[must_use]
pub fn register_host_functions(
    builder: PluginBuilder<'_>,
    user_data: UserData<HostState>,
) -> PluginBuilder<'_> {
    builder
        // System
        .with_function("trellis_log", [PTR, PTR], [], user_data.clone(), sys::log_impl)
        .with_function("trellis_env_get", [PTR], [PTR], user_data.clone(), sys::env_get_impl)
        .with_function("trellis_goal_get", [PTR], [PTR], user_data.clone(), sys::goal_get_impl)
        // Key-value store
        .with_function("trellis_kv_get", [PTR], [PTR], user_data.clone(), kv::get_impl)
        .with_function("trellis_kv_set", [PTR, PTR], [], user_data.clone(), kv::set_impl)
        .with_function("trellis_kv_delete", [PTR], [PTR], user_data.clone(), kv::delete_impl)
        .with_function("trellis_kv_list", [], [PTR], user_data.clone(), kv::list_impl)
        // Files
        .with_function("trellis_file_read", [PTR], [PTR], user_data.clone(), files::read_impl)
        .with_function("trellis_file_write", [PTR, PTR], [], user_data.clone(), files::write_impl)
        .with_function("trellis_file_delete", [PTR], [PTR], user_data.clone(), files::delete_impl)
        .with_function("trellis_file_list", [], [PTR], user_data.clone(), files::list_impl)
        // Outbound HTTP
        .with_function("trellis_http_request", [PTR], [PTR], user_data.clone(), http::request_impl)
        // Crypto and identifiers
        .with_function("trellis_hash", [PTR, PTR], [PTR], user_data.clone(), crypto::hash_impl)
        .with_function("trellis_random_hex", [PTR], [PTR], user_data.clone(), crypto::random_hex_impl)
        .with_function("trellis_uuid", [], [PTR], user_data.clone(), crypto::uuid_impl)
        // Registration and background work
        .with_function(
            "trellis_route_register",
            [PTR, PTR, PTR],
            [PTR],
            user_data.clone(),
            register::route_register_impl,
        )
        .with_function(
            "trellis_job_register",
            [PTR, PTR],
            [PTR],
            user_data.clone(),
            register::job_register_impl,
        )
        .with_function(
            "trellis_task_submit",
            [PTR],
            [PTR],
            user_data.clone(),
            register::task_submit_impl,
        )
        // Plugins
        .with_function(
            "trellis_plugin_call",
            [PTR, PTR, PTR],
            [PTR],
            user_data,
            plugin::call_impl,
        )
}
