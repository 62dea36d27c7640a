//! Route, job, and delayed-task registration.
//!
//! Route and job registration is only open while the boot callback runs;
//! once the instance is sealed, further attempts come back as errors in
//! the reply envelope. Malformed patterns and trigger specs are likewise
//! reported in the envelope so the script can react, rather than trapping
//! the whole boot.

use extism::{CurrentPlugin, Error, UserData, Val};
use tracing::debug;

use trellis_core::TriggerSpec;
use trellis_core::script_abi::{JobRegistration, RouteRegistration};

use crate::binding::{HostState, SubmitError};

use super::util::{parse_handler, reply_err, reply_ok, write_output};

const SEALED_MESSAGE: &str = "registration window closed: routes and jobs register during boot";

/// HTTP methods a route may bind.
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Validate a route path pattern: `/`-rooted segments, each either a
/// literal or a `:name` parameter.
fn validate_route_path(path: &str) -> Result<(), String> {
    if path == "/" {
        return Ok(());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(format!("route path must start with '/': {path:?}"));
    };
    if rest.ends_with('/') {
        return Err(format!("route path must not end with '/': {path:?}"));
    }
    for segment in rest.split('/') {
        if segment.is_empty() {
            return Err(format!("route path has an empty segment: {path:?}"));
        }
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty()
                || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(format!("invalid parameter segment {segment:?} in {path:?}"));
            }
        } else if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '~'))
        {
            return Err(format!("invalid route segment {segment:?} in {path:?}"));
        }
    }
    Ok(())
}

fn validate_method(method: &str) -> Result<String, String> {
    let upper = method.to_uppercase();
    if ALLOWED_METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(format!("unsupported HTTP method: {method:?}"))
    }
}

// ---------------------------------------------------------------------------
// trellis_route_register(method, path, handler) -> envelope_json
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn route_register_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let method: String = plugin.memory_get_val(&inputs[0])?;
    let path: String = plugin.memory_get_val(&inputs[1])?;
    let handler_raw: String = plugin.memory_get_val(&inputs[2])?;

    let checked = validate_method(&method)
        .and_then(|m| validate_route_path(&path).map(|()| m))
        .and_then(|m| parse_handler(&handler_raw).map(|h| (m, h)));
    let (method, handler) = match checked {
        Ok(ok) => ok,
        Err(reason) => return write_output(plugin, outputs, &reply_err(&reason)),
    };

    let ud = user_data.get()?;
    let mut state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    if state.sealed {
        drop(state);
        return write_output(plugin, outputs, &reply_err(SEALED_MESSAGE));
    }
    debug!(project = %state.project_id, %method, %path, "route registered");
    state.manifest.routes.push(RouteRegistration {
        method,
        path,
        handler,
    });
    drop(state);

    write_output(plugin, outputs, &reply_ok())
}

// ---------------------------------------------------------------------------
// trellis_job_register(spec, handler) -> envelope_json
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn job_register_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let spec: String = plugin.memory_get_val(&inputs[0])?;
    let handler_raw: String = plugin.memory_get_val(&inputs[1])?;

    if let Err(e) = TriggerSpec::parse(&spec) {
        return write_output(plugin, outputs, &reply_err(&e.to_string()));
    }
    let handler = match parse_handler(&handler_raw) {
        Ok(h) => h,
        Err(reason) => return write_output(plugin, outputs, &reply_err(&reason)),
    };

    let ud = user_data.get()?;
    let mut state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    if state.sealed {
        drop(state);
        return write_output(plugin, outputs, &reply_err(SEALED_MESSAGE));
    }
    debug!(project = %state.project_id, %spec, "job registered");
    state.manifest.jobs.push(JobRegistration { spec, handler });
    drop(state);

    write_output(plugin, outputs, &reply_ok())
}

// ---------------------------------------------------------------------------
// trellis_task_submit(handler) -> envelope_json
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn task_submit_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let handler_raw: String = plugin.memory_get_val(&inputs[0])?;
    let handler = match parse_handler(&handler_raw) {
        Ok(h) => h,
        Err(reason) => return write_output(plugin, outputs, &reply_err(&reason)),
    };

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let tasks = state.tasks.clone();
    drop(state);

    // Saturation is script-visible; the handler decides whether to retry.
    let envelope = match tasks.submit(handler) {
        Ok(()) => reply_ok(),
        Err(e @ (SubmitError::Saturated | SubmitError::Unavailable(_))) => {
            reply_err(&e.to_string())
        },
    };

    write_output(plugin, outputs, &envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_and_param_paths_are_accepted() {
        assert!(validate_route_path("/").is_ok());
        assert!(validate_route_path("/ping").is_ok());
        assert!(validate_route_path("/users/:id").is_ok());
        assert!(validate_route_path("/users/:id/posts/:post_id").is_ok());
        assert!(validate_route_path("/static/app-v1.2.js").is_ok());
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert!(validate_route_path("ping").is_err());
        assert!(validate_route_path("/ping/").is_err());
        assert!(validate_route_path("//double").is_err());
        assert!(validate_route_path("/bad segment").is_err());
        assert!(validate_route_path("/users/:").is_err());
        assert!(validate_route_path("/users/:bad-name").is_err());
        assert!(validate_route_path("/a/*wildcard").is_err());
    }

    #[test]
    fn methods_are_upcased_and_whitelisted() {
        assert_eq!(validate_method("get").unwrap(), "GET");
        assert_eq!(validate_method("Post").unwrap(), "POST");
        assert!(validate_method("BREW").is_err());
    }
}
