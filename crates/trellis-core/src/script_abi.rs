//! Mirror Rust types for the host ↔ script WASM ABI.
//!
//! These records are the shared vocabulary between the Trellis host and the
//! WASM script guests it runs. Every value crossing the sandbox boundary is
//! one of these, serialized as JSON — structurally plain data, never a host
//! reference.
//!
//! Guest exports:
//!
//! | Export | Input | Output |
//! |--------|-------|--------|
//! | `boot` | `""` | — (registrations happen via host functions) |
//! | `start` | `""` | — |
//! | `shutdown` | `""` | — |
//! | `invoke-handler` | [`HandlerInvocation`] | [`RouteResponse`] for routes, ignored otherwise |

use serde::{Deserialize, Serialize};

use crate::id::HandlerId;

/// Log severity level for structured script logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Verbose tracing information.
    Trace,
    /// Debug-level diagnostic information.
    Debug,
    /// General informational messages.
    Info,
    /// Warning conditions that may need attention.
    Warn,
    /// Error conditions.
    Error,
}

/// A key-value pair used for typed header, parameter, and query lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    /// Key.
    pub key: String,
    /// Value.
    pub value: String,
}

impl KeyValuePair {
    /// Convenience constructor.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An inbound HTTP request as seen by a script route handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Uppercase HTTP method (`GET`, `POST`, ...).
    pub method: String,
    /// Request path relative to the project mount, e.g. `/users/42`.
    pub path: String,
    /// Path parameters extracted from the matched pattern.
    #[serde(default)]
    pub params: Vec<KeyValuePair>,
    /// Decoded query string parameters.
    #[serde(default)]
    pub query: Vec<KeyValuePair>,
    /// Request headers.
    #[serde(default)]
    pub headers: Vec<KeyValuePair>,
    /// Request body. Binary bodies are base64-encoded by the gateway.
    #[serde(default)]
    pub body: String,
}

/// An explicit HTTP response returned by a script route handler.
///
/// Status, headers, and body pass through to the HTTP caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: Vec<KeyValuePair>,
    /// Response body.
    #[serde(default)]
    pub body: String,
}

impl RouteResponse {
    /// A `200 OK` response with the given body and no extra headers.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// What kind of dispatch is entering the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// An inbound HTTP request matched a registered route.
    Route,
    /// A scheduled job came due.
    Job,
    /// A delayed task reached the front of the worker pool.
    Task,
}

/// Input to the guest's `invoke-handler` export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerInvocation {
    /// Index into the instance's handler table.
    pub handler: HandlerId,
    /// Dispatch kind.
    pub kind: InvocationKind,
    /// The request context, present only for [`InvocationKind::Route`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RouteRequest>,
}

/// A route registration collected from the guest during boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRegistration {
    /// Uppercase HTTP method.
    pub method: String,
    /// Path pattern, e.g. `/users/:id`.
    pub path: String,
    /// Handler table index.
    pub handler: HandlerId,
}

/// A scheduled job registration collected from the guest during boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRegistration {
    /// Trigger spec: `every:<n><s|m|h>` or a 5-field cron expression.
    pub spec: String,
    /// Handler table index.
    pub handler: HandlerId,
}

/// Everything a script registered during its boot callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootManifest {
    /// Routes to publish once the instance reaches `Running`.
    #[serde(default)]
    pub routes: Vec<RouteRegistration>,
    /// Jobs to schedule once the instance reaches `Running`.
    #[serde(default)]
    pub jobs: Vec<JobRegistration>,
}
