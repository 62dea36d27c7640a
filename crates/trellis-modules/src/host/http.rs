//! Outbound HTTP capability.

use extism::{CurrentPlugin, Error, UserData, Val};
use serde::{Deserialize, Serialize};

use trellis_core::script_abi::KeyValuePair;

use crate::binding::HostState;

use super::util::write_output;

/// An outbound HTTP request as submitted by a script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    /// HTTP method, case-insensitive.
    pub method: String,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: Vec<KeyValuePair>,
    /// Request body, if any.
    #[serde(default)]
    pub body: Option<String>,
}

/// The response handed back to the script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<KeyValuePair>,
    /// Response body as text.
    pub body: String,
}

// ---------------------------------------------------------------------------
// trellis_http_request(request_json) -> response_json
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn request_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let request_json: String = plugin.memory_get_val(&inputs[0])?;

    let req: HttpRequest = serde_json::from_str(&request_json)
        .map_err(|e| Error::msg(format!("invalid HTTP request JSON: {e}")))?;

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let client = state.http.clone();
    let handle = state.runtime_handle.clone();
    drop(state);

    let response = handle.block_on(async { perform_http_request(&client, &req).await })?;

    let response_json = serde_json::to_string(&response)
        .map_err(|e| Error::msg(format!("failed to serialize HTTP response: {e}")))?;
    write_output(plugin, outputs, &response_json)
}

async fn perform_http_request(
    client: &reqwest::Client,
    req: &HttpRequest,
) -> Result<HttpResponse, Error> {
    let mut builder = match req.method.to_uppercase().as_str() {
        "GET" => client.get(&req.url),
        "POST" => client.post(&req.url),
        "PUT" => client.put(&req.url),
        "DELETE" => client.delete(&req.url),
        "PATCH" => client.patch(&req.url),
        "HEAD" => client.head(&req.url),
        other => {
            return Err(Error::msg(format!("unsupported HTTP method: {other}")));
        },
    };

    for kv in &req.headers {
        builder = builder.header(&kv.key, &kv.value);
    }

    if let Some(body) = &req.body {
        builder = builder.body(body.clone());
    }

    let resp = builder
        .send()
        .await
        .map_err(|e| Error::msg(format!("HTTP request failed: {e}")))?;

    let status = resp.status().as_u16();
    let headers: Vec<KeyValuePair> = resp
        .headers()
        .iter()
        .map(|(k, v)| KeyValuePair::new(k.to_string(), v.to_str().unwrap_or("")))
        .collect();
    let body = resp
        .text()
        .await
        .map_err(|e| Error::msg(format!("failed to read HTTP response body: {e}")))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}
