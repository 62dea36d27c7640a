//! Scratch-file capability confined to the per-project files root.

use std::path::{Component, Path, PathBuf};

use extism::{CurrentPlugin, Error, UserData, Val};

use crate::binding::HostState;

use super::util::write_output;

/// Resolve a script-provided path inside the files root.
///
/// Absolute paths and any `..` component are rejected outright, so the
/// result is always lexically under `root` before the filesystem is
/// touched.
fn resolve_in_root(root: &Path, requested: &str) -> Result<PathBuf, Error> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(Error::msg(format!(
            "absolute paths are not allowed: {requested}"
        )));
    }
    for component in requested_path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            _ => {
                return Err(Error::msg(format!(
                    "path escapes the files root: {requested}"
                )));
            },
        }
    }
    Ok(root.join(requested_path))
}

// ---------------------------------------------------------------------------
// trellis_file_read(path) -> content
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn read_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let path: String = plugin.memory_get_val(&inputs[0])?;

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let files_root = state.files_root.clone();
    drop(state);

    let resolved = resolve_in_root(&files_root, &path)?;
    let content = std::fs::read_to_string(&resolved)
        .map_err(|e| Error::msg(format!("file_read failed ({path}): {e}")))?;

    write_output(plugin, outputs, &content)
}

// ---------------------------------------------------------------------------
// trellis_file_write(path, content)
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn write_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    _outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let path: String = plugin.memory_get_val(&inputs[0])?;
    let content: String = plugin.memory_get_val(&inputs[1])?;

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let files_root = state.files_root.clone();
    drop(state);

    let resolved = resolve_in_root(&files_root, &path)?;
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::msg(format!("file_write failed ({path}): {e}")))?;
    }
    std::fs::write(&resolved, content.as_bytes())
        .map_err(|e| Error::msg(format!("file_write failed ({path}): {e}")))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// trellis_file_delete(path) -> "true" | "false"
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn delete_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let path: String = plugin.memory_get_val(&inputs[0])?;

    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let files_root = state.files_root.clone();
    drop(state);

    let resolved = resolve_in_root(&files_root, &path)?;
    let removed = match std::fs::remove_file(&resolved) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(Error::msg(format!("file_delete failed ({path}): {e}"))),
    };

    write_output(plugin, outputs, if removed { "true" } else { "false" })
}

// ---------------------------------------------------------------------------
// trellis_file_list() -> names_json
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn list_impl(
    plugin: &mut CurrentPlugin,
    _inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let ud = user_data.get()?;
    let state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;
    let files_root = state.files_root.clone();
    drop(state);

    let mut names = Vec::new();
    let entries = std::fs::read_dir(&files_root)
        .map_err(|e| Error::msg(format!("file_list failed: {e}")))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::msg(format!("file_list failed: {e}")))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let json = serde_json::to_string(&names)
        .map_err(|e| Error::msg(format!("failed to serialize file list: {e}")))?;
    write_output(plugin, outputs, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_stay_inside_root() {
        let root = Path::new("/data/files/alpha");
        let resolved = resolve_in_root(root, "notes/today.txt").unwrap();
        assert_eq!(resolved, root.join("notes/today.txt"));
    }

    #[test]
    fn curdir_components_are_tolerated() {
        let root = Path::new("/data/files/alpha");
        let resolved = resolve_in_root(root, "./cache/./state.json").unwrap();
        assert_eq!(resolved, root.join("cache/state.json"));
    }

    #[test]
    fn traversal_is_rejected() {
        let root = Path::new("/data/files/alpha");
        assert!(resolve_in_root(root, "../bravo/secret").is_err());
        assert!(resolve_in_root(root, "ok/../../escape").is_err());
    }

    #[test]
    fn absolute_paths_are_rejected() {
        let root = Path::new("/data/files/alpha");
        assert!(resolve_in_root(root, "/etc/passwd").is_err());
    }
}
