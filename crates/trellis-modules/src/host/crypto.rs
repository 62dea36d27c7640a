//! Hashing and identifier generation.

use extism::{CurrentPlugin, Error, UserData, Val};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::binding::HostState;

use super::util::write_output;

/// Upper bound on a single random-bytes request.
const MAX_RANDOM_BYTES: usize = 1024;

// ---------------------------------------------------------------------------
// trellis_hash(algorithm, data) -> hex_digest
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn hash_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    _user_data: UserData<HostState>,
) -> Result<(), Error> {
    let algorithm: String = plugin.memory_get_val(&inputs[0])?;
    let data: String = plugin.memory_get_val(&inputs[1])?;

    let digest = match algorithm.as_str() {
        "sha256" => hex::encode(Sha256::digest(data.as_bytes())),
        "blake3" => blake3::hash(data.as_bytes()).to_hex().to_string(),
        other => {
            return Err(Error::msg(format!("unsupported hash algorithm: {other}")));
        },
    };

    write_output(plugin, outputs, &digest)
}

// ---------------------------------------------------------------------------
// trellis_random_hex(byte_count) -> hex
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn random_hex_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    _user_data: UserData<HostState>,
) -> Result<(), Error> {
    let raw: String = plugin.memory_get_val(&inputs[0])?;
    let count: usize = raw
        .trim()
        .parse()
        .map_err(|_| Error::msg(format!("invalid byte count: {raw:?}")))?;
    if count == 0 || count > MAX_RANDOM_BYTES {
        return Err(Error::msg(format!(
            "byte count must be between 1 and {MAX_RANDOM_BYTES}, got {count}"
        )));
    }

    let mut bytes = vec![0u8; count];
    rand::thread_rng().fill_bytes(&mut bytes);

    write_output(plugin, outputs, &hex::encode(bytes))
}

// ---------------------------------------------------------------------------
// trellis_uuid() -> uuid_v4
// ---------------------------------------------------------------------------

#[allow(clippy::needless_pass_by_value)] // Signature required by Extism callback API
pub(super) fn uuid_impl(
    plugin: &mut CurrentPlugin,
    _inputs: &[Val],
    outputs: &mut [Val],
    _user_data: UserData<HostState>,
) -> Result<(), Error> {
    write_output(plugin, outputs, &uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_digest_matches_known_vector() {
        let digest = hex::encode(Sha256::digest(b"abc"));
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn blake3_digest_is_stable() {
        let a = blake3::hash(b"trellis").to_hex().to_string();
        let b = blake3::hash(b"trellis").to_hex().to_string();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
