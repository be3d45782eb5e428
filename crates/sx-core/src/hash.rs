// SPDX-License-Identifier: MIT OR Apache-2.0
//! blake2b-256 hashing helpers shared by every content-addressed identifier
//! in this crate (`param_id`, `sim_root`, `task_id`, `aggregation_id`,
//! bundle digests, and provenance schema path segments).

use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};

fn hasher() -> Blake2bVar {
    Blake2bVar::new(32).expect("32-byte output is a valid blake2b size")
}

/// Hash arbitrary bytes with blake2b, truncated to a 256-bit (32-byte) digest,
/// and return the lowercase hex encoding (64 characters).
pub fn blake2b_256_hex(data: &[u8]) -> String {
    blake2b_256_hex_concat(&[data])
}

/// Hash several byte slices as a single concatenated message, as used by
/// every `‖`-joined derivation in the spec (`sim_root`, `task_id`, ...).
pub fn blake2b_256_hex_concat(parts: &[&[u8]]) -> String {
    let mut h = hasher();
    for part in parts {
        h.update(part);
    }
    let mut out = [0u8; 32];
    h.finalize_variable(&mut out)
        .expect("32-byte buffer matches requested output size");
    hex::encode(out)
}

/// Truncate a hex digest to the first `n` hex characters (used by bundle12
/// and the `{var[:N]}` schema DSL construct).
pub fn truncate_hex(hex_digest: &str, n: usize) -> String {
    hex_digest.chars().take(n).collect()
}

/// Minimal hex encoding; avoids pulling in a dependency for 32 bytes.
mod hex {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: [u8; 32]) -> String {
        let mut s = String::with_capacity(64);
        for b in bytes {
            s.push(DIGITS[(b >> 4) as usize] as char);
            s.push(DIGITS[(b & 0x0f) as usize] as char);
        }
        s
    }
}
