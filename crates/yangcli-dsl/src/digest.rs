//! Schema document digests (versioned).
//!
//! The loader records one digest per document so `--dump-model` and the
//! diagnostic binary can show exactly which inputs a model was built from.
//!
//! - algorithm: **FNV-1a 64-bit**
//! - input: the UTF-8 bytes of the document as read
//! - output: `"fnv1a64:<16 lowercase hex digits>"`
//!
//! This is an identity tool, not a security primitive.

/// Prefix used in serialized digests.
pub const SCHEMA_DIGEST_V1_PREFIX: &str = "fnv1a64:";

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

/// Compute a v1 digest (FNV-1a 64-bit) over arbitrary bytes.
pub fn fnv1a64_digest_bytes(bytes: &[u8]) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    format!("{SCHEMA_DIGEST_V1_PREFIX}{hash:016x}")
}

/// Compute the v1 digest for a schema document.
pub fn schema_digest_v1(text: &str) -> String {
    fnv1a64_digest_bytes(text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_has_expected_prefix_and_width() {
        let d = schema_digest_v1("module x { prefix x; }\n");
        assert!(d.starts_with(SCHEMA_DIGEST_V1_PREFIX));
        assert_eq!(d.len(), SCHEMA_DIGEST_V1_PREFIX.len() + 16);
    }

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(schema_digest_v1(""), "fnv1a64:cbf29ce484222325");
    }

    #[test]
    fn digest_changes_with_content() {
        assert_ne!(schema_digest_v1("rpc a;"), schema_digest_v1("rpc b;"));
    }
}
