//! Utility functions

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a printable secret fingerprint
const FINGERPRINT_LEN: usize = 12;

/// Version information for the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Short digest prefix identifying a secret in logs without revealing it
pub fn fingerprint(secret: &[u8]) -> String {
    let mut digest = sha256_hex(secret);
    digest.truncate(FINGERPRINT_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex(b"hello world");
        assert_eq!(hash.len(), 64);
        assert!(hash.starts_with("b94d27b9934d3e08"));
    }

    #[test]
    fn test_fingerprint_is_stable_prefix() {
        let print = fingerprint(b"0123456789abcdef");
        assert_eq!(print.len(), FINGERPRINT_LEN);
        assert_eq!(print, fingerprint(b"0123456789abcdef"));
        assert_ne!(print, fingerprint(b"0123456789abcdeg"));
        assert!(sha256_hex(b"0123456789abcdef").starts_with(&print));
    }

    #[test]
    fn test_version_info() {
        let version = version_info();
        assert_eq!(version.version, env!("CARGO_PKG_VERSION"));
        assert!(!version.git_hash.is_empty());
    }
}
