use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Decoder limits and checks. Every field has a default, so a YAML file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Largest accepted LDAPMessage (header included), in bytes. 0 disables the check.
    pub max_pdu_size: usize,
    /// Deepest accepted and/or/not nesting. 0 leaves only `FILTER_DEPTH_CEILING`.
    pub max_filter_depth: usize,
    /// Reject requests whose DN fields do not tokenize (invalidDNSyntax response).
    pub validate_dns: bool,
    /// Reject search result references and referrals that are not LDAP URLs.
    pub validate_referral_urls: bool,
    /// How many bytes of a failing PDU are hex-dumped in the warning log.
    pub hex_preview_bytes: usize,
}

impl CodecConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: CodecConfig = serde_yaml::from_str(content).context("invalid codec config")?;
        Ok(config)
    }

    /// Effective filter depth limit, never above `FILTER_DEPTH_CEILING`.
    pub fn filter_depth_limit(&self) -> usize {
        crate::filter::effective_depth_limit(self.max_filter_depth)
    }

    /// Effective PDU size limit, None when unlimited.
    pub fn pdu_size_limit(&self) -> Option<usize> {
        match self.max_pdu_size {
            0 => None,
            n => Some(n),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: 2 * 1024 * 1024,
            max_filter_depth: crate::filter::DEFAULT_MAX_FILTER_DEPTH,
            validate_dns: true,
            validate_referral_urls: true,
            hex_preview_bytes: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = CodecConfig::default();
        assert_eq!(config.max_pdu_size, 2 * 1024 * 1024);
        assert_eq!(config.max_filter_depth, 100);
        assert!(config.validate_dns);
        assert!(config.validate_referral_urls);
        assert_eq!(config.hex_preview_bytes, 64);
    }

    #[test]
    fn test_config_from_str_partial() {
        let yaml = r#"
max_pdu_size: 4096
validate_dns: false
"#;
        let config = CodecConfig::from_str(yaml).unwrap();
        assert_eq!(config.max_pdu_size, 4096);
        assert!(!config.validate_dns);
        assert_eq!(config.max_filter_depth, 100);
        assert!(config.validate_referral_urls);
    }

    #[test]
    fn test_config_zero_limits() {
        let config = CodecConfig::from_str("max_pdu_size: 0\nmax_filter_depth: 0\n").unwrap();
        assert_eq!(config.pdu_size_limit(), None);
        assert_eq!(config.filter_depth_limit(), crate::filter::FILTER_DEPTH_CEILING);
        assert_eq!(CodecConfig::default().pdu_size_limit(), Some(2 * 1024 * 1024));
    }

    #[test]
    fn test_config_from_file() {
        let yaml = r#"
max_filter_depth: 16
hex_preview_bytes: 8
validate_referral_urls: false
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = CodecConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_filter_depth, 16);
        assert_eq!(config.hex_preview_bytes, 8);
        assert!(!config.validate_referral_urls);
    }

    #[test]
    fn test_config_from_str_invalid_yaml() {
        assert!(CodecConfig::from_str("invalid: yaml: content: [").is_err());
        assert!(CodecConfig::from_str("max_pdu_size: lots").is_err());
    }

    #[test]
    fn test_config_from_file_nonexistent() {
        assert!(CodecConfig::from_file("/nonexistent/path/config.yaml").is_err());
    }
}
