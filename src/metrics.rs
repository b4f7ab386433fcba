//! Codec counters in Prometheus exposition format.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters (thread-safe, lock-free on the hot path).
#[derive(Debug, Default)]
pub struct CodecMetrics {
    /// Bytes handed to the decoder.
    pub bytes_fed: AtomicU64,
    pub pdus_encoded: AtomicU64,
    pub bytes_encoded: AtomicU64,
    /// Decoded PDUs by op name.
    decoded: DashMap<&'static str, AtomicU64>,
    /// Decode failures by error kind.
    errors: DashMap<&'static str, AtomicU64>,
}

fn bump(map: &DashMap<&'static str, AtomicU64>, key: &'static str) {
    map.entry(key)
        .or_insert_with(AtomicU64::default)
        .fetch_add(1, Ordering::Relaxed);
}

fn sorted(map: &DashMap<&'static str, AtomicU64>) -> Vec<(&'static str, u64)> {
    let mut out: Vec<_> = map
        .iter()
        .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
        .collect();
    out.sort_unstable();
    out
}

impl CodecMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_bytes_fed(&self, n: usize) {
        self.bytes_fed.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_decoded(&self, op: &'static str) {
        bump(&self.decoded, op);
    }

    #[inline]
    pub fn inc_error(&self, kind: &'static str) {
        bump(&self.errors, kind);
    }

    #[inline]
    pub fn inc_encoded(&self, bytes: usize) {
        self.pdus_encoded.fetch_add(1, Ordering::Relaxed);
        self.bytes_encoded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn decoded(&self, op: &str) -> u64 {
        self.decoded.get(op).map_or(0, |v| v.load(Ordering::Relaxed))
    }

    pub fn errors(&self, kind: &str) -> u64 {
        self.errors.get(kind).map_or(0, |v| v.load(Ordering::Relaxed))
    }

    /// Render in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP ldap_codec_bytes_fed_total Bytes handed to the LDAP decoder.\n");
        out.push_str("# TYPE ldap_codec_bytes_fed_total counter\n");
        out.push_str(&format!("ldap_codec_bytes_fed_total {}\n", self.bytes_fed.load(Ordering::Relaxed)));

        out.push_str("# HELP ldap_codec_pdus_decoded_total Decoded LDAP messages by protocol op.\n");
        out.push_str("# TYPE ldap_codec_pdus_decoded_total counter\n");
        for (op, count) in sorted(&self.decoded) {
            out.push_str(&format!("ldap_codec_pdus_decoded_total{{op=\"{}\"}} {}\n", op, count));
        }

        out.push_str("# HELP ldap_codec_decode_errors_total Decode failures by error kind.\n");
        out.push_str("# TYPE ldap_codec_decode_errors_total counter\n");
        for (kind, count) in sorted(&self.errors) {
            out.push_str(&format!("ldap_codec_decode_errors_total{{kind=\"{}\"}} {}\n", kind, count));
        }

        out.push_str("# HELP ldap_codec_pdus_encoded_total Encoded LDAP messages.\n");
        out.push_str("# TYPE ldap_codec_pdus_encoded_total counter\n");
        out.push_str(&format!(
            "ldap_codec_pdus_encoded_total {}\n",
            self.pdus_encoded.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP ldap_codec_bytes_encoded_total Bytes written by the LDAP encoder.\n");
        out.push_str("# TYPE ldap_codec_bytes_encoded_total counter\n");
        out.push_str(&format!(
            "ldap_codec_bytes_encoded_total {}\n",
            self.bytes_encoded.load(Ordering::Relaxed)
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::CodecMetrics;

    #[test]
    fn test_counters() {
        let m = CodecMetrics::default();
        m.add_bytes_fed(10);
        m.add_bytes_fed(5);
        m.inc_decoded("search_request");
        m.inc_decoded("search_request");
        m.inc_decoded("unbind_request");
        m.inc_error("bad_length");
        m.inc_encoded(42);

        assert_eq!(m.decoded("search_request"), 2);
        assert_eq!(m.decoded("bind_request"), 0);
        assert_eq!(m.errors("bad_length"), 1);

        let out = m.render();
        assert!(out.contains("ldap_codec_bytes_fed_total 15\n"));
        assert!(out.contains("ldap_codec_pdus_decoded_total{op=\"search_request\"} 2\n"));
        assert!(out.contains("ldap_codec_pdus_decoded_total{op=\"unbind_request\"} 1\n"));
        assert!(out.contains("ldap_codec_decode_errors_total{kind=\"bad_length\"} 1\n"));
        assert!(out.contains("ldap_codec_pdus_encoded_total 1\n"));
        assert!(out.contains("ldap_codec_bytes_encoded_total 42\n"));
    }

    #[test]
    fn test_render_empty() {
        let out = CodecMetrics::new().render();
        assert!(out.contains("# TYPE ldap_codec_pdus_decoded_total counter"));
        assert!(out.contains("ldap_codec_bytes_fed_total 0\n"));
    }
}
