/// Access-point certificate parsing with fingerprint memoization
///
/// Decodes the base64/PEM X.509 certificates SMPs attach to endpoints and
/// extracts the operationally useful fields. Bulk resolution parses the
/// same handful of AP certificates over and over, so parses are memoized
/// by DER SHA-256 fingerprint for the lifetime of the resolver.
use crate::error::{SmpError, SmpResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, RwLock};
use x509_parser::prelude::*;

static POP_SEAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^POP\d{3,}").expect("static pattern compiles"));

static ALNUM_SEAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[A-Z0-9]{4,20}$").expect("static pattern compiles"));

/// Fields extracted from an endpoint's X.509 certificate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    /// Uppercase-hex SHA-256 of the DER encoding; the cache key
    pub fingerprint_sha256: String,
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub is_expired: bool,
    /// Peppol access-point SeatID derived from the subject CN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_id: Option<String>,
    /// Normalized base64 as published by the SMP
    pub certificate_b64: String,
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CertCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

struct CacheInner {
    by_fingerprint: RwLock<HashMap<String, CertificateInfo>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Certificate parser with a process-long memoization cache
///
/// Cloning shares the cache. Parsing is idempotent: repeated calls with
/// the same input return equivalent values served from the cache.
#[derive(Clone)]
pub struct CertificateParser {
    inner: Arc<CacheInner>,
}

impl CertificateParser {
    /// Create a parser with an empty cache
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                by_fingerprint: RwLock::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        }
    }

    /// Parse a base64 or PEM-wrapped certificate
    pub fn parse(&self, raw: &str) -> SmpResult<CertificateInfo> {
        let normalized = normalize_base64(raw);
        if normalized.is_empty() {
            return Err(SmpError::CertificateParse(
                "empty certificate payload".to_string(),
            ));
        }

        let der = BASE64
            .decode(normalized.as_bytes())
            .map_err(|e| SmpError::CertificateParse(format!("invalid base64: {}", e)))?;
        let fingerprint = hex::encode_upper(Sha256::digest(&der));

        {
            let cache = self
                .inner
                .by_fingerprint
                .read()
                .map_err(|_| SmpError::Internal("certificate cache poisoned".to_string()))?;
            if let Some(info) = cache.get(&fingerprint) {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(info.clone());
            }
        }
        self.inner.misses.fetch_add(1, Ordering::Relaxed);

        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| SmpError::CertificateParse(format!("invalid DER: {}", e)))?;

        let subject = cert.subject().to_string();
        let issuer = cert.issuer().to_string();
        let serial_number = cert.raw_serial_as_string().to_uppercase();

        let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| {
                SmpError::CertificateParse("notBefore outside representable range".to_string())
            })?;
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| {
                SmpError::CertificateParse("notAfter outside representable range".to_string())
            })?;

        let info = CertificateInfo {
            fingerprint_sha256: fingerprint.clone(),
            seat_id: extract_seat_id(&subject),
            subject,
            issuer,
            serial_number,
            not_before,
            not_after,
            is_expired: Utc::now() > not_after,
            certificate_b64: normalized,
        };

        let mut cache = self
            .inner
            .by_fingerprint
            .write()
            .map_err(|_| SmpError::Internal("certificate cache poisoned".to_string()))?;
        cache.insert(fingerprint, info.clone());

        Ok(info)
    }

    /// Number of cached certificates
    pub fn len(&self) -> usize {
        self.inner
            .by_fingerprint
            .read()
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all cached certificates; invoked at resolver shutdown
    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.by_fingerprint.write() {
            cache.clear();
        }
    }

    /// Cache hit/miss statistics
    pub fn stats(&self) -> CertCacheStats {
        CertCacheStats {
            entries: self.len(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for CertificateParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip PEM armor lines and all whitespace, leaving bare base64
pub fn normalize_base64(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("-----"))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Derive the Peppol SeatID from a subject DN
///
/// Looks for a `CN=` component (case-insensitive, value up to the next
/// unescaped comma). CNs matching `POP` + 3 or more digits, or 4-20
/// alphanumerics, are SeatIDs and returned uppercased.
pub fn extract_seat_id(subject: &str) -> Option<String> {
    let cn = extract_cn(subject)?;
    if POP_SEAT_PATTERN.is_match(&cn) || ALNUM_SEAT_PATTERN.is_match(&cn) {
        return Some(cn.to_uppercase());
    }
    None
}

/// First CN component of a DN string, with escaped commas unescaped
fn extract_cn(dn: &str) -> Option<String> {
    for component in split_unescaped_commas(dn) {
        let trimmed = component.trim();
        if let Some(rest) = trimmed
            .get(..3)
            .filter(|prefix| prefix.eq_ignore_ascii_case("cn="))
            .map(|_| &trimmed[3..])
        {
            return Some(rest.trim().replace("\\,", ","));
        }
    }
    None
}

/// Split a DN on commas, honoring backslash escapes
fn split_unescaped_commas(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                parts.push(&dn[start..i]);
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    parts.push(&dn[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Self-signed fixture in the production AP certificate shape: the
    /// SeatID in the subject CN and a fixed 2024-02-26 to 2026-02-15
    /// validity window
    const AP_CERT_PEM: &str = r#"-----BEGIN CERTIFICATE-----
MIIBkzCCATigAwIBAgIMS50fOmwuhdB/EaK0MAoGCCqGSM49BAMCMFcxCzAJBgNV
BAYTAkJFMR8wHQYDVQQKDBZFeGFtcGxlIFRydXN0IFNlcnZpY2VzMScwJQYDVQQD
DB5FeGFtcGxlIFBlcHBvbCBJbnRlcm1lZGlhdGUgQ0EwHhcNMjQwMjI2MDAwMDAw
WhcNMjYwMjE1MjM1OTU5WjBDMQswCQYDVQQGEwJCRTEgMB4GA1UECgwXRXhhbXBs
ZSBBY2Nlc3MgUG9pbnQgQlYxEjAQBgNVBAMMCVBCRTAwMDAyODBZMBMGByqGSM49
AgEGCCqGSM49AwEHA0IABF+Hz0gtOeZRwN0NhpZO9jJjHmetGJvSOG794fCoAwLy
oZDgwIeH+HaDS2W3PHrU6PuRps0eMqc1DJc9jYS44CowCgYIKoZIzj0EAwIDSQAw
RgIhAKq5ZtAzmh3nsYmlBwtZ06CC21KPz7FiKpoQ+2P76XYVAiEA8Rz67r1tLpkX
8FUDdyLkfygnLEjc08f5KhsJBkYzjKs=
-----END CERTIFICATE-----"#;

    /// SHA-256 of the fixture's DER encoding
    const AP_CERT_FINGERPRINT: &str =
        "F1B91C6A2A5D7C02B2B55A82F9874874DF8976BD867DDD37EA76C803094FEDD2";

    #[test]
    fn test_parse_certificate_end_to_end() {
        let parser = CertificateParser::new();
        let info = parser.parse(AP_CERT_PEM).unwrap();

        assert_eq!(info.fingerprint_sha256, AP_CERT_FINGERPRINT);
        assert_eq!(info.seat_id.as_deref(), Some("PBE000028"));
        assert!(info.subject.contains("CN=PBE000028"));
        assert!(info.issuer.contains("Example Peppol Intermediate CA"));
        assert_eq!(
            info.serial_number.replace(':', ""),
            "4B9D1F3A6C2E85D07F11A2B4"
        );
        assert_eq!(info.not_before.to_rfc3339(), "2024-02-26T00:00:00+00:00");
        assert_eq!(info.not_after.to_rfc3339(), "2026-02-15T23:59:59+00:00");
        assert!(info.is_expired);
        assert_eq!(info.certificate_b64, normalize_base64(AP_CERT_PEM));
    }

    #[test]
    fn test_pem_and_raw_base64_share_fingerprint_and_cache_entry() {
        let parser = CertificateParser::new();
        let from_pem = parser.parse(AP_CERT_PEM).unwrap();

        let raw = normalize_base64(AP_CERT_PEM);
        let from_raw = parser.parse(&raw).unwrap();

        // Same DER, same fingerprint, second parse served from cache
        assert_eq!(from_pem, from_raw);
        assert_eq!(from_raw.fingerprint_sha256, AP_CERT_FINGERPRINT);

        let stats = parser.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_normalize_strips_pem_armor_and_whitespace() {
        let pem = "-----BEGIN CERTIFICATE-----\nTUlJ\nQ2R6\n-----END CERTIFICATE-----\n";
        assert_eq!(normalize_base64(pem), "TUlJQ2R6");
        assert_eq!(normalize_base64("TUlJ Q2R6\n"), "TUlJQ2R6");
        // Raw and PEM-wrapped forms of the same payload normalize identically
        assert_eq!(normalize_base64(pem), normalize_base64("TUlJQ2R6"));
    }

    #[test]
    fn test_seat_id_pop_pattern() {
        assert_eq!(
            extract_seat_id("CN=PBE000028, O=Ixor, C=BE"),
            Some("PBE000028".to_string())
        );
        assert_eq!(
            extract_seat_id("C=DK, CN=POP000123, O=Example"),
            Some("POP000123".to_string())
        );
    }

    #[test]
    fn test_seat_id_alphanumeric_pattern_is_case_insensitive() {
        assert_eq!(
            extract_seat_id("cn=pde000101, O=Example"),
            Some("PDE000101".to_string())
        );
    }

    #[test]
    fn test_seat_id_rejects_non_matching_cns() {
        // Spaces and punctuation disqualify the alphanumeric pattern
        assert_eq!(extract_seat_id("CN=Example Corp AP, O=Example"), None);
        assert_eq!(extract_seat_id("CN=ab1, O=too-short"), None);
        assert_eq!(extract_seat_id("O=No Common Name, C=BE"), None);
    }

    #[test]
    fn test_cn_stops_at_unescaped_comma() {
        assert_eq!(
            extract_cn("CN=ACME0001, O=Acme\\, Inc., C=US"),
            Some("ACME0001".to_string())
        );
        assert_eq!(
            extract_cn("O=First, CN=Escaped\\, Value, C=US"),
            Some("Escaped, Value".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let parser = CertificateParser::new();
        assert!(parser.parse("").is_err());
        assert!(parser.parse("!!!not base64!!!").is_err());
        // Valid base64 but not DER
        assert!(parser.parse("aGVsbG8gd29ybGQ=").is_err());
        // Failures are not cached
        assert_eq!(parser.len(), 0);
    }

    #[test]
    fn test_failed_parses_count_as_misses_only_after_decode() {
        let parser = CertificateParser::new();
        let _ = parser.parse("aGVsbG8gd29ybGQ=");
        let stats = parser.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_clear_empties_cache() {
        let parser = CertificateParser::new();
        parser.clear();
        assert!(parser.is_empty());
    }
}
