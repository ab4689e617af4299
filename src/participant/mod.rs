/// Participant identifier canonicalization
///
/// Parses and validates Peppol participant identifiers and computes the
/// canonical SHA-256 hash label used as the leftmost label of SML DNS
/// query names.
use crate::error::{SmpError, SmpResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Peppol identifier category for ISO 6523 participant identifiers
pub const IDENTIFIER_CATEGORY: &str = "iso6523-actorid-upis";

/// A Peppol participant identifier: an ICD scheme code plus an
/// issuer-local value, e.g. `0208:0843766574`
///
/// Hashing is case-sensitive on both sides. Callers supply the exact
/// Peppol-canonical form; for many schemes that is lowercase (VAT scheme
/// 9925 uses a lowercase country prefix such as `be...`). No case folding
/// is performed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantIdentifier {
    pub scheme: String,
    pub value: String,
}

impl ParticipantIdentifier {
    /// Create and validate an identifier from its two parts
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> SmpResult<Self> {
        let id = Self {
            scheme: scheme.into(),
            value: value.into(),
        };
        id.validate()?;
        Ok(id)
    }

    /// Parse a `scheme:value` string, splitting on the first `:`
    ///
    /// Values containing further `:` characters are preserved verbatim
    /// (they fail validation, since values must be DNS labels).
    pub fn parse(input: &str) -> SmpResult<Self> {
        let (scheme, value) = input
            .split_once(':')
            .ok_or_else(|| SmpError::InvalidIdentifier(input.to_string()))?;

        if scheme.is_empty() || value.is_empty() {
            return Err(SmpError::InvalidIdentifier(input.to_string()));
        }

        let id = Self {
            scheme: scheme.to_string(),
            value: value.to_string(),
        };
        id.validate()?;
        Ok(id)
    }

    /// Validate scheme and value charsets
    ///
    /// Scheme must be alphanumeric; value must be a valid DNS label
    /// (alphanumeric with internal hyphens).
    pub fn validate(&self) -> SmpResult<()> {
        if self.scheme.is_empty()
            || !self.scheme.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(SmpError::InvalidIdentifier(format!(
                "{}:{}",
                self.scheme, self.value
            )));
        }

        if !is_dns_label(&self.value) {
            return Err(SmpError::InvalidIdentifier(format!(
                "{}:{}",
                self.scheme, self.value
            )));
        }

        Ok(())
    }

    /// Full Peppol identifier form used in SMP URLs:
    /// `iso6523-actorid-upis::scheme:value`
    pub fn qualified(&self) -> String {
        format!("{}::{}:{}", IDENTIFIER_CATEGORY, self.scheme, self.value)
    }
}

impl fmt::Display for ParticipantIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.value)
    }
}

/// Compute the SML hash label for a participant identifier
///
/// SHA-256 over the UTF-8 bytes of `scheme:value`, RFC 4648 base32,
/// lowercased, trailing `=` padding stripped. Always 52 characters for a
/// 256-bit digest.
pub fn participant_hash(id: &ParticipantIdentifier) -> String {
    let digest = Sha256::digest(format!("{}:{}", id.scheme, id.value).as_bytes());
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, digest.as_slice()).to_lowercase()
}

/// DNS label rule: alphanumeric, internal hyphens allowed
fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_identifier() {
        let id = ParticipantIdentifier::parse("0208:0843766574").unwrap();
        assert_eq!(id.scheme, "0208");
        assert_eq!(id.value, "0843766574");
        assert_eq!(id.to_string(), "0208:0843766574");
        assert_eq!(
            id.qualified(),
            "iso6523-actorid-upis::0208:0843766574"
        );
    }

    #[test]
    fn test_parse_rejects_missing_colon() {
        assert!(ParticipantIdentifier::parse("invalid-format").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_sides() {
        assert!(ParticipantIdentifier::parse(":0843766574").is_err());
        assert!(ParticipantIdentifier::parse("0208:").is_err());
        assert!(ParticipantIdentifier::parse(":").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_value_labels() {
        // Leading/trailing hyphens and embedded colons are not DNS labels
        assert!(ParticipantIdentifier::parse("0208:-abc").is_err());
        assert!(ParticipantIdentifier::parse("0208:abc-").is_err());
        assert!(ParticipantIdentifier::parse("0208:a:b").is_err());
        assert!(ParticipantIdentifier::parse("02 08:abc").is_err());
    }

    #[test]
    fn test_validate_accepts_internal_hyphens() {
        assert!(ParticipantIdentifier::parse("9915:b-123-456").is_ok());
    }

    #[test]
    fn test_hash_known_vector() {
        let id = ParticipantIdentifier::parse("0208:0843766574").unwrap();
        assert_eq!(
            participant_hash(&id),
            "cmorzb6cpx7e4wldnu4zxrmczeqaiacq4qds2x7zi5ki4nsxxfma"
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_length_stable() {
        let a = ParticipantIdentifier::parse("9925:be0123456789").unwrap();
        let h1 = participant_hash(&a);
        let h2 = participant_hash(&a);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 52);
        assert!(!h1.contains('='));
    }

    #[test]
    fn test_hash_is_case_sensitive() {
        let lower = ParticipantIdentifier::new("9925", "be0123456789").unwrap();
        let upper = ParticipantIdentifier::new("9925", "BE0123456789").unwrap();
        assert_ne!(participant_hash(&lower), participant_hash(&upper));
    }
}
