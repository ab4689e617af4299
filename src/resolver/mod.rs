/// Resolution orchestrator
///
/// Drives the staged pipeline: canonicalize the participant identifier,
/// discover the SMP via SML DNS, fetch the ServiceGroup, fetch the first
/// ServiceMetadata, select an endpoint, and optionally parse the
/// access-point certificate and probe for a business card. Classifies
/// every outcome as unregistered, parked, or active and always returns a
/// well-formed result.
pub mod doctype;
mod probe;

pub use doctype::{friendly_doc_type_name, DocTypeLookup, NoCodeList};

use crate::cert::{CertificateInfo, CertificateParser};
use crate::config::ResolverConfig;
use crate::error::{SmpError, SmpResult};
use crate::fetch::HttpFetcher;
use crate::participant::{participant_hash, ParticipantIdentifier};
use crate::sml::SmlClient;
use crate::smp::{decode_service_group, decode_service_metadata, BusinessEntity, Endpoint};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Tri-state registration classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Not present in the SML, or resolution failed
    Unregistered,
    /// Registered in DNS/SMP but advertising no functional endpoint
    Parked,
    /// Registered with at least one document type and a selected endpoint
    Active,
}

/// Per-resolution options
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Include friendly document-type names and the selected endpoint
    /// descriptor in the result
    pub fetch_document_types: bool,
    /// Probe the SMP for a business card
    pub include_business_card: bool,
    /// Decode the selected endpoint's certificate
    pub parse_certificate: bool,
    /// Upper bound on this resolution's total wall time, in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Diagnostic entry for a non-fatal auxiliary-fetch failure
///
/// `status_code` 0 indicates a transport-level error rather than an HTTP
/// response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub url: String,
    pub status_code: u16,
    pub message: String,
}

/// Output of a single resolution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    /// The input identifier as supplied
    pub participant: String,
    pub is_registered: bool,
    pub status: RegistrationStatus,
    pub has_active_endpoints: bool,
    /// Host component of the SMP base URL, never rewritten
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smp_hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_entity: Option<BusinessEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Vec<Diagnostic>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolutionResult {
    /// Terminal unregistered result with an error message
    fn unregistered(participant: &str, error: impl Into<String>) -> Self {
        Self {
            participant: participant.to_string(),
            is_registered: false,
            status: RegistrationStatus::Unregistered,
            has_active_endpoints: false,
            smp_hostname: None,
            document_types: None,
            endpoint: None,
            certificate: None,
            business_entity: None,
            diagnostics: None,
            error: Some(error.into()),
        }
    }
}

/// The SMP resolver
///
/// Safe to clone and share across parallel workers: the HTTP pool and
/// the certificate cache are shared, configuration is immutable after
/// construction. Stages within one resolution run strictly sequentially;
/// independent resolutions have no ordering guarantees. Dropping an
/// in-flight `resolve` future abandons its network operations.
#[derive(Clone)]
pub struct SmpResolver {
    config: Arc<ResolverConfig>,
    sml: SmlClient,
    fetcher: HttpFetcher,
    certificates: CertificateParser,
    doc_type_lookup: Arc<dyn DocTypeLookup>,
}

impl SmpResolver {
    /// Create a resolver from configuration
    pub fn new(config: ResolverConfig) -> SmpResult<Self> {
        config.validate()?;
        let sml = SmlClient::new(&config);
        let fetcher = HttpFetcher::new(&config)?;

        Ok(Self {
            config: Arc::new(config),
            sml,
            fetcher,
            certificates: CertificateParser::new(),
            doc_type_lookup: Arc::new(NoCodeList),
        })
    }

    /// Attach a code-list lookup for friendly document-type names
    pub fn with_doc_type_lookup(mut self, lookup: Arc<dyn DocTypeLookup>) -> Self {
        self.doc_type_lookup = lookup;
        self
    }

    /// Resolver configuration
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The shared certificate parser and its cache
    pub fn certificates(&self) -> &CertificateParser {
        &self.certificates
    }

    /// Resolve a participant identifier
    ///
    /// Never returns an error for normal misuse: invalid input, absent
    /// DNS registrations, and unreachable SMPs all produce a well-formed
    /// result carrying an `error` string.
    pub async fn resolve(&self, participant: &str, options: &ResolveOptions) -> ResolutionResult {
        match options.timeout_ms {
            Some(ms) => {
                let bound = Duration::from_millis(ms);
                match tokio::time::timeout(bound, self.resolve_inner(participant, options)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("resolution of {} timed out after {} ms", participant, ms);
                        ResolutionResult::unregistered(
                            participant,
                            format!("Resolution timed out after {} ms", ms),
                        )
                    }
                }
            }
            None => self.resolve_inner(participant, options).await,
        }
    }

    async fn resolve_inner(&self, participant: &str, options: &ResolveOptions) -> ResolutionResult {
        // Stage 1: canonicalize; no I/O happens for malformed input
        let id = match ParticipantIdentifier::parse(participant) {
            Ok(id) => id,
            Err(_) => {
                return ResolutionResult::unregistered(participant, "Invalid participant ID format")
            }
        };

        // Stage 2: SML DNS discovery
        let hash = participant_hash(&id);
        let smp_base = match self.sml.lookup_smp(&hash).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                return ResolutionResult::unregistered(participant, "No SMP found via DNS lookup")
            }
            Err(e) => return ResolutionResult::unregistered(participant, e.to_string()),
        };

        self.resolve_with_smp_base(&id, &smp_base, options).await
    }

    /// Run the post-DNS pipeline against a known SMP base URL
    ///
    /// Useful when the SMP is already known; also the seam the HTTP
    /// fixture tests drive.
    pub async fn resolve_with_smp_base(
        &self,
        participant: &ParticipantIdentifier,
        smp_base: &str,
        options: &ResolveOptions,
    ) -> ResolutionResult {
        // A base with a single trailing slash composes the same paths
        let smp_base = smp_base.strip_suffix('/').unwrap_or(smp_base);
        let participant_str = participant.to_string();
        let smp_hostname = Url::parse(smp_base)
            .ok()
            .and_then(|u| u.host_str().map(String::from));

        // Stage 3: ServiceGroup fetch
        let sg_url = format!("{}/{}", smp_base, participant.qualified());
        let response = match self.fetcher.get(&sg_url).await {
            Ok(response) => response,
            Err(e) => return ResolutionResult::unregistered(&participant_str, e.to_string()),
        };

        let service_group = match response.status {
            200 => match decode_service_group(&response.body) {
                Ok(sg) => Some(sg),
                Err(e) => return ResolutionResult::unregistered(&participant_str, e.to_string()),
            },
            404 => {
                // Registered in DNS but unknown to the SMP: parked
                warn!("ServiceGroup 404 for {}; classifying as parked", participant_str);
                None
            }
            status => {
                return ResolutionResult::unregistered(
                    &participant_str,
                    SmpError::HttpStatus { url: sg_url, status }.to_string(),
                )
            }
        };

        let doc_type_ids: Vec<String> = service_group
            .as_ref()
            .map(|sg| {
                sg.service_references
                    .iter()
                    .filter_map(|href| doctype::doc_type_from_href(href))
                    .collect()
            })
            .unwrap_or_default();

        // Stage 4: metadata fetch for the first document type; failures
        // downgrade to parked instead of failing the resolution
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let mut endpoint: Option<Endpoint> = None;
        if let Some(first_doc) = doc_type_ids.first() {
            let md_url = format!(
                "{}/{}/services/{}",
                smp_base,
                participant.qualified(),
                urlencoding::encode(first_doc)
            );
            match self.select_endpoint(&md_url).await {
                Ok(selected) => endpoint = Some(selected),
                Err(diagnostic) => {
                    warn!(
                        "ServiceMetadata fetch downgraded {} to parked: {}",
                        participant_str, diagnostic.message
                    );
                    diagnostics.push(diagnostic);
                }
            }
        }

        let status = if endpoint.is_some() && !doc_type_ids.is_empty() {
            RegistrationStatus::Active
        } else {
            RegistrationStatus::Parked
        };
        debug!("{} classified as {:?}", participant_str, status);

        // Optional: certificate parse, silently absorbed on failure
        let certificate = if options.parse_certificate {
            endpoint
                .as_ref()
                .and_then(|e| e.certificate.as_deref())
                .and_then(|b64| match self.certificates.parse(b64) {
                    Ok(info) => Some(info),
                    Err(e) => {
                        debug!("certificate parse failed for {}: {}", participant_str, e);
                        None
                    }
                })
        } else {
            None
        };

        // Optional: business-card probe, never fails the resolution
        let business_entity = if options.include_business_card {
            probe::probe_business_card(&self.fetcher, smp_base, participant).await
        } else {
            None
        };

        let document_types = options.fetch_document_types.then(|| {
            doc_type_ids
                .iter()
                .map(|d| friendly_doc_type_name(self.doc_type_lookup.as_ref(), d))
                .collect()
        });

        ResolutionResult {
            participant: participant_str,
            is_registered: true,
            status,
            has_active_endpoints: status == RegistrationStatus::Active,
            smp_hostname,
            document_types,
            endpoint: if options.fetch_document_types {
                endpoint
            } else {
                None
            },
            certificate,
            business_entity,
            diagnostics: (!diagnostics.is_empty()).then_some(diagnostics),
            error: None,
        }
    }

    /// Fetch one ServiceMetadata document and select its first endpoint
    /// (first process, document order; no transport-profile filtering)
    async fn select_endpoint(&self, md_url: &str) -> Result<Endpoint, Diagnostic> {
        let diagnostic = |status_code: u16, message: String| Diagnostic {
            url: md_url.to_string(),
            status_code,
            message,
        };

        let response = self
            .fetcher
            .get(md_url)
            .await
            .map_err(|e| diagnostic(0, e.to_string()))?;

        if !response.is_ok() {
            return Err(diagnostic(
                response.status,
                format!("HTTP {}", response.status),
            ));
        }

        let metadata = decode_service_metadata(&response.body)
            .map_err(|e| diagnostic(response.status, e.to_string()))?;

        if let Some(href) = &metadata.redirect {
            return Err(diagnostic(
                response.status,
                format!("ServiceMetadata superseded by redirect to {}", href),
            ));
        }

        metadata
            .processes
            .first()
            .and_then(|p| p.endpoints.first())
            .cloned()
            .ok_or_else(|| {
                diagnostic(
                    response.status,
                    "no endpoints advertised for first process".to_string(),
                )
            })
    }

    /// Shut the resolver down: clears the certificate cache and drops
    /// the pooled HTTP client
    pub fn close(self) {
        self.certificates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_result_invariants() {
        let result = ResolutionResult::unregistered("0208:0843766574", "No SMP found via DNS lookup");
        assert!(!result.is_registered);
        assert_eq!(result.status, RegistrationStatus::Unregistered);
        assert!(!result.has_active_endpoints);
        assert!(result.endpoint.is_none());
        assert!(result.certificate.is_none());
        assert!(result.business_entity.is_none());
        assert!(result.error.as_deref().unwrap().contains("No SMP found"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RegistrationStatus::Parked).unwrap(),
            "\"parked\""
        );
    }
}
