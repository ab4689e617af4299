/// SML lookup - translates participant hashes into SMP base URLs
///
/// Issues NAPTR queries against the SML zone, filters for `Meta:SMP`
/// records, and extracts the SMP base URL from the NAPTR regexp field.
use crate::config::ResolverConfig;
use crate::error::{SmpError, SmpResult};
use hickory_resolver::config::{
    NameServerConfigGroup, ResolverConfig as DnsConfig, ResolverOpts,
};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Per-query timeout for NAPTR lookups
pub const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// NAPTR service tag identifying SMP records
const META_SMP: &str = "Meta:SMP";

/// A NAPTR record as returned by the SML zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaptrRecord {
    pub order: u16,
    pub preference: u16,
    pub flags: String,
    pub service: String,
    pub regexp: String,
    pub replacement: String,
}

/// DNS client for SML lookups
#[derive(Clone)]
pub struct SmlClient {
    resolver: TokioAsyncResolver,
    sml_domain: String,
}

impl SmlClient {
    /// Create a new SML client from resolver configuration
    ///
    /// Configured recursive servers override the system resolver; the
    /// per-query timeout is bounded either way.
    pub fn new(config: &ResolverConfig) -> Self {
        let (dns_config, mut opts) = if config.dns_servers.is_empty() {
            read_system_conf().unwrap_or_else(|_| (DnsConfig::default(), ResolverOpts::default()))
        } else {
            let group = NameServerConfigGroup::from_ips_clear(&config.dns_servers, 53, true);
            (
                DnsConfig::from_parts(None, vec![], group),
                ResolverOpts::default(),
            )
        };
        opts.timeout = DNS_TIMEOUT;

        Self {
            resolver: TokioAsyncResolver::tokio(dns_config, opts),
            sml_domain: config.sml_domain.clone(),
        }
    }

    /// Build the SML query name for a participant hash
    pub fn query_name(&self, hash: &str) -> String {
        format!(
            "{}.{}.{}",
            hash,
            crate::participant::IDENTIFIER_CATEGORY,
            self.sml_domain
        )
    }

    /// Look up the SMP base URL for a participant hash
    ///
    /// `Ok(None)` means the participant is not registered in the SML
    /// (NXDOMAIN, no `Meta:SMP` record, or an invalid URL payload);
    /// `Err` means the resolver itself failed.
    pub async fn lookup_smp(&self, hash: &str) -> SmpResult<Option<String>> {
        let name = self.query_name(hash);
        debug!("SML NAPTR query: {}", name);

        let lookup = match self.resolver.lookup(name.as_str(), RecordType::NAPTR).await {
            Ok(lookup) => lookup,
            Err(e) => {
                if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
                    debug!("SML NAPTR query returned no records: {}", name);
                    return Ok(None);
                }
                return Err(SmpError::DnsFailure(e.to_string()));
            }
        };

        let records: Vec<NaptrRecord> = lookup
            .iter()
            .filter_map(naptr_from_rdata)
            .collect();

        let url = select_smp_url(&records);
        debug!("SML NAPTR result for {}: {:?}", name, url);
        Ok(url)
    }
}

/// Convert a hickory NAPTR rdata into our record type
fn naptr_from_rdata(rdata: &RData) -> Option<NaptrRecord> {
    match rdata {
        RData::NAPTR(naptr) => Some(NaptrRecord {
            order: naptr.order(),
            preference: naptr.preference(),
            flags: String::from_utf8_lossy(naptr.flags()).into_owned(),
            service: String::from_utf8_lossy(naptr.services()).into_owned(),
            regexp: String::from_utf8_lossy(naptr.regexp()).into_owned(),
            replacement: naptr.replacement().to_utf8(),
        }),
        _ => None,
    }
}

/// Select the SMP base URL from a NAPTR record set
///
/// Filters to `Meta:SMP` records, sorts by (order, preference) with
/// document order as the final tie-break, and extracts the URL from the
/// first surviving record. A first record with an invalid payload yields
/// no URL; malformed records never panic.
pub fn select_smp_url(records: &[NaptrRecord]) -> Option<String> {
    let mut candidates: Vec<&NaptrRecord> = records
        .iter()
        .filter(|r| r.service.eq_ignore_ascii_case(META_SMP))
        .collect();

    if candidates.is_empty() {
        return None;
    }

    // Stable sort preserves document order for full ties
    candidates.sort_by_key(|r| (r.order, r.preference));

    let chosen = candidates[0];
    let url = extract_regexp_url(&chosen.regexp)?;
    validate_smp_url(url)
}

/// Extract the replacement from a `!PATTERN!REPLACEMENT!` NAPTR regexp
///
/// The delimiter is always `!` for Peppol; the pattern (`^.*$`) is not
/// evaluated against any input; the replacement IS the URL.
pub fn extract_regexp_url(regexp: &str) -> Option<&str> {
    let rest = regexp.strip_prefix('!')?;
    let (_pattern, rest) = rest.split_once('!')?;
    let replacement = rest.strip_suffix('!')?;
    if replacement.is_empty() || replacement.contains('!') {
        return None;
    }
    Some(replacement)
}

/// Validate an SMP base URL per the Peppol profile
///
/// Scheme must be `http` or `https`; no userinfo, query, or fragment.
/// Exactly one trailing `/` is stripped so later path concatenation does
/// not produce `//`.
pub fn validate_smp_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return None;
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }
    parsed.host_str()?;

    Some(raw.strip_suffix('/').unwrap_or(raw).to_string())
}
