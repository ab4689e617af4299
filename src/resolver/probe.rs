/// Business-card probe
///
/// Not every SMP publishes business cards, and the ones that do disagree
/// on the URL shape. The probe walks a fixed ladder of five URL
/// patterns, HTTPS first then HTTP, with a short per-attempt timeout.
/// Transport-level failures fast-fail the current scheme: an unreachable
/// HTTPS port skips straight to the HTTP sweep, an unreachable HTTP port
/// ends the probe. HTTP status responses (404 etc.) mean the server is
/// alive, so the remaining patterns are still tried.
use crate::fetch::HttpFetcher;
use crate::participant::ParticipantIdentifier;
use crate::smp::{decode_business_card, BusinessEntity};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Short per-attempt timeout; the fast-fail rules cap the practical
/// total of the whole probe
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The five business-card URL shapes, in fixed order
pub(crate) fn probe_paths(participant: &ParticipantIdentifier) -> [String; 5] {
    let qualified = participant.qualified();
    let encoded = urlencoding::encode(&qualified).into_owned();
    [
        format!("/businesscard/{}", qualified),
        format!("/{}/businesscard", encoded),
        format!("/smp/businesscard/{}", encoded),
        format!("/api/businesscard/{}", encoded),
        format!("/rest/businesscard/{}", encoded),
    ]
}

/// Host[:port] of the SMP base URL, probed under both schemes
pub(crate) fn probe_authority(smp_base: &str) -> Option<String> {
    let url = Url::parse(smp_base).ok()?;
    let host = url.host_str()?.to_string();
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Probe the SMP for a business card; absence is not an error
pub(crate) async fn probe_business_card(
    fetcher: &HttpFetcher,
    smp_base: &str,
    participant: &ParticipantIdentifier,
) -> Option<BusinessEntity> {
    let authority = probe_authority(smp_base)?;
    let paths = probe_paths(participant);

    for scheme in ["https", "http"] {
        for path in &paths {
            let url = format!("{}://{}{}", scheme, authority, path);
            match fetcher.get_with_timeout(&url, PROBE_TIMEOUT).await {
                Ok(response) if response.is_ok() => {
                    if !response.body.trim_start().starts_with('<') {
                        continue;
                    }
                    match decode_business_card(&response.body) {
                        Ok(Some(entity)) => {
                            debug!("business card found at {}", url);
                            return Some(entity);
                        }
                        // Parse failure or cardless document: next pattern
                        _ => continue,
                    }
                }
                // Status response: the server is reachable, keep walking
                // the ladder
                Ok(response) => {
                    debug!("business card probe got HTTP {} at {}", response.status, url);
                }
                Err(e) => {
                    debug!("business card probe transport failure at {}: {}", url, e);
                    if scheme == "http" {
                        // The HTTP port is dead too; end the probe
                        return None;
                    }
                    // HTTPS is unreachable; abandon this sweep and retry
                    // the ladder over HTTP
                    break;
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_paths_fixed_order() {
        let id = ParticipantIdentifier::parse("0208:0843766574").unwrap();
        let paths = probe_paths(&id);

        assert_eq!(paths.len(), 5);
        assert_eq!(paths[0], "/businesscard/iso6523-actorid-upis::0208:0843766574");
        assert_eq!(
            paths[1],
            "/iso6523-actorid-upis%3A%3A0208%3A0843766574/businesscard"
        );
        assert!(paths[2].starts_with("/smp/businesscard/"));
        assert!(paths[3].starts_with("/api/businesscard/"));
        assert!(paths[4].starts_with("/rest/businesscard/"));
    }

    #[test]
    fn test_probe_authority_preserves_port() {
        assert_eq!(
            probe_authority("http://smp.example.com"),
            Some("smp.example.com".to_string())
        );
        assert_eq!(
            probe_authority("https://smp.example.com:8443/smp"),
            Some("smp.example.com:8443".to_string())
        );
        assert_eq!(probe_authority("not a url"), None);
    }
}
