/// Tolerant XML decoding for SMP documents
///
/// SMPs emit the same documents under arbitrary namespace prefixes
/// (`ns2:Endpoint` vs `Endpoint`), so element identity here is the
/// local name with the prefix stripped at parse time.
use crate::error::{SmpError, SmpResult};
use crate::participant::ParticipantIdentifier;
use crate::smp::{
    BusinessEntity, Contact, DocumentIdentifier, Endpoint, EntityIdentifier, Process,
    ProcessIdentifier, ServiceGroup, ServiceMetadata,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

/// A decoded element: local name, attributes, children, and text content
#[derive(Debug, Default)]
pub(crate) struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    /// Attribute by local name
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given local name
    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct children with the given local name, in document order
    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First descendant (including self) with the given local name,
    /// depth-first so document order is preserved
    fn find(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// All descendants with the given local name, in document order
    fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        if self.name == name {
            out.push(self);
        }
        for c in &self.children {
            c.find_all(name, out);
        }
    }

    fn text_trimmed(&self) -> &str {
        self.text.trim()
    }

    /// Non-empty text of a direct child
    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| c.text_trimmed().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Parse XML into a prefix-stripped element tree
///
/// Returns a synthetic root whose children are the document's top-level
/// elements. `document` names the document family for error messages.
pub(crate) fn parse_tree(xml: &str, document: &str) -> SmpResult<XmlNode> {
    let xml_err = |message: String| SmpError::XmlParse {
        document: document.to_string(),
        message,
    };

    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlNode> = vec![XmlNode::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(node_from_start(&e));
            }
            Ok(Event::Empty(e)) => {
                let node = node_from_start(&e);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| xml_err("unbalanced end tag".to_string()))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| xml_err("unbalanced end tag".to_string()))?;
                parent.children.push(node);
            }
            Ok(Event::Text(t)) => {
                if let (Ok(text), Some(top)) = (t.unescape(), stack.last_mut()) {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text
                        .push_str(&String::from_utf8_lossy(t.into_inner().as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_err(e.to_string())),
        }
    }

    if stack.len() != 1 {
        return Err(xml_err("unclosed element".to_string()));
    }
    Ok(stack.remove(0))
}

fn node_from_start(e: &quick_xml::events::BytesStart<'_>) -> XmlNode {
    let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if let Ok(value) = attr.unescape_value() {
            attrs.push((key, value.into_owned()));
        }
    }
    XmlNode {
        name,
        attrs,
        children: Vec::new(),
        text: String::new(),
    }
}

/// Decode a ServiceGroup document
///
/// The `ParticipantIdentifier` element (scheme attribute + text content)
/// is mandatory; an empty reference collection is legal.
pub fn decode_service_group(xml: &str) -> SmpResult<ServiceGroup> {
    const DOC: &str = "ServiceGroup";
    let tree = parse_tree(xml, DOC)?;

    let root = tree.find("ServiceGroup").ok_or_else(|| SmpError::XmlParse {
        document: DOC.to_string(),
        message: "missing ServiceGroup root element".to_string(),
    })?;

    let pid = root
        .find("ParticipantIdentifier")
        .ok_or_else(|| SmpError::XmlParse {
            document: DOC.to_string(),
            message: "missing mandatory ParticipantIdentifier".to_string(),
        })?;

    if pid.attr("scheme").map_or(true, |s| s.is_empty()) {
        return Err(SmpError::XmlParse {
            document: DOC.to_string(),
            message: "ParticipantIdentifier missing scheme attribute".to_string(),
        });
    }

    let participant =
        ParticipantIdentifier::parse(pid.text_trimmed()).map_err(|e| SmpError::XmlParse {
            document: DOC.to_string(),
            message: e.to_string(),
        })?;

    let mut refs = Vec::new();
    root.find_all("ServiceMetadataReference", &mut refs);
    let service_references = refs
        .iter()
        .filter_map(|n| n.attr("href"))
        .map(|href| href.to_string())
        .collect();

    Ok(ServiceGroup {
        participant,
        service_references,
    })
}

/// Decode a ServiceMetadata or SignedServiceMetadata document
///
/// A top-level `Redirect/@href` supersedes the record: only the href is
/// emitted and the process list stays empty. Otherwise the
/// `DocumentIdentifier` under `ServiceInformation` is mandatory;
/// processes without identifiers and endpoints without a transport
/// profile or URL are skipped.
pub fn decode_service_metadata(xml: &str) -> SmpResult<ServiceMetadata> {
    const DOC: &str = "ServiceMetadata";
    let tree = parse_tree(xml, DOC)?;

    let root = tree
        .find("ServiceMetadata")
        .or_else(|| tree.find("SignedServiceMetadata"))
        .ok_or_else(|| SmpError::XmlParse {
            document: DOC.to_string(),
            message: "missing ServiceMetadata root element".to_string(),
        })?;

    if let Some(redirect) = root.find("Redirect").and_then(|r| r.attr("href")) {
        return Ok(ServiceMetadata {
            document: None,
            processes: Vec::new(),
            redirect: Some(redirect.to_string()),
        });
    }

    let info = root
        .find("ServiceInformation")
        .ok_or_else(|| SmpError::XmlParse {
            document: DOC.to_string(),
            message: "missing ServiceInformation".to_string(),
        })?;

    let doc_node = info
        .find("DocumentIdentifier")
        .ok_or_else(|| SmpError::XmlParse {
            document: DOC.to_string(),
            message: "missing mandatory DocumentIdentifier".to_string(),
        })?;
    let document = match (doc_node.attr("scheme"), doc_node.text_trimmed()) {
        (Some(scheme), value) if !scheme.is_empty() && !value.is_empty() => DocumentIdentifier {
            scheme: scheme.to_string(),
            value: value.to_string(),
        },
        _ => {
            return Err(SmpError::XmlParse {
                document: DOC.to_string(),
                message: "DocumentIdentifier requires scheme attribute and value".to_string(),
            })
        }
    };

    let mut processes = Vec::new();
    if let Some(list) = info.find("ProcessList") {
        for process_node in list.children_named("Process") {
            let Some(identifier) = decode_process_identifier(process_node) else {
                continue;
            };

            let mut endpoints = Vec::new();
            if let Some(endpoint_list) = process_node.find("ServiceEndpointList") {
                for endpoint_node in endpoint_list.children_named("Endpoint") {
                    if let Some(endpoint) = decode_endpoint(endpoint_node) {
                        endpoints.push(endpoint);
                    }
                }
            }

            processes.push(Process {
                identifier,
                endpoints,
            });
        }
    }

    Ok(ServiceMetadata {
        document: Some(document),
        processes,
        redirect: None,
    })
}

fn decode_process_identifier(process: &XmlNode) -> Option<ProcessIdentifier> {
    let node = process.find("ProcessIdentifier")?;
    let scheme = node.attr("scheme")?.to_string();
    let value = node.text_trimmed().to_string();
    if scheme.is_empty() || value.is_empty() {
        return None;
    }
    Some(ProcessIdentifier { scheme, value })
}

fn decode_endpoint(node: &XmlNode) -> Option<Endpoint> {
    let transport_profile = node.attr("transportProfile")?.to_string();
    if transport_profile.is_empty() {
        return None;
    }

    // EndpointURI, with the legacy WS-Addressing Address as fallback
    let url = node
        .find("EndpointURI")
        .map(|n| n.text_trimmed().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            node.find("Address")
                .map(|n| n.text_trimmed().to_string())
                .filter(|s| !s.is_empty())
        })?;

    Some(Endpoint {
        transport_profile,
        url,
        certificate: node.child_text("Certificate"),
        service_description: node.child_text("ServiceDescription"),
        technical_contact_url: node.child_text("TechnicalContactUrl"),
        technical_information_url: node.child_text("TechnicalInformationUrl"),
        require_business_level_signature: node
            .child_text("RequireBusinessLevelSignature")
            .map(|s| matches!(s.as_str(), "true" | "1"))
            .unwrap_or(false),
        service_activation_date: node
            .child_text("ServiceActivationDate")
            .and_then(|s| parse_date_best_effort(&s)),
        service_expiration_date: node
            .child_text("ServiceExpirationDate")
            .and_then(|s| parse_date_best_effort(&s)),
    })
}

/// Decode a BusinessCard document
///
/// Absence of a BusinessCard or BusinessEntity is not an error. Fields
/// appear as child elements or as attributes depending on the SMP
/// implementation, so both spellings are accepted.
pub fn decode_business_card(xml: &str) -> SmpResult<Option<BusinessEntity>> {
    const DOC: &str = "BusinessCard";
    let tree = parse_tree(xml, DOC)?;

    let Some(card) = tree.find("BusinessCard") else {
        return Ok(None);
    };
    let Some(entity) = card.find("BusinessEntity") else {
        return Ok(None);
    };

    let Some(name) = text_or_attr(entity, "Name", "name") else {
        return Ok(None);
    };

    let country_code = entity
        .child_text("CountryCode")
        .or_else(|| entity.attr("countryCode").map(|s| s.to_string()))
        .unwrap_or_default();

    let identifiers = entity
        .children_named("Identifier")
        .filter_map(|n| {
            let value = n.text_trimmed().to_string();
            if value.is_empty() {
                return None;
            }
            Some(EntityIdentifier {
                scheme: n.attr("scheme").map(|s| s.to_string()),
                value,
            })
        })
        .collect();

    let websites = entity
        .children_named("WebsiteURI")
        .map(|n| n.text_trimmed().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let contacts = entity
        .children_named("Contact")
        .map(|n| Contact {
            type_code: text_or_attr(n, "TypeCode", "type"),
            name: text_or_attr(n, "Name", "name"),
            phone_number: text_or_attr(n, "PhoneNumber", "phoneNumber"),
            email: text_or_attr(n, "Email", "email"),
        })
        .collect();

    Ok(Some(BusinessEntity {
        name,
        country_code,
        identifiers,
        geographical_info: entity.child_text("GeographicalInformation"),
        websites,
        contacts,
    }))
}

/// Child element text, falling back to an attribute spelling
fn text_or_attr(node: &XmlNode, element: &str, attribute: &str) -> Option<String> {
    node.child_text(element)
        .or_else(|| {
            node.child(element)
                .and_then(|c| c.attr(attribute))
                .map(|s| s.to_string())
        })
        .or_else(|| node.attr(attribute).map(|s| s.to_string()))
        .filter(|s| !s.is_empty())
}

/// Best-effort ISO-8601 parsing; failures leave the field absent
pub(crate) fn parse_date_best_effort(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ndt.and_utc());
    }
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return nd.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_GROUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ns2:ServiceGroup xmlns:ns2="http://busdox.org/serviceMetadata/publishing/1.0/">
  <ns2:ParticipantIdentifier scheme="iso6523-actorid-upis">0208:0843766574</ns2:ParticipantIdentifier>
  <ns2:ServiceMetadataReferenceCollection>
    <ns2:ServiceMetadataReference href="http://smp.example.com/iso6523-actorid-upis%3A%3A0208%3A0843766574/services/busdox-docid-qns%3A%3Aurn%3Ainvoice"/>
    <ns2:ServiceMetadataReference href="http://smp.example.com/iso6523-actorid-upis%3A%3A0208%3A0843766574/services/busdox-docid-qns%3A%3Aurn%3Aorder"/>
  </ns2:ServiceMetadataReferenceCollection>
</ns2:ServiceGroup>"#;

    #[test]
    fn test_decode_service_group_with_prefixes() {
        let sg = decode_service_group(SERVICE_GROUP).unwrap();
        assert_eq!(sg.participant.scheme, "0208");
        assert_eq!(sg.participant.value, "0843766574");
        assert_eq!(sg.service_references.len(), 2);
        assert!(sg.service_references[0].ends_with("urn%3Ainvoice"));
    }

    #[test]
    fn test_decode_service_group_without_prefixes() {
        let xml = r#"<ServiceGroup>
  <ParticipantIdentifier scheme="iso6523-actorid-upis">9925:be0123456789</ParticipantIdentifier>
  <ServiceMetadataReferenceCollection/>
</ServiceGroup>"#;
        let sg = decode_service_group(xml).unwrap();
        assert_eq!(sg.participant.to_string(), "9925:be0123456789");
        assert!(sg.service_references.is_empty());
    }

    #[test]
    fn test_decode_service_group_missing_participant_fails() {
        let xml = "<ServiceGroup><ServiceMetadataReferenceCollection/></ServiceGroup>";
        let err = decode_service_group(xml).unwrap_err();
        assert!(err.to_string().contains("ServiceGroup"));
    }

    #[test]
    fn test_decode_service_group_malformed_xml_fails() {
        assert!(decode_service_group("<ServiceGroup><unclosed>").is_err());
        assert!(decode_service_group("not xml at all").is_err());
    }

    const SERVICE_METADATA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ns3:SignedServiceMetadata xmlns:ns3="http://busdox.org/serviceMetadata/publishing/1.0/">
  <ns3:ServiceMetadata>
    <ns3:ServiceInformation>
      <ns3:ParticipantIdentifier scheme="iso6523-actorid-upis">0208:0843766574</ns3:ParticipantIdentifier>
      <ns3:DocumentIdentifier scheme="busdox-docid-qns">urn:oasis:names:specification:ubl:schema:xsd:Invoice-2::Invoice##urn:cen.eu:en16931:2017#compliant#urn:fdc:peppol.eu:2017:poacc:billing:3.0::2.1</ns3:DocumentIdentifier>
      <ns3:ProcessList>
        <ns3:Process>
          <ns3:ProcessIdentifier scheme="cenbii-procid-ubl">urn:fdc:peppol.eu:2017:poacc:billing:01:1.0</ns3:ProcessIdentifier>
          <ns3:ServiceEndpointList>
            <ns3:Endpoint transportProfile="peppol-transport-as4-v2_0">
              <ns3:EndpointURI>https://as4.example.com/as4</ns3:EndpointURI>
              <ns3:RequireBusinessLevelSignature>false</ns3:RequireBusinessLevelSignature>
              <ns3:ServiceActivationDate>2024-01-01T00:00:00Z</ns3:ServiceActivationDate>
              <ns3:ServiceExpirationDate>2026-12-31</ns3:ServiceExpirationDate>
              <ns3:Certificate>TUlJQ2R6Q0NBZUNn</ns3:Certificate>
              <ns3:ServiceDescription>Example AP</ns3:ServiceDescription>
              <ns3:TechnicalContactUrl>mailto:ops@example.com</ns3:TechnicalContactUrl>
            </ns3:Endpoint>
          </ns3:ServiceEndpointList>
        </ns3:Process>
      </ns3:ProcessList>
    </ns3:ServiceInformation>
  </ns3:ServiceMetadata>
</ns3:SignedServiceMetadata>"#;

    #[test]
    fn test_decode_service_metadata() {
        let sm = decode_service_metadata(SERVICE_METADATA).unwrap();
        let doc = sm.document.unwrap();
        assert_eq!(doc.scheme, "busdox-docid-qns");
        assert!(doc.value.starts_with("urn:oasis:names"));
        assert_eq!(sm.processes.len(), 1);

        let endpoint = &sm.processes[0].endpoints[0];
        assert_eq!(endpoint.transport_profile, "peppol-transport-as4-v2_0");
        assert_eq!(endpoint.url, "https://as4.example.com/as4");
        assert!(!endpoint.require_business_level_signature);
        assert_eq!(endpoint.certificate.as_deref(), Some("TUlJQ2R6Q0NBZUNn"));
        assert_eq!(endpoint.service_description.as_deref(), Some("Example AP"));
        assert!(endpoint.service_activation_date.is_some());
        // Date-only expiration parses to midnight UTC
        assert!(endpoint.service_expiration_date.is_some());
    }

    #[test]
    fn test_decode_service_metadata_redirect() {
        let xml = r#"<ServiceMetadata>
  <Redirect href="https://other-smp.example.com/metadata"/>
</ServiceMetadata>"#;
        let sm = decode_service_metadata(xml).unwrap();
        assert_eq!(
            sm.redirect.as_deref(),
            Some("https://other-smp.example.com/metadata")
        );
        assert!(sm.document.is_none());
        assert!(sm.processes.is_empty());
    }

    #[test]
    fn test_decode_service_metadata_legacy_address() {
        let xml = r#"<ServiceMetadata><ServiceInformation>
  <DocumentIdentifier scheme="busdox-docid-qns">urn:doc</DocumentIdentifier>
  <ProcessList><Process>
    <ProcessIdentifier scheme="cenbii-procid-ubl">urn:proc</ProcessIdentifier>
    <ServiceEndpointList><Endpoint transportProfile="busdox-transport-start">
      <EndpointReference><Address>https://start.example.com/accesspoint</Address></EndpointReference>
    </Endpoint></ServiceEndpointList>
  </Process></ProcessList>
</ServiceInformation></ServiceMetadata>"#;
        let sm = decode_service_metadata(xml).unwrap();
        assert_eq!(
            sm.processes[0].endpoints[0].url,
            "https://start.example.com/accesspoint"
        );
    }

    #[test]
    fn test_decode_service_metadata_skips_incomplete_endpoints() {
        let xml = r#"<ServiceMetadata><ServiceInformation>
  <DocumentIdentifier scheme="busdox-docid-qns">urn:doc</DocumentIdentifier>
  <ProcessList><Process>
    <ProcessIdentifier scheme="cenbii-procid-ubl">urn:proc</ProcessIdentifier>
    <ServiceEndpointList>
      <Endpoint><EndpointURI>https://no-profile.example.com</EndpointURI></Endpoint>
      <Endpoint transportProfile="peppol-transport-as4-v2_0"/>
      <Endpoint transportProfile="peppol-transport-as4-v2_0">
        <EndpointURI>https://good.example.com/as4</EndpointURI>
      </Endpoint>
    </ServiceEndpointList>
  </Process></ProcessList>
</ServiceInformation></ServiceMetadata>"#;
        let sm = decode_service_metadata(xml).unwrap();
        assert_eq!(sm.processes[0].endpoints.len(), 1);
        assert_eq!(sm.processes[0].endpoints[0].url, "https://good.example.com/as4");
    }

    #[test]
    fn test_decode_service_metadata_bad_date_is_tolerated() {
        let xml = r#"<ServiceMetadata><ServiceInformation>
  <DocumentIdentifier scheme="busdox-docid-qns">urn:doc</DocumentIdentifier>
  <ProcessList><Process>
    <ProcessIdentifier scheme="cenbii-procid-ubl">urn:proc</ProcessIdentifier>
    <ServiceEndpointList><Endpoint transportProfile="peppol-transport-as4-v2_0">
      <EndpointURI>https://as4.example.com</EndpointURI>
      <ServiceActivationDate>soon</ServiceActivationDate>
    </Endpoint></ServiceEndpointList>
  </Process></ProcessList>
</ServiceInformation></ServiceMetadata>"#;
        let sm = decode_service_metadata(xml).unwrap();
        assert!(sm.processes[0].endpoints[0].service_activation_date.is_none());
    }

    #[test]
    fn test_decode_service_metadata_missing_document_identifier_fails() {
        let xml = "<ServiceMetadata><ServiceInformation/></ServiceMetadata>";
        assert!(decode_service_metadata(xml).is_err());
    }

    #[test]
    fn test_decode_business_card_elements() {
        let xml = r#"<BusinessCard>
  <BusinessEntity>
    <Name>Example Corp</Name>
    <CountryCode>BE</CountryCode>
    <Identifier scheme="0208">0843766574</Identifier>
    <GeographicalInformation>Brussels</GeographicalInformation>
    <WebsiteURI>https://example.com</WebsiteURI>
    <Contact>
      <TypeCode>support</TypeCode>
      <Name>Service Desk</Name>
      <Email>support@example.com</Email>
    </Contact>
  </BusinessEntity>
</BusinessCard>"#;
        let entity = decode_business_card(xml).unwrap().unwrap();
        assert_eq!(entity.name, "Example Corp");
        assert_eq!(entity.country_code, "BE");
        assert_eq!(entity.identifiers.len(), 1);
        assert_eq!(entity.identifiers[0].scheme.as_deref(), Some("0208"));
        assert_eq!(entity.geographical_info.as_deref(), Some("Brussels"));
        assert_eq!(entity.websites, vec!["https://example.com"]);
        assert_eq!(entity.contacts[0].email.as_deref(), Some("support@example.com"));
    }

    #[test]
    fn test_decode_business_card_attribute_spelling() {
        let xml = r#"<root xmlns="http://docs.oasis-open.org/bdxr/ns/SMP/2016/05">
  <BusinessCard>
    <BusinessEntity countryCode="NO">
      <Name name="Nordic Supplies"/>
    </BusinessEntity>
  </BusinessCard>
</root>"#;
        let entity = decode_business_card(xml).unwrap().unwrap();
        assert_eq!(entity.name, "Nordic Supplies");
        assert_eq!(entity.country_code, "NO");
    }

    #[test]
    fn test_decode_business_card_absent_is_not_an_error() {
        assert!(decode_business_card("<SomethingElse/>").unwrap().is_none());
        assert!(decode_business_card("<BusinessCard/>").unwrap().is_none());
    }

    #[test]
    fn test_parse_date_best_effort() {
        assert!(parse_date_best_effort("2024-02-26T00:00:00Z").is_some());
        assert!(parse_date_best_effort("2024-02-26T00:00:00+01:00").is_some());
        assert!(parse_date_best_effort("2024-02-26T00:00:00").is_some());
        assert!(parse_date_best_effort("2024-02-26").is_some());
        assert!(parse_date_best_effort("tomorrow").is_none());
    }
}
