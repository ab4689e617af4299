/// SMP document model
///
/// Typed representations of the three SMP XML document families:
/// ServiceGroup (the participant's catalog), ServiceMetadata (per
/// document-type endpoint details), and the optional BusinessCard
/// extension.
pub mod decode;

pub use decode::{decode_business_card, decode_service_group, decode_service_metadata};

use crate::participant::ParticipantIdentifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A Peppol document type identifier (scheme + value)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIdentifier {
    pub scheme: String,
    pub value: String,
}

impl fmt::Display for DocumentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.scheme, self.value)
    }
}

/// A Peppol process identifier (scheme + value)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessIdentifier {
    pub scheme: String,
    pub value: String,
}

/// A transport endpoint advertised by the SMP
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub transport_profile: String,
    pub url: String,
    /// Base64 access-point certificate, verbatim as published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_contact_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_information_url: Option<String>,
    pub require_business_level_signature: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_activation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_expiration_date: Option<DateTime<Utc>>,
}

/// A process with its endpoint list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub identifier: ProcessIdentifier,
    pub endpoints: Vec<Endpoint>,
}

/// The participant's service catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGroup {
    pub participant: ParticipantIdentifier,
    /// ServiceMetadataReference hrefs in document order; empty is legal
    /// and signals a parked registration
    pub service_references: Vec<String>,
}

/// Per document-type metadata record
///
/// Either a redirect superseding the record, or a document identifier
/// with its process/endpoint tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentIdentifier>,
    pub processes: Vec<Process>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// An identifier attached to a business entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityIdentifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    pub value: String,
}

/// A contact listed on a business card
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Organizational identity published via the BusinessCard extension
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessEntity {
    pub name: String,
    pub country_code: String,
    pub identifiers: Vec<EntityIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geographical_info: Option<String>,
    pub websites: Vec<String>,
    pub contacts: Vec<Contact>,
}
