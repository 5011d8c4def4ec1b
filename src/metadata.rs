use crate::compose::WorkingDocument;
use crate::error::CertPressError;
use lopdf::{Document as LoDocument, Object as LoObject, dictionary};

const CERTIFICATE_TITLE: &str = "MathIn Pro - Certificate";
const CERTIFICATE_AUTHOR: &str = "MathIn";
const CERTIFICATE_SUBJECT: &str = "Certificate for successful completion of MathIn Pro test";

/// Document-level metadata written as the terminal pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: String,
    pub author: Option<String>,
    pub subject: Option<String>,
}

impl DocumentInfo {
    pub fn mathin_certificate() -> DocumentInfo {
        Self {
            title: CERTIFICATE_TITLE.to_string(),
            author: Some(CERTIFICATE_AUTHOR.to_string()),
            subject: Some(CERTIFICATE_SUBJECT.to_string()),
        }
    }
}

/// Rewrites the trailer's /Info dictionary, leaving page content untouched.
/// Callers treat failure as non-fatal: the pre-metadata buffer is still a
/// correct, complete certificate.
pub fn apply(
    working: &WorkingDocument,
    info: &DocumentInfo,
) -> Result<WorkingDocument, CertPressError> {
    let mut doc = LoDocument::load_mem(working.as_bytes())
        .map_err(|err| CertPressError::MetadataWrite(err.to_string()))?;

    let mut dict = dictionary! {
        "Title" => LoObject::string_literal(info.title.as_str()),
    };
    if let Some(author) = &info.author {
        dict.set("Author", LoObject::string_literal(author.as_str()));
    }
    if let Some(subject) = &info.subject {
        dict.set("Subject", LoObject::string_literal(subject.as_str()));
    }
    let info_id = doc.add_object(dict);
    doc.trailer.set("Info", LoObject::Reference(info_id));

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|err| CertPressError::MetadataWrite(err.to_string()))?;
    Ok(WorkingDocument::from_bytes(out))
}
