use crate::compose::{WorkingDocument, stamp_overlay};
use crate::error::CertPressError;
use crate::font::FontCatalog;
use crate::metadata::{self, DocumentInfo};
use crate::overlay;
use crate::qr::QrBitmap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_VERIFY_BASE_URL: &str = "https://aswin-vs.github.io/MathIn/verify";

/// All overlays land on the template's first page.
const TARGET_PAGE_INDEX: usize = 0;

/// A certificate generation request. All fields are opaque display strings;
/// `certificate_id` doubles as a filename component and URL path segment, and
/// callers are expected to keep it safe for both.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "server", derive(serde::Deserialize))]
pub struct CertificateRequest {
    pub username: String,
    pub certificate_id: String,
    pub from_date: String,
    pub to_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCertificate {
    pub path: PathBuf,
    pub bytes_written: usize,
    /// False when metadata finalization failed and the un-finalized (still
    /// content-correct) document was served instead.
    pub metadata_applied: bool,
}

/// The certificate compositing pipeline. Holds the one-time font catalog and
/// the read-only template path; safe to share across concurrent requests.
#[derive(Debug, Clone)]
pub struct CertPress {
    fonts: Arc<FontCatalog>,
    template_path: PathBuf,
    verify_base_url: String,
}

impl CertPress {
    pub fn new(fonts: Arc<FontCatalog>, template_path: impl Into<PathBuf>) -> CertPress {
        Self {
            fonts,
            template_path: template_path.into(),
            verify_base_url: DEFAULT_VERIFY_BASE_URL.to_string(),
        }
    }

    pub fn with_verify_base_url(mut self, base_url: impl Into<String>) -> CertPress {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        self.verify_base_url = base_url;
        self
    }

    /// The URL encoded into the QR code and rendered as the clickable
    /// verification link. Both renderings embed the exact same string.
    pub fn verification_url(&self, certificate_id: &str) -> String {
        format!("{}/{}", self.verify_base_url, certificate_id)
    }

    /// Runs the full pipeline and writes the finished certificate to
    /// `output_path`. Fatal stage errors surface as one uniform
    /// `GenerationFailed`; a missing template fails fast before any stage.
    pub fn generate(
        &self,
        request: &CertificateRequest,
        output_path: impl AsRef<Path>,
    ) -> Result<GeneratedCertificate, CertPressError> {
        let output_path = output_path.as_ref();
        if !self.template_path.exists() {
            return Err(CertPressError::TemplateMissing(self.template_path.clone()));
        }

        match self.run_stages(request).and_then(|(document, metadata_applied)| {
            document.write_to(output_path)?;
            Ok(GeneratedCertificate {
                path: output_path.to_path_buf(),
                bytes_written: document.as_bytes().len(),
                metadata_applied,
            })
        }) {
            Ok(generated) => {
                tracing::info!(
                    certificate_id = %request.certificate_id,
                    path = %generated.path.display(),
                    bytes = generated.bytes_written,
                    "certificate generated"
                );
                Ok(generated)
            }
            Err(err) => {
                tracing::error!(
                    certificate_id = %request.certificate_id,
                    error = %err,
                    "certificate generation failed"
                );
                Err(CertPressError::GenerationFailed(Box::new(err)))
            }
        }
    }

    fn run_stages(
        &self,
        request: &CertificateRequest,
    ) -> Result<(WorkingDocument, bool), CertPressError> {
        let template = WorkingDocument::from_template(&self.template_path)?;
        let page_size = template.page_size(TARGET_PAGE_INDEX)?;
        let url = self.verification_url(&request.certificate_id);

        let working = stamp_overlay(
            &template,
            overlay::name_overlay(page_size, self.fonts.bold(), &request.username),
            TARGET_PAGE_INDEX,
            "Name",
        )?;
        let working = stamp_overlay(
            &working,
            overlay::certificate_id_overlay(
                page_size,
                self.fonts.semibold(),
                &request.certificate_id,
            ),
            TARGET_PAGE_INDEX,
            "CertId",
        )?;
        let qr = QrBitmap::for_url(&url)?;
        let working = stamp_overlay(
            &working,
            overlay::qr_overlay(page_size, &qr),
            TARGET_PAGE_INDEX,
            "Qr",
        )?;
        let working = stamp_overlay(
            &working,
            overlay::validity_overlay(
                page_size,
                self.fonts.bold(),
                &request.from_date,
                &request.to_date,
            ),
            TARGET_PAGE_INDEX,
            "Validity",
        )?;
        let working = stamp_overlay(
            &working,
            overlay::verification_overlay(page_size, self.fonts.semibold(), &url),
            TARGET_PAGE_INDEX,
            "Verify",
        )?;

        // The one deliberate exception to "all stage failures abort": a
        // failed metadata rewrite degrades to the un-finalized document.
        match metadata::apply(&working, &DocumentInfo::mathin_certificate()) {
            Ok(finalized) => Ok((finalized, true)),
            Err(err) => {
                tracing::warn!(
                    certificate_id = %request.certificate_id,
                    error = %err,
                    "metadata finalization failed; serving un-finalized document"
                );
                Ok((working, false))
            }
        }
    }
}

/// Canonical output file name for a certificate id. The same id always maps
/// to the same name.
pub fn output_file_name(certificate_id: &str) -> String {
    format!("{}_certificate.pdf", certificate_id)
}
