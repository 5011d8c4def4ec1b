use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CertPressError {
    TemplateMissing(PathBuf),
    FontResourceMissing(PathBuf),
    PageIndexOutOfRange { page: usize, page_count: usize },
    Compose(String),
    Qr(String),
    MetadataWrite(String),
    Pdf(lopdf::Error),
    Io(std::io::Error),
    // Uniform pipeline-level failure; the cause stays on the source chain.
    GenerationFailed(Box<CertPressError>),
}

impl fmt::Display for CertPressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertPressError::TemplateMissing(path) => {
                write!(f, "template file not found: {}", path.display())
            }
            CertPressError::FontResourceMissing(path) => {
                write!(f, "font resource not found or unreadable: {}", path.display())
            }
            CertPressError::PageIndexOutOfRange { page, page_count } => {
                write!(
                    f,
                    "page index out of range: {} (document has {} page(s))",
                    page, page_count
                )
            }
            CertPressError::Compose(message) => write!(f, "compose error: {}", message),
            CertPressError::Qr(message) => write!(f, "qr encode error: {}", message),
            CertPressError::MetadataWrite(message) => {
                write!(f, "metadata write error: {}", message)
            }
            CertPressError::Pdf(err) => write!(f, "pdf error: {}", err),
            CertPressError::Io(err) => write!(f, "io error: {}", err),
            CertPressError::GenerationFailed(_) => write!(f, "certificate generation failed"),
        }
    }
}

impl std::error::Error for CertPressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CertPressError::Pdf(err) => Some(err),
            CertPressError::Io(err) => Some(err),
            CertPressError::GenerationFailed(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CertPressError {
    fn from(value: std::io::Error) -> Self {
        CertPressError::Io(value)
    }
}

impl From<lopdf::Error> for CertPressError {
    fn from(value: lopdf::Error) -> Self {
        CertPressError::Pdf(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failed_display_is_uniform() {
        let inner = CertPressError::PageIndexOutOfRange {
            page: 5,
            page_count: 1,
        };
        let err = CertPressError::GenerationFailed(Box::new(inner));
        assert_eq!(err.to_string(), "certificate generation failed");
    }

    #[test]
    fn generation_failed_keeps_cause_on_source_chain() {
        use std::error::Error;
        let inner = CertPressError::Qr("data too long".to_string());
        let err = CertPressError::GenerationFailed(Box::new(inner));
        let source = err.source().expect("source");
        assert!(source.to_string().contains("data too long"));
    }
}
