//! certpress generates MathIn Pro completion certificates by stamping
//! per-recipient overlays onto a fixed PDF template.
//!
//! The pipeline runs entirely in memory: a template is loaded into a
//! [`WorkingDocument`], five overlay layers (name, certificate id, QR code,
//! validity window, verification link) are composited onto its first page one
//! stage at a time, document metadata is written last, and the finished
//! buffer is flushed to disk in a single write. Each stage consumes an
//! immutable input buffer and produces a fresh one, so a failed stage never
//! leaves a half-stamped document behind.
//!
//! [`CertPress`] is the high-level entry point; the per-stage building blocks
//! (layout, overlay construction, compositing, QR encoding, metadata) are
//! public for callers that want to assemble a variant pipeline.

pub mod compose;
pub mod error;
pub mod font;
pub mod layout;
pub mod metadata;
pub mod overlay;
pub mod pipeline;
pub mod qr;
pub mod types;

pub use compose::{WorkingDocument, stamp_overlay};
pub use error::CertPressError;
pub use font::{FontCatalog, LoadedFont};
pub use layout::{MAX_CHARS_PER_LINE, MAX_NAME_CHARS, PlacedLine, TextBlock, wrap_words};
pub use metadata::DocumentInfo;
pub use overlay::{
    OverlayLayer, certificate_id_overlay, name_overlay, qr_overlay, validity_overlay,
    verification_overlay,
};
pub use pipeline::{
    CertPress, CertificateRequest, DEFAULT_VERIFY_BASE_URL, GeneratedCertificate,
    output_file_name,
};
pub use qr::QrBitmap;
pub use types::{Color, Pt, Size};
