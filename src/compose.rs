use crate::error::CertPressError;
use crate::overlay::OverlayLayer;
use crate::types::{Pt, Size};
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};
use std::path::Path;

/// The PDF byte buffer handed from stage to stage. Each stamp produces a new
/// buffer; nothing is ever rewritten in place.
#[derive(Debug, Clone)]
pub struct WorkingDocument {
    bytes: Vec<u8>,
}

impl WorkingDocument {
    /// Reads the template from disk. Fails fast with `TemplateMissing` before
    /// any stage runs.
    pub fn from_template(path: impl AsRef<Path>) -> Result<WorkingDocument, CertPressError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CertPressError::TemplateMissing(path.to_path_buf()));
        }
        Ok(Self {
            bytes: std::fs::read(path)?,
        })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> WorkingDocument {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), CertPressError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn page_count(&self) -> Result<usize, CertPressError> {
        let doc = LoDocument::load_mem(&self.bytes)?;
        Ok(doc.get_pages().len())
    }

    /// Media-box dimensions of the page at `page_index`.
    pub fn page_size(&self, page_index: usize) -> Result<Size, CertPressError> {
        let doc = LoDocument::load_mem(&self.bytes)?;
        let pages = doc.get_pages();
        let page_count = pages.len();
        let page_id = *pages
            .values()
            .nth(page_index)
            .ok_or(CertPressError::PageIndexOutOfRange { page: page_index, page_count })?;
        let page = doc.get_object(page_id).and_then(LoObject::as_dict)?;
        let bounds = page_box(page);
        Ok(Size {
            width: Pt::from_f32(number(&bounds[2]) - number(&bounds[0])),
            height: Pt::from_f32(number(&bounds[3]) - number(&bounds[1])),
        })
    }
}

/// Flattens a one-page overlay onto the page at `page_index`, leaving every
/// other page untouched. The overlay's content becomes a Form XObject
/// registered under a `label`-derived resource name (stamps on the same page
/// must use distinct labels), and its link annotations are carried over to
/// the target page.
pub fn stamp_overlay(
    working: &WorkingDocument,
    overlay: OverlayLayer,
    page_index: usize,
    label: &str,
) -> Result<WorkingDocument, CertPressError> {
    let mut target = LoDocument::load_mem(working.as_bytes())?;
    if target.is_encrypted() {
        return Err(CertPressError::Compose(
            "input document is encrypted".to_string(),
        ));
    }

    let pages = target.get_pages();
    let page_count = pages.len();
    if page_index >= page_count {
        return Err(CertPressError::PageIndexOutOfRange { page: page_index, page_count });
    }
    let page_id = *pages
        .values()
        .nth(page_index)
        .ok_or(CertPressError::PageIndexOutOfRange { page: page_index, page_count })?;

    // Merge the overlay's objects into the target under fresh ids.
    let mut overlay_doc = overlay.into_document();
    let start_id = target.max_id + 1;
    overlay_doc.renumber_objects_with(start_id);
    let overlay_pages = overlay_doc.get_pages();
    let overlay_page_id = *overlay_pages
        .values()
        .next()
        .ok_or_else(|| CertPressError::Compose("overlay has no pages".to_string()))?;
    if overlay_doc.max_id > target.max_id {
        target.max_id = overlay_doc.max_id;
    }
    target.objects.extend(overlay_doc.objects);

    let overlay_page = target
        .get_object(overlay_page_id)
        .and_then(LoObject::as_dict)?
        .clone();
    let overlay_content = target.get_page_content(overlay_page_id)?;
    let bbox = page_box(&overlay_page);
    let overlay_resources = page_resources_object(&target, &overlay_page);

    let form_id = target.add_object(LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => LoObject::Array(bbox),
            "Resources" => overlay_resources,
        },
        overlay_content,
    ));
    let form_name = format!("CPOvl{}", label);

    let page_dict = target
        .get_object(page_id)
        .and_then(LoObject::as_dict)?
        .clone();
    let mut resources = page_resources_dict(&page_dict, &target);
    let mut xobjects = page_xobject_dict(&resources, &target);
    xobjects.set(form_name.as_bytes().to_vec(), LoObject::Reference(form_id));
    resources.set("XObject", LoObject::Dictionary(xobjects));

    let annots = merged_annotations(&page_dict, &overlay_page, &target);

    {
        let page_mut = target
            .get_object_mut(page_id)
            .and_then(LoObject::as_dict_mut)?;
        page_mut.set("Resources", LoObject::Dictionary(resources));
        if let Some(annots) = annots {
            page_mut.set("Annots", LoObject::Array(annots));
        }
    }

    let do_content = format!("q /{} Do Q\n", form_name).into_bytes();
    target.add_page_contents(page_id, do_content)?;

    target.prune_objects();
    target.renumber_objects();
    target.compress();

    let mut out = Vec::new();
    target.save_to(&mut out)?;
    Ok(WorkingDocument::from_bytes(out))
}

fn page_box(page: &lopdf::Dictionary) -> Vec<LoObject> {
    if let Ok(arr) = page.get(b"CropBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    if let Ok(arr) = page.get(b"MediaBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    vec![0.into(), 0.into(), 612.into(), 792.into()]
}

fn number(obj: &LoObject) -> f32 {
    obj.as_float().unwrap_or(0.0)
}

fn page_resources_object(doc: &LoDocument, page: &lopdf::Dictionary) -> LoObject {
    match page.get(b"Resources") {
        Ok(obj) => match obj {
            LoObject::Reference(id) => doc
                .get_object(*id)
                .map(|o| o.clone())
                .unwrap_or_else(|_| LoObject::Dictionary(lopdf::Dictionary::new())),
            LoObject::Dictionary(d) => LoObject::Dictionary(d.clone()),
            _ => LoObject::Dictionary(lopdf::Dictionary::new()),
        },
        Err(_) => LoObject::Dictionary(lopdf::Dictionary::new()),
    }
}

fn page_resources_dict(page: &lopdf::Dictionary, doc: &LoDocument) -> lopdf::Dictionary {
    match page.get(b"Resources") {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => lopdf::Dictionary::new(),
    }
}

fn page_xobject_dict(resources: &lopdf::Dictionary, doc: &LoDocument) -> lopdf::Dictionary {
    match resources.get(b"XObject") {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => lopdf::Dictionary::new(),
    }
}

fn annotation_refs(page: &lopdf::Dictionary, doc: &LoDocument) -> Vec<LoObject> {
    match page.get(b"Annots") {
        Ok(LoObject::Array(a)) => a.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_array().ok())
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

// Form XObject flattening drops the overlay page itself, so annotations must
// move to the target page to survive.
fn merged_annotations(
    page: &lopdf::Dictionary,
    overlay_page: &lopdf::Dictionary,
    doc: &LoDocument,
) -> Option<Vec<LoObject>> {
    let overlay_annots = annotation_refs(overlay_page, doc);
    if overlay_annots.is_empty() {
        return None;
    }
    let mut annots = annotation_refs(page, doc);
    annots.extend(overlay_annots);
    Some(annots)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Synthetic single-page letter-size PDF with one line of text.
    pub(crate) fn make_single_page_pdf(text: &str) -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = format!("BT /F1 18 Tf 72 720 Td ({}) Tj ET", text).into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, LoObject::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save");
        out
    }

    pub(crate) fn page_content(bytes: &[u8], page_index: usize) -> Vec<u8> {
        let doc = LoDocument::load_mem(bytes).expect("load");
        let page_id = *doc
            .get_pages()
            .values()
            .nth(page_index)
            .expect("page id");
        doc.get_page_content(page_id).expect("content")
    }

    /// Decompressed bytes of every stream object in the document.
    pub(crate) fn all_stream_bytes(bytes: &[u8]) -> Vec<u8> {
        let doc = LoDocument::load_mem(bytes).expect("load");
        let mut out = Vec::new();
        for object in doc.objects.values() {
            if let LoObject::Stream(stream) = object {
                match stream.decompressed_content() {
                    Ok(content) => out.extend_from_slice(&content),
                    Err(_) => out.extend_from_slice(&stream.content),
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::font::LoadedFont;
    use crate::overlay;

    fn letter_size() -> Size {
        Size::letter()
    }

    #[test]
    fn page_size_reads_the_template_media_box() {
        let template = WorkingDocument::from_bytes(make_single_page_pdf("TEMPLATE"));
        let size = template.page_size(0).expect("size");
        assert_eq!(size.width.to_milli_i64(), 612_000);
        assert_eq!(size.height.to_milli_i64(), 792_000);
        assert_eq!(template.page_count().expect("count"), 1);
    }

    #[test]
    fn stamp_preserves_page_count_and_appends_form_invocation() {
        let template = WorkingDocument::from_bytes(make_single_page_pdf("TEMPLATE"));
        let font = LoadedFont::fixed_pitch_stub();
        let layer = overlay::certificate_id_overlay(letter_size(), &font, "MATHIN-0001");

        let stamped = stamp_overlay(&template, layer, 0, "CertId").expect("stamp");
        assert_eq!(stamped.page_count().expect("count"), 1);

        let content = page_content(stamped.as_bytes(), 0);
        let content = String::from_utf8_lossy(&content);
        assert!(content.contains("/CPOvlCertId Do"), "content: {content}");
        // Original page content is still there, before the overlay.
        assert!(content.contains("(TEMPLATE) Tj"));
    }

    #[test]
    fn stamp_rejects_out_of_range_page_index() {
        let template = WorkingDocument::from_bytes(make_single_page_pdf("TEMPLATE"));
        let font = LoadedFont::fixed_pitch_stub();
        let layer = overlay::certificate_id_overlay(letter_size(), &font, "X");

        let err = stamp_overlay(&template, layer, 5, "CertId").expect_err("must fail");
        match err {
            CertPressError::PageIndexOutOfRange { page, page_count } => {
                assert_eq!(page, 5);
                assert_eq!(page_count, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stamp_carries_link_annotations_onto_the_target_page() {
        let template = WorkingDocument::from_bytes(make_single_page_pdf("TEMPLATE"));
        let font = LoadedFont::fixed_pitch_stub();
        let url = "https://example.com/verify/X";
        let layer = overlay::verification_overlay(letter_size(), &font, url);

        let stamped = stamp_overlay(&template, layer, 0, "Verify").expect("stamp");
        let doc = LoDocument::load_mem(stamped.as_bytes()).expect("load");
        let page_id = *doc.get_pages().values().next().expect("page");
        let page = doc
            .get_object(page_id)
            .and_then(LoObject::as_dict)
            .expect("page dict");
        let annots = page.get(b"Annots").and_then(LoObject::as_array).expect("annots");
        assert_eq!(annots.len(), 1);
        let annot = doc
            .get_object(annots[0].as_reference().expect("ref"))
            .and_then(LoObject::as_dict)
            .expect("annot");
        let action = annot.get(b"A").and_then(LoObject::as_dict).expect("action");
        assert_eq!(
            action.get(b"URI").and_then(LoObject::as_str).expect("uri"),
            url.as_bytes()
        );
    }

    #[test]
    fn successive_stamps_compose_onto_the_merged_output() {
        let template = WorkingDocument::from_bytes(make_single_page_pdf("TEMPLATE"));
        let font = LoadedFont::fixed_pitch_stub();

        let first = stamp_overlay(
            &template,
            overlay::certificate_id_overlay(letter_size(), &font, "AAA"),
            0,
            "CertId",
        )
        .expect("first");
        let second = stamp_overlay(
            &first,
            overlay::validity_overlay(letter_size(), &font, "01-01-2024", "01-01-2025"),
            0,
            "Validity",
        )
        .expect("second");

        let content = page_content(second.as_bytes(), 0);
        let content = String::from_utf8_lossy(&content);
        let cert_pos = content.find("/CPOvlCertId Do").expect("cert stamp");
        let validity_pos = content.find("/CPOvlValidity Do").expect("validity stamp");
        assert!(cert_pos < validity_pos, "stage order must be preserved");
    }

    #[test]
    fn disjoint_overlays_commute_structurally() {
        let template = WorkingDocument::from_bytes(make_single_page_pdf("TEMPLATE"));
        let font = LoadedFont::fixed_pitch_stub();

        let ab = {
            let a = stamp_overlay(
                &template,
                overlay::certificate_id_overlay(letter_size(), &font, "AAA"),
                0,
                "A",
            )
            .expect("a");
            stamp_overlay(
                &a,
                overlay::validity_overlay(letter_size(), &font, "01-01-2024", "01-01-2025"),
                0,
                "B",
            )
            .expect("ab")
        };
        let ba = {
            let b = stamp_overlay(
                &template,
                overlay::validity_overlay(letter_size(), &font, "01-01-2024", "01-01-2025"),
                0,
                "B",
            )
            .expect("b");
            stamp_overlay(
                &b,
                overlay::certificate_id_overlay(letter_size(), &font, "AAA"),
                0,
                "A",
            )
            .expect("ba")
        };

        // Same drawn payloads end up in both documents regardless of stamp
        // order; only the invocation order differs.
        let streams_ab = String::from_utf8_lossy(&all_stream_bytes(ab.as_bytes())).into_owned();
        let streams_ba = String::from_utf8_lossy(&all_stream_bytes(ba.as_bytes())).into_owned();
        for needle in ["(A) Tj", "613 362 Td", "230 107.5 Td", "(TEMPLATE) Tj"] {
            assert!(streams_ab.contains(needle), "ab missing {needle}");
            assert!(streams_ba.contains(needle), "ba missing {needle}");
        }
        assert_eq!(ab.page_count().expect("count"), 1);
        assert_eq!(ba.page_count().expect("count"), 1);
    }

    #[test]
    fn missing_template_file_fails_fast() {
        let path = std::env::temp_dir().join(format!(
            "certpress_missing_template_{}_{}.pdf",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let err = WorkingDocument::from_template(&path).expect_err("must fail");
        assert!(matches!(err, CertPressError::TemplateMissing(_)));
    }
}
