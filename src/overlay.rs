use crate::font::LoadedFont;
use crate::layout::TextBlock;
use crate::qr::QrBitmap;
use crate::types::{Color, Pt, Size};
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};

// Geometry of the fixed certificate template, in PDF points.
const NAME_ANCHOR_X: f32 = 390.0;
const NAME_ANCHOR_Y: f32 = 329.0;
const ID_X: f32 = 613.0;
const ID_Y: f32 = 362.0;
const ID_FONT_SIZE: f32 = 14.0;
const ID_CHAR_SPACING: f32 = 1.0;
const VALIDITY_X: f32 = 230.0;
const VALIDITY_Y: f32 = 107.5;
const VALIDITY_FONT_SIZE: f32 = 23.0;
const VALIDITY_CHAR_SPACING: f32 = 1.3;
const QR_X: f32 = 638.6;
const QR_Y: f32 = 184.0;
const QR_SIDE: f32 = 96.0;
const VERIFY_X: f32 = 260.0;
const VERIFY_Y: f32 = 42.8;
const VERIFY_FONT_SIZE: f32 = 13.0;
const LINK_WIDTH_BUFFER: f32 = 10.0;

/// One advance unit of letter-spaced text. Character runs advance the cursor
/// by `multiplier * CHAR_SPACING_UNIT` per character, independent of glyph
/// width; the template's hit boxes are designed around this fixed advance.
const CHAR_SPACING_UNIT: f32 = 10.0;

fn name_color() -> Color {
    Color::from_rgb8(0xab, 0xab, 0xab)
}

fn light_color() -> Color {
    Color::from_rgb8(0xf9, 0xf7, 0xf7)
}

fn green_color() -> Color {
    Color::from_rgb8(0x1e, 0xbb, 0x58)
}

/// An ephemeral one-page PDF rendered purely for compositing. Never persisted
/// on its own; consumed by exactly one stamp call.
pub struct OverlayLayer {
    doc: LoDocument,
}

impl OverlayLayer {
    pub(crate) fn into_document(self) -> LoDocument {
        self.doc
    }

    #[cfg(test)]
    pub(crate) fn page_content(&self) -> Vec<u8> {
        let page_id = *self.doc.get_pages().values().next().expect("overlay page");
        self.doc.get_page_content(page_id).expect("overlay content")
    }

    #[cfg(test)]
    pub(crate) fn document(&self) -> &LoDocument {
        &self.doc
    }
}

/// Multi-line centered name block in the bold weight.
pub fn name_overlay(page_size: Size, font: &LoadedFont, username: &str) -> OverlayLayer {
    let block = TextBlock::compute(username);
    let m_advance = font.char_advance(block.font_size, 'M');
    let placed = block.placed_lines(
        Pt::from_f32(NAME_ANCHOR_X),
        Pt::from_f32(NAME_ANCHOR_Y),
        m_advance,
    );

    let mut builder = OverlayBuilder::new();
    let font_res = builder.add_font(font);
    builder.set_fill_color(name_color());
    for line in &placed {
        builder.draw_string(&font_res, block.font_size, line.x, line.y, &line.text);
    }
    builder.finish(page_size)
}

/// Letter-spaced certificate identifier in the semibold weight.
pub fn certificate_id_overlay(
    page_size: Size,
    font: &LoadedFont,
    certificate_id: &str,
) -> OverlayLayer {
    let mut builder = OverlayBuilder::new();
    let font_res = builder.add_font(font);
    builder.set_fill_color(light_color());
    builder.draw_string_spaced(
        &font_res,
        Pt::from_f32(ID_FONT_SIZE),
        Pt::from_f32(ID_X),
        Pt::from_f32(ID_Y),
        Pt::from_f32(ID_CHAR_SPACING * CHAR_SPACING_UNIT),
        certificate_id,
    );
    builder.finish(page_size)
}

/// Letter-spaced validity range `"{from} to {to}"` in the bold weight.
pub fn validity_overlay(
    page_size: Size,
    font: &LoadedFont,
    from_date: &str,
    to_date: &str,
) -> OverlayLayer {
    let validity = format!("{} to {}", from_date, to_date);
    let mut builder = OverlayBuilder::new();
    let font_res = builder.add_font(font);
    builder.set_fill_color(green_color());
    builder.draw_string_spaced(
        &font_res,
        Pt::from_f32(VALIDITY_FONT_SIZE),
        Pt::from_f32(VALIDITY_X),
        Pt::from_f32(VALIDITY_Y),
        Pt::from_f32(VALIDITY_CHAR_SPACING * CHAR_SPACING_UNIT),
        &validity,
    );
    builder.finish(page_size)
}

/// QR bitmap scaled into its fixed 96x96pt footprint.
pub fn qr_overlay(page_size: Size, bitmap: &QrBitmap) -> OverlayLayer {
    let mut builder = OverlayBuilder::new();
    let image_res = builder.add_image(bitmap.image_xobject());
    builder.draw_image(
        &image_res,
        Pt::from_f32(QR_X),
        Pt::from_f32(QR_Y),
        Pt::from_f32(QR_SIDE),
        Pt::from_f32(QR_SIDE),
    );
    builder.finish(page_size)
}

/// Verification URL text with a clickable link annotation over its rendered
/// bounding box.
pub fn verification_overlay(page_size: Size, font: &LoadedFont, url: &str) -> OverlayLayer {
    let size = Pt::from_f32(VERIFY_FONT_SIZE);
    let url_width = font.string_width(size, url) + Pt::from_f32(LINK_WIDTH_BUFFER);

    let x = Pt::from_f32(VERIFY_X);
    let y = Pt::from_f32(VERIFY_Y);

    let mut builder = OverlayBuilder::new();
    let font_res = builder.add_font(font);
    builder.set_fill_color(light_color());
    builder.add_link(
        [x, y - Pt::from_f32(5.0), x + url_width, y + Pt::from_f32(20.0)],
        url,
    );
    builder.draw_string(&font_res, size, x, y, url);
    builder.finish(page_size)
}

struct OverlayBuilder {
    doc: LoDocument,
    content: Vec<u8>,
    fonts: Vec<(String, LoObjectId)>,
    xobjects: Vec<(String, LoObjectId)>,
    annots: Vec<LoObjectId>,
}

impl OverlayBuilder {
    fn new() -> Self {
        Self {
            doc: LoDocument::with_version("1.5"),
            content: Vec::new(),
            fonts: Vec::new(),
            xobjects: Vec::new(),
            annots: Vec::new(),
        }
    }

    fn add_font(&mut self, font: &LoadedFont) -> String {
        let id = font.embed(&mut self.doc);
        let name = format!("F{}", self.fonts.len() + 1);
        self.fonts.push((name.clone(), id));
        name
    }

    fn add_image(&mut self, stream: LoStream) -> String {
        let id = self.doc.add_object(stream);
        let name = format!("Im{}", self.xobjects.len() + 1);
        self.xobjects.push((name.clone(), id));
        name
    }

    fn set_fill_color(&mut self, color: Color) {
        self.content.extend_from_slice(
            format!("{:.4} {:.4} {:.4} rg\n", color.r, color.g, color.b).as_bytes(),
        );
    }

    fn draw_string(&mut self, font_res: &str, size: Pt, x: Pt, y: Pt, text: &str) {
        self.content.extend_from_slice(
            format!(
                "BT /{} {} Tf {} {} Td (",
                font_res,
                fmt_pt(size),
                fmt_pt(x),
                fmt_pt(y)
            )
            .as_bytes(),
        );
        self.content.extend_from_slice(&encode_text(text));
        self.content.extend_from_slice(b") Tj ET\n");
    }

    /// Draws each character at a cursor advanced by a constant amount,
    /// independent of true glyph width.
    fn draw_string_spaced(
        &mut self,
        font_res: &str,
        size: Pt,
        x: Pt,
        y: Pt,
        advance: Pt,
        text: &str,
    ) {
        let mut cursor = x;
        for ch in text.chars() {
            let mut buf = [0u8; 4];
            self.draw_string(font_res, size, cursor, y, ch.encode_utf8(&mut buf));
            cursor = cursor + advance;
        }
    }

    fn draw_image(&mut self, image_res: &str, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.content.extend_from_slice(
            format!(
                "q {} 0 0 {} {} {} cm /{} Do Q\n",
                fmt_pt(width),
                fmt_pt(height),
                fmt_pt(x),
                fmt_pt(y),
                image_res
            )
            .as_bytes(),
        );
    }

    fn add_link(&mut self, rect: [Pt; 4], url: &str) {
        let id = self.doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => rect.iter().map(|v| v.to_f32().into()).collect::<Vec<LoObject>>(),
            "Border" => vec![0.into(), 0.into(), 0.into()],
            "A" => dictionary! {
                "Type" => "Action",
                "S" => "URI",
                "URI" => LoObject::string_literal(url),
            },
        });
        self.annots.push(id);
    }

    fn finish(self, page_size: Size) -> OverlayLayer {
        let mut doc = self.doc;
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, self.content));

        let mut resources = lopdf::Dictionary::new();
        if !self.fonts.is_empty() {
            let mut fonts = lopdf::Dictionary::new();
            for (name, id) in &self.fonts {
                fonts.set(name.as_bytes().to_vec(), LoObject::Reference(*id));
            }
            resources.set("Font", LoObject::Dictionary(fonts));
        }
        if !self.xobjects.is_empty() {
            let mut xobjects = lopdf::Dictionary::new();
            for (name, id) in &self.xobjects {
                xobjects.set(name.as_bytes().to_vec(), LoObject::Reference(*id));
            }
            resources.set("XObject", LoObject::Dictionary(xobjects));
        }

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => LoObject::Reference(pages_id),
            "Contents" => LoObject::Reference(content_id),
            "Resources" => LoObject::Dictionary(resources),
            "MediaBox" => vec![
                0.into(),
                0.into(),
                page_size.width.to_f32().into(),
                page_size.height.to_f32().into(),
            ],
        };
        if !self.annots.is_empty() {
            page.set(
                "Annots",
                LoObject::Array(self.annots.iter().map(|id| LoObject::Reference(*id)).collect()),
            );
        }
        let page_id = doc.add_object(page);

        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![LoObject::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        OverlayLayer { doc }
    }
}

/// Formats a point value without trailing zeros (`329`, `638.6`).
fn fmt_pt(value: Pt) -> String {
    let milli = value.to_milli_i64();
    if milli % 1000 == 0 {
        format!("{}", milli / 1000)
    } else {
        format!("{}", milli as f64 / 1000.0)
    }
}

/// Encodes text for a literal PDF string under WinAnsi-compatible single-byte
/// mapping. Characters above U+00FF have no slot in the simple font and are
/// replaced.
fn encode_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' => out.extend_from_slice(b"\\("),
            ')' => out.extend_from_slice(b"\\)"),
            '\\' => out.extend_from_slice(b"\\\\"),
            ch if (ch as u32) < 256 => out.push(ch as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}
