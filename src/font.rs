use crate::error::CertPressError;
use crate::types::Pt;
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};
use std::fs;
use std::path::Path;

pub const BOLD_FILE_NAME: &str = "RobotoMono-Bold.ttf";
pub const SEMIBOLD_FILE_NAME: &str = "RobotoMono-SemiBold.ttf";

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 126;

/// Glyph metrics normalized to the PDF convention of 1000 units per em.
#[derive(Debug, Clone)]
pub struct FontMetrics {
    widths: Vec<u16>,
    missing_width: u16,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    italic_angle: i16,
    bbox: (i16, i16, i16, i16),
    is_fixed_pitch: bool,
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;

        let mut widths = Vec::with_capacity((LAST_CHAR - FIRST_CHAR + 1) as usize);
        for code in FIRST_CHAR..=LAST_CHAR {
            let advance = char::from_u32(code as u32)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|gid| face.glyph_hor_advance(gid))
                .unwrap_or(0);
            widths.push(scale_u16(advance, scale));
        }
        let missing_width = widths
            .get((b' ' - FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(0);

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );

        Self {
            widths,
            missing_width,
            ascent,
            descent,
            cap_height,
            italic_angle,
            bbox,
            is_fixed_pitch: face.is_monospaced(),
        }
    }

    fn advance_units(&self, ch: char) -> u16 {
        let code = ch as u32;
        if code < FIRST_CHAR as u32 || code > LAST_CHAR as u32 {
            return self.missing_width;
        }
        let idx = (code - FIRST_CHAR as u32) as usize;
        self.widths.get(idx).copied().unwrap_or(self.missing_width)
    }
}

/// A TrueType font loaded once and shared read-only across pipeline runs.
#[derive(Debug, Clone)]
pub struct LoadedFont {
    postscript_name: String,
    data: Vec<u8>,
    metrics: FontMetrics,
}

impl LoadedFont {
    pub fn load(path: impl AsRef<Path>) -> Result<LoadedFont, CertPressError> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|_| CertPressError::FontResourceMissing(path.to_path_buf()))?;
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|_| CertPressError::FontResourceMissing(path.to_path_buf()))?;

        let postscript_name = postscript_name(&face).unwrap_or_else(|| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("EmbeddedFont")
                .to_string()
        });
        let metrics = FontMetrics::from_face(&face);

        Ok(Self {
            postscript_name: sanitize_pdf_name(&postscript_name),
            data,
            metrics,
        })
    }

    pub fn postscript_name(&self) -> &str {
        &self.postscript_name
    }

    /// Advance width of one character at the given size.
    pub fn char_advance(&self, size: Pt, ch: char) -> Pt {
        size.mul_ratio(self.metrics.advance_units(ch) as i32, 1000)
    }

    /// Advance-sum width of a string at the given size. Kerning is not
    /// applied; the catalog fonts are fixed-pitch.
    pub fn string_width(&self, size: Pt, text: &str) -> Pt {
        let mut units: i64 = 0;
        for ch in text.chars() {
            units += self.metrics.advance_units(ch) as i64;
        }
        let units = units.clamp(0, i32::MAX as i64) as i32;
        size.mul_ratio(units, 1000)
    }

    /// Embeds this font into `doc` as a simple /TrueType font with WinAnsi
    /// encoding and returns the font dictionary's object id.
    pub fn embed(&self, doc: &mut LoDocument) -> LoObjectId {
        let font_file_id = doc.add_object(LoStream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.clone(),
        ));

        let flags: i64 = 32 | i64::from(self.metrics.is_fixed_pitch);
        let (x_min, y_min, x_max, y_max) = self.metrics.bbox;
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => LoObject::Name(self.postscript_name.as_bytes().to_vec()),
            "Flags" => flags,
            "FontBBox" => vec![
                (x_min as i64).into(),
                (y_min as i64).into(),
                (x_max as i64).into(),
                (y_max as i64).into(),
            ],
            "ItalicAngle" => self.metrics.italic_angle as i64,
            "Ascent" => self.metrics.ascent as i64,
            "Descent" => self.metrics.descent as i64,
            "CapHeight" => self.metrics.cap_height as i64,
            "StemV" => 80,
            "FontFile2" => LoObject::Reference(font_file_id),
        });

        let widths: Vec<LoObject> = self
            .metrics
            .widths
            .iter()
            .map(|w| (*w as i64).into())
            .collect();
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => LoObject::Name(self.postscript_name.as_bytes().to_vec()),
            "FirstChar" => FIRST_CHAR as i64,
            "LastChar" => LAST_CHAR as i64,
            "Widths" => widths,
            "FontDescriptor" => LoObject::Reference(descriptor_id),
            "Encoding" => "WinAnsiEncoding",
        })
    }

    /// Uniform fixed-pitch metrics without a real font program, for tests
    /// that only assert document structure.
    #[cfg(test)]
    pub(crate) fn fixed_pitch_stub() -> LoadedFont {
        let count = (LAST_CHAR - FIRST_CHAR + 1) as usize;
        LoadedFont {
            postscript_name: "TestMono".to_string(),
            data: vec![0u8; 16],
            metrics: FontMetrics {
                widths: vec![600; count],
                missing_width: 600,
                ascent: 800,
                descent: -200,
                cap_height: 700,
                italic_angle: 0,
                bbox: (-100, -210, 700, 800),
                is_fixed_pitch: true,
            },
        }
    }
}

/// The two template weights, loaded once at startup and injected into the
/// overlay stages.
#[derive(Debug, Clone)]
pub struct FontCatalog {
    bold: LoadedFont,
    semibold: LoadedFont,
}

impl FontCatalog {
    pub fn load(dir: impl AsRef<Path>) -> Result<FontCatalog, CertPressError> {
        let dir = dir.as_ref();
        let bold = LoadedFont::load(dir.join(BOLD_FILE_NAME))?;
        let semibold = LoadedFont::load(dir.join(SEMIBOLD_FILE_NAME))?;
        Ok(Self { bold, semibold })
    }

    pub fn from_fonts(bold: LoadedFont, semibold: LoadedFont) -> FontCatalog {
        Self { bold, semibold }
    }

    pub fn bold(&self) -> &LoadedFont {
        &self.bold
    }

    pub fn semibold(&self) -> &LoadedFont {
        &self.semibold
    }
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|name| name.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
        .find_map(|name| name.to_string())
}

fn sanitize_pdf_name(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_ascii_graphic() && !matches!(ch, '/' | '(' | ')' | '<' | '>' | '[' | ']' | '{' | '}' | '%' | '#'))
        .collect()
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn scale_u16(value: u16, scale: f32) -> u16 {
    let scaled = (value as f32 * scale).round();
    scaled.clamp(0.0, u16::MAX as f32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_file_maps_to_font_resource_missing() {
        let dir = std::env::temp_dir().join(format!(
            "certpress_font_missing_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let err = FontCatalog::load(&dir).expect_err("must fail");
        assert!(matches!(err, CertPressError::FontResourceMissing(_)));
    }

    #[test]
    fn garbage_font_data_maps_to_font_resource_missing() {
        let dir = std::env::temp_dir().join(format!(
            "certpress_font_garbage_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join(BOLD_FILE_NAME), b"not a font").expect("write");
        std::fs::write(dir.join(SEMIBOLD_FILE_NAME), b"not a font").expect("write");
        let err = FontCatalog::load(&dir).expect_err("must fail");
        assert!(matches!(err, CertPressError::FontResourceMissing(_)));
    }

    #[test]
    fn stub_font_measures_fixed_advances() {
        let font = LoadedFont::fixed_pitch_stub();
        let size = Pt::from_i32(10);
        assert_eq!(font.char_advance(size, 'M').to_milli_i64(), 6_000);
        assert_eq!(font.string_width(size, "MMMM").to_milli_i64(), 24_000);
        // Characters outside the encoded range fall back to the missing width.
        assert_eq!(font.string_width(size, "\u{00e9}").to_milli_i64(), 6_000);
    }

    #[test]
    fn stub_font_embeds_as_simple_truetype() {
        let font = LoadedFont::fixed_pitch_stub();
        let mut doc = LoDocument::with_version("1.5");
        let font_id = font.embed(&mut doc);
        let dict = doc
            .get_object(font_id)
            .and_then(LoObject::as_dict)
            .expect("font dict");
        assert_eq!(dict.get(b"Subtype").and_then(LoObject::as_name).expect("subtype"), b"TrueType");
        let widths = dict.get(b"Widths").and_then(LoObject::as_array).expect("widths");
        assert_eq!(widths.len(), 95);
    }
}
