use crate::error::CertPressError;
use image::{ImageBuffer, Rgb};
use lopdf::{Stream as LoStream, dictionary};

/// Side of the high-resolution raster canvas, in pixels.
pub const QR_CANVAS_SIZE: u32 = 960;

const QR_FOREGROUND: [u8; 3] = [0x1e, 0xbb, 0x58];
const QR_BACKGROUND: [u8; 3] = [0x18, 0x18, 0x1b];

/// A rasterized QR code: dark modules drawn as filled squares on a square RGB
/// canvas, with no quiet zone around the matrix.
#[derive(Debug, Clone)]
pub struct QrBitmap {
    canvas_size: u32,
    modules: usize,
    pixels: Vec<u8>,
}

impl QrBitmap {
    /// Encodes `url` at the minimal QR version that fits the data (default
    /// error-correction level) and rasterizes the module matrix.
    pub fn for_url(url: &str) -> Result<QrBitmap, CertPressError> {
        let code = qrcode::QrCode::new(url.as_bytes())
            .map_err(|err| CertPressError::Qr(err.to_string()))?;
        let modules = code.width();
        let colors = code.to_colors();
        Ok(Self::rasterize(&colors, modules, QR_CANVAS_SIZE))
    }

    fn rasterize(colors: &[qrcode::Color], modules: usize, canvas_size: u32) -> QrBitmap {
        let module_size = canvas_size as f32 / modules as f32;
        let image = ImageBuffer::from_fn(canvas_size, canvas_size, |x, y| {
            let mx = ((x as f32 / module_size) as usize).min(modules - 1);
            let my = ((y as f32 / module_size) as usize).min(modules - 1);
            if colors[my * modules + mx] == qrcode::Color::Dark {
                Rgb(QR_FOREGROUND)
            } else {
                Rgb(QR_BACKGROUND)
            }
        });
        QrBitmap {
            canvas_size,
            modules,
            pixels: image.into_raw(),
        }
    }

    pub fn canvas_size(&self) -> u32 {
        self.canvas_size
    }

    pub fn modules(&self) -> usize {
        self.modules
    }

    /// PDF image XObject carrying the raw RGB samples. Flate compression is
    /// applied by document-level compression at save time.
    pub(crate) fn image_xobject(&self) -> LoStream {
        LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => self.canvas_size as i64,
                "Height" => self.canvas_size as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            self.pixels.clone(),
        )
    }

    #[cfg(test)]
    fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * self.canvas_size + x) * 3) as usize;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }
}
