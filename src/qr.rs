//! QR artifact generation.
//!
//! A [`QrArtifact`] is one logical code with two materializations: the
//! [`RenderedSurface`] backing the live preview and the standalone
//! [`EncodedImage`] used for download, print and the confirmation preview.
//! Both are rasterized from the same module matrix with the same
//! [`QrOptions`], so they always agree pixel for pixel.

use base64::Engine as _;
use base64::engine::general_purpose;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, Rgb, RgbImage};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::{FleetError, Result};

/// Visual parameters shared by both materializations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QrOptions {
    /// Output edge length in pixels.
    pub width: u32,
    /// Quiet zone, in modules.
    pub margin: u32,
    pub ec_level: EcLevel,
    pub dark: Rgb<u8>,
    pub light: Rgb<u8>,
}

impl Default for QrOptions {
    /// 300×300 px, 2-module margin, level H, black on white.
    fn default() -> Self {
        Self {
            width: 300,
            margin: 2,
            ec_level: EcLevel::H,
            dark: Rgb([0, 0, 0]),
            light: Rgb([255, 255, 255]),
        }
    }
}

/// Encoded modules of a QR symbol, row-major, `true` for dark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMatrix {
    size: usize,
    dark: Vec<bool>,
}

impl ModuleMatrix {
    pub fn encode(data: &str, ec_level: EcLevel) -> Result<Self> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), ec_level)
            .map_err(|e| FleetError::Encoding(format!("{:?}", e)))?;

        Ok(Self {
            size: code.width(),
            dark: code
                .to_colors()
                .into_iter()
                .map(|c| c == Color::Dark)
                .collect(),
        })
    }

    /// Modules per side, without the quiet zone.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.size + x]
    }
}

/// Draw `matrix` into a square raster.
///
/// The scale is fractional so the output is exactly `options.width` pixels
/// wide whenever that leaves at least one pixel per module; otherwise each
/// module takes one pixel.
pub fn rasterize(matrix: &ModuleMatrix, options: &QrOptions) -> RgbImage {
    let total = matrix.size() + 2 * options.margin as usize;
    let (edge, scale) = if options.width as usize >= total {
        (options.width, options.width as f64 / total as f64)
    } else {
        (total as u32, 1.0)
    };
    let scaled_margin = options.margin as f64 * scale;
    let inner_end = edge as f64 - scaled_margin;

    RgbImage::from_fn(edge, edge, |px, py| {
        let (x, y) = (px as f64, py as f64);
        if x < scaled_margin || y < scaled_margin || x >= inner_end || y >= inner_end {
            return options.light;
        }
        let mx = ((x - scaled_margin) / scale).floor() as usize;
        let my = ((y - scaled_margin) / scale).floor() as usize;
        if mx < matrix.size() && my < matrix.size() && matrix.is_dark(mx, my) {
            options.dark
        } else {
            options.light
        }
    })
}

fn encode_png(raster: &RgbImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(
        raster.as_raw(),
        raster.width(),
        raster.height(),
        image::ColorType::Rgb8,
    )?;
    Ok(png)
}

/// In-memory raster bound to the on-screen preview.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSurface {
    raster: RgbImage,
}

impl RenderedSurface {
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn raster(&self) -> &RgbImage {
        &self.raster
    }

    /// Snapshot of the surface as PNG, for serving the preview.
    pub fn snapshot_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.raster)
    }
}

/// Self-contained PNG of the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    png: Vec<u8>,
    width: u32,
    height: u32,
}

impl EncodedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `data:image/png;base64,...`, embeddable in `<img src>`.
    pub fn data_uri(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&self.png)
        )
    }
}

/// A generated QR code for one target URL.
#[derive(Debug, Clone, PartialEq)]
pub struct QrArtifact {
    target_url: String,
    options: QrOptions,
    surface: RenderedSurface,
    encoded: EncodedImage,
}

impl QrArtifact {
    /// Encode `target_url` once and produce both materializations from it.
    pub fn generate(target_url: &str, options: &QrOptions) -> Result<Self> {
        let matrix = ModuleMatrix::encode(target_url, options.ec_level)?;

        let surface = RenderedSurface {
            raster: rasterize(&matrix, options),
        };

        let standalone = rasterize(&matrix, options);
        let encoded = EncodedImage {
            png: encode_png(&standalone)?,
            width: standalone.width(),
            height: standalone.height(),
        };

        Ok(Self {
            target_url: target_url.to_string(),
            options: *options,
            surface,
            encoded,
        })
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn options(&self) -> &QrOptions {
        &self.options
    }

    pub fn surface(&self) -> &RenderedSurface {
        &self.surface
    }

    pub fn encoded(&self) -> &EncodedImage {
        &self.encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://fleet.example/autobus/42";

    #[test]
    fn default_options_produce_300px_images() {
        let artifact = QrArtifact::generate(URL, &QrOptions::default()).unwrap();
        assert_eq!(artifact.surface().width(), 300);
        assert_eq!(artifact.surface().height(), 300);
        assert_eq!(artifact.encoded().width(), 300);
        assert_eq!(artifact.encoded().height(), 300);
        assert_eq!(artifact.target_url(), URL);
    }

    #[test]
    fn both_materializations_hold_the_same_pixels() {
        let artifact = QrArtifact::generate(URL, &QrOptions::default()).unwrap();
        let decoded = image::load_from_memory(artifact.encoded().bytes())
            .unwrap()
            .to_rgb8();
        assert_eq!(&decoded, artifact.surface().raster());
    }

    #[test]
    fn margin_is_light_and_finder_corner_is_dark() {
        let options = QrOptions::default();
        let matrix = ModuleMatrix::encode(URL, options.ec_level).unwrap();
        let raster = rasterize(&matrix, &options);

        let scale = 300.0 / (matrix.size() + 4) as f64;
        let quiet = (2.0 * scale).floor() as u32;
        assert_eq!(*raster.get_pixel(0, 0), options.light);
        assert_eq!(*raster.get_pixel(quiet - 1, quiet - 1), options.light);
        // Top-left finder pattern starts right after the quiet zone.
        let first = (2.0 * scale).ceil() as u32;
        assert_eq!(*raster.get_pixel(first, first), options.dark);
    }

    #[test]
    fn tiny_width_falls_back_to_one_pixel_per_module() {
        let options = QrOptions {
            width: 10,
            ..QrOptions::default()
        };
        let matrix = ModuleMatrix::encode(URL, options.ec_level).unwrap();
        let raster = rasterize(&matrix, &options);
        assert_eq!(raster.width() as usize, matrix.size() + 4);
    }

    #[test]
    fn data_uri_is_png_base64() {
        let artifact = QrArtifact::generate(URL, &QrOptions::default()).unwrap();
        let uri = artifact.encoded().data_uri();
        assert!(uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn oversized_payload_is_an_encoding_error() {
        let huge = "x".repeat(5000);
        let err = QrArtifact::generate(&huge, &QrOptions::default()).unwrap_err();
        assert!(matches!(err, FleetError::Encoding(_)));
    }
}
