//! Technical fiche of a bus as a one-page A4 PDF.
//!
//! Layout, top to bottom: title, usage tag, description, picture in a grey
//! frame, separator, two-column grid of the technical attributes that are
//! present, and a call-to-action band in the footer. Text uses the standard
//! Helvetica fonts with WinAnsi encoding, so no font files are embedded.

use lopdf::{Dictionary, Document, Object, Stream, StringFormat, dictionary};

use crate::catalog::Bus;
use crate::error::Result;

/// Content type of fiche downloads.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

// A4 in points.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 57.0;

const PICTURE_BOX: (f32, f32) = (397.0, 283.0);
const PICTURE_MAX_PX: u32 = 1000;
const DESCRIPTION_MAX_LINES: usize = 8;

const BLACK: Rgb = (0, 0, 0);
const ACCENT: Rgb = (59, 130, 246);
const MUTED: Rgb = (80, 80, 80);
const LABEL: Rgb = (60, 60, 60);
const FRAME: Rgb = (120, 120, 120);
const RULE: Rgb = (200, 200, 200);
const BAND: Rgb = (239, 246, 255);
const BAND_TEXT: Rgb = (30, 64, 175);

type Rgb = (u8, u8, u8);

/// Base name of a bus's technical fiche, e.g. `Ficha-Yutong-ZK6129H`.
pub fn fiche_name(bus: &Bus) -> String {
    format!("Ficha-{}-{}", bus.marca, bus.modelo)
}

/// File name offered for the PDF download.
pub fn fiche_file_name(bus: &Bus) -> String {
    format!("{}.pdf", fiche_name(bus))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    // Average Helvetica advance per em; good enough for centring and wrapping.
    fn advance(self) -> f32 {
        match self {
            Font::Regular => 0.52,
            Font::Bold => 0.56,
        }
    }
}

fn text_width(text: &str, font: Font, size: f32) -> f32 {
    text.chars().count() as f32 * size * font.advance()
}

/// Greedy word wrap to `width` points.
fn wrap(text: &str, font: Font, size: f32, width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", line, word)
        };
        if text_width(&candidate, font, size) > width && !line.is_empty() {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        } else {
            line = candidate;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Encode text for a WinAnsi font. Characters outside Latin-1 become `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Content stream under construction. Positions are measured from the top
/// of the page and flipped on output.
#[derive(Default)]
struct Canvas {
    ops: Vec<u8>,
}

impl Canvas {
    fn op(&mut self, line: &str) {
        self.ops.extend_from_slice(line.as_bytes());
        self.ops.push(b'\n');
    }

    fn fill(&mut self, (r, g, b): Rgb) {
        self.op(&format!(
            "{:.3} {:.3} {:.3} rg",
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0
        ));
    }

    fn stroke(&mut self, (r, g, b): Rgb) {
        self.op(&format!(
            "{:.3} {:.3} {:.3} RG",
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0
        ));
    }

    fn text(&mut self, font: Font, size: f32, color: Rgb, x: f32, top: f32, text: &str) {
        self.fill(color);
        self.op(&format!(
            "BT /{} {:.1} Tf {:.2} {:.2} Td",
            font.resource(),
            size,
            x,
            PAGE_HEIGHT - top
        ));
        self.ops.push(b'(');
        for byte in win_ansi(text) {
            if matches!(byte, b'(' | b')' | b'\\') {
                self.ops.push(b'\\');
            }
            self.ops.push(byte);
        }
        self.op(") Tj ET");
    }

    fn centered(&mut self, font: Font, size: f32, color: Rgb, top: f32, text: &str) {
        let x = ((PAGE_WIDTH - text_width(text, font, size)) / 2.0).max(MARGIN / 2.0);
        self.text(font, size, color, x, top, text);
    }

    fn rule(&mut self, color: Rgb, top: f32) {
        self.stroke(color);
        let y = PAGE_HEIGHT - top;
        self.op(&format!(
            "0.8 w {:.2} {:.2} m {:.2} {:.2} l S",
            MARGIN,
            y,
            PAGE_WIDTH - MARGIN,
            y
        ));
    }

    fn frame(&mut self, color: Rgb, x: f32, top: f32, width: f32, height: f32) {
        self.stroke(color);
        self.op(&format!(
            "1 w {:.2} {:.2} {:.2} {:.2} re S",
            x,
            PAGE_HEIGHT - top - height,
            width,
            height
        ));
    }

    fn band(&mut self, color: Rgb, x: f32, top: f32, width: f32, height: f32) {
        self.fill(color);
        self.op(&format!(
            "{:.2} {:.2} {:.2} {:.2} re f",
            x,
            PAGE_HEIGHT - top - height,
            width,
            height
        ));
    }

    fn picture(&mut self, name: &str, x: f32, top: f32, width: f32, height: f32) {
        self.op(&format!(
            "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /{} Do Q",
            width,
            height,
            x,
            PAGE_HEIGHT - top - height,
            name
        ));
    }
}

/// Decoded picture flattened onto white, ready for an RGB image XObject.
struct Picture {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl Picture {
    fn decode(bytes: &[u8]) -> Option<Self> {
        let decoded = match image::load_from_memory(bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("fiche picture skipped: {}", e);
                return None;
            }
        };
        let mut rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        if width > PICTURE_MAX_PX || height > PICTURE_MAX_PX {
            let scale = PICTURE_MAX_PX as f32 / width.max(height) as f32;
            let scaled = |side: u32| ((side as f32 * scale).round() as u32).max(1);
            rgba = image::imageops::thumbnail(&rgba, scaled(width), scaled(height));
        }

        let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
        for pixel in rgba.pixels() {
            let alpha = pixel[3] as u16;
            for channel in &pixel.0[..3] {
                rgb.push(((*channel as u16 * alpha + 255 * (255 - alpha)) / 255) as u8);
            }
        }
        Some(Self {
            width: rgba.width(),
            height: rgba.height(),
            rgb,
        })
    }

    /// Size on the page, scaled to fit the picture box.
    fn fitted(&self) -> (f32, f32) {
        let (max_w, max_h) = PICTURE_BOX;
        let mut width = max_w;
        let mut height = self.height as f32 * max_w / self.width as f32;
        if height > max_h {
            height = max_h;
            width = self.width as f32 * max_h / self.height as f32;
        }
        (width, height)
    }
}

fn draw(canvas: &mut Canvas, bus: &Bus, picture: Option<&Picture>) {
    let content_width = PAGE_WIDTH - 2.0 * MARGIN;
    let mut top = MARGIN + 20.0;

    canvas.centered(Font::Bold, 26.0, BLACK, top, &bus.title());
    top += 34.0;

    if let Some(uso) = &bus.uso {
        canvas.centered(Font::Regular, 14.0, ACCENT, top, uso);
        top += 34.0;
    }

    if let Some(descripcion) = &bus.descripcion {
        let lines = wrap(descripcion, Font::Regular, 10.0, content_width);
        for line in lines.iter().take(DESCRIPTION_MAX_LINES) {
            canvas.centered(Font::Regular, 10.0, MUTED, top, line);
            top += 14.0;
        }
        top += 28.0;
    }

    if let Some(picture) = picture {
        let (width, height) = picture.fitted();
        let x = (PAGE_WIDTH - width) / 2.0;
        canvas.frame(FRAME, x - 6.0, top - 6.0, width + 12.0, height + 12.0);
        canvas.picture("Im1", x, top, width, height);
        top += height + 40.0;
    }

    canvas.rule(RULE, top);
    top += 40.0;

    canvas.text(
        Font::Bold,
        16.0,
        BLACK,
        MARGIN,
        top,
        "Especificaciones Técnicas",
    );
    top += 28.0;

    let column = content_width / 2.0;
    for pair in bus.specs().chunks(2) {
        for (i, spec) in pair.iter().enumerate() {
            let x = MARGIN + i as f32 * column;
            canvas.text(Font::Bold, 11.0, LABEL, x, top, &format!("{}:", spec.label));
            let value = wrap(&spec.value, Font::Regular, 11.0, column - 28.0);
            for (n, line) in value.iter().take(2).enumerate() {
                canvas.text(Font::Regular, 11.0, BLACK, x, top + 14.0 + n as f32 * 13.0, line);
            }
        }
        top += 45.0;
    }

    let band_top = PAGE_HEIGHT - 100.0;
    canvas.band(BAND, 42.0, band_top, PAGE_WIDTH - 84.0, 80.0);
    canvas.centered(
        Font::Bold,
        11.0,
        BAND_TEXT,
        band_top + 32.0,
        "Visita nuestra plataforma para más información",
    );
    canvas.centered(
        Font::Regular,
        9.0,
        LABEL,
        band_top + 54.0,
        "Catálogo completo de vehículos y repuestos disponibles",
    );
}

fn helvetica(doc: &mut Document, base_font: &str) -> Object {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    })
    .into()
}

/// Render the fiche of `bus` as PDF bytes
///
/// # Arguments
/// * `bus` - The bus to describe
/// * `picture` - Raw bytes of its picture, if one could be downloaded. A
///   picture that cannot be decoded is logged and left out.
///
/// # Returns
/// * `Result<Vec<u8>>` - A single-page A4 PDF document
pub fn fiche_pdf(bus: &Bus, picture: Option<&[u8]>) -> Result<Vec<u8>> {
    let picture = picture.and_then(Picture::decode);

    let mut canvas = Canvas::default();
    draw(&mut canvas, bus, picture.as_ref());

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut fonts = Dictionary::new();
    fonts.set("F1", helvetica(&mut doc, "Helvetica"));
    fonts.set("F2", helvetica(&mut doc, "Helvetica-Bold"));
    let mut resources = dictionary! { "Font" => fonts };

    if let Some(picture) = picture {
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => picture.width as i64,
                "Height" => picture.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            picture.rgb,
        ));
        resources.set("XObject", dictionary! { "Im1" => image_id });
    }

    let resources_id = doc.add_object(resources);
    let content_id = doc.add_object(Stream::new(Dictionary::new(), canvas.ops));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), (PAGE_WIDTH as i64).into(), (PAGE_HEIGHT as i64).into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(win_ansi(&fiche_name(bus)), StringFormat::Literal),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn yutong() -> Bus {
        serde_json::from_value(json!({
            "id": 42,
            "marca": "Yutong",
            "modelo": "ZK6129H",
            "uso": "Turismo",
            "descripcion": "Autobús de turismo (49 plazas) con bodegas amplias y aire acondicionado.",
            "asientos": 49,
            "motor": "Cummins ISL 340",
            "transmision": "ZF manual",
        }))
        .unwrap()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let picture = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 80, 160, 128]));
        let mut out = Cursor::new(Vec::new());
        picture
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn image_objects(doc: &Document) -> Vec<(i64, i64)> {
        doc.objects
            .values()
            .filter_map(|object| match object {
                Object::Stream(stream)
                    if stream.dict.get(b"Subtype").and_then(Object::as_name).ok()
                        == Some(b"Image".as_slice()) =>
                {
                    let width = stream.dict.get(b"Width").and_then(Object::as_i64).ok()?;
                    let height = stream.dict.get(b"Height").and_then(Object::as_i64).ok()?;
                    Some((width, height))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn file_name_uses_brand_and_model() {
        assert_eq!(fiche_name(&yutong()), "Ficha-Yutong-ZK6129H");
        assert_eq!(fiche_file_name(&yutong()), "Ficha-Yutong-ZK6129H.pdf");
    }

    #[test]
    fn fiche_is_a_single_page_pdf() {
        let bytes = fiche_pdf(&yutong(), None).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(image_objects(&doc).is_empty());
    }

    #[test]
    fn picture_is_embedded_when_decodable() {
        let bytes = fiche_pdf(&yutong(), Some(&png(64, 32))).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(image_objects(&doc), vec![(64, 32)]);

        let bytes = fiche_pdf(&yutong(), Some(b"not a picture")).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(image_objects(&doc).is_empty());
    }

    #[test]
    fn large_pictures_are_downscaled() {
        let bytes = fiche_pdf(&yutong(), Some(&png(2000, 500))).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(image_objects(&doc), vec![(1000, 250)]);
    }

    #[test]
    fn text_is_escaped_and_latin1_encoded() {
        let mut canvas = Canvas::default();
        canvas.text(Font::Regular, 10.0, BLACK, 0.0, 0.0, "Dirección (A\\B) →");
        let ops = canvas.ops;
        let expected: &[u8] = b"(Direcci\xf3n \\(A\\\\B\\) ?) Tj ET";
        assert!(ops.windows(expected.len()).any(|w| w == expected));
    }

    #[test]
    fn wrap_breaks_on_words() {
        let lines = wrap("uno dos tres cuatro", Font::Regular, 10.0, 50.0);
        assert_eq!(lines, vec!["uno dos", "tres", "cuatro"]);
    }
}
