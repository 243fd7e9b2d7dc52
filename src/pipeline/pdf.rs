//! PDF packaging: one raster stretched over one full A4 page.
//!
//! The image is resized to the page's pixel size at the configured DPI
//! (aspect ratio is not preserved) and embedded as a Flate-compressed RGB
//! image XObject, drawn with a single `cm`/`Do` pair covering the MediaBox.

use crate::error::ColoringError;
use image::imageops::FilterType;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

/// A4 width in inches.
pub const PAGE_WIDTH_IN: f64 = 8.27;
/// A4 height in inches.
pub const PAGE_HEIGHT_IN: f64 = 11.69;
/// A4 width in PDF points (210 mm).
pub const PAGE_WIDTH_PT: f32 = 595.275_6;
/// A4 height in PDF points (297 mm).
pub const PAGE_HEIGHT_PT: f32 = 841.889_8;

/// Resource name of the page image inside the page's XObject dictionary.
const IMAGE_NAME: &[u8] = b"Im1";

/// Builds single-page A4 PDFs from rasters.
#[derive(Debug, Clone, Copy)]
pub struct PdfPackager {
    dpi: u32,
}

impl Default for PdfPackager {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PdfPackager {
    pub fn new(dpi: u32) -> Self {
        Self { dpi: dpi.max(1) }
    }

    /// Pixel size of the embedded page image, truncated like `int(8.27 * dpi)`.
    pub fn page_pixels(&self) -> (u32, u32) {
        let dpi = self.dpi as f64;
        ((PAGE_WIDTH_IN * dpi) as u32, (PAGE_HEIGHT_IN * dpi) as u32)
    }

    /// Package `image` as a one-page PDF. Returns `filename` unchanged
    /// alongside the document bytes; nothing is written to disk.
    pub fn build_pdf(
        &self,
        image: &DynamicImage,
        filename: &str,
    ) -> Result<(String, Vec<u8>), ColoringError> {
        let (pw, ph) = self.page_pixels();
        let rgb = if image.width() == pw && image.height() == ph {
            image.to_rgb8()
        } else {
            image.resize_exact(pw, ph, FilterType::CatmullRom).into_rgb8()
        };

        let bytes = write_single_image_pdf(pw, ph, rgb.into_raw())
            .map_err(|detail| ColoringError::PackagingFailed { detail })?;

        debug!(
            "PDF: {} → {}x{} px image, {} bytes",
            filename,
            pw,
            ph,
            bytes.len()
        );
        Ok((filename.to_string(), bytes))
    }
}

fn write_single_image_pdf(width: u32, height: u32, rgb: Vec<u8>) -> Result<Vec<u8>, String> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
        },
        rgb,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(PAGE_WIDTH_PT),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(PAGE_HEIGHT_PT),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content.encode().map_err(|e| e.to_string())?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(PAGE_WIDTH_PT),
            Object::Real(PAGE_HEIGHT_PT),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im1" => image_id,
            },
        },
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![Object::Reference(page_id)],
        "Count" => 1_i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(|e| e.to_string())?;
    Ok(buf)
}
