//! Client-side snapshot: rasterized view sliced onto A4 pages.
//!
//! The captured image is scaled to the full page width; its height is cut
//! into page-tall slices, one per page, top first.

use std::io::BufWriter;

use chrono::{DateTime, Local};
use image::RgbImage;
use printpdf::{
    ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, Mm, PdfDocument, PdfLayerReference,
    Px,
};

use super::{snapshot_filename, DownloadSink, ExportError, ExportKind, Exported};

pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;
const MM_PER_INCH: f32 = 25.4;

/// Something that can rasterize the currently rendered results view.
pub trait CaptureTarget {
    /// `None` when nothing is rendered.
    fn capture(&self) -> Option<RgbImage>;
}

/// Grab the view now. Empty captures count as missing.
pub fn capture(target: &dyn CaptureTarget) -> Result<RgbImage, ExportError> {
    target
        .capture()
        .filter(|img| img.width() > 0 && img.height() > 0)
        .ok_or(ExportError::CaptureTargetMissing)
}

/// Resolution that maps the image width onto the page width.
fn fit_dpi(width_px: u32) -> f32 {
    width_px as f32 * MM_PER_INCH / A4_WIDTH_MM
}

/// `(top_row, rows)` of each page slice.
pub fn page_slices(width_px: u32, height_px: u32) -> Vec<(u32, u32)> {
    if width_px == 0 || height_px == 0 {
        return Vec::new();
    }
    let page_rows = ((width_px as f32 * A4_HEIGHT_MM / A4_WIDTH_MM).floor() as u32).max(1);
    (0..height_px)
        .step_by(page_rows as usize)
        .map(|top| (top, page_rows.min(height_px - top)))
        .collect()
}

/// Build a paginated PDF from a captured image.
pub fn render_snapshot_pdf(title: &str, image: &RgbImage) -> Result<Vec<u8>, ExportError> {
    let (width, height) = image.dimensions();
    let slices = page_slices(width, height);
    if slices.is_empty() {
        return Err(ExportError::CaptureTargetMissing);
    }
    let dpi = fit_dpi(width);

    let (doc, page1, layer1) =
        PdfDocument::new(title, Mm(A4_WIDTH_MM), Mm(A4_HEIGHT_MM), "Layer 1");
    let mut layer = doc.get_page(page1).get_layer(layer1);
    for (index, &(top, rows)) in slices.iter().enumerate() {
        if index > 0 {
            let (page, page_layer) = doc.add_page(Mm(A4_WIDTH_MM), Mm(A4_HEIGHT_MM), "Layer 1");
            layer = doc.get_page(page).get_layer(page_layer);
        }
        let slice = image::imageops::crop_imm(image, 0, top, width, rows).to_image();
        place_slice(&layer, slice, dpi);
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ExportError::Render(format!("PDF save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ExportError::Render(format!("PDF buffer error: {e}")))
}

fn place_slice(layer: &PdfLayerReference, slice: RgbImage, dpi: f32) {
    let (width, rows) = slice.dimensions();
    let slice_height_mm = rows as f32 * MM_PER_INCH / dpi;
    let xobject = ImageXObject {
        width: Px(width as usize),
        height: Px(rows as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: slice.into_raw(),
        image_filter: None,
        smask: None,
        clipping_bbox: None,
    };
    // PDF origin is bottom-left; pin the slice to the top of the page.
    Image::from(xobject).add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(0.0)),
            translate_y: Some(Mm(A4_HEIGHT_MM - slice_height_mm)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
}

/// Render a captured image and hand it to the sink.
pub fn export_snapshot(
    image: &RgbImage,
    sink: &dyn DownloadSink,
    at: DateTime<Local>,
) -> Result<Exported, ExportError> {
    let filename = snapshot_filename(at);
    let bytes = render_snapshot_pdf("Clinical Snapshot", image)?;
    let location = sink.deliver(&filename, &bytes)?;
    Ok(Exported {
        kind: ExportKind::Snapshot,
        filename,
        location,
    })
}
