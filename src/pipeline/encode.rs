//! Image encoding: rendered page → base64 PNG `ImageData`.
//!
//! PNG keeps dot leaders and small page numbers crisp; JPEG artefacts around
//! digits are exactly what makes a model misread "18" as "16". Images go out
//! with `detail: "high"` so fine print survives provider-side downscaling.

use crate::error::PageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page for the vision request.
///
/// Alpha is dropped first: transparent page backgrounds turn black in some
/// model pipelines.
pub fn encode_page(page_num: usize, img: &DynamicImage) -> Result<ImageData, PageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PageError::EncodeFailed {
            page: page_num,
            detail: e.to_string(),
        })?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Page {}: {}x{} px → {} bytes base64",
        page_num,
        img.width(),
        img.height(),
        b64.len()
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// `data:` URL form used by OpenAI-compatible `image_url` parts.
pub fn data_url(image: &ImageData) -> String {
    format!("data:{};base64,{}", image.mime_type, image.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encodes_png_without_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(12, 8, Rgba([0, 0, 255, 0])));
        let data = encode_page(1, &img).unwrap();
        assert_eq!(data.mime_type, "image/png");

        let png = STANDARD.decode(&data.data).unwrap();
        assert!(png.starts_with(b"\x89PNG"));
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (12, 8));
        assert!(!back.color().has_alpha());
    }

    #[test]
    fn data_url_prefixes_mime() {
        let data = ImageData::new("QUJD", "image/png");
        assert_eq!(data_url(&data), "data:image/png;base64,QUJD");
    }
}
