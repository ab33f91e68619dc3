//! Screenshot loading, encoding and local pixel comparison.

use std::path::Path;

use base64::Engine;
use image::ImageFormat;
use image::imageops::FilterType;

use super::error::{JudgeError, JudgeResult};

/// Evaluator APIs reject larger payloads.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// A screenshot ready to embed in an evaluator request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub media_type: &'static str,
    pub base64: String,
}

impl EncodedImage {
    /// `data:` URL form used by OpenAI-compatible APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64)
    }
}

/// Read and base64-encode a screenshot, sniffing its media type.
pub async fn encode_image(path: &Path) -> JudgeResult<EncodedImage> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| JudgeError::image(path, e))?;
    encode_bytes(path, &bytes)
}

fn encode_bytes(path: &Path, bytes: &[u8]) -> JudgeResult<EncodedImage> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(JudgeError::image(
            path,
            format!("image is too large ({} bytes, max {})", bytes.len(), MAX_IMAGE_BYTES),
        ));
    }

    let format = image::guess_format(bytes).map_err(|e| JudgeError::image(path, e))?;
    let media_type = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        other => {
            return Err(JudgeError::image(
                path,
                format!("unsupported image format {:?}", other),
            ));
        }
    };

    Ok(EncodedImage {
        media_type,
        base64: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

/// Pixel similarity in [0, 1]: `1 - MSE` over RGBA channels scaled to [0, 1].
///
/// The second image is resized to the first one's dimensions.
pub fn pixel_similarity(a: &Path, b: &Path) -> JudgeResult<f64> {
    let first = image::open(a).map_err(|e| JudgeError::image(a, e))?.to_rgba8();
    let mut second = image::open(b).map_err(|e| JudgeError::image(b, e))?.to_rgba8();

    if first.dimensions() != second.dimensions() {
        second = image::imageops::resize(&second, first.width(), first.height(), FilterType::Triangle);
    }

    let len = first.as_raw().len();
    if len == 0 {
        return Ok(1.0);
    }

    let sum: f64 = first
        .as_raw()
        .iter()
        .zip(second.as_raw())
        .map(|(x, y)| {
            let d = (f64::from(*x) - f64::from(*y)) / 255.0;
            d * d
        })
        .sum();

    Ok((1.0 - sum / len as f64).clamp(0.0, 1.0))
}
