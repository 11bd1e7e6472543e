//! JPEG encoding and multipart/x-mixed-replace framing.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::{PipelineError, PipelineResult};

pub const BOUNDARY: &str = "frame";
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> PipelineResult<Vec<u8>> {
    let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|e| PipelineError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(buffer)
}

/// One multipart part: boundary line, part headers, JPEG body, CRLF.
pub fn multipart_chunk(jpeg: &[u8], sequence: u64) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 96);
    part.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    part.extend_from_slice(format!("X-Sequence: {sequence}\r\n").as_bytes());
    part.extend_from_slice(b"Content-Type: image/jpeg\r\n");
    part.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn encodes_decodable_jpeg() -> PipelineResult<()> {
        let image = RgbImage::from_pixel(32, 16, Rgb([10, 200, 30]));
        let jpeg = encode_jpeg(&image, 80)?;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = crate::frame::Frame::decode(&jpeg)?;
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        Ok(())
    }

    #[test]
    fn chunk_framing() {
        let chunk = multipart_chunk(b"JPEG", 7);
        let text = String::from_utf8_lossy(&chunk);
        assert!(text.starts_with("--frame\r\n"));
        assert!(text.contains("Content-Type: image/jpeg\r\n"));
        assert!(text.contains("X-Sequence: 7\r\n"));
        assert!(text.ends_with("\r\n\r\nJPEG\r\n"));
    }
}
