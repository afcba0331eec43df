//! Preview image normalization: decode, downscale, re-encode.

use std::fmt;
use std::io::Cursor;

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{AnimationDecoder as _, DynamicImage, Frame, ImageDecoder as _, RgbImage};
use snafu::{ResultExt as _, Snafu};

/// Longest side allowed for a posted image, in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// Bluesky's blob size limit for images.
pub const MAX_IMAGE_BYTES: usize = 1_000_000;

const JPEG_QUALITY_STEPS: &[u8] = &[85, 70, 55, 40];

#[derive(Debug, Snafu)]
pub enum MediaError {
    #[snafu(display("Failed to decode image"))]
    Decode { source: image::ImageError },
    #[snafu(display("Failed to encode image"))]
    Encode { source: image::ImageError },
    #[snafu(display("Image is too large to upload ({size} bytes)"))]
    TooLarge { size: usize },
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;

#[derive(Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Turn fetched image bytes into something postable.
///
/// Animated GIFs stay GIFs so the animation survives: kept byte-for-byte when
/// small enough, otherwise every frame is downscaled and re-encoded.
/// Everything else, single-frame GIFs included, is downscaled to fit
/// [`MAX_IMAGE_DIMENSION`] and re-encoded as JPEG, lowering quality until it
/// fits [`MAX_IMAGE_BYTES`].
pub fn normalize_image(bytes: &[u8], content_type: &str) -> MediaResult<PreviewImage> {
    if content_type.contains("gif") {
        if let Some(animated) = normalize_animated_gif(bytes)? {
            return Ok(animated);
        }
    }

    let decoded = image::load_from_memory(bytes).context(DecodeSnafu)?;
    let rgb = fit_within(decoded, MAX_IMAGE_DIMENSION).to_rgb8();

    let mut size = 0;
    for &quality in JPEG_QUALITY_STEPS {
        let encoded = encode_jpeg(&rgb, quality)?;
        if encoded.len() <= MAX_IMAGE_BYTES {
            return Ok(PreviewImage {
                bytes: encoded,
                mime_type: "image/jpeg".to_owned(),
            });
        }
        size = encoded.len();
    }

    TooLargeSnafu { size }.fail()
}

/// `None` for a GIF with a single frame, which is handled as a still image.
fn normalize_animated_gif(bytes: &[u8]) -> MediaResult<Option<PreviewImage>> {
    let decoder = GifDecoder::new(Cursor::new(bytes)).context(DecodeSnafu)?;
    let (width, height) = decoder.dimensions();
    let frames = decoder
        .into_frames()
        .collect_frames()
        .context(DecodeSnafu)?;
    if frames.len() < 2 {
        return Ok(None);
    }

    let bytes = if width <= MAX_IMAGE_DIMENSION && height <= MAX_IMAGE_DIMENSION {
        bytes.to_vec()
    } else {
        encode_downscaled_gif(frames)?
    };
    if MAX_IMAGE_BYTES < bytes.len() {
        return TooLargeSnafu { size: bytes.len() }.fail();
    }

    Ok(Some(PreviewImage {
        bytes,
        mime_type: "image/gif".to_owned(),
    }))
}

/// Frames from [`GifDecoder`] are already composited onto the full canvas.
fn encode_downscaled_gif(frames: Vec<Frame>) -> MediaResult<Vec<u8>> {
    let frames = frames.into_iter().map(|frame| {
        let delay = frame.delay();
        let resized = fit_within(
            DynamicImage::ImageRgba8(frame.into_buffer()),
            MAX_IMAGE_DIMENSION,
        )
        .into_rgba8();
        Frame::from_parts(resized, 0, 0, delay)
    });

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder.set_repeat(Repeat::Infinite).context(EncodeSnafu)?;
        encoder.encode_frames(frames).context(EncodeSnafu)?;
    }
    Ok(out)
}

/// Downscale so neither side exceeds `max`, keeping the aspect ratio.
pub fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        return img;
    }
    img.resize(max, max, FilterType::Triangle)
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> MediaResult<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(rgb)
        .context(EncodeSnafu)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use image::{Delay, ImageFormat, Rgba, RgbaImage};

    use super::*;

    pub(crate) fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        let img = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    /// A two-frame looping GIF.
    pub(crate) fn animated_gif(width: u32, height: u32) -> Vec<u8> {
        let frames = [Rgba([200, 30, 30, 255]), Rgba([30, 30, 200, 255])].map(|color| {
            Frame::from_parts(
                RgbaImage::from_pixel(width, height, color),
                0,
                0,
                Delay::from_numer_denom_ms(100, 1),
            )
        });
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            encoder.encode_frames(frames).unwrap();
        }
        out
    }

    fn gif_frames(bytes: &[u8]) -> Vec<Frame> {
        GifDecoder::new(Cursor::new(bytes))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap()
    }

    fn dimensions(image: &PreviewImage) -> (u32, u32) {
        let decoded = image::load_from_memory(&image.bytes).unwrap();
        (decoded.width(), decoded.height())
    }

    #[test]
    fn small_png_becomes_jpeg_of_same_size() {
        let out = normalize_image(&encoded(320, 200, ImageFormat::Png), "image/png").unwrap();
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(dimensions(&out), (320, 200));
    }

    #[test]
    fn wide_image_is_downscaled_by_width() {
        let out = normalize_image(&encoded(2048, 1024, ImageFormat::Png), "image/png").unwrap();
        assert_eq!(dimensions(&out), (1024, 512));
    }

    #[test]
    fn tall_image_is_downscaled_by_height() {
        let out = normalize_image(&encoded(500, 2000, ImageFormat::Jpeg), "image/jpeg").unwrap();
        assert_eq!(dimensions(&out), (256, 1024));
    }

    #[test]
    fn small_animated_gif_bytes_are_kept() {
        let gif = animated_gif(16, 16);
        let out = normalize_image(&gif, "image/gif").unwrap();
        assert_eq!(out.mime_type, "image/gif");
        assert_eq!(out.bytes, gif);
    }

    #[test]
    fn large_animated_gif_is_downscaled_per_frame() {
        let out = normalize_image(&animated_gif(2048, 512), "image/gif").unwrap();
        assert_eq!(out.mime_type, "image/gif");

        let frames = gif_frames(&out.bytes);
        assert_eq!(frames.len(), 2);
        for frame in &frames {
            assert_eq!(frame.buffer().dimensions(), (1024, 256));
        }
    }

    #[test]
    fn single_frame_gif_is_treated_as_still() {
        let out = normalize_image(&encoded(2000, 1000, ImageFormat::Gif), "image/gif").unwrap();
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(dimensions(&out), (1024, 512));
    }

    #[test]
    fn undecodable_bytes_are_rejected() {
        assert!(matches!(
            normalize_image(b"definitely not an image", "image/png"),
            Err(MediaError::Decode { .. })
        ));
        assert!(matches!(
            normalize_image(b"GIF89a garbage", "image/gif"),
            Err(MediaError::Decode { .. })
        ));
    }
}
