//! Frame type and pixel conversion — YUYV/RGB3 to RGB, dark detection.

use image::{Pixel, RgbImage};

/// A captured RGB camera frame at the camera's native resolution.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Driver sequence number of the dequeued buffer.
    pub sequence: u32,
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 video-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Wrap a packed 24-bit RGB buffer, dropping any trailing driver padding.
pub fn rgb24_to_image(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 3) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    RgbImage::from_raw(width, height, buf[..expected].to_vec()).ok_or(FrameError::InvalidLength {
        expected,
        actual: buf.len(),
    })
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |x: i32| (x >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e + 128),
        clamp(298 * c - 100 * d - 208 * e + 128),
        clamp(298 * c + 516 * d + 128),
    ]
}

/// Check if a frame is dark: more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = image.pixels().len();
    if total == 0 {
        return true;
    }
    let dark_count = image.pixels().filter(|p| p.to_luma()[0] < 32).count();
    (dark_count as f32 / total as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_black_and_white() {
        // 2x1 image: Y0=16 (black), Y1=235 (white), neutral chroma
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        let yuyv = vec![128, 128, 128, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let p = rgb.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(p[0], 130);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // High V pushes red up and green down.
        let yuyv = vec![81, 90, 81, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let p = rgb.get_pixel(0, 0);
        assert!(p[0] > 200, "red channel {}", p[0]);
        assert!(p[1] < 50, "green channel {}", p[1]);
    }

    #[test]
    fn test_yuyv_dimensions() {
        let yuyv = vec![128u8; 4 * 2 * 2];
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_rgb24_drops_padding() {
        let mut buf: Vec<u8> = (0..12).collect();
        buf.extend([0xAA; 4]);
        let img = rgb24_to_image(&buf, 2, 2).unwrap();
        assert_eq!(img.get_pixel(1, 1), &Rgb([9, 10, 11]));
    }

    #[test]
    fn test_rgb24_too_short() {
        assert!(rgb24_to_image(&[0u8; 5], 2, 1).is_err());
    }

    #[test]
    fn test_dark_frame() {
        assert!(is_dark_frame(&RgbImage::new(10, 10), 0.95));
        assert!(!is_dark_frame(&RgbImage::from_pixel(10, 10, Rgb([128, 128, 128])), 0.95));
        assert!(is_dark_frame(&RgbImage::new(0, 0), 0.95));
    }
}
