use ndarray::{s, Array2, ArrayView2};

use crate::shared::frame::Frame;

/// Fixed-point BT.601 luma weights (R, G, B) scaled by 2^14.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Converts an RGB (or RGBA) frame to single-channel intensity using
/// `Y = 0.299 R + 0.587 G + 0.114 B`, rounded to nearest.
pub fn to_grayscale(frame: &Frame) -> Result<Array2<u8>, Box<dyn std::error::Error>> {
    if frame.is_empty() {
        return Err("cannot convert an empty image to grayscale".into());
    }
    let channels = frame.channels() as usize;
    let (w, h) = (frame.width() as usize, frame.height() as usize);

    let luma: Vec<u8> = match channels {
        1 => frame.data().to_vec(),
        3 | 4 => frame
            .data()
            .chunks_exact(channels)
            .map(|px| {
                let y = px[0] as u32 * LUMA_R
                    + px[1] as u32 * LUMA_G
                    + px[2] as u32 * LUMA_B
                    + (1 << (LUMA_SHIFT - 1));
                (y >> LUMA_SHIFT) as u8
            })
            .collect(),
        n => return Err(format!("unsupported channel count for grayscale: {n}").into()),
    };

    Ok(Array2::from_shape_vec((h, w), luma)?)
}

/// Mouth sub-rectangle of a grayscale face: rows 60%–90% of the face
/// height, columns 20%–80% of the face width.
///
/// Bounds come from the bounding-box dimensions and are truncated toward
/// zero, then clipped to the actual crop, which may be smaller than the box
/// when the face touches the image border. The view may be empty.
pub fn mouth_region(gray: ArrayView2<'_, u8>, face_width: i32, face_height: i32) -> ArrayView2<'_, u8> {
    let (rows, cols) = gray.dim();
    let span = |extent: i32, lo: f64, hi: f64, limit: usize| {
        let extent = extent.max(0) as f64;
        let start = ((extent * lo) as usize).min(limit);
        let end = ((extent * hi) as usize).min(limit).max(start);
        start..end
    };
    let row_span = span(face_height, 0.6, 0.9, rows);
    let col_span = span(face_width, 0.2, 0.8, cols);
    gray.slice_move(s![row_span, col_span])
}

/// Population mean and variance of the intensities, or `None` for an
/// empty region.
pub fn mean_and_variance(region: ArrayView2<'_, u8>) -> Option<(f64, f64)> {
    if region.is_empty() {
        return None;
    }
    let values = region.mapv(f64::from);
    let mean = values.mean()?;
    Some((mean, values.var(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb.iter().copied().cycle().take((w * h * 3) as usize).collect();
        Frame::new(data, w, h, 3)
    }

    #[rstest]
    #[case::white([255, 255, 255], 255)]
    #[case::black([0, 0, 0], 0)]
    #[case::red([255, 0, 0], 76)]
    #[case::green([0, 255, 0], 150)]
    #[case::blue([0, 0, 255], 29)]
    #[case::gray([128, 128, 128], 128)]
    fn test_grayscale_luma_weights(#[case] rgb: [u8; 3], #[case] expected: u8) {
        let gray = to_grayscale(&solid(2, 2, rgb)).unwrap();
        assert_eq!(gray.dim(), (2, 2));
        assert!(gray.iter().all(|&v| v == expected));
    }

    #[test]
    fn test_grayscale_rgba_ignores_alpha() {
        let frame = Frame::new(vec![255, 255, 255, 0], 1, 1, 4);
        assert_eq!(to_grayscale(&frame).unwrap()[[0, 0]], 255);
    }

    #[test]
    fn test_grayscale_rejects_empty() {
        let frame = Frame::new(Vec::new(), 0, 0, 3);
        assert!(to_grayscale(&frame).is_err());
    }

    #[test]
    fn test_grayscale_rejects_two_channels() {
        let frame = Frame::new(vec![0, 0], 1, 1, 2);
        assert!(to_grayscale(&frame).is_err());
    }

    #[test]
    fn test_mouth_region_bounds() {
        let gray = Array2::<u8>::zeros((100, 50));
        let mouth = mouth_region(gray.view(), 50, 100);
        // rows 60..90, cols 10..40
        assert_eq!(mouth.dim(), (30, 30));
    }

    #[test]
    fn test_mouth_region_truncates() {
        let gray = Array2::<u8>::zeros((7, 7));
        let mouth = mouth_region(gray.view(), 7, 7);
        // rows int(4.2)=4..int(6.3)=6, cols int(1.4)=1..int(5.6)=5
        assert_eq!(mouth.dim(), (2, 4));
    }

    #[test]
    fn test_mouth_region_clips_to_smaller_crop() {
        // Box says 100x100 but only 70 rows were inside the image
        let gray = Array2::<u8>::zeros((70, 100));
        let mouth = mouth_region(gray.view(), 100, 100);
        assert_eq!(mouth.dim(), (10, 60));
    }

    #[test]
    fn test_mouth_region_tiny_face_is_empty() {
        let gray = Array2::<u8>::zeros((1, 1));
        assert!(mouth_region(gray.view(), 1, 1).is_empty());
    }

    #[test]
    fn test_mouth_region_reads_expected_pixels() {
        let mut gray = Array2::<u8>::zeros((10, 10));
        gray[[6, 2]] = 9; // first mouth pixel
        let mouth = mouth_region(gray.view(), 10, 10);
        assert_eq!(mouth[[0, 0]], 9);
    }

    #[test]
    fn test_mean_and_variance() {
        let region = Array2::from_shape_vec((2, 2), vec![0u8, 0, 255, 255]).unwrap();
        let (mean, var) = mean_and_variance(region.view()).unwrap();
        assert_relative_eq!(mean, 127.5);
        assert_relative_eq!(var, 127.5 * 127.5);
    }

    #[test]
    fn test_mean_and_variance_empty() {
        let region = Array2::<u8>::zeros((0, 3));
        assert!(mean_and_variance(region.view()).is_none());
    }
}
