use image::imageops::FilterType;
use image::GrayImage;
use ndarray::{Array2, ArrayView2};

use super::haar_cascade::{CascadeError, HaarCascade, WindowVerdict};
use crate::detection::infrastructure::math::partition;
use crate::expression::domain::smile_detector::SmileDetector;
use crate::shared::face_box::FaceBox;

/// Relative tolerance for treating two candidate rectangles as the same hit.
pub const GROUP_EPS: f64 = 0.2;

/// Multi-scale sliding-window smile detector over a [`HaarCascade`].
///
/// The image is shrunk by `scale_factor` per level until it no longer fits
/// the cascade window; hits are merged with [`group_rectangles`], keeping
/// only clusters with more than `min_neighbors` members.
pub struct CascadeSmileDetector {
    cascade: HaarCascade,
    scale_factor: f64,
    min_neighbors: usize,
}

impl CascadeSmileDetector {
    pub fn new(
        cascade: HaarCascade,
        scale_factor: f64,
        min_neighbors: usize,
    ) -> Result<Self, CascadeError> {
        if scale_factor.is_nan() || scale_factor <= 1.0 {
            return Err(CascadeError::InvalidScaleFactor(scale_factor));
        }
        Ok(Self {
            cascade,
            scale_factor,
            min_neighbors,
        })
    }

    /// Raw window hits in input coordinates, before grouping.
    pub fn detect_candidates(
        &self,
        gray: ArrayView2<'_, u8>,
    ) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        let (img_h, img_w) = gray.dim();
        let (win_w, win_h) = self.cascade.window_size();
        let mut hits = Vec::new();

        let mut factor = 1.0;
        loop {
            let window_w = (win_w as f64 * factor).round() as usize;
            let window_h = (win_h as f64 * factor).round() as usize;
            if window_w > img_w || window_h > img_h {
                break;
            }
            let scaled_w = (img_w as f64 / factor).round() as usize;
            let scaled_h = (img_h as f64 / factor).round() as usize;
            if scaled_w < win_w || scaled_h < win_h {
                break;
            }

            let level = resize_gray(gray, scaled_w, scaled_h)?;
            let ii = self.cascade.integral_images(level.view());
            let step = if factor > 2.0 { 1 } else { 2 };
            let before = hits.len();

            let mut y = 0;
            while y + win_h <= scaled_h {
                let mut x = 0;
                while x + win_w <= scaled_w {
                    match self.cascade.evaluate(&ii, x, y) {
                        WindowVerdict::Accepted => hits.push(FaceBox::new(
                            (x as f64 * factor).round() as i32,
                            (y as f64 * factor).round() as i32,
                            window_w as i32,
                            window_h as i32,
                        )),
                        // Neighbouring window is almost certainly rejected too
                        WindowVerdict::RejectedAt(0) => x += step,
                        _ => {}
                    }
                    x += step;
                }
                y += step;
            }

            log::trace!(
                "Cascade level {factor:.2}: {scaled_w}x{scaled_h}, {} hits",
                hits.len() - before
            );
            factor *= self.scale_factor;
        }

        Ok(hits)
    }
}

impl SmileDetector for CascadeSmileDetector {
    fn detect_smiles(
        &self,
        gray: ArrayView2<'_, u8>,
    ) -> Result<Vec<FaceBox>, Box<dyn std::error::Error>> {
        let candidates = self.detect_candidates(gray)?;
        let smiles = group_rectangles(&candidates, self.min_neighbors, GROUP_EPS);
        log::debug!(
            "Smile cascade: {} candidates, {} after grouping",
            candidates.len(),
            smiles.len()
        );
        Ok(smiles)
    }
}

fn resize_gray(
    gray: ArrayView2<'_, u8>,
    width: usize,
    height: usize,
) -> Result<Array2<u8>, Box<dyn std::error::Error>> {
    if gray.dim() == (height, width) {
        return Ok(gray.to_owned());
    }
    let (rows, cols) = gray.dim();
    let src = GrayImage::from_raw(cols as u32, rows as u32, gray.iter().copied().collect())
        .ok_or("grayscale buffer does not match its dimensions")?;
    let resized = image::imageops::resize(&src, width as u32, height as u32, FilterType::Triangle);
    Ok(Array2::from_shape_vec((height, width), resized.into_raw())?)
}

/// Whether two rectangles are within `eps` of each other on every edge,
/// relative to their smaller dimensions.
fn similar(a: &FaceBox, b: &FaceBox, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.right() - b.right()).abs() as f64 <= delta
        && (a.bottom() - b.bottom()).abs() as f64 <= delta
}

/// Clusters overlapping detections and returns one averaged rectangle per
/// cluster with more than `threshold` members.
///
/// A surviving cluster is dropped when it sits inside another surviving
/// cluster that has more members (or when it has fewer than three itself).
/// A `threshold` of zero returns the input unchanged.
pub fn group_rectangles(rects: &[FaceBox], threshold: usize, eps: f64) -> Vec<FaceBox> {
    if threshold == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let (labels, count) = partition(rects.len(), |i, j| similar(&rects[i], &rects[j], eps));

    let mut sums = vec![[0i64; 4]; count];
    let mut weights = vec![0usize; count];
    for (rect, &label) in rects.iter().zip(&labels) {
        let s = &mut sums[label];
        s[0] += rect.x as i64;
        s[1] += rect.y as i64;
        s[2] += rect.width as i64;
        s[3] += rect.height as i64;
        weights[label] += 1;
    }
    let averaged: Vec<FaceBox> = sums
        .iter()
        .zip(&weights)
        .map(|(s, &n)| {
            let avg = |v: i64| (v as f64 / n as f64).round() as i32;
            FaceBox::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = weights[i];
        if n1 <= threshold {
            continue;
        }
        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = weights[j];
            if j == i || n2 <= threshold {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !swallowed {
            grouped.push(*r1);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::infrastructure::haar_cascade::EDGE_CASCADE_XML;
    use rstest::rstest;

    fn edge_detector(min_neighbors: usize) -> CascadeSmileDetector {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE_XML).unwrap();
        CascadeSmileDetector::new(cascade, 1.8, min_neighbors).unwrap()
    }

    fn columns(values: &[u8], rows: usize) -> Array2<u8> {
        Array2::from_shape_fn((rows, values.len()), |(_, x)| values[x])
    }

    fn repeat(rect: FaceBox, n: usize) -> Vec<FaceBox> {
        vec![rect; n]
    }

    // --- Construction ---

    #[rstest]
    #[case(1.0)]
    #[case(0.5)]
    #[case(f64::NAN)]
    fn test_rejects_non_shrinking_scale(#[case] scale: f64) {
        let cascade = HaarCascade::from_xml(EDGE_CASCADE_XML).unwrap();
        assert!(matches!(
            CascadeSmileDetector::new(cascade, scale, 3),
            Err(CascadeError::InvalidScaleFactor(_))
        ));
    }

    // --- Sliding window ---

    #[test]
    fn test_single_window_hit() {
        let img = columns(&[0, 0, 0, 255, 255, 255], 6);
        let hits = edge_detector(0).detect_candidates(img.view()).unwrap();
        assert_eq!(hits, vec![FaceBox::new(0, 0, 6, 6)]);
    }

    #[test]
    fn test_image_smaller_than_window() {
        let img = columns(&[0, 255, 255], 3);
        assert!(edge_detector(0).detect_smiles(img.view()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_image() {
        let img = Array2::<u8>::zeros((0, 0));
        assert!(edge_detector(0).detect_smiles(img.view()).unwrap().is_empty());
    }

    #[test]
    fn test_hits_across_pyramid() {
        let mut values = vec![0u8; 6];
        values.extend([255u8; 6]);
        let img = columns(&values, 12);
        let hits = edge_detector(0).detect_candidates(img.view()).unwrap();

        // Base level: x in {2, 4} straddle the edge, for each y in {0, 2, 4, 6}
        for y in [0, 2, 4, 6] {
            assert!(hits.contains(&FaceBox::new(2, y, 6, 6)));
            assert!(hits.contains(&FaceBox::new(4, y, 6, 6)));
        }
        assert!(!hits.contains(&FaceBox::new(0, 0, 6, 6)));
        assert!(!hits.contains(&FaceBox::new(6, 0, 6, 6)));
        // Every hit fits the image
        assert!(hits
            .iter()
            .all(|h| h.x >= 0 && h.y >= 0 && h.right() <= 12 && h.bottom() <= 12));
        // Second level uses a round(6 * 1.8) = 11 pixel window
        assert!(hits.iter().all(|h| h.width == 6 || h.width == 11));
    }

    #[test]
    fn test_first_stage_rejection_skips_next_window() {
        // Window at x=0 is rejected by stage 0, so x=2 (which would pass) is skipped
        let img = columns(&[255, 255, 0, 0, 0, 255, 255, 255, 255, 255], 6);
        let cascade = HaarCascade::from_xml(EDGE_CASCADE_XML).unwrap();
        let ii = cascade.integral_images(img.view());
        assert_eq!(cascade.evaluate(&ii, 0, 0), WindowVerdict::RejectedAt(0));
        assert_eq!(cascade.evaluate(&ii, 2, 0), WindowVerdict::Accepted);

        let hits = edge_detector(0).detect_candidates(img.view()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_min_neighbors_filters_isolated_hits() {
        let img = columns(&[0, 0, 0, 255, 255, 255], 6);
        assert!(edge_detector(20).detect_smiles(img.view()).unwrap().is_empty());
    }

    // --- Grouping ---

    #[test]
    fn test_zero_threshold_returns_input() {
        let rects = vec![FaceBox::new(0, 0, 10, 10), FaceBox::new(50, 50, 5, 5)];
        assert_eq!(group_rectangles(&rects, 0, GROUP_EPS), rects);
    }

    #[test]
    fn test_cluster_is_averaged() {
        let rects = vec![
            FaceBox::new(0, 0, 10, 10),
            FaceBox::new(1, 1, 10, 10),
            FaceBox::new(1, 0, 11, 10),
        ];
        // x: 2/3 → 1, y: 1/3 → 0, w: 31/3 → 10
        assert_eq!(
            group_rectangles(&rects, 2, GROUP_EPS),
            vec![FaceBox::new(1, 0, 10, 10)]
        );
    }

    #[rstest]
    #[case(2, 1)]
    #[case(3, 0)]
    fn test_cluster_size_must_exceed_threshold(#[case] threshold: usize, #[case] expected: usize) {
        let rects = repeat(FaceBox::new(5, 5, 20, 20), 3);
        assert_eq!(group_rectangles(&rects, threshold, GROUP_EPS).len(), expected);
    }

    #[test]
    fn test_distinct_clusters_kept_in_order() {
        let mut rects = repeat(FaceBox::new(0, 0, 10, 10), 3);
        rects.extend(repeat(FaceBox::new(100, 100, 10, 10), 4));
        assert_eq!(
            group_rectangles(&rects, 1, GROUP_EPS),
            vec![FaceBox::new(0, 0, 10, 10), FaceBox::new(100, 100, 10, 10)]
        );
    }

    #[test]
    fn test_inner_cluster_suppressed_by_stronger_outer() {
        let mut rects = repeat(FaceBox::new(0, 0, 100, 100), 5);
        rects.extend(repeat(FaceBox::new(10, 10, 20, 20), 4));
        assert_eq!(
            group_rectangles(&rects, 1, GROUP_EPS),
            vec![FaceBox::new(0, 0, 100, 100)]
        );
    }

    #[test]
    fn test_inner_cluster_kept_when_outer_is_weaker() {
        let mut rects = repeat(FaceBox::new(0, 0, 100, 100), 3);
        rects.extend(repeat(FaceBox::new(10, 10, 20, 20), 4));
        let grouped = group_rectangles(&rects, 1, GROUP_EPS);
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn test_similarity_tolerance() {
        let a = FaceBox::new(0, 0, 10, 10);
        // delta = 0.2 * (10 + 10) / 2 = 2
        assert!(similar(&a, &FaceBox::new(2, 2, 10, 10), GROUP_EPS));
        assert!(!similar(&a, &FaceBox::new(3, 0, 10, 10), GROUP_EPS));
    }
}
