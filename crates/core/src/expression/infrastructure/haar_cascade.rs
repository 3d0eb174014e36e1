//! Boosted Haar cascade classifier in OpenCV's XML storage format.
//!
//! Only the current `opencv-cascade-classifier` layout with BOOST stages and
//! HAAR features is accepted. Windows are evaluated at the cascade's base
//! size; scale invariance comes from resizing the image, not the features.

use std::path::Path;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};
use roxmltree::Node;
use thiserror::Error;

/// Subtracted from every stage threshold on load, as OpenCV does.
const STAGE_THRESHOLD_EPS: f64 = 1e-5;

/// Windows whose `area / stddev_norm` reaches this are too flat to classify.
const MIN_VARIANCE_RATIO: f64 = 0.1;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cannot read cascade file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cascade is not valid XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("cascade is missing <{0}>")]
    MissingElement(&'static str),

    #[error("invalid number {value:?} in <{element}>")]
    InvalidNumber { element: String, value: String },

    #[error("unsupported cascade: {0}")]
    Unsupported(String),

    #[error("malformed cascade: {0}")]
    Malformed(String),

    #[error("scale factor must be greater than 1, got {0}")]
    InvalidScaleFactor(f64),
}

#[derive(Clone, Debug)]
struct HaarRect {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    weight: f64,
}

#[derive(Clone, Debug)]
struct HaarFeature {
    rects: Vec<HaarRect>,
    tilted: bool,
}

/// Split node; child indices `<= 0` are leaves at index `-child`.
#[derive(Clone, Debug)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Clone, Debug)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Clone, Debug)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// Outcome of running the cascade on one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowVerdict {
    Accepted,
    /// Rejected by the stage with this index.
    RejectedAt(usize),
    /// Window variance too low to normalise; no stage was run.
    LowVariance,
}

/// Summed-area tables for one grayscale image.
///
/// Built by [`HaarCascade::integral_images`] so that the rotated table is
/// present whenever the cascade needs it.
pub struct IntegralImages {
    sum: Array2<f64>,
    sqsum: Array2<f64>,
    tilted: Option<Array2<f64>>,
}

impl IntegralImages {
    fn new(gray: ArrayView2<'_, u8>, with_tilted: bool) -> Self {
        let (rows, cols) = gray.dim();
        let mut sum = Array2::<f64>::zeros((rows + 1, cols + 1));
        let mut sqsum = Array2::<f64>::zeros((rows + 1, cols + 1));
        for y in 0..rows {
            let mut row_sum = 0.0;
            let mut row_sqsum = 0.0;
            for x in 0..cols {
                let v = gray[[y, x]] as f64;
                row_sum += v;
                row_sqsum += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row_sum;
                sqsum[[y + 1, x + 1]] = sqsum[[y, x + 1]] + row_sqsum;
            }
        }
        let tilted = with_tilted.then(|| tilted_integral(gray));
        Self { sum, sqsum, tilted }
    }

    /// Width and height of the source image.
    #[cfg(test)]
    fn image_size(&self) -> (usize, usize) {
        let (rows, cols) = self.sum.dim();
        (cols - 1, rows - 1)
    }
}

/// `tilted[Y][X]` is the sum of pixels `(x, y)` with `y < Y` and
/// `|x - X + 1| <= Y - y - 1`: the 45° triangle whose apex sits just above
/// `(X - 1, Y - 1)`.
///
/// Each cell combines the two triangles one row up, minus their overlap
/// two rows up, plus the two apex pixels. Column 0 copies its upper-right
/// neighbour; on the last column the right-hand triangle equals the overlap.
fn tilted_integral(gray: ArrayView2<'_, u8>) -> Array2<f64> {
    let (rows, cols) = gray.dim();
    let mut tilted = Array2::<f64>::zeros((rows + 1, cols + 1));
    if cols == 0 {
        return tilted;
    }

    for y in 1..=rows {
        tilted[[y, 0]] = tilted[[y - 1, 1]];
        for x in 1..=cols {
            let (overlap, pixel_above) = if y >= 2 {
                (tilted[[y - 2, x]], gray[[y - 2, x - 1]] as f64)
            } else {
                (0.0, 0.0)
            };
            let right = if x < cols { tilted[[y - 1, x + 1]] } else { overlap };
            tilted[[y, x]] = tilted[[y - 1, x - 1]] + right - overlap
                + gray[[y - 1, x - 1]] as f64
                + pixel_above;
        }
    }
    tilted
}

/// Four-corner lookup `p0 - p1 - p2 + p3` with `(x, y)` corners.
fn corner_sum(table: &Array2<f64>, corners: [(i64, i64); 4]) -> f64 {
    let at = |(x, y): (i64, i64)| table[[y as usize, x as usize]];
    at(corners[0]) - at(corners[1]) - at(corners[2]) + at(corners[3])
}

fn upright_sum(table: &Array2<f64>, x: i64, y: i64, w: i64, h: i64) -> f64 {
    corner_sum(table, [(x, y), (x + w, y), (x, y + h), (x + w, y + h)])
}

fn tilted_sum(table: &Array2<f64>, x: i64, y: i64, w: i64, h: i64) -> f64 {
    corner_sum(
        table,
        [(x, y), (x - h, y + h), (x + w, y + w), (x + w - h, y + w + h)],
    )
}

/// A loaded cascade, ready to classify windows of its base size.
#[derive(Clone, Debug)]
pub struct HaarCascade {
    width: usize,
    height: usize,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_xml(&text)
    }

    pub fn from_xml(text: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(text)?;
        let storage = doc.root_element();

        let cascade = match storage.children().find(|n| n.has_tag_name("cascade")) {
            Some(node) => node,
            None if storage
                .children()
                .any(|n| n.attribute("type_id") == Some("opencv-haar-classifier")) =>
            {
                return Err(CascadeError::Unsupported(
                    "legacy opencv-haar-classifier format".into(),
                ));
            }
            None => return Err(CascadeError::MissingElement("cascade")),
        };

        let stage_type = text_of(cascade, "stageType")?;
        if stage_type != "BOOST" {
            return Err(CascadeError::Unsupported(format!("stage type {stage_type}")));
        }
        let feature_type = text_of(cascade, "featureType")?;
        if feature_type != "HAAR" {
            return Err(CascadeError::Unsupported(format!(
                "feature type {feature_type}"
            )));
        }
        if let Ok(params) = child(cascade, "featureParams") {
            if let Ok(node) = child(params, "maxCatCount") {
                let cats: i64 = parse_number("maxCatCount", self::text(node))?;
                if cats > 0 {
                    return Err(CascadeError::Unsupported(
                        "categorical features".into(),
                    ));
                }
            }
        }

        let width: usize = parse_number("width", text_of(cascade, "width")?)?;
        let height: usize = parse_number("height", text_of(cascade, "height")?)?;
        if width < 3 || height < 3 {
            return Err(CascadeError::Malformed(format!(
                "window {width}x{height} is too small"
            )));
        }

        let features = items(child(cascade, "features")?)
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;
        let stages = items(child(cascade, "stages")?)
            .map(parse_stage)
            .collect::<Result<Vec<_>, _>>()?;

        let cascade = Self {
            width,
            height,
            stages,
            features,
        };
        cascade.validate()?;
        log::debug!(
            "Loaded Haar cascade: {}x{} window, {} stages, {} features",
            cascade.width,
            cascade.height,
            cascade.stages.len(),
            cascade.features.len()
        );
        Ok(cascade)
    }

    /// Base detection window as `(width, height)`.
    pub fn window_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn has_tilted(&self) -> bool {
        self.features.iter().any(|f| f.tilted)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn integral_images(&self, gray: ArrayView2<'_, u8>) -> IntegralImages {
        IntegralImages::new(gray, self.has_tilted())
    }

    /// Runs every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// The window must lie entirely inside the image `ii` was built from.
    pub fn evaluate(&self, ii: &IntegralImages, x: usize, y: usize) -> WindowVerdict {
        let (x, y) = (x as i64, y as i64);
        let (nw, nh) = (self.width as i64 - 2, self.height as i64 - 2);
        let area = (nw * nh) as f64;
        let s = upright_sum(&ii.sum, x + 1, y + 1, nw, nh);
        let sq = upright_sum(&ii.sqsum, x + 1, y + 1, nw, nh);

        let norm = area * sq - s * s;
        if norm <= 0.0 {
            return WindowVerdict::LowVariance;
        }
        let norm = norm.sqrt();
        if area / norm >= MIN_VARIANCE_RATIO {
            return WindowVerdict::LowVariance;
        }

        for (index, stage) in self.stages.iter().enumerate() {
            let total: f64 = stage
                .classifiers
                .iter()
                .map(|wc| self.weak_response(wc, ii, x, y, norm))
                .sum();
            if total < stage.threshold {
                return WindowVerdict::RejectedAt(index);
            }
        }
        WindowVerdict::Accepted
    }

    fn weak_response(
        &self,
        wc: &WeakClassifier,
        ii: &IntegralImages,
        x: i64,
        y: i64,
        norm: f64,
    ) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &wc.nodes[idx];
            let value = self.feature_value(node.feature, ii, x, y) / norm;
            let next = if value < node.threshold {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return wc.leaves[(-next) as usize];
            }
            idx = next as usize;
        }
    }

    fn feature_value(&self, feature: usize, ii: &IntegralImages, x: i64, y: i64) -> f64 {
        let feature = &self.features[feature];
        let table = match (feature.tilted, &ii.tilted) {
            (false, _) => &ii.sum,
            (true, Some(tilted)) => tilted,
            (true, None) => return 0.0,
        };
        feature
            .rects
            .iter()
            .map(|r| {
                let (rx, ry, rw, rh) = (x + r.x as i64, y + r.y as i64, r.w as i64, r.h as i64);
                let area_sum = if feature.tilted {
                    tilted_sum(table, rx, ry, rw, rh)
                } else {
                    upright_sum(table, rx, ry, rw, rh)
                };
                r.weight * area_sum
            })
            .sum()
    }

    fn validate(&self) -> Result<(), CascadeError> {
        let (w, h) = (self.width as i32, self.height as i32);
        for (i, feature) in self.features.iter().enumerate() {
            for r in &feature.rects {
                let inside = if feature.tilted {
                    r.x >= r.h && r.y >= 0 && r.x + r.w <= w && r.y + r.w + r.h <= h
                } else {
                    r.x >= 0 && r.y >= 0 && r.x + r.w <= w && r.y + r.h <= h
                };
                if r.w < 0 || r.h < 0 || !inside {
                    return Err(CascadeError::Malformed(format!(
                        "feature {i} has a rectangle outside the {w}x{h} window"
                    )));
                }
            }
        }

        for (s, stage) in self.stages.iter().enumerate() {
            for wc in &stage.classifiers {
                for node in &wc.nodes {
                    if node.feature >= self.features.len() {
                        return Err(CascadeError::Malformed(format!(
                            "stage {s} references missing feature {}",
                            node.feature
                        )));
                    }
                    for child in [node.left, node.right] {
                        let ok = if child > 0 {
                            (child as usize) < wc.nodes.len()
                        } else {
                            ((-child) as usize) < wc.leaves.len()
                        };
                        if !ok {
                            return Err(CascadeError::Malformed(format!(
                                "stage {s} has a tree branch to missing index {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_stage(node: Node<'_, '_>) -> Result<Stage, CascadeError> {
    let threshold: f64 = parse_number("stageThreshold", text_of(node, "stageThreshold")?)?;
    let classifiers = items(child(node, "weakClassifiers")?)
        .map(parse_weak_classifier)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold: threshold - STAGE_THRESHOLD_EPS,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node<'_, '_>) -> Result<WeakClassifier, CascadeError> {
    let raw = text_of(node, "internalNodes")?;
    let values: Vec<&str> = raw.split_whitespace().collect();
    if values.is_empty() || values.len() % 4 != 0 {
        return Err(CascadeError::Malformed(format!(
            "internalNodes holds {} values, expected groups of 4",
            values.len()
        )));
    }
    let nodes = values
        .chunks_exact(4)
        .map(|v| -> Result<TreeNode, CascadeError> {
            Ok(TreeNode {
                left: parse_number("internalNodes", v[0])?,
                right: parse_number("internalNodes", v[1])?,
                feature: parse_number("internalNodes", v[2])?,
                threshold: parse_number("internalNodes", v[3])?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let leaves = numbers(node, "leafValues")?;
    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(node: Node<'_, '_>) -> Result<HaarFeature, CascadeError> {
    let rects = items(child(node, "rects")?)
        .map(|r| {
            let v: Vec<&str> = text(r).split_whitespace().collect();
            if v.len() != 5 {
                return Err(CascadeError::Malformed(format!(
                    "rect holds {} values, expected 5",
                    v.len()
                )));
            }
            Ok(HaarRect {
                x: parse_number("rects", v[0])?,
                y: parse_number("rects", v[1])?,
                w: parse_number("rects", v[2])?,
                h: parse_number("rects", v[3])?,
                weight: parse_number("rects", v[4])?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if rects.is_empty() {
        return Err(CascadeError::Malformed("feature without rects".into()));
    }
    let tilted = match child(node, "tilted") {
        Ok(t) => parse_number::<i32>("tilted", text(t))? != 0,
        Err(_) => false,
    };
    Ok(HaarFeature { rects, tilted })
}

fn child<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> Result<Node<'a, 'input>, CascadeError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or(CascadeError::MissingElement(name))
}

/// Sequence entries, which OpenCV writes as `<_>` elements.
fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.has_tag_name("_"))
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn text_of<'a>(node: Node<'a, '_>, name: &'static str) -> Result<&'a str, CascadeError> {
    child(node, name).map(text)
}

fn numbers<T: FromStr>(node: Node<'_, '_>, name: &'static str) -> Result<Vec<T>, CascadeError> {
    text_of(node, name)?
        .split_whitespace()
        .map(|v| parse_number(name, v))
        .collect()
}

fn parse_number<T: FromStr>(element: &str, value: &str) -> Result<T, CascadeError> {
    value.parse().map_err(|_| CascadeError::InvalidNumber {
        element: element.to_string(),
        value: value.to_string(),
    })
}

/// A 6x6 single-stage cascade that accepts windows whose right half is
/// brighter than the left half.
#[cfg(test)]
pub(crate) const EDGE_CASCADE_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>6</height>
  <width>6</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 1.0000000149011612e-01</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 6 6 -1.</_>
        <_>
          3 0 3 6 2.</_></rects>
      <tilted>0</tilted></_></features></cascade>
</opencv_storage>
"#;
