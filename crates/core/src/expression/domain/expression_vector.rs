use serde::Serialize;

/// Score reported for expressions that are not measured from the image.
///
/// Only `happy` comes from image analysis; `sad` and `neutral` are linear
/// functions of it, and the remaining four keep the shape of a full emotion
/// model without one behind them.
pub const PLACEHOLDER_SCORE: f64 = 0.1;

/// Seven named expression scores, each in [0, 1]. Not a distribution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ExpressionVector {
    pub happy: f64,
    pub sad: f64,
    pub angry: f64,
    pub surprised: f64,
    pub fearful: f64,
    pub disgusted: f64,
    pub neutral: f64,
}

impl ExpressionVector {
    pub fn from_happiness(happiness: f64) -> Self {
        let unit = |v: f64| v.clamp(0.0, 1.0);
        Self {
            happy: unit(happiness),
            sad: unit(1.0 - happiness),
            angry: PLACEHOLDER_SCORE,
            surprised: PLACEHOLDER_SCORE,
            fearful: PLACEHOLDER_SCORE,
            disgusted: PLACEHOLDER_SCORE,
            neutral: unit(0.5 - happiness),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case::neutral_default(0.4, 0.6, 0.1)]
    #[case::full_smile(1.0, 0.0, 0.0)]
    #[case::smile_base(0.7, 0.3, 0.0)]
    #[case::minimum(0.1, 0.9, 0.4)]
    #[case::half(0.5, 0.5, 0.0)]
    fn test_derived_scores(#[case] h: f64, #[case] sad: f64, #[case] neutral: f64) {
        let v = ExpressionVector::from_happiness(h);
        assert_relative_eq!(v.happy, h);
        assert_relative_eq!(v.sad, sad, epsilon = 1e-12);
        assert_relative_eq!(v.neutral, neutral, epsilon = 1e-12);
    }

    #[rstest]
    #[case(0.1)]
    #[case(0.55)]
    #[case(1.0)]
    fn test_placeholders_fixed(#[case] h: f64) {
        let v = ExpressionVector::from_happiness(h);
        assert_eq!(v.angry, 0.1);
        assert_eq!(v.surprised, 0.1);
        assert_eq!(v.fearful, 0.1);
        assert_eq!(v.disgusted, 0.1);
    }

    #[test]
    fn test_out_of_range_input_clamped() {
        let v = ExpressionVector::from_happiness(1.5);
        assert_eq!(v.happy, 1.0);
        assert_eq!(v.sad, 0.0);
        assert_eq!(v.neutral, 0.0);
    }

    #[test]
    fn test_serialized_keys() {
        let json = serde_json::to_value(ExpressionVector::from_happiness(0.4)).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        for key in [
            "happy",
            "sad",
            "angry",
            "surprised",
            "fearful",
            "disgusted",
            "neutral",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(keys.len(), 7);
    }
}
