use crate::config::ToleranceConfig;
use crate::error::ConfigError;
use crate::types::{AttributeKey, AttributeValue};
use crate::units::Unit;

/// Absorbs binary float noise at exact tolerance boundaries (12.1 vs 12.0 at 0.1).
pub const FLOAT_NOISE: f64 = 1e-9;

/// Result of comparing one expected/actual pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    Numeric {
        magnitude: f64,
        tolerance: f64,
        within: bool,
    },
    Categorical {
        equal: bool,
    },
}

impl Evaluation {
    pub fn is_equal(&self) -> bool {
        match self {
            Evaluation::Numeric { within, .. } => *within,
            Evaluation::Categorical { equal } => *equal,
        }
    }
}

/// Answers "are these two values equal enough?" for a validated tolerance snapshot.
pub struct TolerancePolicy<'a> {
    config: &'a ToleranceConfig,
}

impl<'a> TolerancePolicy<'a> {
    pub fn new(config: &'a ToleranceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ToleranceConfig {
        self.config
    }

    /// Specific override first, then the unit-family default. Unknown units get
    /// no slack.
    pub fn tolerance_for(&self, key: &AttributeKey) -> f64 {
        if let Some(specific) = self.config.specific_tolerances.get(&key.to_string()) {
            return *specific;
        }
        match key.known_unit() {
            Some(Unit::Point) => self.config.pt_tolerance,
            Some(Unit::Multiple) | Some(Unit::Line) => self.config.multiple_tolerance,
            _ => 0.0,
        }
    }

    pub fn evaluate(
        &self,
        key: &AttributeKey,
        expected: &AttributeValue,
        actual: &AttributeValue,
    ) -> Evaluation {
        if let (AttributeValue::Number(e), Some(a)) = (expected, actual.as_number()) {
            let tolerance = self.tolerance_for(key);
            let difference = (e - a).abs();
            return Evaluation::Numeric {
                magnitude: round_magnitude(difference),
                tolerance,
                within: difference <= tolerance + FLOAT_NOISE,
            };
        }
        Evaluation::Categorical {
            equal: categorical_equal(key, expected, actual),
        }
    }

    pub fn tolerant_equal(
        &self,
        key: &AttributeKey,
        expected: &AttributeValue,
        actual: &AttributeValue,
    ) -> bool {
        self.evaluate(key, expected, actual).is_equal()
    }
}

fn round_magnitude(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn categorical_equal(key: &AttributeKey, expected: &AttributeValue, actual: &AttributeValue) -> bool {
    match (expected, actual) {
        (AttributeValue::Bool(_), _) | (_, AttributeValue::Bool(_)) => {
            match (expected.as_bool(), actual.as_bool()) {
                (Some(e), Some(a)) => e == a,
                _ => false,
            }
        }
        (AttributeValue::Text(e), AttributeValue::Text(a)) => {
            normalize_text(key, e) == normalize_text(key, a)
        }
        // Number against non-numeric text
        _ => false,
    }
}

fn normalize_text(key: &AttributeKey, raw: &str) -> String {
    let trimmed = raw.trim();
    if key.is_color() {
        trimmed.trim_start_matches('#').to_uppercase()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> AttributeKey {
        raw.parse().unwrap()
    }

    #[test]
    fn exact_boundary_is_within_tolerance() {
        let config = ToleranceConfig::default();
        let policy = TolerancePolicy::new(&config).unwrap();
        let size = key("字体.大小.pt");
        assert!(policy.tolerant_equal(&size, &12.0.into(), &12.1.into()));
        assert!(!policy.tolerant_equal(&size, &12.0.into(), &12.11.into()));
    }

    #[test]
    fn rounding_does_not_widen_the_boundary() {
        let config = ToleranceConfig::default();
        let policy = TolerancePolicy::new(&config).unwrap();
        let size = key("字体.大小.pt");
        let evaluation = policy.evaluate(&size, &12.0.into(), &12.1000004.into());
        match evaluation {
            Evaluation::Numeric { magnitude, within, .. } => {
                assert!(!within);
                assert_eq!(magnitude, 0.1);
            }
            other => panic!("expected numeric evaluation, got {other:?}"),
        }
    }

    #[test]
    fn tolerance_follows_unit_family() {
        let mut config = ToleranceConfig::default();
        config
            .specific_tolerances
            .insert("段落.首行缩进.pt".to_string(), 1.0);
        let policy = TolerancePolicy::new(&config).unwrap();

        assert_eq!(policy.tolerance_for(&key("字体.大小.pt")), 0.1);
        assert_eq!(policy.tolerance_for(&key("段落.行间距.multiple")), 0.05);
        assert_eq!(policy.tolerance_for(&key("段落.首行缩进.pt")), 1.0);
        assert_eq!(policy.tolerance_for(&key("编号.级别.level")), 0.0);
    }

    #[test]
    fn categorical_values_normalize_colors_and_booleans() {
        let config = ToleranceConfig::default();
        let policy = TolerancePolicy::new(&config).unwrap();

        let color = key("字体.颜色.hex");
        assert!(policy.tolerant_equal(&color, &"#ff0000".into(), &"FF0000".into()));

        let underline = key("字体.下划线.bool");
        assert!(policy.tolerant_equal(&underline, &false.into(), &"none".into()));

        let font = key("字体.中文字体.name");
        assert!(policy.tolerant_equal(&font, &"宋体".into(), &" 宋体 ".into()));
        assert!(!policy.tolerant_equal(&font, &"宋体".into(), &"黑体".into()));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let config = ToleranceConfig {
            pt_tolerance: -0.1,
            ..ToleranceConfig::default()
        };
        assert!(TolerancePolicy::new(&config).is_err());
    }

    #[test]
    fn numeric_text_actuals_compare_numerically() {
        let config = ToleranceConfig::default();
        let policy = TolerancePolicy::new(&config).unwrap();
        let evaluation = policy.evaluate(&key("字体.大小.pt"), &12.0.into(), &"12.3".into());
        match evaluation {
            Evaluation::Numeric { magnitude, within, .. } => {
                assert!((magnitude - 0.3).abs() < 1e-9);
                assert!(!within);
            }
            other => panic!("expected numeric evaluation, got {other:?}"),
        }
    }
}
