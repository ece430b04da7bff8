// Unit parsing and conversion for template values.
//
// Lengths normalize to points. Line spacing in multiples and "lines" is
// dimensionless and converts 1:1.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

pub const CM_TO_PT: f64 = 28.3464567;
pub const MM_TO_PT: f64 = CM_TO_PT / 10.0;
pub const INCH_TO_PT: f64 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Point,
    Centimeter,
    Millimeter,
    Inch,
    /// Character widths, resolved against the font size
    Char,
    Multiple,
    Line,
}

impl Unit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pt" | "磅" | "point" | "points" => Some(Unit::Point),
            "cm" | "厘米" => Some(Unit::Centimeter),
            "mm" | "毫米" => Some(Unit::Millimeter),
            "in" | "inch" | "英寸" => Some(Unit::Inch),
            "char" | "chars" | "字符" => Some(Unit::Char),
            "multiple" | "倍" | "x" => Some(Unit::Multiple),
            "line" | "lines" | "行" => Some(Unit::Line),
            _ => None,
        }
    }

    fn points_per_unit(self) -> Option<f64> {
        match self {
            Unit::Point => Some(1.0),
            Unit::Centimeter => Some(CM_TO_PT),
            Unit::Millimeter => Some(MM_TO_PT),
            Unit::Inch => Some(INCH_TO_PT),
            _ => None,
        }
    }

    fn is_dimensionless(self) -> bool {
        matches!(self, Unit::Multiple | Unit::Line)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Unit::Point => "pt",
            Unit::Centimeter => "cm",
            Unit::Millimeter => "mm",
            Unit::Inch => "in",
            Unit::Char => "char",
            Unit::Multiple => "multiple",
            Unit::Line => "line",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Option<Unit>,
}

static QUANTITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*([A-Za-z\p{Han}]+)?\s*$").unwrap());

/// Parses strings like `"2 字符"`, `"1.5倍"`, `"0.75 cm"` or a bare number.
/// Returns `None` for text that is not a quantity or names an unknown unit.
pub fn parse_quantity(raw: &str) -> Option<Quantity> {
    let captures = QUANTITY_REGEX.captures(raw)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = match captures.get(2) {
        Some(m) => Some(Unit::parse(m.as_str())?),
        None => None,
    };
    Some(Quantity { value, unit })
}

/// Converts `quantity` into `target`. A quantity without a unit is taken to
/// already be in `target`. `font_size_pt` resolves character widths.
pub fn convert(quantity: Quantity, target: Unit, font_size_pt: Option<f64>) -> Result<f64, String> {
    let source = match quantity.unit {
        None => return Ok(quantity.value),
        Some(unit) if unit == target => return Ok(quantity.value),
        Some(unit) => unit,
    };

    if source.is_dimensionless() && target.is_dimensionless() {
        return Ok(quantity.value);
    }

    // "0 行" spacing is the same as no spacing in any unit
    if source == Unit::Line && quantity.value == 0.0 {
        return Ok(0.0);
    }

    let points = match source {
        Unit::Char => {
            let size = font_size_pt
                .ok_or_else(|| format!("cannot convert {} char without a font size", quantity.value))?;
            quantity.value * size
        }
        other => {
            let factor = other
                .points_per_unit()
                .ok_or_else(|| format!("cannot convert {other} to {target}"))?;
            quantity.value * factor
        }
    };

    match target {
        Unit::Char => {
            let size = font_size_pt
                .filter(|size| *size > 0.0)
                .ok_or_else(|| "cannot convert to char without a font size".to_string())?;
            Ok(points / size)
        }
        other => other
            .points_per_unit()
            .map(|factor| points / factor)
            .ok_or_else(|| format!("cannot convert {source} to {target}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-6, "{actual} != {expected}");
    }

    #[test]
    fn parses_quantities_with_chinese_and_english_units() {
        assert_eq!(
            parse_quantity("2 字符"),
            Some(Quantity { value: 2.0, unit: Some(Unit::Char) })
        );
        assert_eq!(
            parse_quantity("1.5倍"),
            Some(Quantity { value: 1.5, unit: Some(Unit::Multiple) })
        );
        assert_eq!(parse_quantity("12"), Some(Quantity { value: 12.0, unit: None }));
        assert_eq!(parse_quantity("12 furlongs"), None);
        assert_eq!(parse_quantity("宋体"), None);
    }

    #[test]
    fn converts_lengths_through_points() {
        let cm = Quantity { value: 1.0, unit: Some(Unit::Centimeter) };
        assert_close(convert(cm, Unit::Point, None).unwrap(), CM_TO_PT);

        let inch = Quantity { value: 1.0, unit: Some(Unit::Inch) };
        assert_close(convert(inch, Unit::Centimeter, None).unwrap(), 72.0 / CM_TO_PT);
    }

    #[test]
    fn char_units_need_a_font_size() {
        let indent = Quantity { value: 2.0, unit: Some(Unit::Char) };
        assert_close(convert(indent, Unit::Point, Some(12.0)).unwrap(), 24.0);
        assert!(convert(indent, Unit::Point, None).is_err());
    }

    #[test]
    fn zero_lines_equal_zero_points() {
        let zero = Quantity { value: 0.0, unit: Some(Unit::Line) };
        assert_close(convert(zero, Unit::Point, None).unwrap(), 0.0);
        let one = Quantity { value: 1.0, unit: Some(Unit::Line) };
        assert!(convert(one, Unit::Point, None).is_err());
        assert_close(convert(one, Unit::Multiple, None).unwrap(), 1.0);
    }
}
