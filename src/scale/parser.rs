use super::models::{Stability, WeighMode, WeightUnit};

/// Fields recovered from one indicator line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub stability: Option<Stability>,
    pub mode: Option<WeighMode>,
    pub value: f64,
    pub unit: WeightUnit,
    pub stable: bool,
    pub raw: String,
}

// Two-letter suffixes first so "kg" is never read as "k" + "g".
const STRICT_UNITS: [(&str, WeightUnit); 7] = [
    ("kg", WeightUnit::Kg),
    ("Kg", WeightUnit::Kg),
    ("KG", WeightUnit::Kg),
    ("lb", WeightUnit::Lb),
    ("LB", WeightUnit::Lb),
    ("g", WeightUnit::G),
    ("G", WeightUnit::G),
];

/// Parse one line of indicator output.
///
/// Lines in the canonical `ST,NT,+0001234.5kg` layout are read field by field. Anything
/// else goes through a lenient salvage pass that only needs a number somewhere in the line.
/// Returns `None` when no number can be found at all.
pub fn parse_scale_line(line: &str) -> Option<ParsedLine> {
    let cleaned = line.trim();
    parse_strict(cleaned).or_else(|| parse_lenient(cleaned))
}

/// Canonical format: `<AA>,<BB>,<signed decimal>[.]<unit>`
pub fn parse_strict(cleaned: &str) -> Option<ParsedLine> {
    let mut fields = cleaned.splitn(3, ',');
    let stability_token = fields.next().filter(|t| is_token(t))?;
    let mode_token = fields.next().filter(|t| is_token(t))?;
    let weight_field = fields.next()?;

    let (number, unit) = STRICT_UNITS
        .iter()
        .find_map(|(suffix, unit)| weight_field.strip_suffix(suffix).map(|n| (n, *unit)))?;
    let number = number.strip_suffix('.').unwrap_or(number);
    if !is_decimal(number) {
        return None;
    }
    let value = number.parse::<f64>().ok()?;

    let stability = Stability::from_token(stability_token);
    Some(ParsedLine {
        stability,
        mode: WeighMode::from_token(mode_token),
        value,
        unit,
        stable: stability == Some(Stability::Stable),
        raw: cleaned.to_string(),
    })
}

/// Salvage pass for noisy or vendor-variant lines
pub fn parse_lenient(cleaned: &str) -> Option<ParsedLine> {
    let ascii_only: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .collect();

    let value = first_decimal(&ascii_only)?.parse::<f64>().ok()?;
    let upper = ascii_only.to_ascii_uppercase();

    let stability = if upper.contains("ST") {
        Some(Stability::Stable)
    } else if upper.contains("US") {
        Some(Stability::Unstable)
    } else {
        None
    };

    let mode = if upper.contains("NT") {
        Some(WeighMode::Net)
    } else if upper.contains("GS") {
        Some(WeighMode::Gross)
    } else {
        None
    };

    // Kilograms when nothing matches, as the indicator's factory default.
    let unit = if upper.contains("KG") {
        WeightUnit::Kg
    } else if upper.contains("LB") {
        WeightUnit::Lb
    } else if upper.contains('G') {
        WeightUnit::G
    } else {
        WeightUnit::Kg
    };

    Some(ParsedLine {
        stability,
        mode,
        value,
        unit,
        stable: stability == Some(Stability::Stable),
        raw: cleaned.to_string(),
    })
}

fn is_token(s: &str) -> bool {
    s.len() == 2 && s.bytes().all(|b| b.is_ascii_uppercase())
}

/// `[+-]?\d+(\.\d+)?` over the whole string
fn is_decimal(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    all_digits(int_part) && frac_part.map_or(true, all_digits)
}

/// Leftmost `[+-]?\d+(\.\d+)?` in `s`
fn first_decimal(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let start = (0..bytes.len()).find(|&i| {
        bytes[i].is_ascii_digit()
            || (matches!(bytes[i], b'+' | b'-') && bytes.get(i + 1).map_or(false, u8::is_ascii_digit))
    })?;

    let digits_from = |from: usize| {
        bytes[from..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |n| from + n)
    };

    let int_from = if bytes[start].is_ascii_digit() { start } else { start + 1 };
    let mut end = digits_from(int_from);
    if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).map_or(false, u8::is_ascii_digit) {
        end = digits_from(end + 1);
    }

    Some(&s[start..end])
}
