use serde::{Deserialize, Serialize};

/// D65 white point, used when a colour carries no chromaticity.
pub const D65_WHITE: XyColor = XyColor {
    x: 0.3127,
    y: 0.3290,
};

/// A colour in CIE 1931 xy chromaticity coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XyColor {
    pub x: f64,
    pub y: f64,
}

impl XyColor {
    /// Convert an sRGB hex string (`#RRGGBB` or `RRGGBB`) to xy.
    ///
    /// Unparsable strings and pure black map to [`D65_WHITE`].
    pub fn from_hex(hex: &str) -> Self {
        match parse_hex(hex) {
            Some((r, g, b)) => Self::from_srgb(r, g, b),
            None => D65_WHITE,
        }
    }

    pub fn from_srgb(r: u8, g: u8, b: u8) -> Self {
        let (r, g, b) = (linearize(r), linearize(g), linearize(b));

        let x = r * 0.4124 + g * 0.3576 + b * 0.1805;
        let y = r * 0.2126 + g * 0.7152 + b * 0.0722;
        let z = r * 0.0193 + g * 0.1192 + b * 0.9505;

        let sum = x + y + z;
        if sum <= f64::EPSILON {
            return D65_WHITE;
        }
        Self {
            x: round4(x / sum),
            y: round4(y / sum),
        }
    }
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// sRGB companding inverse.
fn linearize(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
