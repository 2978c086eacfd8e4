//! Color parsing and blending helpers for layer painting.
//!
//! `Color32` stores premultiplied channels, which cannot reproduce the exact
//! unmultiplied bytes of a translucent input. Parsed colors are therefore
//! carried as [`RgbaColor`] and converted to `Color32` only when painting.

use egui::Color32;
use thiserror::Error;

/// Errors raised while parsing a color string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorParseError {
    /// The string was not a recognized hex or rgba() form.
    #[error("Unrecognized color string: {value}")]
    Unrecognized { value: String },
    /// A component could not be parsed as a number.
    #[error("Invalid color component in {value}")]
    InvalidComponent { value: String },
}

/// Unmultiplied RGBA color. Formatting with [`RgbaColor::to_hex`] inverts the
/// parser byte for byte, which premultiplied `Color32` storage cannot do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgbaColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl RgbaColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Convert for painting. Lossy for translucent colors.
    pub fn to_color32(self) -> Color32 {
        Color32::from_rgba_unmultiplied(self.r, self.g, self.b, self.a)
    }

    /// Paintable color with the alpha replaced.
    pub fn with_alpha(self, alpha: u8) -> Color32 {
        Color32::from_rgba_unmultiplied(self.r, self.g, self.b, alpha)
    }

    /// Format as `#rrggbbaa`, the inverse of [`parse_rgba`].
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(...)` and `rgba(...)` strings.
pub fn parse_rgba(value: &str) -> Result<RgbaColor, ColorParseError> {
    let trimmed = value.trim();
    if let Some(hex) = trimmed.strip_prefix('#') {
        return parse_hex(hex, trimmed);
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("rgba(") || lower.starts_with("rgb(") {
        return parse_rgb_call(trimmed);
    }
    Err(ColorParseError::Unrecognized {
        value: trimmed.to_string(),
    })
}

/// Parse a color string, falling back to the provided default on failure.
pub fn parse_rgba_or(value: &str, default: RgbaColor) -> RgbaColor {
    parse_rgba(value).unwrap_or(default)
}

/// Parse straight to a paintable color; see [`parse_rgba`] for the grammar.
pub fn parse_color(value: &str) -> Result<Color32, ColorParseError> {
    parse_rgba(value).map(RgbaColor::to_color32)
}

/// Parse to a paintable color, falling back to the default on failure.
pub fn parse_color_or(value: &str, default: Color32) -> Color32 {
    parse_color(value).unwrap_or(default)
}

fn parse_hex(hex: &str, original: &str) -> Result<RgbaColor, ColorParseError> {
    let invalid = || ColorParseError::InvalidComponent {
        value: original.to_string(),
    };
    let nibble = |c: u8| -> Result<u8, ColorParseError> {
        (c as char).to_digit(16).map(|d| d as u8).ok_or_else(invalid)
    };
    let bytes = hex.as_bytes();
    match bytes.len() {
        3 | 4 => {
            let mut parts = [0u8; 4];
            parts[3] = 255;
            for (i, &b) in bytes.iter().enumerate() {
                let n = nibble(b)?;
                parts[i] = n << 4 | n;
            }
            Ok(RgbaColor::new(parts[0], parts[1], parts[2], parts[3]))
        }
        6 | 8 => {
            let mut parts = [0u8; 4];
            parts[3] = 255;
            for (i, pair) in bytes.chunks_exact(2).enumerate() {
                parts[i] = nibble(pair[0])? << 4 | nibble(pair[1])?;
            }
            Ok(RgbaColor::new(parts[0], parts[1], parts[2], parts[3]))
        }
        _ => Err(ColorParseError::Unrecognized {
            value: original.to_string(),
        }),
    }
}

fn parse_rgb_call(value: &str) -> Result<RgbaColor, ColorParseError> {
    let invalid = || ColorParseError::InvalidComponent {
        value: value.to_string(),
    };
    let open = value.find('(').ok_or_else(invalid)?;
    let close = value.rfind(')').ok_or_else(invalid)?;
    if close <= open {
        return Err(invalid());
    }
    let parts: Vec<&str> = value[open + 1..close].split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(ColorParseError::Unrecognized {
            value: value.to_string(),
        });
    }
    let channel = |s: &str| -> Result<u8, ColorParseError> {
        s.parse::<f32>()
            .map(|v| v.clamp(0.0, 255.0).round() as u8)
            .map_err(|_| invalid())
    };
    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = if parts.len() == 4 {
        parts[3]
            .parse::<f32>()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .map_err(|_| invalid())?
    } else {
        255
    };
    Ok(RgbaColor::new(r, g, b, a))
}

/// Source-over blend of `src` onto `dst`.
///
/// Both colors stay in premultiplied form, where source-over is
/// `dst * (1 - src_a) + src` per channel.
pub fn blend_over(dst: Color32, src: Color32) -> Color32 {
    let sa = src.a();
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }
    let keep = (255 - sa) as u32;
    let mix = |d: u8, s: u8| -> u8 { ((d as u32 * keep + 127) / 255 + s as u32).min(255) as u8 };
    let [dr, dg, db, da] = dst.to_array();
    let [sr, sg, sb, _] = src.to_array();
    Color32::from_rgba_premultiplied(mix(dr, sr), mix(dg, sg), mix(db, sb), mix(da, sa))
}

/// Channel-wise multiply blend, used by the `Multiply` composite operation.
pub fn blend_multiply(dst: Color32, src: Color32) -> Color32 {
    let [sr, sg, sb, sa] = src.to_srgba_unmultiplied();
    if sa == 0 {
        return dst;
    }
    let [dr, dg, db, _] = dst.to_srgba_unmultiplied();
    let mul = |s: u8, d: u8| -> u8 { ((s as u16 * d as u16) / 255) as u8 };
    let blended =
        Color32::from_rgba_unmultiplied(mul(sr, dr), mul(sg, dg), mul(sb, db), sa);
    blend_over(dst, blended)
}

/// Scale a color's opacity by a factor in `0.0..=1.0`.
///
/// Premultiplied opacity scaling multiplies all four channels uniformly.
pub fn apply_opacity(color: Color32, opacity: f32) -> Color32 {
    color.gamma_multiply(opacity.clamp(0.0, 1.0))
}
