use thiserror::Error;

/// Text colour used on bright tiles
pub const DARK_TEXT: &str = "#333333";
/// Text colour used on dark tiles
pub const LIGHT_TEXT: &str = "#ffffff";

/// YIQ threshold, scaled by 1000 to keep the comparison in integers
const YIQ_THRESHOLD_MILLI: u32 = 128 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColourError {
    #[error("invalid colour {0:?}: expected 3 or 6 hex digits")]
    InvalidColour(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn to_hex(self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Reduce a colour string to six lowercase hex digits.
///
/// One leading `#` is stripped and three-digit shorthand is expanded
/// (`f0a` becomes `ff00aa`). Any other length, including the four and eight
/// digit alpha forms, is rejected.
pub fn normalize_hex(input: &str) -> Result<String, ColourError> {
    let digits = input.strip_prefix('#').unwrap_or(input);

    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ColourError::InvalidColour(input.to_string()));
    }

    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return Err(ColourError::InvalidColour(input.to_string())),
    };

    Ok(expanded.to_ascii_lowercase())
}

/// Parse a colour string into its three 8-bit channels.
pub fn parse_hex(input: &str) -> Result<Rgb, ColourError> {
    let hex = normalize_hex(input)?;
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| ColourError::InvalidColour(input.to_string()))
    };

    Ok(Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

/// YIQ luminance, `(299r + 587g + 114b) / 1000`
pub fn yiq(rgb: Rgb) -> f64 {
    f64::from(yiq_milli(rgb)) / 1000.0
}

fn yiq_milli(rgb: Rgb) -> u32 {
    299 * u32::from(rgb.r) + 587 * u32::from(rgb.g) + 114 * u32::from(rgb.b)
}

/// Pick a readable text colour for the given background.
pub fn contrast_text_colour(rgb: Rgb) -> &'static str {
    if yiq_milli(rgb) >= YIQ_THRESHOLD_MILLI {
        DARK_TEXT
    } else {
        LIGHT_TEXT
    }
}

/// Normalize then evaluate contrast in one step.
pub fn text_colour_for(hex: &str) -> Result<&'static str, ColourError> {
    parse_hex(hex).map(contrast_text_colour)
}
