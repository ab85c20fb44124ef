//! Terminal color snapshots stored with history records.
//!
//! Log excerpts may contain color escapes produced under the theme that was
//! active when the release ran. The snapshot records the exact escape prefix
//! of each semantic color so excerpts can be remapped to the current theme
//! when they are shown later.

use serde::{Deserialize, Serialize};
use termcolor::{Ansi, Color, ColorSpec, WriteColor};

/// Semantic theme colors as `#RRGGBB` strings (empty = no color)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColors {
    /// Accent
    pub accent: String,
    /// Default text
    pub foreground: String,
    /// Success
    pub success: String,
    /// Warning
    pub warning: String,
    /// Error
    pub error: String,
}

impl Default for ThemeColors {
    /// The indigo theme
    fn default() -> Self {
        Self {
            accent: "#5F5FDF".to_string(),
            foreground: "#D7D7FF".to_string(),
            success: "#00D588".to_string(),
            warning: "#FFD600".to_string(),
            error: "#FF84A8".to_string(),
        }
    }
}

impl ThemeColors {
    /// Resolve configured values against the default theme.
    ///
    /// Invalid or missing values fall back to the default; `transparent`
    /// explicitly disables the color.
    pub fn resolve(configured: &ThemeOverrides) -> Self {
        let defaults = Self::default();
        Self {
            accent: resolve_color(configured.accent.as_deref(), &defaults.accent),
            foreground: resolve_color(configured.foreground.as_deref(), &defaults.foreground),
            success: resolve_color(configured.success.as_deref(), &defaults.success),
            warning: resolve_color(configured.warning.as_deref(), &defaults.warning),
            error: resolve_color(configured.error.as_deref(), &defaults.error),
        }
    }
}

/// Partially configured theme as read from the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeOverrides {
    /// Accent
    pub accent: Option<String>,
    /// Default text
    pub foreground: Option<String>,
    /// Success
    pub success: Option<String>,
    /// Warning
    pub warning: Option<String>,
    /// Error
    pub error: Option<String>,
}

/// Escape prefixes of the semantic colors at record time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColorSnapshot {
    /// Accent escape
    pub accent: String,
    /// Foreground escape
    pub foreground: String,
    /// Success escape
    pub success: String,
    /// Warning escape
    pub warning: String,
    /// Error escape
    pub error: String,
}

impl ThemeColorSnapshot {
    /// Capture the escapes the terminal writer emits for `colors`
    pub fn capture(colors: &ThemeColors) -> Self {
        Self {
            accent: capture_foreground(&colors.accent),
            foreground: capture_foreground(&colors.foreground),
            success: capture_foreground(&colors.success),
            warning: capture_foreground(&colors.warning),
            error: capture_foreground(&colors.error),
        }
    }

    fn pairs(&self) -> [&str; 5] {
        [
            self.accent.as_str(),
            self.foreground.as_str(),
            self.success.as_str(),
            self.warning.as_str(),
            self.error.as_str(),
        ]
    }
}

impl Default for ThemeColorSnapshot {
    fn default() -> Self {
        Self::capture(&ThemeColors::default())
    }
}

/// Replace `from`'s color escapes in `text` with the matching ones of `to`
pub fn recolor(text: &str, from: &ThemeColorSnapshot, to: &ThemeColorSnapshot) -> String {
    if from == to {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    'scan: while !rest.is_empty() {
        for (old, new) in from.pairs().into_iter().zip(to.pairs()) {
            if !old.is_empty()
                && let Some(tail) = rest.strip_prefix(old)
            {
                out.push_str(new);
                rest = tail;
                continue 'scan;
            }
        }
        // Advance one character; escapes start with ESC so no match is split.
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// ANSI escape prefix for a `#RRGGBB` foreground, or "" for no color
fn capture_foreground(hex: &str) -> String {
    let Some((r, g, b)) = parse_hex_color(hex) else {
        return String::new();
    };

    let mut spec = ColorSpec::new();
    spec.set_reset(false).set_fg(Some(Color::Rgb(r, g, b)));

    let mut writer = Ansi::new(Vec::new());
    if writer.set_color(&spec).is_err() {
        return String::new();
    }
    String::from_utf8(writer.into_inner()).unwrap_or_default()
}

/// Terminal color for a `#RRGGBB` value, `None` for empty or invalid values
pub fn theme_color(hex: &str) -> Option<Color> {
    parse_hex_color(hex).map(|(r, g, b)| Color::Rgb(r, g, b))
}

fn resolve_color(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("transparent") => String::new(),
        Some(v) if parse_hex_color(v).is_some() => v.to_string(),
        _ => fallback.to_string(),
    }
}

fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}
