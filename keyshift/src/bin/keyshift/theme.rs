use colored::Color;
use comfy_table::Color as TableColor;
use once_cell::sync::Lazy;

/// Colors shared by messages, help output and tables
pub struct ColorTheme {
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub info: Color,
    pub highlight: Color,
    pub muted: Color,
    pub primary: Color,
    pub secondary: Color,
    pub key: Color,
    pub value: Color,
}

pub static THEME: Lazy<ColorTheme> = Lazy::new(|| ColorTheme {
    success: Color::Green,
    error: Color::Red,
    warning: Color::Yellow,
    info: Color::Blue,
    highlight: Color::Cyan,
    muted: Color::BrightBlack,
    primary: Color::BrightBlue,
    secondary: Color::Magenta,
    key: Color::BrightCyan,
    value: Color::White,
});

pub struct Icons {
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    pub arrow: &'static str,
    pub bullet: &'static str,
    pub loading: &'static str,
    pub clock: &'static str,
}

pub const ICONS: Icons = Icons {
    success: "✓",
    error: "✗",
    warning: "⚠",
    info: "ℹ",
    arrow: "→",
    bullet: "•",
    loading: "⟳",
    clock: "🕐",
};

/// Where a migration stands relative to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerState {
    Applied,
    Pending,
    /// In the ledger but not in the catalog
    Unknown,
}

impl LedgerState {
    pub fn icon(self) -> &'static str {
        match self {
            Self::Applied => "✓",
            Self::Pending => "…",
            Self::Unknown => "?",
        }
    }

    pub fn table_color(self) -> TableColor {
        match self {
            Self::Applied => TableColor::Green,
            Self::Pending => TableColor::Yellow,
            Self::Unknown => TableColor::Red,
        }
    }
}
