//! Response locale.

use serde::{Deserialize, Serialize};

/// Languages the assistant answers in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Vi,
    En,
    Zh,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::Vi, Locale::En, Locale::Zh];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Vi => "vi",
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    /// Parse a locale tag such as `en`, `EN`, or `vi-VN`.
    pub fn parse(tag: &str) -> Option<Self> {
        let primary = tag.trim().split(['-', '_']).next().unwrap_or_default();
        match primary.to_ascii_lowercase().as_str() {
            "vi" => Some(Self::Vi),
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }

    /// Parse, falling back to `default` on unknown or empty tags.
    pub fn parse_or(tag: &str, default: Locale) -> Self {
        Self::parse(tag).unwrap_or(default)
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
