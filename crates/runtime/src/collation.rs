//! String collations used by grouping keys and sort keys.

use crate::error::DeclarationError;
use std::cmp::Ordering;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

pub const CODEPOINT_COLLATION: &str =
    "http://www.w3.org/2005/xpath-functions/collation/codepoint";
pub const HTML_ASCII_CASE_INSENSITIVE_COLLATION: &str =
    "http://www.w3.org/2005/xpath-functions/collation/html-ascii-case-insensitive";
pub const UCA_COLLATION: &str = "http://www.w3.org/2013/collation/UCA";

/// How many levels of difference a UCA collation distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    /// Base letters only.
    Primary,
    /// Base letters and accents.
    Secondary,
    /// Base letters, accents and case.
    Tertiary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Collation {
    #[default]
    Codepoint,
    HtmlAsciiCaseInsensitive,
    Uca(Strength),
}

impl Collation {
    pub fn from_uri(uri: &str) -> Result<Self, DeclarationError> {
        match uri {
            CODEPOINT_COLLATION => return Ok(Collation::Codepoint),
            HTML_ASCII_CASE_INSENSITIVE_COLLATION => return Ok(Collation::HtmlAsciiCaseInsensitive),
            _ => {}
        }
        let unknown = || DeclarationError::UnknownCollation(uri.to_string());
        let query = match uri.strip_prefix(UCA_COLLATION) {
            Some("") => return Ok(Collation::Uca(Strength::Tertiary)),
            Some(rest) => rest.strip_prefix('?').ok_or_else(unknown)?,
            None => return Err(unknown()),
        };
        let mut strength = Strength::Tertiary;
        for param in query.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = param.split_once('=').ok_or_else(unknown)?;
            if key == "strength" {
                strength = match value {
                    "primary" | "1" => Strength::Primary,
                    "secondary" | "2" => Strength::Secondary,
                    "tertiary" | "3" | "quaternary" | "4" | "identical" | "5" => {
                        Strength::Tertiary
                    }
                    _ => return Err(unknown()),
                };
            }
        }
        Ok(Collation::Uca(strength))
    }

    /// A key such that two strings are equal under this collation exactly when their keys
    /// are equal, and order like their keys.
    pub fn key(&self, s: &str) -> String {
        match self {
            Collation::Codepoint => s.to_string(),
            Collation::HtmlAsciiCaseInsensitive => s.to_ascii_lowercase(),
            Collation::Uca(Strength::Primary) => s
                .nfd()
                .filter(|c| !is_combining_mark(*c))
                .flat_map(char::to_lowercase)
                .collect(),
            Collation::Uca(Strength::Secondary) => s.nfd().flat_map(char::to_lowercase).collect(),
            Collation::Uca(Strength::Tertiary) => s.nfc().collect(),
        }
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Collation::Codepoint => a.cmp(b),
            _ => self.key(a).cmp(&self.key(b)),
        }
    }

    /// True when the collation ignores case, which is when `case-order` has an effect.
    pub fn folds_case(&self) -> bool {
        matches!(
            self,
            Collation::HtmlAsciiCaseInsensitive
                | Collation::Uca(Strength::Primary)
                | Collation::Uca(Strength::Secondary)
        )
    }
}
