//! Canonical print sizes and the label → size resolver.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::VariantConfig;

/// The closed set of print sizes an asset can exist in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalVariant {
    FiveBySeven,
    EightByTen,
    ElevenByFourteen,
    SixteenByTwenty,
    EighteenByTwentyFour,
    TwentyFourByThirtySix,
    ThirtyByForty,
}

impl CanonicalVariant {
    pub const ALL: [CanonicalVariant; 7] = [
        CanonicalVariant::FiveBySeven,
        CanonicalVariant::EightByTen,
        CanonicalVariant::ElevenByFourteen,
        CanonicalVariant::SixteenByTwenty,
        CanonicalVariant::EighteenByTwentyFour,
        CanonicalVariant::TwentyFourByThirtySix,
        CanonicalVariant::ThirtyByForty,
    ];

    /// Token used both for display and as the asset sub-folder name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalVariant::FiveBySeven => "5x7",
            CanonicalVariant::EightByTen => "8x10",
            CanonicalVariant::ElevenByFourteen => "11x14",
            CanonicalVariant::SixteenByTwenty => "16x20",
            CanonicalVariant::EighteenByTwentyFour => "18x24",
            CanonicalVariant::TwentyFourByThirtySix => "24x36",
            CanonicalVariant::ThirtyByForty => "30x40",
        }
    }
}

impl fmt::Display for CanonicalVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown print size '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for CanonicalVariant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CanonicalVariant::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// Outcome of resolving one raw variant label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Canonical(CanonicalVariant),
    /// Explicitly excluded label, e.g. a fee line item. Not a product.
    Skip,
    /// Neither a synonym nor a canonical token. Carries the label as received.
    Unmapped(String),
}

/// Maps free-text variant labels onto [`CanonicalVariant`].
///
/// Matching ignores ASCII case and surrounding whitespace. Exclusions win over
/// synonyms, synonyms win over direct canonical tokens.
#[derive(Debug, Clone)]
pub struct VariantResolver {
    synonyms: HashMap<String, String>,
    skip: Vec<String>,
}

impl Default for VariantResolver {
    fn default() -> Self {
        Self::new(&VariantConfig::default())
    }
}

impl VariantResolver {
    pub fn new(config: &VariantConfig) -> Self {
        Self {
            synonyms: config
                .synonyms
                .iter()
                .map(|(label, token)| (normalise(label), token.clone()))
                .collect(),
            skip: config.skip.iter().map(|label| normalise(label)).collect(),
        }
    }

    pub fn resolve(&self, label: &str) -> Resolution {
        let key = normalise(label);
        if self.skip.iter().any(|s| *s == key) {
            return Resolution::Skip;
        }
        let candidate = self.synonyms.get(&key).map(String::as_str).unwrap_or(label);
        match candidate.parse::<CanonicalVariant>() {
            Ok(variant) => Resolution::Canonical(variant),
            Err(_) => Resolution::Unmapped(label.to_string()),
        }
    }
}

fn normalise(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonyms_map_to_canonical_sizes() {
        let resolver = VariantResolver::default();
        assert_eq!(resolver.resolve("Small"), Resolution::Canonical(CanonicalVariant::FiveBySeven));
        assert_eq!(resolver.resolve("Medium"), Resolution::Canonical(CanonicalVariant::EightByTen));
        assert_eq!(
            resolver.resolve(" large "),
            Resolution::Canonical(CanonicalVariant::ElevenByFourteen)
        );
    }

    #[test]
    fn canonical_tokens_pass_through() {
        let resolver = VariantResolver::default();
        for variant in CanonicalVariant::ALL {
            assert_eq!(resolver.resolve(variant.as_str()), Resolution::Canonical(variant));
        }
        assert_eq!(
            resolver.resolve("16X20"),
            Resolution::Canonical(CanonicalVariant::SixteenByTwenty)
        );
    }

    #[test]
    fn fee_label_is_skipped() {
        let resolver = VariantResolver::default();
        assert_eq!(resolver.resolve("$1.98"), Resolution::Skip);
        assert_eq!(resolver.resolve("  $1.98 "), Resolution::Skip);
    }

    #[test]
    fn anything_else_is_unmapped() {
        let resolver = VariantResolver::default();
        assert_eq!(resolver.resolve("Poster"), Resolution::Unmapped("Poster".into()));
        assert_eq!(resolver.resolve(""), Resolution::Unmapped(String::new()));
        assert_eq!(resolver.resolve("5x7x9"), Resolution::Unmapped("5x7x9".into()));
    }

    #[test]
    fn synonym_pointing_outside_the_enum_is_unmapped() {
        let mut config = VariantConfig::default();
        config.synonyms.insert("Huge".into(), "40x60".into());
        let resolver = VariantResolver::new(&config);
        assert_eq!(resolver.resolve("Huge"), Resolution::Unmapped("Huge".into()));
    }

    #[test]
    fn skip_wins_over_synonym() {
        let mut config = VariantConfig::default();
        config.skip.push("Small".into());
        let resolver = VariantResolver::new(&config);
        assert_eq!(resolver.resolve("small"), Resolution::Skip);
    }
}
