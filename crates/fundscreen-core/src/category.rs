//! Sector and industry label cleanup.

use std::sync::LazyLock;

use regex::Regex;

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").expect("camel boundary pattern is valid"));

/// Normalizes a category label such as `REIT—Diversified` or
/// `REITDiversified` into `REIT - Diversified`.
///
/// Applying it twice yields the same result as applying it once.
pub fn normalize_category(raw: &str) -> String {
    let text = raw
        .replace("\u{e2}\u{20ac}\u{201d}", " - ")
        .replace('\u{2014}', " - ")
        .replace("REIT-", "REIT - ");
    CAMEL_BOUNDARY
        .replace_all(&text, "$1 - $2")
        .trim()
        .to_owned()
}

/// Normalizes optional provider text, mapping blank labels to `None`.
pub fn normalize_optional(raw: Option<&str>) -> Option<String> {
    raw.map(normalize_category).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_em_dashes() {
        assert_eq!(normalize_category("REIT—Retail"), "REIT - Retail");
        assert_eq!(
            normalize_category("Banks\u{e2}\u{20ac}\u{201d}Regional"),
            "Banks - Regional"
        );
    }

    #[test]
    fn splits_reit_prefix() {
        assert_eq!(normalize_category("REIT-Office"), "REIT - Office");
    }

    #[test]
    fn splits_camel_case_boundaries() {
        assert_eq!(
            normalize_category("SoftwareApplication"),
            "Software - Application"
        );
    }

    #[test]
    fn leaves_clean_labels_alone() {
        assert_eq!(normalize_category("  Technology "), "Technology");
        assert_eq!(
            normalize_category("Software - Infrastructure"),
            "Software - Infrastructure"
        );
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "REIT—Diversified",
            "REIT-Healthcare Facilities",
            "Oil & Gas E&P",
            "BanksRegional",
            "Banks\u{e2}\u{20ac}\u{201d}Diversified",
            "Drug Manufacturers - General",
            "",
        ];
        for input in inputs {
            let once = normalize_category(input);
            assert_eq!(normalize_category(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn blank_optional_becomes_none() {
        assert_eq!(normalize_optional(Some("   ")), None);
        assert_eq!(normalize_optional(None), None);
        assert_eq!(
            normalize_optional(Some("Technology")).as_deref(),
            Some("Technology")
        );
    }
}
