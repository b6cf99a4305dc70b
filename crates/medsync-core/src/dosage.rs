//! Free-text dosage parsing, medication name normalization and dosage
//! compatibility.
//!
//! There is no unit conversion or unit-alias table: "500mg" and "0.5g" are
//! different dosages, and so are "mg" and "milligrams".

use std::sync::LazyLock;

use regex::Regex;

/// Relative band within which two numeric dosages are considered the same.
pub const DOSAGE_TOLERANCE: f64 = 0.2;

static DOSAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*([a-zA-Z]+)").expect("dosage pattern is a valid regex")
});

/// Numeric quantity and unit token pulled out of a dosage string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DosageComponents {
    pub value: Option<f64>,
    /// Lower-cased unit token.
    pub unit: Option<String>,
}

impl DosageComponents {
    /// Parses the first `<number><optional space><letters>` pair in `dosage`.
    ///
    /// Only the first pair is used, so "1 tablet, 50mg" parses as `1 tablet`.
    /// A string without such a pair yields empty components.
    ///
    /// # Examples
    ///
    /// ```
    /// use medsync_core::dosage::DosageComponents;
    ///
    /// let parsed = DosageComponents::parse("Take 12.5 MG daily");
    /// assert_eq!(parsed.value, Some(12.5));
    /// assert_eq!(parsed.unit.as_deref(), Some("mg"));
    ///
    /// assert_eq!(DosageComponents::parse("as needed"), DosageComponents::default());
    /// ```
    pub fn parse(dosage: &str) -> Self {
        let Some(caps) = DOSAGE_PATTERN.captures(dosage) else {
            return Self::default();
        };

        Self {
            value: caps[1].parse::<f64>().ok(),
            unit: Some(caps[2].to_lowercase()),
        }
    }
}

/// Canonical form of a medication name used as the matching key.
///
/// Lower-cases the name and strips spaces, hyphens and periods. Nothing else
/// is folded.
///
/// ```
/// use medsync_core::dosage::normalize_name;
///
/// assert_eq!(normalize_name("Lisinopril-10"), "lisinopril10");
/// assert_eq!(normalize_name("Vit. D 3"), "vitd3");
/// ```
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .collect()
}

/// Decides whether an app dosage and an external dosage denote the same treatment.
///
/// When both strings carry a number, the external value must fall within
/// 20% of the app value (inclusive) and the unit tokens must be identical.
/// A zero app value therefore requires exact equality. Otherwise the two
/// strings are compared after [`normalize_name`].
pub fn dosages_compatible(app_dosage: &str, external_dosage: &str) -> bool {
    let app = DosageComponents::parse(app_dosage);
    let external = DosageComponents::parse(external_dosage);

    if let (Some(app_value), Some(external_value)) = (app.value, external.value) {
        let tolerance = app_value * DOSAGE_TOLERANCE;
        return (app_value - external_value).abs() <= tolerance && app.unit == external.unit;
    }

    normalize_name(app_dosage) == normalize_name(external_dosage)
}
