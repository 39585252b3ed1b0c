//! Waste category table and label resolver.
//!
//! Detector vocabularies are arbitrary. The resolver maps any detection
//! label onto a disposal category using:
//!
//! 1. Case-insensitive exact match against the table keys.
//! 2. Substring match in either direction (key in label, label in key).
//! 3. A synthesized `Unknown` entry naming the original label.
//!
//! The table is built once at start-up and shared read-only.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Coarse disposal classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WasteCategory {
    Recyclable,
    Biodegradable,
    Hazardous,
    SpecialHandling,
    NonRecyclable,
    CheckMaterial,
    Unknown,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 7] = [
        WasteCategory::Recyclable,
        WasteCategory::Biodegradable,
        WasteCategory::Hazardous,
        WasteCategory::SpecialHandling,
        WasteCategory::NonRecyclable,
        WasteCategory::CheckMaterial,
        WasteCategory::Unknown,
    ];

    /// Display string used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            WasteCategory::Recyclable => "Recyclable",
            WasteCategory::Biodegradable => "Biodegradable",
            WasteCategory::Hazardous => "Hazardous",
            WasteCategory::SpecialHandling => "Special Handling",
            WasteCategory::NonRecyclable => "Non-recyclable",
            WasteCategory::CheckMaterial => "Check Material",
            WasteCategory::Unknown => "Unknown",
        }
    }

    fn ident(&self) -> &'static str {
        match self {
            WasteCategory::Recyclable => "recyclable",
            WasteCategory::Biodegradable => "biodegradable",
            WasteCategory::Hazardous => "hazardous",
            WasteCategory::SpecialHandling => "special_handling",
            WasteCategory::NonRecyclable => "non_recyclable",
            WasteCategory::CheckMaterial => "check_material",
            WasteCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WasteCategory {
    type Err = anyhow::Error;

    /// Accepts the display form ("Special Handling") or the identifier
    /// form ("special_handling", "SpecialHandling"), case-insensitively.
    fn from_str(value: &str) -> Result<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(|c| c.to_lowercase())
            .collect();
        WasteCategory::ALL
            .into_iter()
            .find(|category| category.ident().replace('_', "") == normalized)
            .ok_or_else(|| anyhow!("unknown waste category '{}'", value))
    }
}

impl Serialize for WasteCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WasteCategory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WasteCategoryEntry {
    pub canonical_label: String,
    pub category: WasteCategory,
    pub recommendation: String,
}

impl WasteCategoryEntry {
    fn new(label: &str, category: WasteCategory, recommendation: &str) -> Self {
        Self {
            canonical_label: label.to_string(),
            category,
            recommendation: recommendation.to_string(),
        }
    }

    /// The `{ category, recommendation }` record handed to response formatting.
    pub fn output(&self) -> CategoryOutput {
        CategoryOutput {
            category: self.category.as_str().to_string(),
            recommendation: self.recommendation.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryOutput {
    pub category: String,
    pub recommendation: String,
}

const BUILTIN_ENTRIES: &[(&str, WasteCategory, &str)] = &[
    // plastics
    (
        "plastic",
        WasteCategory::Recyclable,
        "Place in recyclable bin. Rinse before disposal.",
    ),
    (
        "plastic-bottle",
        WasteCategory::Recyclable,
        "Remove cap, rinse, and place in plastic recycling bin.",
    ),
    (
        "plastic-bag",
        WasteCategory::Recyclable,
        "Clean and dry. Take to plastic bag recycling drop-off.",
    ),
    (
        "bottle",
        WasteCategory::Recyclable,
        "Rinse and recycle. Check if cap is recyclable separately.",
    ),
    // paper
    (
        "paper",
        WasteCategory::Recyclable,
        "Place in paper recycling bin. Keep dry.",
    ),
    (
        "cardboard",
        WasteCategory::Recyclable,
        "Flatten and place in cardboard recycling. Remove tape/staples.",
    ),
    // metals
    (
        "metal",
        WasteCategory::Recyclable,
        "Rinse and place in metal recycling bin.",
    ),
    (
        "metal-can",
        WasteCategory::Recyclable,
        "Rinse thoroughly and recycle with metals.",
    ),
    (
        "can",
        WasteCategory::Recyclable,
        "Rinse and recycle. Aluminum cans are highly recyclable.",
    ),
    // glass
    (
        "glass",
        WasteCategory::Recyclable,
        "Place in glass recycling bin. Remove caps.",
    ),
    (
        "glass-bottle",
        WasteCategory::Recyclable,
        "Rinse, remove cap, and place in glass recycling.",
    ),
    // organic
    (
        "organic",
        WasteCategory::Biodegradable,
        "Dispose in compost bin or biodegradable waste container.",
    ),
    (
        "food-container",
        WasteCategory::CheckMaterial,
        "Check if plastic, paper, or foam. Rinse before recycling if applicable.",
    ),
    // electronics
    (
        "electronic",
        WasteCategory::Hazardous,
        "Take to e-waste collection center. Do not dispose in regular bins.",
    ),
    (
        "electronic-waste",
        WasteCategory::Hazardous,
        "Take to certified e-waste recycling facility. Contains hazardous materials.",
    ),
    (
        "cellphone",
        WasteCategory::Hazardous,
        "Take to electronics recycling. Remove personal data first. Contains valuable materials.",
    ),
    (
        "cell phone",
        WasteCategory::Hazardous,
        "Take to electronics recycling. Remove personal data first. Contains valuable materials.",
    ),
    (
        "phone",
        WasteCategory::Hazardous,
        "Recycle at electronics collection point. Wipe data before disposal.",
    ),
    (
        "battery",
        WasteCategory::Hazardous,
        "Take to battery recycling center. Never throw in regular trash.",
    ),
    (
        "styrofoam",
        WasteCategory::SpecialHandling,
        "Check local recycling options. Many areas require special drop-off.",
    ),
    // general
    (
        "general",
        WasteCategory::NonRecyclable,
        "Dispose in general waste bin.",
    ),
    (
        "general-waste",
        WasteCategory::NonRecyclable,
        "Dispose in general waste bin.",
    ),
    (
        "trash",
        WasteCategory::NonRecyclable,
        "Dispose in general waste bin.",
    ),
];

#[derive(Debug, Deserialize)]
struct CategoryTableFile {
    #[serde(default)]
    entry: Vec<CategoryEntryFile>,
}

#[derive(Debug, Deserialize)]
struct CategoryEntryFile {
    label: String,
    category: WasteCategory,
    recommendation: String,
}

/// Ordered, immutable label table.
///
/// Entry order is significant: it decides which key wins a substring
/// match under [`MatchPolicy::TableOrder`].
#[derive(Clone, Debug)]
pub struct CategoryTable {
    entries: Vec<WasteCategoryEntry>,
    index: HashMap<String, usize>,
}

impl CategoryTable {
    pub fn builtin() -> Self {
        let entries = BUILTIN_ENTRIES
            .iter()
            .map(|(label, category, recommendation)| {
                WasteCategoryEntry::new(label, *category, recommendation)
            })
            .collect::<Vec<_>>();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.canonical_label.clone(), i))
            .collect();
        Self { entries, index }
    }

    /// Build a table from validated entries, preserving their order.
    pub fn from_entries(entries: Vec<WasteCategoryEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(anyhow!("category table must contain at least one entry"));
        }
        let mut normalized = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());
        for entry in entries {
            let label = entry.canonical_label.trim().to_lowercase();
            if label.is_empty() {
                return Err(anyhow!("category table labels must be non-empty"));
            }
            if entry.category == WasteCategory::Unknown {
                return Err(anyhow!(
                    "label '{}' uses the reserved Unknown category",
                    label
                ));
            }
            if entry.recommendation.trim().is_empty() {
                return Err(anyhow!("label '{}' has an empty recommendation", label));
            }
            if index.insert(label.clone(), normalized.len()).is_some() {
                return Err(anyhow!("duplicate category label '{}'", label));
            }
            normalized.push(WasteCategoryEntry {
                canonical_label: label,
                ..entry
            });
        }
        Ok(Self {
            entries: normalized,
            index,
        })
    }

    /// Parse a TOML table made of `[[entry]]` items.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: CategoryTableFile = toml::from_str(raw)?;
        let entries = file
            .entry
            .into_iter()
            .map(|e| WasteCategoryEntry {
                canonical_label: e.label,
                category: e.category,
                recommendation: e.recommendation,
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read category table {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid category table {}", path.display()))
    }

    pub fn get(&self, label: &str) -> Option<&WasteCategoryEntry> {
        self.index.get(label).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[WasteCategoryEntry] {
        &self.entries
    }

    /// Keys in table order.
    pub fn labels(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|entry| entry.canonical_label.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Tie-break rule for labels that substring-match several keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// First matching key in table order wins.
    #[default]
    TableOrder,
    /// Longest matching key wins; equal lengths fall back to table order.
    LongestKey,
}

impl FromStr for MatchPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "table_order" | "first" => Ok(MatchPolicy::TableOrder),
            "longest_key" | "longest" => Ok(MatchPolicy::LongestKey),
            other => Err(anyhow!("unknown match policy '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MatchKind {
    Exact,
    Partial { key: String },
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub entry: WasteCategoryEntry,
    pub kind: MatchKind,
}

/// Maps detection labels to table entries. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CategoryResolver {
    table: Arc<CategoryTable>,
    policy: MatchPolicy,
}

impl CategoryResolver {
    pub fn new(table: Arc<CategoryTable>, policy: MatchPolicy) -> Self {
        Self { table, policy }
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn resolve(&self, label: &str) -> WasteCategoryEntry {
        self.resolve_match(label).entry
    }

    pub fn resolve_match(&self, label: &str) -> Resolution {
        // An empty needle is a substring of every key; skip matching entirely.
        if label.trim().is_empty() {
            return Resolution {
                entry: WasteCategoryEntry {
                    canonical_label: label.to_string(),
                    category: WasteCategory::Unknown,
                    recommendation:
                        "No label detected. Please verify waste type and dispose accordingly."
                            .to_string(),
                },
                kind: MatchKind::Fallback,
            };
        }

        let lowered = label.to_lowercase();
        if let Some(entry) = self.table.get(&lowered) {
            return Resolution {
                entry: entry.clone(),
                kind: MatchKind::Exact,
            };
        }

        let mut candidates = self.table.entries().iter().filter(|entry| {
            let key = entry.canonical_label.as_str();
            lowered.contains(key) || key.contains(lowered.as_str())
        });
        let partial = match self.policy {
            MatchPolicy::TableOrder => candidates.next(),
            MatchPolicy::LongestKey => {
                candidates.fold(None, |best: Option<&WasteCategoryEntry>, entry| match best {
                    Some(b) if b.canonical_label.len() >= entry.canonical_label.len() => Some(b),
                    _ => Some(entry),
                })
            }
        };
        if let Some(entry) = partial {
            return Resolution {
                entry: entry.clone(),
                kind: MatchKind::Partial {
                    key: entry.canonical_label.clone(),
                },
            };
        }

        Resolution {
            entry: WasteCategoryEntry {
                canonical_label: label.to_string(),
                category: WasteCategory::Unknown,
                recommendation: format!(
                    "Detected as {}. Please verify waste type and dispose accordingly.",
                    label
                ),
            },
            kind: MatchKind::Fallback,
        }
    }
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new(Arc::new(CategoryTable::builtin()), MatchPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(policy: MatchPolicy) -> CategoryResolver {
        CategoryResolver::new(Arc::new(CategoryTable::builtin()), policy)
    }

    #[test]
    fn every_builtin_key_resolves_to_itself() {
        let r = resolver(MatchPolicy::TableOrder);
        for entry in r.table().entries() {
            let upper = entry.canonical_label.to_uppercase();
            let res = r.resolve_match(&upper);
            assert_eq!(res.kind, MatchKind::Exact, "{}", upper);
            assert_eq!(&res.entry, entry);
        }
    }

    #[test]
    fn plastic_bottle_is_recyclable_with_cap_advice() {
        let entry = resolver(MatchPolicy::TableOrder).resolve("Plastic-Bottle");
        assert_eq!(entry.category, WasteCategory::Recyclable);
        assert!(entry.recommendation.contains("recycling bin"));
        assert!(entry.recommendation.contains("cap"));
        assert!(entry.recommendation.contains("rinse"));
    }

    #[test]
    fn bottle_is_distinct_from_plastic_bottle() {
        let r = resolver(MatchPolicy::TableOrder);
        let bottle = r.resolve("bottle");
        let plastic = r.resolve("plastic-bottle");
        assert_eq!(bottle.category, WasteCategory::Recyclable);
        assert_eq!(bottle.canonical_label, "bottle");
        assert_ne!(bottle.recommendation, plastic.recommendation);
    }

    #[test]
    fn unmatched_label_falls_back_with_original_text() {
        let entry = resolver(MatchPolicy::TableOrder).resolve("banana peel");
        assert_eq!(entry.category, WasteCategory::Unknown);
        assert_eq!(
            entry.recommendation,
            "Detected as banana peel. Please verify waste type and dispose accordingly."
        );

        let entry = resolver(MatchPolicy::TableOrder).resolve("Teddy Bear");
        assert!(entry.recommendation.contains("Teddy Bear"));
    }

    #[test]
    fn superstring_takes_first_key_in_table_order() {
        let r = resolver(MatchPolicy::TableOrder);
        // "wine glass bottle" contains "bottle" (index 3) and "glass" (index 9).
        let res = r.resolve_match("wine glass bottle");
        assert_eq!(
            res.kind,
            MatchKind::Partial {
                key: "bottle".to_string()
            }
        );
        // "plastic" precedes "plastic-bottle".
        assert_eq!(r.resolve("dirty plastic-bottle").canonical_label, "plastic");
    }

    #[test]
    fn label_inside_key_matches() {
        let r = resolver(MatchPolicy::TableOrder);
        // "cell" is a substring of "cellphone".
        let res = r.resolve_match("Cell");
        assert_eq!(res.entry.canonical_label, "cellphone");
        assert_eq!(res.entry.category, WasteCategory::Hazardous);
    }

    #[test]
    fn longest_key_policy_prefers_specific_entries() {
        let r = resolver(MatchPolicy::LongestKey);
        assert_eq!(
            r.resolve("dirty plastic-bottle").canonical_label,
            "plastic-bottle"
        );
        assert_eq!(r.resolve("wine glass bottle").canonical_label, "bottle");
    }

    #[test]
    fn longest_key_ties_fall_back_to_table_order() {
        let table = CategoryTable::from_entries(vec![
            WasteCategoryEntry::new("tin", WasteCategory::Recyclable, "Rinse the tin."),
            WasteCategoryEntry::new("jar", WasteCategory::Recyclable, "Rinse the jar."),
        ])
        .unwrap();
        let r = CategoryResolver::new(Arc::new(table), MatchPolicy::LongestKey);
        let res = r.resolve_match("jar tin");
        assert_eq!(
            res.kind,
            MatchKind::Partial {
                key: "tin".to_string()
            }
        );
        assert_eq!(r.resolve("tin jar").canonical_label, "tin");
    }

    #[test]
    fn empty_and_blank_labels_map_to_unknown() {
        let r = resolver(MatchPolicy::TableOrder);
        for label in ["", "   "] {
            let res = r.resolve_match(label);
            assert_eq!(res.kind, MatchKind::Fallback);
            assert_eq!(res.entry.category, WasteCategory::Unknown);
            assert_eq!(
                res.entry.recommendation,
                "No label detected. Please verify waste type and dispose accordingly."
            );
        }
    }

    #[test]
    fn resolution_is_idempotent() {
        let r = resolver(MatchPolicy::TableOrder);
        for label in ["Plastic-Bottle", "banana peel", "", "cup", "Cell Phone"] {
            assert_eq!(r.resolve_match(label), r.resolve_match(label));
        }
    }

    #[test]
    fn category_strings_round_trip() {
        for category in WasteCategory::ALL {
            assert_eq!(category.as_str().parse::<WasteCategory>().unwrap(), category);
        }
        assert_eq!(
            "special_handling".parse::<WasteCategory>().unwrap(),
            WasteCategory::SpecialHandling
        );
        assert_eq!(
            "NonRecyclable".parse::<WasteCategory>().unwrap(),
            WasteCategory::NonRecyclable
        );
        assert!("compost".parse::<WasteCategory>().is_err());
    }

    #[test]
    fn toml_table_preserves_order_and_normalizes_labels() {
        let table = CategoryTable::from_toml_str(
            r#"
            [[entry]]
            label = " Jar "
            category = "Recyclable"
            recommendation = "Rinse the jar."

            [[entry]]
            label = "jam"
            category = "biodegradable"
            recommendation = "Compost."
            "#,
        )
        .unwrap();
        assert_eq!(table.labels(), vec!["jar", "jam"]);
        let r = CategoryResolver::new(Arc::new(table), MatchPolicy::TableOrder);
        assert_eq!(r.resolve("ja").canonical_label, "jar");
        assert_eq!(r.resolve("JAM").category, WasteCategory::Biodegradable);
    }

    #[test]
    fn toml_table_rejects_invalid_entries() {
        let dup = r#"
            [[entry]]
            label = "can"
            category = "Recyclable"
            recommendation = "a"
            [[entry]]
            label = "CAN"
            category = "Recyclable"
            recommendation = "b"
        "#;
        assert!(CategoryTable::from_toml_str(dup).is_err());

        let unknown = r#"
            [[entry]]
            label = "thing"
            category = "Unknown"
            recommendation = "a"
        "#;
        assert!(CategoryTable::from_toml_str(unknown).is_err());

        let blank_label = r#"
            [[entry]]
            label = "   "
            category = "Recyclable"
            recommendation = "a"
        "#;
        let err = CategoryTable::from_toml_str(blank_label).unwrap_err();
        assert!(err.to_string().contains("non-empty"));

        let blank_recommendation = r#"
            [[entry]]
            label = "jar"
            category = "Recyclable"
            recommendation = "  "
        "#;
        let err = CategoryTable::from_toml_str(blank_recommendation).unwrap_err();
        assert!(err.to_string().contains("empty recommendation"));

        assert!(CategoryTable::from_toml_str("").is_err());
    }

    #[test]
    fn output_uses_display_strings() {
        let out = resolver(MatchPolicy::TableOrder).resolve("styrofoam").output();
        assert_eq!(out.category, "Special Handling");
        let out = resolver(MatchPolicy::TableOrder).resolve("trash").output();
        assert_eq!(out.category, "Non-recyclable");
    }
}
