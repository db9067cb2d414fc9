//! Category label sets for the five demographic variables.
//!
//! Every component addresses categories by index into a `LabelSet`; the labels
//! themselves only matter at ingest and export time.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SynthError;

pub const DEFAULT_SIZE_LABELS: [&str; 7] = ["1", "2", "3", "4", "5", "6", "7+"];
pub const DEFAULT_AGE_LABELS: [&str; 7] = ["<25", "25-34", "35-44", "45-54", "55-64", "65-74", ">=75"];
pub const DEFAULT_INCOME_LABELS: [&str; 7] = [
    "<10k", "10k-15k", "15k-25k", "25k-35k", "35k-50k", "50k-100k", ">100k",
];
pub const DEFAULT_RACE_LABELS: [&str; 5] = ["white", "black", "asian", "other", "twoplusraces"];
pub const DEFAULT_ETHNICITY_LABELS: [&str; 2] = ["hispanic", "not_hispanic"];

/// A categorical demographic dimension.
///
/// The declaration order is the canonical axis order of every joint table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variable {
    Size,
    Age,
    Income,
    Race,
    Ethnicity,
}

impl Variable {
    pub const ALL: [Variable; 5] = [
        Variable::Size,
        Variable::Age,
        Variable::Income,
        Variable::Race,
        Variable::Ethnicity,
    ];

    pub const COUNT: usize = 5;

    /// Axis of this variable in a joint table / `CategoryCombo`.
    pub fn axis(self) -> usize {
        match self {
            Variable::Size => 0,
            Variable::Age => 1,
            Variable::Income => 2,
            Variable::Race => 3,
            Variable::Ethnicity => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variable::Size => "size",
            Variable::Age => "age",
            Variable::Income => "income",
            Variable::Race => "race",
            Variable::Ethnicity => "ethnicity",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Variable::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One category index per variable, in `Variable::ALL` order.
pub type CategoryCombo = [usize; Variable::COUNT];

/// The fixed list of category labels for one variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    variable: Variable,
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(variable: Variable, labels: Vec<String>) -> Result<Self, SynthError> {
        if labels.is_empty() {
            return Err(SynthError::Config(format!("label set for `{variable}` is empty")));
        }
        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(SynthError::Config(format!(
                    "duplicate label `{label}` for `{variable}`"
                )));
            }
        }
        Ok(Self { variable, labels })
    }

    pub fn variable(&self) -> Variable {
        self.variable
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, idx: usize) -> &str {
        &self.labels[idx]
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.labels.iter().position(|l| l == label)
    }

    /// Neighbourhood of `idx`: the category itself plus one on each side.
    ///
    /// The window keeps a fixed width of three at the ends of the list, so the
    /// first category expands to `[0, 1, 2]` and the last to `[L-3, L-2, L-1]`.
    /// Sets with fewer than three categories expand to every category.
    pub fn expand(&self, idx: usize) -> Vec<usize> {
        debug_assert!(idx < self.len(), "category index out of range");
        let len = self.len();
        if len < 3 {
            return (0..len).collect();
        }
        let start = if idx == 0 {
            0
        } else if idx == len - 1 {
            len - 3
        } else {
            idx - 1
        };
        (start..start + 3).collect()
    }
}

/// Label sets for all five variables, shared read-only by every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryScheme {
    sets: [LabelSet; Variable::COUNT],
}

impl CategoryScheme {
    pub fn new(sets: [LabelSet; Variable::COUNT]) -> Result<Self, SynthError> {
        for (set, variable) in sets.iter().zip(Variable::ALL) {
            if set.variable() != variable {
                return Err(SynthError::Config(format!(
                    "label set for `{}` supplied in the `{variable}` slot",
                    set.variable()
                )));
            }
        }
        Ok(Self { sets })
    }

    /// Build a scheme from plain label lists (one per variable, canonical order).
    pub fn from_labels(labels: [Vec<String>; Variable::COUNT]) -> Result<Self, SynthError> {
        let [size, age, income, race, ethnicity] = labels;
        Self::new([
            LabelSet::new(Variable::Size, size)?,
            LabelSet::new(Variable::Age, age)?,
            LabelSet::new(Variable::Income, income)?,
            LabelSet::new(Variable::Race, race)?,
            LabelSet::new(Variable::Ethnicity, ethnicity)?,
        ])
    }

    pub fn get(&self, variable: Variable) -> &LabelSet {
        &self.sets[variable.axis()]
    }

    pub fn shape(&self) -> [usize; Variable::COUNT] {
        Variable::ALL.map(|v| self.get(v).len())
    }

    /// Number of cells in the full category cross-product.
    pub fn cell_count(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn combo_labels(&self, combo: &CategoryCombo) -> [&str; Variable::COUNT] {
        Variable::ALL.map(|v| self.get(v).label(combo[v.axis()]))
    }

    /// Resolve one label per variable into a `CategoryCombo`.
    pub fn parse_combo(&self, labels: [&str; Variable::COUNT]) -> Result<CategoryCombo, String> {
        let mut combo = [0usize; Variable::COUNT];
        for variable in Variable::ALL {
            let raw = labels[variable.axis()];
            combo[variable.axis()] = self
                .get(variable)
                .index_of(raw)
                .ok_or_else(|| format!("unknown `{variable}` category `{raw}`"))?;
        }
        Ok(combo)
    }
}

impl Default for CategoryScheme {
    fn default() -> Self {
        let owned = |labels: &[&str]| labels.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            sets: [
                LabelSet {
                    variable: Variable::Size,
                    labels: owned(&DEFAULT_SIZE_LABELS),
                },
                LabelSet {
                    variable: Variable::Age,
                    labels: owned(&DEFAULT_AGE_LABELS),
                },
                LabelSet {
                    variable: Variable::Income,
                    labels: owned(&DEFAULT_INCOME_LABELS),
                },
                LabelSet {
                    variable: Variable::Race,
                    labels: owned(&DEFAULT_RACE_LABELS),
                },
                LabelSet {
                    variable: Variable::Ethnicity,
                    labels: owned(&DEFAULT_ETHNICITY_LABELS),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_set() -> LabelSet {
        CategoryScheme::default().get(Variable::Size).clone()
    }

    #[test]
    fn expand_uses_fixed_width_window_at_boundaries() {
        let sizes = size_set();
        assert_eq!(sizes.expand(0), vec![0, 1, 2]);
        assert_eq!(sizes.expand(6), vec![4, 5, 6]);
        assert_eq!(sizes.expand(2), vec![1, 2, 3]);

        let three = sizes.expand(sizes.index_of("3").unwrap());
        let labels: Vec<&str> = three.iter().map(|&i| sizes.label(i)).collect();
        assert_eq!(labels, vec!["2", "3", "4"]);
    }

    #[test]
    fn expand_short_sets_cover_everything() {
        let eth = CategoryScheme::default().get(Variable::Ethnicity).clone();
        assert_eq!(eth.expand(0), vec![0, 1]);
        assert_eq!(eth.expand(1), vec![0, 1]);
    }

    #[test]
    fn label_set_rejects_duplicates_and_empties() {
        assert!(LabelSet::new(Variable::Race, vec![]).is_err());
        assert!(LabelSet::new(Variable::Race, vec!["a".into(), "a".into()]).is_err());
    }

    #[test]
    fn scheme_rejects_misplaced_sets() {
        let d = CategoryScheme::default();
        let sets = [
            d.get(Variable::Age).clone(),
            d.get(Variable::Size).clone(),
            d.get(Variable::Income).clone(),
            d.get(Variable::Race).clone(),
            d.get(Variable::Ethnicity).clone(),
        ];
        assert!(CategoryScheme::new(sets).is_err());
    }

    #[test]
    fn parse_combo_round_trips_labels() {
        let scheme = CategoryScheme::default();
        let combo = scheme
            .parse_combo(["3", "35-44", ">100k", "asian", "hispanic"])
            .unwrap();
        assert_eq!(combo, [2, 2, 6, 2, 0]);
        assert_eq!(
            scheme.combo_labels(&combo),
            ["3", "35-44", ">100k", "asian", "hispanic"]
        );
        assert!(scheme.parse_combo(["9", "35-44", ">100k", "asian", "hispanic"]).is_err());
        assert_eq!(scheme.cell_count(), 7 * 7 * 7 * 5 * 2);
    }

    #[test]
    fn variable_parse_is_case_insensitive() {
        assert_eq!(Variable::parse(" Income "), Some(Variable::Income));
        assert_eq!(Variable::parse("tenure"), None);
    }
}
