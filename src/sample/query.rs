//! Structured match queries and the relaxation state threaded through the ladder.
//!
//! A query holds at most one constraint per variable (`None` = eliminated) plus an
//! optional region restriction. The escalation state is an immutable value: each
//! ladder step derives a new state from the previous one, so no query state is
//! ever shared between cells.

use crate::domain::{CategoryCombo, MicrodataRecord, RegionId, Variable};

/// Variables widened to their three-category neighbourhood, in order.
pub const EXPANSION_ORDER: [Variable; 3] = [Variable::Size, Variable::Age, Variable::Income];

/// Variables dropped from the query, in order (applied on top of all expansions).
pub const ELIMINATION_ORDER: [Variable; 3] = [Variable::Ethnicity, Variable::Age, Variable::Income];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Exact(usize),
    AnyOf(Vec<usize>),
}

impl Constraint {
    pub fn accepts(&self, category: usize) -> bool {
        match self {
            Constraint::Exact(c) => *c == category,
            Constraint::AnyOf(set) => set.contains(&category),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    constraints: [Option<Constraint>; Variable::COUNT],
    region: Option<RegionId>,
}

impl MatchQuery {
    /// Exact match on every variable.
    pub fn exact(combo: &CategoryCombo, region: Option<RegionId>) -> Self {
        Self {
            constraints: combo.map(|c| Some(Constraint::Exact(c))),
            region,
        }
    }

    pub fn constraint(&self, variable: Variable) -> Option<&Constraint> {
        self.constraints[variable.axis()].as_ref()
    }

    /// Region restriction (`None` = state-wide).
    pub fn region(&self) -> Option<&RegionId> {
        self.region.as_ref()
    }

    pub fn matches(&self, record: &MicrodataRecord) -> bool {
        if let Some(region) = &self.region {
            if &record.region != region {
                return false;
            }
        }
        Variable::ALL.iter().all(|&v| match self.constraint(v) {
            Some(constraint) => constraint.accepts(record.category(v)),
            None => true,
        })
    }
}

/// Accumulated relaxations: expansions (variable → candidate set) and eliminations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationState {
    expanded: Vec<(Variable, Vec<usize>)>,
    eliminated: Vec<Variable>,
}

impl EscalationState {
    pub fn with_expanded(&self, variable: Variable, candidates: Vec<usize>) -> Self {
        let mut next = self.clone();
        next.expanded.retain(|(v, _)| *v != variable);
        next.expanded.push((variable, candidates));
        next
    }

    pub fn with_eliminated(&self, variable: Variable) -> Self {
        let mut next = self.clone();
        if !next.eliminated.contains(&variable) {
            next.eliminated.push(variable);
        }
        next
    }

    pub fn expanded_variables(&self) -> Vec<Variable> {
        self.expanded.iter().map(|(v, _)| *v).collect()
    }

    pub fn eliminated_variables(&self) -> &[Variable] {
        &self.eliminated
    }

    /// Query for `combo` with every relaxation applied.
    pub fn query(&self, combo: &CategoryCombo, region: Option<RegionId>) -> MatchQuery {
        let mut query = MatchQuery::exact(combo, region);
        for (variable, candidates) in &self.expanded {
            query.constraints[variable.axis()] = Some(Constraint::AnyOf(candidates.clone()));
        }
        for variable in &self.eliminated {
            query.constraints[variable.axis()] = None;
        }
        query
    }
}

/// Which rung of the ladder produced a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Exact,
    StateExact,
    Expanded,
    Eliminated,
}

/// Audit descriptor for how far a cell's match criteria were relaxed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relaxation {
    pub stage: Stage,
    pub expanded: Vec<Variable>,
    pub eliminated: Vec<Variable>,
    /// Region restriction dropped; draws are weighted by region similarity.
    pub state_wide: bool,
}

impl Relaxation {
    pub fn none() -> Self {
        Self {
            stage: Stage::Exact,
            expanded: Vec::new(),
            eliminated: Vec::new(),
            state_wide: false,
        }
    }

    pub fn from_state(stage: Stage, state: &EscalationState, state_wide: bool) -> Self {
        Self {
            stage,
            expanded: state.expanded_variables(),
            eliminated: state.eliminated_variables().to_vec(),
            state_wide,
        }
    }
}

impl std::fmt::Display for Relaxation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |vars: &[Variable]| {
            vars.iter()
                .map(|v| v.name())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut parts = Vec::new();
        if !self.expanded.is_empty() {
            parts.push(format!("{} expanded.", join(&self.expanded)));
        }
        if !self.eliminated.is_empty() {
            parts.push(format!("{} eliminated.", join(&self.eliminated)));
        }
        if self.state_wide {
            parts.push("state weights added.".to_string());
        }
        if parts.is_empty() {
            return f.write_str("None.");
        }
        f.write_str(&parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(region: &str, combo: CategoryCombo) -> MicrodataRecord {
        MicrodataRecord {
            serial_no: "S".to_string(),
            region: RegionId::new(region),
            combo,
        }
    }

    #[test]
    fn exact_query_checks_region_and_all_variables() {
        let q = MatchQuery::exact(&[2, 1, 0, 3, 1], Some(RegionId::new("P1")));
        assert!(q.matches(&record("P1", [2, 1, 0, 3, 1])));
        assert!(!q.matches(&record("P2", [2, 1, 0, 3, 1])));
        assert!(!q.matches(&record("P1", [2, 1, 0, 3, 0])));
    }

    #[test]
    fn state_applies_expansions_then_eliminations() {
        let state = EscalationState::default()
            .with_expanded(Variable::Size, vec![1, 2, 3])
            .with_expanded(Variable::Age, vec![0, 1, 2])
            .with_eliminated(Variable::Ethnicity)
            .with_eliminated(Variable::Age);
        let q = state.query(&[2, 1, 0, 3, 1], None);

        assert_eq!(q.constraint(Variable::Size), Some(&Constraint::AnyOf(vec![1, 2, 3])));
        assert_eq!(q.constraint(Variable::Age), None);
        assert_eq!(q.constraint(Variable::Income), Some(&Constraint::Exact(0)));
        assert_eq!(q.constraint(Variable::Ethnicity), None);
        assert!(q.region().is_none());
        assert!(q.matches(&record("P9", [3, 6, 0, 3, 0])));
        assert!(!q.matches(&record("P9", [4, 6, 0, 3, 0])));
    }

    #[test]
    fn states_are_values() {
        let base = EscalationState::default();
        let expanded = base.with_expanded(Variable::Size, vec![0, 1, 2]);
        assert!(base.expanded_variables().is_empty());
        assert_eq!(expanded.expanded_variables(), vec![Variable::Size]);
    }

    #[test]
    fn descriptors_read_like_audit_notes() {
        assert_eq!(Relaxation::none().to_string(), "None.");

        let state = EscalationState::default().with_expanded(Variable::Size, vec![1, 2, 3]);
        assert_eq!(
            Relaxation::from_state(Stage::Expanded, &state, false).to_string(),
            "size expanded."
        );
        assert_eq!(
            Relaxation::from_state(Stage::Expanded, &state, true).to_string(),
            "size expanded. state weights added."
        );

        let state = EscalationState::default()
            .with_expanded(Variable::Size, vec![1, 2, 3])
            .with_expanded(Variable::Age, vec![1, 2, 3])
            .with_expanded(Variable::Income, vec![1, 2, 3])
            .with_eliminated(Variable::Ethnicity)
            .with_eliminated(Variable::Age);
        assert_eq!(
            Relaxation::from_state(Stage::Eliminated, &state, true).to_string(),
            "size, age, income expanded. ethnicity, age eliminated. state weights added."
        );
        assert_eq!(
            Relaxation::from_state(Stage::StateExact, &EscalationState::default(), true).to_string(),
            "state weights added."
        );
    }
}
