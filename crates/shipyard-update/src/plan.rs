//! Plan structure queries.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, UpdateError};
use crate::types::{Phase, PhaseState, Plan};

impl Plan {
    /// Look up a phase by ID.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::PhaseNotFound` if no such phase exists.
    pub fn phase(&self, id: &str) -> Result<&Phase> {
        self.phases
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| UpdateError::PhaseNotFound(id.to_string()))
    }

    /// Look up a phase by ID for modification.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::PhaseNotFound` if no such phase exists.
    pub fn phase_mut(&mut self, id: &str) -> Result<&mut Phase> {
        self.phases
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| UpdateError::PhaseNotFound(id.to_string()))
    }

    /// Check the plan's structure: unique IDs, known dependencies, no cycles.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect found.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for phase in &self.phases {
            if !ids.insert(phase.id.as_str()) {
                return Err(UpdateError::DuplicatePhase(phase.id.clone()));
            }
        }
        for phase in &self.phases {
            if let Some(dependency) = phase.requires.iter().find(|d| !ids.contains(d.as_str())) {
                return Err(UpdateError::UnknownDependency {
                    phase: phase.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Phase IDs ordered so that every phase follows its dependencies.
    ///
    /// Independent phases keep their plan order.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::DependencyCycle` naming the phases on or behind a
    /// cycle.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut remaining: HashMap<&str, usize> = self
            .phases
            .iter()
            .map(|p| {
                let unique: HashSet<&str> = p.requires.iter().map(String::as_str).collect();
                (p.id.as_str(), unique.len())
            })
            .collect();
        let mut order = Vec::with_capacity(self.phases.len());

        loop {
            let ready: Vec<&str> = self
                .phases
                .iter()
                .map(|p| p.id.as_str())
                .filter(|id| remaining.get(id) == Some(&0))
                .collect();
            if ready.is_empty() {
                break;
            }
            for id in ready {
                remaining.remove(id);
                order.push(id.to_string());
                for dependent in self.phases.iter().filter(|p| p.requires.iter().any(|d| d == id)) {
                    if let Some(count) = remaining.get_mut(dependent.id.as_str()) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }

        if remaining.is_empty() {
            Ok(order)
        } else {
            let mut stuck: Vec<String> = remaining.into_keys().map(ToString::to_string).collect();
            stuck.sort();
            Err(UpdateError::DependencyCycle(stuck))
        }
    }

    /// Phases that directly require `id`.
    pub fn dependents<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Phase> + 'a {
        self.phases
            .iter()
            .filter(move |p| p.requires.iter().any(|d| d == id))
    }

    /// Dependencies of `phase` that have not completed.
    ///
    /// Unknown dependencies count as not completed.
    #[must_use]
    pub fn pending_dependencies(&self, phase: &Phase) -> Vec<String> {
        phase
            .requires
            .iter()
            .filter(|d| {
                self.phase(d)
                    .map_or(true, |dep| dep.state != PhaseState::Completed)
            })
            .cloned()
            .collect()
    }

    /// Pending phases whose dependencies have all completed, in plan order.
    #[must_use]
    pub fn runnable_phases(&self) -> Vec<String> {
        self.phases
            .iter()
            .filter(|p| p.state == PhaseState::Pending && self.pending_dependencies(p).is_empty())
            .map(|p| p.id.clone())
            .collect()
    }

    /// IDs of phases in `state`, in plan order.
    #[must_use]
    pub fn phases_in(&self, state: PhaseState) -> Vec<String> {
        self.phases
            .iter()
            .filter(|p| p.state == state)
            .map(|p| p.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationType;

    fn plan(phases: Vec<Phase>) -> Plan {
        Plan {
            operation_id: "op".into(),
            operation_type: OperationType::Update,
            cluster_name: "test".into(),
            servers: vec![],
            phases,
        }
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let p = plan(vec![
            Phase::new("c", "x").after("b"),
            Phase::new("a", "x"),
            Phase::new("b", "x").after("a"),
            Phase::new("d", "x"),
        ]);

        assert_eq!(p.topological_order().unwrap(), vec!["a", "d", "b", "c"]);
        p.validate().unwrap();
    }

    #[test]
    fn validate_rejects_defects() {
        let duplicate = plan(vec![Phase::new("a", "x"), Phase::new("a", "y")]);
        assert!(matches!(duplicate.validate(), Err(UpdateError::DuplicatePhase(id)) if id == "a"));

        let unknown = plan(vec![Phase::new("a", "x").after("ghost")]);
        assert!(matches!(
            unknown.validate(),
            Err(UpdateError::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));

        let cycle = plan(vec![
            Phase::new("a", "x").after("b"),
            Phase::new("b", "x").after("a"),
            Phase::new("c", "x"),
        ]);
        assert!(matches!(
            cycle.validate(),
            Err(UpdateError::DependencyCycle(ids)) if ids == vec!["a", "b"]
        ));
    }

    #[test]
    fn runnable_phases_follow_completion() {
        let mut p = plan(vec![
            Phase::new("a", "x"),
            Phase::new("b", "x").after("a"),
            Phase::new("c", "x"),
        ]);
        assert_eq!(p.runnable_phases(), vec!["a", "c"]);

        p.phase_mut("a").unwrap().state = PhaseState::Failed;
        assert_eq!(p.runnable_phases(), vec!["c"]);
        assert_eq!(p.pending_dependencies(p.phase("b").unwrap()), vec!["a"]);

        p.phase_mut("a").unwrap().state = PhaseState::Completed;
        assert_eq!(p.runnable_phases(), vec!["b", "c"]);
        assert_eq!(p.phases_in(PhaseState::Completed), vec!["a"]);
    }

    #[test]
    fn dependents_are_direct() {
        let p = plan(vec![
            Phase::new("a", "x"),
            Phase::new("b", "x").after("a"),
            Phase::new("c", "x").after("b"),
        ]);
        let ids: Vec<&str> = p.dependents("a").map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
        assert!(p.phase("z").unwrap_err().is_not_found());
    }
}
