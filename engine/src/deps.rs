//! Dependency resolution over a registry snapshot.
//!
//! The graph is rebuilt for every start request from the definitions as
//! they exist at that moment. Ordering edges come from `after`,
//! `requires`, and `wants` (plus reversed `before`); `conflicts` is a
//! separate relation checked against active processes.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::domain::{DomainError, ProcessDefinition, ProcessState, Result};

pub struct DependencyGraph {
    /// name -> names that must start before it
    edges: HashMap<String, Vec<String>>,
    /// name -> hard dependency names
    requires: HashMap<String, Vec<String>>,
    /// name -> names it conflicts with
    conflicts: HashMap<String, Vec<String>>,
    states: HashMap<String, ProcessState>,
}

impl DependencyGraph {
    pub fn from_snapshot(snapshot: &[ProcessDefinition]) -> Self {
        let known: HashSet<&str> = snapshot.iter().map(|d| d.name()).collect();
        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut requires: HashMap<String, Vec<String>> = HashMap::new();
        let mut conflicts: HashMap<String, Vec<String>> = HashMap::new();
        let mut states = HashMap::new();

        for def in snapshot {
            let name = def.name().to_string();
            states.insert(name.clone(), def.state());
            let entry = edges.entry(name.clone()).or_default();
            for dep in def
                .dependencies
                .requires
                .iter()
                .chain(&def.dependencies.wants)
                .chain(&def.dependencies.after)
            {
                entry.push(dep.clone());
            }
            requires.insert(name.clone(), def.dependencies.requires.clone());
            conflicts.insert(name.clone(), def.dependencies.conflicts.clone());
            // `before` is the reversed edge: this process precedes dep.
            for dep in &def.dependencies.before {
                if known.contains(dep.as_str()) {
                    edges.entry(dep.clone()).or_default().push(name.clone());
                }
            }
        }
        Self {
            edges,
            requires,
            conflicts,
            states,
        }
    }

    /// Compute the start order for `target`: its transitive dependency
    /// closure in dependency-first order, ending with the target
    /// itself. Fails on cycles and on missing hard dependencies;
    /// missing soft or ordering-only dependencies are skipped with a
    /// warning.
    pub fn start_order(&self, target: &str) -> Result<Vec<String>> {
        if !self.states.contains_key(target) {
            return Err(DomainError::ProcessNotFound(target.to_string()));
        }
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        self.visit(target, &mut visited, &mut stack, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut cycle: Vec<String> = stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(DomainError::CyclicDependency(cycle));
        }
        if visited.contains(name) {
            return Ok(());
        }
        stack.push(name.to_string());
        let hard: &[String] = self.requires.get(name).map(Vec::as_slice).unwrap_or(&[]);
        for dep in self.edges.get(name).into_iter().flatten() {
            if !self.states.contains_key(dep.as_str()) {
                if hard.contains(dep) {
                    return Err(DomainError::DependencyNotFound(dep.clone()));
                }
                warn!(process = %name, dependency = %dep, "skipping unknown soft dependency");
                continue;
            }
            self.visit(dep, visited, stack, order)?;
        }
        stack.pop();
        visited.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Check `conflicts` in both directions against active processes.
    /// Returns the first active conflicting process.
    pub fn active_conflict(&self, target: &str) -> Option<String> {
        let declared = self.conflicts.get(target);
        for other in declared.into_iter().flatten() {
            if self.is_active(other) {
                return Some(other.clone());
            }
        }
        for (name, their_conflicts) in &self.conflicts {
            if name != target && their_conflicts.iter().any(|c| c == target) && self.is_active(name)
            {
                return Some(name.clone());
            }
        }
        None
    }

    /// Names reachable from `target` through `requires` edges alone.
    /// A start aborts when any of these fails; soft dependencies only
    /// warn.
    pub fn required_closure(&self, target: &str) -> HashSet<String> {
        let mut closure = HashSet::new();
        let mut pending = vec![target.to_string()];
        while let Some(name) = pending.pop() {
            for dep in self.requires.get(&name).into_iter().flatten() {
                if closure.insert(dep.clone()) {
                    pending.push(dep.clone());
                }
            }
        }
        closure
    }

    fn is_active(&self, name: &str) -> bool {
        self.states
            .get(name)
            .map(|s| s.is_active())
            .unwrap_or(false)
    }
}
