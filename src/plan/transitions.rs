//! Workflow transition resolution.
//!
//! Trackers expose status changes as named transitions between workflow
//! states, not direct writes. The graph here is data (configurable per
//! project); resolution is a shortest-path walk from the current status to
//! the desired one.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::StoryStatus;

use super::PlanError;

/// One named edge in the workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEdge {
    pub from: String,
    pub name: String,
    pub to: String,
}

/// The project's workflow as a directed graph of named transitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionGraph {
    /// Status newly created issues land in.
    #[serde(default = "default_initial")]
    pub initial: String,
    #[serde(default)]
    pub edges: Vec<TransitionEdge>,
}

fn default_initial() -> String {
    "Open".to_string()
}

impl Default for TransitionGraph {
    /// Forward-only default: `Open -> In Progress -> Resolved`. Workflows
    /// with reopen edges configure them explicitly.
    fn default() -> Self {
        Self {
            initial: "Open".into(),
            edges: vec![
                TransitionEdge {
                    from: "Open".into(),
                    name: "Start Progress".into(),
                    to: "In Progress".into(),
                },
                TransitionEdge {
                    from: "In Progress".into(),
                    name: "Resolve".into(),
                    to: "Resolved".into(),
                },
            ],
        }
    }
}

impl TransitionGraph {
    /// Shortest chain of transition names taking `current` to `desired`.
    /// Empty when already there. Status comparison is case-insensitive;
    /// trackers are not consistent about casing.
    pub fn resolve(&self, current: &str, desired: &str) -> Result<Vec<String>, PlanError> {
        if eq_status(current, desired) {
            return Ok(Vec::new());
        }

        let mut queue: VecDeque<String> = VecDeque::new();
        let mut came_from: HashMap<String, (String, String)> = HashMap::new();
        let start = norm(current);
        queue.push_back(start.clone());

        while let Some(at) = queue.pop_front() {
            for edge in &self.edges {
                if norm(&edge.from) != at {
                    continue;
                }
                let next = norm(&edge.to);
                if next == start || came_from.contains_key(&next) {
                    continue;
                }
                came_from.insert(next.clone(), (at.clone(), edge.name.clone()));
                if eq_status(&edge.to, desired) {
                    return Ok(unwind(&came_from, &start, &next));
                }
                queue.push_back(next);
            }
        }

        Err(PlanError::UnreachableStatus {
            from: current.to_string(),
            to: desired.to_string(),
        })
    }

    /// Chain for a freshly created issue, which starts at `initial`.
    pub fn path_from_initial(&self, desired: StoryStatus) -> Result<Vec<String>, PlanError> {
        self.resolve(&self.initial, desired.tracker_status())
    }
}

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

fn eq_status(a: &str, b: &str) -> bool {
    norm(a) == norm(b)
}

fn unwind(came_from: &HashMap<String, (String, String)>, start: &str, end: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut at = end.to_string();
    while at != start {
        let (prev, name) = &came_from[&at];
        names.push(name.clone());
        at = prev.clone();
    }
    names.reverse();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_status_resolves_to_empty_chain() {
        let g = TransitionGraph::default();
        assert_eq!(g.resolve("In Progress", "in progress").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn single_hop() {
        let g = TransitionGraph::default();
        assert_eq!(
            g.resolve("Open", "In Progress").unwrap(),
            vec!["Start Progress".to_string()]
        );
    }

    #[test]
    fn multi_hop_is_shortest() {
        let g = TransitionGraph::default();
        assert_eq!(
            g.resolve("Open", "Resolved").unwrap(),
            vec!["Start Progress".to_string(), "Resolve".to_string()]
        );
    }

    #[test]
    fn default_graph_is_forward_only() {
        let g = TransitionGraph::default();
        let err = g.resolve("Resolved", "Open").unwrap_err();
        assert!(matches!(err, PlanError::UnreachableStatus { .. }));
    }

    #[test]
    fn reopen_edge_enables_backward_chain() {
        let mut g = TransitionGraph::default();
        g.edges.push(TransitionEdge {
            from: "Resolved".into(),
            name: "Reopen".into(),
            to: "Open".into(),
        });
        assert_eq!(
            g.resolve("Resolved", "In Progress").unwrap(),
            vec!["Reopen".to_string(), "Start Progress".to_string()]
        );
    }

    #[test]
    fn initial_path_for_done_story() {
        let g = TransitionGraph::default();
        assert_eq!(
            g.path_from_initial(StoryStatus::Done).unwrap(),
            vec!["Start Progress".to_string(), "Resolve".to_string()]
        );
    }
}
