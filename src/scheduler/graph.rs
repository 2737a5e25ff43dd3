//! Dependency graph checks.

use crate::db::TaskNode;
use crate::models::TaskStatus;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Ids of unfinished tasks that sit on a `depends_on` cycle or depend,
/// directly or transitively, on one. None of them can ever become eligible.
///
/// Finished tasks and references to unknown tasks end the walk.
pub fn cyclic_tasks(graph: &HashMap<String, TaskNode>) -> HashSet<String> {
    let mut walker = Walker {
        graph,
        marks: HashMap::new(),
        stack: Vec::new(),
        tainted: HashSet::new(),
    };

    let mut ids: Vec<&str> = graph.keys().map(String::as_str).collect();
    ids.sort_unstable();
    for id in ids {
        walker.visit(id);
    }

    walker.tainted.into_iter().map(str::to_string).collect()
}

struct Walker<'a> {
    graph: &'a HashMap<String, TaskNode>,
    marks: HashMap<&'a str, Mark>,
    stack: Vec<&'a str>,
    tainted: HashSet<&'a str>,
}

impl<'a> Walker<'a> {
    /// Returns whether `id` is tainted by a cycle.
    fn visit(&mut self, id: &'a str) -> bool {
        if self.marks.contains_key(id) {
            return self.tainted.contains(id);
        }

        let graph = self.graph;
        let Some(node) = graph.get(id) else {
            return false;
        };
        if matches!(node.status, TaskStatus::Completed | TaskStatus::Failed) {
            self.marks.insert(id, Mark::Done);
            return false;
        }

        self.marks.insert(id, Mark::Active);
        self.stack.push(id);

        let mut tainted = false;
        for dep in &node.depends_on {
            let dep = dep.as_str();
            if self.marks.get(dep) == Some(&Mark::Active) {
                // back edge: everything from `dep` to the top of the stack is on the cycle
                let start = self.stack.iter().position(|s| *s == dep).unwrap_or(0);
                for member in &self.stack[start..] {
                    self.tainted.insert(*member);
                }
                tainted = true;
            } else if self.visit(dep) {
                tainted = true;
            }
        }

        self.stack.pop();
        self.marks.insert(id, Mark::Done);
        if tainted {
            self.tainted.insert(id);
        }
        self.tainted.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: Vec<(&str, TaskStatus, Vec<&str>)>) -> HashMap<String, TaskNode> {
        edges
            .into_iter()
            .map(|(id, status, deps)| {
                (
                    id.to_string(),
                    TaskNode {
                        status,
                        depends_on: deps.iter().map(|d| d.to_string()).collect(),
                    },
                )
            })
            .collect()
    }

    fn sorted(set: HashSet<String>) -> Vec<String> {
        let mut v: Vec<_> = set.into_iter().collect();
        v.sort();
        v
    }

    #[test]
    fn test_acyclic_graph_is_clean() {
        let g = graph(vec![
            ("a", TaskStatus::Pending, vec!["b", "c"]),
            ("b", TaskStatus::Pending, vec!["c"]),
            ("c", TaskStatus::Completed, vec![]),
        ]);
        assert!(cyclic_tasks(&g).is_empty());
    }

    #[test]
    fn test_cycle_and_dependents_are_tainted() {
        let g = graph(vec![
            ("a", TaskStatus::Pending, vec!["b"]),
            ("b", TaskStatus::Pending, vec!["a"]),
            ("c", TaskStatus::Pending, vec!["a"]),
            ("d", TaskStatus::Pending, vec![]),
        ]);
        assert_eq!(sorted(cyclic_tasks(&g)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let g = graph(vec![("a", TaskStatus::Pending, vec!["a"])]);
        assert_eq!(sorted(cyclic_tasks(&g)), vec!["a"]);
    }

    #[test]
    fn test_finished_tasks_break_cycles() {
        let g = graph(vec![
            ("a", TaskStatus::Pending, vec!["b"]),
            ("b", TaskStatus::Completed, vec!["a"]),
        ]);
        assert!(cyclic_tasks(&g).is_empty());
    }

    #[test]
    fn test_unknown_dependency_is_not_a_cycle() {
        let g = graph(vec![("a", TaskStatus::Pending, vec!["ghost"])]);
        assert!(cyclic_tasks(&g).is_empty());
    }
}
