//! Dependency graph over score definitions. Built once per run; yields
//! the topological evaluation order or names the offending cycle.

use crate::recipe::Recipe;
use std::collections::BTreeMap;

/// Fatal graph-construction error.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("cyclic score dependency: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
}

/// Topologically ordered evaluation plan. Indices point into
/// `recipe.scores`.
#[derive(Debug, Clone)]
pub struct ScoreGraph {
    order: Vec<usize>,
}

impl ScoreGraph {
    /// Builds edges from each composite/formula score to the scores it
    /// references, then orders with Kahn's algorithm. Declaration order
    /// is used as the tie-break so runs are deterministic.
    pub fn build(recipe: &Recipe) -> Result<Self, GraphError> {
        let index_of: BTreeMap<&str, usize> = recipe
            .scores
            .iter()
            .enumerate()
            .map(|(index, score)| (score.name.as_str(), index))
            .collect();

        let node_count = recipe.scores.len();
        // dependencies[i] = scores that score i references.
        let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for (index, score) in recipe.scores.iter().enumerate() {
            if !score.method.may_reference_scores() {
                continue;
            }
            for reference in &score.items {
                if let Some(&dependency) = index_of.get(reference.as_str()) {
                    dependencies[index].push(dependency);
                }
            }
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        let mut in_degree = vec![0usize; node_count];
        for (index, deps) in dependencies.iter().enumerate() {
            in_degree[index] = deps.len();
            for &dependency in deps {
                dependents[dependency].push(index);
            }
        }

        // Held descending so `pop` yields the lowest declaration index.
        let mut ready: Vec<usize> = (0..node_count)
            .filter(|&index| in_degree[index] == 0)
            .collect();
        ready.sort_by(|a, b| b.cmp(a));
        let mut order = Vec::with_capacity(node_count);
        while let Some(index) = ready.pop() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
            // Keep declaration order among simultaneously-ready nodes.
            ready.sort_by(|a, b| b.cmp(a));
        }

        if order.len() < node_count {
            let cycle = find_cycle(recipe, &dependencies, &in_degree);
            return Err(GraphError::Cycle { cycle });
        }

        Ok(Self { order })
    }

    pub fn evaluation_order(&self) -> &[usize] {
        &self.order
    }
}

/// Walks the unresolved remainder of the graph to name one concrete
/// cycle for the error message.
fn find_cycle(recipe: &Recipe, dependencies: &[Vec<usize>], in_degree: &[usize]) -> Vec<String> {
    let start = match in_degree.iter().position(|&degree| degree > 0) {
        Some(index) => index,
        None => return Vec::new(),
    };

    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(position) = path.iter().position(|&index| index == current) {
            let mut cycle: Vec<String> = path[position..]
                .iter()
                .map(|&index| recipe.scores[index].name.clone())
                .collect();
            cycle.push(recipe.scores[current].name.clone());
            return cycle;
        }
        path.push(current);
        match dependencies[current]
            .iter()
            .find(|&&dependency| in_degree[dependency] > 0)
        {
            Some(&next) => current = next,
            // Unreachable for a true cycle; fall back to the path walked.
            None => {
                return path
                    .iter()
                    .map(|&index| recipe.scores[index].name.clone())
                    .collect()
            }
        }
    }
}
