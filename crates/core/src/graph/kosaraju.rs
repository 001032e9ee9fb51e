//! Kosaraju's two-pass strongly connected components, with explicit stacks.
//!
//! Both passes reproduce the visiting order of the plain recursive version:
//! roots in ascending vertex order, successors in adjacency order. The member
//! order inside a component (and the order of components) therefore only
//! depends on the graph, which matters for which vertices get chained
//! together during repair.

use std::collections::HashSet;

use super::{Graph, Vertex};

/// Returns the strongly connected components of `graph`, given its transpose.
pub(super) fn components(graph: &Graph, transposed: &Graph) -> Vec<Vec<Vertex>> {
    let finish_order = finish_order(graph);

    let mut visited = HashSet::with_capacity(finish_order.len());
    let mut components = Vec::new();
    for &root in finish_order.iter().rev() {
        if !visited.insert(root) {
            continue;
        }
        components.push(collect_component(transposed, root, &mut visited));
    }
    components
}

/// First pass: vertices in DFS post-order over the original graph.
fn finish_order(graph: &Graph) -> Vec<Vertex> {
    let mut visited = HashSet::with_capacity(graph.len());
    let mut finished = Vec::with_capacity(graph.len());
    let mut stack: Vec<(Vertex, usize)> = Vec::new();

    for root in graph.vertices() {
        if !visited.insert(root) {
            continue;
        }
        stack.push((root, 0));
        while let Some((vertex, next)) = stack.last_mut() {
            let adjacents = graph.adjacents(*vertex);
            if let Some(&adjacent) = adjacents.get(*next) {
                *next += 1;
                if visited.insert(adjacent) {
                    stack.push((adjacent, 0));
                }
            } else {
                finished.push(*vertex);
                stack.pop();
            }
        }
    }
    finished
}

/// Second pass: everything reachable from `root` on the transpose that no
/// earlier root claimed, in DFS pre-order. `root` must already be marked.
fn collect_component(
    transposed: &Graph,
    root: Vertex,
    visited: &mut HashSet<Vertex>,
) -> Vec<Vertex> {
    let mut members = vec![root];
    let mut stack: Vec<(Vertex, usize)> = vec![(root, 0)];
    while let Some((vertex, next)) = stack.last_mut() {
        let adjacents = transposed.adjacents(*vertex);
        if let Some(&adjacent) = adjacents.get(*next) {
            *next += 1;
            if visited.insert(adjacent) {
                members.push(adjacent);
                stack.push((adjacent, 0));
            }
        } else {
            stack.pop();
        }
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straightforward recursive Kosaraju used as the ordering reference.
    fn recursive(graph: &Graph) -> Vec<Vec<Vertex>> {
        fn visit(g: &Graph, v: Vertex, seen: &mut HashSet<Vertex>, out: &mut Vec<Vertex>) {
            if !seen.insert(v) {
                return;
            }
            for &a in g.adjacents(v) {
                visit(g, a, seen, out);
            }
            out.push(v);
        }
        fn assign(t: &Graph, v: Vertex, seen: &mut HashSet<Vertex>, out: &mut Vec<Vertex>) {
            if !seen.insert(v) {
                return;
            }
            out.push(v);
            for &a in t.adjacents(v) {
                assign(t, a, seen, out);
            }
        }

        let transposed = graph.transpose();
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for v in graph.vertices() {
            visit(graph, v, &mut seen, &mut order);
        }
        seen.clear();
        let mut components = Vec::new();
        while let Some(v) = order.pop() {
            let mut component = Vec::new();
            assign(&transposed, v, &mut seen, &mut component);
            if !component.is_empty() {
                components.push(component);
            }
        }
        components
    }

    #[test]
    fn finds_cycles_and_singletons() {
        let graph = Graph::from_adjacency([
            (1, vec![2]),
            (2, vec![3]),
            (3, vec![1, 4]),
            (4, vec![5]),
            (5, vec![]),
        ]);
        let mut found: Vec<Vec<Vertex>> = components(&graph, &graph.transpose())
            .into_iter()
            .map(|mut c| {
                c.sort();
                c
            })
            .collect();
        found.sort();
        assert_eq!(found, vec![vec![1, 2, 3], vec![4], vec![5]]);
    }

    #[test]
    fn discovery_order_follows_finish_stack() {
        let graph = Graph::from_adjacency([(1, vec![2]), (2, vec![1, 3]), (3, vec![])]);
        // finish order 3, 2, 1: root 1 is popped first and claims {1, 2}
        assert_eq!(finish_order(&graph), vec![3, 2, 1]);
        assert_eq!(
            components(&graph, &graph.transpose()),
            vec![vec![1, 2], vec![3]]
        );
    }

    #[test]
    fn matches_recursive_order_on_random_graphs() {
        let mut rng = crate::simulation::SimulationRng::new(7);
        for (n, k) in [(12, 1), (30, 2), (60, 3), (200, 1)] {
            let graph = Graph::generate(n, k, &mut rng);
            assert_eq!(
                components(&graph, &graph.transpose()),
                recursive(&graph),
                "({n}, {k})"
            );
        }
    }

    #[test]
    fn long_path_does_not_recurse() {
        let n: Vertex = 200_000;
        let graph = Graph::from_adjacency(
            (1..=n).map(|v| (v, if v < n { vec![v + 1] } else { vec![] })),
        );
        let found = components(&graph, &graph.transpose());
        assert_eq!(found.len(), n as usize);
        assert!(found.iter().all(|c| c.len() == 1));
    }
}
