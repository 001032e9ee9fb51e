//! Random directed topologies over vertices `1..=N`.
//!
//! A freshly generated graph gives every vertex the same out-degree but says
//! nothing about reachability. [`Graph::make_connected`] decomposes it into
//! strongly connected components and chains them together, largest first, so
//! that a rumor injected at [`Repair::origin`] can reach every vertex.
//!
//! The chain is one-directional: the last component is not linked back to the
//! first, so the repaired graph is in general *not* strongly connected. Seeding
//! any vertex other than one in the first component may leave parts of the
//! population unreachable.

use std::collections::{BTreeMap, BTreeSet};

use crate::simulation::SimulationRng;

mod kosaraju;

/// Vertex identifier, `1..=N`.
pub type Vertex = u32;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Graph {
    adjacency: BTreeMap<Vertex, Vec<Vertex>>,
}

/// Outcome of [`Graph::make_connected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    /// Strongly connected components, sorted by descending size. Members keep
    /// the order in which the second Kosaraju pass collected them.
    pub components: Vec<Vec<Vertex>>,
    /// Edges inserted to chain consecutive components, as `(from, to)`.
    ///
    /// Holds at most `components.len() - 1` entries. A chaining edge that the
    /// graph already had is not inserted again and is therefore not listed.
    pub added_edges: Vec<(Vertex, Vertex)>,
}

impl Repair {
    /// A vertex from which every other vertex is reachable after repair.
    pub fn origin(&self) -> Option<Vertex> {
        self.components.first().and_then(|c| c.first()).copied()
    }

    pub fn is_single_component(&self) -> bool {
        self.components.len() <= 1
    }
}

impl Graph {
    /// Generates a random graph seeded from the wall clock and repairs it.
    pub fn new(num_vertices: usize, num_adjacents: usize) -> Self {
        let mut rng = SimulationRng::from_clock();
        let mut graph = Self::generate(num_vertices, num_adjacents, &mut rng);
        graph.make_connected();
        graph
    }

    /// Gives every vertex `num_adjacents` distinct random successors, none of
    /// them itself.
    ///
    /// Candidates are drawn uniformly from the whole vertex range and rejected
    /// when they hit the source or a previous pick. A vertex can only have
    /// `num_vertices - 1` successors, so larger requests are capped there.
    pub fn generate(num_vertices: usize, num_adjacents: usize, rng: &mut SimulationRng) -> Self {
        let num_vertices = num_vertices as Vertex;
        let wanted = num_adjacents.min(num_vertices.saturating_sub(1) as usize);

        let mut adjacency = BTreeMap::new();
        for vertex in 1..=num_vertices {
            let mut adjacents = BTreeSet::new();
            while adjacents.len() < wanted {
                let candidate = rng.gen_vertex(num_vertices);
                if candidate != vertex {
                    adjacents.insert(candidate);
                }
            }
            adjacency.insert(vertex, adjacents.into_iter().collect());
        }

        Self { adjacency }
    }

    /// Builds a graph from an explicit adjacency map.
    ///
    /// Self loops and repeated targets are dropped; vertices that only appear
    /// as targets get an empty adjacency list.
    pub fn from_adjacency(adjacency: impl IntoIterator<Item = (Vertex, Vec<Vertex>)>) -> Self {
        let mut graph = BTreeMap::<Vertex, Vec<Vertex>>::new();
        for (vertex, adjacents) in adjacency {
            let list = graph.entry(vertex).or_default();
            for adjacent in adjacents {
                if adjacent != vertex && !list.contains(&adjacent) {
                    list.push(adjacent);
                }
            }
        }
        let targets: Vec<Vertex> = graph.values().flatten().copied().collect();
        for target in targets {
            graph.entry(target).or_default();
        }
        Self { adjacency: graph }
    }

    /// Vertices in ascending order.
    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.adjacency.keys().copied()
    }

    /// Successors of `vertex`; empty for unknown vertices.
    pub fn adjacents(&self, vertex: Vertex) -> &[Vertex] {
        self.adjacency
            .get(&vertex)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    pub fn edges(&self) -> impl Iterator<Item = (Vertex, Vertex)> + '_ {
        self.adjacency
            .iter()
            .flat_map(|(&from, adjacents)| adjacents.iter().map(move |&to| (from, to)))
    }

    /// Every edge reversed. Only vertices with incoming edges get an entry.
    pub fn transpose(&self) -> Self {
        let mut transposed = BTreeMap::<Vertex, Vec<Vertex>>::new();
        for (from, to) in self.edges() {
            transposed.entry(to).or_default().push(from);
        }
        Self {
            adjacency: transposed,
        }
    }

    /// Strongly connected components in discovery order.
    pub fn strongly_connected_components(&self) -> Vec<Vec<Vertex>> {
        kosaraju::components(self, &self.transpose())
    }

    /// Chains the strongly connected components together, largest first.
    ///
    /// For consecutive components `a`, `b` in the sorted order an edge from the
    /// last member of `a` to the first member of `b` is inserted, unless it is
    /// already present. A graph that is already one component is untouched.
    pub fn make_connected(&mut self) -> Repair {
        let mut components = self.strongly_connected_components();
        if components.len() <= 1 {
            return Repair {
                components,
                added_edges: Vec::new(),
            };
        }

        // stable: equal sizes keep discovery order
        components.sort_by(|lhs, rhs| rhs.len().cmp(&lhs.len()));

        let mut added_edges = Vec::with_capacity(components.len() - 1);
        for pair in components.windows(2) {
            let (Some(&parent), Some(&child)) = (pair[0].last(), pair[1].first()) else {
                continue;
            };
            let adjacents = self.adjacency.entry(parent).or_default();
            if !adjacents.contains(&child) {
                adjacents.push(child);
                added_edges.push((parent, child));
            }
        }

        tracing::debug!(
            components = components.len(),
            added = added_edges.len(),
            "Chained strongly connected components"
        );

        Repair {
            components,
            added_edges,
        }
    }
}
