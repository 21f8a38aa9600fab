// src/kernel/noding.rs
//! Узлование и слияние линий
//!
//! `union_lines` режет все отрезки во всех точках пересечения и касания,
//! `line_merge` собирает из полученных рёбер максимальные цепочки через
//! узлы степени 2. Направление и начальная вершина уже простой линии
//! сохраняются.

use std::collections::{HashMap, HashSet};

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Coord, Line, LineString};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject};

/// Шаг квантования при отождествлении узлов
const SNAP: f64 = 1e-10;

type NodeKey = (i64, i64);

fn key(c: Coord<f64>) -> NodeKey {
    ((c.x / SNAP).round() as i64, (c.y / SNAP).round() as i64)
}

/// Параметр проекции точки на отрезок
fn param(line: &Line<f64>, c: Coord<f64>) -> f64 {
    let d = line.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    ((c.x - line.start.x) * d.x + (c.y - line.start.y) * d.y) / len2
}

/// Разбивает все части на рёбра, не пересекающиеся вне концов.
///
/// Совпадающие рёбра схлопываются; порядок рёбер следует порядку частей.
#[must_use]
pub fn union_lines(parts: &[LineString<f64>]) -> Vec<Line<f64>> {
    let segments: Vec<Line<f64>> = parts
        .iter()
        .flat_map(LineString::lines)
        .filter(|l| l.start != l.end)
        .collect();

    let tree = RTree::bulk_load(
        segments
            .iter()
            .enumerate()
            .map(|(i, l)| GeomWithData::new(*l, i))
            .collect(),
    );

    let mut canonical: HashMap<NodeKey, Coord<f64>> = HashMap::new();
    let mut seen_edges: HashSet<(NodeKey, NodeKey)> = HashSet::new();
    let mut edges = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let mut cuts: Vec<(f64, Coord<f64>)> = vec![(0.0, segment.start), (1.0, segment.end)];

        for candidate in tree.locate_in_envelope_intersecting(&segment.envelope()) {
            if candidate.data == i {
                continue;
            }
            match line_intersection(*segment, *candidate.geom()) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    cuts.push((param(segment, intersection), intersection));
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    cuts.push((param(segment, intersection.start), intersection.start));
                    cuts.push((param(segment, intersection.end), intersection.end));
                }
                None => {}
            }
        }

        cuts.sort_by(|a, b| a.0.total_cmp(&b.0));
        let points: Vec<Coord<f64>> = cuts
            .into_iter()
            .map(|(_, c)| *canonical.entry(key(c)).or_insert(c))
            .collect();

        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (ka, kb) = (key(a), key(b));
            if ka == kb {
                continue;
            }
            let undirected = if ka < kb { (ka, kb) } else { (kb, ka) };
            if seen_edges.insert(undirected) {
                edges.push(Line::new(a, b));
            }
        }
    }

    edges
}

/// Собирает рёбра в максимальные линии.
///
/// Цепочки начинаются в узлах степени ≠ 2 (в порядке появления узлов),
/// оставшиеся чистые циклы с ребра с наименьшим номером, в его направлении.
#[must_use]
pub fn line_merge(edges: &[Line<f64>]) -> Vec<LineString<f64>> {
    let mut graph: UnGraph<Coord<f64>, usize> = UnGraph::default();
    let mut nodes: HashMap<NodeKey, NodeIndex> = HashMap::new();
    let mut node_of = |graph: &mut UnGraph<Coord<f64>, usize>, c: Coord<f64>| {
        *nodes.entry(key(c)).or_insert_with(|| graph.add_node(c))
    };

    for (i, edge) in edges.iter().enumerate() {
        let a = node_of(&mut graph, edge.start);
        let b = node_of(&mut graph, edge.end);
        if a != b {
            graph.add_edge(a, b, i);
        }
    }

    let mut visited: HashSet<EdgeIndex> = HashSet::new();
    let mut chains: Vec<(usize, LineString<f64>)> = Vec::new();

    let degree = |graph: &UnGraph<Coord<f64>, usize>, n: NodeIndex| graph.edges(n).count();

    for start in graph.node_indices() {
        if degree(&graph, start) == 2 {
            continue;
        }
        let mut incident: Vec<EdgeIndex> = graph.edges(start).map(|e| e.id()).collect();
        incident.sort_by_key(|e| graph[*e]);
        for first in incident {
            if visited.contains(&first) {
                continue;
            }
            chains.push(walk(&graph, start, first, &mut visited, false));
        }
    }

    let mut remaining: Vec<EdgeIndex> = graph
        .edge_indices()
        .filter(|e| !visited.contains(e))
        .collect();
    remaining.sort_by_key(|e| graph[*e]);
    for first in remaining {
        if visited.contains(&first) {
            continue;
        }
        // Рёбра добавлены как (начало, конец) исходного отрезка
        let Some((start, _)) = graph.edge_endpoints(first) else {
            continue;
        };
        chains.push(walk(&graph, start, first, &mut visited, true));
    }

    chains.sort_by_key(|(order, _)| *order);
    chains.into_iter().map(|(_, line)| line).collect()
}

/// Проходит цепочку от узла `start` по ребру `first`
fn walk(
    graph: &UnGraph<Coord<f64>, usize>,
    start: NodeIndex,
    first: EdgeIndex,
    visited: &mut HashSet<EdgeIndex>,
    cycle: bool,
) -> (usize, LineString<f64>) {
    let mut coords = vec![graph[start]];
    let mut node = start;
    let mut edge = first;
    let mut forward = 0usize;
    let mut backward = 0usize;
    let mut order = usize::MAX;

    loop {
        visited.insert(edge);
        order = order.min(graph[edge]);
        let Some((a, b)) = graph.edge_endpoints(edge) else {
            break;
        };
        let next = if a == node {
            forward += 1;
            b
        } else {
            backward += 1;
            a
        };
        coords.push(graph[next]);
        node = next;

        if node == start && cycle {
            break;
        }
        let mut onward = graph.edges(node).map(|e| e.id());
        let continuation = if graph.edges(node).count() == 2 {
            onward.find(|e| *e != edge && !visited.contains(e))
        } else {
            None
        };
        match continuation {
            Some(e) => edge = e,
            None => break,
        }
    }

    if backward > forward {
        coords.reverse();
    }
    (order, LineString::new(coords))
}

/// Объединение и слияние за один вызов
#[must_use]
pub fn merge_lines(parts: &[LineString<f64>]) -> Vec<LineString<f64>> {
    line_merge(&union_lines(parts))
}
