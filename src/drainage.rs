// src/drainage.rs
//! Сборка речной сети по уровням
//!
//! Уровень 0: реки, впадающие в берег. Уровень L: реки, впадающие в устья
//! уровня L−1. Озеро, в которое упирается устье, «поглощается»: устье
//! обрезается по его контуру, а сам контур сразу служит граничной линией
//! уровня L+1, так что реки могут и впадать в озеро, и вытекать из него.
//!
//! Цикл уровней идёт, пока на уровне появляется хотя бы одно устье. Каждое
//! устье расходует одного кандидата, поэтому уровней не больше N + 1.

use std::collections::{HashMap, HashSet};

use geo::{
    Coord, Distance, Euclidean, Length, LineString, MultiLineString, Point, Polygon,
    RemoveRepeatedPoints,
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ConsolidationParams;
use crate::error::Result;
use crate::kernel::noding::merge_lines;
use crate::kernel::{BoundaryOwner, TerminalBoundary, clip_lines, make_polygon, to_multi};
use crate::segment::{Classification, Orientation, SegmentId};
use crate::store::FeatureStore;

/// Сдвиг конца устья после булевой операции, который считается округлением
const ROUNDING: f64 = 1e-9;

/// Узел дерева стока
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DrainageNode {
    Coast(SegmentId),
    Lake(SegmentId),
    Mouth {
        id: SegmentId,
        level: u32,
        orientation: Orientation,
    },
}

/// Дерево стока: ребро ведёт от притока к тому, куда он впадает
#[derive(Debug, Default)]
pub struct DrainageTree {
    graph: DiGraph<DrainageNode, ()>,
    nodes: HashMap<DrainageNode, NodeIndex>,
    mouths: HashMap<SegmentId, DrainageNode>,
}

impl DrainageTree {
    fn node(&mut self, node: DrainageNode) -> NodeIndex {
        if let DrainageNode::Mouth { id, .. } = node {
            self.mouths.insert(id, node);
        }
        *self
            .nodes
            .entry(node)
            .or_insert_with(|| self.graph.add_node(node))
    }

    fn owner(&self, owner: BoundaryOwner) -> Option<DrainageNode> {
        match owner {
            BoundaryOwner::Coast(id) => Some(DrainageNode::Coast(id)),
            BoundaryOwner::Lake(id) => Some(DrainageNode::Lake(id)),
            BoundaryOwner::Mouth(id) => self.mouths.get(&id).copied(),
        }
    }

    fn link(&mut self, child: DrainageNode, parent: DrainageNode) {
        let (c, p) = (self.node(child), self.node(parent));
        if !self.graph.contains_edge(c, p) {
            self.graph.add_edge(c, p, ());
        }
    }

    /// Куда впадает устье `id`
    #[must_use]
    pub fn parents(&self, id: SegmentId) -> Vec<DrainageNode> {
        let Some(index) = self.mouths.get(&id).and_then(|n| self.nodes.get(n)) else {
            return Vec::new();
        };
        self.graph
            .edges(*index)
            .map(|e| self.graph[e.target()])
            .collect()
    }

    #[must_use]
    pub fn mouth_count(&self) -> usize {
        self.mouths.len()
    }

    /// Уровень каждого устья на единицу больше уровня устья, в которое оно
    /// впадает (напрямую или через озеро); устья уровня 0 впадают в берег.
    #[must_use]
    pub fn levels_consistent(&self) -> bool {
        let mut ids = HashSet::new();
        for node in self.graph.node_weights() {
            if let DrainageNode::Mouth { id, .. } = node {
                if !ids.insert(*id) {
                    return false;
                }
            }
        }

        self.graph.edge_references().all(|edge| {
            let child = self.graph[edge.source()];
            let parent = self.graph[edge.target()];
            match (child, parent) {
                (DrainageNode::Mouth { level, .. }, DrainageNode::Coast(_)) => level == 0,
                (DrainageNode::Mouth { level, .. }, DrainageNode::Mouth { level: up, .. }) => {
                    level == up + 1
                }
                (DrainageNode::Mouth { level, .. }, DrainageNode::Lake(_)) => self
                    .graph
                    .edges(edge.target())
                    .all(|out| match self.graph[out.target()] {
                        DrainageNode::Mouth { level: up, .. } => level == up + 1,
                        _ => false,
                    }),
                (DrainageNode::Lake(_), DrainageNode::Mouth { .. }) => true,
                _ => false,
            }
        })
    }
}

/// Выход одного уровня
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelYield {
    pub level: u32,
    /// Устья, классифицированные началом
    pub start: usize,
    /// Устья, классифицированные концом
    pub end: usize,
    /// Устья этого уровня, появившиеся при поглощении озёр уровнем ниже
    pub from_lakes: usize,
}

impl LevelYield {
    #[must_use]
    pub fn total(&self) -> usize {
        self.start + self.end + self.from_lakes
    }
}

/// Итог сборки сети
#[derive(Debug, Default, Serialize)]
pub struct DrainageOutcome {
    pub levels: Vec<LevelYield>,
    pub lakes_absorbed: Vec<SegmentId>,
    /// Кандидаты, так и не дошедшие ни до одной граничной линии
    pub unresolved: Vec<SegmentId>,
    #[serde(skip)]
    pub tree: DrainageTree,
}

/// Озеро, ещё не поглощённое сетью
struct LakeEntry {
    id: SegmentId,
    polygon: Polygon<f64>,
    ring: LineString<f64>,
}

/// Обрезает «заплыв» за граничную линию и притягивает конец к ней.
///
/// Вершины со стороны `orientation` удаляются, пока линия пересекает
/// границу и в ней больше двух точек. Касание в противоположной конечной
/// вершине не считается: она может уже лежать на той же границе.
#[must_use]
pub fn trim_and_snap(
    line: &LineString<f64>,
    boundary: &TerminalBoundary,
    orientation: Orientation,
) -> LineString<f64> {
    let mut coords = line.0.clone();
    while coords.len() > 2 {
        let far = match orientation {
            Orientation::Start => coords[coords.len() - 1],
            Orientation::End => coords[0],
        };
        if !boundary.intersects_away_from(&LineString::new(coords.clone()), far) {
            break;
        }
        match orientation {
            Orientation::Start => {
                coords.remove(0);
            }
            Orientation::End => {
                coords.pop();
            }
        }
    }

    let mut trimmed = LineString::new(coords).remove_repeated_points();
    let index = orientation.index(&trimmed);
    if let Some(end) = trimmed.0.get(index).copied() {
        if let Some((snapped, _)) = boundary.nearest(end) {
            trimmed.0[index] = snapped;
        }
    }
    trimmed
}

/// Кандидаты, чей конец `orientation` лежит ближе `eps` к границе
fn select(
    snapshot: &[(SegmentId, LineString<f64>)],
    boundary: &TerminalBoundary,
    orientation: Orientation,
    eps: f64,
) -> Vec<SegmentId> {
    let near = |(_, line): &&(SegmentId, LineString<f64>)| {
        orientation
            .endpoint(line)
            .is_some_and(|end| boundary.distance(end) < eps)
    };

    #[cfg(feature = "parallel")]
    let selected: Vec<SegmentId> = snapshot.par_iter().filter(near).map(|(id, _)| *id).collect();
    #[cfg(not(feature = "parallel"))]
    let selected: Vec<SegmentId> = snapshot.iter().filter(near).map(|(id, _)| *id).collect();
    selected
}

/// Один проход классификации устьев против границы.
///
/// Оба конца выбираются по снимку кандидатов на начало прохода. Кандидат,
/// подошедший обоими концами, обрезается с обеих сторон и классифицируется
/// началом.
fn classify_pass(
    store: &mut FeatureStore,
    boundary: &TerminalBoundary,
    level: u32,
    eps: f64,
    tree: &mut DrainageTree,
) -> Result<(usize, usize)> {
    if boundary.is_empty() {
        return Ok((0, 0));
    }

    let snapshot: Vec<(SegmentId, LineString<f64>)> = store
        .query(|s| s.classification == Classification::CandidateStream)
        .into_iter()
        .map(|s| (s.id, s.geometry.clone()))
        .collect();
    let starts = select(&snapshot, boundary, Orientation::Start, eps);
    let ends = select(&snapshot, boundary, Orientation::End, eps);
    let end_set: HashSet<SegmentId> = ends.iter().copied().collect();
    let both: HashSet<SegmentId> = starts.iter().copied().filter(|id| end_set.contains(id)).collect();

    let mut counts = (0, 0);
    for orientation in Orientation::BOTH {
        let chosen = match orientation {
            Orientation::Start => &starts,
            Orientation::End => &ends,
        };
        for &id in chosen {
            if orientation == Orientation::End && both.contains(&id) {
                continue;
            }

            let mut line = trim_and_snap(&store.require(id)?.geometry, boundary, orientation);
            if both.contains(&id) {
                line = trim_and_snap(&line, boundary, Orientation::End);
            }

            let mouth = Classification::RiverMouth { level, orientation };
            store.set_geometry(id, line.clone())?;
            store.reclassify(id, mouth)?;

            let node = DrainageNode::Mouth {
                id,
                level,
                orientation,
            };
            tree.node(node);
            if let Some(parent) = orientation
                .endpoint(&line)
                .and_then(|end| boundary.nearest(end))
                .and_then(|(_, owner)| tree.owner(owner))
            {
                tree.link(node, parent);
            }

            debug!(id, level, ?orientation, "устье");
            match orientation {
                Orientation::Start => counts.0 += 1,
                Orientation::End => counts.1 += 1,
            }
        }
    }
    Ok(counts)
}

/// Отрезает от устья часть внутри озера.
///
/// Ориентация устья сохраняется, конец на граничной линии остаётся точно
/// на месте: булева операция может сдвинуть его в последних разрядах.
fn cut_by_lake(
    line: &LineString<f64>,
    lake: &Polygon<f64>,
    orientation: Orientation,
) -> Option<LineString<f64>> {
    let mouth_end = orientation.endpoint(line)?;
    let outside = clip_lines(
        &to_multi(lake.clone()),
        &MultiLineString::new(vec![line.clone()]),
        true,
    );
    let mut piece = merge_lines(&outside.0)
        .into_iter()
        .max_by(|a, b| Euclidean.length(a).total_cmp(&Euclidean.length(b)))?;

    let distance = |o: Orientation, piece: &LineString<f64>| {
        o.endpoint(piece)
            .map_or(f64::INFINITY, |c: Coord<f64>| Euclidean.distance(c, mouth_end))
    };
    if distance(orientation.opposite(), &piece) < distance(orientation, &piece) {
        piece.0.reverse();
    }
    let index = orientation.index(&piece);
    if Euclidean.distance(piece.0[index], mouth_end) < ROUNDING {
        piece.0[index] = mouth_end;
    }
    Some(piece)
}

/// Поглощение озёр устьями уровня `level`.
///
/// Возвращает число устьев уровня `level + 1`, появившихся вокруг
/// поглощённых озёр.
fn absorb_lakes(
    store: &mut FeatureStore,
    lakes: &mut Vec<LakeEntry>,
    level: u32,
    eps: f64,
    tree: &mut DrainageTree,
    absorbed: &mut Vec<SegmentId>,
) -> Result<usize> {
    let mut spawned = 0;

    for orientation in Orientation::BOTH {
        let mouth = Classification::RiverMouth { level, orientation };
        let mouths = store.ids(|s| s.classification == mouth);
        let mut taken = Vec::new();

        for lake in lakes.iter() {
            let mut matched = Vec::new();
            for &id in &mouths {
                let line = &store.require(id)?.geometry;
                let reaches = orientation.opposite().endpoint(line).is_some_and(|far| {
                    Euclidean.distance(&Point::from(far), &lake.polygon) < eps
                });
                if reaches {
                    matched.push(id);
                }
            }
            if matched.is_empty() {
                continue;
            }

            for &id in &matched {
                let line = store.require(id)?.geometry.clone();
                match cut_by_lake(&line, &lake.polygon, orientation) {
                    Some(piece) => store.set_geometry(id, piece)?,
                    None => debug!(id, lake = lake.id, "устье целиком внутри озера"),
                }
                tree.link(
                    DrainageNode::Lake(lake.id),
                    DrainageNode::Mouth {
                        id,
                        level,
                        orientation,
                    },
                );
            }

            let shore = TerminalBoundary::new([(BoundaryOwner::Lake(lake.id), &lake.ring)]);
            let (start, end) = classify_pass(store, &shore, level + 1, eps, tree)?;
            spawned += start + end;
            debug!(lake = lake.id, level, mouths = matched.len(), spawned = start + end, "озеро поглощено");
            taken.push(lake.id);
        }

        lakes.retain(|lake| !taken.contains(&lake.id));
        absorbed.extend(taken);
    }
    Ok(spawned)
}

/// Собирает речную сеть от берега вглубь суши
pub fn assemble(store: &mut FeatureStore, params: &ConsolidationParams) -> Result<DrainageOutcome> {
    let eps = params.mouth_eps;
    let mut outcome = DrainageOutcome::default();

    let mut lakes = store
        .query(|s| s.classification.is_lake())
        .into_iter()
        .map(|s| {
            Ok(LakeEntry {
                id: s.id,
                polygon: make_polygon(&s.geometry)?,
                ring: s.geometry.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut boundary = TerminalBoundary::new(
        store
            .query(|s| s.classification.is_coast())
            .into_iter()
            .map(|s| (BoundaryOwner::Coast(s.id), &s.geometry)),
    );
    let mut level = 0;
    let mut from_lakes = 0;

    loop {
        let (start, end) = classify_pass(store, &boundary, level, eps, &mut outcome.tree)?;
        let spawned = absorb_lakes(
            store,
            &mut lakes,
            level,
            eps,
            &mut outcome.tree,
            &mut outcome.lakes_absorbed,
        )?;

        let step = LevelYield {
            level,
            start,
            end,
            from_lakes,
        };
        info!(level, start, end, from_lakes, "уровень собран");
        outcome.levels.push(step);
        if step.total() == 0 {
            break;
        }

        boundary = TerminalBoundary::new(
            store
                .query(|s| s.classification.mouth().is_some_and(|(l, _)| l == level))
                .into_iter()
                .map(|s| (BoundaryOwner::Mouth(s.id), &s.geometry)),
        );
        from_lakes = spawned;
        level += 1;
    }

    outcome.unresolved = store.ids(|s| s.classification == Classification::CandidateStream);
    for &id in &outcome.unresolved {
        warn!(id, "река не дошла ни до берега, ни до другой реки");
    }
    Ok(outcome)
}
