// src/stitch.rs
//! Сшивание береговых линий
//!
//! Открытые береговые линии замыкаются через короткие «мостики» между
//! концами: своими или соседних линий. Мостик длиннее `connect_eps`
//! не принимается; такая линия остаётся открытой и попадает в отчёт.

use std::collections::HashSet;

use geo::{Coord, Distance, Euclidean, LineString};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::segment::{Classification, Orientation, Segment, SegmentId, UNSET_NAME};
use crate::simplify::make_valid_line;
use crate::store::FeatureStore;

/// Кратчайшее соединение конца линии с концом другой (или той же) линии
#[derive(Debug, Clone, PartialEq)]
pub struct Bridge {
    pub partner: SegmentId,
    pub line: LineString<f64>,
    pub length: f64,
}

/// Итог сшивания
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StitchOutcome {
    /// Сколько исходных берегов прошло исправление самопересечений
    pub validated: usize,
    /// Пары (поглотившая, поглощённая)
    pub merged: Vec<(SegmentId, SegmentId)>,
    /// Линии, замкнувшиеся сами на себя
    pub self_closed: Vec<SegmentId>,
    /// Береговые линии, оставшиеся открытыми
    pub unresolved: Vec<SegmentId>,
}

/// Исправляет самопересечения каждой исходной береговой линии по отдельности
pub fn validate_lines(store: &mut FeatureStore) -> Result<usize> {
    let ids = store.ids(|s| s.classification == Classification::RawCoastline);
    for &id in &ids {
        let geometry = store.require(id)?.geometry.clone();
        let valid = make_valid_line(std::slice::from_ref(&geometry))?;
        if valid != geometry {
            debug!(id, "исправлена береговая линия");
            store.set_geometry(id, valid)?;
        }
    }
    Ok(ids.len())
}

/// Лучший мостик от линии `own` к концам `other`
fn bridge_to(own: &Segment, other: &Segment, eps: f64) -> Option<Bridge> {
    let mut best: Option<Bridge> = None;
    for own_end in Orientation::BOTH {
        let Some(a) = own_end.endpoint(&own.geometry) else {
            continue;
        };
        for other_end in Orientation::BOTH {
            if other.id == own.id && own_end == other_end {
                continue;
            }
            let Some(b) = other_end.endpoint(&other.geometry) else {
                continue;
            };
            let length = Euclidean.distance(a, b);
            if length >= eps || best.as_ref().is_some_and(|bridge| bridge.length <= length) {
                continue;
            }
            best = Some(Bridge {
                partner: other.id,
                line: LineString::new(vec![a, b]),
                length,
            });
        }
    }
    best
}

/// Кратчайший допустимый мостик от линии `id`.
///
/// Цель должна быть береговой линией любой стадии. При равной длине
/// выигрывает меньший id партнёра.
pub fn shortest_bridge(store: &FeatureStore, id: SegmentId, eps: f64) -> Result<Option<Bridge>> {
    let own = store.require(id)?;
    let targets = store.query(|s| s.classification.is_coastline_like());

    #[cfg(feature = "parallel")]
    let candidates = targets.par_iter();
    #[cfg(not(feature = "parallel"))]
    let candidates = targets.iter();

    Ok(candidates
        .filter_map(|other| bridge_to(own, other, eps))
        .min_by(|a, b| {
            a.length
                .total_cmp(&b.length)
                .then_with(|| a.partner.cmp(&b.partner))
        }))
}

/// Замыкает открытые исходные береговые линии.
///
/// Линии обходятся по возрастанию id; поглощённые линии удаляются и больше
/// не рассматриваются. Безымянная линия получает имя поглощённой.
pub fn stitch_coastlines(store: &mut FeatureStore, eps: f64) -> Result<StitchOutcome> {
    let mut outcome = StitchOutcome::default();
    let open = store.ids(|s| s.classification == Classification::RawCoastline && !s.is_closed());
    let mut consumed: HashSet<SegmentId> = HashSet::new();

    for id in open {
        if consumed.contains(&id) || store.get(id).is_none() {
            continue;
        }

        while !store.require(id)?.is_closed() {
            let Some(bridge) = shortest_bridge(store, id, eps)? else {
                break;
            };
            let own = store.require(id)?.geometry.clone();

            if bridge.partner == id {
                let closed = make_valid_line(&[own, bridge.line])?;
                store.set_geometry(id, closed)?;
                debug!(id, gap = bridge.length, "линия замкнута сама на себя");
                outcome.self_closed.push(id);
                break;
            }

            let partner = store.require(bridge.partner)?;
            let (partner, partner_name) = (partner.geometry.clone(), partner.name.clone());
            let merged = make_valid_line(&[partner, own, bridge.line])?;
            store.set_geometry(id, merged)?;
            if store.require(id)?.name == UNSET_NAME && partner_name != UNSET_NAME {
                store.rename(id, partner_name)?;
            }
            store.delete(bridge.partner)?;
            consumed.insert(bridge.partner);
            debug!(id, partner = bridge.partner, gap = bridge.length, "линии сшиты");
            outcome.merged.push((id, bridge.partner));
        }
    }

    outcome.unresolved = store.ids(|s| s.classification.is_coastline_like() && !s.is_closed());
    for &id in &outcome.unresolved {
        let ends: Vec<Coord<f64>> = store
            .get(id)
            .map(|s| Orientation::BOTH.iter().filter_map(|o| o.endpoint(&s.geometry)).collect())
            .unwrap_or_default();
        warn!(id, ?ends, "береговая линия осталась открытой");
    }

    info!(
        merged = outcome.merged.len(),
        self_closed = outcome.self_closed.len(),
        unresolved = outcome.unresolved.len(),
        "сшивание берегов завершено"
    );
    Ok(outcome)
}
