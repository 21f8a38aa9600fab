// src/classify/mod.rs
//! Классификация замкнутых границ
//!
//! Порядок фиксирован:
//! 1. особые острова (`islands`);
//! 2. внешние замкнутые берега становятся берегом `0`;
//! 3. вложенные замкнутые берега становятся озёрами (`lakes`);
//! 4. берега, целиком покрытые основным берегом, удаляются.

pub mod islands;
pub mod lakes;

use geo::{Area, Polygon};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ConsolidationParams;
use crate::error::Result;
use crate::kernel::{covers_polygon, make_polygon};
use crate::segment::{Classification, SegmentId};
use crate::store::FeatureStore;

pub use islands::{Island, extract_named_islands};
pub use lakes::{LakeDetection, LakePreparation, detect_lakes, name_lake, prepare_lakes};

/// Итог классификации
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifyOutcome {
    pub islands_found: Vec<String>,
    pub islands_missing: Vec<String>,
    pub area_rivers: usize,
    pub coasts_promoted: usize,
    pub lakes_generic: usize,
    pub lakes_named: usize,
    pub lakes_rejected: Vec<SegmentId>,
    pub fragments_removed: Vec<SegmentId>,
}

/// Замкнутые берега любой стадии с их полигонами
fn closed_shores(store: &FeatureStore) -> Result<Vec<(SegmentId, Classification, Polygon<f64>)>> {
    store
        .query(|s| s.classification.is_coastline_like() && s.is_closed())
        .into_iter()
        .map(|s| Ok((s.id, s.classification, make_polygon(&s.geometry)?)))
        .collect()
}

/// Замкнутые исходные берега, не покрытые никаким другим замкнутым берегом,
/// становятся берегом `0`.
///
/// Решение принимается по снимку до изменений.
pub fn promote_outer_coasts(store: &mut FeatureStore) -> Result<usize> {
    let shores = closed_shores(store)?;
    let outer: Vec<SegmentId> = shores
        .iter()
        .filter(|(_, class, _)| *class == Classification::RawCoastline)
        .filter(|(id, _, polygon)| {
            !shores
                .iter()
                .any(|(other, _, cover)| other != id && covers_polygon(cover, polygon))
        })
        .map(|(id, _, _)| *id)
        .collect();

    for &id in &outer {
        store.reclassify(id, Classification::Coast)?;
        debug!(id, "берег принят");
    }
    Ok(outer.len())
}

/// Основной берег: с именем `main_name`, иначе наибольший по площади.
///
/// Контур особого острова тоже может быть основным берегом.
fn main_coast(store: &FeatureStore, main_name: &str) -> Result<Option<(SegmentId, Polygon<f64>)>> {
    let coasts: Vec<(SegmentId, &str, Polygon<f64>)> = store
        .query(|s| s.classification.is_coast() && s.is_closed())
        .into_iter()
        .map(|s| Ok((s.id, s.name.as_str(), make_polygon(&s.geometry)?)))
        .collect::<Result<_>>()?;

    if let Some((id, _, polygon)) = coasts.iter().find(|(_, name, _)| *name == main_name) {
        return Ok(Some((*id, polygon.clone())));
    }
    Ok(coasts
        .into_iter()
        .max_by(|a, b| a.2.unsigned_area().total_cmp(&b.2.unsigned_area()))
        .map(|(id, _, polygon)| (id, polygon)))
}

/// Удаляет берега `0`, целиком покрытые основным берегом
pub fn remove_covered_fragments(store: &mut FeatureStore, main_name: &str) -> Result<Vec<SegmentId>> {
    let Some((main_id, main)) = main_coast(store, main_name)? else {
        return Ok(Vec::new());
    };

    let mut covered = Vec::new();
    for segment in store.query(|s| s.classification == Classification::Coast && s.id != main_id) {
        if segment.is_closed() && covers_polygon(&main, &make_polygon(&segment.geometry)?) {
            covered.push(segment.id);
        }
    }
    for &id in &covered {
        store.delete(id)?;
        debug!(id, main = main_id, "удалён поглощённый фрагмент берега");
    }
    Ok(covered)
}

/// Полный проход классификации
pub fn classify_boundaries(
    store: &mut FeatureStore,
    params: &ConsolidationParams,
) -> Result<ClassifyOutcome> {
    let (islands, missing) = extract_named_islands(store, params)?;
    let coasts_promoted = promote_outer_coasts(store)?;
    let lakes = detect_lakes(store, params)?;
    let fragments_removed = remove_covered_fragments(store, &params.main_coast_name)?;

    let outcome = ClassifyOutcome {
        area_rivers: islands.iter().map(|i| i.area_rivers.len()).sum(),
        islands_found: islands.into_iter().map(|i| i.name).collect(),
        islands_missing: missing,
        coasts_promoted,
        lakes_generic: lakes.generic,
        lakes_named: lakes.named,
        lakes_rejected: lakes.rejected,
        fragments_removed,
    };
    info!(
        islands = outcome.islands_found.len(),
        coasts = outcome.coasts_promoted,
        lakes = outcome.lakes_generic + outcome.lakes_named,
        "классификация границ завершена"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::UNSET_NAME;
    use geo::LineString;

    fn square(x0: f64, y0: f64, side: f64) -> LineString<f64> {
        LineString::from(vec![
            (x0, y0),
            (x0 + side, y0),
            (x0 + side, y0 + side),
            (x0, y0 + side),
            (x0, y0),
        ])
    }

    #[test]
    fn only_the_outermost_boundary_is_promoted() {
        let mut store = FeatureStore::new();
        let outer = store.insert(Classification::RawCoastline, "main", square(0.0, 0.0, 1.0));
        let inner = store.insert(Classification::RawCoastline, UNSET_NAME, square(0.4, 0.4, 0.2));
        let open = store.insert(
            Classification::RawCoastline,
            UNSET_NAME,
            LineString::from(vec![(3.0, 3.0), (4.0, 3.0)]),
        );

        assert_eq!(promote_outer_coasts(&mut store).unwrap(), 1);
        assert_eq!(store.get(outer).unwrap().classification, Classification::Coast);
        assert_eq!(
            store.get(inner).unwrap().classification,
            Classification::RawCoastline
        );
        assert_eq!(
            store.get(open).unwrap().classification,
            Classification::RawCoastline
        );
    }

    #[test]
    fn fragments_inside_main_are_removed() {
        let mut store = FeatureStore::new();
        let main = store.insert(Classification::Coast, "main", square(0.0, 0.0, 1.0));
        let fragment = store.insert(Classification::Coast, UNSET_NAME, square(0.2, 0.2, 0.1));
        let separate = store.insert(Classification::Coast, UNSET_NAME, square(5.0, 5.0, 1.0));

        let removed = remove_covered_fragments(&mut store, "main").unwrap();

        assert_eq!(removed, vec![fragment]);
        assert!(store.get(main).is_some());
        assert!(store.get(separate).is_some());
    }

    #[test]
    fn island_outline_can_be_the_main_coast() {
        let mut store = FeatureStore::new();
        let harn = store.insert(Classification::IslandCoast, "Coast/Harn", square(0.0, 0.0, 10.0));
        let fragment = store.insert(Classification::Coast, UNSET_NAME, square(2.0, 2.0, 1.0));
        let separate = store.insert(Classification::Coast, UNSET_NAME, square(20.0, 20.0, 2.0));

        let removed = remove_covered_fragments(&mut store, "Coast/Harn").unwrap();

        assert_eq!(removed, vec![fragment]);
        assert_eq!(
            store.get(harn).unwrap().classification,
            Classification::IslandCoast
        );
        assert!(store.get(separate).is_some());
    }

    #[test]
    fn largest_coast_is_main_when_none_is_named() {
        let mut store = FeatureStore::new();
        let small = store.insert(Classification::Coast, UNSET_NAME, square(0.2, 0.2, 0.1));
        let big = store.insert(Classification::Coast, UNSET_NAME, square(0.0, 0.0, 1.0));

        let removed = remove_covered_fragments(&mut store, "main").unwrap();

        assert_eq!(removed, vec![small]);
        assert!(store.get(big).is_some());
    }

    #[test]
    fn nested_coast_turns_into_lake() {
        let params = ConsolidationParams::default();
        let mut store = FeatureStore::new();
        let outer = store.insert(Classification::RawCoastline, "main", square(0.0, 0.0, 1.0));
        store.insert(Classification::RawCoastline, UNSET_NAME, square(0.4, 0.4, 0.2));

        let outcome = classify_boundaries(&mut store, &params).unwrap();

        assert_eq!(outcome.coasts_promoted, 1);
        assert_eq!(outcome.lakes_generic, 1);
        assert!(outcome.islands_missing.is_empty());
        assert_eq!(store.get(outer).unwrap().classification, Classification::Coast);
        assert_eq!(store.count(|s| s.classification == Classification::GenericLake), 1);
        assert_eq!(store.count(|s| s.classification == Classification::RawCoastline), 0);
    }
}
