// src/classify/islands.rs
//! Особые острова
//!
//! Контур острова получается из замкнутого берега операцией
//! `union(buffer(buffer(P, +eps), -2·eps), P)`: узкие заливы (уже 2·eps)
//! заполняются сушей, широкие остаются. Береговые линии, оказавшиеся внутри
//! нового контура, становятся площадными реками.

use geo::{Area, BooleanOps, Intersects, LineString, MultiLineString, Polygon};
use tracing::{debug, info, warn};

use crate::config::{ConsolidationParams, IslandSelector};
use crate::error::Result;
use crate::kernel::noding::merge_lines;
use crate::kernel::{
    buffer, clip_lines, close_ring, covers_point, largest_polygon, make_polygon, to_multi,
    union_all,
};
use crate::segment::{AREA_RIVER, Classification, Segment, SegmentId};
use crate::store::FeatureStore;

/// Результат выделения одного острова
#[derive(Debug, Clone, PartialEq)]
pub struct Island {
    pub name: String,
    pub id: SegmentId,
    pub source: SegmentId,
    pub area_rivers: Vec<SegmentId>,
}

fn is_candidate(segment: &Segment) -> bool {
    segment.is_closed()
        && matches!(
            segment.classification,
            Classification::RawCoastline | Classification::Coast
        )
}

/// Замкнутый берег, из которого строится остров.
///
/// С точкой-семенем: самый маленький по площади берег, покрывающий её.
/// Без семени: берег с наибольшим периметром.
fn select_source(store: &FeatureStore, selector: &IslandSelector) -> Result<Option<SegmentId>> {
    let mut best: Option<(f64, SegmentId)> = None;
    for segment in store.query(is_candidate) {
        let polygon = make_polygon(&segment.geometry)?;
        let score = match selector.seed {
            Some([x, y]) => {
                if !covers_point(&polygon, (x, y).into()) {
                    continue;
                }
                -polygon.unsigned_area()
            }
            None => segment.length(),
        };
        if best.is_none_or(|(top, _)| score > top) {
            best = Some((score, segment.id));
        }
    }
    Ok(best.map(|(_, id)| id))
}

/// Контур острова
fn outline(source: &Polygon<f64>, eps: f64) -> Option<LineString<f64>> {
    let area = to_multi(source.clone());
    let filled = buffer(&buffer(&area, eps), -2.0 * eps).union(&area);
    largest_polygon(&filled).map(|p| p.exterior().clone())
}

/// Вырезает площадные реки: куски береговых линий внутри сжатого контура,
/// не попадающие в именованные озёра
fn encircle(
    store: &mut FeatureStore,
    island: &Polygon<f64>,
    params: &ConsolidationParams,
) -> Result<Vec<SegmentId>> {
    let named_lakes = store
        .query(|s| s.classification == Classification::NamedLake)
        .into_iter()
        .map(|s| make_polygon(&s.geometry))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let lakes = union_all(&named_lakes);
    let inner = buffer(&to_multi(island.clone()), -params.connect_eps);

    let shores = MultiLineString::new(
        store
            .query(|s| s.classification.is_coastline_like() && island.intersects(&s.geometry))
            .into_iter()
            .map(|s| s.geometry.clone())
            .collect(),
    );
    let inside = clip_lines(&inner, &shores, false);
    let outside_lakes = clip_lines(&lakes, &inside, true);

    let mut rivers = Vec::new();
    for piece in merge_lines(&outside_lakes.0) {
        let ring = close_ring(&piece);
        if ring.0.len() < 4 {
            debug!(points = ring.0.len(), "слишком короткий кусок берега пропущен");
            continue;
        }
        let id = store.insert_styled(
            Classification::AreaRiver,
            AREA_RIVER,
            params.styles.area_river_fill.clone(),
            ring,
        );
        debug!(id, "новая площадная река");
        rivers.push(id);
    }
    Ok(rivers)
}

/// Выделяет особые острова по списку селекторов.
///
/// Возвращает найденные острова и имена ненайденных.
pub fn extract_named_islands(
    store: &mut FeatureStore,
    params: &ConsolidationParams,
) -> Result<(Vec<Island>, Vec<String>)> {
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for selector in &params.islands {
        let Some(source) = select_source(store, selector)? else {
            warn!(island = %selector.name, "особый остров не найден");
            missing.push(selector.name.clone());
            continue;
        };

        let source_polygon = make_polygon(&store.require(source)?.geometry)?;
        let Some(ring) = outline(&source_polygon, params.connect_eps) else {
            warn!(island = %selector.name, source, "контур острова пуст");
            missing.push(selector.name.clone());
            continue;
        };
        let island_polygon = make_polygon(&ring)?;

        let id = store.insert(Classification::IslandCoast, selector.name.clone(), ring);
        let area_rivers = encircle(store, &island_polygon, params)?;
        store.delete(source)?;

        info!(
            island = %selector.name,
            id,
            source,
            area_rivers = area_rivers.len(),
            "особый остров выделен"
        );
        found.push(Island {
            name: selector.name.clone(),
            id,
            source,
            area_rivers,
        });
    }

    Ok((found, missing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::UNSET_NAME;

    fn selector(name: &str, seed: Option<[f64; 2]>) -> IslandSelector {
        IslandSelector {
            name: name.to_string(),
            seed,
        }
    }

    /// Квадрат с узким заливом шириной 0.004 и глубиной 0.3 в нижней стороне
    fn island_with_inlet() -> LineString<f64> {
        LineString::from(vec![
            (0.0, 0.0),
            (0.498, 0.0),
            (0.498, 0.3),
            (0.502, 0.3),
            (0.502, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.0, 0.0),
        ])
    }

    #[test]
    fn narrow_inlet_becomes_area_river() {
        let params = ConsolidationParams {
            islands: vec![selector("Coast/Harn", None)],
            ..ConsolidationParams::default()
        };
        let mut store = FeatureStore::new();
        let source = store.insert(Classification::RawCoastline, UNSET_NAME, island_with_inlet());

        let (found, missing) = extract_named_islands(&mut store, &params).unwrap();

        assert!(missing.is_empty());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, source);
        assert!(store.get(source).is_none());

        let island = store.get(found[0].id).unwrap();
        assert_eq!(island.classification, Classification::IslandCoast);
        assert_eq!(island.name, "Coast/Harn");
        assert!(island.is_closed());

        assert_eq!(found[0].area_rivers.len(), 1);
        let river = store.get(found[0].area_rivers[0]).unwrap();
        assert_eq!(river.classification, Classification::AreaRiver);
        assert_eq!(river.name, AREA_RIVER);
        assert!(river.has_style("fill: #36868d"));
        assert!(river.is_closed());
        // Оба берега залива попали в реку
        assert!(river.length() > 0.5);
    }

    #[test]
    fn named_lake_is_cut_out_of_area_rivers() {
        let params = ConsolidationParams {
            islands: vec![selector("Coast/Harn", None)],
            ..ConsolidationParams::default()
        };
        let mut store = FeatureStore::new();
        store.insert(Classification::RawCoastline, UNSET_NAME, island_with_inlet());
        // Озеро перекрывает залив поперёк на высоте 0.1..0.15
        store.insert(
            Classification::NamedLake,
            "Lake/Arain",
            LineString::from(vec![(0.45, 0.1), (0.55, 0.1), (0.55, 0.15), (0.45, 0.15), (0.45, 0.1)]),
        );

        let (found, _) = extract_named_islands(&mut store, &params).unwrap();

        // Нижние куски стенок вырождены, остаётся только верх залива
        assert_eq!(found[0].area_rivers.len(), 1);
        let river = store.get(found[0].area_rivers[0]).unwrap();
        // Ни одной вершины внутри озера или под ним
        assert!(river.geometry.coords().all(|c| c.y > 0.15 - 1e-9));
        assert!(river.length() < 0.35);
    }

    #[test]
    fn seed_outside_every_coast_is_reported_missing() {
        let params = ConsolidationParams {
            islands: vec![selector("Coast/Melderyn", Some([-15.3, 40.33]))],
            ..ConsolidationParams::default()
        };
        let mut store = FeatureStore::new();
        let source = store.insert(Classification::RawCoastline, UNSET_NAME, island_with_inlet());

        let (found, missing) = extract_named_islands(&mut store, &params).unwrap();

        assert!(found.is_empty());
        assert_eq!(missing, vec!["Coast/Melderyn".to_string()]);
        assert!(store.get(source).is_some());
    }

    #[test]
    fn seed_picks_the_innermost_coast() {
        let params = ConsolidationParams {
            islands: vec![selector("Coast/Melderyn", Some([5.5, 5.5]))],
            ..ConsolidationParams::default()
        };
        let mut store = FeatureStore::new();
        store.insert(
            Classification::RawCoastline,
            "main",
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
        );
        let small = store.insert(
            Classification::RawCoastline,
            UNSET_NAME,
            LineString::from(vec![(5.0, 5.0), (6.0, 5.0), (6.0, 6.0), (5.0, 6.0), (5.0, 5.0)]),
        );

        assert_eq!(
            select_source(&store, &params.islands[0]).unwrap(),
            Some(small)
        );
    }
}
