// src/classify/lakes.rs
//! Озёра
//!
//! Два источника озёр: контуры, нарисованные как озёра (залитые цветом
//! озера), и замкнутые берега, вложенные в другой берег. Озеро получает имя,
//! если покрывает одну из известных точек.

use geo::{Euclidean, Length, LineString, MultiPolygon};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConsolidationParams, NamedSeed};
use crate::error::Result;
use crate::kernel::noding::merge_lines;
use crate::kernel::{boundary, buffer, close_ring, covers_point, make_polygon, to_multi};
use crate::segment::{Classification, NAMELESS, SegmentId};
use crate::simplify::make_valid_lake;
use crate::store::{FeatureStore, SegmentUpdate};

/// Итог подготовки нарисованных озёр
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LakePreparation {
    pub generic: usize,
    pub named: usize,
    /// Контуры, из которых не удалось собрать кольцо
    pub skipped: Vec<SegmentId>,
}

/// Итог поиска озёр среди вложенных берегов
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LakeDetection {
    pub generic: usize,
    pub named: usize,
    /// Вложенные берега, не давшие ни одного кольца
    pub rejected: Vec<SegmentId>,
}

/// Даёт озеру имя, если оно покрывает одну из известных точек
pub fn name_lake(
    store: &mut FeatureStore,
    id: SegmentId,
    seeds: &[NamedSeed],
) -> Result<Option<String>> {
    let polygon = make_polygon(&store.require(id)?.geometry)?;
    let Some(seed) = seeds
        .iter()
        .find(|s| covers_point(&polygon, (s.seed[0], s.seed[1]).into()))
    else {
        return Ok(None);
    };

    store.update(
        id,
        SegmentUpdate {
            classification: Some(Classification::NamedLake),
            name: Some(seed.name.clone()),
            geometry: None,
        },
    )?;
    info!(id, name = %seed.name, "найдено именованное озеро");
    Ok(Some(seed.name.clone()))
}

/// Превращает залитые контуры озёр в озёра.
///
/// Замкнутый контур принимается как есть. Открытый узлуется, самая длинная
/// часть замыкается добавлением её начальной точки.
pub fn prepare_lakes(
    store: &mut FeatureStore,
    params: &ConsolidationParams,
) -> Result<LakePreparation> {
    let mut outcome = LakePreparation::default();
    let marker = params.styles.lake_fill.as_str();
    let ids = store.ids(|s| s.classification == Classification::RawLake && s.has_style(marker));

    for id in ids {
        let geometry = store.require(id)?.geometry.clone();
        let ring = if geometry.0.len() >= 2 && geometry.is_closed() {
            geometry
        } else {
            let longest = merge_lines(std::slice::from_ref(&geometry))
                .into_iter()
                .max_by(|a, b| Euclidean.length(a).total_cmp(&Euclidean.length(b)));
            match longest {
                Some(piece) => close_ring(&piece),
                None => geometry,
            }
        };

        if ring.0.len() < 4 {
            warn!(id, points = ring.0.len(), "контур озера вырожден, пропущен");
            outcome.skipped.push(id);
            continue;
        }

        store.update(
            id,
            SegmentUpdate {
                classification: Some(Classification::GenericLake),
                name: Some(NAMELESS.to_string()),
                geometry: Some(ring),
            },
        )?;
        if name_lake(store, id, &params.lakes)?.is_some() {
            outcome.named += 1;
        } else {
            outcome.generic += 1;
        }
    }

    info!(
        generic = outcome.generic,
        named = outcome.named,
        skipped = outcome.skipped.len(),
        "нарисованные озёра подготовлены"
    );
    Ok(outcome)
}

/// Граница «высушенной» области: сжатие и обратный рост на `eps`
/// отрезают тонкие перешейки
fn dried_rings(area: &MultiPolygon<f64>, eps: f64) -> Vec<LineString<f64>> {
    let dried = buffer(&buffer(area, -eps), 2.0 * eps);
    boundary(&geo::BooleanOps::intersection(&dried, area))
}

/// Превращает оставшиеся замкнутые исходные берега в озёра
pub fn detect_lakes(store: &mut FeatureStore, params: &ConsolidationParams) -> Result<LakeDetection> {
    let mut outcome = LakeDetection::default();
    let eps = params.connect_eps;
    let ids = store.ids(|s| s.classification == Classification::RawCoastline && s.is_closed());

    for id in ids {
        let area = to_multi(make_polygon(&store.require(id)?.geometry)?);
        let rings = dried_rings(&area, eps);
        if rings.is_empty() {
            debug!(id, "берег слишком узок для озера");
            outcome.rejected.push(id);
            continue;
        }

        let lakes: Vec<LineString<f64>> = make_valid_lake(&rings, eps)?
            .into_iter()
            .filter(|ring| ring.0.len() >= 4 && ring.is_closed())
            .collect();
        if lakes.is_empty() {
            warn!(id, "из контура не собралось ни одного кольца");
            outcome.rejected.push(id);
            continue;
        }

        for ring in lakes {
            let lake = store.insert(Classification::GenericLake, NAMELESS, ring);
            debug!(source = id, lake, "найдено озеро");
            if name_lake(store, lake, &params.lakes)?.is_some() {
                outcome.named += 1;
            } else {
                outcome.generic += 1;
            }
        }
        store.delete(id)?;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::UNSET_NAME;

    fn square(x0: f64, y0: f64, side: f64) -> LineString<f64> {
        LineString::from(vec![
            (x0, y0),
            (x0 + side, y0),
            (x0 + side, y0 + side),
            (x0, y0 + side),
            (x0, y0),
        ])
    }

    fn params_with_lake(name: &str, seed: [f64; 2]) -> ConsolidationParams {
        ConsolidationParams {
            lakes: vec![NamedSeed {
                name: name.to_string(),
                seed,
            }],
            ..ConsolidationParams::default()
        }
    }

    #[test]
    fn filled_outlines_become_lakes() {
        let params = params_with_lake("Lake/Arain", [10.4, 10.11]);
        let mut store = FeatureStore::new();
        let named = store.insert_styled(
            Classification::RawLake,
            UNSET_NAME,
            "fill: #d4effc",
            LineString::from(vec![
                (10.4, 10.1),
                (10.41, 10.11),
                (10.4, 10.12),
                (10.39, 10.11),
                (10.4, 10.1),
            ]),
        );
        let open = store.insert_styled(
            Classification::RawLake,
            UNSET_NAME,
            "stroke: none; fill: #d4effc",
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
        );
        let unfilled = store.insert(Classification::RawLake, UNSET_NAME, square(5.0, 5.0, 1.0));

        let outcome = prepare_lakes(&mut store, &params).unwrap();

        assert_eq!((outcome.generic, outcome.named), (1, 1));
        let arain = store.get(named).unwrap();
        assert_eq!(arain.classification, Classification::NamedLake);
        assert_eq!(arain.name, "Lake/Arain");

        let closed = store.get(open).unwrap();
        assert_eq!(closed.classification, Classification::GenericLake);
        assert_eq!(closed.name, NAMELESS);
        assert!(closed.is_closed());

        assert_eq!(
            store.get(unfilled).unwrap().classification,
            Classification::RawLake
        );
    }

    #[test]
    fn nested_coast_becomes_named_lake() {
        let params = params_with_lake("Lake/Tontury", [0.5, 0.5]);
        let mut store = FeatureStore::new();
        let source = store.insert(Classification::RawCoastline, UNSET_NAME, square(0.4, 0.4, 0.2));

        let outcome = detect_lakes(&mut store, &params).unwrap();

        assert_eq!((outcome.generic, outcome.named), (0, 1));
        assert!(store.get(source).is_none());
        let lakes = store.query(|s| s.classification == Classification::NamedLake);
        assert_eq!(lakes.len(), 1);
        assert_eq!(lakes[0].name, "Lake/Tontury");
        assert!(lakes[0].is_closed());
        assert!((lakes[0].length() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn sliver_is_not_a_lake() {
        let params = ConsolidationParams::default();
        let mut store = FeatureStore::new();
        // Уже 2·eps: после сжатия ничего не остаётся
        let sliver = store.insert(
            Classification::RawCoastline,
            UNSET_NAME,
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 0.004), (0.0, 0.004), (0.0, 0.0)]),
        );

        let outcome = detect_lakes(&mut store, &params).unwrap();

        assert_eq!(outcome.rejected, vec![sliver]);
        assert_eq!(
            store.get(sliver).unwrap().classification,
            Classification::RawCoastline
        );
    }
}
