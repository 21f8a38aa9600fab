// src/thin.rs
//! Утончение площадных рек
//!
//! Широкая река, нарисованная залитым полигоном, заменяется своей осевой
//! линией. Ось строится по слегка сжатому полигону; от неё остаются только
//! куски, лежащие внутри ещё чуть сильнее сжатого полигона, чтобы отрезать
//! отростки к берегам.

use geo::LineString;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ConsolidationParams;
use crate::error::Result;
use crate::kernel::medial::approximate_medial_axis;
use crate::kernel::noding::merge_lines;
use crate::kernel::{buffer, close_ring, covers_line, make_polygon, to_multi};
use crate::segment::{CANDIDATE, Classification, Segment, SegmentId};
use crate::store::{FeatureStore, SegmentUpdate};

/// Итог утончения
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThinOutcome {
    /// Площадные реки, заменённые осевыми линиями
    pub thinned: usize,
    /// Площадные реки, у которых не нашлось оси
    pub without_axis: Vec<SegmentId>,
    /// Новые кандидаты из осевых линий
    pub axis_streams: usize,
    /// Открытые реки, переведённые в кандидаты
    pub line_streams: usize,
}

fn is_area_river(segment: &Segment, fill: &str) -> bool {
    segment.classification == Classification::AreaRiver
        || (segment.classification == Classification::RawStream && segment.has_style(fill))
}

/// Осевые линии одного полигона
pub fn center_lines(ring: &LineString<f64>, eps: f64) -> Result<Vec<LineString<f64>>> {
    let area = to_multi(make_polygon(&close_ring(ring))?);
    let core = buffer(&area, -eps / 100.0);
    let guard = buffer(&area, -eps / 50.0);

    let kept: Vec<LineString<f64>> = approximate_medial_axis(&core, eps / 2.0)?
        .into_iter()
        .map(|line| LineString::new(vec![line.start, line.end]))
        .filter(|line| covers_line(&guard, line))
        .collect();
    Ok(merge_lines(&kept))
}

/// Заменяет площадные реки осевыми линиями, открытые реки делает кандидатами
pub fn thin_area_rivers(store: &mut FeatureStore, params: &ConsolidationParams) -> Result<ThinOutcome> {
    let mut outcome = ThinOutcome::default();
    let fill = params.styles.area_river_fill.as_str();

    for id in store.ids(|s| is_area_river(s, fill)) {
        let ring = store.require(id)?.geometry.clone();
        let axis = center_lines(&ring, params.area_river_eps)?;
        if axis.is_empty() {
            warn!(id, "у площадной реки не найдена ось, оставлена как есть");
            outcome.without_axis.push(id);
            continue;
        }
        for line in axis {
            let stream = store.insert(Classification::CandidateStream, CANDIDATE, line);
            debug!(source = id, stream, "осевая линия площадной реки");
            outcome.axis_streams += 1;
        }
        store.delete(id)?;
        outcome.thinned += 1;
    }

    for id in store.ids(|s| s.classification == Classification::RawStream && !s.is_closed()) {
        store.update(
            id,
            SegmentUpdate {
                classification: Some(Classification::CandidateStream),
                name: Some(CANDIDATE.to_string()),
                geometry: None,
            },
        )?;
        outcome.line_streams += 1;
    }

    info!(
        thinned = outcome.thinned,
        axis_streams = outcome.axis_streams,
        line_streams = outcome.line_streams,
        "утончение рек завершено"
    );
    Ok(outcome)
}
