// src/kernel/mod.rs
//! Геометрическое ядро
//!
//! Тонкий слой над `geo`: булевы операции, буфер, отношения покрытия,
//! триангуляция. Поверх него то, чего в `geo` нет: узлование и слияние
//! линий ([`noding`]), приближённая срединная ось ([`medial`]) и индекс
//! граничной линии для запросов «ближайшая точка / пересечение».

pub mod medial;
pub mod noding;

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{
    Area, BooleanOps, Buffer, Closest, ClosestPoint, Coord, Distance, Euclidean, Intersects, Line,
    LineString, MultiLineString, MultiPolygon, Point, Polygon, Relate,
};
use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject};
use thiserror::Error;

use crate::segment::SegmentId;

/// Пересечения ближе этого к дальнему концу линии не считаются
const FAR_TOLERANCE: f64 = 1e-9;

/// Ошибки ядра. Любая из них фатальна для прогона.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("empty candidate set")]
    Empty,

    #[error("ring must be closed and have at least 4 coordinates, got {points}")]
    InvalidRing { points: usize },

    #[error("triangulation failed: {0}")]
    Triangulation(String),
}

/// Замыкает линию, добавляя в конец её первую точку
#[must_use]
pub fn close_ring(line: &LineString<f64>) -> LineString<f64> {
    let mut coords = line.0.clone();
    if let Some(&first) = coords.first() {
        if !line.is_closed() {
            coords.push(first);
        }
    }
    LineString::new(coords)
}

/// Полигон из замкнутого кольца
pub fn make_polygon(ring: &LineString<f64>) -> Result<Polygon<f64>, GeometryError> {
    if ring.0.len() < 4 || !ring.is_closed() {
        return Err(GeometryError::InvalidRing {
            points: ring.0.len(),
        });
    }
    Ok(Polygon::new(ring.clone(), vec![]))
}

#[must_use]
pub fn to_multi(polygon: Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon])
}

/// Буфер: положительное расстояние расширяет, отрицательное сжимает
#[must_use]
pub fn buffer(area: &MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
    if area.0.is_empty() {
        return MultiPolygon::new(vec![]);
    }
    area.buffer(distance)
}

/// Объединение набора полигонов
#[must_use]
pub fn union_all<'a>(polygons: impl IntoIterator<Item = &'a Polygon<f64>>) -> MultiPolygon<f64> {
    polygons
        .into_iter()
        .fold(MultiPolygon::new(vec![]), |acc, polygon| {
            acc.union(&to_multi(polygon.clone()))
        })
}

/// Граница области: внешние и внутренние кольца
#[must_use]
pub fn boundary(area: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
    let mut rings = Vec::new();
    for polygon in area {
        if polygon.exterior().0.len() >= 4 {
            rings.push(polygon.exterior().clone());
        }
        rings.extend(
            polygon
                .interiors()
                .iter()
                .filter(|ring| ring.0.len() >= 4)
                .cloned(),
        );
    }
    rings
}

/// Наибольший по площади полигон
#[must_use]
pub fn largest_polygon(area: &MultiPolygon<f64>) -> Option<&Polygon<f64>> {
    area.0
        .iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
}

/// Части линий внутри области (`invert = false`) или вне её (`invert = true`)
#[must_use]
pub fn clip_lines(
    area: &MultiPolygon<f64>,
    lines: &MultiLineString<f64>,
    invert: bool,
) -> MultiLineString<f64> {
    if area.0.is_empty() {
        return if invert {
            lines.clone()
        } else {
            MultiLineString::new(vec![])
        };
    }
    area.clip(lines, invert)
}

/// Область покрывает точку (внутри или на границе)
#[must_use]
pub fn covers_point(area: &Polygon<f64>, c: Coord<f64>) -> bool {
    area.intersects(&Point::from(c))
}

/// Область покрывает линию целиком
#[must_use]
pub fn covers_line(area: &MultiPolygon<f64>, line: &LineString<f64>) -> bool {
    area.relate(line).is_covers()
}

#[must_use]
pub fn covers_polygon(outer: &Polygon<f64>, inner: &Polygon<f64>) -> bool {
    outer.relate(inner).is_covers()
}

/// Кто владеет участком граничной линии
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryOwner {
    Coast(SegmentId),
    Lake(SegmentId),
    Mouth(SegmentId),
}

type OwnedSegment = GeomWithData<Line<f64>, BoundaryOwner>;

/// Граничная линия уровня: объединение линий с R*-деревом по отрезкам
pub struct TerminalBoundary {
    tree: RTree<OwnedSegment>,
}

impl TerminalBoundary {
    pub fn new<'a>(lines: impl IntoIterator<Item = (BoundaryOwner, &'a LineString<f64>)>) -> Self {
        let segments: Vec<OwnedSegment> = lines
            .into_iter()
            .flat_map(|(owner, line)| {
                line.lines()
                    .filter(|l| l.start != l.end)
                    .map(move |l| GeomWithData::new(l, owner))
            })
            .collect();
        Self {
            tree: RTree::bulk_load(segments),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Ближайшая точка границы и владелец этого участка
    #[must_use]
    pub fn nearest(&self, c: Coord<f64>) -> Option<(Coord<f64>, BoundaryOwner)> {
        let nearest = self.tree.nearest_neighbor(&Point::from(c))?;
        let line = nearest.geom();
        let point = match line.closest_point(&Point::from(c)) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => p.0,
            Closest::Indeterminate => line.start,
        };
        Some((point, nearest.data))
    }

    #[must_use]
    pub fn distance(&self, c: Coord<f64>) -> f64 {
        self.nearest(c)
            .map_or(f64::INFINITY, |(p, _)| Euclidean.distance(c, p))
    }

    /// Пересекает ли линия границу где-нибудь, кроме точки `far`.
    ///
    /// Перекрытие вдоль границы считается, если хотя бы один его конец
    /// отстоит от `far`.
    #[must_use]
    pub fn intersects_away_from(&self, line: &LineString<f64>, far: Coord<f64>) -> bool {
        let away = |c: Coord<f64>| Euclidean.distance(c, far) > FAR_TOLERANCE;
        line.lines().any(|segment| {
            self.tree
                .locate_in_envelope_intersecting(&segment.envelope())
                .any(|candidate| match line_intersection(segment, *candidate.geom()) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => away(intersection),
                    Some(LineIntersection::Collinear { intersection }) => {
                        away(intersection.start) || away(intersection.end)
                    }
                    None => false,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Length;

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
    fn polygon_requires_closed_ring() {
        let open = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
        assert_eq!(
            make_polygon(&open),
            Err(GeometryError::InvalidRing { points: 3 })
        );
        let closed = close_ring(&open);
        assert!(closed.is_closed());
        assert!(make_polygon(&closed).is_ok());
    }

    #[test]
    fn touching_at_the_far_end_is_ignored() {
        let ring = square(0.0, 0.0, 1.0);
        let boundary = TerminalBoundary::new([(BoundaryOwner::Coast(1), &ring)]);

        let ending_on_shore = LineString::from(vec![(0.5, 0.5), (0.5, 0.8), (0.5, 1.0)]);
        let far = Coord { x: 0.5, y: 1.0 };
        assert!(boundary.intersects_away_from(&ending_on_shore, Coord { x: 0.5, y: 0.5 }));
        assert!(!boundary.intersects_away_from(&ending_on_shore, far));

        let crossing_before = LineString::from(vec![(0.3, 1.2), (0.3, 0.8), (0.5, 1.0)]);
        assert!(boundary.intersects_away_from(&crossing_before, far));

        let along_shore = LineString::from(vec![(0.2, 1.0), (0.5, 1.0)]);
        assert!(boundary.intersects_away_from(&along_shore, far));
    }

    #[test]
    fn boundary_reports_nearest_point_and_owner() {
        let ring = square(10.0, 10.0, 10.0);
        let boundary = TerminalBoundary::new([(BoundaryOwner::Coast(7), &ring)]);

        let (p, owner) = boundary.nearest(Coord { x: 10.1, y: 10.0005 }).unwrap();
        assert_eq!(owner, BoundaryOwner::Coast(7));
        assert!((p.x - 10.1).abs() < 1e-9);
        assert!((p.y - 10.0).abs() < 1e-12);
        assert!((boundary.distance(Coord { x: 10.1, y: 10.0005 }) - 0.0005).abs() < 1e-9);
    }

    #[test]
    fn boundary_intersection_checks_every_segment() {
        let ring = square(0.0, 0.0, 1.0);
        let boundary = TerminalBoundary::new([(BoundaryOwner::Coast(1), &ring)]);

        let crossing = LineString::from(vec![(0.5, 0.5), (0.5, 0.8), (0.5, 1.2)]);
        let inside = LineString::from(vec![(0.2, 0.2), (0.8, 0.8)]);
        assert!(boundary.intersects_away_from(&crossing, Coord { x: 0.5, y: 0.5 }));
        assert!(!boundary.intersects_away_from(&inside, Coord { x: 0.2, y: 0.2 }));
    }

    #[test]
    fn clipping_removes_the_part_inside_a_lake() {
        let lake = to_multi(make_polygon(&square(0.0, 1.0, 1.0)).unwrap());
        let river = MultiLineString::new(vec![LineString::from(vec![(0.5, 0.0), (0.5, 1.5)])]);
        let outside = clip_lines(&lake, &river, true);
        let total = Euclidean.length(&outside);
        assert!((total - 1.0).abs() < 1e-9);
    }
}
