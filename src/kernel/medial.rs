// src/kernel/medial.rs
//! Приближённая срединная ось (хордовая ось)
//!
//! Граница полигона сгущается, точки триангулируются по Делоне, треугольники
//! вне полигона отбрасываются. Внутренние рёбра (общие для двух треугольников)
//! считаются хордами; ось проходит через их середины.

use std::collections::HashMap;

use geo::{Centroid, Coord, Densify, Euclidean, Line, MultiPolygon, Polygon, TriangulateDelaunay};

use super::{GeometryError, covers_point};

type VertexKey = (u64, u64);

fn vertex_key(c: Coord<f64>) -> VertexKey {
    (c.x.to_bits(), c.y.to_bits())
}

fn edge_key(a: Coord<f64>, b: Coord<f64>) -> (VertexKey, VertexKey) {
    let (ka, kb) = (vertex_key(a), vertex_key(b));
    if ka < kb { (ka, kb) } else { (kb, ka) }
}

fn midpoint(a: Coord<f64>, b: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (a.x + b.x) / 2.0,
        y: (a.y + b.y) / 2.0,
    }
}

/// Срединная ось области в виде набора отрезков
pub fn approximate_medial_axis(
    area: &MultiPolygon<f64>,
    spacing: f64,
) -> Result<Vec<Line<f64>>, GeometryError> {
    let mut axis = Vec::new();
    for polygon in area {
        axis.extend(polygon_axis(polygon, spacing)?);
    }
    Ok(axis)
}

fn polygon_axis(polygon: &Polygon<f64>, spacing: f64) -> Result<Vec<Line<f64>>, GeometryError> {
    // Ни одно ребро кольца не длиннее `spacing`
    let dense = Euclidean.densify(polygon, spacing);

    let triangles = dense
        .unconstrained_triangulation()
        .map_err(|e| GeometryError::Triangulation(e.to_string()))?;

    let inside: Vec<geo::Triangle<f64>> = triangles
        .into_iter()
        .filter(|t| covers_point(polygon, t.centroid().0))
        .collect();

    let mut usage: HashMap<(VertexKey, VertexKey), u8> = HashMap::new();
    for t in &inside {
        let [a, b, c] = t.to_array();
        for (p, q) in [(a, b), (b, c), (c, a)] {
            *usage.entry(edge_key(p, q)).or_default() += 1;
        }
    }

    let mut axis = Vec::new();
    for t in &inside {
        let [a, b, c] = t.to_array();
        let chords: Vec<Coord<f64>> = [(a, b), (b, c), (c, a)]
            .into_iter()
            .filter(|(p, q)| usage.get(&edge_key(*p, *q)).copied().unwrap_or(0) >= 2)
            .map(|(p, q)| midpoint(p, q))
            .collect();
        match chords.as_slice() {
            [m1, m2] => axis.push(Line::new(*m1, *m2)),
            [_, _, _] => {
                // Развилка: соединяем середины хорд через центр треугольника
                let centroid = t.centroid().0;
                axis.extend(chords.iter().map(|m| Line::new(centroid, *m)));
            }
            _ => {}
        }
    }
    Ok(axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Distance, LineString};

    #[test]
    fn axis_of_a_thin_strip_runs_along_its_middle() {
        let strip = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 0.01), (0.0, 0.01), (0.0, 0.0)]),
            vec![],
        );
        let axis = approximate_medial_axis(&MultiPolygon::new(vec![strip]), 0.002).unwrap();
        assert!(!axis.is_empty());

        let middle: Vec<&Line<f64>> = axis
            .iter()
            .filter(|l| l.start.x > 0.05 && l.start.x < 0.95)
            .collect();
        assert!(!middle.is_empty());
        assert!(
            middle
                .iter()
                .all(|l| (l.start.y - 0.005).abs() < 1e-9 && (l.end.y - 0.005).abs() < 1e-9)
        );
    }

    #[test]
    fn axis_of_a_fork_meets_inside_the_junction() {
        // Буква «T»: горизонтальная перекладина и ножка вниз от её середины
        let tee = Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (0.45, 0.0),
                (0.45, -0.5),
                (0.55, -0.5),
                (0.55, 0.0),
                (1.0, 0.0),
                (1.0, 0.1),
                (0.0, 0.1),
                (0.0, 0.0),
            ]),
            vec![],
        );
        let axis = approximate_medial_axis(&MultiPolygon::new(vec![tee.clone()]), 0.02).unwrap();
        assert!(!axis.is_empty());
        let near = |c: Coord<f64>| Euclidean.distance(&geo::Point::from(c), &tee) < 0.02;
        assert!(axis.iter().all(|l| near(l.start) && near(l.end)));
        assert!(axis.iter().any(|l| l.start.y < -0.3 || l.end.y < -0.3));
    }
}
