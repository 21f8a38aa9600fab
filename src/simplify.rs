// src/simplify.rs
//! Упрощение линий
//!
//! Несколько частей, которые, как считается, изображают один объект,
//! сводятся к одной простой линии (или к набору колец озера): части
//! узлуются и сливаются, самая короткая часть отбрасывается, и так до тех
//! пор, пока не останется одна часть.

use geo::{Euclidean, Length, LineString};
use tracing::trace;

use crate::kernel::GeometryError;
use crate::kernel::noding::merge_lines;

fn drop_shortest(parts: &mut Vec<LineString<f64>>) -> Option<f64> {
    let (index, shortest) = parts
        .iter()
        .enumerate()
        .map(|(i, p)| (i, Euclidean.length(p)))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    parts.remove(index);
    Some(shortest)
}

/// Сводит части к одной простой линии.
///
/// Для уже простой линии возвращает её без изменений.
pub fn make_valid_line(parts: &[LineString<f64>]) -> Result<LineString<f64>, GeometryError> {
    let first = parts.first().ok_or(GeometryError::Empty)?;

    let mut current = merge_lines(parts);
    loop {
        match current.len() {
            0 => return Ok(first.clone()),
            1 => return Ok(current.remove(0)),
            n => {
                let dropped = drop_shortest(&mut current);
                trace!(parts = n, ?dropped, "отброшена самая короткая часть");
                current = merge_lines(&current);
            }
        }
    }
}

/// Сводит части к набору колец озера.
///
/// Останавливается, когда самая короткая часть длиннее `eps`; все
/// оставшиеся части считаются контуром.
pub fn make_valid_lake(
    parts: &[LineString<f64>],
    eps: f64,
) -> Result<Vec<LineString<f64>>, GeometryError> {
    if parts.is_empty() {
        return Err(GeometryError::Empty);
    }

    let mut current = merge_lines(parts);
    while current.len() > 1 {
        let shortest = current
            .iter()
            .map(|p| Euclidean.length(p))
            .fold(f64::INFINITY, f64::min);
        if shortest > eps {
            break;
        }
        drop_shortest(&mut current);
        current = merge_lines(&current);
    }
    Ok(current)
}
