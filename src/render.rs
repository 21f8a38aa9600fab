// src/render.rs
//! Превью гидросети в PNG
//!
//! Каждая линия рисуется цветом своей роли: берега тёмные, озёра голубые,
//! устья окрашены по уровню, нерешённые кандидаты красные.

use geo::{BoundingRect, Coord, MultiLineString};
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::error::{Error, Result};
use crate::segment::Classification;
use crate::store::FeatureStore;

const BACKGROUND: Rgb<u8> = Rgb([250, 248, 240]);

/// Палитра уровней: чем дальше от берега, тем светлее
const LEVEL_COLORS: [[u8; 3]; 5] = [
    [10, 40, 140],
    [30, 90, 190],
    [60, 130, 220],
    [100, 170, 235],
    [150, 200, 245],
];

fn color(class: Classification) -> Option<Rgb<u8>> {
    let rgb = match class {
        Classification::Coast | Classification::IslandCoast => [40, 40, 40],
        Classification::RawCoastline => [160, 120, 60],
        Classification::GenericLake | Classification::NamedLake => [110, 190, 230],
        Classification::AreaRiver => [54, 134, 141],
        Classification::CandidateStream => [220, 30, 30],
        Classification::RiverMouth { level, .. } => {
            LEVEL_COLORS[(level as usize).min(LEVEL_COLORS.len() - 1)]
        }
        Classification::RawLake | Classification::RawStream => return None,
    };
    Some(Rgb(rgb))
}

/// Растровое превью сети
pub struct NetworkPreview {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl NetworkPreview {
    /// Рисует все сегменты таблицы; высота подбирается по пропорциям карты
    #[must_use]
    pub fn new(store: &FeatureStore, width: u32) -> Self {
        let all = MultiLineString::new(store.iter().map(|s| s.geometry.clone()).collect());
        let Some(bounds) = all.bounding_rect() else {
            return Self::blank(width, width);
        };

        let (span_x, span_y) = (
            bounds.width().max(f64::EPSILON),
            bounds.height().max(f64::EPSILON),
        );
        let height = ((span_y / span_x) * f64::from(width)).ceil().max(1.0) as u32;
        let scale = (f64::from(width.saturating_sub(1)) / span_x)
            .min(f64::from(height.saturating_sub(1)) / span_y);

        // Север сверху: y карты растёт вверх, y картинки вниз
        let project = |c: Coord<f64>| -> (f32, f32) {
            (
                ((c.x - bounds.min().x) * scale) as f32,
                ((bounds.max().y - c.y) * scale) as f32,
            )
        };

        let mut img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, BACKGROUND);
        for segment in store.iter() {
            let Some(rgb) = color(segment.classification) else {
                continue;
            };
            for line in segment.geometry.lines() {
                draw_line_segment_mut(&mut img, project(line.start), project(line.end), rgb);
            }
            if let Some((0, orientation)) = segment.classification.mouth() {
                if let Some(end) = orientation.endpoint(&segment.geometry) {
                    let (x, y) = project(end);
                    draw_filled_circle_mut(&mut img, (x as i32, y as i32), 2, rgb);
                }
            }
        }

        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    fn blank(width: u32, height: u32) -> Self {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, BACKGROUND);
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    pub fn save_as_png(&self, path: &str) -> Result<()> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                .ok_or_else(|| Error::Config("preview buffer has the wrong size".to_string()))?;
        img.save(path)?;
        Ok(())
    }
}

/// Сохраняет превью таблицы шириной `width` пикселей
pub fn save_preview_png(store: &FeatureStore, width: u32, path: &str) -> Result<()> {
    NetworkPreview::new(store, width).save_as_png(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    #[test]
    fn preview_keeps_map_proportions() {
        let mut store = FeatureStore::new();
        store.insert(
            Classification::Coast,
            "main",
            LineString::from(vec![(10.0, 10.0), (30.0, 10.0), (30.0, 20.0), (10.0, 20.0), (10.0, 10.0)]),
        );
        let preview = NetworkPreview::new(&store, 200);
        assert_eq!(preview.width, 200);
        assert_eq!(preview.height, 100);
        assert_eq!(preview.data.len(), 200 * 100 * 3);
    }

    #[test]
    fn preview_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let store = FeatureStore::new();
        save_preview_png(&store, 64, path.to_str().unwrap()).unwrap();
        assert!(path.exists());
    }
}
