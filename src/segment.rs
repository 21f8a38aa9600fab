// src/segment.rs
//! Сегмент: единственная сущность гидросети
//!
//! Каждая запись хранит линию (возможно замкнутую), роль в конвейере,
//! имя и стиль отрисовки. Роль меняется только «вперёд» по стадиям.

use geo::{Coord, Euclidean, Length, LineString};
use serde::{Deserialize, Serialize};

/// Идентификатор сегмента (монотонно растущий, не переиспользуется)
pub type SegmentId = u64;

/// Имя не задано
pub const UNSET_NAME: &str = "-";
/// Безымянное озеро
pub const NAMELESS: &str = "nameless";
/// Имя кандидата в реки после утончения
pub const CANDIDATE: &str = "candidate";
/// Имя площадной реки, вырезанной из берега острова
pub const AREA_RIVER: &str = "temporary area river";

/// Какой конец линии касается граничной линии
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Start,
    End,
}

impl Orientation {
    /// Порядок обработки внутри одного прохода
    pub const BOTH: [Orientation; 2] = [Orientation::Start, Orientation::End];

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Orientation::Start => Orientation::End,
            Orientation::End => Orientation::Start,
        }
    }

    /// Соответствующий конец линии
    #[must_use]
    pub fn endpoint(self, line: &LineString<f64>) -> Option<Coord<f64>> {
        match self {
            Orientation::Start => line.0.first().copied(),
            Orientation::End => line.0.last().copied(),
        }
    }

    /// Индекс соответствующей вершины
    #[must_use]
    pub fn index(self, line: &LineString<f64>) -> usize {
        match self {
            Orientation::Start => 0,
            Orientation::End => line.0.len().saturating_sub(1),
        }
    }
}

/// Роль сегмента в конвейере
///
/// Первые три варианта это входные данные. Остальные появляются по мере
/// прохождения стадий; ранг ([`Classification::rank`]) никогда не убывает.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// Исходная береговая линия
    RawCoastline,
    /// Исходный контур озера
    RawLake,
    /// Исходная река (линией или залитой площадью)
    RawStream,
    /// Консолидированный берег (`0`)
    Coast,
    /// Контур особого острова
    IslandCoast,
    /// Безымянное озеро
    GenericLake,
    /// Озеро, покрывающее известную точку
    NamedLake,
    /// Широкая река, нарисованная залитым полигоном
    AreaRiver,
    /// Кандидат в реки (осевая линия)
    CandidateStream,
    /// Устье на уровне `level`; `orientation` указывает конец, лежащий на граничной линии
    RiverMouth { level: u32, orientation: Orientation },
}

impl Classification {
    /// Ранг стадии
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Classification::RawCoastline | Classification::RawLake | Classification::RawStream => 0,
            Classification::Coast => 1,
            Classification::IslandCoast => 2,
            Classification::GenericLake => 3,
            Classification::NamedLake => 4,
            Classification::AreaRiver => 5,
            Classification::CandidateStream => 6,
            Classification::RiverMouth { .. } => 7,
        }
    }

    /// Допустим ли переход `self -> next`
    #[must_use]
    pub fn can_become(self, next: Classification) -> bool {
        self == next || next.rank() > self.rank()
    }

    /// Береговая линия любой стадии: допустимая цель для сшивания
    #[must_use]
    pub fn is_coastline_like(self) -> bool {
        matches!(
            self,
            Classification::RawCoastline | Classification::Coast | Classification::IslandCoast
        )
    }

    /// Консолидированный берег: граница нулевого уровня
    #[must_use]
    pub fn is_coast(self) -> bool {
        matches!(self, Classification::Coast | Classification::IslandCoast)
    }

    #[must_use]
    pub fn is_lake(self) -> bool {
        matches!(self, Classification::GenericLake | Classification::NamedLake)
    }

    #[must_use]
    pub fn mouth(self) -> Option<(u32, Orientation)> {
        match self {
            Classification::RiverMouth { level, orientation } => Some((level, orientation)),
            _ => None,
        }
    }
}

/// Запись хранилища
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub classification: Classification,
    pub name: String,
    /// Подсказка отрисовки (например `fill: #36868d`)
    #[serde(default)]
    pub style: String,
    pub geometry: LineString<f64>,
}

impl Segment {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.geometry.0.len() >= 2 && self.geometry.is_closed()
    }

    #[must_use]
    pub fn has_style(&self, marker: &str) -> bool {
        !marker.is_empty() && self.style.contains(marker)
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        Euclidean.length(&self.geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        let mouth = Classification::RiverMouth {
            level: 0,
            orientation: Orientation::Start,
        };
        assert!(Classification::RawCoastline.can_become(Classification::Coast));
        assert!(Classification::GenericLake.can_become(Classification::NamedLake));
        assert!(Classification::CandidateStream.can_become(mouth));
        assert!(!mouth.can_become(Classification::CandidateStream));
        assert!(!Classification::NamedLake.can_become(Classification::GenericLake));
    }

    #[test]
    fn endpoints_follow_orientation() {
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 1.0)]);
        assert_eq!(
            Orientation::Start.endpoint(&line),
            Some(Coord { x: 0.0, y: 0.0 })
        );
        assert_eq!(Orientation::End.endpoint(&line), Some(Coord { x: 2.0, y: 1.0 }));
        assert_eq!(Orientation::End.index(&line), 2);
        assert_eq!(Orientation::Start.opposite(), Orientation::End);
    }
}
