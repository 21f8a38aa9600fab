// src/store.rs
//! Хранилище сегментов
//!
//! Единственный канал обмена между стадиями. Каждая стадия получает
//! `&mut FeatureStore` и является его единственным писателем на время прохода.
//! Изменения прохода применяются целиком или не применяются вовсе
//! ([`FeatureStore::transaction`]).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use geo::LineString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::segment::{Classification, Segment, SegmentId};

/// Нарушения контракта хранилища
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("segment {0} not found")]
    NotFound(SegmentId),

    #[error("segment {id}: classification cannot move back from {from:?} to {to:?}")]
    BackwardTransition {
        id: SegmentId,
        from: Classification,
        to: Classification,
    },
}

/// Частичное обновление записи
#[derive(Debug, Clone, Default)]
pub struct SegmentUpdate {
    pub classification: Option<Classification>,
    pub name: Option<String>,
    pub geometry: Option<LineString<f64>>,
}

/// Таблица сегментов с монотонным генератором идентификаторов
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureStore {
    #[serde(default)]
    next_id: SegmentId,
    segments: BTreeMap<SegmentId, Segment>,
}

impl FeatureStore {
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Пустое хранилище, выдающее идентификаторы начиная с `first_id`
    #[must_use]
    pub fn starting_at(first_id: SegmentId) -> Self {
        Self {
            next_id: first_id,
            segments: BTreeMap::new(),
        }
    }

    /// Путь к файлу таблицы для префикса
    #[must_use]
    pub fn table_path(table_prefix: &str) -> PathBuf {
        PathBuf::from(format!("{table_prefix}_lines.json"))
    }

    /// Открывает таблицу `<table_prefix>_lines.json`
    pub fn open(table_prefix: &str) -> Result<Self> {
        Self::load(Self::table_path(table_prefix))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut store: Self = serde_json::from_str(&contents)?;
        // Генератор продолжает с max(id) + 1, даже если файл правили руками
        let after_last = store.segments.keys().next_back().map_or(1, |id| id + 1);
        store.next_id = store.next_id.max(after_last);
        Ok(store)
    }

    /// Сохраняет таблицу через временный файл, чтобы не оставить половину записи
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Выполняет проход над копией таблицы.
    ///
    /// Копия заменяет таблицу только при `Ok`; при ошибке таблица остаётся
    /// в состоянии до прохода.
    pub fn transaction<T, E, F>(&mut self, pass: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut FeatureStore) -> std::result::Result<T, E>,
    {
        let mut staged = self.clone();
        let out = pass(&mut staged)?;
        *self = staged;
        Ok(out)
    }

    pub fn insert(
        &mut self,
        classification: Classification,
        name: impl Into<String>,
        geometry: LineString<f64>,
    ) -> SegmentId {
        self.insert_styled(classification, name, String::new(), geometry)
    }

    pub fn insert_styled(
        &mut self,
        classification: Classification,
        name: impl Into<String>,
        style: impl Into<String>,
        geometry: LineString<f64>,
    ) -> SegmentId {
        let id = self.next_id;
        self.next_id += 1;
        self.segments.insert(
            id,
            Segment {
                id,
                classification,
                name: name.into(),
                style: style.into(),
                geometry,
            },
        );
        id
    }

    pub fn update(&mut self, id: SegmentId, update: SegmentUpdate) -> Result<()> {
        let segment = self.segments.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(next) = update.classification {
            if !segment.classification.can_become(next) {
                return Err(StoreError::BackwardTransition {
                    id,
                    from: segment.classification,
                    to: next,
                }
                .into());
            }
            segment.classification = next;
        }
        if let Some(name) = update.name {
            segment.name = name;
        }
        if let Some(geometry) = update.geometry {
            segment.geometry = geometry;
        }
        Ok(())
    }

    pub fn set_geometry(&mut self, id: SegmentId, geometry: LineString<f64>) -> Result<()> {
        self.update(
            id,
            SegmentUpdate {
                geometry: Some(geometry),
                ..SegmentUpdate::default()
            },
        )
    }

    pub fn reclassify(&mut self, id: SegmentId, classification: Classification) -> Result<()> {
        self.update(
            id,
            SegmentUpdate {
                classification: Some(classification),
                ..SegmentUpdate::default()
            },
        )
    }

    pub fn rename(&mut self, id: SegmentId, name: impl Into<String>) -> Result<()> {
        self.update(
            id,
            SegmentUpdate {
                name: Some(name.into()),
                ..SegmentUpdate::default()
            },
        )
    }

    pub fn delete(&mut self, id: SegmentId) -> Result<Segment> {
        Ok(self.segments.remove(&id).ok_or(StoreError::NotFound(id))?)
    }

    #[must_use]
    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    /// Запись, которая обязана существовать
    pub fn require(&self, id: SegmentId) -> Result<&Segment> {
        Ok(self.segments.get(&id).ok_or(StoreError::NotFound(id))?)
    }

    /// Все записи, удовлетворяющие предикату, по возрастанию id
    pub fn query<P>(&self, predicate: P) -> Vec<&Segment>
    where
        P: Fn(&Segment) -> bool,
    {
        self.segments.values().filter(|s| predicate(s)).collect()
    }

    /// Идентификаторы записей, удовлетворяющих предикату, по возрастанию
    pub fn ids<P>(&self, predicate: P) -> Vec<SegmentId>
    where
        P: Fn(&Segment) -> bool,
    {
        self.segments
            .values()
            .filter(|s| predicate(s))
            .map(|s| s.id)
            .collect()
    }

    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Segment) -> bool,
    {
        self.segments.values().filter(|s| predicate(s)).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::segment::UNSET_NAME;

    fn line() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut store = FeatureStore::starting_at(100_000);
        let a = store.insert(Classification::RawCoastline, UNSET_NAME, line());
        let b = store.insert(Classification::RawCoastline, UNSET_NAME, line());
        store.delete(b).unwrap();
        let c = store.insert(Classification::RawStream, UNSET_NAME, line());
        assert_eq!((a, b, c), (100_000, 100_001, 100_002));
        assert_eq!(store.ids(|_| true), vec![100_000, 100_002]);
    }

    #[test]
    fn backward_transition_is_rejected() {
        let mut store = FeatureStore::new();
        let id = store.insert(Classification::RawLake, UNSET_NAME, line());
        store.reclassify(id, Classification::NamedLake).unwrap();
        let err = store.reclassify(id, Classification::GenericLake).unwrap_err();
        assert!(matches!(
            err,
            Error::Store(StoreError::BackwardTransition { .. })
        ));
        assert_eq!(
            store.get(id).unwrap().classification,
            Classification::NamedLake
        );
    }

    #[test]
    fn failed_transaction_leaves_table_untouched() {
        let mut store = FeatureStore::new();
        let id = store.insert(Classification::RawCoastline, UNSET_NAME, line());

        let result: Result<()> = store.transaction(|s| {
            s.delete(id)?;
            s.insert(Classification::Coast, "main", line());
            s.delete(12345)?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(store.ids(|_| true), vec![id]);
        assert_eq!(
            store.insert(Classification::RawStream, UNSET_NAME, line()),
            id + 1,
            "rolled back inserts must not consume ids"
        );
    }

    #[test]
    fn save_and_load_keep_allocator_ahead() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_lines.json");

        let mut store = FeatureStore::new();
        store.insert_styled(Classification::RawStream, UNSET_NAME, "fill: #36868d", line());
        store.insert(Classification::RawCoastline, UNSET_NAME, line());
        store.save(&path).unwrap();

        let mut loaded = FeatureStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(1).unwrap().style, "fill: #36868d");
        assert_eq!(loaded.insert(Classification::RawStream, UNSET_NAME, line()), 3);
    }
}
