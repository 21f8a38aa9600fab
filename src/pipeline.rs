// src/pipeline.rs
//! Полный прогон консолидации
//!
//! Стадии идут строго по очереди, каждая в собственном проходе над
//! хранилищем. Весь прогон тоже один проход: при ошибке на любой стадии
//! таблица остаётся такой, какой была до прогона.

use serde::Serialize;
use tracing::{info, warn};

use crate::classify::{classify_boundaries, prepare_lakes};
use crate::config::ConsolidationParams;
use crate::drainage::{DrainageTree, LevelYield, assemble};
use crate::error::Result;
use crate::segment::{Classification, SegmentId};
use crate::stitch::{stitch_coastlines, validate_lines};
use crate::store::FeatureStore;
use crate::thin::thin_area_rivers;

/// Сводка прогона по стадиям
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub table: String,

    // Сшивание
    pub lines_validated: usize,
    pub bridges_merged: usize,
    pub self_closed: usize,
    pub unresolved_coasts: Vec<SegmentId>,

    // Озёра, нарисованные как озёра
    pub drawn_lakes: usize,
    pub drawn_lakes_skipped: Vec<SegmentId>,

    // Классификация
    pub islands_found: Vec<String>,
    pub islands_missing: Vec<String>,
    pub coasts_promoted: usize,
    pub lakes_named: usize,
    pub lakes_generic: usize,
    pub lakes_rejected: Vec<SegmentId>,
    pub fragments_removed: usize,

    // Утончение
    pub area_rivers_extracted: usize,
    pub area_rivers_thinned: usize,
    pub area_rivers_without_axis: Vec<SegmentId>,
    pub candidate_streams: usize,

    // Сеть рек
    pub levels: Vec<LevelYield>,
    pub mouths: usize,
    pub lakes_absorbed: usize,
    pub unresolved_streams: Vec<SegmentId>,
}

impl Report {
    /// Число уровней с хотя бы одним устьем
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.iter().filter(|l| l.total() > 0).count()
    }
}

/// Прогоняет все стадии над хранилищем.
///
/// Возвращает сводку и дерево стока.
pub fn run_pipeline(
    store: &mut FeatureStore,
    params: &ConsolidationParams,
) -> Result<(Report, DrainageTree)> {
    params.validate()?;
    if store.is_empty() {
        warn!(table = %params.table, "таблица пуста, консолидировать нечего");
    }

    store.transaction(|store| {
        let mut report = Report {
            table: params.table.clone(),
            ..Report::default()
        };

        info!("🌊 Сшивание береговых линий");
        let stitch = store.transaction(|s| {
            let validated = validate_lines(s)?;
            let mut outcome = stitch_coastlines(s, params.connect_eps)?;
            outcome.validated = validated;
            Ok::<_, crate::error::Error>(outcome)
        })?;
        report.lines_validated = stitch.validated;
        report.bridges_merged = stitch.merged.len();
        report.self_closed = stitch.self_closed.len();
        report.unresolved_coasts = stitch.unresolved;

        info!("💧 Подготовка нарисованных озёр");
        let drawn = store.transaction(|s| prepare_lakes(s, params))?;
        report.drawn_lakes = drawn.generic + drawn.named;
        report.drawn_lakes_skipped = drawn.skipped;

        info!("🏝️ Классификация границ");
        let classes = store.transaction(|s| classify_boundaries(s, params))?;
        report.islands_found = classes.islands_found;
        report.islands_missing = classes.islands_missing;
        report.coasts_promoted = classes.coasts_promoted;
        report.lakes_named = classes.lakes_named + drawn.named;
        report.lakes_generic = classes.lakes_generic + drawn.generic;
        report.lakes_rejected = classes.lakes_rejected;
        report.fragments_removed = classes.fragments_removed.len();
        report.area_rivers_extracted = classes.area_rivers;

        info!("〰️ Утончение площадных рек");
        let thin = store.transaction(|s| thin_area_rivers(s, params))?;
        report.area_rivers_thinned = thin.thinned;
        report.area_rivers_without_axis = thin.without_axis;
        report.candidate_streams =
            store.count(|s| s.classification == Classification::CandidateStream);

        info!("🌳 Сборка речной сети");
        let drainage = store.transaction(|s| assemble(s, params))?;
        report.mouths = drainage.tree.mouth_count();
        report.levels = drainage.levels;
        report.lakes_absorbed = drainage.lakes_absorbed.len();
        report.unresolved_streams = drainage.unresolved;

        Ok((report, drainage.tree))
    })
}

/// Загружает `<table_prefix>_lines.json`, прогоняет все стадии и сохраняет
/// таблицу. При ошибке файл не меняется.
pub fn consolidate_and_assemble(
    table_prefix: &str,
    params: &ConsolidationParams,
) -> Result<Report> {
    let path = FeatureStore::table_path(table_prefix);
    let mut store = FeatureStore::load(&path)?;
    let (report, _) = run_pipeline(&mut store, params)?;
    store.save(&path)?;
    info!(
        table = table_prefix,
        segments = store.len(),
        "таблица сохранена"
    );
    Ok(report)
}
