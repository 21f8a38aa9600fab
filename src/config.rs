// src/config.rs
//! Конфигурация консолидации
//!
//! Этот модуль определяет все параметры, управляющие сборкой гидросети:
//! - Допуски связности (эпсилоны) для берегов, устьев и площадных рек
//! - Маркеры стилей, по которым распознаются залитые реки и озёра
//! - Именованные острова и озёра (точки-«семена» для конкретной карты)
//!
//! Все структуры поддерживают сериализацию в TOML/JSON для удобной настройки через конфигурационные файлы.
//! Значения читаются один раз и не меняются во время прогона.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Именованная точка-«семя»: озеро с таким именем должно покрывать точку `seed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedSeed {
    /// Имя объекта, например `Lake/Arain`
    pub name: String,
    /// Координаты точки `[x, y]` в единицах карты
    pub seed: [f64; 2],
}

/// Описание особого острова
///
/// Если `seed` задан, островом считается замкнутый берег, покрывающий эту точку.
/// Если нет, берётся замкнутый берег с наибольшим периметром.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IslandSelector {
    /// Имя острова, например `Coast/Melderyn`
    pub name: String,
    /// Точка внутри острова (необязательно)
    #[serde(default)]
    pub seed: Option<[f64; 2]>,
}

/// Маркеры стилей отрисовки
///
/// Стиль используется только как вторичный признак: залитая река рисуется
/// площадью, а не осевой линией.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleMarkers {
    /// Подстрока стиля залитой (площадной) реки
    #[serde(default = "default_area_river_fill")]
    pub area_river_fill: String,

    /// Подстрока стиля залитого озера
    #[serde(default = "default_lake_fill")]
    pub lake_fill: String,
}

fn default_area_river_fill() -> String {
    "fill: #36868d".to_string()
}
fn default_lake_fill() -> String {
    "fill: #d4effc".to_string()
}

impl Default for StyleMarkers {
    fn default() -> Self {
        Self {
            area_river_fill: default_area_river_fill(),
            lake_fill: default_lake_fill(),
        }
    }
}

/// Основные параметры консолидации
///
/// Полная конфигурация одного прогона. Поддерживает загрузку из TOML-файлов.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationParams {
    /// Префикс таблицы: данные лежат в `<table>_lines.json`
    #[serde(default = "default_table")]
    pub table: String,

    /// Максимальный зазор между концами береговых линий, считающийся разрывом
    /// (≈600 м на местности для карты Харна)
    #[serde(default = "default_connect_eps")]
    pub connect_eps: f64,

    /// Допуск, с которым конец реки считается лежащим на граничной линии
    #[serde(default = "default_mouth_eps")]
    pub mouth_eps: f64,

    /// Допуск для утончения площадных рек (рост/сжатие полигона)
    #[serde(default = "default_area_river_eps")]
    pub area_river_eps: f64,

    /// Подробный журнал (уровень `debug`)
    #[serde(default)]
    pub verbose: bool,

    /// Имя основного берега; если такого нет, берётся берег наибольшей площади
    #[serde(default = "default_main_coast_name")]
    pub main_coast_name: String,

    /// Особые острова
    #[serde(default)]
    pub islands: Vec<IslandSelector>,

    /// Именованные озёра
    #[serde(default)]
    pub lakes: Vec<NamedSeed>,

    /// Маркеры стилей
    #[serde(default)]
    pub styles: StyleMarkers,
}

fn default_table() -> String {
    "world".to_string()
}
fn default_connect_eps() -> f64 {
    0.006
}
fn default_mouth_eps() -> f64 {
    0.005
}
fn default_area_river_eps() -> f64 {
    0.004
}
fn default_main_coast_name() -> String {
    "main".to_string()
}

impl ConsolidationParams {
    /// Загружает параметры из TOML-файла
    ///
    /// # Пример
    /// ```toml
    /// table = "harn"
    /// connect_eps = 0.006
    ///
    /// [[islands]]
    /// name = "Coast/Melderyn"
    /// seed = [-15.3, 40.33]
    ///
    /// [[lakes]]
    /// name = "Lake/Arain"
    /// seed = [-17.7, 46.6]
    /// ```
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let params: Self = toml::from_str(&contents)?;
        params.validate()?;
        Ok(params)
    }

    /// Проверяет, что все допуски положительны и конечны.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("connect_eps", self.connect_eps),
            ("mouth_eps", self.mouth_eps),
            ("area_river_eps", self.area_river_eps),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        if self.table.trim().is_empty() {
            return Err(Error::Config("table prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for ConsolidationParams {
    fn default() -> Self {
        Self {
            table: default_table(),
            connect_eps: default_connect_eps(),
            mouth_eps: default_mouth_eps(),
            area_river_eps: default_area_river_eps(),
            verbose: false,
            main_coast_name: default_main_coast_name(),
            islands: Vec::new(),
            lakes: Vec::new(),
            styles: StyleMarkers::default(),
        }
    }
}
