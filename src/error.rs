//! Ошибки прогона
//!
//! Локальные аномалии (незамкнутый берег, ненайденный остров, река без устья)
//! ошибками не являются: они попадают в отчёт. Сюда попадает только то,
//! что обрывает прогон целиком.

use thiserror::Error;

use crate::kernel::GeometryError;
use crate::store::StoreError;

/// Результат операций крейта.
pub type Result<T> = std::result::Result<T, Error>;

/// Ошибки, прерывающие прогон.
#[derive(Debug, Error)]
pub enum Error {
    /// Геометрия вырождена или некорректна.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Нарушен контракт хранилища.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Недопустимые параметры.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка чтения/записи таблицы.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка разбора конфигурации.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Ошибка сохранения превью.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
