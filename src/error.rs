//! Модуль обработки ошибок библиотеки dub-sync
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при работе библиотеки.
//! Каждая ошибка несет достаточно контекста (путь, длительности, коэффициент),
//! чтобы разобраться в причине без повторного запуска.

use std::path::PathBuf;
use thiserror::Error;

/// Ошибки библиотеки dub-sync
#[derive(Debug, Error)]
pub enum DubSyncError {
    /// Файл не удалось открыть или в нем нет метаданных дорожки
    #[error("Asset unreadable: {path}: {reason}")]
    AssetUnreadable {
        path: PathBuf,
        reason: String,
    },

    /// Ошибка декодирования/кодирования при изменении скорости
    #[error("Speed transform failed for {path}: {reason}")]
    TransformFailed {
        path: PathBuf,
        reason: String,
    },

    /// План гармонизации требует слишком сильного изменения скорости
    #[error(
        "Required speed adjustment ({required:.3}x) exceeds maximum allowed ratio ({max}x): \
         video {video_duration:.3}s, audio {audio_duration:.3}s, target {target:.3}s"
    )]
    ExcessiveAdjustment {
        required: f64,
        max: f64,
        video_duration: f64,
        audio_duration: f64,
        target: f64,
    },

    /// Ошибка бэкенда синтеза речи для одного чанка
    #[error("Synthesis backend failed for chunk {chunk_index}: {reason}")]
    SynthesisBackend {
        chunk_index: usize,
        reason: String,
    },

    /// Количество текстов не совпадает с количеством целевых длительностей
    #[error("Number of texts ({texts}) must match number of target durations ({durations})")]
    InputMismatch {
        texts: usize,
        durations: usize,
    },

    /// Ошибка сборки итогового контейнера
    #[error("Muxing into {output} failed: {reason}")]
    MuxFailed {
        output: PathBuf,
        reason: String,
    },

    /// Нарушен инвариант запроса (целевая длительность, коэффициент)
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка внешнего сервиса (загрузка, распознавание, перевод)
    #[error("External service error: {0}")]
    External(#[from] anyhow::Error),
}

impl DubSyncError {
    /// Ошибка чтения ассета
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::AssetUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Ошибка преобразования ассета
    pub fn transform(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::TransformFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Тип Result для библиотеки dub-sync
pub type Result<T> = std::result::Result<T, DubSyncError>;
