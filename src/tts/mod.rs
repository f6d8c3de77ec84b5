//! Модуль для синтеза речи
//!
//! Текст режется на чанки по границам предложений, чанки синтезируются
//! бэкендом (параллельно, если бэкенд это допускает) и склеиваются в одну
//! дорожку в исходном порядке.

pub mod chunker;
pub mod openai;
pub mod scheduler;

use std::path::Path;
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::media::asset::MediaAsset;

pub use chunker::{preprocess_text, split_into_chunks};
pub use scheduler::ChunkedSynthesisScheduler;

/// Допустимый режим вызова бэкенда
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendConcurrency {
    /// Бэкенд можно вызывать из нескольких задач одновременно
    ParallelSafe,
    /// Только последовательные вызовы (тяжелые модели с состоянием)
    SequentialOnly,
}

/// Бэкенд синтеза речи
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Имя бэкенда для логов
    fn name(&self) -> &str;

    fn concurrency(&self) -> BackendConcurrency;

    /// Расширение файлов, которые пишет бэкенд
    fn output_extension(&self) -> &str {
        "wav"
    }

    /// Синтезировать `text` в файл `output`
    async fn synthesize(&self, text: &str, output: &Path) -> anyhow::Result<()>;
}

/// Фрагмент текста для синтеза
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
    /// Необязательное ограничение длительности озвучки
    pub target_duration_seconds: Option<f64>,
}

/// Результат синтеза одного чанка
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub chunk_index: usize,
    pub audio_asset: Arc<MediaAsset>,
    pub actual_duration_seconds: f64,
}
