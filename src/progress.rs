//! Обновления прогресса конвейера дубляжа
//!
//! Отправляются через необязательный канал Tokio; отсутствие получателя
//! или закрытый канал никогда не прерывают обработку.

use std::path::PathBuf;
use tokio::sync::mpsc::Sender;

/// Обновление прогресса для отправки клиенту
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Началась обработка
    Started,
    /// Текст разбит на чанки
    Chunked {
        chunks: usize,
    },
    /// Синтезирован чанк
    ChunkSynthesized {
        index: usize,
        total: usize,
    },
    /// Чанк пропущен из-за ошибки
    ChunkFailed {
        index: usize,
    },
    /// Склейка чанков
    Concatenating,
    /// Согласование длительностей видео и аудио
    Harmonizing {
        target: f64,
    },
    /// Сборка итогового контейнера
    Muxing,
    /// Обработка завершена
    Finished {
        output: PathBuf,
    },
}

/// Асинхронно отправляет обновление прогресса
pub async fn send_progress(sender: &Option<Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(sender) = sender {
        if sender.send(update).await.is_err() {
            log::debug!("Progress receiver dropped");
        }
    }
}
