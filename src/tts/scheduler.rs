//! Планировщик синтеза речи по чанкам
//!
//! Для бэкендов `ParallelSafe` чанки обрабатываются пулом задач Tokio,
//! ограниченным семафором. Для `SequentialOnly` строго по одному, независимо
//! от настроенного параллелизма. Порядок завершения задач не важен: перед
//! склейкой результаты сортируются по индексу чанка.
//!
//! Ошибка одного чанка не прерывает обработку: чанк пропускается с
//! предупреждением в логе.

use std::sync::Arc;
use futures::future::join_all;
use tokio::sync::mpsc::Sender;
use tokio::sync::Semaphore;
use crate::config::DubSyncConfig;
use crate::error::{DubSyncError, Result};
use crate::media::asset::{AssetKind, AssetStore, MediaAsset, Stage};
use crate::media::audio::{concatenate, decode_audio_file, encode_wav};
use crate::media::speed::SpeedTransform;
use crate::progress::{send_progress, ProgressUpdate};
use crate::tts::chunker::split_into_chunks;
use crate::tts::{BackendConcurrency, SynthesisBackend, SynthesisResult, TextChunk};

/// Все, что нужно задаче для синтеза одного чанка
#[derive(Clone)]
struct ChunkContext {
    backend: Arc<dyn SynthesisBackend>,
    store: Arc<AssetStore>,
    transform: SpeedTransform,
    preserve_pitch: bool,
    progress: Option<Sender<ProgressUpdate>>,
    total: usize,
}

/// Запустить блокирующую операцию в пуле Tokio
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DubSyncError::External(anyhow::Error::from(e)))?
}

impl ChunkContext {
    async fn synthesize(&self, chunk: TextChunk) -> Result<SynthesisResult> {
        let output = self
            .store
            .allocate(&format!("chunk_{}", chunk.index), self.backend.output_extension());

        log::debug!(
            "Synthesizing chunk {} with {} ({} chars)",
            chunk.index,
            self.backend.name(),
            chunk.text.chars().count()
        );

        if let Err(e) = self.backend.synthesize(&chunk.text, &output).await {
            if output.exists() {
                if let Err(remove_err) = tokio::fs::remove_file(&output).await {
                    log::warn!("Failed to remove {}: {}", output.display(), remove_err);
                }
            }
            return Err(DubSyncError::SynthesisBackend {
                chunk_index: chunk.index,
                reason: format!("{:#}", e),
            });
        }

        let asset = self.store.register(output, AssetKind::Audio, Stage::Synthesis, &[]);
        let probed = {
            let transform = self.transform.clone();
            let asset = asset.clone();
            blocking(move || transform.probe().probe(&asset)).await
        };
        let duration = match probed {
            Ok(duration) => duration,
            Err(e) => {
                self.transform.discard(&asset);
                return Err(e);
            }
        };

        match chunk.target_duration_seconds {
            Some(target) if duration > target => {
                // Только ускорение: замедленная речь звучит неестественно
                let transform = self.transform.clone();
                let source = asset.clone();
                let preserve_pitch = self.preserve_pitch;
                let adjusted = blocking(move || transform.adjust(&source, target, preserve_pitch)).await?;

                let actual = {
                    let transform = self.transform.clone();
                    let adjusted = adjusted.clone();
                    blocking(move || transform.probe().probe(&adjusted)).await?
                };
                log::info!(
                    "Chunk {} sped up: {:.2}s -> {:.2}s (target: {:.2}s)",
                    chunk.index,
                    duration,
                    actual,
                    target
                );

                Ok(SynthesisResult {
                    chunk_index: chunk.index,
                    audio_asset: adjusted,
                    actual_duration_seconds: actual,
                })
            }
            _ => Ok(SynthesisResult {
                chunk_index: chunk.index,
                audio_asset: asset,
                actual_duration_seconds: duration,
            }),
        }
    }

    /// Синтез с поглощением ошибки: неудачный чанк возвращает `None`
    async fn synthesize_or_skip(&self, chunk: TextChunk) -> Option<SynthesisResult> {
        let index = chunk.index;
        match self.synthesize(chunk).await {
            Ok(result) => {
                send_progress(
                    &self.progress,
                    ProgressUpdate::ChunkSynthesized {
                        index,
                        total: self.total,
                    },
                )
                .await;
                Some(result)
            }
            Err(e) => {
                log::warn!("Skipping chunk {}: {}", index, e);
                send_progress(&self.progress, ProgressUpdate::ChunkFailed { index }).await;
                None
            }
        }
    }
}

/// Планировщик синтеза
pub struct ChunkedSynthesisScheduler {
    backend: Arc<dyn SynthesisBackend>,
    store: Arc<AssetStore>,
    transform: SpeedTransform,
    max_chunk_chars: usize,
    max_concurrent_chunks: usize,
    preserve_pitch: bool,
    progress: Option<Sender<ProgressUpdate>>,
}

impl ChunkedSynthesisScheduler {
    pub fn new(backend: Arc<dyn SynthesisBackend>, store: Arc<AssetStore>, transform: SpeedTransform) -> Self {
        Self {
            backend,
            store,
            transform,
            max_chunk_chars: 150,
            max_concurrent_chunks: 2,
            preserve_pitch: true,
            progress: None,
        }
    }

    pub fn with_config(mut self, config: &DubSyncConfig) -> Self {
        self.max_chunk_chars = config.max_chunk_chars.max(1);
        self.max_concurrent_chunks = config.max_concurrent_chunks.max(1);
        self.preserve_pitch = config.preserve_pitch;
        self
    }

    pub fn with_progress(mut self, sender: Sender<ProgressUpdate>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    /// Разбить текст на чанки с текущими настройками
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        split_into_chunks(text, self.max_chunk_chars)
    }

    /// Синтезировать весь текст в одну дорожку
    pub async fn synthesize_text(&self, text: &str) -> Result<Arc<MediaAsset>> {
        let chunks = self.chunk(text);
        log::info!("Split text into {} chunks", chunks.len());
        send_progress(&self.progress, ProgressUpdate::Chunked { chunks: chunks.len() }).await;

        let total = chunks.len();
        let results = self.synthesize_chunks(chunks).await;
        if results.is_empty() {
            return Err(DubSyncError::SynthesisBackend {
                chunk_index: 0,
                reason: format!("none of {} chunks was synthesized", total),
            });
        }

        self.concatenate(&results).await
    }

    /// Синтезировать набор текстов, каждый как отдельный чанк.
    ///
    /// Если заданы целевые длительности, их количество должно совпадать с
    /// количеством текстов. Слишком длинная озвучка ускоряется до цели,
    /// короткая остается без изменений.
    pub async fn synthesize_batch(&self, texts: &[String], targets: Option<&[f64]>) -> Result<Vec<SynthesisResult>> {
        if let Some(targets) = targets {
            if targets.len() != texts.len() {
                return Err(DubSyncError::InputMismatch {
                    texts: texts.len(),
                    durations: targets.len(),
                });
            }
            if let Some(bad) = targets.iter().find(|t| !(**t > 0.0)) {
                return Err(DubSyncError::InvalidTarget(format!(
                    "chunk target duration must be positive, got {}",
                    bad
                )));
            }
        }

        let chunks = texts
            .iter()
            .enumerate()
            .map(|(index, text)| TextChunk {
                index,
                text: crate::tts::chunker::preprocess_text(text),
                target_duration_seconds: targets.map(|t| t[index]),
            })
            .collect();

        Ok(self.synthesize_chunks(chunks).await)
    }

    /// Синтезировать чанки; результат отсортирован по индексу,
    /// неудачные чанки пропущены.
    pub async fn synthesize_chunks(&self, chunks: Vec<TextChunk>) -> Vec<SynthesisResult> {
        let context = ChunkContext {
            backend: self.backend.clone(),
            store: self.store.clone(),
            transform: self.transform.clone(),
            preserve_pitch: self.preserve_pitch,
            progress: self.progress.clone(),
            total: chunks.len(),
        };

        let mut results: Vec<SynthesisResult> = match self.backend.concurrency() {
            BackendConcurrency::SequentialOnly => {
                log::info!("Synthesizing {} chunks sequentially with {}", chunks.len(), self.backend.name());
                let mut results = Vec::with_capacity(chunks.len());
                for chunk in chunks {
                    if let Some(result) = context.synthesize_or_skip(chunk).await {
                        results.push(result);
                    }
                }
                results
            }
            BackendConcurrency::ParallelSafe => {
                log::info!(
                    "Synthesizing {} chunks with {} (max concurrent: {})",
                    chunks.len(),
                    self.backend.name(),
                    self.max_concurrent_chunks
                );
                let semaphore = Arc::new(Semaphore::new(self.max_concurrent_chunks));
                let mut tasks = Vec::with_capacity(chunks.len());

                for chunk in chunks {
                    let context = context.clone();
                    let semaphore = semaphore.clone();
                    let index = chunk.index;
                    tasks.push(tokio::spawn(async move {
                        let _permit = match semaphore.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(e) => {
                                log::error!("Semaphore closed for chunk {}: {}", index, e);
                                return None;
                            }
                        };
                        context.synthesize_or_skip(chunk).await
                    }));
                }

                join_all(tasks)
                    .await
                    .into_iter()
                    .filter_map(|joined| match joined {
                        Ok(result) => result,
                        Err(e) => {
                            log::warn!("Chunk task panicked or was cancelled: {}", e);
                            None
                        }
                    })
                    .collect()
            }
        };

        results.sort_by_key(|r| r.chunk_index);
        results
    }

    /// Склеить результаты в одну дорожку в порядке индексов
    pub async fn concatenate(&self, results: &[SynthesisResult]) -> Result<Arc<MediaAsset>> {
        send_progress(&self.progress, ProgressUpdate::Concatenating).await;

        let mut ordered: Vec<&SynthesisResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.chunk_index);

        let paths: Vec<_> = ordered.iter().map(|r| r.audio_asset.path().to_path_buf()).collect();
        let parents: Vec<_> = ordered.iter().map(|r| r.audio_asset.id()).collect();
        let output = self.store.allocate("synthesized_speech", "wav");

        let target = output.clone();
        blocking(move || {
            let buffers = paths
                .iter()
                .map(decode_audio_file)
                .collect::<Result<Vec<_>>>()?;
            let combined = concatenate(&buffers).map_err(|e| DubSyncError::transform(&target, e))?;
            encode_wav(&combined, &target)
        })
        .await?;

        let asset = self
            .store
            .register(output, AssetKind::Audio, Stage::Concatenation, &parents);
        log::info!(
            "Concatenated {} chunks into {}",
            parents.len(),
            asset.path().display()
        );
        Ok(asset)
    }
}
