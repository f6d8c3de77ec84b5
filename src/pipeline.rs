//! Конвейер дубляжа
//!
//! Загрузка, распознавание и перевод выполняются внешними сервисами за
//! узкими трейтами. Конвейер только передает их результаты дальше:
//! из распознавания берется один сплошной текст, тайминги и спикеры
//! отбрасываются.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use crate::error::{DubSyncError, Result};
use crate::media::asset::{AssetKind, Stage};
use crate::progress::{send_progress, ProgressUpdate};
use crate::tts::SynthesisBackend;
use crate::DubSync;

/// Сервис получения исходного видео
#[async_trait]
pub trait AcquisitionService: Send + Sync {
    /// Скачать видео по `locator` в `dest_dir` и вернуть путь к файлу
    async fn acquire(&self, locator: &str, dest_dir: &Path) -> anyhow::Result<PathBuf>;
}

/// Сервис распознавания речи
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, audio: &Path, language: &str) -> anyhow::Result<Vec<Utterance>>;
}

/// Сервис перевода
#[async_trait]
pub trait TranslationService: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> anyhow::Result<String>;
}

/// Распознанная реплика
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f32,
}

/// Склеить тексты реплик через пробел
pub fn join_utterances(utterances: &[Utterance]) -> String {
    utterances
        .iter()
        .map(|u| u.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Запрос на дубляж
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DubbingRequest {
    /// Ссылка или путь, понятный сервису загрузки
    pub locator: String,
    pub source_language: String,
    pub target_language: String,
    /// Итоговый файл; по умолчанию имя с отметкой времени в `output_dir`
    pub output: Option<PathBuf>,
}

/// Конвейер дубляжа
pub struct DubbingPipeline {
    dub: DubSync,
    acquisition: Arc<dyn AcquisitionService>,
    transcription: Arc<dyn TranscriptionService>,
    translation: Arc<dyn TranslationService>,
    backend: Arc<dyn SynthesisBackend>,
    progress: Option<Sender<ProgressUpdate>>,
}

impl DubbingPipeline {
    pub fn new(
        dub: DubSync,
        acquisition: Arc<dyn AcquisitionService>,
        transcription: Arc<dyn TranscriptionService>,
        translation: Arc<dyn TranslationService>,
        backend: Arc<dyn SynthesisBackend>,
    ) -> Self {
        Self {
            dub,
            acquisition,
            transcription,
            translation,
            backend,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: Sender<ProgressUpdate>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn dub(&self) -> &DubSync {
        &self.dub
    }

    /// Выполнить весь конвейер. Рабочие файлы удаляются и при ошибке.
    pub async fn run(&self, request: &DubbingRequest) -> Result<PathBuf> {
        let result = self.run_stages(request).await;

        if let Err(e) = &result {
            log::error!("Dubbing of {} failed: {}", request.locator, e);
        }
        if let Err(e) = self.dub.cleanup() {
            log::warn!("Temporary files cleanup failed: {}", e);
        }

        result
    }

    async fn run_stages(&self, request: &DubbingRequest) -> Result<PathBuf> {
        if let Some(output) = &request.output {
            crate::sync::check_output(output)?;
        }
        send_progress(&self.progress, ProgressUpdate::Started).await;
        let store = self.dub.store().clone();

        // 1. Загрузка видео
        log::info!("Acquiring video: {}", request.locator);
        let video_path = self
            .acquisition
            .acquire(&request.locator, store.work_dir().path())
            .await?;
        let video = store.import(&video_path, AssetKind::Video)?;

        // 2. Извлечение аудио
        let extracted_path = store.allocate("extracted_audio", "wav");
        {
            let engine = self.dub.engine().clone();
            let input = video.path().to_path_buf();
            let output = extracted_path.clone();
            tokio::task::spawn_blocking(move || engine.extract_audio(&input, &output))
                .await
                .map_err(|e| DubSyncError::External(anyhow::Error::from(e)))??;
        }
        let extracted = store.register(extracted_path, AssetKind::Audio, Stage::Extraction, &[video.id()]);
        log::info!("Audio extracted to {}", extracted.path().display());

        // 3. Распознавание
        let utterances = self
            .transcription
            .transcribe(extracted.path(), &request.source_language)
            .await?;
        let transcript = join_utterances(&utterances);
        log::info!(
            "Transcribed {} utterances ({} chars)",
            utterances.len(),
            transcript.chars().count()
        );
        if transcript.is_empty() {
            return Err(DubSyncError::External(anyhow::anyhow!(
                "transcription of {} returned no text",
                video.path().display()
            )));
        }

        // 4. Перевод
        let translated = self
            .translation
            .translate(&transcript, &request.target_language)
            .await?;
        log::info!("Translated text to {} ({} chars)", request.target_language, translated.chars().count());

        // 5. Синтез речи
        let mut scheduler = self.dub.scheduler(self.backend.clone());
        if let Some(sender) = &self.progress {
            scheduler = scheduler.with_progress(sender.clone());
        }
        let speech = scheduler.synthesize_text(&translated).await?;

        // 6. Синхронизация
        let output = match &request.output {
            Some(path) => path.clone(),
            None => self.dub.default_output_path(video.path()),
        };
        let synchronizer = self.dub.synchronizer().clone();
        let plan = {
            let synchronizer = synchronizer.clone();
            let (video, speech) = (video.clone(), speech.clone());
            tokio::task::spawn_blocking(move || synchronizer.plan(&video, &speech))
                .await
                .map_err(|e| DubSyncError::External(anyhow::Error::from(e)))??
        };
        if let Some(target) = plan.target_duration {
            send_progress(&self.progress, ProgressUpdate::Harmonizing { target }).await;
        }

        let pair = {
            let synchronizer = synchronizer.clone();
            tokio::task::spawn_blocking(move || synchronizer.harmonizer().harmonize(&plan))
                .await
                .map_err(|e| DubSyncError::External(anyhow::Error::from(e)))??
        };

        send_progress(&self.progress, ProgressUpdate::Muxing).await;
        let final_asset = {
            let output = output.clone();
            tokio::task::spawn_blocking(move || synchronizer.mux(&pair, &output))
                .await
                .map_err(|e| DubSyncError::External(anyhow::Error::from(e)))??
        };

        log::info!("Done! Final video saved to: {}", final_asset.path().display());
        send_progress(
            &self.progress,
            ProgressUpdate::Finished {
                output: final_asset.path().to_path_buf(),
            },
        )
        .await;

        Ok(final_asset.path().to_path_buf())
    }
}
