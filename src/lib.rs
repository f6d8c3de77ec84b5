//! Основной файл библиотеки dub-sync
//!
//! Библиотека согласует длительности видео и синтезированной озвучки:
//! измеряет обе дорожки, меняет скорость одной или обеих в пределах
//! допустимого коэффициента (с сохранением высоты тона) и собирает
//! итоговый контейнер.
//!
//! Точка входа: [`DubSync`]. Полный конвейер с внешними сервисами
//! загрузки, распознавания и перевода находится в [`pipeline::DubbingPipeline`].

pub mod config;
pub mod error;
pub mod harmonizer;
pub mod logger;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod sync;
pub mod tts;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use crate::config::DubSyncConfig;
pub use crate::error::{DubSyncError, Result};
pub use crate::harmonizer::{HarmonizationPlan, HarmonizedPair, Harmonizer};
pub use crate::media::{AssetKind, AssetStore, FfmpegVideoEngine, MediaAsset, SpeedTransform, VideoEngine};
pub use crate::sync::Synchronizer;
pub use crate::tts::{BackendConcurrency, ChunkedSynthesisScheduler, SynthesisBackend};

use crate::utils::temp::WorkDir;

/// Основная структура для работы с библиотекой
pub struct DubSync {
    config: DubSyncConfig,
    store: Arc<AssetStore>,
    engine: Arc<dyn VideoEngine>,
    transform: SpeedTransform,
    synchronizer: Synchronizer,
}

impl DubSync {
    /// Создать экземпляр с видео-движком на базе FFmpeg
    pub fn new(config: DubSyncConfig) -> Result<Self> {
        let engine = Arc::new(FfmpegVideoEngine::from_config(&config));
        if !engine.tool().is_installed() {
            log::warn!("FFmpeg not found at {}, video operations will fail", config.ffmpeg_path);
        }
        Self::with_engine(config, engine)
    }

    /// Создать экземпляр с произвольным видео-движком
    pub fn with_engine(config: DubSyncConfig, engine: Arc<dyn VideoEngine>) -> Result<Self> {
        config.validate()?;

        let work_dir = Arc::new(WorkDir::new(config.work_dir.as_deref(), config.cleanup_temp_files)?);
        let store = Arc::new(AssetStore::new(work_dir));
        let transform = SpeedTransform::new(store.clone(), engine.clone());
        let synchronizer = Synchronizer::new(Harmonizer::new(transform.clone()), engine.clone(), store.clone())
            .with_config(&config);

        log::info!(
            "dub-sync initialized (max ratio {}x, preserve pitch: {}, work dir: {})",
            config.max_adjustment_ratio,
            config.preserve_pitch,
            store.work_dir().path().display()
        );

        Ok(Self {
            config,
            store,
            engine,
            transform,
            synchronizer,
        })
    }

    pub fn config(&self) -> &DubSyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn VideoEngine> {
        &self.engine
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// Зарегистрировать входной видеофайл
    pub fn import_video(&self, path: impl Into<PathBuf>) -> Result<Arc<MediaAsset>> {
        self.store.import(path, AssetKind::Video)
    }

    /// Зарегистрировать входной аудиофайл
    pub fn import_audio(&self, path: impl Into<PathBuf>) -> Result<Arc<MediaAsset>> {
        self.store.import(path, AssetKind::Audio)
    }

    /// Длительность ассета в секундах
    pub fn probe(&self, asset: &MediaAsset) -> Result<f64> {
        self.transform.probe().probe(asset)
    }

    /// Привести ассет к целевой длительности
    pub fn adjust(&self, asset: &Arc<MediaAsset>, target_duration: f64, preserve_pitch: bool) -> Result<Arc<MediaAsset>> {
        self.transform.adjust(asset, target_duration, preserve_pitch)
    }

    /// План согласования с настройками из конфигурации (цель равна среднему)
    pub fn plan(&self, video: &Arc<MediaAsset>, audio: &Arc<MediaAsset>) -> Result<HarmonizationPlan> {
        Ok(HarmonizationPlan::new(video.clone(), audio.clone(), self.config.max_adjustment_ratio)?
            .with_preserve_pitch(self.config.preserve_pitch))
    }

    pub fn harmonize(&self, plan: &HarmonizationPlan) -> Result<HarmonizedPair> {
        self.synchronizer.harmonizer().harmonize(plan)
    }

    /// Подогнать видео под озвучку и собрать итоговый файл.
    ///
    /// Без `output` файл создается в `output_dir` с отметкой времени в имени.
    pub fn sync(&self, video: &Arc<MediaAsset>, audio: &Arc<MediaAsset>, output: Option<&Path>) -> Result<Arc<MediaAsset>> {
        let output = match output {
            Some(path) => path.to_path_buf(),
            None => self.default_output_path(video.path()),
        };
        self.synchronizer.sync(video, audio, &output)
    }

    /// Планировщик синтеза для указанного бэкенда
    pub fn scheduler(&self, backend: Arc<dyn SynthesisBackend>) -> ChunkedSynthesisScheduler {
        ChunkedSynthesisScheduler::new(backend, self.store.clone(), self.transform.clone()).with_config(&self.config)
    }

    /// `output_dir/synchronized_video_<timestamp>.<ext исходного видео>`
    pub fn default_output_path(&self, video: &Path) -> PathBuf {
        let extension = video.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
        WorkDir::output_path(&self.config.output_dir, "synchronized_video", extension)
    }

    /// Удалить рабочие файлы запуска и устаревшие файлы прошлых запусков.
    ///
    /// Если задан `max_output_files`, в `output_dir` остаются только самые
    /// новые итоговые файлы.
    pub fn cleanup(&self) -> Result<()> {
        if let Some(keep) = self.config.max_output_files {
            WorkDir::prune_outputs(&self.config.output_dir, keep)?;
        }
        if !self.config.cleanup_temp_files {
            return Ok(());
        }
        let work_dir = self.store.work_dir();
        work_dir.remove_stale(Duration::from_secs(self.config.max_temp_age_hours * 3600))?;
        work_dir.cleanup()
    }
}
