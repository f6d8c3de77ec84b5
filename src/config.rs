//! Модуль конфигурации библиотеки dub-sync
//!
//! Этот модуль содержит структуры и перечисления для настройки библиотеки.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{DubSyncError, Result};

/// Модель TTS для использования с OpenAI API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TtsModel {
    /// Стандартная модель
    #[default]
    Standard,
    /// Модель высокого качества
    HighDefinition,
}

impl TtsModel {
    /// Получить строковое представление модели
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "tts-1",
            Self::HighDefinition => "tts-1-hd",
        }
    }
}

/// Голос для использования с OpenAI API
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TtsVoice {
    Alloy,
    Echo,
    Fable,
    Onyx,
    #[default]
    Nova,
    Shimmer,
}

impl TtsVoice {
    /// Получить строковое представление голоса
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DubSyncConfig {
    /// Рабочая директория для промежуточных файлов (временная, если не задана)
    pub work_dir: Option<PathBuf>,
    /// Директория для итоговых видео
    pub output_dir: PathBuf,
    /// Максимальный коэффициент изменения скорости одной дорожки
    pub max_adjustment_ratio: f64,
    /// Сохранять высоту тона при изменении темпа аудио
    pub preserve_pitch: bool,
    /// Максимальная длина чанка текста в символах
    pub max_chunk_chars: usize,
    /// Максимальное количество одновременно синтезируемых чанков
    pub max_concurrent_chunks: usize,
    /// Видеокодек для перекодирования
    pub video_codec: String,
    /// Пресет видеокодека
    pub video_preset: String,
    /// Аудиокодек итогового контейнера
    pub audio_codec: String,
    /// Путь к ffmpeg
    pub ffmpeg_path: String,
    /// Путь к ffprobe
    pub ffprobe_path: String,
    /// Удалять временные файлы после завершения
    pub cleanup_temp_files: bool,
    /// Максимальный возраст временных файлов в часах
    pub max_temp_age_hours: u64,
    /// Сколько последних итоговых видео хранить в `output_dir` (без ограничения, если не задано)
    pub max_output_files: Option<usize>,
    /// API ключ для OpenAI
    pub openai_api_key: String,
    /// Модель TTS
    pub tts_model: TtsModel,
    /// Голос TTS
    pub tts_voice: TtsVoice,
}

impl Default for DubSyncConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            output_dir: PathBuf::from("output"),
            max_adjustment_ratio: 1.5,
            preserve_pitch: true,
            max_chunk_chars: 150,
            max_concurrent_chunks: 2,
            video_codec: "libx264".to_string(),
            video_preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            cleanup_temp_files: true,
            max_temp_age_hours: 24,
            max_output_files: None,
            openai_api_key: String::new(),
            tts_model: TtsModel::default(),
            tts_voice: TtsVoice::default(),
        }
    }
}

impl DubSyncConfig {
    /// Загрузить конфигурацию из JSON файла.
    ///
    /// Отсутствующие ключи берутся из значений по умолчанию.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DubSyncError::Configuration(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Переопределить параметры из переменных окружения
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = key;
        }
        if let Ok(dir) = std::env::var("DUB_SYNC_WORK_DIR") {
            self.work_dir = Some(PathBuf::from(dir));
        }
        if let Ok(ratio) = std::env::var("DUB_SYNC_MAX_RATIO") {
            self.max_adjustment_ratio = ratio.trim().parse::<f64>().map_err(|_| {
                DubSyncError::Configuration(format!("DUB_SYNC_MAX_RATIO is not a number: {}", ratio))
            })?;
        }
        Ok(self)
    }

    /// Проверить согласованность параметров
    pub fn validate(&self) -> Result<()> {
        if !(self.max_adjustment_ratio >= 1.0) {
            return Err(DubSyncError::Configuration(format!(
                "max_adjustment_ratio must be >= 1.0, got {}",
                self.max_adjustment_ratio
            )));
        }
        if self.max_chunk_chars == 0 {
            return Err(DubSyncError::Configuration("max_chunk_chars must be positive".to_string()));
        }
        if self.max_concurrent_chunks == 0 {
            return Err(DubSyncError::Configuration(
                "max_concurrent_chunks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
