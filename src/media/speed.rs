//! Изменение скорости воспроизведения ассетов
//!
//! Каждое преобразование создает новый ассет рядом с рабочими файлами,
//! исходный файл не изменяется.

use std::path::Path;
use std::sync::Arc;
use crate::error::{DubSyncError, Result};
use crate::media::asset::{AssetKind, AssetStore, MediaAsset, Stage};
use crate::media::audio::{decode_audio_file, encode_wav, AudioBuffer};
use crate::media::probe::DurationProbe;
use crate::media::stretch::{linear_resample, time_stretch};
use crate::media::video::VideoEngine;

/// Запрос на изменение длительности ассета
#[derive(Debug, Clone)]
pub struct SpeedAdjustmentRequest {
    pub asset: Arc<MediaAsset>,
    pub target_duration_seconds: f64,
    pub preserve_pitch: bool,
}

impl SpeedAdjustmentRequest {
    /// Создать запрос. Целевая длительность должна быть положительной.
    pub fn new(asset: Arc<MediaAsset>, target_duration_seconds: f64, preserve_pitch: bool) -> Result<Self> {
        if !(target_duration_seconds > 0.0) || !target_duration_seconds.is_finite() {
            return Err(DubSyncError::InvalidTarget(format!(
                "target duration must be positive, got {} for {}",
                target_duration_seconds,
                asset.path().display()
            )));
        }
        Ok(Self {
            asset,
            target_duration_seconds,
            preserve_pitch,
        })
    }
}

/// Преобразователь скорости
#[derive(Clone)]
pub struct SpeedTransform {
    store: Arc<AssetStore>,
    engine: Arc<dyn VideoEngine>,
    probe: DurationProbe,
}

impl SpeedTransform {
    pub fn new(store: Arc<AssetStore>, engine: Arc<dyn VideoEngine>) -> Self {
        let probe = DurationProbe::new(engine.clone());
        Self { store, engine, probe }
    }

    pub fn probe(&self) -> &DurationProbe {
        &self.probe
    }

    /// Привести ассет к целевой длительности
    pub fn adjust(&self, asset: &Arc<MediaAsset>, target_duration: f64, preserve_pitch: bool) -> Result<Arc<MediaAsset>> {
        let request = SpeedAdjustmentRequest::new(asset.clone(), target_duration, preserve_pitch)?;
        self.apply(&request)
    }

    /// Выполнить запрос на изменение длительности
    pub fn apply(&self, request: &SpeedAdjustmentRequest) -> Result<Arc<MediaAsset>> {
        let asset = &request.asset;
        let current = self.probe.probe(asset)?;
        if current <= 0.0 {
            return Err(DubSyncError::transform(
                asset.path(),
                format!(
                    "cannot change speed of an empty {} (duration {})",
                    asset.kind().as_str(),
                    current
                ),
            ));
        }
        let speed_factor = current / request.target_duration_seconds;

        log::info!(
            "Adjusting {} {} from {:.3}s to {:.3}s (speed factor {:.4}, preserve pitch: {})",
            asset.kind().as_str(),
            asset.path().display(),
            current,
            request.target_duration_seconds,
            speed_factor,
            request.preserve_pitch
        );

        let output = match asset.kind() {
            AssetKind::Audio => self.store.allocate("speed_adjusted_audio", "wav"),
            AssetKind::Video => {
                let extension = asset
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("mp4")
                    .to_string();
                self.store.allocate("speed_adjusted_video", &extension)
            }
        };

        let result = match asset.kind() {
            AssetKind::Audio => adjust_audio(asset.path(), &output, speed_factor, request.preserve_pitch),
            AssetKind::Video => self.adjust_video(asset.path(), &output, speed_factor),
        };

        if let Err(e) = result {
            if output.exists() {
                if let Err(remove_err) = std::fs::remove_file(&output) {
                    log::warn!("Failed to remove {}: {}", output.display(), remove_err);
                }
            }
            return Err(match e {
                DubSyncError::TransformFailed { .. } => e,
                other => DubSyncError::transform(asset.path(), other),
            });
        }

        let adjusted = self
            .store
            .register(output, asset.kind(), Stage::SpeedTransform, &[asset.id()]);

        let actual = match self.probe.probe(&adjusted) {
            Ok(actual) => actual,
            Err(e) => {
                self.discard(&adjusted);
                return Err(DubSyncError::transform(
                    asset.path(),
                    format!("adjusted output is unreadable: {}", e),
                ));
            }
        };
        log::info!(
            "Adjusted {} duration: {:.3}s (target {:.3}s, drift {:+.4}s)",
            adjusted.kind().as_str(),
            actual,
            request.target_duration_seconds,
            actual - request.target_duration_seconds
        );

        Ok(adjusted)
    }

    /// Удалить производный ассет вместе с файлом
    pub(crate) fn discard(&self, asset: &MediaAsset) {
        if let Err(e) = self.store.release(asset.id()) {
            log::warn!("Failed to remove {}: {}", asset.path().display(), e);
        }
    }

    fn adjust_video(&self, input: &Path, output: &Path, speed_factor: f64) -> Result<()> {
        let info = self.engine.probe_video(input)?;
        self.engine.retime_video(input, output, speed_factor, &info)
    }
}

/// Изменение скорости аудио в памяти
fn adjust_audio(input: &Path, output: &Path, speed_factor: f64, preserve_pitch: bool) -> Result<()> {
    let buffer = decode_audio_file(input)?;

    let samples = if preserve_pitch {
        time_stretch(&buffer.samples, speed_factor, buffer.sample_rate)
    } else {
        linear_resample(&buffer.samples, speed_factor)
    };

    encode_wav(&AudioBuffer::new(samples, buffer.sample_rate), output)
}
