//! Измерение длительности ассетов
//!
//! Результат кэшируется в самом ассете: повторный вызов для того же ассета
//! возвращает то же значение без обращения к файлу.

use std::sync::Arc;
use crate::error::{DubSyncError, Result};
use crate::media::asset::{AssetKind, MediaAsset};
use crate::media::audio::probe_audio_file;
use crate::media::video::VideoEngine;

/// Измеритель длительности
#[derive(Clone)]
pub struct DurationProbe {
    engine: Arc<dyn VideoEngine>,
}

impl DurationProbe {
    pub fn new(engine: Arc<dyn VideoEngine>) -> Self {
        Self { engine }
    }

    /// Длительность ассета в секундах (>= 0, пустой файл дает 0)
    pub fn probe(&self, asset: &MediaAsset) -> Result<f64> {
        asset.duration_or_try_init(|| {
            let (duration, rate) = match asset.kind() {
                AssetKind::Audio => {
                    let (duration, sample_rate) = probe_audio_file(asset.path())?;
                    (duration, sample_rate as f64)
                }
                AssetKind::Video => {
                    let info = self.engine.probe_video(asset.path())?;
                    (info.duration, info.fps)
                }
            };

            if !(duration >= 0.0) || !duration.is_finite() {
                return Err(DubSyncError::unreadable(
                    asset.path(),
                    format!("invalid {} duration {}", asset.kind().as_str(), duration),
                ));
            }

            log::debug!(
                "Probed {} asset {}: {:.3}s",
                asset.kind().as_str(),
                asset.path().display(),
                duration
            );
            Ok((duration, Some(rate)))
        })
    }
}
