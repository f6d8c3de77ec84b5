//! # Duration Harmonizer
//!
//! Согласование длительностей видео и аудио.
//!
//! Обе дорожки приводятся к общей целевой длительности. Если цель не задана,
//! используется среднее арифметическое длительностей: так искажение каждой
//! дорожки примерно вдвое меньше, чем при растяжении только одной из них.
//!
//! Требуемый коэффициент дорожки считается симметрично:
//! `max(D / target, target / D)`. План, в котором хотя бы один коэффициент
//! превышает `max_adjustment_ratio`, отклоняется до записи каких-либо файлов.

use std::sync::Arc;
use crate::error::{DubSyncError, Result};
use crate::media::asset::{AssetKind, MediaAsset};
use crate::media::probe::DurationProbe;
use crate::media::speed::SpeedTransform;

/// План согласования длительностей
#[derive(Debug, Clone)]
pub struct HarmonizationPlan {
    pub video: Arc<MediaAsset>,
    pub audio: Arc<MediaAsset>,
    /// Целевая длительность; `None`: среднее двух длительностей
    pub target_duration: Option<f64>,
    pub max_adjustment_ratio: f64,
    pub preserve_pitch: bool,
}

impl HarmonizationPlan {
    pub fn new(video: Arc<MediaAsset>, audio: Arc<MediaAsset>, max_adjustment_ratio: f64) -> Result<Self> {
        if !(max_adjustment_ratio >= 1.0) {
            return Err(DubSyncError::InvalidTarget(format!(
                "max adjustment ratio must be >= 1.0, got {}",
                max_adjustment_ratio
            )));
        }
        if video.kind() != AssetKind::Video || audio.kind() != AssetKind::Audio {
            return Err(DubSyncError::InvalidTarget(format!(
                "harmonization needs a video and an audio asset, got {} and {}",
                video.kind().as_str(),
                audio.kind().as_str()
            )));
        }
        Ok(Self {
            video,
            audio,
            target_duration: None,
            max_adjustment_ratio,
            preserve_pitch: true,
        })
    }

    /// Задать целевую длительность явно
    pub fn with_target(mut self, target_duration: f64) -> Result<Self> {
        if !(target_duration > 0.0) || !target_duration.is_finite() {
            return Err(DubSyncError::InvalidTarget(format!(
                "target duration must be positive, got {}",
                target_duration
            )));
        }
        self.target_duration = Some(target_duration);
        Ok(self)
    }

    pub fn with_preserve_pitch(mut self, preserve_pitch: bool) -> Self {
        self.preserve_pitch = preserve_pitch;
        self
    }
}

/// Результат согласования
#[derive(Debug, Clone)]
pub struct HarmonizedPair {
    pub video: Arc<MediaAsset>,
    pub audio: Arc<MediaAsset>,
    pub target_duration: f64,
    pub video_ratio: f64,
    pub audio_ratio: f64,
    /// Фактическая длительность видео после преобразования
    pub video_duration: f64,
    /// Фактическая длительность аудио после преобразования
    pub audio_duration: f64,
}

/// Симметричный коэффициент изменения: всегда >= 1
pub fn required_ratio(duration: f64, target: f64) -> f64 {
    (duration / target).max(target / duration)
}

/// Согласователь длительностей
#[derive(Clone)]
pub struct Harmonizer {
    transform: SpeedTransform,
}

impl Harmonizer {
    pub fn new(transform: SpeedTransform) -> Self {
        Self { transform }
    }

    pub fn probe(&self) -> &DurationProbe {
        self.transform.probe()
    }

    /// Привести видео и аудио к общей длительности
    pub fn harmonize(&self, plan: &HarmonizationPlan) -> Result<HarmonizedPair> {
        let probe = self.transform.probe();
        let video_duration = probe.probe(&plan.video)?;
        let audio_duration = probe.probe(&plan.audio)?;

        let target = plan
            .target_duration
            .unwrap_or((video_duration + audio_duration) / 2.0);

        let video_ratio = required_ratio(video_duration, target);
        let audio_ratio = required_ratio(audio_duration, target);
        let required = video_ratio.max(audio_ratio);

        log::info!(
            "Harmonizing video {:.3}s and audio {:.3}s to {:.3}s (ratios: video {:.4}, audio {:.4})",
            video_duration,
            audio_duration,
            target,
            video_ratio,
            audio_ratio
        );

        if required > plan.max_adjustment_ratio {
            log::error!(
                "Required adjustment {:.4}x exceeds maximum {}x",
                required,
                plan.max_adjustment_ratio
            );
            return Err(DubSyncError::ExcessiveAdjustment {
                required,
                max: plan.max_adjustment_ratio,
                video_duration,
                audio_duration,
                target,
            });
        }

        let video = self.transform.adjust(&plan.video, target, plan.preserve_pitch)?;
        let audio = match self.transform.adjust(&plan.audio, target, plan.preserve_pitch) {
            Ok(audio) => audio,
            Err(e) => {
                self.transform.discard(&video);
                return Err(e);
            }
        };

        let final_video = probe.probe(&video)?;
        let final_audio = probe.probe(&audio)?;
        log::info!(
            "Harmonized durations: video {:.3}s, audio {:.3}s (target {:.3}s)",
            final_video,
            final_audio,
            target
        );

        Ok(HarmonizedPair {
            video,
            audio,
            target_duration: target,
            video_ratio,
            audio_ratio,
            video_duration: final_video,
            audio_duration: final_audio,
        })
    }
}
