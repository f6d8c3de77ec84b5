//! Модуль для синхронизации аудио и видео
//!
//! Длительность озвучки считается эталонной: видео подстраивается под нее,
//! после чего дорожки собираются в один контейнер.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::config::DubSyncConfig;
use crate::error::{DubSyncError, Result};
use crate::harmonizer::{HarmonizationPlan, HarmonizedPair, Harmonizer};
use crate::media::asset::{AssetKind, AssetStore, MediaAsset, Stage};
use crate::media::video::VideoEngine;

/// Синхронизатор видео и озвучки
#[derive(Clone)]
pub struct Synchronizer {
    harmonizer: Harmonizer,
    engine: Arc<dyn VideoEngine>,
    store: Arc<AssetStore>,
    max_adjustment_ratio: f64,
    preserve_pitch: bool,
}

impl Synchronizer {
    pub fn new(harmonizer: Harmonizer, engine: Arc<dyn VideoEngine>, store: Arc<AssetStore>) -> Self {
        Self {
            harmonizer,
            engine,
            store,
            max_adjustment_ratio: 1.5,
            preserve_pitch: true,
        }
    }

    pub fn with_config(mut self, config: &DubSyncConfig) -> Self {
        self.max_adjustment_ratio = config.max_adjustment_ratio;
        self.preserve_pitch = config.preserve_pitch;
        self
    }

    pub fn harmonizer(&self) -> &Harmonizer {
        &self.harmonizer
    }

    /// План с длительностью аудио в качестве цели
    pub fn plan(&self, video: &Arc<MediaAsset>, audio: &Arc<MediaAsset>) -> Result<HarmonizationPlan> {
        let target = self.harmonizer.probe().probe(audio)?;
        Ok(HarmonizationPlan::new(video.clone(), audio.clone(), self.max_adjustment_ratio)?
            .with_target(target)?
            .with_preserve_pitch(self.preserve_pitch))
    }

    /// Подогнать видео под длительность аудио и собрать итоговый файл
    pub fn sync(&self, video: &Arc<MediaAsset>, audio: &Arc<MediaAsset>, output: &Path) -> Result<Arc<MediaAsset>> {
        check_output(output)?;
        let plan = self.plan(video, audio)?;
        let pair = self.harmonizer.harmonize(&plan)?;
        self.mux(&pair, output)
    }

    /// Собрать контейнер из согласованной пары.
    ///
    /// Запись идет во временный файл рядом с итоговым, который
    /// переименовывается только после успешной сборки.
    pub fn mux(&self, pair: &HarmonizedPair, output: &Path) -> Result<Arc<MediaAsset>> {
        check_output(output)?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DubSyncError::MuxFailed {
                output: output.to_path_buf(),
                reason: format!("failed to create output directory: {}", e),
            })?;
        }

        let partial = partial_path(output);
        log::info!(
            "Muxing {} + {} into {}",
            pair.video.path().display(),
            pair.audio.path().display(),
            output.display()
        );

        let result = self
            .engine
            .mux(pair.video.path(), pair.audio.path(), &partial)
            .and_then(|_| {
                std::fs::rename(&partial, output).map_err(|e| DubSyncError::MuxFailed {
                    output: output.to_path_buf(),
                    reason: format!("failed to move partial output into place: {}", e),
                })
            });

        if let Err(e) = result {
            if partial.exists() {
                if let Err(remove_err) = std::fs::remove_file(&partial) {
                    log::warn!("Failed to remove partial output {}: {}", partial.display(), remove_err);
                }
            }
            return Err(match e {
                DubSyncError::MuxFailed { reason, .. } => DubSyncError::MuxFailed {
                    output: output.to_path_buf(),
                    reason,
                },
                other => DubSyncError::MuxFailed {
                    output: output.to_path_buf(),
                    reason: other.to_string(),
                },
            });
        }

        log::info!("Synchronized video saved to {}", output.display());
        Ok(self.store.register(
            output,
            AssetKind::Video,
            Stage::Mux,
            &[pair.video.id(), pair.audio.id()],
        ))
    }
}

/// Формат контейнера FFmpeg выбирает по расширению итогового файла
pub(crate) fn check_output(output: &Path) -> Result<()> {
    match output.extension() {
        Some(ext) if !ext.is_empty() => Ok(()),
        _ => Err(DubSyncError::MuxFailed {
            output: output.to_path_buf(),
            reason: "output path has no extension, container format is unknown".to_string(),
        }),
    }
}

/// Скрытый временный файл рядом с итоговым: `.<stem>.partial.<ext>`
fn partial_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    output.with_file_name(format!(".{}.partial.{}", stem, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/out/final.mp4")),
            PathBuf::from("/out/.final.partial.mp4")
        );
    }

    #[test]
    fn test_output_without_extension_is_rejected() {
        assert!(check_output(Path::new("/out/final.mkv")).is_ok());
        assert!(matches!(
            check_output(Path::new("/out/final")),
            Err(DubSyncError::MuxFailed { .. })
        ));
    }
}
