//! Общие заглушки для сценарных тестов: видео-движок без FFmpeg,
//! генератор WAV-файлов и тестовые бэкенды синтеза.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::config::DubSyncConfig;
use crate::error::{DubSyncError, Result};
use crate::media::audio::{encode_wav, AudioBuffer};
use crate::media::video::{VideoEngine, VideoInfo};
use crate::tts::{BackendConcurrency, SynthesisBackend};
use crate::DubSync;

pub const SAMPLE_RATE: u32 = 8000;
pub const FPS: f64 = 25.0;

/// "Видеофайл" для заглушки: JSON с метаданными
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeVideo {
    pub duration: f64,
    pub fps: f64,
    pub frames: u64,
    /// Звуковая дорожка, подставленная при сборке
    pub audio: Option<PathBuf>,
}

/// Записать видео-заглушку длительностью `seconds`
pub fn write_fake_video(path: &Path, seconds: f64) -> PathBuf {
    let frames = (seconds * FPS).round() as u64;
    let video = FakeVideo {
        duration: frames as f64 / FPS,
        fps: FPS,
        frames,
        audio: None,
    };
    std::fs::write(path, serde_json::to_vec(&video).unwrap()).unwrap();
    path.to_path_buf()
}

pub fn read_fake_video(path: &Path) -> FakeVideo {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

/// Синусоида 220 Гц заданной длительности
pub fn sine_buffer(seconds: f64) -> AudioBuffer {
    let count = (seconds * SAMPLE_RATE as f64).round() as usize;
    let samples = (0..count)
        .map(|i| (2.0 * PI * 220.0 * i as f32 / SAMPLE_RATE as f32).sin() * 0.4)
        .collect();
    AudioBuffer::new(samples, SAMPLE_RATE)
}

pub fn write_sine_wav(path: &Path, seconds: f64) -> PathBuf {
    encode_wav(&sine_buffer(seconds), path).unwrap();
    path.to_path_buf()
}

/// Видео-движок, работающий с JSON-заглушками вместо настоящих видео
#[derive(Default)]
pub struct FakeVideoEngine {
    pub fail_mux: AtomicBool,
    pub fail_retime: AtomicBool,
    /// Перекодирование "успешно", но результат нечитаем
    pub corrupt_retime: AtomicBool,
    pub probe_calls: AtomicUsize,
    pub retime_calls: AtomicUsize,
}

impl FakeVideoEngine {
    fn read(path: &Path) -> Result<FakeVideo> {
        let raw = std::fs::read(path).map_err(|e| DubSyncError::unreadable(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| DubSyncError::unreadable(path, e))
    }

    fn write(path: &Path, video: &FakeVideo) -> Result<()> {
        std::fs::write(path, serde_json::to_vec(video)?)?;
        Ok(())
    }
}

impl VideoEngine for FakeVideoEngine {
    fn probe_video(&self, path: &Path) -> Result<VideoInfo> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let video = Self::read(path)?;
        Ok(VideoInfo {
            duration: video.duration,
            fps: video.fps,
            frame_count: video.frames,
            width: 1280,
            height: 720,
        })
    }

    fn retime_video(&self, input: &Path, output: &Path, speed_factor: f64, info: &VideoInfo) -> Result<()> {
        self.retime_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_retime.load(Ordering::SeqCst) {
            std::fs::write(output, b"truncated").map_err(|e| DubSyncError::transform(input, e))?;
            return Err(DubSyncError::transform(input, "encoder crashed"));
        }
        if self.corrupt_retime.load(Ordering::SeqCst) {
            std::fs::write(output, b"garbage").map_err(|e| DubSyncError::transform(input, e))?;
            return Ok(());
        }
        let frames = info.retimed_frame_count(speed_factor);
        Self::write(
            output,
            &FakeVideo {
                duration: frames as f64 / info.fps,
                fps: info.fps,
                frames,
                audio: None,
            },
        )
    }

    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        if self.fail_mux.load(Ordering::SeqCst) {
            std::fs::write(output, b"partial container")?;
            return Err(DubSyncError::MuxFailed {
                output: output.to_path_buf(),
                reason: "muxer exited with status 1".to_string(),
            });
        }
        let mut muxed = Self::read(video)?;
        muxed.audio = Some(audio.to_path_buf());
        Self::write(output, &muxed)
    }

    fn extract_audio(&self, video: &Path, output: &Path) -> Result<()> {
        let video = Self::read(video)?;
        encode_wav(&sine_buffer(video.duration), output)
    }
}

/// Конфигурация для тестов: рабочая и выходная директории во временной папке
pub fn test_config(root: &Path) -> DubSyncConfig {
    DubSyncConfig {
        work_dir: Some(root.join("work")),
        output_dir: root.join("output"),
        ..DubSyncConfig::default()
    }
}

pub fn test_dub(root: &Path) -> (DubSync, Arc<FakeVideoEngine>) {
    test_dub_with(test_config(root))
}

pub fn test_dub_with(config: DubSyncConfig) -> (DubSync, Arc<FakeVideoEngine>) {
    let engine = Arc::new(FakeVideoEngine::default());
    let dub = DubSync::with_engine(config, engine.clone()).unwrap();
    (dub, engine)
}

/// Количество файлов в директории
pub fn file_count(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Бэкенд, который "озвучивает" текст синусоидой.
///
/// Длительность: `seconds_per_char * число символов`. Тексты, содержащие
/// `FAIL`, завершаются ошибкой после частичной записи файла. Задержка
/// обратно пропорциональна порядку вызова, чтобы задачи завершались не в
/// порядке отправки.
pub struct ToneBackend {
    pub concurrency: BackendConcurrency,
    pub seconds_per_char: f64,
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl ToneBackend {
    pub fn new(concurrency: BackendConcurrency, seconds_per_char: f64) -> Self {
        Self {
            concurrency,
            seconds_per_char,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn duration_for(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.seconds_per_char
    }
}

#[async_trait]
impl SynthesisBackend for ToneBackend {
    fn name(&self) -> &str {
        "tone"
    }

    fn concurrency(&self) -> BackendConcurrency {
        self.concurrency
    }

    async fn synthesize(&self, text: &str, output: &Path) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(call as u64 * 10))).await;

        let result = if text.contains("FAIL") {
            // Бэкенд успел начать запись до ошибки
            std::fs::write(output, b"RIFF")
                .map_err(anyhow::Error::from)
                .and_then(|_| Err(anyhow::anyhow!("model rejected input")))
        } else {
            encode_wav(&sine_buffer(self.duration_for(text)), output).map_err(anyhow::Error::from)
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
