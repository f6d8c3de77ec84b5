//! Модуль для работы с видео
//!
//! Видео обрабатывается внешним `ffmpeg`. Все операции собраны за трейтом
//! [`VideoEngine`], чтобы гармонизацию и сборку можно было проверять без
//! установленного FFmpeg.

use std::path::Path;
use serde::Deserialize;
use crate::config::DubSyncConfig;
use crate::error::{DubSyncError, Result};
use crate::media::ffmpeg::FfmpegTool;

/// Информация о видео
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Длительность видео в секундах
    pub duration: f64,
    /// Частота кадров
    pub fps: f64,
    /// Количество кадров
    pub frame_count: u64,
    /// Ширина видео в пикселях
    pub width: u32,
    /// Высота видео в пикселях
    pub height: u32,
}

impl VideoInfo {
    /// Количество кадров после изменения скорости
    pub fn retimed_frame_count(&self, speed_factor: f64) -> u64 {
        (self.frame_count as f64 / speed_factor).round().max(1.0) as u64
    }
}

/// Операции над видеофайлами
pub trait VideoEngine: Send + Sync {
    /// Получение информации о видео
    fn probe_video(&self, path: &Path) -> Result<VideoInfo>;

    /// Изменение скорости видео без звука.
    ///
    /// `speed_factor > 1.0` ускоряет видео. Частота кадров сохраняется,
    /// количество кадров становится `round(frame_count / speed_factor)`.
    fn retime_video(&self, input: &Path, output: &Path, speed_factor: f64, info: &VideoInfo) -> Result<()>;

    /// Сборка контейнера: видеодорожка из `video`, звук из `audio`
    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;

    /// Извлечение звуковой дорожки в WAV
    fn extract_audio(&self, video: &Path, output: &Path) -> Result<()>;
}

/// Реализация [`VideoEngine`] поверх `ffmpeg`/`ffprobe`
#[derive(Debug, Clone)]
pub struct FfmpegVideoEngine {
    tool: FfmpegTool,
    video_codec: String,
    video_preset: String,
    audio_codec: String,
}

impl FfmpegVideoEngine {
    pub fn new(tool: FfmpegTool) -> Self {
        Self {
            tool,
            video_codec: "libx264".to_string(),
            video_preset: "medium".to_string(),
            audio_codec: "aac".to_string(),
        }
    }

    pub fn from_config(config: &DubSyncConfig) -> Self {
        Self {
            tool: FfmpegTool::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone()),
            video_codec: config.video_codec.clone(),
            video_preset: config.video_preset.clone(),
            audio_codec: config.audio_codec.clone(),
        }
    }

    pub fn tool(&self) -> &FfmpegTool {
        &self.tool
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Разбор частоты кадров вида `30000/1001`
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().ok()?;
            let den = den.parse::<f64>().ok()?;
            (den > 0.0 && num > 0.0).then(|| num / den)
        }
        None => raw.parse::<f64>().ok().filter(|fps| *fps > 0.0),
    }
}

/// Разбор JSON-вывода ffprobe
fn parse_probe_output(path: &Path, raw: &str) -> Result<VideoInfo> {
    let parsed: ProbeOutput =
        serde_json::from_str(raw).map_err(|e| DubSyncError::unreadable(path, format!("bad ffprobe output: {}", e)))?;

    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| DubSyncError::unreadable(path, "no video stream"))?;

    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .or(stream.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .ok_or_else(|| DubSyncError::unreadable(path, "missing duration metadata"))?;

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .ok_or_else(|| DubSyncError::unreadable(path, "missing frame rate metadata"))?;

    let frame_count = stream
        .nb_frames
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration * fps).round() as u64);

    Ok(VideoInfo {
        duration,
        fps,
        frame_count,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

impl VideoEngine for FfmpegVideoEngine {
    fn probe_video(&self, path: &Path) -> Result<VideoInfo> {
        if !path.is_file() {
            return Err(DubSyncError::unreadable(path, "file not found"));
        }

        let path_str = path.to_string_lossy();
        let raw = self
            .tool
            .probe([
                "-select_streams",
                "v:0",
                "-show_entries",
                "format=duration:stream=width,height,r_frame_rate,nb_frames,duration",
                "-of",
                "json",
                path_str.as_ref(),
            ])
            .map_err(|e| DubSyncError::unreadable(path, e))?;

        parse_probe_output(path, &raw)
    }

    fn retime_video(&self, input: &Path, output: &Path, speed_factor: f64, info: &VideoInfo) -> Result<()> {
        let filter = format!("setpts=PTS/{}", speed_factor);
        let fps = format!("{}", info.fps);
        let frames = info.retimed_frame_count(speed_factor).to_string();

        log::debug!(
            "Retiming {} by {:.4}x ({} -> {} frames)",
            input.display(),
            speed_factor,
            info.frame_count,
            frames
        );

        let input_str = input.to_string_lossy();
        let output_str = output.to_string_lossy();
        self.tool
            .run([
                "-y",
                "-i",
                input_str.as_ref(),
                "-filter:v",
                filter.as_str(),
                "-r",
                fps.as_str(),
                "-frames:v",
                frames.as_str(),
                "-an",
                "-c:v",
                self.video_codec.as_str(),
                "-preset",
                self.video_preset.as_str(),
                output_str.as_ref(),
            ])
            .map_err(|e| DubSyncError::transform(input, e))
    }

    fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let video_str = video.to_string_lossy();
        let audio_str = audio.to_string_lossy();
        let output_str = output.to_string_lossy();
        self.tool
            .run([
                "-y",
                "-i",
                video_str.as_ref(),
                "-i",
                audio_str.as_ref(),
                "-map",
                "0:v:0",
                "-map",
                "1:a:0",
                "-c:v",
                "copy",
                "-c:a",
                self.audio_codec.as_str(),
                output_str.as_ref(),
            ])
            .map_err(|reason| DubSyncError::MuxFailed {
                output: output.to_path_buf(),
                reason,
            })
    }

    fn extract_audio(&self, video: &Path, output: &Path) -> Result<()> {
        let video_str = video.to_string_lossy();
        let output_str = output.to_string_lossy();
        self.tool
            .run([
                "-y",
                "-i",
                video_str.as_ref(),
                "-vn",
                "-acodec",
                "pcm_s16le",
                "-ar",
                "44100",
                "-ac",
                "1",
                output_str.as_ref(),
            ])
            .map_err(|e| DubSyncError::unreadable(video, e))
    }
}
