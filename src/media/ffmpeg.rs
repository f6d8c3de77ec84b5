//! Модуль для работы с FFmpeg
//!
//! Этот модуль содержит обертку над вызовами `ffmpeg` и `ffprobe`.

use std::ffi::OsStr;
use std::process::Command;

/// Пути к бинарникам FFmpeg
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTool {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Проверка наличия FFmpeg
    pub fn is_installed(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Запуск команды FFmpeg. Ошибка содержит хвост stderr.
    pub fn run<I, S>(&self, args: I) -> Result<(), String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(args)
            .output()
            .map_err(|e| format!("Failed to execute {}: {}", self.ffmpeg, e))?;

        if !output.status.success() {
            return Err(format!(
                "FFmpeg command failed with status {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            ));
        }

        Ok(())
    }

    /// Запуск команды FFprobe, возвращает stdout
    pub fn probe<I, S>(&self, args: I) -> Result<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error"])
            .args(args)
            .output()
            .map_err(|e| format!("Failed to execute {}: {}", self.ffprobe, e))?;

        if !output.status.success() {
            return Err(format!(
                "FFprobe command failed with status {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}
