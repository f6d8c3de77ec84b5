//! Модуль для работы с рабочими файлами
//!
//! Все промежуточные файлы одного запуска живут в одной рабочей директории.
//! Каждый запрошенный путь уникален, поэтому параллельные задачи никогда не
//! пишут в один и тот же файл.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use parking_lot::Mutex;
use path_clean::PathClean;
use tempfile::TempDir;
use walkdir::WalkDir;
use crate::error::Result;

/// Менеджер рабочей директории
pub struct WorkDir {
    /// Корень рабочей директории
    root: PathBuf,
    /// Временная директория, если корень не был задан явно
    _temp_dir: Option<TempDir>,
    /// Список выданных путей
    files: Mutex<Vec<PathBuf>>,
    /// Нужно ли удалять файлы при завершении
    cleanup: bool,
}

impl WorkDir {
    /// Создать рабочую директорию в `base` или во временной директории системы
    pub fn new(base: Option<&Path>, cleanup: bool) -> Result<Self> {
        let (root, temp_dir) = match base {
            Some(base) => {
                let root = base.to_path_buf().clean();
                fs::create_dir_all(&root)?;
                (root, None)
            }
            None => {
                let temp_dir = tempfile::Builder::new().prefix("dub-sync-").tempdir()?;
                (temp_dir.path().to_path_buf(), Some(temp_dir))
            }
        };

        log::debug!("Work directory: {}", root.display());

        Ok(Self {
            root,
            _temp_dir: temp_dir,
            files: Mutex::new(Vec::new()),
            cleanup,
        })
    }

    /// Получить путь к рабочей директории
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Выдать уникальный путь для нового файла. Сам файл не создается.
    pub fn file_path(&self, prefix: &str, extension: &str) -> PathBuf {
        let file_name = format!("{}_{}.{}", prefix, uuid::Uuid::new_v4().simple(), extension);
        let path = self.root.join(file_name);
        self.files.lock().push(path.clone());
        path
    }

    /// Путь для итогового файла с отметкой времени: `<prefix>_<YYYYmmdd_HHMMSS>.<ext>`
    pub fn output_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        dir.join(format!("{}_{}.{}", prefix, timestamp, extension)).clean()
    }

    /// Удалить файлы в рабочей директории старше `max_age`.
    ///
    /// Возвращает количество удаленных файлов.
    pub fn remove_stale(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in WalkDir::new(&self.root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            let age = modified.and_then(|m| now.duration_since(m).ok());
            if matches!(age, Some(age) if age > max_age) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("Failed to delete {}: {}", entry.path().display(), e),
                }
            }
        }

        if removed > 0 {
            log::info!("Removed {} stale files from {}", removed, self.root.display());
        }
        Ok(removed)
    }

    /// Оставить в `dir` только `keep` самых новых файлов.
    ///
    /// Скрытые файлы (незавершенная сборка) не трогаются. Возвращает
    /// количество удаленных файлов.
    pub fn prune_outputs(dir: &Path, keep: usize) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut files: Vec<(SystemTime, PathBuf)> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| {
                let modified = e
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, e.into_path())
            })
            .collect();

        // Новые первыми
        files.sort_by(|a, b| b.cmp(a));

        let mut removed = 0;
        for (_, path) in files.iter().skip(keep) {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to delete {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            log::info!("Pruned {} old outputs from {}", removed, dir.display());
        }
        Ok(removed)
    }

    /// Очистить выданные файлы
    pub fn cleanup(&self) -> Result<()> {
        if !self.cleanup {
            return Ok(());
        }

        let mut files = self.files.lock();
        for file in files.iter() {
            if file.exists() {
                fs::remove_file(file)?;
                log::debug!("Deleted temporary file: {}", file.display());
            }
        }
        files.clear();

        Ok(())
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::warn!("Temporary files cleanup failed: {}", e);
        }
    }
}
