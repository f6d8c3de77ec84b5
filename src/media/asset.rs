//! Медиа-ассеты и их происхождение
//!
//! Каждый ассет описывает одну аудио- или видеодорожку на диске. Преобразования
//! никогда не изменяют ассет на месте: они регистрируют новый ассет с
//! ссылкой на родителя, так что цепочку происхождения можно восстановить.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::{DubSyncError, Result};
use crate::utils::temp::WorkDir;

/// Идентификатор ассета в хранилище
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(Uuid);

impl AssetId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Тип дорожки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Video,
    Audio,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Этап конвейера, создавший ассет
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Файл получен извне (загрузка или вход вызывающего кода)
    Acquisition,
    /// Аудио извлечено из видео
    Extraction,
    /// Результат синтеза речи
    Synthesis,
    /// Результат изменения скорости
    SpeedTransform,
    /// Склейка нескольких чанков
    Concatenation,
    /// Итоговый контейнер
    Mux,
}

/// Ссылка на одну аудио- или видеодорожку
#[derive(Debug)]
pub struct MediaAsset {
    id: AssetId,
    path: PathBuf,
    kind: AssetKind,
    stage: Stage,
    parents: Vec<AssetId>,
    /// Длительность, измеряется лениво и кэшируется
    duration: OnceCell<f64>,
    /// Частота дискретизации (аудио) или кадров (видео)
    rate: OnceCell<f64>,
}

impl MediaAsset {
    fn new(path: PathBuf, kind: AssetKind, stage: Stage, parents: Vec<AssetId>) -> Self {
        Self {
            id: AssetId::new(),
            path,
            kind,
            stage,
            parents,
            duration: OnceCell::new(),
            rate: OnceCell::new(),
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Непосредственные родители ассета
    pub fn parents(&self) -> &[AssetId] {
        &self.parents
    }

    /// Кэшированная длительность, если ассет уже измерялся
    pub fn cached_duration(&self) -> Option<f64> {
        self.duration.get().copied()
    }

    /// Частота дискретизации для аудио
    pub fn sample_rate(&self) -> Option<u32> {
        match self.kind {
            AssetKind::Audio => self.rate.get().map(|r| r.round() as u32),
            AssetKind::Video => None,
        }
    }

    /// Частота кадров для видео
    pub fn frame_rate(&self) -> Option<f64> {
        match self.kind {
            AssetKind::Video => self.rate.get().copied(),
            AssetKind::Audio => None,
        }
    }

    /// Вернуть кэшированную длительность или вычислить и сохранить ее
    pub(crate) fn duration_or_try_init<F>(&self, init: F) -> Result<f64>
    where
        F: FnOnce() -> Result<(f64, Option<f64>)>,
    {
        self.duration
            .get_or_try_init(|| {
                let (duration, rate) = init()?;
                if let Some(rate) = rate {
                    let _ = self.rate.set(rate);
                }
                Ok(duration)
            })
            .copied()
    }
}

/// Хранилище ассетов одного запуска
pub struct AssetStore {
    work_dir: Arc<WorkDir>,
    assets: RwLock<HashMap<AssetId, Arc<MediaAsset>>>,
}

impl AssetStore {
    pub fn new(work_dir: Arc<WorkDir>) -> Self {
        Self {
            work_dir,
            assets: RwLock::new(HashMap::new()),
        }
    }

    /// Рабочая директория, в которой создаются новые ассеты
    pub fn work_dir(&self) -> &WorkDir {
        &self.work_dir
    }

    /// Выдать уникальный путь для нового ассета
    pub fn allocate(&self, prefix: &str, extension: &str) -> PathBuf {
        self.work_dir.file_path(prefix, extension)
    }

    /// Зарегистрировать файл, созданный этапом конвейера
    pub fn register(
        &self,
        path: impl Into<PathBuf>,
        kind: AssetKind,
        stage: Stage,
        parents: &[AssetId],
    ) -> Arc<MediaAsset> {
        let asset = Arc::new(MediaAsset::new(path.into(), kind, stage, parents.to_vec()));
        log::debug!(
            "Registered {} asset {} ({:?}) at {}",
            kind.as_str(),
            asset.id,
            stage,
            asset.path.display()
        );
        self.assets.write().insert(asset.id, asset.clone());
        asset
    }

    /// Зарегистрировать внешний файл как входной ассет
    pub fn import(&self, path: impl Into<PathBuf>, kind: AssetKind) -> Result<Arc<MediaAsset>> {
        let path = path.into();
        if !path.is_file() {
            return Err(DubSyncError::unreadable(path, "file not found"));
        }
        Ok(self.register(path, kind, Stage::Acquisition, &[]))
    }

    pub fn get(&self, id: AssetId) -> Option<Arc<MediaAsset>> {
        self.assets.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }

    /// Цепочка происхождения: сам ассет, затем его предки в порядке обхода в ширину
    pub fn lineage(&self, id: AssetId) -> Vec<AssetId> {
        let assets = self.assets.read();
        let mut lineage = Vec::new();
        let mut queue = std::collections::VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            if lineage.contains(&current) {
                continue;
            }
            lineage.push(current);
            if let Some(asset) = assets.get(&current) {
                queue.extend(asset.parents.iter().copied());
            }
        }

        lineage
    }

    /// Забыть ассет и удалить его файл.
    ///
    /// Файлы внешних входов (`Stage::Acquisition`) не удаляются.
    pub fn release(&self, id: AssetId) -> Result<bool> {
        let Some(asset) = self.assets.write().remove(&id) else {
            return Ok(false);
        };

        if asset.stage != Stage::Acquisition && asset.path.exists() {
            std::fs::remove_file(&asset.path)?;
            log::debug!("Released asset {} ({})", id, asset.path.display());
        }
        Ok(true)
    }
}
