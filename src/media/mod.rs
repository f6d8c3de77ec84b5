//! Модуль для работы с медиафайлами

pub mod asset;
pub mod audio;
pub mod ffmpeg;
pub mod probe;
pub mod speed;
pub mod stretch;
pub mod video;

pub use asset::{AssetId, AssetKind, AssetStore, MediaAsset, Stage};
pub use probe::DurationProbe;
pub use speed::{SpeedAdjustmentRequest, SpeedTransform};
pub use video::{FfmpegVideoEngine, VideoEngine, VideoInfo};
