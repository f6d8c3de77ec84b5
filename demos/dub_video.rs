//! Пример озвучки видео переведенным текстом
//!
//! ```text
//! OPENAI_API_KEY=sk-... cargo run --example dub_video -- video.mp4 translated.txt [output.mp4]
//! ```
//!
//! Конфигурацию можно передать JSON-файлом через `DUB_SYNC_CONFIG`.

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context};
use dub_sync::config::DubSyncConfig;
use dub_sync::logger::init_logger;
use dub_sync::progress::ProgressUpdate;
use dub_sync::tts::openai::OpenAiTtsBackend;
use dub_sync::DubSync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: dub_video <video> <translated text file> [output]");
    }
    let video_path = PathBuf::from(&args[0]);
    let text_path = PathBuf::from(&args[1]);
    let output = args.get(2).map(PathBuf::from);

    let config = match std::env::var("DUB_SYNC_CONFIG") {
        Ok(path) => DubSyncConfig::from_json_file(path)?,
        Err(_) => DubSyncConfig::default(),
    }
    .with_env_overrides()?;

    let text = tokio::fs::read_to_string(&text_path)
        .await
        .with_context(|| format!("Failed to read {}", text_path.display()))?;

    let backend = Arc::new(OpenAiTtsBackend::from_config(&config)?);
    let dub = DubSync::new(config)?;

    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update {
                ProgressUpdate::Chunked { chunks } => println!("Текст разбит на {} чанков", chunks),
                ProgressUpdate::ChunkSynthesized { index, total } => {
                    println!("Чанк {} готов (всего {})", index + 1, total)
                }
                ProgressUpdate::ChunkFailed { index } => println!("Чанк {} пропущен", index + 1),
                other => println!("{:?}", other),
            }
        }
    });

    let video = dub.import_video(&video_path)?;
    let speech = dub.scheduler(backend).with_progress(tx).synthesize_text(&text).await?;
    printer.await?;

    println!(
        "Озвучка: {:.2} с, видео: {:.2} с",
        dub.probe(&speech)?,
        dub.probe(&video)?
    );

    let result = dub.sync(&video, &speech, output.as_deref())?;
    println!("Готово: {}", result.path().display());

    dub.cleanup()?;
    Ok(())
}
