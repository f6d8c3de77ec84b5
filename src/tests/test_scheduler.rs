use std::sync::atomic::Ordering;
use std::sync::Arc;
use crate::error::DubSyncError;
use crate::media::asset::Stage;
use crate::media::audio::decode_wav_file;
use crate::progress::ProgressUpdate;
use crate::tts::BackendConcurrency;
use crate::tests::support::*;
use crate::DubSyncConfig;

const TEXT: &str = "First sentence here. Second one! Third? Fourth sentence is longer. Fifth.";

fn small_chunks(root: &std::path::Path, concurrency: usize) -> DubSyncConfig {
    DubSyncConfig {
        max_chunk_chars: 10,
        max_concurrent_chunks: concurrency,
        ..test_config(root)
    }
}

#[tokio::test]
async fn test_parallel_results_are_ordered_by_index() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub_with(small_chunks(dir.path(), 3));
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::ParallelSafe, 0.01));
    let scheduler = dub.scheduler(backend.clone());

    let chunks = scheduler.chunk(TEXT);
    assert_eq!(chunks.len(), 5);

    let results = scheduler.synthesize_chunks(chunks.clone()).await;
    let indices: Vec<usize> = results.iter().map(|r| r.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    for (result, chunk) in results.iter().zip(chunks.iter()) {
        assert!((result.actual_duration_seconds - backend.duration_for(&chunk.text)).abs() < 1e-3);
        assert_eq!(result.audio_asset.stage(), Stage::Synthesis);
    }
    assert!(backend.max_active.load(Ordering::SeqCst) <= 3);

    // Все пути чанков различны
    let mut paths: Vec<_> = results.iter().map(|r| r.audio_asset.path().to_path_buf()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 5);
}

#[tokio::test]
async fn test_synthesize_text_concatenates_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub_with(small_chunks(dir.path(), 2));
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::ParallelSafe, 0.01));
    let scheduler = dub.scheduler(backend.clone());

    let expected: f64 = scheduler
        .chunk(TEXT)
        .iter()
        .map(|c| backend.duration_for(&c.text))
        .sum();

    let speech = scheduler.synthesize_text(TEXT).await.unwrap();
    assert_eq!(speech.stage(), Stage::Concatenation);
    assert_eq!(speech.parents().len(), 5);
    assert!((dub.probe(&speech).unwrap() - expected).abs() < 1e-3);

    // Родители идут в порядке индексов: длительности совпадают с чанками
    let chunks = scheduler.chunk(TEXT);
    for (parent, chunk) in speech.parents().iter().zip(chunks.iter()) {
        let asset = dub.store().get(*parent).unwrap();
        let decoded = decode_wav_file(asset.path()).unwrap();
        assert!((decoded.duration() - backend.duration_for(&chunk.text)).abs() < 1e-3);
    }
    assert!(backend.max_active.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_sequential_backend_ignores_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub_with(small_chunks(dir.path(), 4));
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::SequentialOnly, 0.01));
    let scheduler = dub.scheduler(backend.clone());

    let results = scheduler.synthesize_chunks(scheduler.chunk(TEXT)).await;
    assert_eq!(results.len(), 5);
    assert_eq!(backend.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_failed_chunk_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub_with(small_chunks(dir.path(), 2));
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::ParallelSafe, 0.01));
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let scheduler = dub.scheduler(backend.clone()).with_progress(tx);

    let text = "Good start. Then FAIL here. Good end.";
    let speech = scheduler.synthesize_text(text).await.unwrap();
    drop(scheduler);

    assert_eq!(speech.parents().len(), 2);
    // Частично записанный файл неудачного чанка удален
    let leftovers = std::fs::read_dir(dir.path().join("work"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("chunk_1_"))
        .count();
    assert_eq!(leftovers, 0);
    let expected = backend.duration_for("Good start.") + backend.duration_for("Good end.");
    assert!((dub.probe(&speech).unwrap() - expected).abs() < 1e-3);

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(updates.first(), Some(&ProgressUpdate::Chunked { chunks: 3 }));
    assert!(updates.contains(&ProgressUpdate::ChunkFailed { index: 1 }));
    assert!(updates.contains(&ProgressUpdate::Concatenating));
    assert_eq!(
        updates
            .iter()
            .filter(|u| matches!(u, ProgressUpdate::ChunkSynthesized { .. }))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_all_chunks_failing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::SequentialOnly, 0.01));
    let scheduler = dub.scheduler(backend);

    let err = scheduler.synthesize_text("FAIL always.").await.unwrap_err();
    assert!(matches!(err, DubSyncError::SynthesisBackend { .. }));
}

#[tokio::test]
async fn test_mismatched_batch_is_rejected_before_work() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::ParallelSafe, 0.01));
    let scheduler = dub.scheduler(backend.clone());

    let texts = vec!["One.".to_string(), "Two.".to_string(), "Three.".to_string()];
    let err = scheduler.synthesize_batch(&texts, Some(&[1.0, 2.0][..])).await.unwrap_err();

    match err {
        DubSyncError::InputMismatch { texts, durations } => {
            assert_eq!(texts, 3);
            assert_eq!(durations, 2);
        }
        other => panic!("expected InputMismatch, got {:?}", other),
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(dub.store().len(), 0);
}

#[tokio::test]
async fn test_batch_without_targets_keeps_every_text() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::ParallelSafe, 0.01));
    let scheduler = dub.scheduler(backend.clone());

    let texts = vec!["  Hello   there".to_string(), "FAIL".to_string(), "Bye!".to_string()];
    let results = scheduler.synthesize_batch(&texts, None).await.unwrap();

    assert_eq!(results.iter().map(|r| r.chunk_index).collect::<Vec<_>>(), vec![0, 2]);
    assert!((results[0].actual_duration_seconds - backend.duration_for("Hello there.")).abs() < 1e-3);
}
