use std::sync::Arc;
use crate::error::DubSyncError;
use crate::media::asset::Stage;
use crate::tts::BackendConcurrency;
use crate::tests::support::*;

#[tokio::test]
async fn test_chunk_within_budget_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::ParallelSafe, 0.05));
    let scheduler = dub.scheduler(backend.clone());

    // 20 символов = 1.0 с; бюджет больше, ускорение не нужно
    let texts = vec!["Exactly twenty char".to_string()];
    let results = scheduler.synthesize_batch(&texts, Some(&[1.5][..])).await.unwrap();

    let result = &results[0];
    assert_eq!(result.audio_asset.stage(), Stage::Synthesis);
    assert!(result.audio_asset.parents().is_empty());
    assert!((result.actual_duration_seconds - 1.0).abs() < 1e-3);

    // Файл не перекодировался: байты совпадают с тем, что записал бэкенд
    let expected = dir.path().join("expected.wav");
    crate::media::audio::encode_wav(&sine_buffer(1.0), &expected).unwrap();
    assert_eq!(
        std::fs::read(result.audio_asset.path()).unwrap(),
        std::fs::read(&expected).unwrap()
    );
}

#[tokio::test]
async fn test_long_chunk_is_sped_up_to_target() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::ParallelSafe, 0.05));
    let scheduler = dub.scheduler(backend.clone());

    let texts = vec!["Exactly twenty char".to_string(), "Ten chars!".to_string()];
    let results = scheduler.synthesize_batch(&texts, Some(&[0.8, 2.0][..])).await.unwrap();
    assert_eq!(results.len(), 2);

    let sped_up = &results[0];
    assert_eq!(sped_up.audio_asset.stage(), Stage::SpeedTransform);
    assert!((sped_up.actual_duration_seconds - 0.8).abs() < 1e-3);
    let original = dub.store().get(sped_up.audio_asset.parents()[0]).unwrap();
    assert!((dub.probe(&original).unwrap() - 1.0).abs() < 1e-3);

    // Короткий чанк никогда не замедляется
    let untouched = &results[1];
    assert_eq!(untouched.audio_asset.stage(), Stage::Synthesis);
    assert!((untouched.actual_duration_seconds - 0.5).abs() < 1e-3);
}

#[tokio::test]
async fn test_non_positive_chunk_target_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());
    let backend = Arc::new(ToneBackend::new(BackendConcurrency::ParallelSafe, 0.05));
    let scheduler = dub.scheduler(backend);

    let texts = vec!["Hello.".to_string()];
    let err = scheduler.synthesize_batch(&texts, Some(&[0.0][..])).await.unwrap_err();
    assert!(matches!(err, DubSyncError::InvalidTarget(_)));
}
