use std::sync::atomic::Ordering;
use crate::error::DubSyncError;
use crate::media::asset::{AssetKind, Stage};
use crate::tests::support::*;

#[test]
fn test_video_is_retimed_to_speech_duration() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());

    let video = dub
        .import_video(write_fake_video(&dir.path().join("video.mp4"), 100.0))
        .unwrap();
    let speech = dub
        .import_audio(write_sine_wav(&dir.path().join("speech.wav"), 80.0))
        .unwrap();

    let output = dir.path().join("output").join("dubbed.mp4");
    let result = dub.sync(&video, &speech, Some(&output)).unwrap();

    assert_eq!(result.path(), output.as_path());
    assert_eq!(result.kind(), AssetKind::Video);
    assert_eq!(result.stage(), Stage::Mux);

    let muxed = read_fake_video(&output);
    assert_eq!(muxed.frames, 2000);
    assert!((muxed.duration - 80.0).abs() < 1e-9);

    // Озвучка прошла через преобразование без изменения длительности
    let muxed_audio = muxed.audio.unwrap();
    let lineage = dub.store().lineage(result.id());
    assert!(lineage.contains(&video.id()));
    assert!(lineage.contains(&speech.id()));
    let audio_asset = result
        .parents()
        .iter()
        .filter_map(|id| dub.store().get(*id))
        .find(|a| a.kind() == AssetKind::Audio)
        .unwrap();
    assert_eq!(audio_asset.path(), muxed_audio.as_path());
    assert!((dub.probe(&audio_asset).unwrap() - 80.0).abs() < 1e-3);

    // Временный файл сборки не остается
    assert_eq!(file_count(&dir.path().join("output")), 1);
}

#[test]
fn test_default_output_path_is_timestamped() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());

    let video = dub
        .import_video(write_fake_video(&dir.path().join("video.mp4"), 5.0))
        .unwrap();
    let speech = dub
        .import_audio(write_sine_wav(&dir.path().join("speech.wav"), 4.5))
        .unwrap();

    let result = dub.sync(&video, &speech, None).unwrap();
    let name = result.path().file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("synchronized_video_"));
    assert!(result.path().starts_with(dir.path().join("output")));
}

#[test]
fn test_excessive_ratio_produces_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, _engine) = test_dub(dir.path());

    let video = dub
        .import_video(write_fake_video(&dir.path().join("video.mp4"), 100.0))
        .unwrap();
    let speech = dub
        .import_audio(write_sine_wav(&dir.path().join("speech.wav"), 60.0))
        .unwrap();

    let output = dir.path().join("output").join("dubbed.mp4");
    let err = dub.sync(&video, &speech, Some(&output)).unwrap_err();

    match err {
        DubSyncError::ExcessiveAdjustment { required, target, .. } => {
            assert!((target - 60.0).abs() < 1e-9);
            assert!((required - 100.0 / 60.0).abs() < 1e-9);
        }
        other => panic!("expected ExcessiveAdjustment, got {:?}", other),
    }
    assert!(!output.exists());
}

#[test]
fn test_mux_failure_removes_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, engine) = test_dub(dir.path());
    engine.fail_mux.store(true, Ordering::SeqCst);

    let video = dub
        .import_video(write_fake_video(&dir.path().join("video.mp4"), 10.0))
        .unwrap();
    let speech = dub
        .import_audio(write_sine_wav(&dir.path().join("speech.wav"), 9.0))
        .unwrap();

    let output = dir.path().join("output").join("dubbed.mp4");
    let err = dub.sync(&video, &speech, Some(&output)).unwrap_err();

    match err {
        DubSyncError::MuxFailed { output: failed, reason } => {
            assert_eq!(failed, output);
            assert!(reason.contains("status 1"));
        }
        other => panic!("expected MuxFailed, got {:?}", other),
    }
    assert!(!output.exists());
    assert_eq!(file_count(&dir.path().join("output")), 0);
}

#[test]
fn test_custom_ratio_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = crate::DubSyncConfig {
        max_adjustment_ratio: 2.0,
        ..test_config(dir.path())
    };
    let (dub, _engine) = test_dub_with(config);

    let video = dub
        .import_video(write_fake_video(&dir.path().join("video.mp4"), 10.0))
        .unwrap();
    let speech = dub
        .import_audio(write_sine_wav(&dir.path().join("speech.wav"), 6.0))
        .unwrap();

    let result = dub.sync(&video, &speech, Some(&dir.path().join("output").join("a.mp4"))).unwrap();
    assert_eq!(read_fake_video(result.path()).frames, 150);
}

#[test]
fn test_output_without_extension_fails_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let (dub, engine) = test_dub(dir.path());

    let video = dub
        .import_video(write_fake_video(&dir.path().join("video.mp4"), 10.0))
        .unwrap();
    let speech = dub
        .import_audio(write_sine_wav(&dir.path().join("speech.wav"), 9.0))
        .unwrap();

    let output = dir.path().join("output").join("dubbed");
    let err = dub.sync(&video, &speech, Some(&output)).unwrap_err();

    assert!(matches!(err, DubSyncError::MuxFailed { output: ref failed, .. } if failed == &output));
    assert_eq!(engine.retime_calls.load(Ordering::SeqCst), 0);
    assert_eq!(file_count(&dir.path().join("work")), 0);
    assert!(!output.exists());
}

#[test]
fn test_cleanup_keeps_only_recent_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = crate::DubSyncConfig {
        max_output_files: Some(1),
        ..test_config(dir.path())
    };
    let (dub, _engine) = test_dub_with(config);

    let video = dub
        .import_video(write_fake_video(&dir.path().join("video.mp4"), 5.0))
        .unwrap();
    let speech = dub
        .import_audio(write_sine_wav(&dir.path().join("speech.wav"), 4.5))
        .unwrap();

    let first = dir.path().join("output").join("first.mp4");
    let second = dir.path().join("output").join("second.mp4");
    dub.sync(&video, &speech, Some(&first)).unwrap();
    let old = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(&first)
        .unwrap()
        .set_modified(old)
        .unwrap();
    dub.sync(&video, &speech, Some(&second)).unwrap();

    dub.cleanup().unwrap();
    assert!(!first.exists());
    assert!(second.exists());
    assert_eq!(file_count(&dir.path().join("work")), 0);
}
