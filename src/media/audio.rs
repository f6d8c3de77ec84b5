//! # Audio Format Handling
//!
//! Модуль для чтения и записи аудио.
//!
//! - WAV читается и пишется через `hound` (многоканальное аудио сводится в моно)
//! - MP3, AAC/M4A, FLAC, OGG декодируются через `symphonia`
//! - Склейка фрагментов с разной частотой дискретизации через `rubato`

use std::fs::File;
use std::path::Path;
use dasp::Sample;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DubSyncError, Result};

/// Моно PCM-буфер
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Семплы в диапазоне [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Частота дискретизации в Гц
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Длительность буфера в секундах
    pub fn duration(&self) -> f64 {
        duration_in_seconds(self.samples.len(), self.sample_rate)
    }
}

/// Вычисляет длительность аудио в секундах: количество семплов / частота дискретизации.
pub fn duration_in_seconds(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Измеряет длительность аудиофайла без полного декодирования, если это возможно.
///
/// Возвращает длительность в секундах и частоту дискретизации.
pub fn probe_audio_file<P: AsRef<Path>>(path: P) -> Result<(f64, u32)> {
    let path = path.as_ref();

    if extension_of(path) == "wav" {
        let reader = WavReader::open(path).map_err(|e| DubSyncError::unreadable(path, e))?;
        let spec = reader.spec();
        // duration() у hound возвращает количество семплов на канал
        return Ok((duration_in_seconds(reader.duration() as usize, spec.sample_rate), spec.sample_rate));
    }

    let format = open_symphonia(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DubSyncError::unreadable(path, "no audio track found"))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DubSyncError::unreadable(path, "track has no sample rate"))?;

    match track.codec_params.n_frames {
        Some(frames) => Ok((duration_in_seconds(frames as usize, sample_rate), sample_rate)),
        None => {
            let buffer = decode_audio_file(path)?;
            Ok((buffer.duration(), buffer.sample_rate))
        }
    }
}

fn open_symphonia(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = File::open(path).map_err(|e| DubSyncError::unreadable(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    let extension = extension_of(path);
    if !extension.is_empty() {
        hint.with_extension(&extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DubSyncError::unreadable(path, format!("unrecognized audio format: {}", e)))?;

    Ok(probed.format)
}

/// Декодирует аудиофайл в моно PCM.
///
/// WAV читается через hound, остальные форматы через symphonia.
pub fn decode_audio_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    match extension_of(path).as_str() {
        "wav" => decode_wav_file(path),
        "mp3" | "m4a" | "aac" | "flac" | "ogg" => decode_with_symphonia(path),
        other => Err(DubSyncError::unreadable(
            path,
            format!("unsupported audio format: {:?}", other),
        )),
    }
}

/// Декодирует WAV-файл (8/16/24/32 бит целые, 32 бит float)
pub fn decode_wav_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path).map_err(|e| DubSyncError::unreadable(path, e))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|s| s.to_sample::<f32>()))
            .collect::<std::result::Result<Vec<f32>, _>>(),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s.to_sample::<f32>()))
            .collect::<std::result::Result<Vec<f32>, _>>(),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 8_388_608.0))
            .collect::<std::result::Result<Vec<f32>, _>>(),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s.to_sample::<f32>()))
            .collect::<std::result::Result<Vec<f32>, _>>(),
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<std::result::Result<Vec<f32>, _>>(),
        (format, bits) => {
            return Err(DubSyncError::unreadable(
                path,
                format!("unsupported WAV format: {:?}, {} bits", format, bits),
            ))
        }
    }
    .map_err(|e| DubSyncError::unreadable(path, e))?;

    Ok(AudioBuffer::new(
        downmix(interleaved, spec.channels as usize),
        spec.sample_rate,
    ))
}

fn decode_with_symphonia(path: &Path) -> Result<AudioBuffer> {
    let mut format = open_symphonia(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DubSyncError::unreadable(path, "no audio track found"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DubSyncError::unreadable(path, format!("failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DubSyncError::unreadable(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend(downmix(buffer.samples().to_vec(), spec.channels.count()));
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet in {}: {}", path.display(), e);
            }
            Err(e) => return Err(DubSyncError::unreadable(path, e)),
        }
    }

    if sample_rate == 0 {
        return Err(DubSyncError::unreadable(path, "track has no sample rate"));
    }

    log::debug!("Decoded {} samples at {} Hz from {}", samples.len(), sample_rate, path.display());
    Ok(AudioBuffer::new(samples, sample_rate))
}

/// Сводит чередующиеся каналы в моно
fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Кодирует моно PCM в 16-битный WAV-файл.
pub fn encode_wav<P: AsRef<Path>>(buffer: &AudioBuffer, path: P) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let write = || -> std::result::Result<(), hound::Error> {
        let mut writer = WavWriter::create(path, spec)?;
        for &sample in &buffer.samples {
            writer.write_sample(sample.clamp(-1.0, 1.0).to_sample::<i16>())?;
        }
        writer.finalize()
    };

    write().map_err(|e| DubSyncError::transform(path, format!("failed to write WAV: {}", e)))?;
    log::debug!(
        "Saved WAV file: {} ({} samples, {} Hz)",
        path.display(),
        buffer.samples.len(),
        buffer.sample_rate
    );
    Ok(())
}

/// Передискретизация моно-сигнала через Rubato.
///
/// Длина результата равна `round(len * to / from)`.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> std::result::Result<Vec<f32>, String> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let chunk_size = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_size, 1)
        .map_err(|e| format!("Failed to initialize resampler: {}", e))?;

    let mut output = Vec::with_capacity(expected + chunk_size);
    let mut position = 0;

    while position + chunk_size <= samples.len() {
        let chunk: [&[f32]; 1] = [&samples[position..position + chunk_size]];
        let frames = resampler
            .process(&chunk[..], None)
            .map_err(|e| format!("Resampling failed: {}", e))?;
        output.extend_from_slice(&frames[0]);
        position += chunk_size;
    }

    if position < samples.len() {
        let chunk: [&[f32]; 1] = [&samples[position..]];
        let frames = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(|e| format!("Resampling failed: {}", e))?;
        output.extend_from_slice(&frames[0]);
    }

    // Выталкиваем задержку фильтра
    let delay = resampler.output_delay();
    while output.len() < expected + delay {
        let frames = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| format!("Resampling failed: {}", e))?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}

/// Склеивает буферы в один, приводя все к частоте первого буфера
pub fn concatenate(buffers: &[AudioBuffer]) -> std::result::Result<AudioBuffer, String> {
    let first = buffers.first().ok_or_else(|| "Nothing to concatenate".to_string())?;
    let sample_rate = first.sample_rate;

    let total = buffers.iter().map(|b| b.samples.len()).sum::<usize>();
    let mut samples = Vec::with_capacity(total);

    for buffer in buffers {
        if buffer.sample_rate == sample_rate {
            samples.extend_from_slice(&buffer.samples);
        } else {
            log::debug!("Resampling fragment from {} Hz to {} Hz", buffer.sample_rate, sample_rate);
            samples.extend(resample(&buffer.samples, buffer.sample_rate, sample_rate)?);
        }
    }

    Ok(AudioBuffer::new(samples, sample_rate))
}
