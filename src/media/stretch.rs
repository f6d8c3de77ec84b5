//! # Time Stretching
//!
//! Алгоритмы изменения длительности моно-сигнала.
//!
//! - [`time_stretch`] меняет длительность без изменения высоты тона (WSOLA:
//!   окна Ханна с перекрытием 50% и поиском наиболее похожего сегмента)
//! - [`linear_resample`] линейной интерполяцией меняет число семплов, а вместе с
//!   длительностью меняется и высота тона (быстрее = выше)
//!
//! Обе функции возвращают ровно `round(len / speed)` семплов.

use dasp::window::{Hanning, Window};

/// Длина окна анализа в секундах
const FRAME_SECONDS: f64 = 0.030;
/// Окно поиска похожего сегмента в секундах (в обе стороны)
const SEEK_SECONDS: f64 = 0.005;
/// Шаг прореживания при вычислении корреляции
const CORRELATION_STRIDE: usize = 4;

/// Ожидаемое число семплов после изменения скорости
pub fn stretched_len(input_len: usize, speed: f64) -> usize {
    (input_len as f64 / speed).round() as usize
}

/// Изменяет длительность сигнала в `speed` раз без изменения высоты тона.
///
/// * `speed > 1.0`: ускорение (результат короче)
/// * `speed < 1.0`: замедление (результат длиннее)
pub fn time_stretch(input: &[f32], speed: f64, sample_rate: u32) -> Vec<f32> {
    let target_len = stretched_len(input.len(), speed);

    if (speed - 1.0).abs() < f64::EPSILON {
        let mut output = input.to_vec();
        output.resize(target_len, 0.0);
        return output;
    }

    let frame = ((sample_rate as f64 * FRAME_SECONDS) as usize).max(16);
    if input.len() < frame * 2 || target_len == 0 {
        // Слишком короткий фрагмент для перекрытия окон
        return linear_resample(input, speed);
    }

    let hop_out = frame / 2;
    let hop_in = hop_out as f64 * speed;
    let seek = (sample_rate as f64 * SEEK_SECONDS) as isize;
    let last_start = (input.len() - frame) as isize;

    let window: Vec<f32> = (0..frame)
        .map(|i| <Hanning as Window<f32>>::window(i as f32 / frame as f32))
        .collect();

    let mut output = vec![0.0f32; target_len + frame];
    let mut norm = vec![0.0f32; target_len + frame];
    let mut prev_start: Option<usize> = None;

    let mut k = 0usize;
    loop {
        let out_pos = k * hop_out;
        if out_pos >= target_len {
            break;
        }

        let nominal = ((k as f64 * hop_in).round() as isize).min(last_start);
        let start = match prev_start {
            None => nominal.max(0) as usize,
            Some(prev) => best_match(input, prev + hop_out, nominal, seek, last_start, hop_out),
        };

        for i in 0..frame {
            output[out_pos + i] += input[start + i] * window[i];
            norm[out_pos + i] += window[i];
        }

        prev_start = Some(start);
        k += 1;
    }

    output.truncate(target_len);
    for (sample, weight) in output.iter_mut().zip(norm.iter()) {
        if *weight > 1e-3 {
            *sample /= *weight;
        }
    }

    output
}

/// Ищет начало сегмента вокруг `nominal`, наиболее похожего на естественное
/// продолжение предыдущего сегмента (`natural`).
fn best_match(
    input: &[f32],
    natural: usize,
    nominal: isize,
    seek: isize,
    last_start: isize,
    overlap: usize,
) -> usize {
    let natural = natural.min(last_start as usize);
    let reference = &input[natural..natural + overlap];

    let low = (nominal - seek).max(0);
    let high = (nominal + seek).min(last_start);
    if low > high {
        return nominal.clamp(0, last_start) as usize;
    }

    let mut best = nominal.clamp(low, high) as usize;
    let mut best_score = f32::MIN;

    for candidate in low..=high {
        let candidate = candidate as usize;
        let segment = &input[candidate..candidate + overlap];
        let score: f32 = reference
            .iter()
            .zip(segment.iter())
            .step_by(CORRELATION_STRIDE)
            .map(|(a, b)| a * b)
            .sum();
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }

    best
}

/// Линейная интерполяция сигнала до `round(len / speed)` семплов.
///
/// Длительность и высота тона меняются вместе.
pub fn linear_resample(input: &[f32], speed: f64) -> Vec<f32> {
    let new_len = stretched_len(input.len(), speed);
    if input.is_empty() {
        return vec![0.0; new_len];
    }
    if new_len <= 1 {
        return input.iter().take(new_len).copied().collect();
    }

    let last = input.len() - 1;
    let step = input.len() as f64 / (new_len - 1) as f64;

    (0..new_len)
        .map(|j| {
            let x = j as f64 * step;
            let i = x.floor() as usize;
            if i >= last {
                input[last]
            } else {
                let frac = (x - i as f64) as f32;
                input[i] + (input[i + 1] - input[i]) * frac
            }
        })
        .collect()
}
