//! Разбиение текста на чанки по границам предложений
//!
//! Граница предложения определяется только по `.`, `!` и `?`. Сокращения и
//! десятичные числа (`3.14`) тоже считаются границами: внешний код может
//! полагаться на именно такое поведение.

use lazy_static::lazy_static;
use regex::Regex;
use crate::tts::TextChunk;

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]+").expect("valid sentence regex");
}

/// Нормализация текста: одиночные пробелы и завершающая точка
pub fn preprocess_text(text: &str) -> String {
    let mut text = text.split_whitespace().collect::<Vec<&str>>().join(" ");
    if let Some(last) = text.chars().last() {
        if !matches!(last, '.' | '!' | '?') {
            text.push('.');
        }
    }
    text
}

/// Предложения вместе с завершающей пунктуацией и ведущими пробелами
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(text) {
        sentences.push(&text[start..m.end()]);
        start = m.end();
    }
    if !text[start..].trim().is_empty() {
        sentences.push(&text[start..]);
    }

    sentences
}

/// Жадно собрать предложения в чанки длиной не более `max_chars` символов.
///
/// Предложение никогда не разрезается: если одно предложение длиннее
/// `max_chars`, оно попадает в чанк целиком.
///
/// Длина считается вместе с ведущим пробелом предложения, поэтому
/// `"Hello world! This is a test. Another sentence here."` при
/// `max_chars = 30` дает два чанка, а не три.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<TextChunk> {
    let text = preprocess_text(text);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(&text) {
        if current.is_empty() {
            current.push_str(sentence);
        } else if current.chars().count() + sentence.chars().count() <= max_chars {
            current.push_str(sentence);
        } else {
            chunks.push(current.trim().to_string());
            current = sentence.to_string();
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .enumerate()
        .map(|(index, text)| TextChunk {
            index,
            text,
            target_duration_seconds: None,
        })
        .collect()
}
