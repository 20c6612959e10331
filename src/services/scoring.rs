// src/services/scoring.rs

use crate::models::{band::Band, module::AnswerKey, submission::Answers};

/// Questions on the reference IELTS listening/reading paper. Raw scores of
/// modules with a different length are scaled onto it before banding.
pub const REFERENCE_QUESTIONS: u32 = 40;

/// (minimum scaled raw score, band in half steps), highest first.
const BAND_TABLE: &[(u32, i16)] = &[
    (39, 18),
    (37, 17),
    (35, 16),
    (32, 15),
    (30, 14),
    (26, 13),
    (23, 12),
    (18, 11),
    (16, 10),
    (13, 9),
    (10, 8),
    (8, 7),
    (6, 6),
    (4, 5),
    (2, 4),
    (1, 2),
    (0, 0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    /// Correct answers.
    pub raw: u32,
    /// Questions in the answer key.
    pub total: u32,
    pub band: Band,
}

/// Trims, lowercases and collapses internal whitespace.
pub fn normalize_answer(answer: &str) -> String {
    answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Compares `answers` against `key`. Missing or unknown answers count as
/// incorrect; an empty key scores zero.
pub fn score(answers: &Answers, key: &AnswerKey) -> Score {
    let total = key.len() as u32;

    let raw = key
        .iter()
        .filter(|(question, accepted)| {
            answers.get(*question).is_some_and(|given| {
                let given = normalize_answer(given);
                !given.is_empty() && accepted.iter().any(|a| normalize_answer(a) == given)
            })
        })
        .count() as u32;

    Score {
        raw,
        total,
        band: band_for_raw(raw, total),
    }
}

/// Monotonic step function from a raw score to a band.
pub fn band_for_raw(raw: u32, total: u32) -> Band {
    if total == 0 {
        return Band::MIN;
    }
    let scaled = raw.min(total) * REFERENCE_QUESTIONS / total;

    BAND_TABLE
        .iter()
        .find(|(threshold, _)| scaled >= *threshold)
        .and_then(|(_, half_steps)| Band::from_half_steps(*half_steps))
        .unwrap_or(Band::MIN)
}

/// Mean of the module bands rounded to the nearest half band, quarters
/// rounding up (6.25 -> 6.5, 6.75 -> 7.0).
pub fn overall_band(bands: &[Band]) -> Option<Band> {
    if bands.is_empty() {
        return None;
    }
    let n = bands.len() as i64;
    let sum: i64 = bands.iter().map(|b| i64::from(b.half_steps())).sum();
    // round(sum / n) with halves going up, in half-step units
    let rounded = (2 * sum + n) / (2 * n);
    Band::from_half_steps(rounded as i16)
}
