//! Word-to-caption grouping (spec §4.3).
//!
//! Raw ASR segments carry word-level timestamps. This module re-groups
//! those words into display-ready captions, independent of how the
//! provider chose to chunk its own `segments[]` output.

use regex::Regex;

use crate::types::{Segment, WordTimestamp};

const MAX_CAPTION_DURATION_SEC: f64 = 8.0;
const MAX_CAPTION_WORDS: usize = 12;
const MIN_CAPTION_WORDS: usize = 3;
const NO_SPEECH_PROB_MAX: f64 = 0.7;
const AVG_LOGPROB_MIN: f64 = -4.5;

/// Leading punctuation that attaches to the previous word without a space.
fn punctuation_regex() -> Regex {
    Regex::new(r"^[\p{P}$+<=>^`|~]").expect("invalid punctuation regex")
}

/// Whether `c` is leading punctuation that should attach to preceding text
/// without an intervening space (used by callers joining caption text
/// outside of `group_words`, e.g. subtitle finalization's orphan fusion).
pub fn starts_with_punctuation(c: char) -> bool {
    punctuation_regex().is_match(&c.to_string())
}

/// Re-group the words carried by `raw_segments` into caption-sized
/// segments, dropping words from segments whose quality hints mark them as
/// likely hallucinated.
pub fn group_words(raw_segments: &[Segment]) -> Vec<Segment> {
    let mut flat: Vec<(WordTimestamp, bool)> = Vec::new();

    for seg in raw_segments {
        let no_speech_ok = seg.no_speech_prob.map(|p| p < NO_SPEECH_PROB_MAX).unwrap_or(true);
        let logprob_ok = seg.avg_logprob.map(|p| p > AVG_LOGPROB_MIN).unwrap_or(true);

        if !(no_speech_ok && logprob_ok) || seg.words.is_empty() {
            continue;
        }

        let last_index = seg.words.len() - 1;
        for (i, word) in seg.words.iter().enumerate() {
            flat.push((word.clone(), i == last_index));
        }
    }

    if flat.is_empty() {
        return Vec::new();
    }

    if let Some(last) = flat.last_mut() {
        last.1 = true;
    }

    let punct_re = punctuation_regex();
    let mut captions = Vec::new();
    let mut current: Vec<WordTimestamp> = Vec::new();
    let mut current_start = 0.0_f64;

    for (word, is_hard_boundary) in flat {
        if current.is_empty() {
            current_start = word.start_sec;
        }
        current.push(word);

        let count = current.len();
        let duration = current.last().map(|w| w.end_sec).unwrap_or(current_start) - current_start;
        let size_boundary = duration >= MAX_CAPTION_DURATION_SEC || count >= MAX_CAPTION_WORDS;
        let boundary_reached = is_hard_boundary || size_boundary;
        let min_size_satisfied = is_hard_boundary || count >= MIN_CAPTION_WORDS;

        if boundary_reached && min_size_satisfied {
            captions.push(build_caption(&current, current_start, &punct_re));
            current.clear();
        }
    }

    if !current.is_empty() {
        captions.push(build_caption(&current, current_start, &punct_re));
    }

    captions
}

fn build_caption(words: &[WordTimestamp], start: f64, punct_re: &Regex) -> Segment {
    let end = words.last().map(|w| w.end_sec).unwrap_or(start);
    let mut segment = Segment::new(start, end, assemble_text(words, punct_re));
    segment.words = words.to_vec();
    segment
}

/// Join words with a single space, attaching leading punctuation to the
/// previous word instead of inserting a space before it.
fn assemble_text(words: &[WordTimestamp], punct_re: &Regex) -> String {
    let mut out = String::new();

    for word in words {
        let text = word.text.trim();
        if text.is_empty() {
            continue;
        }

        if out.is_empty() {
            out.push_str(text);
        } else if punct_re.is_match(text) {
            out.push_str(text);
        } else {
            out.push(' ');
            out.push_str(text);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> WordTimestamp {
        WordTimestamp { text: text.to_string(), start_sec: start, end_sec: end }
    }

    fn segment_with_words(words: Vec<WordTimestamp>, no_speech_prob: Option<f64>, avg_logprob: Option<f64>) -> Segment {
        let mut seg = Segment::new(0.0, 0.0, "");
        seg.no_speech_prob = no_speech_prob;
        seg.avg_logprob = avg_logprob;
        seg.words = words;
        seg
    }

    #[test]
    fn groups_short_utterance_as_single_caption() {
        let words = vec![word("Hello", 0.0, 0.3), word("world", 0.3, 0.6)];
        let raw = vec![segment_with_words(words, Some(0.1), Some(-0.5))];

        let captions = group_words(&raw);
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].original, "Hello world");
        assert_eq!(captions[0].start_sec, 0.0);
        assert_eq!(captions[0].end_sec, 0.6);
    }

    #[test]
    fn cuts_on_word_count_boundary() {
        let words: Vec<WordTimestamp> = (0..12)
            .map(|i| word("w", i as f64 * 0.2, i as f64 * 0.2 + 0.15))
            .collect();
        let raw = vec![segment_with_words(words, None, None)];

        let captions = group_words(&raw);
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].words.len(), 12);
    }

    #[test]
    fn cuts_on_duration_boundary() {
        let words = vec![
            word("a", 0.0, 3.0),
            word("b", 3.0, 6.0),
            word("c", 6.0, 9.0),
            word("d", 9.0, 9.5),
        ];
        let raw = vec![segment_with_words(words, None, None)];

        let captions = group_words(&raw);
        assert_eq!(captions.len(), 2);
        assert!(captions[0].duration() >= MAX_CAPTION_DURATION_SEC);
    }

    #[test]
    fn hard_boundary_cuts_even_below_minimum_size() {
        let seg1_words = vec![word("Hi", 0.0, 0.3)];
        let seg2_words = vec![word("there", 1.0, 1.3), word("friend", 1.3, 1.6)];
        let raw = vec![
            segment_with_words(seg1_words, None, None),
            segment_with_words(seg2_words, None, None),
        ];

        let captions = group_words(&raw);
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[0].original, "Hi");
    }

    #[test]
    fn drops_words_from_low_quality_segments() {
        let words = vec![word("garbage", 0.0, 0.3)];
        let raw = vec![segment_with_words(words, Some(0.9), Some(-0.5))];

        let captions = group_words(&raw);
        assert!(captions.is_empty());
    }

    #[test]
    fn attaches_leading_punctuation_without_space() {
        let words = vec![word("Hello", 0.0, 0.3), word(",", 0.3, 0.35), word("world", 0.4, 0.6)];
        let raw = vec![segment_with_words(words, None, None)];

        let captions = group_words(&raw);
        assert_eq!(captions[0].original, "Hello, world");
    }

    #[test]
    fn empty_input_produces_no_captions() {
        assert!(group_words(&[]).is_empty());
    }
}
