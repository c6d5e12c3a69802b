//! Hallucination scrubbing (spec §4.3 C4): a per-batch LLM pass that flags
//! repeated-phrase and outro hallucinations, followed by a local regex
//! cleanup of whatever survives.

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::llm::LlmProvider;
use crate::types::Segment;

const OUTRO_VALID_FRACTION: f64 = 0.9;

fn system_prompt(video_length_sec: f64) -> String {
    format!(
        "You are scrubbing speech-to-text output for hallucinated lines. \
VIDEO_LENGTH_SEC = {video_length_sec:.2}. A line that reads like a sign-off, \
subscribe request, or outro is only a genuine outro if its start_sec is \
greater than {:.2} ({OUTRO_VALID_FRACTION} x VIDEO_LENGTH_SEC); an identical \
line appearing earlier is a hallucination and must be deleted. Also delete \
lines that are pure filler repetition with no informational content. For \
every input, respond with exactly one decision: \"keep\" (unchanged), \
\"clean\" (salvageable but strip decorative emoji/punctuation noise), or \
\"delete\" (remove entirely). Respond ONLY with a JSON array of objects \
shaped like {{\"index\": <input index>, \"decision\": \"keep\"|\"clean\"|\"delete\"}}.",
        video_length_sec * OUTRO_VALID_FRACTION
    )
}

fn user_prompt(segments: &[Segment]) -> String {
    let items: Vec<String> = segments
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{{\"index\": {i}, \"start_sec\": {:.2}, \"text\": {:?}}}", s.start_sec, s.original))
        .collect();

    format!("[{}]", items.join(", "))
}

#[derive(Debug, Deserialize)]
struct ScrubDecision {
    index: usize,
    decision: String,
}

/// Scrub a batch's worth of freshly transcribed segments in place, removing
/// hallucinated entries and cleaning up decorative noise on the rest.
pub async fn scrub_hallucinations(
    segments: Vec<Segment>,
    video_length_sec: f64,
    llm: &dyn LlmProvider,
    cancel: &CancelToken,
) -> Result<Vec<Segment>> {
    if segments.is_empty() {
        return Ok(segments);
    }

    cancel.check()?;

    let system = system_prompt(video_length_sec);
    let user = user_prompt(&segments);

    let decisions = match llm.complete(&system, &user).await {
        Ok(raw) => parse_decisions(&raw, segments.len()),
        Err(e) => {
            warn!("hallucination scrub LLM call failed, keeping all segments: {}", e);
            None
        }
    };

    let mut out = Vec::with_capacity(segments.len());

    for (i, mut segment) in segments.into_iter().enumerate() {
        let decision = decisions.as_ref().and_then(|d| d.get(i)).map(String::as_str).unwrap_or("keep");

        match decision {
            "delete" => {
                debug!("scrubbing hallucinated segment at {:.2}s: {:?}", segment.start_sec, segment.original);
                continue;
            }
            "clean" => {
                segment.original = local_postfilter(&segment.original);
                out.push(segment);
            }
            _ => out.push(segment),
        }
    }

    Ok(out)
}

fn parse_decisions(raw: &str, count: usize) -> Option<Vec<String>> {
    let json_start = raw.find('[')?;
    let json_end = raw.rfind(']')?;
    if json_end < json_start {
        return None;
    }

    let slice = &raw[json_start..=json_end];
    let parsed: Vec<ScrubDecision> = serde_json::from_str(slice).ok()?;

    let mut decisions = vec!["keep".to_string(); count];
    for d in parsed {
        if d.index < count {
            decisions[d.index] = d.decision;
        }
    }

    Some(decisions)
}

/// Collapse runs of the same punctuation/symbol (3+) to one, strip extended
/// pictographic characters (emoji), and trim whitespace.
pub fn local_postfilter(text: &str) -> String {
    let repeated_punct_re = Regex::new(r"([\p{P}\p{S}])\1{2,}").expect("invalid repeated-punctuation regex");
    let collapsed = repeated_punct_re.replace_all(text, "$1");

    let without_emoji: String = collapsed
        .chars()
        .filter(|c| !is_extended_pictographic(*c))
        .collect();

    without_emoji.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_extended_pictographic(c: char) -> bool {
    let cp = c as u32;
    matches!(cp,
        0x1F300..=0x1FAFF
        | 0x2600..=0x27BF
        | 0x2B00..=0x2BFF
        | 0x1F000..=0x1F0FF
        | 0xFE00..=0xFE0F
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.response.clone())
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn seg(start: f64, end: f64, text: &str) -> Segment {
        Segment::new(start, end, text)
    }

    #[tokio::test]
    async fn deletes_early_outro_hallucination() {
        let segments = vec![
            seg(10.0, 14.0, "Please subscribe!"),
            seg(20.0, 22.0, "and now back to the show"),
        ];
        let llm = StubLlm {
            response: r#"[{"index": 0, "decision": "delete"}, {"index": 1, "decision": "keep"}]"#.to_string(),
        };
        let cancel = CancelToken::new();

        let result = scrub_hallucinations(segments, 120.0, &llm, &cancel).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].original, "and now back to the show");
    }

    #[tokio::test]
    async fn cleans_segment_marked_clean() {
        let segments = vec![seg(0.0, 1.0, "Wow!!!! amazing 🎉🎉🎉")];
        let llm = StubLlm { response: r#"[{"index": 0, "decision": "clean"}]"#.to_string() };
        let cancel = CancelToken::new();

        let result = scrub_hallucinations(segments, 60.0, &llm, &cancel).await.unwrap();
        assert_eq!(result.len(), 1);
        assert!(!result[0].original.contains('🎉'));
        assert!(!result[0].original.contains("!!!!"));
    }

    #[tokio::test]
    async fn keeps_everything_when_llm_fails() {
        struct FailingLlm;
        #[async_trait]
        impl LlmProvider for FailingLlm {
            async fn complete(&self, _s: &str, _u: &str) -> Result<String> {
                Err(crate::error::AutosubError::Api("boom".to_string()))
            }
            fn name(&self) -> &'static str {
                "failing"
            }
        }

        let segments = vec![seg(0.0, 1.0, "hello")];
        let cancel = CancelToken::new();
        let result = scrub_hallucinations(segments, 60.0, &FailingLlm, &cancel).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn local_postfilter_collapses_repeated_punctuation() {
        assert_eq!(local_postfilter("wow!!!!"), "wow!");
        assert_eq!(local_postfilter("really????"), "really?");
    }

    #[test]
    fn local_postfilter_strips_emoji() {
        let cleaned = local_postfilter("great job 🎉🎉🎉");
        assert!(!cleaned.contains('🎉'));
    }

    #[test]
    fn local_postfilter_trims_whitespace() {
        assert_eq!(local_postfilter("  hello   world  "), "hello world");
    }
}
