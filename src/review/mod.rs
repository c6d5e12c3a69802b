//! Review pass (spec §4.6 C7): a sliding-window editor that rewrites draft
//! translations while preserving line count and order. Grounded on the
//! fixed-prefix batch parsing style of `translate::gemini::parse_batch_response`
//! and reusing `TranscriptionOrchestrator`'s `Semaphore`-bounded pool shape.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::progress::{self, ProgressBand, ProgressEvent, ProgressSink};
use crate::translate::Translator;
use crate::types::Segment;

const LINE_PREFIX: &str = "@@SUB_LINE@@";
const MIN_COVERAGE_FRACTION: f64 = 0.9;

pub struct ReviewOrchestrator {
    translator: Arc<dyn Translator>,
    batch_size: usize,
    overlap_ctx: usize,
    concurrency: usize,
}

impl ReviewOrchestrator {
    pub fn new(translator: Arc<dyn Translator>, batch_size: usize, overlap_ctx: usize, concurrency: usize) -> Self {
        Self {
            translator,
            batch_size: batch_size.max(1),
            overlap_ctx,
            concurrency: concurrency.max(1),
        }
    }

    /// Review `segments` in place over overlapping windows, each window
    /// stepping by `batch_size - overlap_ctx`. A segment's translation is
    /// overwritten only when the current batch's start index exceeds its
    /// `reviewed_in_batch` marker (spec §4.6 "newest batch wins").
    pub async fn review(
        &self,
        segments: &mut [Segment],
        target_lang: &str,
        progress: &ProgressSink,
        cancel: &CancelToken,
    ) -> Result<()> {
        if segments.is_empty() {
            return Ok(());
        }

        cancel.check()?;

        let total = segments.len();
        let step = self.batch_size.saturating_sub(self.overlap_ctx).max(1);

        let originals: Vec<String> = segments.iter().map(|s| s.original.clone()).collect();
        let drafts: Vec<String> = segments.iter().map(|s| s.display_text().to_string()).collect();

        let mut window_starts = Vec::new();
        let mut cursor = 0usize;
        loop {
            window_starts.push(cursor);
            if cursor + self.batch_size >= total {
                break;
            }
            cursor += step;
        }
        let window_count = window_starts.len();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for (batch_index, window_start) in window_starts.into_iter().enumerate() {
            let window_end = (window_start + self.batch_size).min(total);
            let ctx_before_start = window_start.saturating_sub(self.overlap_ctx);
            let ctx_after_end = (window_end + self.overlap_ctx).min(total);

            let ctx_before = originals[ctx_before_start..window_start].to_vec();
            let ctx_after = originals[window_end..ctx_after_end].to_vec();
            let window: Vec<(usize, String, String)> =
                (window_start..window_end).map(|i| (i, originals[i].clone(), drafts[i].clone())).collect();

            let translator = Arc::clone(&self.translator);
            let semaphore = Arc::clone(&semaphore);
            let target_lang = target_lang.to_string();
            let cancel = cancel.clone();

            futures.push(async move {
                let _permit = semaphore.acquire().await.expect("review semaphore closed");

                if cancel.is_cancelled() {
                    return (batch_index as u32, window_start, Ok(Vec::new()));
                }

                let result = review_window(translator.as_ref(), &ctx_before, &window, &ctx_after, &target_lang).await;
                (batch_index as u32, window_start, result)
            });
        }

        let mut completed = 0usize;

        while let Some((batch_index, window_start, result)) = futures.next().await {
            cancel.check()?;

            match result {
                Ok(reviewed) => {
                    for (index, text) in reviewed {
                        if let Some(segment) = segments.get_mut(index) {
                            let already_newer =
                                segment.reviewed_in_batch.map(|marker| marker >= batch_index).unwrap_or(false);
                            if !already_newer {
                                segment.translation = Some(text);
                                segment.reviewed_in_batch = Some(batch_index);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("review batch at {} rejected, keeping drafts: {}", window_start, e);
                    progress.emit(ProgressEvent::item_failed(progress::stage::REVIEW, e.to_string()));
                }
            }

            completed += 1;
            let band = ProgressBand::new(0, 100);
            let pct = band.scale(completed as f64 / window_count.max(1) as f64);
            progress.emit(ProgressEvent::stage_progress(progress::stage::REVIEW, pct));
        }

        Ok(())
    }
}

async fn review_window(
    translator: &dyn Translator,
    ctx_before: &[String],
    window: &[(usize, String, String)],
    ctx_after: &[String],
    target_lang: &str,
) -> Result<Vec<(usize, String)>> {
    let prompt = build_review_prompt(ctx_before, window, ctx_after, target_lang);
    let raw = translator.complete_raw(&prompt).await?;
    parse_review_response(&raw, window)
}

fn build_review_prompt(ctx_before: &[String], window: &[(usize, String, String)], ctx_after: &[String], target_lang: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are reviewing draft {target_lang} subtitle translations. Improve fluency and \
accuracy only. Do not merge, split, reorder, add, or delete lines: the number of output \
lines must exactly equal the number of input lines, in the same order. Respond with one \
line per input, each prefixed `{LINE_PREFIX} <absolute_index>: <text>`.\n\n"
    ));

    if !ctx_before.is_empty() {
        prompt.push_str("Preceding source context (do not rewrite):\n");
        prompt.push_str(&ctx_before.join("\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str("Source / draft pairs to review:\n");
    for (index, source, draft) in window {
        prompt.push_str(&format!("[{}] source: {}\n    draft:  {}\n", index + 1, source, draft));
    }

    if !ctx_after.is_empty() {
        prompt.push_str("\nFollowing source context (do not rewrite):\n");
        prompt.push_str(&ctx_after.join("\n"));
    }

    prompt
}

fn parse_review_response(raw: &str, window: &[(usize, String, String)]) -> Result<Vec<(usize, String)>> {
    let pattern = format!(r"(?m)^{}\s+(\d+):\s*(.*)$", regex::escape(LINE_PREFIX));
    let line_re = Regex::new(&pattern).expect("invalid review line regex");

    let mut found: std::collections::HashMap<usize, String> = std::collections::HashMap::new();
    for cap in line_re.captures_iter(raw) {
        if let Ok(absolute) = cap[1].parse::<usize>() {
            if absolute == 0 {
                continue;
            }
            found.insert(absolute - 1, cap[2].trim().to_string());
        }
    }

    let coverage = found.len() as f64 / window.len().max(1) as f64;
    let has_duplicates = found.len() < line_re.captures_iter(raw).count();

    if coverage < MIN_COVERAGE_FRACTION || has_duplicates {
        return Err(crate::error::AutosubError::ReviewBatchRejected(format!(
            "coverage {:.0}% (need {:.0}%)",
            coverage * 100.0,
            MIN_COVERAGE_FRACTION * 100.0
        )));
    }

    Ok(window
        .iter()
        .map(|(index, _source, draft)| {
            let text = found.get(index).cloned().unwrap_or_else(|| draft.clone());
            (*index, text)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubTranslator {
        response: String,
    }

    #[async_trait]
    impl Translator for StubTranslator {
        async fn translate(&self, text: &str, _t: &str) -> Result<String> {
            Ok(text.to_string())
        }
        async fn translate_batch(&self, texts: &[&str], _t: &str) -> Result<Vec<String>> {
            Ok(texts.iter().map(|t| t.to_string()).collect())
        }
        async fn complete_raw(&self, _prompt: &str) -> Result<String> {
            Ok(self.response.clone())
        }
        fn supported_languages(&self) -> &[&str] {
            &["es"]
        }
        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn seg(original: &str, translation: &str) -> Segment {
        let mut s = Segment::new(0.0, 1.0, original);
        s.translation = Some(translation.to_string());
        s
    }

    #[tokio::test]
    async fn reviews_window_and_marks_batch() {
        let translator = Arc::new(StubTranslator {
            response: "@@SUB_LINE@@ 1: Hola mejorado\n@@SUB_LINE@@ 2: Adios mejorado".to_string(),
        });
        let orchestrator = ReviewOrchestrator::new(translator, 50, 8, 4);
        let mut segments = vec![seg("Hello", "Hola"), seg("Goodbye", "Adios")];
        let (sink, _rx) = ProgressSink::new();
        let cancel = CancelToken::new();

        orchestrator.review(&mut segments, "es", &sink, &cancel).await.unwrap();

        assert_eq!(segments[0].translation.as_deref(), Some("Hola mejorado"));
        assert_eq!(segments[0].reviewed_in_batch, Some(0));
    }

    #[tokio::test]
    async fn keeps_draft_when_batch_rejected_for_low_coverage() {
        let translator = Arc::new(StubTranslator { response: "@@SUB_LINE@@ 1: only one".to_string() });
        let orchestrator = ReviewOrchestrator::new(translator, 50, 8, 4);
        let mut segments: Vec<Segment> = (0..10).map(|i| seg(&format!("s{i}"), &format!("d{i}"))).collect();
        let (sink, _rx) = ProgressSink::new();
        let cancel = CancelToken::new();

        orchestrator.review(&mut segments, "es", &sink, &cancel).await.unwrap();

        assert_eq!(segments[5].translation.as_deref(), Some("d5"));
        assert!(segments[5].reviewed_in_batch.is_none());
    }

    #[test]
    fn newest_batch_wins_on_overlap_conflict() {
        let mut segments = vec![seg("Hello", "Hola")];
        segments[0].reviewed_in_batch = Some(3);

        let already_newer = segments[0].reviewed_in_batch.map(|marker| marker >= 1).unwrap_or(false);
        assert!(already_newer, "a batch with lower index must not overwrite a newer marker");
    }
}
