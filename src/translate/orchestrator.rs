//! Windowed, context-aware translation (spec §4.5 C6).

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::progress::{self, ProgressBand, ProgressEvent, ProgressSink};
use crate::translate::Translator;
use crate::types::Segment;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;

/// Drives `Translator::complete_raw` over fixed-size windows of segments,
/// each primed with source-language context before and after the window,
/// under a bounded-concurrency pool separate from the ASR orchestrator's.
pub struct TranslationOrchestrator {
    translator: Arc<dyn Translator>,
    window_size: usize,
    context_size: usize,
    concurrency: usize,
}

impl TranslationOrchestrator {
    pub fn new(translator: Arc<dyn Translator>, window_size: usize, context_size: usize, concurrency: usize) -> Self {
        Self {
            translator,
            window_size: window_size.max(1),
            context_size,
            concurrency: concurrency.max(1),
        }
    }

    /// Translate `segments` in place, setting `translation` on each. A
    /// batch that exhausts its retries falls back to `translation ==
    /// original` (spec §4.5 "silent fallback") rather than failing the run.
    pub async fn translate(
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
        let originals: Vec<String> = segments.iter().map(|s| s.original.clone()).collect();

        let mut window_starts = Vec::new();
        let mut cursor = 0;
        while cursor < total {
            window_starts.push(cursor);
            cursor += self.window_size;
        }
        let window_count = window_starts.len();

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for window_start in window_starts {
            let window_end = (window_start + self.window_size).min(total);
            let ctx_before_start = window_start.saturating_sub(self.context_size);
            let ctx_after_end = (window_end + self.context_size).min(total);

            let ctx_before = originals[ctx_before_start..window_start].to_vec();
            let ctx_after = originals[window_end..ctx_after_end].to_vec();
            let window_lines: Vec<(usize, String)> =
                (window_start..window_end).map(|i| (i, originals[i].clone())).collect();

            let translator = Arc::clone(&self.translator);
            let semaphore = Arc::clone(&semaphore);
            let target_lang = target_lang.to_string();
            let cancel = cancel.clone();

            futures.push(async move {
                let _permit = semaphore.acquire().await.expect("translation semaphore closed");

                if cancel.is_cancelled() {
                    let fallback = window_lines.clone();
                    return (window_start, window_end, fallback);
                }

                let translations =
                    translate_window_with_retry(translator.as_ref(), &ctx_before, &window_lines, &ctx_after, &target_lang)
                        .await;
                (window_start, window_end, translations)
            });
        }

        let mut completed_windows = 0usize;

        while let Some((window_start, window_end, translations)) = futures.next().await {
            cancel.check()?;

            for (index, text) in translations {
                if let Some(segment) = segments.get_mut(index) {
                    segment.translation = Some(text);
                }
            }

            completed_windows += 1;
            let _ = window_start;
            let _ = window_end;
            let band = ProgressBand::new(0, 100);
            let pct = band.scale(completed_windows as f64 / window_count.max(1) as f64);
            progress.emit(ProgressEvent::stage_progress(progress::stage::TRANSLATE, pct));
        }

        resolve_redundant_lines(segments);

        Ok(())
    }
}

/// Build the fused prompt (context blocks + numbered window lines), call
/// the provider with retry/backoff, and parse its `Line N:` response.
/// Falls back to `text == original` for every line in the window once
/// retries are exhausted (spec §4.5).
async fn translate_window_with_retry(
    translator: &dyn Translator,
    ctx_before: &[String],
    window_lines: &[(usize, String)],
    ctx_after: &[String],
    target_lang: &str,
) -> Vec<(usize, String)> {
    let prompt = build_window_prompt(ctx_before, window_lines, ctx_after, target_lang);

    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match translator.complete_raw(&prompt).await {
            Ok(raw) => return parse_window_response(&raw, window_lines),
            Err(e) => {
                warn!("translation window attempt {} failed: {}", attempt + 1, e);
                last_error = Some(e);
            }
        }
    }

    warn!(
        "translation window exhausted retries ({}), falling back to source text",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    );

    window_lines.iter().map(|(i, text)| (*i, text.clone())).collect()
}

fn build_window_prompt(ctx_before: &[String], window_lines: &[(usize, String)], ctx_after: &[String], target_lang: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Translate the numbered lines below to {target_lang}. Respond with exactly one \
translation per input line, each on its own line prefixed `Line N:` where N is the \
absolute line number shown. Preserve meaning and tone; do not merge, split, reorder, \
add, or drop lines.\n\n"
    ));

    if !ctx_before.is_empty() {
        prompt.push_str("Preceding context (do not translate, for continuity only):\n");
        prompt.push_str(&ctx_before.join("\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str("Lines to translate:\n");
    for (index, text) in window_lines {
        prompt.push_str(&format!("Line {}: {}\n", index + 1, text));
    }

    if !ctx_after.is_empty() {
        prompt.push_str("\nFollowing context (do not translate, for continuity only):\n");
        prompt.push_str(&ctx_after.join("\n"));
    }

    prompt
}

fn parse_window_response(raw: &str, window_lines: &[(usize, String)]) -> Vec<(usize, String)> {
    let line_re = Regex::new(r"(?m)^Line\s+(\d+):\s*(.*)$").expect("invalid Line N: regex");

    let mut found: std::collections::HashMap<usize, String> = std::collections::HashMap::new();
    for cap in line_re.captures_iter(raw) {
        if let Ok(absolute) = cap[1].parse::<usize>() {
            if absolute == 0 {
                continue;
            }
            found.entry(absolute - 1).or_insert_with(|| cap[2].trim().to_string());
        }
    }

    window_lines
        .iter()
        .map(|(index, original)| {
            let text = found.get(index).cloned().unwrap_or_else(|| original.clone());
            (*index, text)
        })
        .collect()
}

/// A translated line identical to its source is "redundant" (spec §4.5);
/// replace it with the nearest preceding non-empty, non-redundant
/// translation so the output never regresses to an untranslated gap mid-run.
fn resolve_redundant_lines(segments: &mut [Segment]) {
    let mut last_good: Option<String> = None;

    for segment in segments.iter_mut() {
        let is_redundant = segment
            .translation
            .as_ref()
            .map(|t| t.trim() == segment.original.trim() && !t.is_empty())
            .unwrap_or(false);

        if is_redundant {
            if let Some(ref prev) = last_good {
                segment.translation = Some(prev.clone());
            }
            continue;
        }

        if let Some(ref t) = segment.translation {
            if !t.is_empty() {
                last_good = Some(t.clone());
            }
        }
    }
}
