//! Concurrent ASR orchestration with rolling-context prompting (spec §4.3
//! C3). Chunks are grouped into fixed-size batches (`TRANSCRIPTION_BATCH_SIZE`);
//! batches run one after another so each can be primed with a context
//! string built from the previous batch's tail, while chunks *within* a
//! batch run concurrently under a bounded worker pool — the same
//! semaphore/`FuturesUnordered` shape the teacher uses for its whole-job
//! concurrency.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::audio::AudioChunk;
use crate::cancel::CancelToken;
use crate::error::{AutosubError, Result};
use crate::progress::{stage, ProgressBand, ProgressEvent, ProgressSink};
use crate::transcribe::Transcriber;
use crate::types::Segment;

/// Result of processing a single chunk.
#[derive(Debug)]
struct ChunkResult {
    index: usize,
    segments: Vec<Segment>,
    error: Option<String>,
    duration_ms: u64,
}

/// Statistics from the transcription process.
#[derive(Debug, Clone)]
pub struct TranscriptionStats {
    pub total_chunks: usize,
    pub successful_chunks: usize,
    pub failed_chunks: usize,
    pub total_time: Duration,
    pub avg_chunk_time: Duration,
}

/// Orchestrates concurrent, rolling-context transcription of audio chunks.
pub struct TranscriptionOrchestrator {
    transcriber: Arc<dyn Transcriber>,
    concurrency: usize,
    batch_size: usize,
    max_prompt_chars: usize,
    show_progress: bool,
}

impl TranscriptionOrchestrator {
    pub fn new(
        transcriber: Box<dyn Transcriber>,
        concurrency: usize,
        batch_size: usize,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            transcriber: Arc::from(transcriber),
            concurrency,
            batch_size: batch_size.max(1),
            max_prompt_chars,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Process all chunks and return the combined, order-preserved segment
    /// list plus aggregate stats. Segments are NOT yet reindexed; the
    /// caller does that after hallucination scrubbing.
    pub async fn process_chunks(
        &self,
        chunks: Vec<AudioChunk>,
        progress: &ProgressSink,
        cancel: &CancelToken,
    ) -> Result<(Vec<Segment>, TranscriptionStats)> {
        if chunks.is_empty() {
            return Ok((
                Vec::new(),
                TranscriptionStats {
                    total_chunks: 0,
                    successful_chunks: 0,
                    failed_chunks: 0,
                    total_time: Duration::ZERO,
                    avg_chunk_time: Duration::ZERO,
                },
            ));
        }

        let total_chunks = chunks.len();
        let start_time = Instant::now();
        let band = ProgressBand::new(0, 100);

        info!(
            "Transcribing {} chunks in batches of {} with {} concurrent requests using {}",
            total_chunks,
            self.batch_size,
            self.concurrency,
            self.transcriber.name()
        );

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(total_chunks as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut all_results: Vec<ChunkResult> = Vec::with_capacity(total_chunks);
        let mut rolling_context = String::new();
        let mut processed = 0usize;

        for batch in chunks.chunks(self.batch_size) {
            cancel.check()?;

            let mut futures = FuturesUnordered::new();
            for chunk in batch {
                cancel.check()?;

                let sem = semaphore.clone();
                let transcriber = self.transcriber.clone();
                let pb = progress_bar.clone();
                let context = rolling_context.clone();
                let chunk = chunk.clone();
                let cancel = cancel.clone();

                futures.push(async move {
                    let _permit = sem.acquire().await.expect("semaphore closed");
                    if cancel.is_cancelled() {
                        return ChunkResult {
                            index: chunk.index,
                            segments: Vec::new(),
                            error: Some("cancelled".to_string()),
                            duration_ms: 0,
                        };
                    }

                    let chunk_start = Instant::now();
                    debug!("Starting transcription of chunk {}", chunk.index);

                    let result = transcriber.transcribe(&chunk, &context).await;
                    let duration_ms = chunk_start.elapsed().as_millis() as u64;

                    if let Some(ref pb) = pb {
                        pb.inc(1);
                    }

                    match result {
                        Ok(segments) => {
                            debug!("Chunk {} completed in {}ms", chunk.index, duration_ms);
                            ChunkResult {
                                index: chunk.index,
                                segments,
                                error: None,
                                duration_ms,
                            }
                        }
                        Err(e) => {
                            warn!("Chunk {} failed: {}", chunk.index, e);
                            ChunkResult {
                                index: chunk.index,
                                segments: Vec::new(),
                                error: Some(e.to_string()),
                                duration_ms,
                            }
                        }
                    }
                });
            }

            let mut batch_results: Vec<ChunkResult> = Vec::with_capacity(batch.len());
            while let Some(result) = futures.next().await {
                processed += 1;
                if let Some(err) = &result.error {
                    progress.emit(ProgressEvent::item_failed(stage::TRANSCRIBE, err.clone()));
                } else {
                    progress.emit(ProgressEvent::item_progress(
                        stage::TRANSCRIBE,
                        band.scale(processed as f64 / total_chunks as f64),
                        processed as u64,
                        total_chunks as u64,
                    ));
                }
                batch_results.push(result);
            }

            batch_results.sort_by_key(|r| r.index);

            rolling_context = build_rolling_context(&batch_results, self.max_prompt_chars);
            all_results.extend(batch_results);
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message("Transcription complete");
        }

        all_results.sort_by_key(|r| r.index);

        let mut segments: Vec<Segment> = Vec::new();
        let mut successful_count = 0;
        let mut failed_count = 0;
        let mut total_chunk_time_ms: u64 = 0;

        for result in &all_results {
            total_chunk_time_ms += result.duration_ms;
            if result.error.is_none() {
                successful_count += 1;
                segments.extend(result.segments.clone());
            } else {
                failed_count += 1;
            }
        }

        let total_time = start_time.elapsed();
        let avg_chunk_time = if !all_results.is_empty() {
            Duration::from_millis(total_chunk_time_ms / all_results.len() as u64)
        } else {
            Duration::ZERO
        };

        let stats = TranscriptionStats {
            total_chunks,
            successful_chunks: successful_count,
            failed_chunks: failed_count,
            total_time,
            avg_chunk_time,
        };

        info!(
            "Transcription complete: {}/{} chunks successful in {:.2}s (avg {:.2}s/chunk)",
            successful_count,
            total_chunks,
            total_time.as_secs_f64(),
            avg_chunk_time.as_secs_f64()
        );

        if successful_count == 0 && total_chunks > 0 {
            let error_msgs: Vec<String> = all_results.iter().filter_map(|r| r.error.clone()).collect();
            return Err(AutosubError::AsrChunkFailed(format!(
                "All {} chunks failed. Errors: {}",
                total_chunks,
                error_msgs.join("; ")
            )));
        }

        Ok((segments, stats))
    }
}

/// Build the rolling-context prompt for the *next* batch from the tail of
/// the batch that just finished: concatenate successful segment text in
/// order and keep only the last `max_chars`.
fn build_rolling_context(results: &[ChunkResult], max_chars: usize) -> String {
    let mut text = String::new();
    for result in results {
        if result.error.is_some() {
            continue;
        }
        for segment in &result.segments {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&segment.original);
        }
    }

    if text.len() > max_chars {
        let start = text.len() - max_chars;
        // Avoid splitting a multi-byte character.
        let start = (start..text.len()).find(|&i| text.is_char_boundary(i)).unwrap_or(start);
        text[start..].to_string()
    } else {
        text
    }
}
