//! Segmented pipeline variant: keyframes and generation per fixed-length
//! chunk, concatenated in source order.

use super::{plan_timestamps, Orchestrator, ProgressReporter, RunOptions, Stage};
use crate::analysis::RelevantMoment;
use crate::error::{Result, VidereError};
use crate::generate::{validate_payload, DocPayload};
use crate::media::MediaInfo;
use crate::prompts::PromptOutputFormat;
use crate::trace::{attrs, TraceRecorder};
use crate::transcription::Transcript;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// One fixed-length slice of the source.
#[derive(Debug, Clone)]
struct Chunk {
    index: usize,
    start_sec: f64,
    end_sec: f64,
}

impl Orchestrator {
    /// Run stages 5-6 per chunk with bounded concurrency and concatenate
    /// the chunk documents in source order.
    ///
    /// Chunk documents are joined naively; callers that need a coherent
    /// cross-chunk narrative should run the linear pipeline instead.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub(super) async fn run_segmented(
        &self,
        session_id: &str,
        source: &PathBuf,
        media: &MediaInfo,
        transcript: &Transcript,
        moments: &[RelevantMoment],
        options: &RunOptions,
        reporter: &ProgressReporter,
        recorder: &TraceRecorder,
        cancel: &CancellationToken,
    ) -> Result<DocPayload> {
        let record = self.prompts.get(&options.mode)?;
        if record.output_format != PromptOutputFormat::Markdown {
            return Err(VidereError::InputInvalid(format!(
                "segment_pipeline concatenates chunk documents and only supports \
                 markdown modes; '{}' declares {} output",
                options.mode, record.output_format
            )));
        }

        let chunks = build_chunks(media.duration_sec, self.settings.segmented.chunk_sec);
        let chunk_count = chunks.len();
        let concurrency = self
            .settings
            .segmented
            .max_parallel_chunks
            .min(chunk_count)
            .max(1);
        let per_chunk_cap = (options.max_keyframes / chunk_count.max(1)).max(1);

        info!(
            "Segmented run: {} chunks of {:.0}s, {} in flight",
            chunk_count, self.settings.segmented.chunk_sec, concurrency
        );
        recorder.start(
            "segmented",
            attrs([
                ("chunks", json!(chunk_count)),
                ("concurrency", json!(concurrency)),
            ]),
        );
        let started = Instant::now();

        let session = self.manager.get(session_id).await?;
        let root = self.store.session_root(session_id)?;

        let completed = std::sync::atomic::AtomicUsize::new(0);
        let mut results: Vec<(usize, String)> = Vec::with_capacity(chunk_count);

        let mut in_flight = stream::iter(chunks.into_iter())
            .map(|chunk| {
                let completed = &completed;
                let session = &session;
                let root = &root;
                async move {
                    let result = self
                        .process_chunk(
                            &chunk, source, root, session, transcript, moments, options,
                            per_chunk_cap, cancel,
                        )
                        .await;
                    let done = completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                    (chunk, result, done)
                }
            })
            .buffer_unordered(concurrency);

        while let Some((chunk, result, done)) = in_flight.next().await {
            match result {
                Ok(doc) => {
                    let progress =
                        Stage::RelevanceSelect.progress() + (45 * done / chunk_count) as u8;
                    let label = format!("segment {}/{}", done, chunk_count);
                    let _ = reporter.throttled(&label, progress.min(94)).await;
                    results.push((chunk.index, doc));
                }
                Err(e) => {
                    drop(in_flight);
                    recorder.error("segmented", &e.to_string());
                    return Err(e);
                }
            }
        }

        // Cancellation propagated from any chunk aborts the whole run; a
        // clean drain means every chunk finished.
        results.sort_by_key(|(index, _)| *index);

        let mut doc = format!("# {}\n", session.title);
        for (_, section) in results {
            doc.push('\n');
            doc.push_str(&section);
            doc.push('\n');
        }

        recorder.end(
            "segmented",
            started.elapsed().as_millis() as u64,
            BTreeMap::new(),
        );
        reporter
            .boundary(Stage::Generate.label(), Stage::Generate.progress())
            .await?;

        validate_payload(
            doc.into_bytes(),
            PromptOutputFormat::Markdown,
            self.settings.limits.max_doc_bytes,
        )
    }

    /// Stages 5-6 for one chunk: extract its keyframes, generate its
    /// section, return the section markdown.
    #[allow(clippy::too_many_arguments)]
    async fn process_chunk(
        &self,
        chunk: &Chunk,
        source: &PathBuf,
        root: &PathBuf,
        session: &crate::session::Session,
        transcript: &Transcript,
        moments: &[RelevantMoment],
        options: &RunOptions,
        per_chunk_cap: usize,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(VidereError::Cancelled);
        }

        let heading = format!(
            "## Segment {} ({:.0}s - {:.0}s)",
            chunk.index + 1,
            chunk.start_sec,
            chunk.end_sec
        );

        let chunk_moments = clip_moments(moments, chunk.start_sec, chunk.end_sec);
        if chunk_moments.is_empty() {
            return Ok(format!("{}\n\n*No notable content in this segment.*", heading));
        }

        // Extract this chunk's frames into the shared frames directory;
        // timestamps are disjoint across chunks so filenames cannot
        // collide.
        let timestamps = plan_timestamps(
            &chunk_moments,
            self.settings.keyframes.density,
            per_chunk_cap,
            chunk.end_sec,
        );
        let frames_dir = root.join("frames");

        let extracted = {
            let _permit = self.acquire(&self.gates.transcoder, cancel).await?;
            tokio::time::timeout(
                Duration::from_secs(self.settings.timeouts.extract_sec),
                self.extractor.extract(source, &timestamps, &frames_dir, cancel),
            )
            .await
            .map_err(|_| VidereError::StageTimeout {
                stage: Stage::FrameExtract.label().to_string(),
                budget_sec: self.settings.timeouts.extract_sec,
            })?
        };

        let keyframes = match extracted {
            Ok(frames) => frames,
            Err(VidereError::Cancelled) => return Err(VidereError::Cancelled),
            Err(e) => {
                warn!("Chunk {} frame extraction failed: {}", chunk.index, e);
                Vec::new()
            }
        };

        if keyframes.is_empty() {
            return Ok(format!("{}\n\n*No frames extracted for this segment.*", heading));
        }

        let chunk_transcript = Transcript::new(
            transcript
                .segments
                .iter()
                .filter(|s| s.end_sec > chunk.start_sec && s.start_sec < chunk.end_sec)
                .cloned()
                .collect(),
        );

        let prompt = self.resolve_mode_prompt(session, &chunk_transcript, &chunk_moments, options)?;

        let raw = {
            let _permit = self.acquire(&self.gates.generator, cancel).await?;
            tokio::time::timeout(
                Duration::from_secs(self.settings.timeouts.generate_sec),
                self.generator
                    .generate(&prompt, &keyframes, root, &chunk_transcript, cancel),
            )
            .await
            .map_err(|_| VidereError::StageTimeout {
                stage: Stage::Generate.label().to_string(),
                budget_sec: self.settings.timeouts.generate_sec,
            })?
        };

        let section = match raw {
            Ok(bytes) => String::from_utf8(bytes).map_err(|_| {
                VidereError::OutputFormatInvalid("chunk payload is not UTF-8".into())
            })?,
            Err(VidereError::Cancelled) => return Err(VidereError::Cancelled),
            Err(e) => {
                // A single bad chunk degrades rather than sinking the run.
                warn!("Chunk {} generation failed: {}", chunk.index, e);
                format!("*Segment {} processing failed.*", chunk.index + 1)
            }
        };

        Ok(format!("{}\n\n{}", heading, section.trim()))
    }
}

/// Slice `[0, duration)` into fixed-length chunks.
fn build_chunks(duration_sec: f64, chunk_sec: f64) -> Vec<Chunk> {
    let chunk_sec = if chunk_sec > 0.0 { chunk_sec } else { 30.0 };
    let mut chunks = Vec::new();
    let mut start = 0.0;
    let mut index = 0;

    while start < duration_sec {
        chunks.push(Chunk {
            index,
            start_sec: start,
            end_sec: (start + chunk_sec).min(duration_sec),
        });
        start += chunk_sec;
        index += 1;
    }

    chunks
}

/// Intersect moments with a chunk window.
fn clip_moments(moments: &[RelevantMoment], start: f64, end: f64) -> Vec<RelevantMoment> {
    moments
        .iter()
        .filter_map(|m| {
            let s = m.start_sec.max(start);
            let e = m.end_sec.min(end);
            (e > s).then(|| RelevantMoment {
                start_sec: s,
                end_sec: e,
                reason: m.reason.clone(),
                pinned: m.pinned,
            })
        })
        .collect()
}
