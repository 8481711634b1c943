//! Pipeline orchestrator for Videre.
//!
//! Drives one session through the six stages: probe, proxy, transcribe,
//! select moments, extract keyframes, generate. Owns stage timeouts,
//! cancellation checkpoints, per-adapter admission, progress reporting,
//! and the terminal bookkeeping around the session record.

mod plan;
mod segmented;

pub use plan::plan_timestamps;

use crate::analysis::{fallback_moment, normalize_moments, RelevanceAnalyzer, RelevantMoment};
use crate::config::{Settings, SttPreference};
use crate::error::{Result, VidereError};
use crate::generate::{validate_payload, DocPayload, Generator};
use crate::media::{FrameExtractor, Keyframe, MediaInfo, MediaProbe, Transcoder};
use crate::prompts::{PromptOutputFormat, PromptRegistry, ResolvedPrompt, RELEVANCE_PROMPT_ID};
use crate::session::{Session, SessionManager};
use crate::store::{ArtifactStore, KeyframeEntry};
use crate::trace::{attrs, TraceRecorder};
use crate::transcription::{format_transcript, Transcript, TranscriberSelector, TranscriptFormat};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Proxy,
    Transcribe,
    RelevanceSelect,
    FrameExtract,
    Generate,
    Persist,
}

impl Stage {
    /// The stage label used in events, progress, and logging.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Probe => "probe",
            Stage::Proxy => "proxy",
            Stage::Transcribe => "transcribe",
            Stage::RelevanceSelect => "relevance_select",
            Stage::FrameExtract => "frame_extract",
            Stage::Generate => "generate",
            Stage::Persist => "persist",
        }
    }

    /// Progress value published when this stage completes.
    pub fn progress(self) -> u8 {
        match self {
            Stage::Probe => 5,
            Stage::Proxy => 15,
            Stage::Transcribe => 35,
            Stage::RelevanceSelect => 50,
            Stage::FrameExtract => 70,
            Stage::Generate => 95,
            Stage::Persist => 100,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-run options, resolved from settings plus caller overrides.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: String,
    pub language: Option<String>,
    pub stt_preference: SttPreference,
    pub max_keyframes: usize,
    pub segment_pipeline: bool,
    pub merge_gap_sec: f64,
    pub min_segment_sec: f64,
    pub context_keywords: Vec<String>,
    pub attendees: Vec<String>,
}

impl RunOptions {
    pub fn from_settings(settings: &Settings, mode: &str) -> Self {
        Self {
            mode: mode.to_string(),
            language: None,
            stt_preference: settings.stt.preference_default,
            max_keyframes: settings.keyframes.max_keyframes,
            segment_pipeline: false,
            merge_gap_sec: settings.moments.merge_gap_sec,
            min_segment_sec: settings.moments.min_segment_sec,
            context_keywords: Vec::new(),
            attendees: Vec::new(),
        }
    }
}

/// What a successful run hands back to the caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session: Session,
    pub doc: DocPayload,
    pub manifest: BTreeMap<String, String>,
    pub keyframes: Vec<KeyframeEntry>,
    pub stt_adapter_used: Option<String>,
}

/// Admission gates for the external adapters.
struct AdapterGates {
    transcoder: Semaphore,
    stt: Semaphore,
    relevance: Semaphore,
    generator: Semaphore,
}

impl AdapterGates {
    fn new(settings: &Settings) -> Self {
        Self {
            transcoder: Semaphore::new(settings.concurrency.transcoder.max(1)),
            stt: Semaphore::new(settings.concurrency.stt.max(1)),
            relevance: Semaphore::new(settings.concurrency.relevance.max(1)),
            generator: Semaphore::new(settings.concurrency.generator.max(1)),
        }
    }
}

/// Publishes progress at stage boundaries and throttled within stages.
struct ProgressReporter {
    manager: Arc<SessionManager>,
    session_id: String,
    last_publish: Mutex<Instant>,
}

impl ProgressReporter {
    const MIN_INTERVAL: Duration = Duration::from_millis(500);

    fn new(manager: Arc<SessionManager>, session_id: &str) -> Self {
        Self {
            manager,
            session_id: session_id.to_string(),
            last_publish: Mutex::new(Instant::now() - Self::MIN_INTERVAL),
        }
    }

    /// Publish a stage-boundary value (always goes out).
    async fn boundary(&self, label: &str, progress: u8) -> Result<()> {
        *self.last_publish.lock().await = Instant::now();
        self.manager
            .update_progress(&self.session_id, label, progress)
            .await
    }

    /// Publish an intra-stage value, dropped when the last publish was
    /// less than 500 ms ago.
    async fn throttled(&self, label: &str, progress: u8) -> Result<()> {
        let mut last = self.last_publish.lock().await;
        if last.elapsed() < Self::MIN_INTERVAL {
            return Ok(());
        }
        *last = Instant::now();
        drop(last);
        self.manager
            .update_progress(&self.session_id, label, progress)
            .await
    }
}

/// The main orchestrator. One instance serves many sessions; each
/// `run()` call drives a single session to a terminal state.
pub struct Orchestrator {
    settings: Settings,
    manager: Arc<SessionManager>,
    store: Arc<ArtifactStore>,
    prompts: Arc<PromptRegistry>,
    probe: Arc<dyn MediaProbe>,
    transcoder: Arc<dyn Transcoder>,
    extractor: Arc<dyn FrameExtractor>,
    transcribers: Arc<TranscriberSelector>,
    analyzer: Arc<dyn RelevanceAnalyzer>,
    generator: Arc<dyn Generator>,
    gates: AdapterGates,
    session_gate: Semaphore,
}

impl Orchestrator {
    /// Build the full stack (store, session manager, prompt registry,
    /// bundled adapters) from settings alone.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let store = Arc::new(ArtifactStore::new(settings.sessions_dir())?);
        let manager = Arc::new(
            SessionManager::new(
                store.clone(),
                Duration::from_secs(settings.sessions.stale_session_sec),
                Duration::from_secs(settings.sessions.retention_sec_memory),
            )
            .with_disk_retention(settings.sessions.retention_sec_disk.map(Duration::from_secs))
            .with_grace_window(Duration::from_secs(settings.sessions.grace_window_sec)),
        );
        let prompts = Arc::new(PromptRegistry::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?);
        Ok(Self::new(settings, manager, store, prompts))
    }

    /// Create an orchestrator with the bundled ffmpeg/API adapters.
    pub fn new(
        settings: Settings,
        manager: Arc<SessionManager>,
        store: Arc<ArtifactStore>,
        prompts: Arc<PromptRegistry>,
    ) -> Self {
        use crate::analysis::OpenAiRelevanceAnalyzer;
        use crate::generate::OpenAiGenerator;
        use crate::media::{FfmpegFrameExtractor, FfmpegTranscoder, FfprobeProbe};
        use crate::transcription::{LocalWhisperTranscriber, RemoteWhisperTranscriber};

        let local = Arc::new(LocalWhisperTranscriber::new(
            &settings.stt.local_binary,
            settings.stt.local_model.as_deref(),
        ));
        let remote = Arc::new(RemoteWhisperTranscriber::new(&settings.stt.remote_model));
        let transcribers = Arc::new(TranscriberSelector::new(
            local,
            remote,
            settings.stt.auto_local_max_sec,
        ));

        let analyzer = Arc::new(OpenAiRelevanceAnalyzer::new(&settings.models.fast));
        let generator = Arc::new(OpenAiGenerator::new(
            &settings.models.fast,
            &settings.models.quality,
        ));

        Self::with_adapters(
            settings,
            manager,
            store,
            prompts,
            Arc::new(FfprobeProbe::new()),
            Arc::new(FfmpegTranscoder::new()),
            Arc::new(FfmpegFrameExtractor::new()),
            transcribers,
            analyzer,
            generator,
        )
    }

    /// Create an orchestrator with custom adapters (hosts and tests).
    #[allow(clippy::too_many_arguments)]
    pub fn with_adapters(
        settings: Settings,
        manager: Arc<SessionManager>,
        store: Arc<ArtifactStore>,
        prompts: Arc<PromptRegistry>,
        probe: Arc<dyn MediaProbe>,
        transcoder: Arc<dyn Transcoder>,
        extractor: Arc<dyn FrameExtractor>,
        transcribers: Arc<TranscriberSelector>,
        analyzer: Arc<dyn RelevanceAnalyzer>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let gates = AdapterGates::new(&settings);
        let session_gate = Semaphore::new(settings.max_sessions());
        Self {
            settings,
            manager,
            store,
            prompts,
            probe,
            transcoder,
            extractor,
            transcribers,
            analyzer,
            generator,
            gates,
            session_gate,
        }
    }

    pub fn manager(&self) -> Arc<SessionManager> {
        self.manager.clone()
    }

    pub fn store(&self) -> Arc<ArtifactStore> {
        self.store.clone()
    }

    /// Run the pipeline for one prepared session.
    #[instrument(skip(self, options), fields(session_id = %session_id, mode = %options.mode))]
    pub async fn run(&self, session_id: &str, options: RunOptions) -> Result<RunOutcome> {
        let _admission = self
            .session_gate
            .acquire()
            .await
            .map_err(|_| VidereError::Internal("session gate closed".into()))?;

        let cancel = self.manager.cancel_token(session_id).await?;
        let trace_path = self.store.artifact_path(session_id, "trace.jsonl")?;
        let recorder = TraceRecorder::new(session_id, trace_path);

        let started = Instant::now();
        let result = self.run_inner(session_id, &options, &cancel, &recorder).await;

        match &result {
            Ok(_) => {
                recorder.end("pipeline", started.elapsed().as_millis() as u64, BTreeMap::new());
            }
            Err(VidereError::Cancelled) => {
                let _ = self.manager.mark_cancelled(session_id).await;
                recorder.end(
                    "pipeline",
                    started.elapsed().as_millis() as u64,
                    attrs([("cancelled", json!(true))]),
                );
            }
            Err(e) => {
                let stage = self
                    .manager
                    .get(session_id)
                    .await
                    .map(|s| s.stage_label)
                    .unwrap_or_else(|_| "unknown".to_string());
                // The failing stage already traced its own error; this
                // closes the run-level span.
                recorder.error("pipeline", &e.to_string());
                let _ = self
                    .manager
                    .fail(session_id, e.kind(), &e.to_string(), &stage)
                    .await;
            }
        }

        recorder.close();
        result
    }

    async fn run_inner(
        &self,
        session_id: &str,
        options: &RunOptions,
        cancel: &CancellationToken,
        recorder: &TraceRecorder,
    ) -> Result<RunOutcome> {
        // Claim
        let session = self.manager.claim(session_id).await?;
        recorder.start(
            "pipeline",
            attrs([
                ("mode", json!(options.mode)),
                ("title", json!(session.title)),
            ]),
        );

        let root = self.store.session_root(session_id)?;
        let reporter = ProgressReporter::new(self.manager.clone(), session_id);

        // The caller materializes remote sources before submission.
        let source = session.source.local_path().cloned().ok_or_else(|| {
            VidereError::InputInvalid("remote source was not materialized to a local path".into())
        })?;

        // Stage 1: validate & probe
        let media = self
            .stage(recorder, Stage::Probe, self.settings.timeouts.probe_sec, cancel, {
                let source = source.clone();
                async move { self.probe_stage(session_id, &source).await }
            })
            .await?;
        reporter.boundary(Stage::Probe.label(), Stage::Probe.progress()).await?;

        // Stage 2: proxy + audio
        let (proxy_path, audio_path) = self
            .stage(recorder, Stage::Proxy, self.settings.timeouts.proxy_sec, cancel, {
                let source = source.clone();
                let root = root.clone();
                let audio_present = media.audio_present;
                async move {
                    self.proxy_stage(&source, &root, audio_present, recorder, cancel)
                        .await
                }
            })
            .await?;
        reporter.boundary(Stage::Proxy.label(), Stage::Proxy.progress()).await?;

        // Stage 3: transcribe
        let audio_path: Option<PathBuf> = audio_path.map(PathBuf::from);
        let (transcript, stt_adapter_used) = self
            .stage(
                recorder,
                Stage::Transcribe,
                self.settings.timeouts.transcribe_sec,
                cancel,
                async {
                    self.transcribe_stage(
                        session_id,
                        audio_path.as_deref(),
                        media.duration_sec,
                        options,
                        recorder,
                        cancel,
                    )
                    .await
                },
            )
            .await?;
        reporter
            .boundary(Stage::Transcribe.label(), Stage::Transcribe.progress())
            .await?;

        // Stage 4: select moments
        let moments = self
            .stage(
                recorder,
                Stage::RelevanceSelect,
                self.settings.timeouts.relevance_sec,
                cancel,
                async {
                    self.relevance_stage(
                        session_id,
                        &proxy_path,
                        &transcript,
                        media.duration_sec,
                        options,
                        recorder,
                        cancel,
                    )
                    .await
                },
            )
            .await?;
        reporter
            .boundary(Stage::RelevanceSelect.label(), Stage::RelevanceSelect.progress())
            .await?;

        let doc = if options.segment_pipeline {
            self.run_segmented(
                session_id,
                &source,
                &media,
                &transcript,
                &moments,
                options,
                &reporter,
                recorder,
                cancel,
            )
            .await?
        } else {
            // Stage 5: extract keyframes
            let keyframes = self
                .stage(
                    recorder,
                    Stage::FrameExtract,
                    self.settings.timeouts.extract_sec,
                    cancel,
                    async {
                        self.extract_stage(&source, &root, &moments, &media, options, cancel)
                            .await
                    },
                )
                .await?;
            reporter
                .boundary(Stage::FrameExtract.label(), Stage::FrameExtract.progress())
                .await?;

            // Stage 6: generate
            let doc = self
                .stage(
                    recorder,
                    Stage::Generate,
                    self.settings.timeouts.generate_sec,
                    cancel,
                    async {
                        self.generate_stage(
                            &session, &source, &root, &keyframes, &transcript, &moments,
                            options, recorder, cancel,
                        )
                        .await
                    },
                )
                .await?;
            reporter
                .boundary(Stage::Generate.label(), Stage::Generate.progress())
                .await?;
            doc
        };

        // Stage 7: persist & complete
        self.checkpoint(cancel)?;
        self.store
            .put_bytes(session_id, doc.artifact_name(), doc.content.as_bytes())?;

        let manifest = self.store.manifest(session_id)?;
        let keyframe_manifest = self.store.keyframe_manifest(session_id)?;

        let session = self
            .manager
            .complete(
                session_id,
                doc.clone(),
                manifest.clone(),
                transcript.segments.clone(),
                keyframe_manifest.clone(),
                stt_adapter_used.clone(),
            )
            .await?;

        info!("Session {} completed", session_id);

        Ok(RunOutcome {
            session,
            doc,
            manifest,
            keyframes: keyframe_manifest,
            stt_adapter_used,
        })
    }

    // ------------------------------------------------------------------
    // Stage bodies
    // ------------------------------------------------------------------

    async fn probe_stage(&self, session_id: &str, source: &PathBuf) -> Result<MediaInfo> {
        // Adapter-native errors are reclassified at the pipeline boundary:
        // a host without a prober cannot validate input at all.
        let media = self.probe.probe(source).await.map_err(|e| match e {
            VidereError::ToolNotFound(msg) => {
                VidereError::InputInvalid(format!("cannot probe input, {} unavailable", msg))
            }
            other => other,
        })?;

        if media.duration_sec > self.settings.limits.max_duration_sec {
            return Err(VidereError::InputTooLarge(format!(
                "duration {:.1}s exceeds maximum {:.0}s",
                media.duration_sec, self.settings.limits.max_duration_sec
            )));
        }
        if media.duration_sec < self.settings.limits.min_duration_sec {
            return Err(VidereError::InputInvalid(format!(
                "duration {:.2}s is below the {:.0}s minimum",
                media.duration_sec, self.settings.limits.min_duration_sec
            )));
        }

        // Keep a copy of the input with the artifacts so the session is
        // self-contained.
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        self.store
            .put_file(session_id, &format!("source.{}", ext), source)?;

        Ok(media)
    }

    async fn proxy_stage(
        &self,
        source: &PathBuf,
        root: &PathBuf,
        audio_present: bool,
        recorder: &TraceRecorder,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, Option<String>)> {
        let _permit = self.acquire(&self.gates.transcoder, cancel).await?;

        // Any proxy failure is preprocessing failure, whether the encoder
        // is missing or the run itself broke.
        let proxy_path = self
            .transcoder
            .make_proxy(
                source,
                root,
                self.settings.proxy.fps,
                self.settings.proxy.long_edge_px,
                cancel,
            )
            .await
            .map_err(|e| match e {
                VidereError::ToolNotFound(msg) => {
                    VidereError::PreprocessingFailed(format!("{} unavailable", msg))
                }
                VidereError::ToolFailed(msg) => VidereError::PreprocessingFailed(msg),
                other => other,
            })?;

        self.checkpoint(cancel)?;

        if !audio_present {
            recorder.note(
                Stage::Proxy.label(),
                attrs([("audio_unavailable", json!("no audio stream"))]),
            );
            return Ok((proxy_path, None));
        }

        // Missing audio degrades to an empty transcript downstream.
        let audio_path = match self.transcoder.extract_audio(source, root, cancel).await {
            Ok(path) => Some(path.to_string_lossy().to_string()),
            Err(VidereError::Cancelled) => return Err(VidereError::Cancelled),
            Err(e) => {
                warn!("Audio extraction failed, continuing without audio: {}", e);
                recorder.note(
                    Stage::Proxy.label(),
                    attrs([("audio_unavailable", json!(e.to_string()))]),
                );
                None
            }
        };

        Ok((proxy_path, audio_path))
    }

    async fn transcribe_stage(
        &self,
        session_id: &str,
        audio_path: Option<&std::path::Path>,
        duration_sec: f64,
        options: &RunOptions,
        recorder: &TraceRecorder,
        cancel: &CancellationToken,
    ) -> Result<(Transcript, Option<String>)> {
        let outcome = match audio_path {
            Some(audio) => {
                let _permit = self.acquire(&self.gates.stt, cancel).await?;
                self.transcribers
                    .transcribe(
                        audio,
                        duration_sec,
                        options.language.as_deref(),
                        options.stt_preference,
                        cancel,
                    )
                    .await?
            }
            None => Default::default(),
        };

        if let Some(fallback) = &outcome.fell_back_to {
            recorder.note(
                Stage::Transcribe.label(),
                attrs([("fallback", json!(fallback))]),
            );
        }

        if outcome.transcript.is_empty() {
            if options.mode == "subtitle_extractor" {
                return Err(VidereError::TranscriptionRequired(
                    "subtitle extraction needs a transcript".into(),
                ));
            }
            recorder.note(
                Stage::Transcribe.label(),
                attrs([("transcription_unavailable", json!(true))]),
            );
        }

        self.store
            .put_json(session_id, "transcript.json", &outcome.transcript)?;

        Ok((outcome.transcript, outcome.adapter_used))
    }

    async fn relevance_stage(
        &self,
        session_id: &str,
        proxy_path: &PathBuf,
        transcript: &Transcript,
        duration_sec: f64,
        options: &RunOptions,
        recorder: &TraceRecorder,
        cancel: &CancellationToken,
    ) -> Result<Vec<RelevantMoment>> {
        let record = self.prompts.get(RELEVANCE_PROMPT_ID)?;
        let mut vars = HashMap::new();
        vars.insert("keywords".to_string(), options.context_keywords.join(", "));
        vars.insert("duration".to_string(), format!("{:.0}", duration_sec));
        let prompt = self.prompts.resolve(record, &vars);

        let raw = {
            let _permit = self.acquire(&self.gates.relevance, cancel).await?;
            match self
                .analyzer
                .analyze(
                    proxy_path,
                    transcript,
                    &options.context_keywords,
                    &prompt,
                    duration_sec,
                    cancel,
                )
                .await
            {
                Ok(moments) => moments,
                Err(VidereError::Cancelled) => return Err(VidereError::Cancelled),
                Err(e) => {
                    warn!("Relevance analysis degraded to whole-video moment: {}", e);
                    recorder.note(
                        Stage::RelevanceSelect.label(),
                        attrs([("relevance_unavailable", json!(e.to_string()))]),
                    );
                    vec![fallback_moment(duration_sec)]
                }
            }
        };

        let mut moments = normalize_moments(
            raw,
            duration_sec,
            options.merge_gap_sec,
            options.min_segment_sec,
        );
        if moments.is_empty() {
            moments.push(fallback_moment(duration_sec));
        }

        self.store.put_json(session_id, "moments.json", &moments)?;
        Ok(moments)
    }

    async fn extract_stage(
        &self,
        source: &PathBuf,
        root: &PathBuf,
        moments: &[RelevantMoment],
        media: &MediaInfo,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Keyframe>> {
        let frames_dir = root.join("frames");
        let density = self.settings.keyframes.density;

        let _permit = self.acquire(&self.gates.transcoder, cancel).await?;

        let timestamps = plan_timestamps(moments, density, options.max_keyframes, media.duration_sec);
        match self
            .extractor
            .extract(source, &timestamps, &frames_dir, cancel)
            .await
        {
            Ok(frames) => Ok(frames),
            Err(VidereError::Cancelled) => Err(VidereError::Cancelled),
            Err(first_err) => {
                // One retry at halved density.
                warn!("Frame extraction failed, retrying at halved density: {}", first_err);
                self.checkpoint(cancel)?;
                let timestamps =
                    plan_timestamps(moments, density / 2.0, options.max_keyframes / 2, media.duration_sec);
                self.extractor
                    .extract(source, &timestamps, &frames_dir, cancel)
                    .await
                    .map_err(|e| match e {
                        VidereError::Cancelled => VidereError::Cancelled,
                        other => VidereError::FrameExtractionFailed(other.to_string()),
                    })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_stage(
        &self,
        session: &Session,
        source: &PathBuf,
        root: &PathBuf,
        keyframes: &[Keyframe],
        transcript: &Transcript,
        moments: &[RelevantMoment],
        options: &RunOptions,
        recorder: &TraceRecorder,
        cancel: &CancellationToken,
    ) -> Result<DocPayload> {
        // Subtitle extraction is rendered straight from the transcript;
        // no second LLM pass involved.
        if options.mode == "subtitle_extractor" {
            let srt = format_transcript(transcript, TranscriptFormat::Srt);
            return validate_payload(
                srt.into_bytes(),
                PromptOutputFormat::Markdown,
                self.settings.limits.max_doc_bytes,
            );
        }

        let prompt = self.resolve_mode_prompt(session, transcript, moments, options)?;
        let output_format = prompt.record.output_format;

        let raw = {
            let _permit = self.acquire(&self.gates.generator, cancel).await?;
            self.generator
                .generate(&prompt, keyframes, root, transcript, cancel)
                .await?
        };

        let payload = validate_payload(raw, output_format, self.settings.limits.max_doc_bytes)?;

        if options.mode == "clip_generator" {
            self.cut_clips(source, root, &payload, recorder, cancel).await;
        }

        Ok(payload)
    }

    /// Resolve the mode's prompt record with the standard variable set.
    fn resolve_mode_prompt(
        &self,
        session: &Session,
        transcript: &Transcript,
        moments: &[RelevantMoment],
        options: &RunOptions,
    ) -> Result<ResolvedPrompt> {
        let record = self.prompts.get(&options.mode)?;

        let mut vars = HashMap::new();
        vars.insert("title".to_string(), session.title.clone());
        vars.insert(
            "language".to_string(),
            options.language.clone().unwrap_or_else(|| "en".to_string()),
        );
        vars.insert("attendees".to_string(), options.attendees.join(", "));
        vars.insert("keywords".to_string(), options.context_keywords.join(", "));
        vars.insert(
            "duration".to_string(),
            format!("{:.0}", transcript.duration_sec.max(
                moments.last().map(|m| m.end_sec).unwrap_or(0.0)
            )),
        );
        vars.insert(
            "segment_count".to_string(),
            transcript.segments.len().to_string(),
        );
        vars.insert("moment_count".to_string(), moments.len().to_string());

        Ok(self.prompts.resolve(record, &vars))
    }

    /// Best-effort clip cutting for the clip-generator mode. Individual
    /// clip failures degrade to trace notes.
    async fn cut_clips(
        &self,
        source: &PathBuf,
        root: &PathBuf,
        payload: &DocPayload,
        recorder: &TraceRecorder,
        cancel: &CancellationToken,
    ) {
        use crate::media::{ClipCutter, ClipFormat};

        #[derive(serde::Deserialize)]
        struct ClipSpec {
            start_sec: f64,
            end_sec: f64,
        }

        let specs: Vec<ClipSpec> = match serde_json::from_str(&payload.content) {
            Ok(specs) => specs,
            Err(e) => {
                warn!("Clip payload did not parse as clip list: {}", e);
                return;
            }
        };

        let cutter = ClipCutter::new();
        let clips_dir = root.join("clips");
        let mut produced = 0usize;

        for (i, spec) in specs.iter().enumerate() {
            if cancel.is_cancelled() {
                return;
            }
            match cutter
                .cut(
                    source,
                    spec.start_sec,
                    spec.end_sec,
                    ClipFormat::Vertical,
                    &clips_dir,
                    i,
                    cancel,
                )
                .await
            {
                Ok(_) => produced += 1,
                Err(e) => {
                    warn!("Clip {} failed: {}", i, e);
                    recorder.note(
                        Stage::Generate.label(),
                        attrs([("clip_failed", json!(i)), ("error", json!(e.to_string()))]),
                    );
                }
            }
        }

        recorder.note(
            Stage::Generate.label(),
            attrs([("clips_produced", json!(produced))]),
        );
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    /// Run one stage body under its timeout with trace start/end events.
    async fn stage<T, F>(
        &self,
        recorder: &TraceRecorder,
        stage: Stage,
        budget_sec: u64,
        cancel: &CancellationToken,
        body: F,
    ) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        self.checkpoint(cancel)?;

        recorder.start(stage.label(), BTreeMap::new());
        let started = Instant::now();

        let result = match tokio::time::timeout(Duration::from_secs(budget_sec), body).await {
            Ok(result) => result,
            Err(_) => Err(VidereError::StageTimeout {
                stage: stage.label().to_string(),
                budget_sec,
            }),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => recorder.end(stage.label(), elapsed_ms, BTreeMap::new()),
            Err(VidereError::Cancelled) => recorder.end(
                stage.label(),
                elapsed_ms,
                attrs([("cancelled", json!(true))]),
            ),
            Err(e) => recorder.error(stage.label(), &e.to_string()),
        }

        result
    }

    fn checkpoint(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(VidereError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Acquire an adapter permit, aborting on cancellation.
    async fn acquire<'a>(
        &self,
        gate: &'a Semaphore,
        cancel: &CancellationToken,
    ) -> Result<tokio::sync::SemaphorePermit<'a>> {
        tokio::select! {
            permit = gate.acquire() => {
                permit.map_err(|_| VidereError::Internal("adapter gate closed".into()))
            }
            _ = cancel.cancelled() => Err(VidereError::Cancelled),
        }
    }
}
