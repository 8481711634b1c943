//! End-to-end pipeline tests with in-process mock adapters.
//!
//! No external tools or APIs are involved: every capability is stubbed so
//! the orchestrator's sequencing, degradation, and cancellation behavior
//! can be exercised deterministically.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use videre::analysis::{RelevanceAnalyzer, RelevantMoment};
use videre::config::{Settings, SttPreference};
use videre::error::{ErrorKind, Result, VidereError};
use videre::generate::Generator;
use videre::media::{keyframe_filename, FrameExtractor, Keyframe, MediaInfo, MediaProbe, Transcoder};
use videre::pipeline::{Orchestrator, RunOptions};
use videre::prompts::{PromptRegistry, ResolvedPrompt};
use videre::session::{SessionManager, SessionMetadata, SessionSource, SessionStatus};
use videre::store::ArtifactStore;
use videre::trace::{read_events, TraceKind};
use videre::transcription::{Transcriber, TranscriberSelector, Transcript, TranscriptSegment};

// ---------------------------------------------------------------------------
// Mock adapters
// ---------------------------------------------------------------------------

struct MockProbe {
    duration_sec: f64,
    audio_present: bool,
    tool_missing: bool,
}

#[async_trait]
impl MediaProbe for MockProbe {
    async fn probe(&self, _source: &Path) -> Result<MediaInfo> {
        if self.tool_missing {
            return Err(VidereError::ToolNotFound("ffprobe".into()));
        }
        Ok(MediaInfo {
            duration_sec: self.duration_sec,
            width: 1920,
            height: 1080,
            audio_present: self.audio_present,
            container: "mov,mp4".to_string(),
        })
    }
}

#[derive(Default)]
struct MockTranscoder {
    fail_proxy: bool,
    fail_audio: bool,
    tool_missing: bool,
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn make_proxy(
        &self,
        _source: &Path,
        out_dir: &Path,
        _fps: u32,
        _long_edge_px: u32,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if self.tool_missing {
            return Err(VidereError::ToolNotFound("ffmpeg".into()));
        }
        if self.fail_proxy {
            return Err(VidereError::PreprocessingFailed("mock proxy failure".into()));
        }
        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join("proxy.mp4");
        std::fs::write(&path, b"proxy")?;
        Ok(path)
    }

    async fn extract_audio(
        &self,
        _source: &Path,
        out_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if self.fail_audio {
            return Err(VidereError::PreprocessingFailed("mock audio failure".into()));
        }
        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join("audio.wav");
        std::fs::write(&path, b"audio")?;
        Ok(path)
    }
}

#[derive(Default)]
struct MockExtractor {
    fail_first: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl FrameExtractor for MockExtractor {
    async fn extract(
        &self,
        _source: &Path,
        timestamps: &[f64],
        out_dir: &Path,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Keyframe>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && call == 0 {
            return Err(VidereError::ToolFailed("mock extraction failure".into()));
        }

        std::fs::create_dir_all(out_dir)?;
        let mut sorted: Vec<f64> = timestamps.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut frames = Vec::new();
        for (index, &t) in sorted.iter().enumerate() {
            let name = keyframe_filename(index, t);
            std::fs::write(out_dir.join(&name), b"jpeg")?;
            frames.push(Keyframe {
                index,
                timestamp_sec: t,
                path: PathBuf::from("frames").join(name),
                label: None,
            });
        }
        Ok(frames)
    }
}

struct MockTranscriber {
    name: &'static str,
    available: bool,
    fail: bool,
    segments: Vec<TranscriptSegment>,
}

impl MockTranscriber {
    fn healthy(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            available: true,
            fail: false,
            segments: vec![
                TranscriptSegment::new(0.0, 5.0, "Welcome to the demo."),
                TranscriptSegment::new(5.0, 12.0, "Here is the new login flow."),
            ],
        })
    }

    fn unavailable(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            available: false,
            fail: false,
            segments: vec![],
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            available: true,
            fail: true,
            segments: vec![],
        })
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    fn name(&self) -> &str {
        self.name
    }

    async fn available(&self) -> bool {
        self.available
    }

    async fn transcribe(
        &self,
        _audio_path: &Path,
        _language: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptSegment>> {
        if self.fail {
            return Err(VidereError::TranscriptionUnavailable("mock failure".into()));
        }
        Ok(self.segments.clone())
    }
}

struct MockAnalyzer {
    moments: Vec<RelevantMoment>,
    fail: bool,
}

impl MockAnalyzer {
    fn with_moments(moments: Vec<RelevantMoment>) -> Arc<Self> {
        Arc::new(Self {
            moments,
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            moments: vec![],
            fail: true,
        })
    }
}

#[async_trait]
impl RelevanceAnalyzer for MockAnalyzer {
    async fn analyze(
        &self,
        _proxy_path: &Path,
        _transcript: &Transcript,
        _keywords: &[String],
        _prompt: &ResolvedPrompt,
        _duration_sec: f64,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RelevantMoment>> {
        if self.fail {
            return Err(VidereError::RelevanceUnavailable(
                "invalid JSON after retry".into(),
            ));
        }
        Ok(self.moments.clone())
    }
}

struct MockGenerator {
    output: Vec<u8>,
    delay: Duration,
    requests: Mutex<Vec<usize>>,
}

impl MockGenerator {
    fn markdown(doc: &str) -> Arc<Self> {
        Arc::new(Self {
            output: doc.as_bytes().to_vec(),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn slow(doc: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            output: doc.as_bytes().to_vec(),
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(
        &self,
        _prompt: &ResolvedPrompt,
        keyframes: &[Keyframe],
        _artifact_root: &Path,
        _transcript: &Transcript,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(keyframes.len());
        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => return Err(VidereError::Cancelled),
            }
        }
        Ok(self.output.clone())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    _dir: tempfile::TempDir,
    orchestrator: Arc<Orchestrator>,
    manager: Arc<SessionManager>,
    store: Arc<ArtifactStore>,
    settings: Settings,
    source: PathBuf,
}

struct HarnessBuilder {
    duration_sec: f64,
    audio_present: bool,
    probe_tool_missing: bool,
    transcoder: MockTranscoder,
    extractor: MockExtractor,
    local: Arc<MockTranscriber>,
    remote: Arc<MockTranscriber>,
    analyzer: Arc<MockAnalyzer>,
    generator: Arc<MockGenerator>,
    tweak: Option<Box<dyn FnOnce(&mut Settings)>>,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            duration_sec: 30.0,
            audio_present: true,
            probe_tool_missing: false,
            transcoder: MockTranscoder::default(),
            extractor: MockExtractor::default(),
            local: MockTranscriber::healthy("local"),
            remote: MockTranscriber::healthy("remote"),
            analyzer: MockAnalyzer::with_moments(vec![
                RelevantMoment {
                    start_sec: 2.0,
                    end_sec: 12.0,
                    reason: "login flow shown".to_string(),
                    pinned: false,
                },
                RelevantMoment {
                    start_sec: 18.0,
                    end_sec: 28.0,
                    reason: "settings page".to_string(),
                    pinned: false,
                },
            ]),
            generator: MockGenerator::markdown("# Demo Documentation\n\nSteps follow."),
            tweak: None,
        }
    }

    fn duration(mut self, secs: f64) -> Self {
        self.duration_sec = secs;
        self
    }

    fn no_audio(mut self) -> Self {
        self.audio_present = false;
        self.transcoder.fail_audio = true;
        self
    }

    fn probe_tool_missing(mut self) -> Self {
        self.probe_tool_missing = true;
        self
    }

    fn proxy_tool_missing(mut self) -> Self {
        self.transcoder.tool_missing = true;
        self
    }

    fn local_stt(mut self, local: Arc<MockTranscriber>) -> Self {
        self.local = local;
        self
    }

    fn remote_stt(mut self, remote: Arc<MockTranscriber>) -> Self {
        self.remote = remote;
        self
    }

    fn analyzer(mut self, analyzer: Arc<MockAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    fn generator(mut self, generator: Arc<MockGenerator>) -> Self {
        self.generator = generator;
        self
    }

    fn extractor(mut self, extractor: MockExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    fn settings(mut self, tweak: impl FnOnce(&mut Settings) + 'static) -> Self {
        self.tweak = Some(Box::new(tweak));
        self
    }

    fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();

        let mut settings = Settings::default();
        settings.general.data_dir = dir.path().join("data").display().to_string();
        settings.general.temp_dir = dir.path().join("tmp").display().to_string();
        if let Some(tweak) = self.tweak {
            tweak(&mut settings);
        }

        let source = dir.path().join("input.mp4");
        std::fs::write(&source, b"not a real video").unwrap();

        let store = Arc::new(ArtifactStore::new(settings.sessions_dir()).unwrap());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            Duration::from_secs(settings.sessions.stale_session_sec),
            Duration::from_secs(settings.sessions.retention_sec_memory),
        ));
        let prompts = Arc::new(PromptRegistry::load(None, None).unwrap());

        let transcribers = Arc::new(TranscriberSelector::new(
            self.local,
            self.remote,
            settings.stt.auto_local_max_sec,
        ));

        let orchestrator = Arc::new(Orchestrator::with_adapters(
            settings.clone(),
            manager.clone(),
            store.clone(),
            prompts,
            Arc::new(MockProbe {
                duration_sec: self.duration_sec,
                audio_present: self.audio_present,
                tool_missing: self.probe_tool_missing,
            }),
            Arc::new(self.transcoder),
            Arc::new(self.extractor),
            transcribers,
            self.analyzer,
            self.generator,
        ));

        Harness {
            _dir: dir,
            orchestrator,
            manager,
            store,
            settings,
            source,
        }
    }
}

impl Harness {
    async fn submit(&self, mode: &str) -> String {
        let session = self
            .manager
            .create(
                None,
                SessionMetadata {
                    mode: mode.to_string(),
                    title: "Sprint Demo".to_string(),
                    language: Some("en".to_string()),
                    stt_preference: SttPreference::Fast,
                    source: SessionSource::Local {
                        path: self.source.clone(),
                    },
                },
            )
            .await
            .unwrap();
        self.manager.enqueue(&session.id).await.unwrap();
        session.id
    }

    fn options(&self, mode: &str) -> RunOptions {
        let mut options = RunOptions::from_settings(&self.settings, mode);
        options.language = Some("en".to_string());
        options.stt_preference = SttPreference::Fast;
        options.context_keywords = vec!["login".to_string()];
        options
    }

    fn trace_path(&self, id: &str) -> PathBuf {
        self.store.artifact_path(id, "trace.jsonl").unwrap()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_completes_with_artifacts() {
    let h = HarnessBuilder::new().build();
    let id = h.submit("general_doc").await;

    let outcome = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Completed);
    assert_eq!(outcome.session.progress, 100);
    assert!(outcome.doc.content.starts_with('#'));
    assert!(!outcome.session.transcript_segments.is_empty());
    assert!(!outcome.keyframes.is_empty());
    assert!(outcome.keyframes.len() <= 25);
    assert_eq!(outcome.stt_adapter_used.as_deref(), Some("local"));

    // Keyframes are ordered and timestamps round-trip through filenames.
    assert!(outcome
        .keyframes
        .windows(2)
        .all(|w| w[0].timestamp_sec <= w[1].timestamp_sec));

    for name in ["source", "proxy", "audio", "transcript", "moments", "doc", "session", "trace"] {
        assert!(outcome.manifest.contains_key(name), "missing {}", name);
    }

    // The persisted record matches the outcome.
    let persisted: videre::session::Session = h.store.get_json(&id, "session.json").unwrap();
    assert_eq!(persisted.status, SessionStatus::Completed);
    assert_eq!(persisted.progress, 100);
}

#[tokio::test]
async fn trace_events_are_ordered_and_paired() {
    let h = HarnessBuilder::new().build();
    let id = h.submit("general_doc").await;
    h.orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();

    let events = read_events(&h.trace_path(&id)).unwrap();
    assert!(!events.is_empty());
    assert!(events.windows(2).all(|w| w[0].ts <= w[1].ts));

    // Every start has a matching end or error.
    let mut open: BTreeMap<String, usize> = BTreeMap::new();
    for event in &events {
        match event.kind {
            TraceKind::Start => *open.entry(event.stage.clone()).or_default() += 1,
            TraceKind::End | TraceKind::Error => {
                let count = open.entry(event.stage.clone()).or_default();
                assert!(*count > 0, "unmatched close for {}", event.stage);
                *count -= 1;
            }
            TraceKind::Note => {}
        }
    }
    assert!(open.values().all(|&v| v == 0), "unclosed stages: {:?}", open);
}

#[tokio::test]
async fn oversize_input_is_rejected() {
    let h = HarnessBuilder::new().duration(1200.0).build();
    let id = h.submit("general_doc").await;

    let err = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputTooLarge);

    let session = h.manager.get(&id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.error.as_ref().unwrap().kind, ErrorKind::InputTooLarge);

    // Nothing beyond the session record and trace was produced.
    let manifest = h.store.manifest(&id).unwrap();
    let keys: Vec<&str> = manifest.keys().map(|k| k.as_str()).collect();
    for key in keys {
        assert!(matches!(key, "session" | "trace"), "unexpected artifact {}", key);
    }
}

#[tokio::test]
async fn missing_probe_tool_classifies_as_input_invalid() {
    let h = HarnessBuilder::new().probe_tool_missing().build();
    let id = h.submit("general_doc").await;

    let err = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputInvalid);
    assert_eq!(err.exit_code(), 2);

    let session = h.manager.get(&id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.error.as_ref().unwrap().kind, ErrorKind::InputInvalid);
}

#[tokio::test]
async fn missing_transcoder_tool_classifies_as_preprocessing_failed() {
    let h = HarnessBuilder::new().proxy_tool_missing().build();
    let id = h.submit("general_doc").await;

    let err = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreprocessingFailed);

    let session = h.manager.get(&id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(
        session.error.as_ref().unwrap().kind,
        ErrorKind::PreprocessingFailed
    );
}

#[tokio::test]
async fn boundary_duration_is_accepted() {
    let h = HarnessBuilder::new().duration(900.0).build();
    let id = h.submit("general_doc").await;
    let outcome = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();
    assert_eq!(outcome.session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn stt_falls_back_to_remote() {
    let h = HarnessBuilder::new()
        .local_stt(MockTranscriber::unavailable("local"))
        .build();
    let id = h.submit("general_doc").await;

    let outcome = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Completed);
    assert_eq!(outcome.stt_adapter_used.as_deref(), Some("remote"));

    let events = read_events(&h.trace_path(&id)).unwrap();
    let fallback_note = events.iter().find(|e| {
        e.kind == TraceKind::Note && e.attrs.get("fallback") == Some(&serde_json::json!("remote"))
    });
    assert!(fallback_note.is_some(), "expected a fallback trace note");
}

#[tokio::test]
async fn missing_audio_yields_empty_transcript_but_succeeds() {
    let h = HarnessBuilder::new().no_audio().build();
    let id = h.submit("general_doc").await;

    let outcome = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Completed);
    assert!(outcome.session.transcript_segments.is_empty());
    assert!(outcome.stt_adapter_used.is_none());
}

#[tokio::test]
async fn subtitle_mode_requires_transcript() {
    let h = HarnessBuilder::new()
        .local_stt(MockTranscriber::failing("local"))
        .remote_stt(MockTranscriber::failing("remote"))
        .build();
    let id = h.submit("subtitle_extractor").await;

    let err = h
        .orchestrator
        .run(&id, h.options("subtitle_extractor"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TranscriptionRequired);

    let session = h.manager.get(&id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
}

#[tokio::test]
async fn subtitle_mode_renders_srt() {
    let h = HarnessBuilder::new().build();
    let id = h.submit("subtitle_extractor").await;

    let outcome = h
        .orchestrator
        .run(&id, h.options("subtitle_extractor"))
        .await
        .unwrap();

    assert!(outcome.doc.content.starts_with("1\n00:00:00,000 --> 00:00:05,000"));
    assert!(outcome.doc.content.contains("Welcome to the demo."));
}

#[tokio::test]
async fn degenerate_relevance_falls_back_to_whole_video() {
    let h = HarnessBuilder::new().analyzer(MockAnalyzer::failing()).build();
    let id = h.submit("general_doc").await;

    let outcome = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();
    assert_eq!(outcome.session.status, SessionStatus::Completed);

    let moments: Vec<RelevantMoment> = h.store.get_json(&id, "moments.json").unwrap();
    assert_eq!(moments.len(), 1);
    assert_eq!(moments[0].start_sec, 0.0);
    assert_eq!(moments[0].end_sec, 30.0);
    assert_eq!(moments[0].reason, "fallback");

    let events = read_events(&h.trace_path(&id)).unwrap();
    assert!(events
        .iter()
        .any(|e| e.kind == TraceKind::Note && e.attrs.contains_key("relevance_unavailable")));
}

#[tokio::test]
async fn empty_relevance_collapses_to_full_video() {
    let h = HarnessBuilder::new()
        .analyzer(MockAnalyzer::with_moments(vec![]))
        .build();
    let id = h.submit("general_doc").await;

    h.orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();

    let moments: Vec<RelevantMoment> = h.store.get_json(&id, "moments.json").unwrap();
    assert_eq!(moments.len(), 1);
    assert_eq!((moments[0].start_sec, moments[0].end_sec), (0.0, 30.0));
}

#[tokio::test]
async fn frame_extraction_retries_once_then_succeeds() {
    let h = HarnessBuilder::new()
        .extractor(MockExtractor {
            fail_first: true,
            calls: AtomicUsize::new(0),
        })
        .build();
    let id = h.submit("general_doc").await;

    let outcome = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();
    assert_eq!(outcome.session.status, SessionStatus::Completed);
    assert!(!outcome.keyframes.is_empty());
}

#[tokio::test]
async fn cancellation_mid_generate_marks_cancelled() {
    let h = HarnessBuilder::new()
        .generator(MockGenerator::slow("# Never", Duration::from_secs(30)))
        .build();
    let id = h.submit("general_doc").await;

    let run = {
        let orchestrator = h.orchestrator.clone();
        let id = id.clone();
        let options = h.options("general_doc");
        tokio::spawn(async move { orchestrator.run(&id, options).await })
    };

    // Wait until the slow generate stage is underway, then cancel.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.manager.cancel(&id).await.unwrap());

    let result = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("cancellation must settle quickly")
        .unwrap();
    assert!(matches!(result, Err(VidereError::Cancelled)));

    let session = h.manager.get(&id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);

    // No document artifact was produced.
    assert!(!h.store.manifest(&id).unwrap().contains_key("doc"));

    // The trace closes with an end event for the cancelled stage.
    let events = read_events(&h.trace_path(&id)).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.kind, TraceKind::End);
    assert_eq!(last.attrs.get("cancelled"), Some(&serde_json::json!(true)));
}

#[tokio::test]
async fn generate_timeout_fails_with_stage_timeout() {
    let h = HarnessBuilder::new()
        .generator(MockGenerator::slow("# Never", Duration::from_secs(30)))
        .settings(|s| s.timeouts.generate_sec = 1)
        .build();
    let id = h.submit("general_doc").await;

    let err = h
        .orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StageTimeout);

    let session = h.manager.get(&id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.error.as_ref().unwrap().kind, ErrorKind::StageTimeout);
}

#[tokio::test]
async fn json_mode_validates_payload() {
    let h = HarnessBuilder::new()
        .generator(MockGenerator::markdown(
            "```json\n[{\"scene_number\": 1, \"timestamp\": \"00:00\", \"visual_description\": \"terminal\"}]\n```",
        ))
        .build();
    let id = h.submit("scene_detection").await;

    let outcome = h
        .orchestrator
        .run(&id, h.options("scene_detection"))
        .await
        .unwrap();

    let scenes: serde_json::Value = serde_json::from_str(&outcome.doc.content).unwrap();
    assert!(scenes.is_array());
    assert_eq!(outcome.doc.artifact_name(), "doc.json");
}

#[tokio::test]
async fn json_mode_rejects_prose_output() {
    let h = HarnessBuilder::new()
        .generator(MockGenerator::markdown("Here are your scenes!"))
        .build();
    let id = h.submit("scene_detection").await;

    let err = h
        .orchestrator
        .run(&id, h.options("scene_detection"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutputFormatInvalid);
}

#[tokio::test]
async fn clip_mode_completes_even_when_cutting_fails() {
    // The clip list parses, but there is no real encoder behind the
    // cutter here; per-clip failures must degrade to notes.
    let h = HarnessBuilder::new()
        .generator(MockGenerator::markdown(
            "[{\"start_sec\": 2.0, \"end_sec\": 20.0, \"hook\": \"big reveal\", \"caption\": \"watch\"}]",
        ))
        .build();
    let id = h.submit("clip_generator").await;

    let outcome = h
        .orchestrator
        .run(&id, h.options("clip_generator"))
        .await
        .unwrap();
    assert_eq!(outcome.session.status, SessionStatus::Completed);

    let events = read_events(&h.trace_path(&id)).unwrap();
    assert!(events
        .iter()
        .any(|e| e.kind == TraceKind::Note && e.attrs.contains_key("clips_produced")));
}

#[tokio::test]
async fn progress_is_monotone_while_running() {
    let h = HarnessBuilder::new()
        .generator(MockGenerator::slow("# Doc", Duration::from_millis(300)))
        .build();
    let id = h.submit("general_doc").await;

    let watcher = {
        let manager = h.manager.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                let session = manager.get(&id).await.unwrap();
                seen.push(session.progress);
                if session.status.is_terminal() {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
    };

    h.orchestrator
        .run(&id, h.options("general_doc"))
        .await
        .unwrap();
    let seen = watcher.await.unwrap();

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {:?}", seen);
    assert_eq!(*seen.last().unwrap(), 100);
}

#[tokio::test]
async fn segmented_pipeline_concatenates_in_order() {
    let h = HarnessBuilder::new()
        .duration(95.0)
        .analyzer(MockAnalyzer::with_moments(vec![RelevantMoment {
            start_sec: 0.0,
            end_sec: 95.0,
            reason: "everything".to_string(),
            pinned: false,
        }]))
        .generator(MockGenerator::markdown("Chunk content."))
        .build();
    let id = h.submit("general_doc").await;

    let mut options = h.options("general_doc");
    options.segment_pipeline = true;

    let outcome = h.orchestrator.run(&id, options).await.unwrap();
    assert_eq!(outcome.session.status, SessionStatus::Completed);

    let doc = &outcome.doc.content;
    let positions: Vec<usize> = (1..=4)
        .map(|i| {
            doc.find(&format!("## Segment {} ", i))
                .unwrap_or_else(|| panic!("segment {} missing in:\n{}", i, doc))
        })
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "segments out of order");
}

#[tokio::test]
async fn segmented_rejects_json_modes() {
    let h = HarnessBuilder::new().duration(95.0).build();
    let id = h.submit("scene_detection").await;

    let mut options = h.options("scene_detection");
    options.segment_pipeline = true;

    let err = h.orchestrator.run(&id, options).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputInvalid);
}

#[tokio::test]
async fn identical_submissions_produce_identical_manifests() {
    let h = HarnessBuilder::new().build();

    let first = h.submit("general_doc").await;
    let second = h.submit("general_doc").await;

    let a = h.orchestrator.run(&first, h.options("general_doc")).await.unwrap();
    let b = h.orchestrator.run(&second, h.options("general_doc")).await.unwrap();

    let keys_a: Vec<&String> = a.manifest.keys().collect();
    let keys_b: Vec<&String> = b.manifest.keys().collect();
    assert_eq!(keys_a, keys_b);

    let times_a: Vec<f64> = a.keyframes.iter().map(|k| k.timestamp_sec).collect();
    let times_b: Vec<f64> = b.keyframes.iter().map(|k| k.timestamp_sec).collect();
    assert_eq!(times_a, times_b);

    assert_eq!(a.doc.content, b.doc.content);
}
