//! Unit tests for the analysis controller.
//!
//! Pipelines here are built from scripted stages so the tests control
//! confidence, latency and failure of every step.

use super::*;
use crate::analysis::evidence::{Evidence, EvidenceType};
use crate::analysis::stages::{DeepAnalysisStage, StageCore, StageKind};
use crate::analysis::types::ExtractionResult;
use crate::llm::MockLlmProvider;
use async_trait::async_trait;
use pretty_assertions::assert_eq;

// ============================================================================
// Scripted stages
// ============================================================================

struct ScriptedStage {
    kind: StageKind,
    confidence: f64,
    delay: Duration,
    failure: Option<&'static str>,
    produce_results: bool,
}

impl ScriptedStage {
    fn new(kind: StageKind, confidence: f64) -> Self {
        Self {
            kind,
            confidence,
            delay: Duration::from_millis(5),
            failure: None,
            produce_results: true,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self, message: &'static str) -> Self {
        self.failure = Some(message);
        self
    }

    fn without_results(mut self) -> Self {
        self.produce_results = false;
        self
    }
}

#[async_trait]
impl StageProcessor for ScriptedStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn process(
        &self,
        _session: &AnalysisSession,
        stage: &mut AnalysisStage,
        _article: &Article,
        _previous_results: &[ExtractionResult],
    ) -> StageResult<StageOutput> {
        tokio::time::sleep(self.delay).await;

        if let Some(message) = self.failure {
            return Err(StageError::Parse {
                message: message.to_string(),
            });
        }

        stage.confidence = self.confidence;
        stage.insights.push(format!("{} done", self.kind.name()));
        if self.produce_results {
            stage.results = Some(ExtractionResult {
                confidence: self.confidence,
                ..ExtractionResult::default()
            });
        }

        Ok(StageOutput {
            evidence: vec![Evidence::new(
                EvidenceType::Inference,
                stage.stage,
                self.kind.name(),
                format!("finding from stage {}", stage.stage),
            )],
            ..StageOutput::default()
        })
    }
}

fn scripted(confidences: [f64; 5]) -> Vec<Arc<dyn StageProcessor>> {
    StageKind::ALL
        .iter()
        .zip(confidences)
        .map(|(kind, c)| Arc::new(ScriptedStage::new(*kind, c)) as Arc<dyn StageProcessor>)
        .collect()
}

fn slow_pipeline(delay: Duration) -> Vec<Arc<dyn StageProcessor>> {
    StageKind::ALL
        .iter()
        .map(|kind| {
            Arc::new(ScriptedStage::new(*kind, 0.9).slow(delay)) as Arc<dyn StageProcessor>
        })
        .collect()
}

fn article() -> Article {
    Article::new(
        "https://news.example/procurement",
        "Procurement inquiry",
        "The ministry awarded a contract without a tender.",
    )
}

fn statuses(session: &AnalysisSession) -> Vec<StageStatus> {
    session.stages.iter().map(|s| s.status).collect()
}

// ============================================================================
// Start
// ============================================================================

#[tokio::test]
async fn test_start_returns_running_session_without_stages() {
    let controller = AnalysisController::with_processors(slow_pipeline(Duration::from_secs(5)));

    let session = controller
        .start_analysis(article(), AnalysisConfig::default())
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Running);
    assert!(session.stages.is_empty());
    assert!(controller.get_session(&session.id).await.is_ok());

    controller.shutdown().await;
}

#[tokio::test]
async fn test_start_rejects_invalid_depth_without_registering() {
    let controller = AnalysisController::with_processors(scripted([0.9; 5]));

    for depth in [0, 1, 11] {
        let err = controller
            .start_analysis(article(), AnalysisConfig::default().with_depth(depth))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig { ref field, .. } if field == "depth"));
    }

    assert!(controller.list_sessions().await.is_empty());
}

// ============================================================================
// Pipeline policy
// ============================================================================

#[tokio::test]
async fn test_runs_stages_up_to_depth() {
    let controller = AnalysisController::with_processors(scripted([0.9; 5]));

    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(4))
        .await
        .unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(
        session.stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert!(session
        .stages
        .iter()
        .all(|s| s.status == StageStatus::Completed && s.completed_at.is_some()));
    assert_eq!(session.results.len(), 4);
    assert_eq!(session.evidence.len(), 4);
    assert!(session.completed_at.is_some());
    assert!(session.error.is_none());
}

#[tokio::test]
async fn test_depth_above_max_stages_is_capped() {
    let controller = AnalysisController::with_processors(scripted([0.9; 5]));
    let mut config = AnalysisConfig::default().with_depth(10);
    config.max_stages = 3;

    let started = controller.start_analysis(article(), config).await.unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.stages.len(), 3);
    assert_eq!(session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_low_confidence_skips_remaining_stages() {
    let controller = AnalysisController::with_processors(scripted([0.9, 0.5, 0.9, 0.9, 0.9]));
    let config = AnalysisConfig::default()
        .with_depth(3)
        .with_confidence_threshold(0.6);

    let started = controller.start_analysis(article(), config).await.unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(
        statuses(&session),
        vec![
            StageStatus::Completed,
            StageStatus::Completed,
            StageStatus::Skipped
        ]
    );
    assert_eq!(session.executed_stages().count(), 2);
    assert!(session.stages[1]
        .insights
        .iter()
        .any(|i| i == "Low confidence: 0.50 (threshold: 0.60)"));
    assert_eq!(
        session.stages[2].insights,
        vec!["Skipped: stage 2 confidence below threshold".to_string()]
    );
    assert_eq!(session.results.len(), 2);
}

#[tokio::test]
async fn test_out_of_range_confidence_is_clamped_before_gate() {
    let controller = AnalysisController::with_processors(scripted([85.0, -0.5, 0.9, 0.9, 0.9]));
    let config = AnalysisConfig::default()
        .with_depth(3)
        .with_confidence_threshold(0.6);

    let started = controller.start_analysis(article(), config).await.unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(
        statuses(&session),
        vec![
            StageStatus::Completed,
            StageStatus::Completed,
            StageStatus::Skipped
        ]
    );
    assert_eq!(session.stages[0].confidence, 1.0);
    assert_eq!(session.stages[1].confidence, 0.0);
    assert!(session.stages[1]
        .insights
        .iter()
        .any(|i| i == "Low confidence: 0.00 (threshold: 0.60)"));
    let result_confidences: Vec<f64> = session.results.iter().map(|r| r.confidence).collect();
    assert_eq!(result_confidences, vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_nan_confidence_trips_gate() {
    let controller = AnalysisController::with_processors(scripted([f64::NAN, 0.9, 0.9, 0.9, 0.9]));

    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(2))
        .await
        .unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.stages[0].confidence, 0.0);
    assert_eq!(
        statuses(&session),
        vec![StageStatus::Completed, StageStatus::Skipped]
    );
}

#[tokio::test]
async fn test_stage_failure_fails_session() {
    let processors: Vec<Arc<dyn StageProcessor>> = vec![
        Arc::new(ScriptedStage::new(StageKind::SurfaceExtraction, 0.9)),
        Arc::new(ScriptedStage::new(StageKind::DeepAnalysis, 0.9).failing("bad json")),
        Arc::new(ScriptedStage::new(StageKind::CrossReference, 0.9)),
    ];
    let controller = AnalysisController::with_processors(processors);

    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(5))
        .await
        .unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(
        statuses(&session),
        vec![StageStatus::Completed, StageStatus::Failed]
    );
    assert_eq!(
        session.stages[1].error.as_deref(),
        Some("Failed to parse LLM response: bad json")
    );
    assert_eq!(
        session.error.as_deref(),
        Some("Stage 2 failed: Failed to parse LLM response: bad json")
    );
    // failed stages contribute nothing
    assert_eq!(session.evidence.len(), 1);
}

#[tokio::test]
async fn test_deep_analysis_without_previous_results_fails() {
    let mut llm = MockLlmProvider::new();
    llm.expect_generate().never();
    let processors: Vec<Arc<dyn StageProcessor>> = vec![
        Arc::new(ScriptedStage::new(StageKind::SurfaceExtraction, 0.9).without_results()),
        Arc::new(DeepAnalysisStage::new(StageCore::new(Arc::new(llm)))),
        Arc::new(ScriptedStage::new(StageKind::CrossReference, 0.9)),
    ];
    let controller = AnalysisController::with_processors(processors);

    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(3))
        .await
        .unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.stages.len(), 2);
    assert_eq!(session.stages[1].status, StageStatus::Failed);
    assert!(session.stages[1]
        .error
        .as_deref()
        .unwrap()
        .contains("requires 1 previous result(s), found 0"));
}

#[tokio::test]
async fn test_disabled_stages_are_recorded_as_skipped() {
    let controller = AnalysisController::with_processors(scripted([0.9; 5]));
    let config = AnalysisConfig::default()
        .with_depth(5)
        .with_cross_reference(false)
        .with_hypotheses(false);

    let started = controller.start_analysis(article(), config).await.unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(
        statuses(&session),
        vec![
            StageStatus::Completed,
            StageStatus::Completed,
            StageStatus::Skipped,
            StageStatus::Skipped,
            StageStatus::Completed,
        ]
    );
    assert_eq!(
        session.stages[2].insights,
        vec!["Cross-Reference Validation disabled by configuration".to_string()]
    );
    assert_eq!(session.results.len(), 3);
}

#[tokio::test]
async fn test_stage_timeout_fails_session() {
    let processors: Vec<Arc<dyn StageProcessor>> = vec![
        Arc::new(
            ScriptedStage::new(StageKind::SurfaceExtraction, 0.9).slow(Duration::from_secs(10)),
        ),
        Arc::new(ScriptedStage::new(StageKind::DeepAnalysis, 0.9)),
    ];
    let controller = AnalysisController::with_processors(processors);
    let config = AnalysisConfig::default().with_timeout_per_stage(Duration::from_millis(50));

    let started = controller.start_analysis(article(), config).await.unwrap();
    let session = controller.wait_for_completion(&started.id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.stages.len(), 1);
    assert_eq!(
        session.stages[0].error.as_deref(),
        Some("Stage timed out after 50ms")
    );
}

// ============================================================================
// Terminate
// ============================================================================

#[tokio::test]
async fn test_terminate_is_idempotent() {
    let controller = AnalysisController::with_processors(slow_pipeline(Duration::from_secs(10)));
    let started = controller
        .start_analysis(article(), AnalysisConfig::default())
        .await
        .unwrap();

    // let the first stage get scheduled
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first = controller.terminate_session(&started.id).await.unwrap();
    assert_eq!(first.status, SessionStatus::Terminated);
    assert_eq!(first.stages.len(), 1);
    assert_eq!(first.stages[0].status, StageStatus::Failed);
    assert_eq!(first.stages[0].error.as_deref(), Some("session terminated"));
    let completed_at = first.completed_at;

    let second = controller.terminate_session(&started.id).await.unwrap();
    assert_eq!(second.status, SessionStatus::Terminated);
    assert_eq!(second.completed_at, completed_at);

    let waited = controller.wait_for_completion(&started.id).await.unwrap();
    assert_eq!(waited.status, SessionStatus::Terminated);
}

#[tokio::test]
async fn test_terminate_completed_session_is_noop() {
    let controller = AnalysisController::with_processors(scripted([0.9; 5]));
    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(2))
        .await
        .unwrap();
    controller.wait_for_completion(&started.id).await.unwrap();

    let session = controller.terminate_session(&started.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session
        .stages
        .iter()
        .all(|s| s.status == StageStatus::Completed));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let controller = AnalysisController::with_processors(scripted([0.9; 5]));

    assert!(matches!(
        controller.get_session("missing").await,
        Err(AnalysisError::SessionNotFound { .. })
    ));
    assert!(matches!(
        controller.terminate_session("missing").await,
        Err(AnalysisError::SessionNotFound { .. })
    ));
    assert!(matches!(
        controller.wait_for_completion("missing").await,
        Err(AnalysisError::SessionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_shutdown_terminates_running_sessions() {
    let controller = AnalysisController::with_processors(slow_pipeline(Duration::from_secs(10)));
    let a = controller
        .start_analysis(article(), AnalysisConfig::default())
        .await
        .unwrap();
    let b = controller
        .start_analysis(article(), AnalysisConfig::default())
        .await
        .unwrap();

    controller.shutdown().await;

    for id in [&a.id, &b.id] {
        let session = controller.get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Terminated);
    }
}

#[tokio::test]
async fn test_start_after_shutdown_is_terminated() {
    let controller = AnalysisController::with_processors(scripted([0.9; 5]));
    controller.shutdown().await;

    let started = controller
        .start_analysis(article(), AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(started.status, SessionStatus::Terminated);

    let session = tokio::time::timeout(
        Duration::from_secs(2),
        controller.wait_for_completion(&started.id),
    )
    .await
    .expect("wait_for_completion should resolve")
    .unwrap();
    assert_eq!(session.status, SessionStatus::Terminated);
    assert!(session.stages.is_empty());
}

#[tokio::test]
async fn test_cancelled_pipeline_finishes_as_terminated() {
    let controller = AnalysisController::with_processors(slow_pipeline(Duration::from_secs(10)));
    let started = controller
        .start_analysis(article(), AnalysisConfig::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Cancel the token alone, without going through terminate().
    let handle = controller.handle(&started.id).await.unwrap();
    handle.cancel.cancel();

    let session = tokio::time::timeout(
        Duration::from_secs(2),
        controller.wait_for_completion(&started.id),
    )
    .await
    .expect("wait_for_completion should resolve")
    .unwrap();
    assert_eq!(session.status, SessionStatus::Terminated);
    assert_eq!(statuses(&session), vec![StageStatus::Failed]);
    assert_eq!(session.stages[0].error.as_deref(), Some("session terminated"));
}

// ============================================================================
// Depth updates
// ============================================================================

#[tokio::test]
async fn test_depth_increase_is_read_at_next_stage() {
    let controller =
        AnalysisController::with_processors(slow_pipeline(Duration::from_millis(100)));
    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(2))
        .await
        .unwrap();

    let updated = controller.update_depth(&started.id, 4).await.unwrap();
    assert_eq!(updated.config.depth, 4);

    let session = controller.wait_for_completion(&started.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stages.len(), 4);
}

#[tokio::test]
async fn test_depth_decrease_stops_at_next_boundary() {
    let controller =
        AnalysisController::with_processors(slow_pipeline(Duration::from_millis(100)));
    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(5))
        .await
        .unwrap();

    controller.update_depth(&started.id, 2).await.unwrap();

    let session = controller.wait_for_completion(&started.id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stages.len(), 2);
}

#[tokio::test]
async fn test_update_depth_rejects_finished_and_invalid() {
    let controller = AnalysisController::with_processors(scripted([0.9; 5]));
    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(2))
        .await
        .unwrap();

    assert!(matches!(
        controller.update_depth(&started.id, 1).await,
        Err(AnalysisError::InvalidConfig { .. })
    ));

    controller.wait_for_completion(&started.id).await.unwrap();
    let err = controller.update_depth(&started.id, 3).await.unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::SessionNotRunning { ref status, .. } if status == "completed"
    ));
}

// ============================================================================
// Concurrent reads
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_never_see_torn_stage_records() {
    let controller = Arc::new(AnalysisController::with_processors(slow_pipeline(
        Duration::from_millis(20),
    )));
    let started = controller
        .start_analysis(article(), AnalysisConfig::default().with_depth(5))
        .await
        .unwrap();

    let mut readers = Vec::new();
    for _ in 0..4 {
        let controller = Arc::clone(&controller);
        let id = started.id.clone();
        readers.push(tokio::spawn(async move {
            loop {
                let session = controller.get_session(&id).await.unwrap();
                for stage in &session.stages {
                    if stage.status == StageStatus::Running {
                        assert_eq!(stage.confidence, 0.0);
                        assert!(stage.results.is_none());
                        assert!(stage.insights.is_empty());
                    }
                }
                let indices: Vec<u32> = session.stages.iter().map(|s| s.stage).collect();
                let expected: Vec<u32> = (1..=indices.len() as u32).collect();
                assert_eq!(indices, expected);

                if session.status.is_terminal() {
                    return session;
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    for reader in readers {
        let last = reader.await.unwrap();
        assert_eq!(last.status, SessionStatus::Completed);
        assert_eq!(last.stages.len(), 5);
    }
}

// ============================================================================
// Listing and cleanup
// ============================================================================

#[tokio::test]
async fn test_list_sessions_in_creation_order() {
    let controller = AnalysisController::with_processors(slow_pipeline(Duration::from_secs(10)));
    let mut ids = Vec::new();
    for _ in 0..3 {
        let session = controller
            .start_analysis(article(), AnalysisConfig::default())
            .await
            .unwrap();
        ids.push(session.id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let listed: Vec<String> = controller
        .list_sessions()
        .await
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(listed, ids);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_cleanup_removes_only_finished_sessions() {
    let controller = AnalysisController::with_processors(slow_pipeline(Duration::from_secs(10)));
    let done = controller
        .start_analysis(article(), AnalysisConfig::default())
        .await
        .unwrap();
    let running = controller
        .start_analysis(article(), AnalysisConfig::default())
        .await
        .unwrap();

    controller.terminate_session(&done.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(
        controller.cleanup_sessions(Duration::from_secs(3600)).await,
        0
    );
    assert_eq!(controller.cleanup_sessions(Duration::ZERO).await, 1);

    assert!(controller.get_session(&done.id).await.is_err());
    assert!(controller.get_session(&running.id).await.is_ok());

    controller.shutdown().await;
}
