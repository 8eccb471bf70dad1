//! Session registry and pipeline execution.
//!
//! Each session lives behind its own [`RwLock`]. The pipeline task takes the
//! write lock only to publish a stage transition and never holds it across an
//! LLM call, so readers always see either a `running` record with nothing
//! filled in or a finished one.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{validate_depth, AnalysisConfig};
use super::evidence::clamp_unit;
use super::stages::{default_processors, StageOutput, StageProcessor};
use super::types::{AnalysisSession, AnalysisStage, Article, SessionStatus, StageStatus};
use crate::error::{AnalysisError, AnalysisResult, StageError, StageResult};
use crate::llm::LlmProvider;

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;

type Processors = Arc<Vec<Arc<dyn StageProcessor>>>;

struct SessionHandle {
    state: RwLock<AnalysisSession>,
    cancel: CancellationToken,
    status: watch::Sender<SessionStatus>,
}

impl SessionHandle {
    async fn snapshot(&self) -> AnalysisSession {
        self.state.read().await.clone()
    }

    /// Apply a terminal transition and publish it to waiters.
    fn finish(
        &self,
        session: &mut AnalysisSession,
        status: SessionStatus,
        error: Option<String>,
    ) -> bool {
        let changed = session.finish(status, error);
        if changed {
            self.status.send_replace(status);
        }
        changed
    }

    /// Fail the running stage, if any, and end the session as terminated.
    fn mark_terminated(&self, session: &mut AnalysisSession) -> bool {
        if session.status.is_terminal() {
            return false;
        }
        if let Some(stage) = session.stages.last_mut() {
            if stage.status == StageStatus::Running {
                stage.fail("session terminated");
            }
        }
        let changed = self.finish(session, SessionStatus::Terminated, None);
        info!(session_id = %session.id, stages = session.stages.len(), "Session terminated");
        changed
    }

    async fn terminate(&self) -> AnalysisSession {
        self.cancel.cancel();

        let mut session = self.state.write().await;
        self.mark_terminated(&mut session);
        session.clone()
    }
}

/// Drives articles through the stage pipeline and answers queries about
/// running and finished sessions.
pub struct AnalysisController {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    processors: Processors,
    root: CancellationToken,
}

impl AnalysisController {
    /// Controller running the standard five-stage pipeline.
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self::with_processors(default_processors(llm))
    }

    /// Controller running a custom pipeline, in the given order.
    pub fn with_processors(processors: Vec<Arc<dyn StageProcessor>>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            processors: Arc::new(processors),
            root: CancellationToken::new(),
        }
    }

    /// Validate `config`, register a running session and start its pipeline
    /// in the background. Returns before any stage has run.
    pub async fn start_analysis(
        &self,
        article: Article,
        config: AnalysisConfig,
    ) -> AnalysisResult<AnalysisSession> {
        config.validate()?;

        let session = AnalysisSession::new(article, config);
        let snapshot = session.clone();
        let (status, _) = watch::channel(SessionStatus::Running);
        let handle = Arc::new(SessionHandle {
            state: RwLock::new(session),
            cancel: self.root.child_token(),
            status,
        });

        self.sessions
            .write()
            .await
            .insert(snapshot.id.clone(), Arc::clone(&handle));

        info!(
            session_id = %snapshot.id,
            article_id = %snapshot.article.id,
            depth = snapshot.config.depth,
            "Analysis session started"
        );

        if self.root.is_cancelled() {
            warn!(session_id = %snapshot.id, "Controller is shut down, session not started");
            return Ok(handle.terminate().await);
        }

        tokio::spawn(run_pipeline(handle, Arc::clone(&self.processors)));

        Ok(snapshot)
    }

    async fn handle(&self, session_id: &str) -> AnalysisResult<Arc<SessionHandle>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AnalysisError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Point-in-time copy of a session.
    pub async fn get_session(&self, session_id: &str) -> AnalysisResult<AnalysisSession> {
        Ok(self.handle(session_id).await?.snapshot().await)
    }

    /// Cancel a session. Terminating a finished session changes nothing.
    pub async fn terminate_session(&self, session_id: &str) -> AnalysisResult<AnalysisSession> {
        let handle = self.handle(session_id).await?;
        Ok(handle.terminate().await)
    }

    /// Change the depth of a running session.
    ///
    /// The pipeline reads the new value before scheduling its next stage.
    pub async fn update_depth(
        &self,
        session_id: &str,
        depth: u32,
    ) -> AnalysisResult<AnalysisSession> {
        validate_depth(depth)?;
        let handle = self.handle(session_id).await?;

        let mut session = handle.state.write().await;
        if session.status.is_terminal() {
            return Err(AnalysisError::SessionNotRunning {
                session_id: session_id.to_string(),
                status: session.status.to_string(),
            });
        }

        debug!(session_id, from = session.config.depth, to = depth, "Updating depth");
        session.config.depth = depth;
        session.touch();
        Ok(session.clone())
    }

    /// Snapshots of all sessions, oldest first.
    pub async fn list_sessions(&self) -> Vec<AnalysisSession> {
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.read().await.values().cloned().collect();

        let mut sessions = Vec::with_capacity(handles.len());
        for handle in handles {
            sessions.push(handle.snapshot().await);
        }
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    /// Drop finished sessions that completed more than `max_age` ago.
    /// Returns how many were removed.
    pub async fn cleanup_sessions(&self, max_age: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, handle) in sessions.iter() {
            let session = handle.state.read().await;
            let finished_before_cutoff = session.completed_at.is_some_and(|at| at < cutoff);
            if session.status.is_terminal() && finished_before_cutoff {
                expired.push(id.clone());
            }
        }

        for id in &expired {
            sessions.remove(id);
        }

        if !expired.is_empty() {
            info!(removed = expired.len(), remaining = sessions.len(), "Cleaned up sessions");
        }
        expired.len()
    }

    /// Resolve once the session reaches a terminal status.
    pub async fn wait_for_completion(&self, session_id: &str) -> AnalysisResult<AnalysisSession> {
        let handle = self.handle(session_id).await?;
        let mut status = handle.status.subscribe();
        // The sender lives as long as the handle we hold.
        let _ = status.wait_for(|s| s.is_terminal()).await;
        Ok(handle.snapshot().await)
    }

    /// Terminate every running session.
    pub async fn shutdown(&self) {
        self.root.cancel();

        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.read().await.values().cloned().collect();
        for handle in handles {
            handle.terminate().await;
        }
        info!("Analysis controller shut down");
    }
}

async fn run_pipeline(handle: Arc<SessionHandle>, processors: Processors) {
    let mut index = 0usize;

    loop {
        let (processor, snapshot, mut stage, timeout) = {
            let mut session = handle.state.write().await;
            if session.status.is_terminal() {
                return;
            }
            if handle.cancel.is_cancelled() {
                handle.mark_terminated(&mut session);
                return;
            }

            let limit = session.config.stage_limit(processors.len());
            if index >= limit {
                handle.finish(&mut session, SessionStatus::Completed, None);
                info!(
                    session_id = %session.id,
                    stages = session.stages.len(),
                    evidence = session.evidence.len(),
                    hypotheses = session.hypotheses.len(),
                    "Analysis session completed"
                );
                return;
            }

            let processor = Arc::clone(&processors[index]);
            let number = (index + 1) as u32;

            if !processor.kind().is_enabled(&session.config) {
                debug!(session_id = %session.id, stage = number, "Stage disabled, skipping");
                session.push_stage(AnalysisStage::skipped(
                    number,
                    processor.name(),
                    processor.description(),
                    format!("{} disabled by configuration", processor.name()),
                ));
                index += 1;
                continue;
            }

            let stage = AnalysisStage::running(number, processor.name(), processor.description());
            session.push_stage(stage.clone());
            let timeout = session.config.timeout_per_stage();
            (processor, session.clone(), stage, timeout)
        };

        debug!(
            session_id = %snapshot.id,
            stage = stage.stage,
            name = processor.name(),
            "Running stage"
        );
        let number = stage.stage;
        let outcome: StageResult<StageOutput> = tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => {
                debug!(session_id = %snapshot.id, stage = number, "Stage cancelled");
                let mut session = handle.state.write().await;
                handle.mark_terminated(&mut session);
                return;
            }
            res = tokio::time::timeout(
                timeout,
                processor.process(&snapshot, &mut stage, &snapshot.article, &snapshot.results),
            ) => match res {
                Ok(result) => result,
                Err(_) => Err(StageError::TimedOut {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        };

        let mut session = handle.state.write().await;
        if session.status.is_terminal() {
            debug!(session_id = %session.id, "Discarding result of terminated session");
            return;
        }

        match outcome {
            Ok(output) => {
                if !commit_stage(&handle, &mut session, stage, output, &processors) {
                    return;
                }
                index += 1;
            }
            Err(e) => {
                warn!(session_id = %session.id, stage = number, error = %e, "Stage failed");
                stage.fail(e.to_string());
                session.replace_last_stage(stage);
                handle.finish(
                    &mut session,
                    SessionStatus::Failed,
                    Some(format!("Stage {} failed: {}", number, e)),
                );
                return;
            }
        }
    }
}

/// Publish a successful stage. Returns false when the confidence gate ended
/// the session.
fn commit_stage(
    handle: &SessionHandle,
    session: &mut AnalysisSession,
    mut stage: AnalysisStage,
    output: StageOutput,
    processors: &[Arc<dyn StageProcessor>],
) -> bool {
    stage.complete();
    stage.confidence = clamp_unit(stage.confidence);
    if let Some(results) = stage.results.as_mut() {
        results.confidence = clamp_unit(results.confidence);
    }

    let threshold = session.config.confidence_threshold;
    let gated = stage.confidence < threshold;
    if gated {
        stage.insights.push(format!(
            "Low confidence: {:.2} (threshold: {:.2})",
            stage.confidence, threshold
        ));
    }

    info!(
        session_id = %session.id,
        stage = stage.stage,
        confidence = stage.confidence,
        evidence = output.evidence.len(),
        hypotheses = output.hypotheses.len(),
        "Stage completed"
    );

    if let Some(results) = &stage.results {
        session.results.push(results.clone());
    }
    session.evidence.extend(output.evidence);
    session.hypotheses.extend(output.hypotheses);
    session.cross_references.extend(output.cross_references);
    session.evidence_chains.extend(output.evidence_chains);

    let tripped_at = stage.stage;
    session.replace_last_stage(stage);

    if !gated {
        return true;
    }

    let limit = session.config.stage_limit(processors.len());
    for (index, processor) in processors.iter().enumerate().take(limit).skip(tripped_at as usize) {
        session.push_stage(AnalysisStage::skipped(
            (index + 1) as u32,
            processor.name(),
            processor.description(),
            format!("Skipped: stage {} confidence below threshold", tripped_at),
        ));
    }

    info!(
        session_id = %session.id,
        stage = tripped_at,
        threshold,
        "Confidence gate tripped, finishing early"
    );
    handle.finish(session, SessionStatus::Completed, None);
    false
}
