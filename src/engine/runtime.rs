// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactDeduplicator;
use crate::context::RunContext;
use crate::errors::{Result, StagehandError};
use crate::remote::{
    poll_thread, JobRequest, NewTask, Services, TaskStatus, ThreadOutcome, CALLER,
};
use crate::state::ArtifactRecord;
use crate::types::StageStatus;

use super::core::{pending_dependencies, plan_submissions, Submission};
use super::StageOutcome;

/// Message recorded on the client task once a gateway accepts a job.
pub const ACCEPTED_MESSAGE: &str = "Client received acceptance of job from gateway.";

/// Runs stages against the remote services, persisting every transition.
///
/// This is the IO shell: decisions that need no IO live in
/// [`core`](super::core).
pub struct Engine {
    ctx: RunContext,
    services: Services,
    out: Box<dyn Write + Send>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Displayed logs go to stdout; use [`Engine::with_output`] to redirect.
    pub fn new(ctx: RunContext, services: Services) -> Self {
        Self {
            ctx,
            services,
            out: Box::new(io::stdout()),
        }
    }

    pub fn with_output(mut self, out: Box<dyn Write + Send>) -> Self {
        self.out = out;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Resolve `requested` into an execution order and execute each stage.
    ///
    /// Unknown names and cycles fail before any state is touched.
    pub async fn execute_sequence<S: AsRef<str>>(
        &mut self,
        requested: &[S],
        wait: bool,
    ) -> Result<Vec<(String, StageOutcome)>> {
        let order = self.ctx.graph.resolve_order(requested)?;
        info!(run_id = %self.ctx.run_id(), ?order, "executing stages");

        let mut outcomes = Vec::with_capacity(order.len());
        for name in order {
            let outcome = self.execute(&name, wait).await?;
            outcomes.push((name, outcome));
        }
        Ok(outcomes)
    }

    /// Execute one stage.
    ///
    /// A stage already recorded `completed` returns immediately without any
    /// network traffic. Otherwise its dependencies must be confirmed
    /// complete, then it gets a client task id, its project artifact, and one
    /// job per resource it targets.
    pub async fn execute(&mut self, name: &str, wait: bool) -> Result<StageOutcome> {
        let definition = self
            .ctx
            .graph
            .get(name)
            .ok_or_else(|| StagehandError::UnknownStage(name.to_string()))?
            .definition()
            .clone();

        if self.ctx.state.is_completed(name) {
            info!(stage = %name, "stage marked complete in local state; skipping");
            return Ok(StageOutcome::Skipped);
        }

        self.gate_dependencies(name).await?;
        let submissions = plan_submissions(&definition, &self.ctx.settings.compute_endpoint)?;

        let run_id = self.ctx.run_id().to_string();
        let task_id = self
            .services
            .tracker
            .request_task(&NewTask {
                run_id: run_id.clone(),
                caller: CALLER.to_string(),
                project: self.ctx.project_name().to_string(),
                status: TaskStatus::Started,
                message: format!("client started stage {name}"),
            })
            .await?;
        debug!(stage = %name, task_id = %task_id, "received client task id");
        // Threads from an earlier attempt no longer count.
        self.ctx.state.update(json!({
            name: {
                "state": StageStatus::Started,
                "client_task_id": task_id,
                "thread_id": null,
                "thread_ids": [],
            }
        }))?;

        let spec = self.ctx.snapshot_spec();
        let artifact = ArtifactDeduplicator::new(&*self.services.registry, &*self.services.store)
            .prepare(&spec, &run_id, &task_id)
            .await?;
        let artifact_name = artifact.name.clone();
        if self.ctx.debug {
            info!(stage = %name, artifact = %artifact_name, record = ?artifact.record, "artifact recorded");
        }
        self.ctx.state.update(json!({
            name: { "artifacts": { artifact_name: artifact.record } }
        }))?;

        if submissions.is_empty() {
            info!(stage = %name, "stage has no config directives; nothing to submit");
            self.ctx.state.set_status(name, StageStatus::Completed)?;
            return Ok(StageOutcome::Completed);
        }

        let artifacts = self
            .ctx
            .state
            .record(name)
            .map(|r| r.artifacts.clone())
            .unwrap_or_default();

        let mut thread_ids = Vec::with_capacity(submissions.len());
        for submission in &submissions {
            let thread_id = self
                .submit(name, &task_id, submission, artifacts.clone(), &thread_ids)
                .await?;
            thread_ids.push(thread_id);
        }

        if !wait {
            return Ok(StageOutcome::Submitted { thread_ids });
        }

        for thread_id in &thread_ids {
            self.await_thread(name, thread_id).await?;
        }
        self.ctx.state.set_status(name, StageStatus::Completed)?;
        info!(stage = %name, "stage completed");

        self.display(name, None).await?;
        Ok(StageOutcome::Completed)
    }

    /// Confirm every pending dependency through all of its recorded threads.
    async fn gate_dependencies(&mut self, name: &str) -> Result<()> {
        let pending = pending_dependencies(&self.ctx.graph, self.ctx.state.state(), name);
        let mut unresolved = Vec::new();

        for dep in pending {
            if dep.thread_ids.is_empty() {
                warn!(stage = %name, dependency = %dep.name, "dependency was never submitted in this run");
                unresolved.push(dep.name);
                continue;
            }

            info!(stage = %name, dependency = %dep.name, threads = dep.thread_ids.len(), "checking if dependency has completed");
            match self.poll_all(&dep.thread_ids).await? {
                ThreadOutcome::Completed => {
                    self.ctx.state.set_status(&dep.name, StageStatus::Completed)?;
                }
                ThreadOutcome::Failed(events) => {
                    warn!(dependency = %dep.name, failures = events.len(), "dependency failed remotely");
                    self.ctx.state.set_status(&dep.name, StageStatus::Failed)?;
                    unresolved.push(dep.name);
                }
                ThreadOutcome::TimedOut { attempts } => {
                    warn!(dependency = %dep.name, attempts, "gave up waiting for dependency");
                    unresolved.push(dep.name);
                }
            }
        }

        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(StagehandError::DependenciesNotComplete {
                stage: name.to_string(),
                deps: unresolved,
            })
        }
    }

    /// Poll each thread in turn; the first one that does not complete decides.
    async fn poll_all(&self, thread_ids: &[String]) -> Result<ThreadOutcome> {
        for thread_id in thread_ids {
            let outcome =
                poll_thread(&*self.services.tracker, thread_id, self.ctx.settings.polling).await?;
            if !matches!(outcome, ThreadOutcome::Completed) {
                return Ok(outcome);
            }
        }
        Ok(ThreadOutcome::Completed)
    }

    /// Post one job and record the thread the gateway hands back next to the
    /// threads already `accepted` for this stage.
    async fn submit(
        &mut self,
        name: &str,
        task_id: &str,
        submission: &Submission,
        artifacts: BTreeMap<String, ArtifactRecord>,
        accepted: &[String],
    ) -> Result<String> {
        let request = JobRequest {
            run_id: self.ctx.run_id().to_string(),
            project: self.ctx.project_name().to_string(),
            artifacts,
            task_id: task_id.to_string(),
            configs: submission.configs.clone(),
            stage: name.to_string(),
        };

        info!(stage = %name, resource = %submission.resource, url = %submission.url, "sending job");
        if self.ctx.debug {
            info!(payload = %serde_json::to_string_pretty(&request)?, "job payload");
        }
        let result = self.services.gateway.submit(&submission.url, &request).await;

        let accepted_job = match result {
            Ok(job) => job,
            Err(e) => {
                let message = format!("Failed to call {} gateway. {e}", submission.url);
                self.ctx.state.set_status(name, StageStatus::Failed)?;
                if let Err(notify) = self
                    .services
                    .tracker
                    .update_task(task_id, TaskStatus::Failed, &message)
                    .await
                {
                    warn!(stage = %name, error = %notify, "could not report submission failure to task tracker");
                }
                return Err(StagehandError::RemoteSubmission {
                    stage: name.to_string(),
                    url: submission.url.clone(),
                    message: e.to_string(),
                });
            }
        };

        let thread_id = accepted_job.thread_id;
        let mut thread_ids = accepted.to_vec();
        thread_ids.push(thread_id.clone());
        self.ctx.state.update(json!({
            name: {
                "state": StageStatus::Running,
                "client_task_id": task_id,
                "thread_id": thread_id,
                "thread_ids": thread_ids,
            }
        }))?;
        debug!(stage = %name, thread_id = %thread_id, "job accepted");

        self.services
            .tracker
            .update_task(task_id, TaskStatus::Info, ACCEPTED_MESSAGE)
            .await?;
        Ok(thread_id)
    }

    /// Wait for a stage's own thread; remote failure marks the stage failed.
    async fn await_thread(&mut self, name: &str, thread_id: &str) -> Result<()> {
        let outcome = poll_thread(&*self.services.tracker, thread_id, self.ctx.settings.polling)
            .await?;

        match outcome {
            ThreadOutcome::Completed => Ok(()),
            ThreadOutcome::Failed(events) => {
                self.ctx.state.set_status(name, StageStatus::Failed)?;
                Err(StagehandError::RemoteTaskFailure {
                    stage: name.to_string(),
                    events: serde_json::to_string_pretty(&events)?,
                })
            }
            ThreadOutcome::TimedOut { attempts } => Err(StagehandError::RemoteTaskTimeout {
                thread_id: thread_id.to_string(),
                attempts,
            }),
        }
    }

    /// Display each stage's logs, in the order given.
    ///
    /// The names are validated like an execution request (unknown stages and
    /// cycles fail) before anything is displayed.
    pub async fn display_sequence<S: AsRef<str>>(
        &mut self,
        names: &[S],
        run_id: Option<&str>,
    ) -> Result<()> {
        self.ctx.graph.resolve_order(names)?;

        for name in names {
            self.display(name.as_ref(), run_id).await?;
        }
        Ok(())
    }

    /// Download the log objects a stage's remote jobs wrote and print them
    /// to the output sink. Returns how many logs were shown.
    ///
    /// The stage must have a recorded thread; if it is not yet recorded
    /// `completed`, every one of its threads is awaited first.
    pub async fn display(&mut self, name: &str, run_id: Option<&str>) -> Result<usize> {
        if !self.ctx.graph.contains(name) {
            return Err(StagehandError::UnknownStage(name.to_string()));
        }

        let thread_ids = self
            .ctx
            .state
            .record(name)
            .map(|r| r.threads())
            .unwrap_or_default();
        if thread_ids.is_empty() {
            return Err(StagehandError::NotSubmitted(name.to_string()));
        }

        if !self.ctx.state.is_completed(name) {
            for thread_id in &thread_ids {
                self.await_thread(name, thread_id).await?;
            }
            self.ctx.state.set_status(name, StageStatus::Completed)?;
            debug!(stage = %name, threads = thread_ids.len(), "threads have completed");
        }

        let run_id = run_id.unwrap_or(self.ctx.run_id()).to_string();
        let prefix = format!("artifacts/logs/{name}/");
        info!(stage = %name, run_id = %run_id, "downloading log artifacts");

        let logs = self.services.store.list(&run_id, &prefix, true).await?;
        if logs.is_empty() {
            warn!(stage = %name, "no log artifacts found for stage");
            return Ok(0);
        }

        let state_dir = self.ctx.state_dir();
        tokio::fs::create_dir_all(&state_dir).await?;

        for log in &logs {
            let file_name = Path::new(&log.object_name)
                .file_name()
                .ok_or_else(|| {
                    StagehandError::ObjectStore(format!(
                        "log object '{}' has no file name",
                        log.object_name
                    ))
                })?
                .to_owned();
            let local = state_dir.join(file_name);

            debug!(object = %log.object_name, local = ?local, "downloading log artifact");
            self.services.store.download(&run_id, log, &local).await?;

            let contents = tokio::fs::read_to_string(&local).await?;
            info!(stage = %name, object = %log.object_name, "displaying log artifact");
            self.out.write_all(contents.as_bytes())?;
            if !contents.ends_with('\n') {
                self.out.write_all(b"\n")?;
            }
        }
        self.out.flush()?;

        Ok(logs.len())
    }
}
