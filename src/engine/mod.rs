//! Session engine: drives one agent run from prompt to durable record.
//!
//! A run opens a `pending` session log, links it into its thread, launches
//! the agent and then decodes its stdout. Each event goes to the
//! [`RelayState`], to the live subscriber as a [`StreamFrame`] and, in
//! batches, to disk. When the process ends (normally, on error, on timeout
//! or on abort) the log is finalized exactly once.
//!
//! Only failures before the agent starts are returned as errors. Anything
//! after that ends up in the record's status, and a failed final write is
//! reported as [`RunSummary::persist_warning`].

pub mod frames;
pub mod relay;

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{Config, PathsConfig, PersistenceConfig};
use crate::decoder::EventStream;
use crate::error::{EngineError, StoreError};
use crate::events::{AgentEvent, ResultEvent};
use crate::logging::AGENT_STDERR_TARGET;
use crate::store::{
    validate_name, LogCompletion, SessionLog, SessionLogStore, ThreadMeta, ThreadRegistry,
};
use crate::supervisor::{AgentLauncher, ContainerSupervisor, ExitOutcome, RunOptions};
use crate::textutil::single_line_preview;

pub use frames::StreamFrame;
pub use relay::RelayState;

/// Capacity of the live frame channel used by [`Engine::run`].
const ONE_SHOT_FRAME_BUFFER: usize = 64;

/// One prompt to run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub project: String,
    pub prompt: String,
    /// Thread to append the log to. Its token is used when `options.resume`
    /// is unset.
    pub thread_id: Option<String>,
    pub options: RunOptions,
}

impl RunRequest {
    /// Reject a blank prompt or an unsafe project name. Thread existence is
    /// checked separately, against the registry.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.prompt.trim().is_empty() {
            return Err(EngineError::InvalidRequest("prompt is required".to_string()));
        }
        validate_name("project", &self.project)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))
    }
}

/// Everything known about a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The final record (as written, or as it would have been written when
    /// the final write failed).
    pub log: SessionLog,
    pub thread_id: Option<String>,
    /// Latest resumption token reported by the agent.
    pub token: Option<String>,
    /// Frames relayed, including a synthesized interrupted result.
    pub frames: u64,
    pub persist_warning: Option<String>,
}

/// One-shot response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub id: String,
    pub project: String,
    pub prompt: String,
    pub response: String,
    pub exit_code: i32,
    pub duration: u64,
    pub timestamp: String,
}

impl From<&SessionLog> for RunResult {
    fn from(log: &SessionLog) -> Self {
        Self {
            id: log.id.clone(),
            project: log.project.clone(),
            prompt: log.prompt.clone(),
            response: log.response.clone(),
            exit_code: log.exit_code,
            duration: log.duration,
            timestamp: log.timestamp.clone(),
        }
    }
}

pub struct Engine {
    paths: PathsConfig,
    thresholds: PersistenceConfig,
    logs: SessionLogStore,
    threads: Arc<ThreadRegistry>,
    launcher: Arc<dyn AgentLauncher>,
}

impl Engine {
    /// Engine that runs the agent in a container.
    pub fn new(config: &Config) -> Self {
        Self::with_launcher(config, Arc::new(ContainerSupervisor::new(config)))
    }

    pub fn with_launcher(config: &Config, launcher: Arc<dyn AgentLauncher>) -> Self {
        let logs = SessionLogStore::new(config.paths.logs_dir());
        Self {
            paths: config.paths.clone(),
            thresholds: config.persistence,
            threads: Arc::new(ThreadRegistry::new(logs.clone())),
            logs,
            launcher,
        }
    }

    pub fn logs(&self) -> &SessionLogStore {
        &self.logs
    }

    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    /// Run to completion without a live subscriber.
    pub async fn run(&self, request: RunRequest) -> Result<RunResult, EngineError> {
        let (tx, mut rx) = mpsc::channel(ONE_SHOT_FRAME_BUFFER);
        let sink = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let summary = self.run_streaming(request, tx, None).await;
        let _ = sink.await;
        Ok(RunResult::from(&summary?.log))
    }

    /// Run and relay every event to `frames` as it is decoded.
    ///
    /// A dropped receiver does not stop the run. Flipping `cancel` to `true`
    /// kills the agent; the record then ends `error` with an interrupted
    /// result.
    pub async fn run_streaming(
        &self,
        request: RunRequest,
        frames: mpsc::Sender<StreamFrame>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<RunSummary, EngineError> {
        let started = Instant::now();
        request.validate()?;
        let RunRequest {
            project,
            prompt,
            thread_id,
            mut options,
        } = request;

        let thread = match &thread_id {
            Some(id) => Some(self.lookup_thread(&project, id).await?),
            None => None,
        };
        if options.resume.is_none() {
            options.resume = thread.as_ref().and_then(|t| t.session_id.clone());
        }

        tokio::fs::create_dir_all(self.paths.project_workspace(&project))
            .await
            .map_err(StoreError::from)?;

        let pending = {
            let logs = self.logs.clone();
            let (project, prompt) = (project.clone(), prompt.clone());
            blocking(move || logs.create_pending(&project, &prompt)).await?
        };
        tracing::info!(
            project = %project,
            log_id = %pending.id,
            thread = thread_id.as_deref().unwrap_or("-"),
            prompt = %single_line_preview(&prompt, 80),
            "run started"
        );

        if let Some(id) = &thread_id {
            let threads = Arc::clone(&self.threads);
            let (project, id, log_id) = (project.clone(), id.clone(), pending.id.clone());
            if let Err(err) = blocking(move || threads.append_log(&project, &id, &log_id)).await {
                self.fail_pending(&pending, started, &err.to_string()).await;
                return Err(err.into());
            }
        }

        let process = match self
            .launcher
            .launch(&project, &prompt, &options, cancel)
            .await
        {
            Ok(process) => process,
            Err(err) => {
                tracing::warn!(project = %project, log_id = %pending.id, error = %err, "agent launch failed");
                self.fail_pending(&pending, started, &format!("setup: {err}")).await;
                return Err(err.into());
            }
        };

        let stderr_task = tokio::spawn(drain_stderr(process.stderr, project.clone()));
        let mut run = ActiveRun {
            project: &project,
            log_id: &pending.id,
            thread_id: thread_id.as_deref(),
            state: RelayState::new(self.thresholds),
            frames: Some(frames),
            logs: &self.logs,
            threads: &self.threads,
            inflight: None,
        };

        let mut events = EventStream::new(process.stdout);
        while let Some(event) = events.next_event().await {
            run.relay(event).await;
        }

        if let Err(err) = stderr_task.await {
            tracing::warn!(error = %err, "stderr drain task failed");
        }
        let outcome = process.done.await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "agent watchdog task failed");
            ExitOutcome {
                code: None,
                killed: None,
            }
        });
        if let Some(reason) = outcome.killed {
            let reason = reason.describe();
            tracing::warn!(project = %project, log_id = %pending.id, reason = %reason, "agent run interrupted");
            run.relay(AgentEvent::Result(ResultEvent::interrupted(reason)))
                .await;
        }

        run.settle_inflight().await;
        let duration = elapsed_ms(started);
        let completion = run.state.completion(duration);
        let token = run.state.token().map(str::to_string);
        let frames_sent = run.state.last_seq();

        let (log, persist_warning) = {
            let logs = self.logs.clone();
            let (store_project, id) = (project.clone(), pending.id.clone());
            let for_store = completion.clone();
            match blocking(move || logs.finalize(&store_project, &id, for_store)).await {
                Ok(log) => (log, None),
                Err(err) => {
                    let warning = format!("final log write failed: {err}");
                    tracing::warn!(project = %project, log_id = %pending.id, error = %err, "final log write failed");
                    let mut log = pending.clone();
                    log.apply_completion(completion);
                    (log, Some(warning))
                }
            }
        };

        if let (Some(id), Some(token)) = (&thread_id, &token) {
            self.store_token(&project, id, token).await;
        }

        tracing::info!(
            project = %project,
            log_id = %log.id,
            status = %log.status,
            exit_code = log.exit_code,
            process_code = ?outcome.code,
            duration_ms = log.duration,
            events = frames_sent,
            "run finished"
        );
        Ok(RunSummary {
            log,
            thread_id,
            token,
            frames: frames_sent,
            persist_warning,
        })
    }

    async fn lookup_thread(&self, project: &str, id: &str) -> Result<ThreadMeta, EngineError> {
        let threads = Arc::clone(&self.threads);
        let (project, id) = (project.to_string(), id.to_string());
        let lookup_id = id.clone();
        blocking(move || threads.get(&project, &lookup_id))
            .await?
            .ok_or_else(|| EngineError::InvalidRequest(format!("thread {id} not found")))
    }

    async fn store_token(&self, project: &str, thread_id: &str, token: &str) {
        store_token(&self.threads, project, thread_id, token).await;
    }

    /// Close a record whose run never started.
    async fn fail_pending(&self, pending: &SessionLog, started: Instant, message: &str) {
        let logs = self.logs.clone();
        let (project, id) = (pending.project.clone(), pending.id.clone());
        let completion = LogCompletion {
            response: message.to_string(),
            assistant_text: None,
            events: Vec::new(),
            exit_code: 1,
            duration: elapsed_ms(started),
            completed: false,
        };
        if let Err(err) = blocking(move || logs.finalize(&project, &id, completion)).await {
            tracing::warn!(log_id = %pending.id, error = %err, "could not close failed run log");
        }
    }
}

/// Per-run relay and persistence state.
struct ActiveRun<'a> {
    project: &'a str,
    log_id: &'a str,
    thread_id: Option<&'a str>,
    state: RelayState,
    /// `None` once the subscriber has gone away.
    frames: Option<mpsc::Sender<StreamFrame>>,
    logs: &'a SessionLogStore,
    threads: &'a Arc<ThreadRegistry>,
    inflight: Option<JoinHandle<Result<(), StoreError>>>,
}

impl ActiveRun<'_> {
    async fn relay(&mut self, event: AgentEvent) {
        event.log_progress(self.project);
        let frame = StreamFrame::new(self.state.last_seq() + 1, &event);
        let accepted = self.state.accept(event);

        if let (Some(token), Some(thread_id)) = (&accepted.new_token, self.thread_id) {
            store_token(self.threads, self.project, thread_id, token).await;
        }

        match frame {
            Ok(frame) => self.forward(frame).await,
            Err(err) => tracing::warn!(seq = accepted.seq, error = %err, "could not encode frame"),
        }

        self.maybe_flush().await;
    }

    async fn forward(&mut self, frame: StreamFrame) {
        let Some(tx) = &self.frames else {
            return;
        };
        if tx.send(frame).await.is_err() {
            tracing::info!(project = self.project, log_id = self.log_id, "subscriber disconnected; run continues");
            self.frames = None;
        }
    }

    /// Start a background flush when one is due and none is running.
    async fn maybe_flush(&mut self) {
        if !self.state.flush_due() {
            return;
        }
        if self.inflight.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!(log_id = self.log_id, "flush in flight; skipping");
            return;
        }
        self.settle_inflight().await;

        let snapshot = self.state.take_snapshot();
        tracing::debug!(log_id = self.log_id, events = snapshot.events.len(), "flushing progress");
        let logs = self.logs.clone();
        let (project, id) = (self.project.to_string(), self.log_id.to_string());
        self.inflight = Some(tokio::task::spawn_blocking(move || {
            logs.flush_progress(&project, &id, &snapshot)
        }));
    }

    /// Wait for the current flush, if any. Failures are logged only.
    async fn settle_inflight(&mut self) {
        let Some(task) = self.inflight.take() else {
            return;
        };
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(log_id = self.log_id, error = %err, "progress flush failed")
            }
            Err(err) => tracing::warn!(log_id = self.log_id, error = %err, "progress flush task failed"),
        }
    }
}

async fn store_token(threads: &Arc<ThreadRegistry>, project: &str, thread_id: &str, token: &str) {
    let threads = Arc::clone(threads);
    let (p, id, t) = (project.to_string(), thread_id.to_string(), token.to_string());
    if let Err(err) = blocking(move || threads.set_token(&p, &id, &t)).await {
        tracing::warn!(project, thread = thread_id, error = %err, "could not store resumption token");
    }
}

/// Forward agent stderr to diagnostics, line by line.
async fn drain_stderr(stderr: ChildStderr, project: String) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                tracing::debug!(target: AGENT_STDERR_TARGET, project = %project, "{line}")
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(target: AGENT_STDERR_TARGET, error = %err, "stderr read failed");
                break;
            }
        }
    }
}

/// Run a store operation on the blocking pool.
async fn blocking<T, F>(op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SetupError;
    use crate::store::SessionStatus;
    use crate::store::test_support::temp_root;
    use crate::supervisor::{spawn_supervised, AgentProcess};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::process::Command;

    const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"s1"}"#;
    const TOOL: &str = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"ls","input":{}}]}}"#;
    const TOOL_RESULT: &str = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"a.txt"}]}}"#;
    const DONE: &str = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Done."}]}}"#;
    const RESULT_OK: &str = r#"{"type":"result","is_error":false,"num_turns":2}"#;

    /// Runs a shell script in place of the container and records the
    /// options it was launched with.
    struct ShellLauncher {
        scripts: Mutex<Vec<String>>,
        seen: Mutex<Vec<RunOptions>>,
        launches: AtomicUsize,
    }

    impl ShellLauncher {
        fn new(scripts: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts),
                seen: Mutex::new(Vec::new()),
                launches: AtomicUsize::new(0),
            })
        }

        fn single(script: String) -> Arc<Self> {
            Self::new(vec![script])
        }
    }

    #[async_trait]
    impl AgentLauncher for ShellLauncher {
        async fn launch(
            &self,
            _project: &str,
            _prompt: &str,
            options: &RunOptions,
            cancel: Option<watch::Receiver<bool>>,
        ) -> Result<AgentProcess, SetupError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().expect("lock").push(options.clone());
            let script = self.scripts.lock().expect("lock").remove(0);
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            spawn_supervised(cmd, options.timeout, cancel)
        }
    }

    struct FailingLauncher;

    #[async_trait]
    impl AgentLauncher for FailingLauncher {
        async fn launch(
            &self,
            _project: &str,
            _prompt: &str,
            _options: &RunOptions,
            _cancel: Option<watch::Receiver<bool>>,
        ) -> Result<AgentProcess, SetupError> {
            Err(SetupError::MissingCredential("no token".into()))
        }
    }

    /// Shell script printing `lines` as NDJSON, then running `tail`.
    fn emit(lines: &[&str], tail: &str) -> String {
        let mut script = String::new();
        for line in lines {
            script.push_str(&format!("printf '%s\\n' '{line}'\n"));
        }
        script.push_str(tail);
        script
    }

    fn test_config(label: &str) -> Config {
        let mut config = Config::default();
        config.paths.root = temp_root(label);
        config
    }

    fn request(prompt: &str) -> RunRequest {
        RunRequest {
            project: "demo".into(),
            prompt: prompt.into(),
            ..RunRequest::default()
        }
    }

    async fn collect(mut rx: mpsc::Receiver<StreamFrame>) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn normal_run_relays_and_persists_everything() {
        let config = test_config("engine-normal");
        let launcher = ShellLauncher::single(emit(&[INIT, TOOL, TOOL_RESULT, DONE, RESULT_OK], ""));
        let engine = Engine::with_launcher(&config, launcher);

        let (tx, rx) = mpsc::channel(16);
        let collector = tokio::spawn(collect(rx));
        let summary = engine
            .run_streaming(request("list files"), tx, None)
            .await
            .expect("run");
        let frames = collector.await.expect("join");

        assert_eq!(frames.len(), 5);
        assert_eq!(
            frames.iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(
            frames.iter().map(|f| f.event.as_str()).collect::<Vec<_>>(),
            vec!["system", "assistant", "user", "assistant", "result"]
        );

        let log = engine
            .logs()
            .get("demo", &summary.log.id)
            .expect("get")
            .expect("present");
        assert_eq!(log.status, SessionStatus::Completed);
        assert_eq!(log.exit_code, 0);
        assert_eq!(log.assistant_text.as_deref(), Some("Done."));
        let events = log.events.expect("events");
        assert_eq!(events.len(), 5);
        let relayed: Vec<AgentEvent> = frames.iter().filter_map(StreamFrame::to_event).collect();
        assert_eq!(events, relayed);
        let response: serde_json::Value = serde_json::from_str(&log.response).expect("json");
        assert_eq!(response["num_turns"], 2);
        assert_eq!(summary.token.as_deref(), Some("s1"));
        assert!(summary.persist_warning.is_none());
        assert!(config.paths.project_workspace("demo").is_dir());
    }

    #[tokio::test]
    async fn timeout_keeps_prefix_and_appends_interrupted_result() {
        let config = test_config("engine-timeout");
        let launcher = ShellLauncher::single(emit(&[INIT, TOOL], "exec sleep 30\n"));
        let engine = Engine::with_launcher(&config, launcher);

        let mut req = request("list files");
        req.options.timeout = Some(Duration::from_millis(300));
        let (tx, rx) = mpsc::channel(16);
        let collector = tokio::spawn(collect(rx));
        let summary = engine.run_streaming(req, tx, None).await.expect("run");
        let frames = collector.await.expect("join");

        let log = engine
            .logs()
            .get("demo", &summary.log.id)
            .expect("get")
            .expect("present");
        assert_eq!(log.status, SessionStatus::Error);
        assert_eq!(log.exit_code, 1);
        let events = log.events.expect("events");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind(), "system");
        assert_eq!(events[1].kind(), "assistant");
        let result = events[2].as_result().expect("result");
        assert!(result.is_interrupted());
        assert!(result.is_error());
        assert_eq!(result.result.as_deref(), Some("timed out after 300ms"));

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].event, "result");
    }

    #[tokio::test]
    async fn cancel_stops_the_run() {
        let config = test_config("engine-cancel");
        let launcher = ShellLauncher::single(emit(&[INIT], "exec sleep 30\n"));
        let engine = Engine::with_launcher(&config, launcher);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel(16);
        let run = engine.run_streaming(request("hi"), tx, Some(cancel_rx));
        let abort = async {
            let first = rx.recv().await.expect("first frame");
            assert_eq!(first.event, "system");
            cancel_tx.send(true).expect("cancel");
            while rx.recv().await.is_some() {}
        };
        let (summary, ()) = tokio::join!(run, abort);
        let summary = summary.expect("run");
        assert_eq!(summary.log.status, SessionStatus::Error);
        let events = summary.log.events.expect("events");
        let last = events.last().and_then(AgentEvent::as_result).expect("result");
        assert_eq!(last.result.as_deref(), Some("aborted by caller"));
    }

    #[tokio::test]
    async fn error_result_marks_run_as_error() {
        let config = test_config("engine-error");
        let launcher = ShellLauncher::single(emit(
            &[INIT, r#"{"type":"result","is_error":true,"num_turns":1}"#],
            "",
        ));
        let engine = Engine::with_launcher(&config, launcher);
        let result = engine.run(request("hi")).await.expect("run");
        assert_eq!(result.exit_code, 1);
        let log = engine.logs().get("demo", &result.id).expect("get").expect("present");
        assert_eq!(log.status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn missing_result_is_an_error_even_with_exit_zero() {
        let config = test_config("engine-noresult");
        let launcher = ShellLauncher::single(emit(&[INIT, DONE], "echo 'not json' >&2\n"));
        let engine = Engine::with_launcher(&config, launcher);
        let result = engine.run(request("hi")).await.expect("run");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.response, "");
    }

    #[tokio::test]
    async fn noise_lines_are_skipped() {
        let config = test_config("engine-noise");
        let launcher = ShellLauncher::single(emit(&[INIT, "warning: not json", RESULT_OK], ""));
        let engine = Engine::with_launcher(&config, launcher);
        let result = engine.run(request("hi")).await.expect("run");
        assert_eq!(result.exit_code, 0);
        let log = engine.logs().get("demo", &result.id).expect("get").expect("present");
        assert_eq!(log.events.map(|e| e.len()), Some(2));
    }

    #[tokio::test]
    async fn launch_failure_closes_the_log_and_returns_error() {
        let config = test_config("engine-launchfail");
        let engine = Engine::with_launcher(&config, Arc::new(FailingLauncher));
        let err = engine.run(request("hi")).await.expect_err("fails");
        assert!(matches!(err, EngineError::Setup(SetupError::MissingCredential(_))));

        let ids = engine.logs().list("demo").expect("list");
        assert_eq!(ids.len(), 1);
        let log = engine.logs().get("demo", &ids[0]).expect("get").expect("present");
        assert_eq!(log.status, SessionStatus::Error);
        assert_eq!(log.exit_code, 1);
        assert!(log.response.contains("missing credential"));
        assert!(engine.logs().list_unfinished("demo").expect("unfinished").is_empty());
    }

    #[test]
    fn request_validation_needs_prompt_and_safe_project() {
        assert!(request("hi").validate().is_ok());
        assert!(matches!(
            request(" \n ").validate(),
            Err(EngineError::InvalidRequest(_))
        ));
        let mut bad_project = request("hi");
        bad_project.project = "a/b".into();
        assert!(matches!(
            bad_project.validate(),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_any_write() {
        let config = test_config("engine-invalid");
        let launcher = ShellLauncher::single(String::new());
        let engine = Engine::with_launcher(&config, launcher.clone());

        let err = engine.run(request("   ")).await.expect_err("empty prompt");
        assert!(matches!(err, EngineError::InvalidRequest(_)));

        let mut bad_project = request("hi");
        bad_project.project = "../x".into();
        assert!(matches!(
            engine.run(bad_project).await,
            Err(EngineError::InvalidRequest(_))
        ));

        let mut unknown_thread = request("hi");
        unknown_thread.thread_id = Some("thr_0".into());
        assert!(matches!(
            engine.run(unknown_thread).await,
            Err(EngineError::InvalidRequest(_))
        ));

        assert!(engine.logs().list("demo").expect("list").is_empty());
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn thread_runs_append_in_order_and_keep_last_token() {
        let config = test_config("engine-thread");
        let launcher = ShellLauncher::new(vec![
            emit(&[INIT, RESULT_OK], ""),
            emit(&[RESULT_OK], ""),
            emit(
                &[r#"{"type":"system","subtype":"init","session_id":"s3"}"#, RESULT_OK],
                "",
            ),
        ]);
        let engine = Engine::with_launcher(&config, launcher.clone());
        let thread = engine.threads().create("demo", "chat").expect("thread");

        let mut ids = Vec::new();
        for prompt in ["one", "two", "three"] {
            let mut req = request(prompt);
            req.thread_id = Some(thread.id.clone());
            ids.push(engine.run(req).await.expect("run").id);
        }

        let stored = engine
            .threads()
            .get("demo", &thread.id)
            .expect("get")
            .expect("present");
        assert_eq!(stored.log_ids, ids);
        assert_eq!(stored.session_id.as_deref(), Some("s3"));

        // Later runs resume with the thread's token.
        let seen = launcher.seen.lock().expect("lock");
        assert_eq!(seen[0].resume, None);
        assert_eq!(seen[1].resume.as_deref(), Some("s1"));
        assert_eq!(seen[2].resume.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn explicit_resume_wins_over_thread_token() {
        let config = test_config("engine-resume");
        let launcher = ShellLauncher::single(emit(&[RESULT_OK], ""));
        let engine = Engine::with_launcher(&config, launcher.clone());
        let thread = engine.threads().create("demo", "chat").expect("thread");
        engine
            .threads()
            .set_token("demo", &thread.id, "old")
            .expect("token");

        let mut req = request("hi");
        req.thread_id = Some(thread.id.clone());
        req.options.resume = Some("explicit".into());
        engine.run(req).await.expect("run");
        assert_eq!(
            launcher.seen.lock().expect("lock")[0].resume.as_deref(),
            Some("explicit")
        );
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_stop_persistence() {
        let config = test_config("engine-drop");
        let launcher = ShellLauncher::single(emit(&[INIT, TOOL, DONE, RESULT_OK], ""));
        let engine = Engine::with_launcher(&config, launcher);
        let thread = engine.threads().create("demo", "chat").expect("thread");

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut req = request("hi");
        req.thread_id = Some(thread.id.clone());
        let summary = engine.run_streaming(req, tx, None).await.expect("run");
        assert_eq!(summary.log.status, SessionStatus::Completed);
        assert_eq!(summary.log.events.as_ref().map(Vec::len), Some(4));
        let stored = engine
            .threads()
            .get("demo", &thread.id)
            .expect("get")
            .expect("present");
        assert_eq!(stored.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn progress_flushes_never_regress() {
        let mut config = test_config("engine-flush");
        config.persistence.flush_event_threshold = 3;
        let mut script = String::new();
        for i in 0..30 {
            script.push_str(&format!(
                "printf '%s\\n' '{{\"type\":\"assistant\",\"message\":{{\"content\":[{{\"type\":\"text\",\"text\":\"part {i}\"}}]}}}}'\n"
            ));
            if i % 5 == 4 {
                script.push_str("sleep 0.05\n");
            }
        }
        script.push_str(&format!("printf '%s\\n' '{RESULT_OK}'\n"));
        let launcher = ShellLauncher::single(script);
        let engine = Arc::new(Engine::with_launcher(&config, launcher));

        let (tx, rx) = mpsc::channel(64);
        let collector = tokio::spawn(collect(rx));
        let run = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run_streaming(request("count"), tx, None).await })
        };

        let mut observed: Vec<(usize, usize)> = Vec::new();
        while !run.is_finished() {
            if let Ok(ids) = engine.logs().list("demo") {
                if let Some(id) = ids.first() {
                    if let Ok(Some(log)) = engine.logs().get("demo", id) {
                        let events = log.events.as_ref().map_or(0, Vec::len);
                        let text = log.assistant_text.as_ref().map_or(0, String::len);
                        observed.push((events, text));
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let summary = run.await.expect("join").expect("run");
        collector.await.expect("join");

        for pair in observed.windows(2) {
            assert!(pair[0].0 <= pair[1].0, "event count regressed: {observed:?}");
            assert!(pair[0].1 <= pair[1].1, "text length regressed: {observed:?}");
        }
        assert_eq!(summary.log.status, SessionStatus::Completed);
        assert_eq!(summary.log.events.as_ref().map(Vec::len), Some(31));
        assert_eq!(summary.frames, 31);
    }
}
