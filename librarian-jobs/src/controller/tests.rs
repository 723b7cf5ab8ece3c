use super::*;
use crate::registry::RegistryEvent;
use crate::scheduler::ManualScheduler;
use async_trait::async_trait;
use librarian_client::ClientError;
use librarian_core::domain::job::{JobRecord, JobStatus};
use librarian_core::domain::module::Operation;
use librarian_core::dto::run::{RunResponse, RunStatus};
use librarian_core::dto::status::{CancelAck, StatusResponse};
use std::collections::VecDeque;

enum Reply<T> {
    Ok(T),
    Fail,
}

impl<T> Reply<T> {
    fn into_result(self) -> librarian_client::Result<T> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Fail => Err(ClientError::api_error(503, "unavailable")),
        }
    }
}

type Script<T> = Mutex<HashMap<ModuleId, VecDeque<Reply<T>>>>;

/// Transport double replaying scripted replies per module
///
/// Unscripted calls fall back to: status running, empty output, run
/// started, cancel acknowledged.
#[derive(Default)]
struct ScriptedTransport {
    status: Script<StatusResponse>,
    output: Script<OutputResponse>,
    run: Script<RunResponse>,
    calls: Mutex<Vec<(ModuleId, Operation)>>,
}

impl ScriptedTransport {
    fn push_status(&self, module: ModuleId, reply: Reply<StatusResponse>) {
        self.status.lock().unwrap().entry(module).or_default().push_back(reply);
    }

    fn push_output(&self, module: ModuleId, reply: Reply<OutputResponse>) {
        self.output.lock().unwrap().entry(module).or_default().push_back(reply);
    }

    fn push_run(&self, module: ModuleId, reply: Reply<RunResponse>) {
        self.run.lock().unwrap().entry(module).or_default().push_back(reply);
    }

    fn calls(&self, module: ModuleId, operation: Operation) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == (module, operation))
            .count()
    }

    fn record(&self, module: ModuleId, operation: Operation) {
        self.calls.lock().unwrap().push((module, operation));
    }

    fn next<T>(script: &Script<T>, module: ModuleId) -> Option<Reply<T>> {
        script.lock().unwrap().get_mut(&module)?.pop_front()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn check_status(&self, module: ModuleId) -> librarian_client::Result<StatusResponse> {
        self.record(module, Operation::Status);
        Self::next(&self.status, module)
            .unwrap_or_else(running)
            .into_result()
    }

    async fn get_output(&self, module: ModuleId) -> librarian_client::Result<OutputResponse> {
        self.record(module, Operation::Output);
        Self::next(&self.output, module)
            .unwrap_or_else(|| lines(&[]))
            .into_result()
    }

    async fn run_script(
        &self,
        module: ModuleId,
        _payload: &RunPayload,
    ) -> librarian_client::Result<RunResponse> {
        self.record(module, Operation::Run);
        Self::next(&self.run, module)
            .unwrap_or_else(|| run_reply(RunStatus::Started))
            .into_result()
    }

    async fn cancel_script(&self, module: ModuleId) -> librarian_client::Result<CancelAck> {
        if !module.supports_cancel() {
            return Err(ClientError::Unsupported {
                module,
                operation: Operation::Cancel,
            });
        }
        self.record(module, Operation::Cancel);
        Ok(CancelAck {
            status: "cancelled".to_string(),
        })
    }
}

fn running() -> Reply<StatusResponse> {
    Reply::Ok(StatusResponse {
        running: true,
        ..Default::default()
    })
}

fn stopped() -> Reply<StatusResponse> {
    Reply::Ok(StatusResponse::default())
}

fn lines(batch: &[&str]) -> Reply<OutputResponse> {
    Reply::Ok(OutputResponse {
        output: batch.iter().map(|line| line.to_string()).collect(),
        ..Default::default()
    })
}

fn run_reply(status: RunStatus) -> Reply<RunResponse> {
    Reply::Ok(RunResponse { status })
}

fn ms(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_millis).collect()
}

struct Harness {
    controller: Arc<JobController>,
    transport: Arc<ScriptedTransport>,
    scheduler: Arc<ManualScheduler>,
    events: Arc<Mutex<Vec<RegistryEvent>>>,
}

impl Harness {
    fn new() -> Self {
        let registry = Arc::new(JobRegistry::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        registry.subscribe(move |event: &RegistryEvent| {
            if let RegistryEvent::StateChanged { record, .. } = event {
                assert_eq!(
                    record.is_running,
                    record.status == JobStatus::Running,
                    "running flag out of sync with status: {:?}",
                    record
                );
            }
            sink.lock().unwrap().push(event.clone());
        });

        let transport = Arc::new(ScriptedTransport::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let controller = JobController::new(
            registry,
            transport.clone(),
            scheduler.clone(),
            ControllerConfig::default(),
        );

        Self {
            controller,
            transport,
            scheduler,
            events,
        }
    }

    fn state(&self, module: ModuleId) -> JobRecord {
        self.controller.registry().get_state(module)
    }

    fn logs(&self, module: ModuleId) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                RegistryEvent::Log(log) if log.module == module => Some(log.message.clone()),
                _ => None,
            })
            .collect()
    }

    async fn start(&self, module: ModuleId) {
        let payload = match module {
            ModuleId::DuplicateScan => RunPayload::duplicate_scan("/library"),
            ModuleId::Segmentation => RunPayload::segmentation("/library/pdfs", 10.0, 50),
            ModuleId::Sort => RunPayload::sort("/library/inbox"),
        };
        self.controller.start(module, payload).await.unwrap();
    }
}

#[tokio::test]
async fn test_rejected_run_sets_error_and_schedules_nothing() {
    let h = Harness::new();
    h.transport
        .push_run(ModuleId::Sort, run_reply(RunStatus::Other("busy".to_string())));

    h.start(ModuleId::Sort).await;

    let record = h.state(ModuleId::Sort);
    assert!(!record.is_running);
    assert_eq!(record.status, JobStatus::Error);
    assert_eq!(record.target_path, "/library/inbox");
    assert!(h.scheduler.pending().is_empty());
    assert!(h.controller.active_loops().is_empty());
    assert_eq!(
        h.logs(ModuleId::Sort),
        vec!["Failed to start sort: unexpected server response 'busy'"]
    );
}

#[tokio::test]
async fn test_run_transport_failure_sets_error() {
    let h = Harness::new();
    h.transport.push_run(ModuleId::DuplicateScan, Reply::Fail);

    h.start(ModuleId::DuplicateScan).await;

    let record = h.state(ModuleId::DuplicateScan);
    assert!(!record.is_running);
    assert_eq!(record.status, JobStatus::Error);
    assert!(h.scheduler.pending().is_empty());
    assert!(h.logs(ModuleId::DuplicateScan)[0].starts_with("Error starting duplicate_scan"));
}

#[tokio::test]
async fn test_invalid_payload_leaves_registry_untouched() {
    let h = Harness::new();

    let result = h
        .controller
        .start(ModuleId::Sort, RunPayload::sort("/library/../etc"))
        .await;

    assert!(matches!(result, Err(PayloadError::UnsafePath(_))));
    assert_eq!(h.state(ModuleId::Sort), JobRecord::default());
    assert_eq!(h.transport.calls(ModuleId::Sort, Operation::Run), 0);
    assert!(h.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_accepted_run_launches_both_loops() {
    let h = Harness::new();
    h.transport
        .push_run(ModuleId::Segmentation, run_reply(RunStatus::Running));

    h.start(ModuleId::Segmentation).await;

    let record = h.state(ModuleId::Segmentation);
    assert!(record.is_running);
    assert_eq!(record.target_path, "/library/pdfs");
    assert_eq!(
        h.controller.active_loops(),
        vec![
            LoopKey::status(ModuleId::Segmentation),
            LoopKey::output(ModuleId::Segmentation)
        ]
    );
    assert_eq!(h.scheduler.pending().len(), 2);
}

#[tokio::test]
async fn test_finished_job_gets_exactly_one_forced_flush() {
    let h = Harness::new();
    let module = ModuleId::DuplicateScan;
    h.transport.push_status(module, stopped());
    h.transport.push_output(module, lines(&["scan complete"]));

    h.start(module).await;
    assert_eq!(h.scheduler.run_next().await, Some(LoopKey::status(module)));

    let record = h.state(module);
    assert!(!record.is_running);
    assert_eq!(record.status, JobStatus::Finished);
    assert_eq!(h.transport.calls(module, Operation::Output), 1);
    assert_eq!(h.logs(module), vec!["scan complete"]);

    // The pending output iteration sees the stop and retires without a call
    h.scheduler.run_until_idle(10).await;
    assert_eq!(h.transport.calls(module, Operation::Output), 1);
    assert!(h.controller.active_loops().is_empty());
    assert!(h.scheduler.pending().is_empty());

    tokio::time::timeout(Duration::from_secs(1), h.controller.wait_until_idle(module))
        .await
        .expect("loops still active");
}

#[tokio::test]
async fn test_status_failures_back_off_exponentially() {
    let h = Harness::new();
    let module = ModuleId::Sort;
    let key = LoopKey::status(module);
    for _ in 0..5 {
        h.transport.push_status(module, Reply::Fail);
    }

    h.start(module).await;
    for _ in 0..5 {
        assert!(h.scheduler.run_next_for(key).await);
    }

    assert_eq!(
        h.scheduler.delays_for(key),
        ms(&[0, 2000, 4000, 8000, 10_000, 10_000])
    );
    let record = h.state(module);
    assert!(record.is_running);
    assert_eq!(record.status, JobStatus::Running);
    assert_eq!(record.consecutive_error_count, 5);

    // A successful poll clears the counter and restores the regular interval
    assert!(h.scheduler.run_next_for(key).await);
    assert_eq!(h.state(module).consecutive_error_count, 0);
    assert_eq!(h.scheduler.delays_for(key).last(), Some(&Duration::from_millis(2000)));
}

#[tokio::test]
async fn test_output_lines_keep_receipt_order() {
    let h = Harness::new();
    let module = ModuleId::DuplicateScan;
    let key = LoopKey::output(module);
    h.transport.push_output(module, lines(&["a", "b"]));
    h.transport.push_output(module, lines(&["c"]));

    h.start(module).await;
    assert!(h.scheduler.run_next_for(key).await);
    assert!(h.scheduler.run_next_for(key).await);

    assert_eq!(h.logs(module), vec!["a", "b", "c"]);
    assert_eq!(h.scheduler.delays_for(key), ms(&[0, 500, 500]));
}

#[tokio::test]
async fn test_output_failure_retries_at_fixed_interval() {
    let h = Harness::new();
    let module = ModuleId::Segmentation;
    let key = LoopKey::output(module);
    h.transport.push_output(module, Reply::Fail);
    h.transport.push_output(module, Reply::Fail);
    h.transport.push_output(module, lines(&["page 1"]));

    h.start(module).await;
    for _ in 0..3 {
        assert!(h.scheduler.run_next_for(key).await);
    }

    assert_eq!(h.scheduler.delays_for(key), ms(&[0, 5000, 5000, 500]));
    assert_eq!(h.state(module).consecutive_error_count, 0);
    assert!(h.state(module).is_running);
    assert_eq!(h.logs(module), vec!["page 1"]);
}

#[tokio::test]
async fn test_output_progress_is_forwarded() {
    let h = Harness::new();
    let module = ModuleId::DuplicateScan;
    h.transport.push_output(
        module,
        Reply::Ok(OutputResponse {
            output: vec!["checked foo.pdf".to_string()],
            files_checked: Some(5),
            total_files: Some(10),
        }),
    );

    h.start(module).await;
    assert!(h.scheduler.run_next_for(LoopKey::output(module)).await);

    let record = h.state(module);
    assert_eq!(record.files_checked, 5);
    assert_eq!(record.total_files, 10);
}

#[tokio::test]
async fn test_cancel_without_endpoint_sends_nothing() {
    let h = Harness::new();
    let module = ModuleId::Segmentation;
    h.start(module).await;

    let outcome = h.controller.cancel(module).await;

    assert_eq!(outcome, CancelOutcome::Unsupported);
    assert_eq!(h.transport.calls(module, Operation::Cancel), 0);
    assert!(h.state(module).is_running);
    assert_eq!(
        h.logs(module),
        vec!["Cancellation is not supported for segmentation"]
    );
}

#[tokio::test]
async fn test_cancel_when_idle_is_noop() {
    let h = Harness::new();

    let outcome = h.controller.cancel(ModuleId::DuplicateScan).await;

    assert_eq!(outcome, CancelOutcome::NotRunning);
    assert_eq!(h.transport.calls(ModuleId::DuplicateScan, Operation::Cancel), 0);
    assert!(h.logs(ModuleId::DuplicateScan).is_empty());
}

#[tokio::test]
async fn test_cancel_is_observed_through_status_loop() {
    let h = Harness::new();
    let module = ModuleId::DuplicateScan;
    h.start(module).await;

    assert_eq!(h.controller.cancel(module).await, CancelOutcome::Requested);
    assert_eq!(h.transport.calls(module, Operation::Cancel), 1);
    // Still running until the backend says otherwise
    assert!(h.state(module).is_running);

    h.transport.push_status(module, stopped());
    assert!(h.scheduler.run_next_for(LoopKey::status(module)).await);

    let record = h.state(module);
    assert!(!record.is_running);
    assert_eq!(record.status, JobStatus::UserCanceled);
}

#[tokio::test]
async fn test_modules_back_off_independently() {
    let h = Harness::new();
    let failing = LoopKey::status(ModuleId::DuplicateScan);
    let healthy = LoopKey::status(ModuleId::Sort);
    for _ in 0..3 {
        h.transport.push_status(ModuleId::DuplicateScan, Reply::Fail);
    }

    h.start(ModuleId::DuplicateScan).await;
    h.start(ModuleId::Sort).await;
    for _ in 0..3 {
        assert!(h.scheduler.run_next_for(failing).await);
        assert!(h.scheduler.run_next_for(healthy).await);
    }

    assert_eq!(h.scheduler.delays_for(failing), ms(&[0, 2000, 4000, 8000]));
    assert_eq!(h.scheduler.delays_for(healthy), ms(&[0, 2000, 2000, 2000]));
    assert_eq!(h.state(ModuleId::DuplicateScan).consecutive_error_count, 3);

    let sort = h.state(ModuleId::Sort);
    assert_eq!(sort.consecutive_error_count, 0);
    assert_eq!(sort.status, JobStatus::Running);
}

#[tokio::test]
async fn test_init_adopts_running_backend_job() {
    let h = Harness::new();
    h.transport.push_status(ModuleId::DuplicateScan, Reply::Fail);
    h.transport.push_status(
        ModuleId::Segmentation,
        Reply::Ok(StatusResponse {
            running: true,
            files_checked: Some(2),
            total_files: Some(8),
            log_file_path: None,
        }),
    );
    h.transport.push_status(ModuleId::Sort, stopped());

    let adopted = h.controller.init().await;

    assert_eq!(adopted, vec![ModuleId::Segmentation]);
    let record = h.state(ModuleId::Segmentation);
    assert!(record.is_running);
    assert_eq!(record.status, JobStatus::Running);
    assert_eq!(record.files_checked, 2);
    assert_eq!(
        h.controller.active_loops(),
        vec![
            LoopKey::status(ModuleId::Segmentation),
            LoopKey::output(ModuleId::Segmentation)
        ]
    );
    assert_eq!(h.state(ModuleId::DuplicateScan), JobRecord::default());
    assert_eq!(h.state(ModuleId::Sort), JobRecord::default());
    for module in ModuleId::ALL {
        assert_eq!(h.transport.calls(module, Operation::Run), 0);
        assert_eq!(h.transport.calls(module, Operation::Status), 1);
    }
}

#[tokio::test]
async fn test_external_stop_ends_loops_without_calls() {
    let h = Harness::new();
    let module = ModuleId::Sort;
    h.start(module).await;

    h.controller
        .registry()
        .set_stopped(module, FinalStatus::Finished);
    h.scheduler.run_until_idle(10).await;

    assert_eq!(h.transport.calls(module, Operation::Status), 0);
    assert_eq!(h.transport.calls(module, Operation::Output), 0);
    assert!(!h.controller.is_polling(module));
}

#[tokio::test]
async fn test_relaunch_replaces_existing_loops() {
    let h = Harness::new();
    let module = ModuleId::Sort;

    h.start(module).await;
    h.start(module).await;
    assert_eq!(h.scheduler.pending().len(), 2);

    h.scheduler.run_until_idle(6).await;
    assert_eq!(h.scheduler.pending().len(), 2);
    assert_eq!(h.controller.active_loops().len(), 2);
}

#[tokio::test]
async fn test_shutdown_aborts_pending_iterations() {
    let h = Harness::new();
    h.start(ModuleId::DuplicateScan).await;
    h.start(ModuleId::Sort).await;

    h.controller.shutdown();

    assert!(h.controller.active_loops().is_empty());
    assert!(h.scheduler.pending().is_empty());
    assert_eq!(h.scheduler.run_until_idle(10).await, 0);
}

#[tokio::test]
async fn test_log_file_hint_follows_final_flush() {
    let h = Harness::new();
    let module = ModuleId::DuplicateScan;
    h.transport.push_status(
        module,
        Reply::Ok(StatusResponse {
            running: false,
            log_file_path: Some("/library/_duplicate_log.txt".to_string()),
            ..Default::default()
        }),
    );
    h.transport.push_output(module, lines(&["done"]));

    h.start(module).await;
    assert!(h.scheduler.run_next_for(LoopKey::status(module)).await);

    assert_eq!(
        h.logs(module),
        vec!["done", "Log written to /library/_duplicate_log.txt"]
    );
}
