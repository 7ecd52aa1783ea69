use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use phasedag::checkpoint::FileSnapshot;
use phasedag::engine::{ApprovalGate, BoxFuture, PhaseRunner, SnapshotSource};
use phasedag::errors::Result;
use phasedag::plan::{PhaseReport, TaskPhase, TaskPlan};

/// What the fake runner does for one attempt of a phase.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(String),
    /// Never finishes; only a timeout gets the phase out.
    Hang,
}

/// A fake phase runner that:
/// - records which phases were started, in order
/// - plays back a per-phase script of outcomes (default: succeed)
/// - tracks the highest number of attempts running at once.
#[derive(Default)]
pub struct FakePhaseRunner {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    delay: Duration,
    executed: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakePhaseRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt sleeps this long before reporting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Outcomes for successive attempts of `phase_id`.
    pub fn script(self, phase_id: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(phase_id.to_string(), steps.into_iter().collect());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn attempts(&self, phase_id: &str) -> usize {
        self.executed().iter().filter(|id| *id == phase_id).count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PhaseRunner for FakePhaseRunner {
    fn run_phase(&self, _plan_id: &str, phase: TaskPhase) -> BoxFuture<'static, PhaseReport> {
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&phase.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Succeed);
        self.executed.lock().unwrap().push(phase.id.clone());

        let delay = self.delay;
        let running = Arc::clone(&self.running);
        let peak = Arc::clone(&self.peak);

        Box::pin(async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            let _guard = RunningGuard(running);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match step {
                Step::Succeed => PhaseReport::success()
                    .with_tokens(10)
                    .with_files([format!("src/{}.rs", phase.id)]),
                Step::Fail(msg) => PhaseReport::failure(msg),
                Step::Hang => std::future::pending::<PhaseReport>().await,
            }
        })
    }
}

/// Approval gate that records every request and denies a fixed set.
#[derive(Default)]
pub struct RecordingApprovalGate {
    deny: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl RecordingApprovalGate {
    pub fn approving() -> Self {
        Self::default()
    }

    pub fn denying(ids: &[&str]) -> Self {
        Self {
            deny: ids.iter().map(|s| s.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl ApprovalGate for RecordingApprovalGate {
    fn request_approval<'a>(&'a self, phase: &'a TaskPhase) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(phase.id.clone());
            !self.deny.contains(&phase.id)
        })
    }
}

/// Snapshot source returning one in-memory file named after the phase.
#[derive(Default)]
pub struct StaticSnapshotSource;

impl SnapshotSource for StaticSnapshotSource {
    fn snapshot<'a>(
        &'a self,
        plan: &'a TaskPlan,
        phase: Option<&'a TaskPhase>,
    ) -> BoxFuture<'a, Result<Vec<FileSnapshot>>> {
        Box::pin(async move {
            let name = phase.map(|p| p.id.as_str()).unwrap_or("plan");
            Ok(vec![FileSnapshot::new(
                format!("{name}.txt"),
                format!("state of {} before {name}", plan.id),
            )])
        })
    }
}
