use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::{ActionHandler, ActionKind, FlexibleAction, Required, Validator, ValidationErrors};
use crate::binding::{ListenerKind, UiEvent};
use crate::config::DispatcherConfig;
use crate::context::Context;
use crate::core::{Dispatcher, ErrorSink, InvocationOutcome};
use crate::error::{ActionError, DispatchError, TaskError};
use crate::events::EventKind;
use crate::tasks::{CompletionSignal, PendingTask, TaskContext, TaskInfo, TaskKind, TaskUnit, TimerTask};

type Journal = Arc<Mutex<Vec<String>>>;

fn note(journal: &Journal, entry: impl Into<String>) {
    journal.lock().unwrap().push(entry.into());
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

fn count(journal: &Journal, entry: &str) -> usize {
    entries(journal).iter().filter(|e| *e == entry).count()
}

fn position(journal: &Journal, entry: &str) -> usize {
    entries(journal)
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} missing from {:?}", entries(journal)))
}

#[derive(Default)]
struct Collect(Mutex<Vec<&'static str>>);

impl Collect {
    fn labels(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

impl ErrorSink for Collect {
    fn trap(&self, error: &DispatchError, _invocation: Option<u64>) {
        self.0.lock().unwrap().push(error.as_label());
    }
}

fn dispatcher(sink: &Arc<Collect>) -> Dispatcher {
    dispatcher_with(sink, DispatcherConfig::default())
}

fn dispatcher_with(sink: &Arc<Collect>, cfg: DispatcherConfig) -> Dispatcher {
    Dispatcher::builder(cfg)
        .with_error_sink(sink.clone())
        .build()
        .unwrap()
}

#[derive(Clone, Copy)]
enum Script {
    Succeed,
    Fail,
    Panic,
    Decline,
    Repeat(usize),
    AwaitCancel,
}

struct Scripted {
    script: Script,
    delay: Duration,
    journal: Journal,
    label: String,
}

#[async_trait]
impl TaskUnit for Scripted {
    async fn preproc(&mut self, _cx: &TaskContext) -> Result<bool, TaskError> {
        Ok(!matches!(self.script, Script::Decline))
    }

    async fn mainproc(&mut self, cx: &TaskContext) -> Result<(), TaskError> {
        self.label = cx.info().name.to_string();
        note(&self.journal, format!("start:{}", self.label));
        tokio::time::sleep(self.delay).await;
        match self.script {
            Script::Fail => Err(TaskError::fail("boom")),
            Script::Panic => panic!("kaboom"),
            Script::Repeat(n) => {
                for _ in 0..n {
                    cx.success(None);
                }
                Ok(())
            }
            Script::AwaitCancel => {
                cx.token().cancelled().await;
                tokio::time::sleep(Duration::from_millis(30)).await;
                Err(TaskError::Canceled)
            }
            Script::Succeed | Script::Decline => Ok(()),
        }
    }

    async fn postproc(&mut self, cx: &TaskContext) -> Result<(), TaskError> {
        if !matches!(self.script, Script::Repeat(_)) {
            cx.success(None);
        }
        cx.finished();
        Ok(())
    }

    fn done(&mut self) {
        note(&self.journal, format!("done:{}", self.label));
    }
}

fn task(name: &'static str, script: Script, delay_ms: u64, journal: &Journal) -> TaskKind {
    let journal = journal.clone();
    TaskKind::new(name, move || Scripted {
        script,
        delay: Duration::from_millis(delay_ms),
        journal: journal.clone(),
        label: String::new(),
    })
}

#[derive(Clone, Default)]
struct Plan {
    kinds: Vec<TaskKind>,
    no_wait: bool,
    suppress_failures: bool,
    decline: Option<usize>,
    skip: Option<usize>,
}

struct Recorder {
    plan: Plan,
    journal: Journal,
}

fn describe(prev: Option<&CompletionSignal>) -> String {
    match prev {
        Some(s) => format!("{}#{:?}#{}", s.task.index, s.kind, s.success_count),
        None => "-".to_string(),
    }
}

impl ActionHandler for Recorder {
    fn reserve_tasks(&mut self, _ctx: &mut Context) -> Result<Vec<TaskKind>, ActionError> {
        Ok(self.plan.kinds.clone())
    }

    fn sequential_wait(&mut self, _ctx: &Context) -> Result<bool, ActionError> {
        Ok(!self.plan.no_wait)
    }

    fn before_task(
        &mut self,
        _ctx: &Context,
        index: usize,
        prev: Option<&CompletionSignal>,
        next: Option<&mut PendingTask>,
    ) -> Result<bool, ActionError> {
        let Some(next) = next else {
            note(&self.journal, format!("end:{index}"));
            return Ok(true);
        };
        note(&self.journal, format!("before:{index}:{}", describe(prev)));
        if self.plan.skip == Some(index) {
            next.set_skip(true);
        }
        Ok(self.plan.decline != Some(index))
    }

    fn on_task_success(&mut self, _ctx: &Context, index: usize, signal: &CompletionSignal) -> Result<(), ActionError> {
        note(&self.journal, format!("success:{index}:{}", signal.success_count));
        Ok(())
    }

    fn on_task_failure(&mut self, _ctx: &Context, index: usize, _task: &TaskInfo, error: TaskError) -> Option<TaskError> {
        note(&self.journal, format!("failure:{index}:{}", error.as_label()));
        if self.plan.suppress_failures { None } else { Some(error) }
    }

    fn on_all_tasks_done(&mut self, _ctx: &Context) -> Result<(), ActionError> {
        note(&self.journal, "all_done");
        Ok(())
    }

    fn on_invocation_done(&mut self, _ctx: &Context) -> Result<(), ActionError> {
        note(&self.journal, "invocation_done");
        Ok(())
    }
}

fn recorder(plan: Plan, journal: &Journal) -> ActionKind {
    let journal = journal.clone();
    ActionKind::new("recorder", move |_| Recorder {
        plan: plan.clone(),
        journal: journal.clone(),
    })
}

#[tokio::test]
async fn test_zero_tasks_substitutes_one_noop() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();

    let report = d.invoke(&recorder(Plan::default(), &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert_eq!(report.reserved, 1);
    assert_eq!(count(&journal, "before:0:-"), 1);
    assert_eq!(count(&journal, "success:0:1"), 1);
    assert_eq!(count(&journal, "end:1"), 1);
    assert_eq!(count(&journal, "all_done"), 1);
    assert_eq!(count(&journal, "invocation_done"), 1);
    assert!(sink.labels().is_empty());
}

#[tokio::test]
async fn test_sequential_starts_next_after_first_outcome() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![
            task("a", Script::Succeed, 30, &journal),
            task("b", Script::Succeed, 0, &journal),
            task("c", Script::Succeed, 0, &journal),
        ],
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(position(&journal, "success:0:1") < position(&journal, "start:b"));
    assert!(position(&journal, "success:1:1") < position(&journal, "start:c"));
    assert_eq!(count(&journal, "before:1:0#Success#1"), 1);
    assert_eq!(count(&journal, "before:2:1#Success#1"), 1);
    assert_eq!(count(&journal, "end:3"), 1);
    assert_eq!(count(&journal, "all_done"), 1);
}

#[tokio::test]
async fn test_sequential_failure_does_not_stop_remaining_tasks() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![
            task("a", Script::Succeed, 0, &journal),
            task("b", Script::Fail, 0, &journal),
            task("c", Script::Succeed, 0, &journal),
        ],
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(position(&journal, "failure:1:task_failed") < position(&journal, "start:c"));
    assert_eq!(count(&journal, "before:2:1#Failure#0"), 1);
    assert_eq!(count(&journal, "all_done"), 1);
    assert_eq!(sink.labels(), vec!["dispatch_task"]);
    assert_eq!(report.trapped, 1);
}

#[tokio::test]
async fn test_suppressed_failure_never_reaches_sink() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![task("a", Script::Fail, 0, &journal)],
        suppress_failures: true,
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert_eq!(count(&journal, "failure:0:task_failed"), 1);
    assert!(sink.labels().is_empty());
}

#[tokio::test]
async fn test_panicking_task_is_reported_as_failure() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![task("a", Script::Panic, 0, &journal)],
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert_eq!(count(&journal, "failure:0:task_panicked"), 1);
    assert_eq!(count(&journal, "all_done"), 1);
}

#[tokio::test]
async fn test_preproc_false_finishes_without_outcome() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![task("a", Script::Decline, 0, &journal)],
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(entries(&journal)
        .iter()
        .all(|e| !e.starts_with("success") && !e.starts_with("failure") && !e.starts_with("start")));
    assert_eq!(count(&journal, "all_done"), 1);
}

#[tokio::test]
async fn test_repeated_success_advances_once() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![
            task("stream", Script::Repeat(3), 0, &journal),
            task("b", Script::Succeed, 10, &journal),
        ],
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert_eq!(count(&journal, "success:0:1"), 1);
    assert_eq!(count(&journal, "success:0:2"), 1);
    assert_eq!(count(&journal, "success:0:3"), 1);
    assert_eq!(count(&journal, "start:b"), 1);
    assert_eq!(count(&journal, "before:1:0#Success#1"), 1);
    assert_eq!(count(&journal, "all_done"), 1);
}

#[tokio::test]
async fn test_no_wait_tolerates_out_of_order_completion() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![
            task("slow", Script::Succeed, 50, &journal),
            task("fast", Script::Succeed, 0, &journal),
        ],
        no_wait: true,
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert_eq!(count(&journal, "before:0:-"), 1);
    assert_eq!(count(&journal, "before:1:-"), 1);
    assert_eq!(count(&journal, "end:2"), 1);
    assert!(position(&journal, "start:fast") < position(&journal, "success:0:1"));
    assert!(position(&journal, "success:1:1") < position(&journal, "success:0:1"));
    assert_eq!(count(&journal, "all_done"), 1);
    assert_eq!(count(&journal, "invocation_done"), 1);
}

#[tokio::test]
async fn test_declined_and_skipped_tasks_still_count_as_finished() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![
            task("a", Script::Succeed, 0, &journal),
            task("b", Script::Succeed, 0, &journal),
            task("c", Script::Succeed, 0, &journal),
        ],
        decline: Some(1),
        skip: Some(2),
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert_eq!(report.reserved, 3);
    assert_eq!(count(&journal, "start:a"), 1);
    assert_eq!(count(&journal, "start:b"), 0);
    assert_eq!(count(&journal, "start:c"), 0);
    // A task cancelled before start hands no signal to its successor.
    assert_eq!(count(&journal, "before:2:-"), 1);
    assert_eq!(count(&journal, "end:3"), 1);
    assert_eq!(count(&journal, "all_done"), 1);
}

#[tokio::test]
async fn test_done_runs_after_completion_hooks() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![
            task("a", Script::Succeed, 0, &journal),
            task("b", Script::Succeed, 0, &journal),
        ],
        no_wait: true,
        ..Plan::default()
    };

    d.invoke(&recorder(plan, &journal), Context::new()).await;

    let last_hook = position(&journal, "invocation_done");
    assert!(position(&journal, "all_done") < last_hook);
    assert!(last_hook < position(&journal, "done:a"));
    assert!(last_hook < position(&journal, "done:b"));
}

#[tokio::test]
async fn test_interrupted_sync_wait_is_trapped() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![
            task("blocking", Script::AwaitCancel, 0, &journal),
            task("b", Script::Succeed, 0, &journal),
        ],
        ..Plan::default()
    };

    let handle = d.spawn_invoke(&recorder(plan, &journal), Context::new());
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.outcome, InvocationOutcome::Incomplete);
    assert!(sink.labels().contains(&"dispatch_interrupted"));
    assert_eq!(count(&journal, "start:b"), 0);
    assert_eq!(count(&journal, "all_done"), 0);
}

#[tokio::test]
async fn test_tolerated_interrupt_keeps_waiting() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![
            task("blocking", Script::AwaitCancel, 0, &journal),
            task("b", Script::Succeed, 0, &journal),
        ],
        suppress_failures: true,
        ..Plan::default()
    };

    let ctx = Context::new().with_tolerate_interrupt(true);
    let handle = d.spawn_invoke(&recorder(plan, &journal), ctx);
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();
    let report = handle.join().await.unwrap();

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(sink.labels().is_empty());
    assert_eq!(count(&journal, "failure:0:task_canceled"), 1);
    assert_eq!(count(&journal, "start:b"), 1);
}

#[tokio::test]
async fn test_worker_limit_serializes_no_wait_tasks() {
    struct Gauge {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TaskUnit for Gauge {
        async fn mainproc(&mut self, _cx: &TaskContext) -> Result<(), TaskError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let sink = Arc::new(Collect::default());
    let cfg = DispatcherConfig {
        max_concurrent_tasks: 1,
        ..DispatcherConfig::default()
    };
    let d = dispatcher_with(&sink, cfg);
    let (active, peak) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let gauge = {
        let (active, peak) = (active.clone(), peak.clone());
        TaskKind::new("gauge", move || Gauge {
            active: active.clone(),
            peak: peak.clone(),
        })
    };
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![gauge.clone(), gauge.clone(), gauge],
        no_wait: true,
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(count(&journal, "success:2:1"), 1);
}

#[derive(Clone, Copy, PartialEq)]
enum Gate {
    Refuse,
    Invalid,
    Error,
    Swallow,
    Panic,
}

struct Gated {
    gate: Gate,
    journal: Journal,
}

impl ActionHandler for Gated {
    fn prepare(&mut self, _ctx: &mut Context) -> Result<bool, ActionError> {
        match self.gate {
            Gate::Refuse => Ok(false),
            Gate::Error | Gate::Swallow => Err(ActionError::fail("not ready")),
            Gate::Panic => panic!("prepare exploded"),
            Gate::Invalid => Ok(true),
        }
    }

    fn validators(&mut self, _ctx: &Context) -> Vec<Box<dyn Validator>> {
        vec![Box::new(Required::new("customer"))]
    }

    fn on_validation_fault(&mut self, _ctx: &Context, errors: &ValidationErrors) -> Result<(), ActionError> {
        note(&self.journal, format!("fault:{}", errors.len()));
        Ok(())
    }

    fn reserve_tasks(&mut self, _ctx: &mut Context) -> Result<Vec<TaskKind>, ActionError> {
        note(&self.journal, "reserved");
        Ok(Vec::new())
    }

    fn trap(&mut self, err: ActionError) -> Option<ActionError> {
        if self.gate == Gate::Swallow { None } else { Some(err) }
    }
}

async fn run_gate(gate: Gate) -> (InvocationOutcome, Vec<&'static str>, Journal) {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let j = journal.clone();
    let kind = ActionKind::new("gated", move |_| Gated {
        gate,
        journal: j.clone(),
    });
    let report = d.invoke(&kind, Context::new()).await;
    (report.outcome, sink.labels(), journal)
}

#[tokio::test]
async fn test_preparation_outcomes() {
    let (outcome, labels, journal) = run_gate(Gate::Refuse).await;
    assert_eq!(outcome, InvocationOutcome::Aborted);
    assert!(labels.is_empty());
    assert!(entries(&journal).is_empty());

    let (outcome, labels, journal) = run_gate(Gate::Invalid).await;
    assert_eq!(outcome, InvocationOutcome::Aborted);
    assert!(labels.is_empty());
    assert_eq!(entries(&journal), vec!["fault:1".to_string()]);

    let (outcome, labels, _) = run_gate(Gate::Error).await;
    assert_eq!(outcome, InvocationOutcome::Failed);
    assert_eq!(labels, vec!["dispatch_action"]);

    let (outcome, labels, _) = run_gate(Gate::Swallow).await;
    assert_eq!(outcome, InvocationOutcome::Aborted);
    assert!(labels.is_empty());

    let (outcome, labels, _) = run_gate(Gate::Panic).await;
    assert_eq!(outcome, InvocationOutcome::Failed);
    assert_eq!(labels, vec!["dispatch_panicked"]);
}

#[tokio::test]
async fn test_flexible_action_runs_body_only() {
    struct Touch(Journal);
    impl FlexibleAction for Touch {
        fn execute(&mut self, ctx: &mut Context) -> Result<(), ActionError> {
            note(&self.0, format!("touch:{}", ctx.target().unwrap_or("-")));
            Ok(())
        }
    }

    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let j = journal.clone();
    let kind = ActionKind::flexible("touch", move || Touch(j.clone()));

    let report = d.invoke(&kind, Context::new().with_target("grid")).await;

    assert_eq!(report.outcome, InvocationOutcome::Aborted);
    assert_eq!(entries(&journal), vec!["touch:grid".to_string()]);
}

#[tokio::test]
async fn test_events_bracket_the_invocation() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let mut rx = d.bus().subscribe();
    let journal = Journal::default();

    let report = d.invoke(&recorder(Plan::default(), &journal), Context::new()).await;

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        assert_eq!(ev.invocation, Some(report.id));
        kinds.push(ev.kind);
    }
    assert_eq!(kinds.first(), Some(&EventKind::InvocationStarted));
    assert_eq!(kinds.last(), Some(&EventKind::InvocationFinalized));
    for kind in [
        EventKind::TaskStarting,
        EventKind::TaskSucceeded,
        EventKind::TaskFinished,
        EventKind::InvocationCompleted,
    ] {
        assert!(kinds.contains(&kind), "{kind:?} missing from {kinds:?}");
    }
}

#[tokio::test]
async fn test_finalizer_sees_every_outcome() {
    let seen: Arc<Mutex<Vec<InvocationOutcome>>> = Arc::default();
    let s = seen.clone();
    let d = Dispatcher::builder(DispatcherConfig::default())
        .with_finalizer(move |report| s.lock().unwrap().push(report.outcome))
        .build()
        .unwrap();
    let journal = Journal::default();

    d.invoke(&recorder(Plan::default(), &journal), Context::new()).await;
    let j = journal.clone();
    let refuse = ActionKind::new("refuse", move |_| Gated {
        gate: Gate::Refuse,
        journal: j.clone(),
    });
    d.invoke(&refuse, Context::new()).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![InvocationOutcome::Completed, InvocationOutcome::Aborted]
    );
}

#[derive(Default)]
struct BrokenInit;

#[async_trait]
impl TaskUnit for BrokenInit {
    fn init(&mut self, _ctx: &Context) {
        panic!("init blew up");
    }

    async fn mainproc(&mut self, _cx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_panicking_task_creation_is_trapped_and_finalized() {
    let broken_factory = TaskKind::new("broken_factory", || -> BrokenInit { panic!("factory blew up") });
    for (no_wait, broken) in [(false, TaskKind::of::<BrokenInit>()), (true, broken_factory)] {
        let sink = Arc::new(Collect::default());
        let seen: Arc<Mutex<Vec<InvocationOutcome>>> = Arc::default();
        let s = seen.clone();
        let d = Dispatcher::builder(DispatcherConfig::default())
            .with_error_sink(sink.clone())
            .with_finalizer(move |report| s.lock().unwrap().push(report.outcome))
            .build()
            .unwrap();
        let mut rx = d.bus().subscribe();
        let journal = Journal::default();
        let plan = Plan {
            kinds: vec![task("a", Script::Succeed, 0, &journal), broken, task("c", Script::Succeed, 0, &journal)],
            no_wait,
            ..Plan::default()
        };

        let report = d
            .spawn_invoke(&recorder(plan, &journal), Context::new())
            .join()
            .await
            .expect("driver must not unwind");

        assert_eq!(report.outcome, InvocationOutcome::Incomplete);
        assert_eq!(report.trapped, 1);
        assert_eq!(sink.labels(), vec!["dispatch_panicked"]);
        assert_eq!(*seen.lock().unwrap(), vec![InvocationOutcome::Incomplete]);
        assert_eq!(count(&journal, "start:c"), 0);
        assert_eq!(count(&journal, "all_done"), 0);

        let mut finalized = false;
        while let Ok(ev) = rx.try_recv() {
            finalized |= ev.kind == EventKind::InvocationFinalized;
        }
        assert!(finalized);
    }
}

struct Blocking {
    delay: Duration,
    journal: Journal,
}

#[async_trait]
impl TaskUnit for Blocking {
    fn runs_async(&self) -> Option<bool> {
        Some(false)
    }

    async fn mainproc(&mut self, cx: &TaskContext) -> Result<(), TaskError> {
        note(&self.journal, format!("start:{}", cx.info().name));
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[tokio::test]
async fn test_no_wait_waits_for_unit_declared_synchronous() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let j = journal.clone();
    let plan = Plan {
        kinds: vec![
            TaskKind::new("blocking", move || Blocking {
                delay: Duration::from_millis(40),
                journal: j.clone(),
            }),
            task("fast", Script::Succeed, 0, &journal),
        ],
        no_wait: true,
        ..Plan::default()
    };

    let report = d.invoke(&recorder(plan, &journal), Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(position(&journal, "success:0:1") < position(&journal, "start:fast"));
    assert_eq!(count(&journal, "before:1:-"), 1);
    assert_eq!(count(&journal, "all_done"), 1);
}

#[tokio::test]
async fn test_duplicate_event_from_busy_source_is_suppressed() {
    let sink = Arc::new(Collect::default());
    let journal = Journal::default();
    let plan = Plan {
        kinds: vec![task("slow", Script::Succeed, 50, &journal)],
        ..Plan::default()
    };
    let action = recorder(plan, &journal);
    let d = Dispatcher::builder(DispatcherConfig::default())
        .with_error_sink(sink.clone())
        .with_bindings(|r| {
            r.bind("save", ListenerKind::Action, "click", action);
        })
        .build()
        .unwrap();
    let mut rx = d.bus().subscribe();
    let click = || UiEvent::new("save", ListenerKind::Action, "click");

    let first = d.handle_event(click()).unwrap();
    assert!(d.handle_event(click()).is_none());
    assert!(d.is_source_busy("save"));
    let report = first.join().await.unwrap();
    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(!d.is_source_busy("save"));

    let again = d.handle_event(click()).unwrap();
    again.join().await.unwrap();

    let mut suppressed = 0;
    while let Ok(ev) = rx.try_recv() {
        if ev.kind == EventKind::DuplicateSuppressed {
            suppressed += 1;
            assert_eq!(ev.reason.as_deref(), Some("save"));
        }
    }
    assert_eq!(suppressed, 1);
    assert_eq!(count(&journal, "all_done"), 2);
}

#[tokio::test]
async fn test_unbound_event_goes_to_sink() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);

    let handle = d.handle_event(UiEvent::new("nowhere", ListenerKind::Key, "pressed"));

    assert!(handle.is_none());
    assert_eq!(sink.labels(), vec!["dispatch_unbound"]);
}

struct StartTimer {
    id: &'static str,
    stop_after: Option<Duration>,
    interval: Option<ActionKind>,
    journal: Journal,
}

impl ActionHandler for StartTimer {
    fn reserve_tasks(&mut self, _ctx: &mut Context) -> Result<Vec<TaskKind>, ActionError> {
        Ok(vec![TaskKind::of::<TimerTask>()])
    }

    fn sequential_wait(&mut self, _ctx: &Context) -> Result<bool, ActionError> {
        Ok(false)
    }

    fn before_task(
        &mut self,
        _ctx: &Context,
        _index: usize,
        _prev: Option<&CompletionSignal>,
        next: Option<&mut PendingTask>,
    ) -> Result<bool, ActionError> {
        if let Some(timer) = next.and_then(|p| p.unit_mut::<TimerTask>()) {
            timer.timer_id = self.id.to_string();
            timer.initial_delay = Duration::from_millis(10);
            timer.period = Duration::from_millis(10);
            timer.stop_after = self.stop_after;
            timer.interval_action = self.interval.clone();
        }
        Ok(true)
    }

    fn on_task_success(&mut self, _ctx: &Context, _index: usize, _signal: &CompletionSignal) -> Result<(), ActionError> {
        note(&self.journal, "tick");
        Ok(())
    }

    fn on_task_failure(&mut self, _ctx: &Context, _index: usize, _task: &TaskInfo, error: TaskError) -> Option<TaskError> {
        note(&self.journal, format!("failure:{}", error.as_label()));
        None
    }
}

fn start_timer(id: &'static str, stop_after: Option<Duration>, interval: Option<ActionKind>, journal: &Journal) -> ActionKind {
    let journal = journal.clone();
    ActionKind::new("start-timer", move |_| StartTimer {
        id,
        stop_after,
        interval: interval.clone(),
        journal: journal.clone(),
    })
}

#[tokio::test(start_paused = true)]
async fn test_timer_ticks_until_deadline() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();

    let action = start_timer("poll", Some(Duration::from_millis(45)), None, &journal);
    let report = d.invoke(&action, Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(count(&journal, "tick") >= 2);
    assert!(!d.timers().is_running("poll"));
}

#[tokio::test(start_paused = true)]
async fn test_timer_rejects_duplicate_id_and_stops_on_request() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();

    let first = d.spawn_invoke(&start_timer("poll", None, None, &journal), Context::new());
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert!(d.timers().is_running("poll"));

    let second = d.invoke(&start_timer("poll", None, None, &journal), Context::new()).await;
    assert_eq!(second.outcome, InvocationOutcome::Completed);
    assert_eq!(count(&journal, "failure:task_rejected"), 1);

    assert!(d.timers().stop("poll"));
    let report = first.join().await.unwrap();
    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(!d.timers().is_running("poll"));
}

#[tokio::test(start_paused = true)]
async fn test_timer_invokes_interval_action() {
    struct Bump(Arc<AtomicUsize>);
    impl FlexibleAction for Bump {
        fn execute(&mut self, ctx: &mut Context) -> Result<(), ActionError> {
            assert!(ctx.tolerate_interrupt_on_sync_wait());
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    let journal = Journal::default();
    let bumps = Arc::new(AtomicUsize::new(0));
    let b = bumps.clone();
    let interval = ActionKind::flexible("bump", move || Bump(b.clone()));

    let action = start_timer("refresh", Some(Duration::from_millis(45)), Some(interval), &journal);
    let report = d.invoke(&action, Context::new()).await;

    assert_eq!(report.outcome, InvocationOutcome::Completed);
    assert!(bumps.load(Ordering::SeqCst) >= 2);
    // Ticks with an interval action do not emit Success.
    assert_eq!(count(&journal, "tick"), 0);
}

#[test]
fn test_build_outside_runtime_fails() {
    let res = Dispatcher::builder(DispatcherConfig::default()).build();
    assert!(matches!(res, Err(DispatchError::RuntimeUnavailable)));
}

#[tokio::test]
async fn test_shutdown_cancels_runtime() {
    let sink = Arc::new(Collect::default());
    let d = dispatcher(&sink);
    assert!(!d.is_shut_down());
    d.shutdown().await;
    assert!(d.is_shut_down());
}
