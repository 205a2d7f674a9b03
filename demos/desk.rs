//! # Example: Order desk
//!
//! A fake in-memory toolkit with three widgets:
//! - `customer` text field (value source)
//! - `search` button: validates the field, looks the customer up, then loads
//!   its orders with the looked-up id (sequential mode)
//! - `refresh` button: fans out two reports at once (no-wait mode) with
//!   per-task callbacks
//!
//! Run with:
//! ```text
//! RUST_LOG=debug cargo run --example desk --features logging
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use actionvisor::{
    ActionError, ActionHandler, ActionKind, CallbackMapping, CompletionSignal, Context,
    DispatchAction, Dispatcher, DispatcherConfig, ListenerAdapter, ListenerKind, LogWriter,
    Payload, PendingTask, Required, Subscribe, TaskContext, TaskError, TaskInfo, TaskKind,
    TaskUnit, Toolkit, ValidationErrors, Validator, ValueSource,
};

/// Widgets by name, with their current values and attached adapters.
#[derive(Default)]
struct Desk {
    values: Mutex<HashMap<String, Vec<String>>>,
    adapters: Mutex<HashMap<(String, ListenerKind), ListenerAdapter>>,
}

impl Desk {
    fn type_into(&self, target: &str, text: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(target.to_string(), vec![text.to_string()]);
    }

    fn click(&self, target: &str) -> bool {
        let adapter = self
            .adapters
            .lock()
            .unwrap()
            .get(&(target.to_string(), ListenerKind::Action))
            .cloned();
        adapter.is_some_and(|a| a.fire("click"))
    }
}

impl Toolkit for Desk {
    fn find_target(&self, name: &str) -> Option<Payload> {
        let known = ["customer", "search", "refresh"].contains(&name);
        known.then(|| Arc::new(name.to_string()) as Payload)
    }

    fn attach(&self, adapter: ListenerAdapter) -> bool {
        if self.find_target(adapter.target()).is_none() {
            return false;
        }
        let key = (adapter.target().to_string(), adapter.kind());
        self.adapters.lock().unwrap().insert(key, adapter);
        true
    }

    fn detach(&self, target: &str, kind: ListenerKind) {
        self.adapters.lock().unwrap().remove(&(target.to_string(), kind));
    }
}

impl ValueSource for Desk {
    fn values(&self, target: &str) -> Option<Vec<String>> {
        self.values.lock().unwrap().get(target).cloned()
    }
}

/// Pretends to call a backend.
#[derive(Default)]
struct Backend {
    query: String,
    latency: Duration,
    answer: Option<String>,
}

#[async_trait]
impl TaskUnit for Backend {
    async fn mainproc(&mut self, cx: &TaskContext) -> Result<(), TaskError> {
        tokio::select! {
            _ = cx.token().cancelled() => return Err(TaskError::Canceled),
            _ = tokio::time::sleep(self.latency) => {}
        }
        if self.query.is_empty() {
            return Err(TaskError::fail("empty query"));
        }
        self.answer = Some(format!("{}:{}", cx.info().name, self.query));
        Ok(())
    }

    fn result(&self) -> Option<Payload> {
        self.answer.clone().map(|a| Arc::new(a) as Payload)
    }
}

fn backend(name: &'static str, latency_ms: u64) -> TaskKind {
    TaskKind::new(name, move || Backend {
        latency: Duration::from_millis(latency_ms),
        ..Backend::default()
    })
}

/// Sequential: `lookup` then `orders`, fed by the lookup's answer.
struct Search {
    dispatcher: Dispatcher,
}

impl ActionHandler for Search {
    fn validators(&mut self, _ctx: &Context) -> Vec<Box<dyn Validator>> {
        vec![Box::new(Required::new("customer").with_message("enter a customer name"))]
    }

    fn on_validation_fault(&mut self, _ctx: &Context, errors: &ValidationErrors) -> Result<(), ActionError> {
        println!("[search] rejected: {errors}");
        Ok(())
    }

    fn reserve_tasks(&mut self, _ctx: &mut Context) -> Result<Vec<TaskKind>, ActionError> {
        Ok(vec![backend("lookup", 80), backend("orders", 40)])
    }

    fn before_task(
        &mut self,
        _ctx: &Context,
        index: usize,
        prev: Option<&CompletionSignal>,
        next: Option<&mut PendingTask>,
    ) -> Result<bool, ActionError> {
        let Some(next) = next else {
            return Ok(true);
        };
        let query = match index {
            0 => self
                .dispatcher
                .values("customer")
                .and_then(|v| v.into_iter().next())
                .unwrap_or_default(),
            _ => match prev.and_then(|s| s.result::<String>()) {
                Some(id) => id.clone(),
                None => return Ok(false),
            },
        };
        if let Some(unit) = next.unit_mut::<Backend>() {
            unit.query = query;
        }
        Ok(true)
    }

    fn on_task_success(&mut self, _ctx: &Context, index: usize, signal: &CompletionSignal) -> Result<(), ActionError> {
        println!("[search] task {index} -> {:?}", signal.result::<String>());
        Ok(())
    }

    fn on_all_tasks_done(&mut self, ctx: &Context) -> Result<(), ActionError> {
        println!("[search] invocation {} done", ctx.invocation());
        Ok(())
    }
}

/// No-wait fan-out with typed callbacks.
#[derive(Default)]
struct Refresh {
    ready: usize,
}

impl Refresh {
    fn report_ready(&mut self, _ctx: &Context, signal: &CompletionSignal) -> Result<(), ActionError> {
        self.ready += 1;
        println!("[refresh] {} ready", signal.task.name);
        Ok(())
    }

    fn report_failed(&mut self, _ctx: &Context, task: &TaskInfo, err: TaskError) -> Option<TaskError> {
        println!("[refresh] {} failed: {}", task.name, err.as_message());
        None
    }
}

impl DispatchAction for Refresh {
    fn reserve(&mut self, _ctx: &mut Context, mapping: &mut CallbackMapping<Self>) -> Result<(), ActionError> {
        mapping.add(backend("sales", 120), Some(Self::report_ready), Some(Self::report_failed));
        mapping.add(backend("stock", 30), Some(Self::report_ready), Some(Self::report_failed));
        Ok(())
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
        if let Some(unit) = next.and_then(|n| n.unit_mut::<Backend>()) {
            unit.query = "today".to_string();
        }
        Ok(true)
    }

    fn on_all_tasks_done(&mut self, _ctx: &Context) -> Result<(), ActionError> {
        println!("[refresh] {} reports ready", self.ready);
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let desk = Arc::new(Desk::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let dispatcher = Dispatcher::builder(DispatcherConfig::default())
        .with_toolkit(desk.clone())
        .with_value_source(desk.clone())
        .with_subscribers(subs)
        .with_bindings(|r| {
            r.bind(
                "search",
                ListenerKind::Action,
                "click",
                ActionKind::new("search", |d: &Dispatcher| Search { dispatcher: d.clone() }),
            );
            r.bind("refresh", ListenerKind::Action, "click", ActionKind::dispatch("refresh", Refresh::default));
        })
        .with_finalizer(|report| {
            println!(
                "[desk] #{} {} -> {}",
                report.id,
                report.action,
                report.outcome.as_label()
            );
        })
        .build()?;

    for target in ["search", "refresh"] {
        println!("[desk] attached {} adapter(s) to {target}", dispatcher.attach_target(target));
    }

    // Empty field: validation aborts the search.
    desk.click("search");
    tokio::time::sleep(Duration::from_millis(50)).await;

    desk.type_into("customer", "ACME");
    desk.click("search");
    // Still running: suppressed by the duplicate guard.
    desk.click("search");
    desk.click("refresh");
    tokio::time::sleep(Duration::from_millis(400)).await;

    dispatcher.shutdown().await;
    Ok(())
}
