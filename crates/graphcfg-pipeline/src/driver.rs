//! The Pipeline Driver proper: schedules the topological order onto a
//! bounded worker pool, renders each vertex, and calls its resource's
//! `Prepare`.
//!
//! Concurrency primitives: a `tokio::sync::Semaphore` bounds how many
//! vertices render at once; a `tokio::sync::watch` channel per vertex lets
//! dependents wait for "rendered or failed" without polling. `Prepare` runs
//! on `tokio::task::spawn_blocking` so its per-vertex timeout can actually
//! elapse against a synchronous (and potentially blocking-I/O-bound) call.
//! Cancellation is cooperative — a single `Arc<AtomicBool>` flag, checked
//! before dependency-waiting and again immediately before `Prepare`, the
//! two designated suspension points.

use crate::config::PipelineConfig;
use crate::prepare::{PreparerRegistry, RenderContext, Task};
use crate::topo::topological_order;
use crate::PipelineError;
use graphcfg_core::graph::Graph;
use graphcfg_core::record::AsRecord;
use graphcfg_core::vertex::VertexId;
use graphcfg_render::{render_vertex, RenderedFields, RenderedStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Semaphore};

/// What happened to one vertex by the end of the run.
#[derive(Debug, Clone)]
pub enum VertexOutcome {
    Rendered { fields: RenderedFields, task: Task },
    Failed(String),
    /// Skipped because a dependency failed (or was itself skipped/aborted).
    Skipped,
    /// Abandoned in flight because the run was cancelled before this
    /// vertex's `Prepare` call completed.
    Aborted,
}

/// The full result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub order: Vec<VertexId>,
    pub outcomes: HashMap<VertexId, VertexOutcome>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .values()
            .all(|o| matches!(o, VertexOutcome::Rendered { .. }))
    }
}

/// Run the pipeline to completion: topologically order `graph`, then render
/// and prepare every vertex with bounded concurrency. `cancel` may be
/// shared with a caller that wants to request cooperative cancellation from
/// outside (e.g. a signal handler); it is also set internally on the first
/// failure unless `config.best_effort` is set.
pub async fn run<V>(
    graph: Arc<Graph<V>>,
    preparers: Arc<PreparerRegistry>,
    config: PipelineConfig,
    cancel: Arc<AtomicBool>,
) -> Result<PipelineReport, PipelineError>
where
    V: AsRecord + Send + Sync + 'static,
{
    let order = topological_order(graph.as_ref())?;

    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let store = Arc::new(RenderedStore::new());
    let outcomes: Arc<Mutex<HashMap<VertexId, VertexOutcome>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let mut senders = HashMap::new();
    let mut receivers = HashMap::new();
    for id in &order {
        let (tx, rx) = watch::channel(false);
        senders.insert(id.clone(), tx);
        receivers.insert(id.clone(), rx);
    }

    let mut handles = Vec::with_capacity(order.len());
    for id in &order {
        let deps: Vec<VertexId> = graph.children(id).to_vec();
        let mut dep_receivers: Vec<watch::Receiver<bool>> =
            deps.iter().map(|d| receivers[d].clone()).collect();
        let sender = senders[id].clone();

        let graph = Arc::clone(&graph);
        let preparers = Arc::clone(&preparers);
        let store = Arc::clone(&store);
        let outcomes = Arc::clone(&outcomes);
        let semaphore = Arc::clone(&semaphore);
        let cancel = Arc::clone(&cancel);
        let timeout_duration = config.prepare_timeout();
        let best_effort = config.best_effort;
        let id = id.clone();

        handles.push(tokio::spawn(async move {
            if cancel.load(Ordering::SeqCst) {
                finish(&outcomes, &sender, &id, VertexOutcome::Aborted);
                return;
            }

            for rx in &mut dep_receivers {
                let _ = rx.changed().await;
            }

            let dep_failed = {
                let guard = outcomes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                deps.iter().any(|d| {
                    !matches!(guard.get(d), Some(VertexOutcome::Rendered { .. }))
                })
            };
            if dep_failed {
                tracing::warn!(vertex = %id, "skipping: a dependency failed or was skipped");
                finish(&outcomes, &sender, &id, VertexOutcome::Skipped);
                return;
            }

            if cancel.load(Ordering::SeqCst) {
                finish(&outcomes, &sender, &id, VertexOutcome::Aborted);
                return;
            }

            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed during a run");

            let fields = match render_vertex(graph.as_ref(), &store, &id) {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::warn!(vertex = %id, error = %e, "render failed");
                    fail(&outcomes, &sender, &id, e.to_string(), &cancel, best_effort);
                    return;
                }
            };
            store.insert(id.clone(), fields.clone());

            let kind = graph
                .get(&id)
                .expect("vertex present in graph by construction")
                .as_record()
                .type_name();

            if preparers.get(kind).is_none() {
                fail(
                    &outcomes,
                    &sender,
                    &id,
                    format!("no preparer registered for kind {kind:?}"),
                    &cancel,
                    best_effort,
                );
                return;
            }

            // `Preparer::prepare` is a synchronous call (it validates an
            // in-memory record and may do blocking I/O); run it on the
            // blocking pool and race the join handle against the timeout so
            // the timeout can actually elapse while `prepare` is still
            // running, rather than racing a future that is already `Ready`
            // on first poll.
            let preparers_for_blocking = Arc::clone(&preparers);
            let vertex_for_blocking = id.clone();
            let fields_for_blocking = fields.clone();
            let prepare_task = tokio::task::spawn_blocking(move || {
                let preparer = preparers_for_blocking
                    .get(kind)
                    .expect("kind already validated to be registered");
                let ctx = RenderContext::new(&vertex_for_blocking, &fields_for_blocking);
                preparer.prepare(&ctx)
            });

            let outcome = match tokio::time::timeout(timeout_duration, prepare_task).await {
                Ok(Ok(Ok(task))) => {
                    tracing::info!(vertex = %id, task = %task.summary, "prepared");
                    VertexOutcome::Rendered { fields, task }
                }
                Ok(Ok(Err(e))) => {
                    fail(&outcomes, &sender, &id, e.to_string(), &cancel, best_effort);
                    return;
                }
                Ok(Err(join_err)) => {
                    fail(
                        &outcomes,
                        &sender,
                        &id,
                        format!("prepare task panicked: {join_err}"),
                        &cancel,
                        best_effort,
                    );
                    return;
                }
                Err(_) => {
                    let reason = PipelineError::Timeout {
                        vertex: id.clone(),
                        duration: timeout_duration,
                    };
                    fail(&outcomes, &sender, &id, reason.to_string(), &cancel, best_effort);
                    return;
                }
            };
            finish(&outcomes, &sender, &id, outcome);
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    let outcomes = Arc::try_unwrap(outcomes)
        .unwrap_or_else(|arc| Mutex::new(arc.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()))
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    Ok(PipelineReport { order, outcomes })
}

fn finish(
    outcomes: &Mutex<HashMap<VertexId, VertexOutcome>>,
    sender: &watch::Sender<bool>,
    id: &VertexId,
    outcome: VertexOutcome,
) {
    outcomes
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .insert(id.clone(), outcome);
    let _ = sender.send(true);
}

fn fail(
    outcomes: &Mutex<HashMap<VertexId, VertexOutcome>>,
    sender: &watch::Sender<bool>,
    id: &VertexId,
    reason: String,
    cancel: &AtomicBool,
    best_effort: bool,
) {
    if !best_effort {
        cancel.store(true, Ordering::SeqCst);
    }
    finish(outcomes, sender, id, VertexOutcome::Failed(reason));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::{PrepareError, Preparer, PreparerRegistry};
    use graphcfg_core::kinds::{FileContent, Module, TaskExec};
    use graphcfg_core::record::Record;

    type TestGraph = Graph<Arc<dyn Record>>;

    fn id(s: &str) -> VertexId {
        VertexId::parse(s).unwrap()
    }

    fn rec(r: impl Record + 'static) -> Arc<dyn Record> {
        Arc::new(r)
    }

    /// A preparer that blocks its worker thread, standing in for a resource
    /// plugin doing blocking I/O in `Prepare`.
    struct SlowPreparer;

    impl Preparer for SlowPreparer {
        fn prepare(&self, ctx: &RenderContext<'_>) -> Result<Task, PrepareError> {
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(Task {
                vertex: ctx.vertex().clone(),
                summary: "slow".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn renders_a_dependency_chain() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.m1"), rec(Module::default())).unwrap();
        g.add(
            id("root.m1.file"),
            rec(FileContent {
                dest: "/etc/app.conf".into(),
                content: "ok".into(),
                mode: "0644".into(),
            }),
        )
        .unwrap();
        g.add(
            id("root.m1.task"),
            rec(TaskExec {
                command: "reload".into(),
                args: vec![],
                dir: "{{ lookup \"file.dest\" }}".into(),
            }),
        )
        .unwrap();
        g.connect(&id("root.m1.task"), id("root.m1.file")).unwrap();

        let report = run(
            Arc::new(g),
            Arc::new(PreparerRegistry::with_builtins()),
            PipelineConfig::default(),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();

        assert!(report.succeeded());
        match &report.outcomes[&id("root.m1.task")] {
            VertexOutcome::Rendered { task, .. } => {
                assert_eq!(task.summary, "exec reload (in /etc/app.conf)");
            }
            other => panic!("expected Rendered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_skips_transitive_dependents() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.m1"), rec(Module::default())).unwrap();
        g.add(
            id("root.m1.bad"),
            rec(TaskExec {
                command: String::new(),
                args: vec![],
                dir: String::new(),
            }),
        )
        .unwrap();
        g.add(id("root.m1.dependent"), rec(TaskExec::default()))
            .unwrap();
        g.connect(&id("root.m1.dependent"), id("root.m1.bad"))
            .unwrap();

        let report = run(
            Arc::new(g),
            Arc::new(PreparerRegistry::with_builtins()),
            PipelineConfig {
                best_effort: true,
                ..PipelineConfig::default()
            },
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();

        assert!(matches!(
            report.outcomes[&id("root.m1.bad")],
            VertexOutcome::Failed(_)
        ));
        assert!(matches!(
            report.outcomes[&id("root.m1.dependent")],
            VertexOutcome::Skipped
        ));
    }

    #[tokio::test]
    async fn prepare_timeout_actually_elapses_for_a_blocking_preparer() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.a"), rec(TaskExec::default())).unwrap();

        let mut preparers = PreparerRegistry::new();
        preparers.register("task.exec", Box::new(SlowPreparer));

        let report = run(
            Arc::new(g),
            Arc::new(preparers),
            PipelineConfig {
                prepare_timeout_ms: 5,
                best_effort: true,
                ..PipelineConfig::default()
            },
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();

        match &report.outcomes[&id("root.a")] {
            VertexOutcome::Failed(reason) => {
                assert!(reason.contains("timed out"), "got: {reason}");
            }
            other => panic!("expected a timeout Failed outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pre_cancelled_run_aborts_every_vertex() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.a"), rec(TaskExec::default())).unwrap();

        let report = run(
            Arc::new(g),
            Arc::new(PreparerRegistry::with_builtins()),
            PipelineConfig::default(),
            Arc::new(AtomicBool::new(true)),
        )
        .await
        .unwrap();

        assert!(matches!(
            report.outcomes[&id("root.a")],
            VertexOutcome::Aborted
        ));
        assert!(!report.succeeded());
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_any_rendering() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.a"), rec(TaskExec::default())).unwrap();
        g.add(id("root.b"), rec(TaskExec::default())).unwrap();
        g.connect(&id("root.a"), id("root.b")).unwrap();
        g.connect(&id("root.b"), id("root.a")).unwrap();

        let err = run(
            Arc::new(g),
            Arc::new(PreparerRegistry::with_builtins()),
            PipelineConfig::default(),
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::CycleDetected(_)));
    }
}
