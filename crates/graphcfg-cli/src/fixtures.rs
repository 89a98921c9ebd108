//! A small illustrative resource graph exercising every fixture kind in
//! `graphcfg_core::kinds` — these exist to demonstrate the pipeline, not as
//! a catalog of real system-configuration resources.

use graphcfg_core::graph::Graph;
use graphcfg_core::kinds::{BackoffPolicy, FileContent, Module, RetryPolicy, TaskExec, UserUser, WaitQuery};
use graphcfg_core::record::Record;
use graphcfg_core::vertex::VertexId;
use std::collections::HashMap;
use std::sync::Arc;

pub type ResourceGraph = Graph<Arc<dyn Record>>;

fn id(s: &str) -> VertexId {
    VertexId::parse(s).expect("fixture id is well-formed")
}

fn rec(r: impl Record + 'static) -> Arc<dyn Record> {
    Arc::new(r)
}

/// Builds `root` / `root.web` (module scope, declaring `basedir` and `port`
/// parameters) with a file, a reload task that looks up the file's
/// rendered `dest`, a user account, and a poll resource whose embedded
/// `retry`/`backoff` policies demonstrate field-flattening ambiguity.
pub fn build() -> ResourceGraph {
    let mut g = ResourceGraph::new();

    let mut params = HashMap::new();
    params.insert("basedir".to_string(), "/srv/www".to_string());
    params.insert("port".to_string(), "8080".to_string());

    g.add(id("root"), rec(Module::default())).unwrap();
    g.add(id("root.web"), rec(Module { params })).unwrap();
    g.connect(&id("root"), id("root.web")).unwrap();

    g.add(
        id("root.web.file"),
        rec(FileContent {
            dest: "{{ param \"basedir\" }}/index.html".to_string(),
            content: "<h1>it works</h1>".to_string(),
            mode: "0644".to_string(),
        }),
    )
    .unwrap();

    g.add(
        id("root.web.task"),
        rec(TaskExec {
            command: "reload".to_string(),
            args: vec!["--graceful".to_string()],
            dir: "{{ lookup \"file.dest\" }}".to_string(),
        }),
    )
    .unwrap();
    g.connect(&id("root.web.task"), id("root.web.file")).unwrap();

    g.add(
        id("root.web.user"),
        rec(UserUser {
            name: "deploy".to_string(),
            home_dir: "/home/deploy".to_string(),
            shell: "/bin/bash".to_string(),
        }),
    )
    .unwrap();

    g.add(
        id("root.web.wait"),
        rec(WaitQuery {
            query: "{{ lookup \"task.command\" }} finished".to_string(),
            retry: Some(RetryPolicy {
                delay: "1s".to_string(),
                max_attempts: "5".to_string(),
            }),
            backoff: Some(BackoffPolicy {
                delay: "2s".to_string(),
                factor: "2.0".to_string(),
            }),
        }),
    )
    .unwrap();
    g.connect(&id("root.web.wait"), id("root.web.task")).unwrap();

    g
}
