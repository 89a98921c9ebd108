//! Reference Resolver: splits a dotted path into `(vertex-id, field-path)`
//! by longest-prefix match against the graph, plus the scope-aware variant
//! that walks child -> parent up to the nearest module boundary.

use graphcfg_core::graph::Graph;
use graphcfg_core::record::AsRecord;
use graphcfg_core::vertex::{VertexId, prefixes};
use std::collections::HashSet;

/// Raised when no prefix of a dotted reference names an existing vertex
/// (`MissingVertex`).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("no vertex matches any prefix of {0:?}")]
pub struct MissingVertex(pub String);

/// `VertexSplit(g, s)`: the longest dotted prefix of `s` that names an
/// existing vertex, paired with the remainder after the prefix and its
/// separating dot. Ties never occur — `Prefixes` is already longest-first.
pub fn vertex_split<V>(g: &Graph<V>, s: &str) -> Result<(VertexId, String), MissingVertex> {
    for candidate in prefixes(s) {
        if let Ok(id) = VertexId::parse(candidate)
            && g.contains(&id)
        {
            let remainder = s[candidate.len()..].trim_start_matches('.').to_string();
            return Ok((id, remainder));
        }
    }
    Err(MissingVertex(s.to_string()))
}

/// `TraverseUntilModule`: stop iff the node is root, missing from the
/// graph, or is a module (by kind tag).
pub fn traverse_until_module<V: AsRecord>(node: &VertexId, g: &Graph<V>) -> bool {
    node.is_root()
        || match g.get(node) {
            None => true,
            Some(value) => value.as_record().type_name() == "module",
        }
}

/// `VertexSplitTraverse(g, name, start, stop)`: simulates lexical scoping —
/// `name` resolves first against `start`'s own dependency-children, then as
/// a sibling of `start`, then against progressively enclosing scopes, never
/// past a vertex for which `stop` holds. Returns `None` on exhaustion
/// (`MissingVertex` is raised by the caller).
pub fn vertex_split_traverse<V, S>(
    g: &Graph<V>,
    name: &str,
    start: &VertexId,
    stop: S,
) -> Option<(VertexId, String)>
where
    S: Fn(&VertexId, &Graph<V>) -> bool,
{
    let mut visited = HashSet::new();
    traverse_from(g, name, start, &stop, &mut visited)
}

fn traverse_from<V, S>(
    g: &Graph<V>,
    name: &str,
    start: &VertexId,
    stop: &S,
    visited: &mut HashSet<VertexId>,
) -> Option<(VertexId, String)>
where
    S: Fn(&VertexId, &Graph<V>) -> bool,
{
    for child in g.children(start) {
        if visited.contains(child) {
            continue;
        }
        visited.insert(child.clone());
        if stop(child, g) {
            continue;
        }
        if let Some(found) = traverse_from(g, name, child, stop, visited) {
            return Some(found);
        }
    }

    let candidate = start.sibling(name);
    if let Ok((vertex_id, remainder)) = vertex_split(g, candidate.as_str()) {
        return Some((vertex_id, remainder));
    }

    if !stop(start, g)
        && let Some(parent) = start.parent()
    {
        return traverse_from(g, name, &parent, stop, visited);
    }
    None
}

/// `(noderef "<vertex-id>")`, or `(noderef "<vertex-id>") | f1 | f2 | ...`
/// when the remainder is non-empty — the desugared call syntax.
pub fn format_desugared(vertex_id: &VertexId, remainder: &str) -> String {
    if remainder.is_empty() {
        format!("(noderef \"{vertex_id}\")")
    } else {
        let fields: Vec<&str> = remainder.split('.').collect();
        format!("(noderef \"{vertex_id}\") | {}", fields.join(" | "))
    }
}

/// `DesugarCall`: apply `VertexSplit` to a dotted call and emit its
/// desugared two-stage form.
pub fn desugar_call<V>(g: &Graph<V>, s: &str) -> Result<String, MissingVertex> {
    let (vertex_id, remainder) = vertex_split(g, s)?;
    Ok(format_desugared(&vertex_id, &remainder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphcfg_core::kinds::{FileContent, Module, TaskExec};
    use graphcfg_core::record::Record;
    use std::sync::Arc;

    type TestGraph = Graph<Arc<dyn Record>>;

    fn id(s: &str) -> VertexId {
        VertexId::parse(s).unwrap()
    }

    fn rec(r: impl Record + 'static) -> Arc<dyn Record> {
        Arc::new(r)
    }

    #[test]
    fn longest_prefix_match_picks_the_deepest_existing_vertex() {
        // `root` itself is deliberately not registered: it stands in for
        // a name with no matching prefix at all.
        let mut g: TestGraph = Graph::new();
        g.add(id("root.a"), rec(Module::default())).unwrap();
        g.add(id("root.a.b"), rec(Module::default())).unwrap();
        g.add(id("root.a.b.c"), rec(TaskExec::default())).unwrap();

        let (vertex, remainder) = vertex_split(&g, "root.a.b.c.d.e").unwrap();
        assert_eq!(vertex, id("root.a.b.c"));
        assert_eq!(remainder, "d.e");

        let (vertex, remainder) = vertex_split(&g, "root.a.b.x").unwrap();
        assert_eq!(vertex, id("root.a.b"));
        assert_eq!(remainder, "x");

        assert!(vertex_split(&g, "root.z").is_err());
    }

    #[test]
    fn lexical_scope_blocked_by_module_boundary() {
        // `root.m2` is itself left unregistered (as is bare `root`), so the
        // ancestor walk from `root.m2.y` has nothing left to match once it
        // climbs past `root.m2` — it must not find `root.m1.file`, which
        // lives in a sibling module's scope entirely.
        let mut g: TestGraph = Graph::new();
        g.add(id("root.m1"), rec(Module::default())).unwrap();
        g.add(
            id("root.m1.file"),
            rec(FileContent {
                dest: "/a".into(),
                content: String::new(),
                mode: String::new(),
            }),
        )
        .unwrap();
        g.add(id("root.m2.y"), rec(TaskExec::default())).unwrap();

        let result = vertex_split_traverse(
            &g,
            "file.dest",
            &id("root.m2.y"),
            traverse_until_module::<Arc<dyn Record>>,
        );
        assert!(
            result.is_none(),
            "root.m1.file must not be visible from root.m2's scope"
        );
    }

    #[test]
    fn lexical_scope_finds_local_sibling() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.m1"), rec(Module::default())).unwrap();
        g.add(
            id("root.m1.file"),
            rec(FileContent {
                dest: "/a".into(),
                content: String::new(),
                mode: String::new(),
            }),
        )
        .unwrap();
        g.add(id("root.m1.task"), rec(TaskExec::default())).unwrap();

        let (vertex, remainder) = vertex_split_traverse(
            &g,
            "file.dest",
            &id("root.m1.task"),
            traverse_until_module::<Arc<dyn Record>>,
        )
        .expect("file is a sibling within the same module");
        assert_eq!(vertex, id("root.m1.file"));
        assert_eq!(remainder, "dest");
    }

    #[test]
    fn traverse_descends_dependency_children_before_widening() {
        // root.a depends on root.b.marker; that dependency's *sibling*
        // root.b.file should become visible as if local, demonstrating
        // step 1's "recurse into each child of start" before step 3 would
        // otherwise widen to root.a's own (empty) enclosing scope.
        let mut g: TestGraph = Graph::new();
        g.add(id("root"), rec(Module::default())).unwrap();
        g.add(id("root.a"), rec(TaskExec::default())).unwrap();
        g.add(id("root.b"), rec(Module::default())).unwrap();
        g.add(id("root.b.marker"), rec(TaskExec::default())).unwrap();
        g.add(
            id("root.b.file"),
            rec(FileContent {
                dest: "/x".into(),
                content: String::new(),
                mode: String::new(),
            }),
        )
        .unwrap();
        g.connect(&id("root.a"), id("root.b.marker")).unwrap();

        let never_stop = |_: &VertexId, _: &TestGraph| false;
        let (vertex, remainder) =
            vertex_split_traverse(&g, "file.dest", &id("root.a"), never_stop)
                .expect("root.b.file reachable via root.a's dependency edge");
        assert_eq!(vertex, id("root.b.file"));
        assert_eq!(remainder, "dest");
    }

    #[test]
    fn desugar_call_produces_noderef_pipe_chain() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root"), rec(Module::default())).unwrap();
        g.add(id("root.task"), rec(Module::default())).unwrap();
        g.add(id("root.task.go-dl"), rec(TaskExec::default()))
            .unwrap();

        assert_eq!(
            desugar_call(&g, "root.task.go-dl.dir").unwrap(),
            r#"(noderef "root.task.go-dl") | dir"#
        );
        assert_eq!(
            desugar_call(&g, "root.task.go-dl").unwrap(),
            r#"(noderef "root.task.go-dl")"#
        );
    }
}
