//! Template Renderer: rewrites `lookup`-style directives embedded in a
//! vertex's string fields into concrete values.
//!
//! The directive language is intentionally small: `param NAME` (a declared
//! module parameter, resolved lexically), `lookup DOTTED` (scope-aware
//! resolution through the graph and the Field Introspector), the internal
//! `noderef ID` marker a `lookup` desugars into, and pipe composition
//! (`X | f1 | f2`) applying field accessors in sequence.

use graphcfg_core::graph::Graph;
use graphcfg_core::kinds::Module;
use graphcfg_core::record::{
    AsRecord, FieldError, FieldValue, eval_terms, list_fields, lookup_canonical_field_name,
};
use graphcfg_core::vertex::VertexId;
use graphcfg_resolve::{MissingVertex, format_desugared, traverse_until_module, vertex_split_traverse};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A vertex's fully-rendered top-level string fields: canonical field name
/// -> the value with every directive substituted. Embedded sub-record
/// fields are not independently re-templated (rendering scopes "for each string
/// field of the vertex" to the vertex's own fields).
pub type RenderedFields = HashMap<String, String>;

/// Failure kinds a single directive evaluation can raise, before the
/// Renderer attaches vertex/directive context.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RenderErrorKind {
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Resolve(#[from] MissingVertex),
    #[error("module parameter {0:?} is not declared by any enclosing module")]
    MissingParam(String),
    #[error("malformed template directive")]
    Malformed,
}

/// A directive failure, tagged with the vertex and directive source text it
/// occurred in (errors carry enough context to locate the
/// offending template).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{vertex}: directive {directive:?}: {kind}")]
pub struct RenderError {
    pub vertex: VertexId,
    pub directive: String,
    #[source]
    pub kind: RenderErrorKind,
}

/// The table of vertices that have finished rendering, keyed by id.
/// Populated incrementally by the Pipeline Driver; once a key is present its
/// value never changes, mirroring the Field Map Cache's immutable-snapshot
/// discipline.
#[derive(Default)]
pub struct RenderedStore {
    inner: RwLock<HashMap<VertexId, Arc<RenderedFields>>>,
}

impl RenderedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, vertex: VertexId, fields: RenderedFields) {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(vertex, Arc::new(fields));
    }

    pub fn get(&self, vertex: &VertexId) -> Option<Arc<RenderedFields>> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(vertex)
            .cloned()
    }

    pub fn contains(&self, vertex: &VertexId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(vertex)
    }
}

/// Render every top-level field of `vertex_id` against `graph`, resolving
/// directives against vertices already present in `store`. Callers (the
/// Pipeline Driver) must guarantee every dependency of `vertex_id` has
/// already been rendered and inserted into `store`.
pub fn render_vertex<V: AsRecord>(
    graph: &Graph<V>,
    store: &RenderedStore,
    vertex_id: &VertexId,
) -> Result<RenderedFields, RenderError> {
    let value = graph.get(vertex_id).ok_or_else(|| RenderError {
        vertex: vertex_id.clone(),
        directive: String::new(),
        kind: RenderErrorKind::Resolve(MissingVertex(vertex_id.to_string())),
    })?;
    let record = value.as_record();

    let mut fields = RenderedFields::new();
    for canonical in list_fields(record) {
        let raw = eval_terms(record, &[canonical.as_str()]).map_err(|e| RenderError {
            vertex: vertex_id.clone(),
            directive: canonical.clone(),
            kind: RenderErrorKind::Field(e),
        })?;
        let rendered = match raw {
            FieldValue::Str(s) => render_string(graph, store, vertex_id, s).inspect_err(|e| {
                tracing::debug!(vertex = %vertex_id, field = %canonical, error = %e, "field render failed");
            })?,
            FieldValue::Null => String::new(),
            other => other.to_string(),
        };
        fields.insert(canonical, rendered);
    }
    tracing::trace!(vertex = %vertex_id, fields = fields.len(), "vertex rendered");
    Ok(fields)
}

/// Scan one field's raw string value for `{{ ... }}` directives and
/// substitute each with its resolved value, stringified verbatim.
pub fn render_string<V: AsRecord>(
    graph: &Graph<V>,
    store: &RenderedStore,
    vertex_id: &VertexId,
    raw: &str,
) -> Result<String, RenderError> {
    let spans = find_directives(raw);
    if spans.is_empty() {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&raw[cursor..span.start]);
        let resolved = eval_directive(graph, store, vertex_id, &span.inner).map_err(|kind| {
            RenderError {
                vertex: vertex_id.clone(),
                directive: span.inner.clone(),
                kind,
            }
        })?;
        out.push_str(&resolved);
        cursor = span.end;
    }
    out.push_str(&raw[cursor..]);
    Ok(out)
}

struct DirectiveSpan {
    start: usize,
    end: usize,
    inner: String,
}

/// Find every `{{ ... }}` span in `s`, left to right, non-overlapping.
fn find_directives(s: &str) -> Vec<DirectiveSpan> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    while let Some(rel_start) = s[cursor..].find("{{") {
        let start = cursor + rel_start;
        let inner_start = start + 2;
        let Some(rel_end) = s[inner_start..].find("}}") else {
            break;
        };
        let inner_end = inner_start + rel_end;
        let end = inner_end + 2;
        spans.push(DirectiveSpan {
            start,
            end,
            inner: s[inner_start..inner_end].trim().to_string(),
        });
        cursor = end;
    }
    spans
}

enum Expr {
    Param(String),
    Lookup(String),
    NodeRefChain(VertexId, Vec<String>),
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

/// Parse one directive's inner text, e.g. `lookup "web.port"` or the
/// already-desugared `noderef "root.web" | port`.
fn parse_expr(inner: &str) -> Option<Expr> {
    let mut stages = inner.split('|').map(str::trim);
    let head = stages.next()?;
    let (keyword, arg) = head.split_once(char::is_whitespace).unwrap_or((head, ""));
    let arg = unquote(arg);
    match keyword {
        "param" => Some(Expr::Param(arg.to_string())),
        "lookup" => Some(Expr::Lookup(arg.to_string())),
        "noderef" => {
            let vertex = VertexId::parse(arg).ok()?;
            let fields = stages.map(str::to_string).collect();
            Some(Expr::NodeRefChain(vertex, fields))
        }
        _ => None,
    }
}

fn eval_directive<V: AsRecord>(
    graph: &Graph<V>,
    store: &RenderedStore,
    vertex_id: &VertexId,
    inner: &str,
) -> Result<String, RenderErrorKind> {
    match parse_expr(inner) {
        Some(Expr::Param(name)) => {
            resolve_param(graph, vertex_id, &name).ok_or(RenderErrorKind::MissingParam(name))
        }
        Some(Expr::Lookup(dotted)) => {
            let (target, remainder) =
                vertex_split_traverse(graph, &dotted, vertex_id, traverse_until_module)
                    .ok_or_else(|| MissingVertex(dotted.clone()))?;
            let fields: Vec<String> = if remainder.is_empty() {
                Vec::new()
            } else {
                remainder.split('.').map(str::to_string).collect()
            };
            eval_chain(graph, store, &target, &fields)
        }
        Some(Expr::NodeRefChain(target, fields)) => eval_chain(graph, store, &target, &fields),
        None => Err(RenderErrorKind::Malformed),
    }
}

/// `(noderef target) | fields...`: resolve a 1-segment chain against the
/// target's already-rendered string value when one exists, and fall back to
/// the raw record (covers non-string fields and navigation into embeds,
/// which aren't independently re-templated).
fn eval_chain<V: AsRecord>(
    graph: &Graph<V>,
    store: &RenderedStore,
    target: &VertexId,
    fields: &[String],
) -> Result<String, RenderErrorKind> {
    if fields.is_empty() {
        return Ok(format_desugared(target, ""));
    }

    let value = graph
        .get(target)
        .ok_or_else(|| MissingVertex(target.to_string()))?;
    let record = value.as_record();

    // A 1-segment chain into an own field must read the target's
    // *rendered* value when one is available — the raw record still holds
    // unsubstituted template text for that field.
    if fields.len() == 1 {
        let canonical = lookup_canonical_field_name(record, &fields[0].to_lowercase())?;
        if let Some(rendered) = store.get(target)
            && let Some(v) = rendered.get(canonical)
        {
            return Ok(v.clone());
        }
    }

    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    let result = eval_terms(record, &refs)?;
    Ok(result.to_string())
}

/// `param NAME`: walk `start` and its structural ancestors, nearest first,
/// returning the first module that declares `name`.
fn resolve_param<V: AsRecord>(graph: &Graph<V>, start: &VertexId, name: &str) -> Option<String> {
    let mut cursor = Some(start.clone());
    while let Some(id) = cursor {
        if let Some(value) = graph.get(&id) {
            let record = value.as_record();
            if record.type_name() == "module"
                && let Some(module) = record.as_any().downcast_ref::<Module>()
                && let Some(val) = module.param(name)
            {
                return Some(val.to_string());
            }
        }
        cursor = id.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphcfg_core::kinds::{FileContent, Module, TaskExec};
    use graphcfg_core::record::Record;
    use std::collections::HashMap as Map;

    type TestGraph = Graph<Arc<dyn Record>>;

    fn id(s: &str) -> VertexId {
        VertexId::parse(s).unwrap()
    }

    fn rec(r: impl Record + 'static) -> Arc<dyn Record> {
        Arc::new(r)
    }

    #[test]
    fn param_resolves_lexically_from_nearest_module() {
        let mut g: TestGraph = Graph::new();
        let mut params = Map::new();
        params.insert("basedir".to_string(), "/srv/app".to_string());
        g.add(id("root.m1"), rec(Module { params })).unwrap();
        g.add(
            id("root.m1.file"),
            rec(FileContent {
                dest: "{{ param \"basedir\" }}/index.html".into(),
                content: String::new(),
                mode: "0644".into(),
            }),
        )
        .unwrap();

        let store = RenderedStore::new();
        let rendered = render_vertex(&g, &store, &id("root.m1.file")).unwrap();
        assert_eq!(rendered.get("Dest").unwrap(), "/srv/app/index.html");
    }

    #[test]
    fn lookup_resolves_against_an_already_rendered_dependency() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.m1"), rec(Module::default())).unwrap();
        g.add(
            id("root.m1.file"),
            rec(FileContent {
                dest: "/etc/web.conf".into(),
                content: String::new(),
                mode: String::new(),
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

        let store = RenderedStore::new();
        let file_fields = render_vertex(&g, &store, &id("root.m1.file")).unwrap();
        store.insert(id("root.m1.file"), file_fields);

        let task_fields = render_vertex(&g, &store, &id("root.m1.task")).unwrap();
        assert_eq!(task_fields.get("Dir").unwrap(), "/etc/web.conf");
    }

    #[test]
    fn unresolved_lookup_is_a_fatal_missing_vertex() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.m1"), rec(Module::default())).unwrap();
        g.add(
            id("root.m1.task"),
            rec(TaskExec {
                command: "x".into(),
                args: vec![],
                dir: "{{ lookup \"nope.dest\" }}".into(),
            }),
        )
        .unwrap();

        let store = RenderedStore::new();
        let err = render_vertex(&g, &store, &id("root.m1.task")).unwrap_err();
        assert!(matches!(err.kind, RenderErrorKind::Resolve(_)));
        assert_eq!(err.vertex, id("root.m1.task"));
    }

    #[test]
    fn noderef_with_no_remainder_stringifies_as_desugared_marker() {
        let mut g: TestGraph = Graph::new();
        g.add(id("root.m1"), rec(Module::default())).unwrap();
        g.add(id("root.m1.task"), rec(TaskExec::default())).unwrap();
        g.add(
            id("root.m1.other"),
            rec(TaskExec {
                command: "{{ noderef \"root.m1.task\" }}".into(),
                args: vec![],
                dir: String::new(),
            }),
        )
        .unwrap();

        let store = RenderedStore::new();
        let fields = render_vertex(&g, &store, &id("root.m1.other")).unwrap();
        assert_eq!(fields.get("Command").unwrap(), r#"(noderef "root.m1.task")"#);
    }
}
