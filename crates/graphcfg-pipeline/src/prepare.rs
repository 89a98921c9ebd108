//! Preparer contract: what a resource plugin supplies, and the
//! Renderer contract the core exposes to it (field-value retrieval for the
//! current vertex with templates already substituted).

use graphcfg_core::vertex::VertexId;
use graphcfg_render::RenderedFields;
use std::collections::HashMap;

/// A runnable unit of work produced by a resource's `Prepare` call. The
/// concrete apply/check machinery that consumes a `Task` is an external
/// collaborator; the Driver only materializes and stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub vertex: VertexId,
    pub summary: String,
}

/// Raised by a resource's `Prepare` implementation. Preparer errors bubble
/// to the Driver, which decides halt/continue per mode.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{vertex}: prepare failed: {reason}")]
pub struct PrepareError {
    pub vertex: VertexId,
    pub reason: String,
}

/// The Renderer contract: read-only access to one vertex's already-rendered
/// fields, by canonical name.
pub struct RenderContext<'a> {
    vertex: &'a VertexId,
    fields: &'a RenderedFields,
}

impl<'a> RenderContext<'a> {
    pub fn new(vertex: &'a VertexId, fields: &'a RenderedFields) -> Self {
        Self { vertex, fields }
    }

    pub fn vertex(&self) -> &VertexId {
        self.vertex
    }

    pub fn field(&self, canonical_name: &str) -> Option<&str> {
        self.fields.get(canonical_name).map(String::as_str)
    }
}

/// What an external resource plugin supplies: validate the rendered record
/// and produce a runnable `Task`.
pub trait Preparer: Send + Sync {
    fn prepare(&self, ctx: &RenderContext<'_>) -> Result<Task, PrepareError>;
}

/// Append-only `kind name -> Preparer` mapping, the Prepare-side analogue of
/// `graphcfg_core::registry::Registry`'s construct-side mapping.
#[derive(Default)]
pub struct PreparerRegistry {
    preparers: HashMap<&'static str, Box<dyn Preparer>>,
}

impl PreparerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &'static str, preparer: Box<dyn Preparer>) {
        self.preparers.insert(kind, preparer);
    }

    pub fn get(&self, kind: &str) -> Option<&dyn Preparer> {
        self.preparers.get(kind).map(AsRef::as_ref)
    }

    /// Registers a `Preparer` for each illustrative fixture kind in
    /// `graphcfg_core::kinds`, so the CLI's `render` subcommand has an
    /// end-to-end path without requiring a real resource plugin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("module", Box::new(NoopPreparer));
        registry.register("task.exec", Box::new(CommandPreparer));
        registry.register("file.content", Box::new(FilePreparer));
        registry.register("user.user", Box::new(UserPreparer));
        registry.register("wait.query", Box::new(WaitPreparer));
        registry
    }
}

/// Modules are scope boundaries, not runnable resources.
struct NoopPreparer;

impl Preparer for NoopPreparer {
    fn prepare(&self, ctx: &RenderContext<'_>) -> Result<Task, PrepareError> {
        Ok(Task {
            vertex: ctx.vertex().clone(),
            summary: "module boundary, nothing to run".to_string(),
        })
    }
}

struct CommandPreparer;

impl Preparer for CommandPreparer {
    fn prepare(&self, ctx: &RenderContext<'_>) -> Result<Task, PrepareError> {
        let command = ctx.field("Command").filter(|c| !c.is_empty()).ok_or_else(|| {
            PrepareError {
                vertex: ctx.vertex().clone(),
                reason: "Command must not be empty".to_string(),
            }
        })?;
        let dir = ctx.field("Dir").unwrap_or_default();
        let summary = if dir.is_empty() {
            format!("exec {command}")
        } else {
            format!("exec {command} (in {dir})")
        };
        Ok(Task {
            vertex: ctx.vertex().clone(),
            summary,
        })
    }
}

struct FilePreparer;

impl Preparer for FilePreparer {
    fn prepare(&self, ctx: &RenderContext<'_>) -> Result<Task, PrepareError> {
        let dest = ctx.field("Dest").filter(|d| !d.is_empty()).ok_or_else(|| {
            PrepareError {
                vertex: ctx.vertex().clone(),
                reason: "Dest must not be empty".to_string(),
            }
        })?;
        Ok(Task {
            vertex: ctx.vertex().clone(),
            summary: format!("write {dest}"),
        })
    }
}

struct UserPreparer;

impl Preparer for UserPreparer {
    fn prepare(&self, ctx: &RenderContext<'_>) -> Result<Task, PrepareError> {
        let name = ctx.field("Name").filter(|n| !n.is_empty()).ok_or_else(|| {
            PrepareError {
                vertex: ctx.vertex().clone(),
                reason: "Name must not be empty".to_string(),
            }
        })?;
        Ok(Task {
            vertex: ctx.vertex().clone(),
            summary: format!("ensure user {name} exists"),
        })
    }
}

struct WaitPreparer;

impl Preparer for WaitPreparer {
    fn prepare(&self, ctx: &RenderContext<'_>) -> Result<Task, PrepareError> {
        let query = ctx.field("Query").filter(|q| !q.is_empty()).ok_or_else(|| {
            PrepareError {
                vertex: ctx.vertex().clone(),
                reason: "Query must not be empty".to_string(),
            }
        })?;
        Ok(Task {
            vertex: ctx.vertex().clone(),
            summary: format!("poll until {query}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> VertexId {
        VertexId::parse(s).unwrap()
    }

    #[test]
    fn command_preparer_rejects_empty_command() {
        let vertex = id("root.a");
        let fields: RenderedFields = [("Command".to_string(), String::new())].into();
        let ctx = RenderContext::new(&vertex, &fields);
        let err = CommandPreparer.prepare(&ctx).unwrap_err();
        assert_eq!(err.vertex, vertex);
    }

    #[test]
    fn command_preparer_summarizes_with_dir() {
        let vertex = id("root.a");
        let fields: RenderedFields = [
            ("Command".to_string(), "deploy".to_string()),
            ("Dir".to_string(), "/srv".to_string()),
        ]
        .into();
        let ctx = RenderContext::new(&vertex, &fields);
        let task = CommandPreparer.prepare(&ctx).unwrap();
        assert_eq!(task.summary, "exec deploy (in /srv)");
    }

    #[test]
    fn builtins_cover_every_fixture_kind() {
        let registry = PreparerRegistry::with_builtins();
        for kind in [
            "module",
            "task.exec",
            "file.content",
            "user.user",
            "wait.query",
        ] {
            assert!(registry.get(kind).is_some(), "missing preparer for {kind}");
        }
    }
}
