//! Illustrative built-in resource kinds. These are fixtures that exercise
//! module scoping, field introspection, case folding, and embedded-record
//! flattening — not a catalog of real system-configuration resources.

use crate::record::{EmbedSlot, FieldEntry, FieldValue, Record, RecordDescriptor};
use std::any::Any;
use std::collections::HashMap;

fn downcast<'a, T: 'static>(record: &'a dyn Record) -> &'a T {
    record
        .as_any()
        .downcast_ref::<T>()
        .expect("FieldTable built for the wrong concrete type")
}

/// A scope boundary that declares parameters.
#[derive(Debug, Default, Clone)]
pub struct Module {
    pub params: HashMap<String, String>,
}

impl Module {
    /// Value of a declared parameter, by exact name. `param NAME` directives
    /// resolve lexically by walking ancestor modules and
    /// calling this until one declares `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl Record for Module {
    fn type_name(&self) -> &'static str {
        "module"
    }
    fn descriptor_fn(&self) -> fn() -> RecordDescriptor {
        Self::descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor::default()
    }
}

/// An opaque leaf resource whose `Prepare` runs an external command.
#[derive(Debug, Default, Clone)]
pub struct TaskExec {
    pub command: String,
    pub args: Vec<String>,
    pub dir: String,
}

impl Record for TaskExec {
    fn type_name(&self) -> &'static str {
        "task.exec"
    }
    fn descriptor_fn(&self) -> fn() -> RecordDescriptor {
        Self::descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            own_fields: vec![
                FieldEntry {
                    canonical: "Command",
                    access: |r| FieldValue::Str(&downcast::<TaskExec>(r).command),
                },
                FieldEntry {
                    canonical: "Args",
                    access: |r| {
                        FieldValue::List(
                            downcast::<TaskExec>(r)
                                .args
                                .iter()
                                .map(|a| FieldValue::Str(a.as_str()))
                                .collect(),
                        )
                    },
                },
                FieldEntry {
                    canonical: "Dir",
                    access: |r| FieldValue::Str(&downcast::<TaskExec>(r).dir),
                },
            ],
            embeds: Vec::new(),
        }
    }
}

/// Materializes a file on disk with the given content and permissions.
#[derive(Debug, Default, Clone)]
pub struct FileContent {
    pub dest: String,
    pub content: String,
    pub mode: String,
}

impl Record for FileContent {
    fn type_name(&self) -> &'static str {
        "file.content"
    }
    fn descriptor_fn(&self) -> fn() -> RecordDescriptor {
        Self::descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            own_fields: vec![
                FieldEntry {
                    canonical: "Dest",
                    access: |r| FieldValue::Str(&downcast::<FileContent>(r).dest),
                },
                FieldEntry {
                    canonical: "Content",
                    access: |r| FieldValue::Str(&downcast::<FileContent>(r).content),
                },
                FieldEntry {
                    canonical: "Mode",
                    access: |r| FieldValue::Str(&downcast::<FileContent>(r).mode),
                },
            ],
            embeds: Vec::new(),
        }
    }
}

/// Ensures a system user account exists (demonstrates case-folded lookup,
/// `HOMEDIR` -> `HomeDir`).
#[derive(Debug, Default, Clone)]
pub struct UserUser {
    pub name: String,
    pub home_dir: String,
    pub shell: String,
}

impl Record for UserUser {
    fn type_name(&self) -> &'static str {
        "user.user"
    }
    fn descriptor_fn(&self) -> fn() -> RecordDescriptor {
        Self::descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            own_fields: vec![
                FieldEntry {
                    canonical: "Name",
                    access: |r| FieldValue::Str(&downcast::<UserUser>(r).name),
                },
                FieldEntry {
                    canonical: "HomeDir",
                    access: |r| FieldValue::Str(&downcast::<UserUser>(r).home_dir),
                },
                FieldEntry {
                    canonical: "Shell",
                    access: |r| FieldValue::Str(&downcast::<UserUser>(r).shell),
                },
            ],
            embeds: Vec::new(),
        }
    }
}

/// Retry/backoff knobs shared by polling resources. Both `RetryPolicy` and
/// `BackoffPolicy` declare a `delay` field, so when both are embedded in the
/// same outer record that name becomes ambiguous and is dropped.
#[derive(Debug, Default, Clone)]
pub struct RetryPolicy {
    pub delay: String,
    pub max_attempts: String,
}

impl Record for RetryPolicy {
    fn type_name(&self) -> &'static str {
        "wait.retry_policy"
    }
    fn descriptor_fn(&self) -> fn() -> RecordDescriptor {
        Self::descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            own_fields: vec![
                FieldEntry {
                    canonical: "Delay",
                    access: |r| FieldValue::Str(&downcast::<RetryPolicy>(r).delay),
                },
                FieldEntry {
                    canonical: "MaxAttempts",
                    access: |r| FieldValue::Str(&downcast::<RetryPolicy>(r).max_attempts),
                },
            ],
            embeds: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct BackoffPolicy {
    pub delay: String,
    pub factor: String,
}

impl Record for BackoffPolicy {
    fn type_name(&self) -> &'static str {
        "wait.backoff_policy"
    }
    fn descriptor_fn(&self) -> fn() -> RecordDescriptor {
        Self::descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            own_fields: vec![
                FieldEntry {
                    canonical: "Delay",
                    access: |r| FieldValue::Str(&downcast::<BackoffPolicy>(r).delay),
                },
                FieldEntry {
                    canonical: "Factor",
                    access: |r| FieldValue::Str(&downcast::<BackoffPolicy>(r).factor),
                },
            ],
            embeds: Vec::new(),
        }
    }
}

/// Polls a condition until satisfied or a retry budget is exhausted.
/// Embeds `retry` (named slot) and an anonymous `backoff` — both declare
/// `delay`, demonstrating the ambiguity-removal rule.
#[derive(Debug, Default, Clone)]
pub struct WaitQuery {
    pub query: String,
    pub retry: Option<RetryPolicy>,
    pub backoff: Option<BackoffPolicy>,
}

impl Record for WaitQuery {
    fn type_name(&self) -> &'static str {
        "wait.query"
    }
    fn descriptor_fn(&self) -> fn() -> RecordDescriptor {
        Self::descriptor
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn descriptor() -> RecordDescriptor {
        RecordDescriptor {
            own_fields: vec![FieldEntry {
                canonical: "Query",
                access: |r| FieldValue::Str(&downcast::<WaitQuery>(r).query),
            }],
            embeds: vec![
                EmbedSlot {
                    slot_name: Some("retry"),
                    type_name: "wait.retry_policy",
                    descriptor_fn: RetryPolicy::descriptor,
                    access: |r| {
                        downcast::<WaitQuery>(r)
                            .retry
                            .as_ref()
                            .map(|p| p as &dyn Record)
                    },
                },
                EmbedSlot {
                    slot_name: None,
                    type_name: "wait.backoff_policy",
                    descriptor_fn: BackoffPolicy::descriptor,
                    access: |r| {
                        downcast::<WaitQuery>(r)
                            .backoff
                            .as_ref()
                            .map(|p| p as &dyn Record)
                    },
                },
            ],
        }
    }
}
