//! Field introspection over heterogeneous resource records.
//!
//! A resource kind declares its own fields and its embedded sub-record
//! slots once, at definition time (`Record::descriptor`). The flattening
//! analysis — outer fields shadow embeds, names shared by two or more
//! embeds become ambiguous and are dropped, a nil embed yields a nil value
//! rather than removing its slot name — runs once per type and is cached in
//! the process-wide `FieldMap` (the module-level statics below), never
//! evicted.

use crate::vertex::VertexId;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// A field value, as seen by the Template Renderer and the Reference
/// Resolver. Borrowed from the owning record, so it never outlives the
/// traversal that produced it.
#[derive(Debug, Clone)]
pub enum FieldValue<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'a str),
    List(Vec<FieldValue<'a>>),
    Record(&'a dyn Record),
    /// The `noderef` marker object produced by `DesugarCall`.
    NodeRef(VertexId),
}

impl fmt::Display for FieldValue<'_> {
    /// Stringifies primitives verbatim, as the Renderer does when
    /// substituting a resolved value back into a template string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, ""),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::Float(n) => write!(f, "{n}"),
            FieldValue::Str(s) => write!(f, "{s}"),
            FieldValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", rendered.join(", "))
            }
            FieldValue::Record(r) => write!(f, "<{}>", r.type_name()),
            FieldValue::NodeRef(id) => write!(f, "(noderef \"{id}\")"),
        }
    }
}

impl FieldValue<'_> {
    /// Type label used in error messages for scalar values (there's no
    /// static type name for a primitive the way there is for a `Record`).
    fn kind_label(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Str(_) => "string",
            FieldValue::List(_) => "list",
            FieldValue::Record(_) => "record",
            FieldValue::NodeRef(_) => "noderef",
        }
    }
}

/// A resource record: a kind tag, drawn from the Registry, plus a set of
/// named fields whose values are only known at configuration-load time.
///
/// Object-safe by construction: `descriptor` (the one `Self: Sized` method)
/// is never called through `dyn Record` — `descriptor_fn` hands back the
/// function pointer instead, so the FieldMap cache can build a type's table
/// without needing an instance of it.
pub trait Record: fmt::Debug + Send + Sync {
    /// Stable kind name, e.g. `"file.content"`.
    fn type_name(&self) -> &'static str;

    /// This type's own `descriptor()`, as a value — lets the cache compute
    /// a `FieldTable` for a type it has only seen as `&dyn Record`.
    fn descriptor_fn(&self) -> fn() -> RecordDescriptor;

    /// For downcasting inside hand-written field accessors.
    fn as_any(&self) -> &dyn Any;

    /// This type's field/embed declaration. Called once per type by the
    /// FieldMap cache, never per instance.
    fn descriptor() -> RecordDescriptor
    where
        Self: Sized;
}

/// One of this type's own named fields.
pub struct FieldEntry {
    pub canonical: &'static str,
    pub access: fn(&dyn Record) -> FieldValue<'_>,
}

/// An embedded sub-record slot, declared at record-definition time.
pub struct EmbedSlot {
    /// If present, the embed is itself directly accessible under this
    /// name — `None` for a purely anonymous flatten.
    pub slot_name: Option<&'static str>,
    pub type_name: &'static str,
    pub descriptor_fn: fn() -> RecordDescriptor,
    /// Borrow the embedded sub-record, or `None` if it is absent (nil).
    pub access: fn(&dyn Record) -> Option<&dyn Record>,
}

/// A resource kind's declared fields and embedded slots — the input to
/// building its `FieldTable`.
#[derive(Default)]
pub struct RecordDescriptor {
    pub own_fields: Vec<FieldEntry>,
    pub embeds: Vec<EmbedSlot>,
}

/// A field accessor: plain fn pointers (not closures, which can't be stored
/// as `fn`), downcasting `&dyn Record` back to the concrete type internally.
/// The higher-ranked signature ties the returned value's lifetime to the
/// borrow of `self`, so no `'static` games are needed to store it.
type AccessFn = for<'a> fn(&'a dyn Record) -> FieldValue<'a>;

enum Resolved {
    Own(AccessFn),
    /// The embed slot's own name.
    EmbedSlot(usize),
    /// A field promoted up from exactly one embed.
    Promoted { slot: usize, canonical: &'static str },
}

/// The flattened, case-folded field map for one record type — the concrete
/// form of a "field map".
pub struct FieldTable {
    type_name: &'static str,
    descriptor: RecordDescriptor,
    // lowercase field name -> resolution
    by_lower: HashMap<String, Resolved>,
    // canonical names, for ListFields / error messages, stable order.
    canonical_order: Vec<String>,
}

impl FieldTable {
    fn build(type_name: &'static str, descriptor: RecordDescriptor) -> Self {
        let mut by_lower = HashMap::new();
        let mut canonical_order = Vec::new();
        let mut owned = std::collections::HashSet::new();

        for entry in &descriptor.own_fields {
            owned.insert(entry.canonical.to_lowercase());
        }
        for entry in &descriptor.own_fields {
            let lower = entry.canonical.to_lowercase();
            by_lower.insert(lower, Resolved::Own(entry.access));
            canonical_order.push(entry.canonical.to_string());
        }

        // candidate promoted fields: lowercase name -> occurrences across embeds
        let mut candidates: HashMap<String, Vec<(usize, &'static str)>> = HashMap::new();

        for (slot_index, slot) in descriptor.embeds.iter().enumerate() {
            if let Some(slot_name) = slot.slot_name {
                let lower = slot_name.to_lowercase();
                if !owned.contains(&lower) {
                    by_lower.insert(lower.clone(), Resolved::EmbedSlot(slot_index));
                    canonical_order.push(slot_name.to_string());
                }
            }

            let embedded_table = field_table_by_type(slot.type_name, slot.descriptor_fn);
            for lower in embedded_table.by_lower.keys() {
                if owned.contains(lower) {
                    continue; // outer field wins unambiguously (rule 3)
                }
                let canonical = embedded_table.canonical_for(lower);
                candidates
                    .entry(lower.clone())
                    .or_default()
                    .push((slot_index, canonical));
            }
        }

        for (lower, occurrences) in candidates {
            if occurrences.len() == 1 {
                let (slot, canonical) = occurrences[0];
                let is_new = !by_lower.contains_key(&lower);
                by_lower.insert(lower, Resolved::Promoted { slot, canonical });
                if is_new {
                    canonical_order.push(canonical.to_string());
                }
            }
            // 2+ occurrences: ambiguous, removed from the map (rule 2).
        }

        canonical_order.sort();
        canonical_order.dedup();

        Self {
            type_name,
            descriptor,
            by_lower,
            canonical_order,
        }
    }

    fn canonical_for(&self, lower: &str) -> &'static str {
        match self.by_lower.get(lower) {
            Some(Resolved::Own(_)) => {
                // own_fields canonical names are the source of truth.
                self.descriptor
                    .own_fields
                    .iter()
                    .find(|e| e.canonical.to_lowercase() == lower)
                    .map(|e| e.canonical)
                    .unwrap_or_default()
            }
            Some(Resolved::EmbedSlot(i)) => self.descriptor.embeds[*i].slot_name.unwrap_or(""),
            Some(Resolved::Promoted { canonical, .. }) => canonical,
            None => "",
        }
    }

    pub fn has_field(&self, lowercased: &str) -> bool {
        self.by_lower.contains_key(lowercased)
    }

    pub fn list_fields(&self) -> &[String] {
        &self.canonical_order
    }

    pub fn lookup_canonical(&self, lowercased: &str) -> Option<&'static str> {
        self.by_lower
            .contains_key(lowercased)
            .then(|| self.canonical_for(lowercased))
    }

    fn get<'a>(&self, record: &'a dyn Record, lowercased: &str) -> Option<FieldValue<'a>> {
        match self.by_lower.get(lowercased)? {
            Resolved::Own(access) => Some(access(record)),
            Resolved::EmbedSlot(i) => {
                let slot = &self.descriptor.embeds[*i];
                Some(match (slot.access)(record) {
                    Some(sub) => FieldValue::Record(sub),
                    None => FieldValue::Null,
                })
            }
            Resolved::Promoted { slot, canonical } => {
                let slot = &self.descriptor.embeds[*slot];
                match (slot.access)(record) {
                    Some(sub) => {
                        let sub_table = field_table_by_type(slot.type_name, slot.descriptor_fn);
                        sub_table.get(sub, &canonical.to_lowercase())
                    }
                    None => Some(FieldValue::Null),
                }
            }
        }
    }
}

/// Errors raised by field introspection.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("field traversal hit a null value before reaching the end of the path")]
    Unresolvable,
    #[error("type {type_name} has no field {name:?}; valid fields: {valid:?}")]
    MissingField {
        type_name: &'static str,
        name: String,
        valid: Vec<String>,
    },
    #[error("{type_name} is not a record")]
    NotAStruct { type_name: &'static str },
}

/// `HasField(value, name)`.
pub fn has_field(record: &dyn Record, name: &str) -> bool {
    field_table(record).has_field(&name.to_lowercase())
}

/// `ListFields(value)`. Records are always structs, so this never fails —
/// `NotAStruct` only arises mid-traversal, once a scalar has been reached
/// (see `eval_terms`).
pub fn list_fields(record: &dyn Record) -> Vec<String> {
    field_table(record).list_fields().to_vec()
}

/// `LookupCanonicalFieldName(type, lowercased)`.
pub fn lookup_canonical_field_name<'a>(
    record: &'a dyn Record,
    lowercased: &str,
) -> Result<&'a str, FieldError> {
    field_table(record)
        .lookup_canonical(lowercased)
        .ok_or_else(|| FieldError::MissingField {
            type_name: record.type_name(),
            name: lowercased.to_string(),
            valid: list_fields(record),
        })
}

/// `EvalTerms(value, [t1, t2, ...])`: left-fold field access.
pub fn eval_terms<'a>(start: &'a dyn Record, terms: &[&str]) -> Result<FieldValue<'a>, FieldError> {
    let mut current = FieldValue::Record(start);
    for term in terms {
        let lowered = term.to_lowercase();
        current = match current {
            FieldValue::Null => return Err(FieldError::Unresolvable),
            FieldValue::Record(r) => {
                let table = field_table(r);
                match table.get(r, &lowered) {
                    Some(v) => v,
                    None => {
                        return Err(FieldError::MissingField {
                            type_name: r.type_name(),
                            name: term.to_string(),
                            valid: list_fields(r),
                        });
                    }
                }
            }
            other => {
                return Err(FieldError::NotAStruct {
                    type_name: other.kind_label(),
                });
            }
        };
    }
    Ok(current)
}

// ---------------------------------------------------------------------------
// The process-wide FieldMap cache.
// ---------------------------------------------------------------------------

type FieldMapCache = RwLock<HashMap<&'static str, Arc<FieldTable>>>;

fn field_map_cache() -> &'static FieldMapCache {
    static CACHE: OnceLock<FieldMapCache> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Look up (or lazily build) the `FieldTable` for a type, given only its
/// type name and `descriptor` function — used both for a live `&dyn Record`
/// and, recursively, for embedded slots that have no instance at hand yet.
fn field_table_by_type(type_name: &'static str, descriptor_fn: fn() -> RecordDescriptor) -> Arc<FieldTable> {
    if let Some(table) = field_map_cache()
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(type_name)
    {
        return Arc::clone(table);
    }
    // Build outside the write lock: flattening only reads other (already
    // cached-or-building) tables, and a duplicate build is harmless — the
    // invariant is "same input -> same mapping", not "built exactly once".
    let table = Arc::new(FieldTable::build(type_name, descriptor_fn()));
    let mut guard = field_map_cache()
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Arc::clone(guard.entry(type_name).or_insert(table))
}

/// `FieldMap(R)`: the cached table for a live record's concrete type.
pub fn field_table(record: &dyn Record) -> Arc<FieldTable> {
    field_table_by_type(record.type_name(), record.descriptor_fn())
}

/// Lets the graph, resolver, and pipeline stay generic over how a vertex
/// owns its record (`Arc<dyn Record>` for sharing across concurrent
/// renderers, `Box<dyn Record>` for exclusively-owned graphs).
pub trait AsRecord {
    fn as_record(&self) -> &dyn Record;
}

impl AsRecord for Arc<dyn Record> {
    fn as_record(&self) -> &dyn Record {
        self.as_ref()
    }
}

impl AsRecord for Box<dyn Record> {
    fn as_record(&self) -> &dyn Record {
        self.as_ref()
    }
}
