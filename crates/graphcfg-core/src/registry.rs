//! Resource Registry: name -> constructor mapping for resource kinds
//! contributed by external plugins.

use crate::record::Record;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds an empty/default instance of one resource kind, used at parse
/// time to bind a freshly-declared vertex before its fields are filled in.
pub type RecordConstructor = Arc<dyn Fn() -> Box<dyn Record> + Send + Sync>;

/// Raised by `Registry::register` on a duplicate kind name.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("resource kind already registered: {0}")]
pub struct AlreadyRegistered(pub String);

/// Process-wide (or per-run) `kind-name -> constructor` mapping. Registration
/// is append-only: a kind name, once registered, can never be replaced.
#[derive(Default)]
pub struct Registry {
    kinds: HashMap<String, RecordConstructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource kind's prototype constructor. Fails with
    /// `AlreadyRegistered` if the name is already bound.
    pub fn register(
        &mut self,
        kind_name: impl Into<String>,
        constructor: RecordConstructor,
    ) -> Result<(), AlreadyRegistered> {
        let kind_name = kind_name.into();
        if self.kinds.contains_key(&kind_name) {
            return Err(AlreadyRegistered(kind_name));
        }
        self.kinds.insert(kind_name, constructor);
        Ok(())
    }

    /// Construct a fresh, empty record for a registered kind.
    pub fn construct(&self, kind_name: &str) -> Option<Box<dyn Record>> {
        self.kinds.get(kind_name).map(|ctor| ctor())
    }

    pub fn contains(&self, kind_name: &str) -> bool {
        self.kinds.contains_key(kind_name)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDescriptor;
    use std::any::Any;

    #[derive(Debug)]
    struct Dummy;

    impl Record for Dummy {
        fn type_name(&self) -> &'static str {
            "test.dummy"
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

    fn dummy_ctor() -> RecordConstructor {
        Arc::new(|| Box::new(Dummy) as Box<dyn Record>)
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut reg = Registry::new();
        reg.register("test.dummy", dummy_ctor()).unwrap();
        assert_eq!(
            reg.register("test.dummy", dummy_ctor()),
            Err(AlreadyRegistered("test.dummy".to_string()))
        );
    }

    #[test]
    fn construct_builds_a_fresh_record() {
        let mut reg = Registry::new();
        reg.register("test.dummy", dummy_ctor()).unwrap();
        let built = reg.construct("test.dummy").unwrap();
        assert_eq!(built.type_name(), "test.dummy");
        assert!(reg.construct("test.missing").is_none());
    }
}
