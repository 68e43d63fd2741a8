//! The host-supplied read-only name environment a formula evaluates against.

use crate::value::Value;

/// A source of named values external to the formula network itself.
///
/// Replaces the specification's generic context type parameter `C`: this
/// crate's expression language is not reflective, so there is nothing for a
/// generic `C` to buy beyond a lookup-by-name seam. Implement this directly
/// over whatever the host's domain object is (a request, a row, a struct).
pub trait Context {
    fn get(&self, name: &str) -> Option<Value>;
}

/// A simple in-memory [`Context`] backed by a map, useful for tests and for
/// hosts with no richer object to adapt.
#[derive(Debug, Clone, Default)]
pub struct MapContext(std::collections::HashMap<String, Value>);

impl MapContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }
}

impl Context for MapContext {
    fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_context_round_trips_inserted_values() {
        let ctx = MapContext::new().with("age", Value::Integer(30));
        assert_eq!(ctx.get("age"), Some(Value::Integer(30)));
        assert_eq!(ctx.get("missing"), None);
    }
}
