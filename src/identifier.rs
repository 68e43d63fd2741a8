//! The (name, optional backing definition) pair returned by dependency
//! introspection.

use crate::definition::FormulaDefinition;
use serde::{Deserialize, Serialize};

/// One name referenced somewhere in a target's composite, annotated with
/// the formula that defines it, if any — otherwise the name is assumed to
/// be a context member or built-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub definition: Option<FormulaDefinition>,
}

impl Identifier {
    pub fn new(name: impl Into<String>, definition: Option<FormulaDefinition>) -> Self {
        Self { name: name.into(), definition }
    }

    pub fn is_formula(&self) -> bool {
        self.definition.is_some()
    }
}
