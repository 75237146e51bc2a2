// A frame is a small, insertion-ordered set of variables. Lookups are
// linear: frames rarely hold more than a handful of names, and a
// plain Vec keeps insertion order for free, which BREAK's diagnostic
// dump and the stats collector's peak-variable count both rely on.

use crate::error::Error;
use crate::variable::Variable;

#[derive(Clone, Debug, Default)]
pub struct Frame {
    vars: Vec<Variable>,
}

impl Frame {
    pub fn new() -> Frame {
        Frame { vars: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    /// Create `name` in this frame. Fails if the name is already
    /// defined here (duplicate DEFVAR is a load-adjacent semantic
    /// error, not a runtime type error).
    pub fn define(&mut self, name: &str) -> Result<(), Error> {
        if self.vars.iter().any(|v| v.name == name) {
            return Err(Error::Semantic(format!("variable already defined: {}", name)));
        }
        self.vars.push(Variable::new(name));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Variable, Error> {
        self.vars
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::UndefinedVariable(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Variable, Error> {
        self.vars
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::UndefinedVariable(name.to_string()))
    }
}
