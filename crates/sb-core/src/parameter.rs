//! Stored-procedure parameter collections

use serde::{Deserialize, Serialize};

use crate::shard::ShardId;
use crate::value::DbValue;

/// Parameter direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl Direction {
    /// Whether the provider writes a value back after execution
    pub fn is_output(self) -> bool {
        !matches!(self, Direction::Input)
    }
}

/// A named procedure parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: DbValue,
    pub direction: Direction,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<DbValue>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            direction,
        }
    }
}

/// Ordered parameter list handed to a provider command
///
/// Positions are stable: a parameter keeps its index for the lifetime of the
/// collection, which is what lets a shard id be stamped by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterCollection {
    params: Vec<Parameter>,
}

impl ParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `add_input`
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.add_input(name, value);
        self
    }

    /// Builder form of `add_output`
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.add_output(name);
        self
    }

    /// Builder form of `add_return_value`
    pub fn with_return_value(mut self) -> Self {
        self.add_return_value();
        self
    }

    /// Append an input parameter, returning its position
    pub fn add_input(&mut self, name: impl Into<String>, value: impl Into<DbValue>) -> usize {
        self.push(Parameter::new(name, value, Direction::Input))
    }

    /// Append an output parameter, returning its position
    pub fn add_output(&mut self, name: impl Into<String>) -> usize {
        self.push(Parameter::new(name, DbValue::Null, Direction::Output))
    }

    pub fn add_input_output(
        &mut self,
        name: impl Into<String>,
        value: impl Into<DbValue>,
    ) -> usize {
        self.push(Parameter::new(name, value, Direction::InputOutput))
    }

    /// Append the procedure return-value slot
    pub fn add_return_value(&mut self) -> usize {
        self.push(Parameter::new(
            "RETURN_VALUE",
            DbValue::Null,
            Direction::ReturnValue,
        ))
    }

    fn push(&mut self, param: Parameter) -> usize {
        self.params.push(param);
        self.params.len() - 1
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Parameter> {
        self.params.get(position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut Parameter> {
        self.params.get_mut(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.params.iter_mut()
    }

    /// Position of a parameter by name (case-insensitive, leading `@` ignored)
    pub fn position(&self, name: &str) -> Option<usize> {
        let wanted = name.trim_start_matches('@');
        self.params
            .iter()
            .position(|p| p.name.trim_start_matches('@').eq_ignore_ascii_case(wanted))
    }

    /// Value of a parameter by name
    pub fn value(&self, name: &str) -> Option<&DbValue> {
        self.position(name).map(|i| &self.params[i].value)
    }

    /// Overwrite the value at `position`; false if out of range
    pub fn set_value(&mut self, position: usize, value: impl Into<DbValue>) -> bool {
        match self.params.get_mut(position) {
            Some(param) => {
                param.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Write a shard id into the parameter at `position`
    pub fn stamp_shard(&mut self, position: usize, shard_id: ShardId) -> bool {
        self.set_value(position, shard_id)
    }

    /// The procedure return-value parameter, if declared
    pub fn return_value(&self) -> Option<&Parameter> {
        self.params
            .iter()
            .find(|p| p.direction == Direction::ReturnValue)
    }

    /// First output or input-output parameter
    pub fn first_output(&self) -> Option<&Parameter> {
        self.params
            .iter()
            .find(|p| matches!(p.direction, Direction::Output | Direction::InputOutput))
    }

    /// Copy values of every output-direction parameter from `executed`
    ///
    /// `executed` must be a clone of this collection that a provider ran;
    /// parameters are matched by position.
    pub fn copy_outputs_from(&mut self, executed: &ParameterCollection) {
        for (mine, theirs) in self.params.iter_mut().zip(executed.params.iter()) {
            if mine.direction.is_output() {
                mine.value = theirs.value.clone();
            }
        }
    }
}

impl FromIterator<Parameter> for ParameterCollection {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_stable() {
        let mut params = ParameterCollection::new();
        assert_eq!(params.add_input("@ShardId", DbValue::Null), 0);
        assert_eq!(params.add_input("@WidgetId", 7_i32), 1);
        assert_eq!(params.add_output("@Name"), 2);
        assert_eq!(params.len(), 3);
        assert_eq!(params.position("widgetid"), Some(1));
        assert_eq!(params.position("@name"), Some(2));
    }

    #[test]
    fn test_stamp_shard() {
        let mut params = ParameterCollection::new()
            .with_input("@ShardId", DbValue::Null)
            .with_input("@Id", 1_i64);
        assert!(params.stamp_shard(0, 4));
        assert_eq!(params.value("ShardId"), Some(&DbValue::SmallInt(4)));
        assert!(!params.stamp_shard(5, 4));
    }

    #[test]
    fn test_output_lookup() {
        let params = ParameterCollection::new()
            .with_input("@Id", 1_i32)
            .with_return_value()
            .with_output("@Total");
        assert_eq!(params.return_value().unwrap().name, "RETURN_VALUE");
        assert_eq!(params.first_output().unwrap().name, "@Total");
    }

    #[test]
    fn test_copy_outputs_leaves_inputs() {
        let mut original = ParameterCollection::new()
            .with_input("@Id", 1_i32)
            .with_output("@Total");
        let mut executed = original.clone();
        executed.set_value(0, 99_i32);
        executed.set_value(1, 12.5);
        original.copy_outputs_from(&executed);
        assert_eq!(original.value("@Id"), Some(&DbValue::Int(1)));
        assert_eq!(original.value("@Total"), Some(&DbValue::Double(12.5)));
    }
}
