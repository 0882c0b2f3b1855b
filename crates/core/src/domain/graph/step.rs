// Processing step: one operator invocation inside a graph

use super::argument::{format_arguments, upsert, ArgValue, NamedExpression, StructuredList};

pub const VARIABLES_KEY: &str = "variables";
pub const VARIABLE_ELEMENT: &str = "variable";
pub const CONDITIONS_KEY: &str = "conditions";
pub const CONDITION_ELEMENT: &str = "condition";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingStep {
    /// Declared id, unique within the graph
    pub id: String,
    pub operator: String,
    /// Index of the step producing this step's input
    pub(crate) predecessor: Option<usize>,
    pub(crate) arguments: Vec<(String, ArgValue)>,
}

impl ProcessingStep {
    pub fn new(id: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operator: operator.into(),
            predecessor: None,
            arguments: Vec::new(),
        }
    }

    pub fn predecessor(&self) -> Option<usize> {
        self.predecessor
    }

    pub fn arguments(&self) -> &[(String, ArgValue)] {
        &self.arguments
    }

    pub fn argument(&self, key: &str) -> Option<&ArgValue> {
        self.arguments.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Scalar argument value, `None` when absent or structured
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.argument(key).and_then(ArgValue::as_scalar)
    }

    pub fn set_argument(&mut self, key: &str, value: impl Into<ArgValue>) {
        upsert(&mut self.arguments, key, value.into());
    }

    pub fn variables(&self) -> Vec<NamedExpression> {
        self.named_expressions(VARIABLE_ELEMENT)
    }

    pub fn conditions(&self) -> Vec<NamedExpression> {
        self.named_expressions(CONDITION_ELEMENT)
    }

    pub fn set_variable(&mut self, name: &str, expression: &str) {
        self.set_named_expression(VARIABLES_KEY, VARIABLE_ELEMENT, name, expression);
    }

    pub fn set_condition(&mut self, name: &str, expression: &str) {
        self.set_named_expression(CONDITIONS_KEY, CONDITION_ELEMENT, name, expression);
    }

    /// Arguments in `-Pkey=value` form
    pub fn to_p_args(&self) -> String {
        format_arguments(&self.arguments)
    }

    fn named_expressions(&self, element: &str) -> Vec<NamedExpression> {
        self.arguments
            .iter()
            .filter_map(|(_, v)| v.as_list())
            .filter(|list| list.element == element)
            .flat_map(|list| list.records.iter().filter_map(NamedExpression::from_record))
            .collect()
    }

    fn set_named_expression(&mut self, key: &str, element: &str, name: &str, expression: &str) {
        let entry = NamedExpression {
            name: name.to_string(),
            expression: expression.to_string(),
        };

        let mut list = match self.argument(key) {
            Some(ArgValue::List(list)) => list.clone(),
            _ => StructuredList::new(element),
        };
        if list.element.is_empty() {
            list.element = element.to_string();
        }
        let existing = list
            .records
            .iter()
            .position(|r| NamedExpression::from_record(r).is_some_and(|e| e.name == name));
        match existing {
            Some(pos) => list.records[pos] = entry.to_record(),
            None => list.records.push(entry.to_record()),
        }
        self.set_argument(key, list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_argument_overwrites_in_place() {
        let mut step = ProcessingStep::new("Read", "Read");
        step.set_argument("file", "/a");
        step.set_argument("formatName", "SAFE");
        step.set_argument("file", "/b");
        assert_eq!(step.arguments().len(), 2);
        assert_eq!(step.arguments()[0].0, "file");
        assert_eq!(step.scalar("file"), Some("/b"));
    }

    #[test]
    fn test_variables_upsert_by_name() {
        let mut step = ProcessingStep::new("BandMaths", "BandMaths");
        step.set_variable("ndvi", "(B8-B4)/(B8+B4)");
        step.set_variable("flags", "B1 > 0");
        step.set_variable("ndvi", "B8");
        step.set_condition("valid", "flags");

        let vars = step.variables();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "ndvi");
        assert_eq!(vars[0].expression, "B8");
        assert_eq!(step.conditions()[0].name, "valid");
        assert_eq!(
            step.argument(VARIABLES_KEY).and_then(ArgValue::as_list).map(|l| l.element.as_str()),
            Some(VARIABLE_ELEMENT)
        );
    }
}
