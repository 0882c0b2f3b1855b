// Processing graph: an ordered arena of steps linked to their predecessors by index

pub mod argument;
pub mod markup;
pub mod step;

pub use argument::{parse_arguments, ArgValue, NamedExpression, Record, StructuredList};
pub use step::ProcessingStep;

use crate::domain::error::{DomainError, Result};

/// Ordered chain of processing steps.
///
/// Step `i > 0` points at step `i - 1` unless a parsed document declared another source.
/// Insertion only ever links backwards, so the structure cannot form cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingGraph {
    steps: Vec<ProcessingStep>,
}

impl ProcessingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step whose input is the current last step
    pub fn add_step(&mut self, operator: &str, raw_arguments: &str) -> Result<&mut ProcessingStep> {
        let index = self.steps.len();
        self.insert_step(index, operator, raw_arguments)
    }

    /// Insert a step at `index`, re-linking the step that follows it.
    pub fn insert_step(
        &mut self,
        index: usize,
        operator: &str,
        raw_arguments: &str,
    ) -> Result<&mut ProcessingStep> {
        if index > self.steps.len() {
            return Err(DomainError::StepIndexOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        let operator = operator.trim();
        if operator.is_empty() {
            return Err(DomainError::InvalidChain("empty operator name".to_string()));
        }
        let arguments = parse_arguments(raw_arguments)?;

        let mut step = ProcessingStep::new(self.unique_id(operator), operator);
        step.arguments = arguments;
        step.predecessor = index.checked_sub(1);

        for existing in &mut self.steps {
            if let Some(p) = existing.predecessor.as_mut() {
                if *p >= index {
                    *p += 1;
                }
            }
        }
        self.steps.insert(index, step);
        if let Some(next) = self.steps.get_mut(index + 1) {
            next.predecessor = Some(index);
        }
        Ok(&mut self.steps[index])
    }

    /// `Op` for the first occurrence of an operator, then `Op(2)`, `Op(3)`, ...
    pub fn unique_id(&self, operator: &str) -> String {
        let taken = |id: &str| self.steps.iter().any(|s| s.id == id);
        if !taken(operator) {
            return operator.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{operator}({n})");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn step(&self, index: usize) -> Option<&ProcessingStep> {
        self.steps.get(index)
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut ProcessingStep> {
        self.steps.get_mut(index)
    }

    /// Lookup by declared id first, then by operator name
    pub fn find(&self, key: &str) -> Option<&ProcessingStep> {
        self.position(key).map(|i| &self.steps[i])
    }

    pub fn find_mut(&mut self, key: &str) -> Option<&mut ProcessingStep> {
        self.position(key).map(move |i| &mut self.steps[i])
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.id == key)
            .or_else(|| self.steps.iter().position(|s| s.operator == key))
    }

    pub fn steps(&self) -> &[ProcessingStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn leading_step(&self) -> Option<&ProcessingStep> {
        self.steps.first()
    }

    pub fn leading_step_mut(&mut self) -> Option<&mut ProcessingStep> {
        self.steps.first_mut()
    }

    pub fn leading_operator(&self) -> Option<&str> {
        self.leading_step().map(|s| s.operator.as_str())
    }

    pub fn predecessor_of(&self, index: usize) -> Option<&ProcessingStep> {
        self.steps
            .get(index)
            .and_then(|s| s.predecessor)
            .and_then(|p| self.steps.get(p))
    }

    /// Build a linear graph from `Op{"-Pk=v"}|Op2|Op3{...}`.
    ///
    /// `|` inside braces belongs to the arguments.
    pub fn from_chain(chain: &str) -> Result<Self> {
        let mut graph = ProcessingGraph::new();
        for segment in split_chain(chain)? {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(DomainError::InvalidChain(format!("empty segment in '{chain}'")));
            }
            let (operator, raw) = match segment.find('{') {
                Some(open) => {
                    let body = segment[open + 1..].strip_suffix('}').ok_or_else(|| {
                        DomainError::InvalidChain(format!("unterminated arguments in '{segment}'"))
                    })?;
                    (&segment[..open], body)
                }
                None => (segment, ""),
            };
            graph.add_step(operator, raw)?;
        }
        if graph.is_empty() {
            return Err(DomainError::InvalidChain("empty operator chain".to_string()));
        }
        Ok(graph)
    }
}

fn split_chain(chain: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in chain.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    DomainError::InvalidChain(format!("unbalanced '}}' in '{chain}'"))
                })?
            }
            '|' if depth == 0 => {
                segments.push(&chain[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(DomainError::InvalidChain(format!("unbalanced '{{' in '{chain}'")));
    }
    if !chain.trim().is_empty() {
        segments.push(&chain[start..]);
    }
    Ok(segments)
}
