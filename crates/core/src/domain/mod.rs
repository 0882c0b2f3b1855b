// Domain Layer - Pure processing-graph and command-line logic

pub mod error;
pub mod graph;
pub mod job;
pub mod node;
pub mod operators;
pub mod path;
pub mod template;

// Re-exports
pub use error::DomainError;
pub use graph::{ArgValue, NamedExpression, ProcessingGraph, ProcessingStep, Record, StructuredList};
pub use job::{CoordinatorJob, JobAssignment};
pub use node::{ComputeNode, Platform};
pub use template::{Bindings, CommandTemplate, Placeholder, RoleTemplate, TemplateSet};
