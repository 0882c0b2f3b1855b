// Job Domain Model

use crate::domain::node::ComputeNode;

/// One worker invocation planned for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAssignment {
    /// 1-based position of the input in the run, also used in file names
    pub sequence: usize,
    pub node: ComputeNode,
    /// Input path as discovered, relative to the input folder
    pub input: String,
    /// Fully rendered command line, executed as one remote command string
    pub command_line: String,
    /// Graph document persisted for this job
    pub graph_file: String,
    /// Output path as seen by the worker, recorded before execution
    pub expected_output: String,
}

impl JobAssignment {
    pub fn host(&self) -> &str {
        &self.node.name
    }

    pub fn port(&self) -> u16 {
        self.node.ssh_port
    }
}

/// The single aggregation invocation run on the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorJob {
    pub graph_file: String,
    /// Worker outputs mapped into the coordinator's local namespace
    pub inputs: Vec<String>,
    pub arguments: Vec<String>,
}

impl CoordinatorJob {
    pub fn command_line(&self) -> String {
        self.arguments.join(" ")
    }
}
