// Worker job planning
// Pure part of the worker phase: node assignment, per-job graph and command line

use tracing::warn;

use super::constants::*;
use crate::application::context::RunContext;
use crate::domain::error::{DomainError, Result};
use crate::domain::node::ComputeNode;
use crate::domain::operators::{self, ARG_FILE, ARG_FORMAT_NAME, DEFAULT_OUTPUT_FORMAT, READ, WRITE};
use crate::domain::path::{join, normalize_path};
use crate::domain::template::{
    format_positional, resolve, strip_section, unresolved, Bindings, Placeholder,
    WORKER_OUTPUT_SECTION,
};
use crate::domain::{JobAssignment, ProcessingGraph};

/// A planned worker job and the graph document it runs
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub assignment: JobAssignment,
    pub graph: ProcessingGraph,
}

/// Node for the input at `index`: strict round-robin over the node list
pub fn assign_node(nodes: &[ComputeNode], index: usize) -> Option<&ComputeNode> {
    if nodes.is_empty() {
        return None;
    }
    nodes.get(index % nodes.len())
}

/// Point the graph at `input`: overwrite the leading step's source when it takes one directly,
/// otherwise prepend a read step.
pub fn bind_input(graph: &mut ProcessingGraph, input: &str) -> Result<()> {
    let direct = graph
        .leading_operator()
        .filter(|op| operators::takes_direct_input(op))
        .map(operators::input_argument);
    match direct {
        Some(argument) => {
            if let Some(step) = graph.leading_step_mut() {
                step.set_argument(argument, input);
            }
        }
        None => graph.insert_step(0, READ, "")?.set_argument(ARG_FILE, input),
    }
    Ok(())
}

/// Whether output clauses are stripped because a folder operator writes its own results
pub fn folder_mode(worker: &ProcessingGraph, coordinator: Option<&ProcessingGraph>) -> bool {
    let leading_is_folder_op =
        |g: &ProcessingGraph| g.leading_operator().is_some_and(operators::is_folder_operator);
    leading_is_folder_op(worker) || coordinator.is_some_and(leading_is_folder_op)
}

/// Build the job for input number `index` (0-based)
pub fn plan_job(
    ctx: &RunContext,
    worker_graph: &ProcessingGraph,
    index: usize,
    input: &str,
    folder_mode: bool,
) -> Result<PlannedJob> {
    let node = assign_node(&ctx.worker.nodes, index)
        .ok_or_else(|| DomainError::InvalidArgument("no worker nodes configured".to_string()))?
        .clone();
    if input.trim().is_empty() {
        return Err(DomainError::InvalidPath("empty input path".to_string()));
    }

    let sequence = index + 1;
    let platform = node.platform;
    let input_folder = ctx.resolve_shared(&ctx.worker.input_folder, platform);
    let output_folder = ctx.resolve_shared(&ctx.worker.output_folder, platform);
    let result_name = format!("{RESULT_PREFIX}{sequence}");
    let input_path = normalize_path(&join(&input_folder, input), platform);
    let output_file = normalize_path(
        &join(&output_folder, &format!("{result_name}{RESULT_EXTENSION}")),
        platform,
    );

    let mut graph = worker_graph.clone();
    bind_input(&mut graph, &input_path)?;
    if let Some(write) = graph.find_mut(WRITE) {
        write.set_argument(ARG_FILE, output_file.as_str());
        write.set_argument(
            ARG_FORMAT_NAME,
            node.output_format.as_deref().unwrap_or(DEFAULT_OUTPUT_FORMAT),
        );
    }

    let template = &ctx.templates.for_platform(platform).worker;
    let exec = if folder_mode {
        strip_section(&template.exec, WORKER_OUTPUT_SECTION)
    } else {
        template.exec.clone()
    };

    let mut bindings = Bindings::new()
        .with(
            Placeholder::ToolLocation,
            node.tool_location.clone().unwrap_or_else(|| template.tool.clone()),
        )
        .with(
            Placeholder::SharedFolder,
            normalize_path(ctx.shared_root(platform), platform),
        )
        .with(Placeholder::InputFile, output_file.as_str())
        .with(Placeholder::InputFolder, input_folder)
        .with(Placeholder::OutputFolder, output_folder);
    if let Some(leading) = graph.leading_step() {
        bindings = bindings
            .with(Placeholder::OperatorName, leading.operator.as_str())
            .with(Placeholder::OperatorArguments, leading.to_p_args());
    }

    let resolved = resolve(&exec, &bindings);
    let missing = unresolved(&resolved);
    if !missing.is_empty() {
        warn!(sequence, ?missing, "Worker command line has unresolved placeholders");
    }
    let counter = sequence.to_string();
    let relative_input = normalize_path(input, platform);
    let command_line = format_positional(
        &resolved,
        &[counter.as_str(), relative_input.as_str(), result_name.as_str()],
    )?;

    let graph_file = ctx.local_path(&super::graph_file_name(sequence));

    Ok(PlannedJob {
        assignment: JobAssignment {
            sequence,
            node,
            input: input.to_string(),
            command_line,
            graph_file,
            expected_output: output_file,
        },
        graph,
    })
}
