// Orchestrator - fan-out of worker jobs, then one aggregation run on the coordinator

pub mod constants;
pub mod planning;

use constants::*;
pub use planning::{assign_node, bind_input, folder_mode, plan_job, PlannedJob};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::application::barrier::CompletionBarrier;
use crate::application::context::RunContext;
use crate::application::pool::WorkerPool;
use crate::application::runner::{run_tracked, ExecutionReport};
use crate::domain::operators::{self, ARG_SOURCE_FOLDER};
use crate::domain::path::{normalize_path, relative_to};
use crate::domain::template::{
    resolve, strip_section, unresolved, Bindings, Placeholder, COORDINATOR_OUTPUT_SECTION,
};
use crate::domain::{CoordinatorJob, JobAssignment, ProcessingGraph};
use crate::error::{AppError, Result};
use crate::port::{
    ExecutionState, ExecutionTarget, Executor, ExecutorFactory, ExecutorKind, InputDiscovery,
    TimeProvider,
};

/// What a run produced
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub jobs: Vec<JobAssignment>,
    /// Final state of each worker executor, in job order. Empty when resuming.
    pub worker_states: Vec<(String, ExecutionState)>,
    /// Hosts whose job had not signalled completion when the worker phase stopped waiting
    pub unfinished_hosts: Vec<String>,
    /// Worker outputs recorded when the jobs were planned
    pub outputs: Vec<String>,
    pub coordinator: Option<CoordinatorJob>,
    /// `None` when the coordinator did not finish within its budget
    pub coordinator_report: Option<ExecutionReport>,
}

pub struct Orchestrator {
    context: Arc<RunContext>,
    executors: Arc<dyn ExecutorFactory>,
    pool: Arc<WorkerPool>,
    clock: Arc<dyn TimeProvider>,
}

impl Orchestrator {
    pub fn new(
        context: Arc<RunContext>,
        executors: Arc<dyn ExecutorFactory>,
        pool: Arc<WorkerPool>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            context,
            executors,
            pool,
            clock,
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Scan the shared input folder from the coordinator's point of view
    pub fn discover_inputs(&self, discovery: &dyn InputDiscovery) -> Result<Vec<String>> {
        let ctx = &self.context;
        let search = &ctx.search;
        info!(
            "Searching for Sentinel-2 {} products between {} and {}, containing tiles {}",
            search.product_type,
            search.start_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            search.end_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            search.tiles.join(",")
        );

        let root = ctx.resolve_shared(&ctx.worker.input_folder, ctx.coordinator_platform());
        info!("Scanning {}", root);
        let inputs = discovery.discover(Path::new(&root), search)?;
        for input in &inputs {
            info!("Found candidate input {}", input);
        }
        info!("{} products found", inputs.len());
        Ok(inputs)
    }

    /// Run both phases and shut the pool down.
    ///
    /// Only setup failures are returned as errors; job failures are logged.
    pub async fn run(
        &self,
        inputs: &[String],
        worker_graph: &ProcessingGraph,
        coordinator_graph: Option<&ProcessingGraph>,
    ) -> Result<RunSummary> {
        let result = self.run_phases(inputs, worker_graph, coordinator_graph).await;
        self.pool
            .shutdown(Duration::from_millis(GRACEFUL_SHUTDOWN_TIMEOUT_MS))
            .await;
        result
    }

    async fn run_phases(
        &self,
        inputs: &[String],
        worker_graph: &ProcessingGraph,
        coordinator_graph: Option<&ProcessingGraph>,
    ) -> Result<RunSummary> {
        self.prepare_output_folder().await?;

        let jobs = self.build_jobs(inputs, worker_graph, coordinator_graph).await;
        let outputs: Vec<String> = jobs.iter().map(|j| j.expected_output.clone()).collect();

        let (worker_states, unfinished_hosts) = if self.context.resume {
            info!("Resuming: worker phase skipped");
            (Vec::new(), Vec::new())
        } else {
            self.dispatch_workers(&jobs).await
        };

        let mut summary = RunSummary {
            jobs,
            worker_states,
            unfinished_hosts,
            outputs,
            ..RunSummary::default()
        };

        if let Some(graph) = coordinator_graph {
            let (job, report) = self.run_coordinator(graph, &summary.outputs).await?;
            summary.coordinator = Some(job);
            summary.coordinator_report = report;
        }
        Ok(summary)
    }

    async fn prepare_output_folder(&self) -> Result<()> {
        let folder = self.context.local_path(&self.context.worker.output_folder);
        tokio::fs::create_dir_all(&folder).await?;
        self.fix_permissions(&folder).await;
        Ok(())
    }

    /// Plan and persist one job per input. Inputs that fail are logged and skipped.
    pub async fn build_jobs(
        &self,
        inputs: &[String],
        worker_graph: &ProcessingGraph,
        coordinator_graph: Option<&ProcessingGraph>,
    ) -> Vec<JobAssignment> {
        let folder_mode = folder_mode(worker_graph, coordinator_graph);
        let mut jobs = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            let planned = match plan_job(&self.context, worker_graph, index, input, folder_mode) {
                Ok(planned) => planned,
                Err(e) => {
                    error!(input = %input, "Skipping input: {}", e);
                    continue;
                }
            };
            if let Err(e) = persist_graph(&planned.assignment.graph_file, &planned.graph).await {
                error!(input = %input, "Skipping input: {}", e);
                continue;
            }
            info!(
                host = %planned.assignment.host(),
                sequence = planned.assignment.sequence,
                "Job command line: {}",
                planned.assignment.command_line
            );
            jobs.push(planned.assignment);
        }
        jobs
    }

    /// Run every job on its node and wait for all of them, bounded by the wait timeout.
    ///
    /// Returns the state of every job plus the hosts that never signalled. Those are asked to
    /// stop so their sessions wind down while the run moves on.
    async fn dispatch_workers(
        &self,
        jobs: &[JobAssignment],
    ) -> (Vec<(String, ExecutionState)>, Vec<String>) {
        let ctx = &self.context;
        let barrier = CompletionBarrier::new(jobs.len());
        let mut executors: Vec<Arc<dyn Executor>> = Vec::with_capacity(jobs.len());

        for job in jobs {
            let target = ExecutionTarget::new(job.host(), job.port(), vec![job.command_line.clone()])
                .with_credentials(ctx.worker.credentials.clone());
            let executor = self.executors.create(ExecutorKind::Remote, target);
            executors.push(executor.clone());
            self.submit(executor, Some(barrier.clone())).await;
        }

        if !barrier.wait(ctx.coordinator.wait_timeout).await {
            warn!(
                "Worker phase did not finish within {} s",
                ctx.coordinator.wait_timeout.as_secs()
            );
        }
        let states: Vec<(String, ExecutionState)> = executors
            .iter()
            .map(|e| (e.host().to_string(), e.monitor().state()))
            .collect();
        let mut unfinished = Vec::new();
        for executor in executors.iter().filter(|e| !e.has_completed()) {
            warn!(
                "[{}] Node still running. Its output will not be complete.",
                executor.host()
            );
            executor.stop();
            unfinished.push(executor.host().to_string());
        }

        for (job, (host, state)) in jobs.iter().zip(&states) {
            if *state != ExecutionState::Completed(0) {
                warn!(
                    "[{}] Expected output {} may be missing ({:?})",
                    host, job.expected_output, state
                );
            }
        }
        (states, unfinished)
    }

    async fn run_coordinator(
        &self,
        graph: &ProcessingGraph,
        outputs: &[String],
    ) -> Result<(CoordinatorJob, Option<ExecutionReport>)> {
        let ctx = &self.context;
        let platform = ctx.coordinator_platform();
        let leading = graph
            .leading_step()
            .ok_or_else(|| AppError::InvalidState("coordinator graph has no steps".to_string()))?;
        let aggregation = operators::is_aggregation(&leading.operator);
        let folder_mode = operators::is_folder_operator(&leading.operator);

        let graph_file = ctx.local_path(COORDINATOR_GRAPH_FILE);
        let document = if aggregation {
            leading.parameters_markup()?
        } else {
            let mut graph = graph.clone();
            if folder_mode {
                let source = ctx.resolve_shared(&ctx.worker.input_folder, platform);
                if let Some(step) = graph.leading_step_mut() {
                    step.set_argument(ARG_SOURCE_FOLDER, source);
                }
            }
            graph.render()?
        };
        tokio::fs::write(&graph_file, document).await?;

        let local_outputs: Vec<String> = outputs.iter().map(|o| self.to_local(o)).collect();
        if local_outputs.is_empty() {
            self.fix_permissions(&normalize_path(&ctx.coordinator.local_folder, platform))
                .await;
        } else {
            for output in &local_outputs {
                self.fix_permissions(output).await;
            }
        }

        let template = &ctx.templates.for_platform(platform).coordinator;
        let exec = if folder_mode {
            strip_section(&template.exec, COORDINATOR_OUTPUT_SECTION)
        } else {
            template.exec.clone()
        };
        let node = &ctx.coordinator.node;
        let bindings = Bindings::new()
            .with(
                Placeholder::ToolLocation,
                node.tool_location.clone().unwrap_or_else(|| template.tool.clone()),
            )
            .with(
                Placeholder::CoordinatorOptions,
                if aggregation { AGGREGATION_OPTIONS } else { "" },
            )
            .with(
                Placeholder::InputFolder,
                normalize_path(&ctx.coordinator.local_folder, platform),
            )
            .with(
                Placeholder::CoordinatorInputs,
                if folder_mode { String::new() } else { local_outputs.join(" ") },
            )
            .with(
                Placeholder::OutputFolder,
                if folder_mode {
                    String::new()
                } else {
                    ctx.resolve_shared(&ctx.worker.output_folder, platform)
                },
            )
            .with(Placeholder::OperatorName, leading.operator.as_str())
            .with(Placeholder::OperatorArguments, leading.to_p_args());

        let command_line = resolve(&exec, &bindings);
        let missing = unresolved(&command_line);
        if !missing.is_empty() {
            warn!(?missing, "Coordinator command line has unresolved placeholders");
        }
        let arguments: Vec<String> = command_line
            .split(' ')
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        info!(host = %node.name, "Coordinator command line: {}", arguments.join(" "));

        let job = CoordinatorJob {
            graph_file,
            inputs: local_outputs,
            arguments: arguments.clone(),
        };

        let target = ExecutionTarget::new(node.name.as_str(), node.ssh_port, arguments);
        let executor = self.executors.create(ExecutorKind::Process, target);
        let barrier = CompletionBarrier::new(1);
        let (report_tx, report_rx) = oneshot::channel();
        {
            let executor = executor.clone();
            let barrier = barrier.clone();
            let clock = self.clock.clone();
            self.pool
                .submit(async move {
                    let report = run_tracked(executor, Some(barrier), clock, false).await;
                    let _ = report_tx.send(report);
                })
                .await;
        }

        let budget = coordinator_budget(ctx.coordinator.wait_timeout, outputs.len());
        let report = if barrier.wait(budget).await {
            // Sent right after the countdown; dropped unsent if the task panicked
            report_rx.await.ok()
        } else {
            warn!(
                "[{}] Node still running. Its output will not be complete.",
                executor.host()
            );
            executor.stop();
            None
        };
        Ok((job, report))
    }

    /// Map a worker-side output path into the coordinator's local folder
    fn to_local(&self, output: &str) -> String {
        let ctx = &self.context;
        let relative = relative_to(output, &ctx.worker.share_mount)
            .or_else(|| relative_to(output, &ctx.coordinator.shared_folder));
        match relative {
            Some(rest) => ctx.local_path(&rest),
            None => normalize_path(output, ctx.coordinator_platform()),
        }
    }

    /// `chmod [-R] 0777 <path>` on the coordinator, escalated and not awaited
    async fn fix_permissions(&self, path: &str) {
        let ctx = &self.context;
        let node = &ctx.coordinator.node;
        let recursive = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        let mut arguments = vec!["chmod".to_string()];
        if recursive {
            arguments.push("-R".to_string());
        }
        arguments.push(SHARED_FILE_MODE.to_string());
        arguments.push(normalize_path(path, ctx.coordinator_platform()));

        let target = ExecutionTarget::new(node.name.as_str(), node.ssh_port, arguments)
            .with_credentials(ctx.worker.credentials.clone())
            .escalated();
        let executor = self.executors.create(ExecutorKind::Remote, target);
        self.submit(executor, None).await;
    }

    async fn submit(&self, executor: Arc<dyn Executor>, barrier: Option<CompletionBarrier>) {
        let clock = self.clock.clone();
        self.pool
            .submit(async move {
                run_tracked(executor, barrier, clock, false).await;
            })
            .await;
    }
}

async fn persist_graph(file: &str, graph: &ProcessingGraph) -> Result<()> {
    let document = graph.render()?;
    if let Some(parent) = Path::new(file).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(file, document).await?;
    Ok(())
}

/// Coordinator wait: one worker budget per output, at least one
fn coordinator_budget(wait_timeout: Duration, outputs: usize) -> Duration {
    let slots = u32::try_from(outputs.max(1)).unwrap_or(u32::MAX);
    wait_timeout.checked_mul(slots).unwrap_or(Duration::MAX)
}

/// Name of the worker graph document persisted for job `sequence`
pub fn graph_file_name(sequence: usize) -> String {
    format!("{WORKER_GRAPH_PREFIX}{sequence}{GRAPH_FILE_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::fixtures;
    use crate::domain::node::{ComputeNode, Platform};
    use crate::port::executor::mocks::{MockBehavior, MockExecutorFactory};
    use crate::port::SystemTimeProvider;

    fn orchestrator(
        local: &Path,
        nodes: &[&str],
        factory: Arc<MockExecutorFactory>,
        resume: bool,
    ) -> Orchestrator {
        let nodes = nodes
            .iter()
            .map(|n| ComputeNode::new(*n, Platform::Linux))
            .collect();
        let mut ctx = fixtures::context(&local.to_string_lossy(), nodes);
        ctx.coordinator.wait_timeout = Duration::from_millis(300);
        ctx.resume = resume;
        Orchestrator::new(
            Arc::new(ctx),
            factory,
            Arc::new(WorkerPool::new(8)),
            Arc::new(SystemTimeProvider),
        )
    }

    fn inputs(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("P{i}.SAFE/MTD_MSIL1C.xml")).collect()
    }

    #[tokio::test]
    async fn test_timeout_lists_unfinished_hosts_and_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(
            MockExecutorFactory::succeeding().with_host("w2", MockBehavior::Hang),
        );
        let orch = orchestrator(dir.path(), &["w1", "w2"], factory.clone(), false);
        let worker = ProcessingGraph::from_chain("Read|Resample").unwrap();
        let coordinator = ProcessingGraph::from_chain("Mosaic").unwrap();

        let started = std::time::Instant::now();
        let summary = orch.run(&inputs(2), &worker, Some(&coordinator)).await.unwrap();

        assert_eq!(summary.worker_states.len(), 2);
        assert_eq!(summary.worker_states[0], ("w1".to_string(), ExecutionState::Completed(0)));
        assert_eq!(summary.worker_states[1].1, ExecutionState::Running);
        assert_eq!(summary.unfinished_hosts, vec!["w2".to_string()]);
        // The hung job was told to stop, so shutdown did not sit out its grace period
        assert!(started.elapsed() < Duration::from_millis(GRACEFUL_SHUTDOWN_TIMEOUT_MS));
        // The hung node's output is still handed to the coordinator
        assert_eq!(summary.outputs.len(), 2);
        assert_eq!(summary.coordinator.unwrap().inputs.len(), 2);
        assert_eq!(factory.created_of(ExecutorKind::Process).len(), 1);
    }

    #[tokio::test]
    async fn test_resume_skips_workers_but_writes_graphs() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MockExecutorFactory::succeeding());
        let orch = orchestrator(dir.path(), &["w1"], factory.clone(), true);
        let worker = ProcessingGraph::from_chain("Resample").unwrap();

        let summary = orch.run(&inputs(2), &worker, None).await.unwrap();

        assert!(summary.worker_states.is_empty());
        assert!(summary.unfinished_hosts.is_empty());
        assert!(summary.coordinator.is_none());
        assert!(dir.path().join(graph_file_name(1)).exists());
        assert!(dir.path().join(graph_file_name(2)).exists());
        // Only the output folder permission fix reaches an executor
        let remote = factory.created_of(ExecutorKind::Remote);
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].arguments[0], "chmod");
        assert!(remote[0].escalate);
        assert!(dir.path().join("out").is_dir());
    }

    #[tokio::test]
    async fn test_folder_operator_coordinator_rewrites_source_and_strips_output() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MockExecutorFactory::succeeding());
        let orch = orchestrator(dir.path(), &["w1"], factory.clone(), false);
        let worker = ProcessingGraph::from_chain("Sen2Cor").unwrap();
        let coordinator = ProcessingGraph::from_chain("Sen2Three").unwrap();

        let summary = orch.run(&inputs(1), &worker, Some(&coordinator)).await.unwrap();

        let job = summary.coordinator.unwrap();
        let local = dir.path().to_string_lossy().to_string();
        assert_eq!(
            job.arguments,
            vec!["gpt".to_string(), format!("{local}/coordinatorGraph.xml")]
        );
        let document = std::fs::read_to_string(dir.path().join(COORDINATOR_GRAPH_FILE)).unwrap();
        let persisted = ProcessingGraph::parse(&document).unwrap();
        assert_eq!(
            persisted.step(0).unwrap().scalar("sourceFolder"),
            Some("/mnt/share/in")
        );
        assert_eq!(summary.jobs[0].command_line, "gpt /mnt/share/workerGraph1.xml -q 4");
    }

    #[tokio::test]
    async fn test_coordinator_without_outputs_fixes_local_folder() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MockExecutorFactory::succeeding());
        let orch = orchestrator(dir.path(), &["w1"], factory.clone(), false);
        let worker = ProcessingGraph::from_chain("Read").unwrap();
        let coordinator = ProcessingGraph::from_chain("BandMaths").unwrap();

        let summary = orch.run(&[], &worker, Some(&coordinator)).await.unwrap();

        assert!(summary.jobs.is_empty());
        assert!(summary.coordinator_report.unwrap().succeeded());
        let local = normalize_path(&dir.path().to_string_lossy(), Platform::Linux);
        let chmods = factory.created_of(ExecutorKind::Remote);
        assert!(chmods
            .iter()
            .any(|t| t.arguments == vec!["chmod", "-R", "0777", local.as_str()]));
    }

    #[tokio::test]
    async fn test_all_workers_finishing_reports_no_unfinished_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MockExecutorFactory::succeeding().with_host("w2", MockBehavior::Exit(4)));
        let orch = orchestrator(dir.path(), &["w1", "w2"], factory, false);
        let worker = ProcessingGraph::from_chain("Read|Resample").unwrap();

        let summary = orch.run(&inputs(3), &worker, None).await.unwrap();

        assert!(summary.unfinished_hosts.is_empty());
        assert_eq!(summary.worker_states[1], ("w2".to_string(), ExecutionState::Completed(4)));
    }

    #[test]
    fn test_coordinator_budget_scales_and_saturates() {
        let wait = Duration::from_secs(60);
        assert_eq!(coordinator_budget(wait, 0), wait);
        assert_eq!(coordinator_budget(wait, 3), Duration::from_secs(180));
        assert_eq!(coordinator_budget(Duration::MAX, 2), Duration::MAX);
    }

    #[tokio::test]
    async fn test_bad_input_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MockExecutorFactory::succeeding());
        let orch = orchestrator(dir.path(), &["w1", "w2"], factory, false);
        let worker = ProcessingGraph::from_chain("Read").unwrap();
        let inputs = vec!["a.SAFE".to_string(), " ".to_string(), "c.SAFE".to_string()];

        let jobs = orch.build_jobs(&inputs, &worker, None).await;

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].sequence, 1);
        assert_eq!(jobs[1].sequence, 3);
        assert_eq!(jobs[1].host(), "w1");
    }

    #[tokio::test]
    async fn test_missing_coordinator_steps_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(MockExecutorFactory::succeeding());
        let orch = orchestrator(dir.path(), &["w1"], factory, false);
        let worker = ProcessingGraph::from_chain("Read").unwrap();
        let empty = ProcessingGraph::new();

        let err = orch.run(&inputs(1), &worker, Some(&empty)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }
}
