// Run Context
// Everything a run needs, resolved once at startup and read-only afterwards

use std::time::Duration;

use crate::domain::node::{ComputeNode, Platform};
use crate::domain::path::{join, normalize_path};
use crate::domain::TemplateSet;
use crate::port::{Credentials, SearchDescriptor};

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub node: ComputeNode,
    /// Folder on the coordinator's own disk that backs the share
    pub local_folder: String,
    /// Network path of the share, used by Windows nodes
    pub shared_folder: String,
    /// Worker phase budget; the coordinator phase gets a multiple of it
    pub wait_timeout: Duration,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Where Linux nodes mount the share
    pub share_mount: String,
    /// Input folder name, relative to the share
    pub input_folder: String,
    /// Output folder name, relative to the share
    pub output_folder: String,
    pub credentials: Credentials,
    pub nodes: Vec<ComputeNode>,
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub coordinator: CoordinatorSettings,
    pub worker: WorkerSettings,
    pub templates: TemplateSet,
    pub search: SearchDescriptor,
    /// Skip the worker phase and only run the coordinator
    pub resume: bool,
}

impl RunContext {
    pub fn coordinator_platform(&self) -> Platform {
        self.coordinator.node.platform
    }

    /// Root of the share as seen from a node of `platform`
    pub fn shared_root(&self, platform: Platform) -> &str {
        match platform {
            Platform::Windows => &self.coordinator.shared_folder,
            Platform::Linux => &self.worker.share_mount,
        }
    }

    /// `folder` below the share, rendered for `platform`
    pub fn resolve_shared(&self, folder: &str, platform: Platform) -> String {
        normalize_path(&join(self.shared_root(platform), folder), platform)
    }

    /// `name` below the coordinator's local folder, rendered for the coordinator
    pub fn local_path(&self, name: &str) -> String {
        let platform = self.coordinator_platform();
        normalize_path(&join(&self.coordinator.local_folder, name), platform)
    }
}
