//! Shared fixtures for the integration suites

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use fanout_core::application::{CoordinatorSettings, RunContext, WorkerSettings};
use fanout_core::domain::{CommandTemplate, ComputeNode, Platform, RoleTemplate, TemplateSet};
use fanout_core::port::{Credentials, SearchDescriptor};

pub fn role(tool: &str, exec: &str) -> RoleTemplate {
    RoleTemplate {
        tool: tool.to_string(),
        exec: exec.to_string(),
    }
}

pub fn templates() -> TemplateSet {
    TemplateSet {
        linux: CommandTemplate {
            worker: role(
                "gpt",
                "$gpt $smf/workerGraph%1$s.xml -q 4 -f GeoTIFF-BigTIFF -t $out/%3$s.tif",
            ),
            coordinator: role(
                "gpt",
                "$gpt $opt $in/coordinatorGraph.xml $files -f GeoTIFF-BigTIFF -t $out/coordinator.tif",
            ),
        },
        windows: CommandTemplate {
            worker: role(
                "gpt.exe",
                "$gpt $smf\\workerGraph%1$s.xml -q 4 -f GeoTIFF-BigTIFF -t $out\\%3$s.tif",
            ),
            coordinator: role(
                "gpt.exe",
                "$gpt $opt $in\\coordinatorGraph.xml $files -f GeoTIFF-BigTIFF -t $out\\coordinator.tif",
            ),
        },
    }
}

/// Linux coordinator whose share is backed by `local`, mounted on workers at /mnt/share
pub fn context(local: &Path, nodes: &[&str]) -> RunContext {
    RunContext {
        coordinator: CoordinatorSettings {
            node: ComputeNode::new("coord", Platform::Linux),
            local_folder: local.to_string_lossy().into_owned(),
            shared_folder: "\\\\coord\\share".to_string(),
            wait_timeout: Duration::from_secs(5),
            pool_size: 4,
        },
        worker: WorkerSettings {
            share_mount: "/mnt/share".to_string(),
            input_folder: "in".to_string(),
            output_folder: "out".to_string(),
            credentials: Credentials::new("ops", "secret"),
            nodes: nodes
                .iter()
                .map(|entry| ComputeNode::parse_entry(entry).unwrap())
                .collect(),
        },
        templates: templates(),
        search: SearchDescriptor::default(),
        resume: false,
    }
}
