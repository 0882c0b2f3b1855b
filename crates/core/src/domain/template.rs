// Command templates and placeholder resolution

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::error::{DomainError, Result};
use crate::domain::node::Platform;

/// Named tokens recognized inside command templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    ToolLocation,
    InputFolder,
    InputFile,
    SharedFolder,
    OutputFolder,
    CoordinatorInputs,
    CoordinatorOptions,
    OperatorName,
    OperatorArguments,
}

impl Placeholder {
    /// Substitution order. A token that is a prefix of another (`$in` / `$inputFile`) comes later.
    pub const ALL: [Placeholder; 9] = [
        Placeholder::OperatorArguments,
        Placeholder::InputFile,
        Placeholder::OperatorName,
        Placeholder::CoordinatorInputs,
        Placeholder::CoordinatorOptions,
        Placeholder::ToolLocation,
        Placeholder::SharedFolder,
        Placeholder::OutputFolder,
        Placeholder::InputFolder,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Placeholder::ToolLocation => "$gpt",
            Placeholder::InputFolder => "$in",
            Placeholder::InputFile => "$inputFile",
            Placeholder::SharedFolder => "$smf",
            Placeholder::OutputFolder => "$out",
            Placeholder::CoordinatorInputs => "$files",
            // The trailing space is part of the token
            Placeholder::CoordinatorOptions => "$opt ",
            Placeholder::OperatorName => "$operator",
            Placeholder::OperatorArguments => "$operatorArgs",
        }
    }
}

/// Output clause removed from worker templates when a folder operator writes its own outputs
pub const WORKER_OUTPUT_SECTION: &str = " -f GeoTIFF-BigTIFF -t $out/%3$s.tif";
/// Same for the coordinator template
pub const COORDINATOR_OUTPUT_SECTION: &str = " -f GeoTIFF-BigTIFF -t $out/coordinator.tif";

/// Values for the placeholders a template role needs
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<Placeholder, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.values.insert(placeholder, value.into());
        self
    }

    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(&placeholder).map(String::as_str)
    }
}

/// Literal substitution of every bound placeholder. Unbound tokens stay in the output.
pub fn resolve(template: &str, bindings: &Bindings) -> String {
    Placeholder::ALL
        .iter()
        .fold(template.to_string(), |text, placeholder| {
            match bindings.get(*placeholder) {
                Some(value) => text.replace(placeholder.token(), value),
                None => text,
            }
        })
}

/// Placeholders still present in `text`
pub fn unresolved(text: &str) -> Vec<Placeholder> {
    let mut rest = text.to_string();
    let mut found = Vec::new();
    for placeholder in Placeholder::ALL {
        if rest.contains(placeholder.token()) {
            found.push(placeholder);
            rest = rest.replace(placeholder.token(), "");
        }
    }
    found
}

/// Apply `%s`, `%N$s` and `%%` directives with positional arguments.
///
/// Other `%` sequences are copied unchanged.
pub fn format_positional(template: &str, args: &[&str]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut next = 0usize;
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let directive = &rest[pos + 1..];

        if let Some(after) = directive.strip_prefix('%') {
            out.push('%');
            rest = after;
        } else if let Some(after) = directive.strip_prefix('s') {
            out.push_str(argument(args, next)?);
            next += 1;
            rest = after;
        } else {
            let digits = directive.chars().take_while(char::is_ascii_digit).count();
            match (digits, directive[digits..].strip_prefix("$s")) {
                (d, Some(after)) if d > 0 => {
                    let index: usize = directive[..d]
                        .parse()
                        .map_err(|_| DomainError::InvalidArgument(format!("bad index in '{template}'")))?;
                    if index == 0 {
                        return Err(DomainError::InvalidArgument(format!(
                            "positional index starts at 1 in '{template}'"
                        )));
                    }
                    out.push_str(argument(args, index - 1)?);
                    rest = after;
                }
                _ => {
                    out.push('%');
                    rest = directive;
                }
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn argument<'a>(args: &[&'a str], index: usize) -> Result<&'a str> {
    args.get(index).copied().ok_or_else(|| {
        DomainError::InvalidArgument(format!(
            "template references argument {} but only {} given",
            index + 1,
            args.len()
        ))
    })
}

/// Remove a clause from a template, in either separator convention
pub fn strip_section(template: &str, section: &str) -> String {
    template
        .replace(section, "")
        .replace(&section.replace('/', "\\"), "")
}

/// Tool command and invocation template for one role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTemplate {
    pub tool: String,
    pub exec: String,
}

/// Worker and coordinator templates for one platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub worker: RoleTemplate,
    pub coordinator: RoleTemplate,
}

/// Templates for every supported platform, immutable once loaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSet {
    pub linux: CommandTemplate,
    pub windows: CommandTemplate,
}

impl TemplateSet {
    pub fn for_platform(&self, platform: Platform) -> &CommandTemplate {
        match platform {
            Platform::Linux => &self.linux,
            Platform::Windows => &self.windows,
        }
    }
}
