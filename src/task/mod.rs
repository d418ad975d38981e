pub mod catalog;
pub mod config;
pub mod dependency;

pub use catalog::builtin_tasks;
pub use config::{Settings, load_settings};
pub use dependency::{resolve_plan, validate_tasks};

use std::fmt;

use crate::util::CommandSpec;

/// What a task does when its turn comes. Sequence tasks have none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Command(CommandSpec),
    ExtractLibchromiumcontent,
    UploadDist,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Command(spec) => write!(f, "{}", spec),
            Action::ExtractLibchromiumcontent => write!(f, "extract libchromiumcontent archives"),
            Action::UploadDist => write!(f, "upload dist archive over FTP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub action: Option<Action>,
    /// Run first, in this order.
    pub dependencies: Vec<String>,
}

impl Task {
    pub fn step(id: &str, description: &str, action: Action) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            action: Some(action),
            dependencies: Vec::new(),
        }
    }

    pub fn sequence(id: &str, description: &str, steps: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            action: None,
            dependencies: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.action.is_none()
    }

    pub fn kind(&self) -> &'static str {
        if self.is_sequence() { "sequence" } else { "step" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildConfiguration {
    Debug,
    Release,
}

impl BuildConfiguration {
    pub fn flag(self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "D",
            BuildConfiguration::Release => "R",
        }
    }

    pub fn task_name(self) -> &'static str {
        match self {
            BuildConfiguration::Debug => "build-debug",
            BuildConfiguration::Release => "build-release",
        }
    }
}
