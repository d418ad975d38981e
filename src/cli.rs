use clap::Parser;

use crate::task::Task;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file to use
    #[arg(short = 'f', long = "file", default_value = "relman.toml")]
    pub file: String,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Kill any external command running longer than this (e.g., "30m", "1h")
    #[arg(short = 't', long = "timeout")]
    pub timeout: Option<String>,

    /// Show what would be executed without running tasks
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// List available tasks and exit
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Task to run, runs the configured default task if not specified
    pub task: Option<String>,
}

/// What a run should do once settings are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation<'a> {
    /// Print the catalog and exit successfully.
    List,
    DryRun(&'a str),
    Run(&'a str),
}

impl Cli {
    /// `--list` wins; otherwise the command-line task, then the configured
    /// default. With no target at all the catalog is listed.
    pub fn invocation<'a>(&'a self, default_task: Option<&'a str>) -> Invocation<'a> {
        if self.list {
            return Invocation::List;
        }
        match select_target(self.task.as_deref(), default_task) {
            Some(target) if self.dry_run => Invocation::DryRun(target),
            Some(target) => Invocation::Run(target),
            None => Invocation::List,
        }
    }
}

pub fn select_target<'a>(cli_task: Option<&'a str>, default_task: Option<&'a str>) -> Option<&'a str> {
    cli_task.or(default_task)
}

/// One line per task: name, kind, description (sequences also show steps).
pub fn describe_tasks(tasks: &[Task]) -> Vec<String> {
    let width = tasks.iter().map(|t| t.id.len()).max().unwrap_or(0);
    tasks
        .iter()
        .map(|task| {
            let detail = if task.is_sequence() {
                format!("{} [{}]", task.description, task.dependencies.join(" -> "))
            } else {
                task.description.clone()
            };
            format!("  {:width$}  {:8}  {}", task.id, task.kind(), detail, width = width)
        })
        .collect()
}

/// What each step of `plan` would run; sequences contribute nothing.
pub fn describe_plan(plan: &[&Task]) -> Vec<String> {
    plan.iter()
        .filter_map(|task| {
            task.action
                .as_ref()
                .map(|action| format!("  {} would run: {}", task.id, action))
        })
        .collect()
}
