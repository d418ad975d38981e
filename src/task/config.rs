use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use serde::Deserialize;

use super::{Action, Task, builtin_tasks, dependency::validate_tasks};
use crate::error::Result;
use crate::extract::{ExtractMode, ExtractSettings};
use crate::upload::FtpSettings;
use crate::util::CommandSpec;

const DEFAULT_PYTHON: &str = "python";

static BRACED_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced variable pattern is valid")
});
static SIMPLE_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("simple variable pattern is valid")
});

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    #[serde(rename = "task", default)]
    tasks: HashMap<String, TaskEntry>,
    config: Option<ConfigSection>,
    ftp: Option<FtpSection>,
    extract: Option<ExtractSection>,
    #[serde(default)]
    variables: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigSection {
    default: Option<String>,
    root: Option<String>,
    python: Option<String>,
    default_timeout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FtpSection {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    remote_root: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractSection {
    mode: Option<ExtractMode>,
    commit_key: Option<String>,
    stamp_commit: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TaskEntry {
    command: Option<String>,
    description: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Everything a run needs, resolved from `relman.toml` and the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tasks: Vec<Task>,
    pub default_task: Option<String>,
    pub default_timeout: Option<String>,
    pub root: PathBuf,
    pub python: String,
    pub ftp: FtpSettings,
    pub extract: ExtractSettings,
}

/// Loads settings from `config_path`. A missing file yields the defaults.
pub fn load_settings(config_path: &str, env: &HashMap<String, String>) -> Result<Settings> {
    let path = Path::new(config_path);
    let config = if path.exists() {
        let contents = fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded config");
        toml::from_str(&contents)?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Config::default()
    };

    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    process_config(config, &base_dir, env)
}

/// Parses settings from TOML text; relative roots resolve against `base_dir`.
pub fn parse_settings(
    contents: &str,
    base_dir: &Path,
    env: &HashMap<String, String>,
) -> Result<Settings> {
    let config: Config = toml::from_str(contents)?;
    process_config(config, base_dir, env)
}

fn process_config(config: Config, base_dir: &Path, env: &HashMap<String, String>) -> Result<Settings> {
    let mut variables = config.variables;
    add_builtin_variables(&mut variables, env);

    let section = config.config.unwrap_or_default();
    let expand = |value: Option<String>| value.map(|v| substitute_variables(&v, &variables));

    let python = expand(section.python).unwrap_or_else(|| DEFAULT_PYTHON.to_string());
    let root = resolve_root(base_dir, expand(section.root).as_deref());

    let ftp_section = config.ftp.unwrap_or_default();
    let defaults = FtpSettings::default();
    let ftp = FtpSettings {
        host: env
            .get("RELMAN_FTP_HOST")
            .cloned()
            .or_else(|| expand(ftp_section.host))
            .unwrap_or(defaults.host),
        port: ftp_section.port.unwrap_or(defaults.port),
        user: env
            .get("RELMAN_FTP_USER")
            .cloned()
            .or_else(|| expand(ftp_section.user)),
        password: env
            .get("RELMAN_FTP_PASSWORD")
            .cloned()
            .or_else(|| expand(ftp_section.password)),
        remote_root: expand(ftp_section.remote_root).unwrap_or(defaults.remote_root),
    };

    let extract_section = config.extract.unwrap_or_default();
    let extract_defaults = ExtractSettings::default();
    let extract = ExtractSettings {
        mode: extract_section.mode.unwrap_or(extract_defaults.mode),
        commit_key: extract_section
            .commit_key
            .unwrap_or(extract_defaults.commit_key),
        stamp_commit: extract_section
            .stamp_commit
            .unwrap_or(extract_defaults.stamp_commit),
    };

    let mut tasks = builtin_tasks(&python);
    tasks.extend(user_tasks(config.tasks, &variables));
    validate_tasks(&tasks)?;

    Ok(Settings {
        tasks,
        default_task: section.default,
        default_timeout: section.default_timeout,
        root,
        python,
        ftp,
        extract,
    })
}

fn user_tasks(entries: HashMap<String, TaskEntry>, variables: &HashMap<String, String>) -> Vec<Task> {
    let mut tasks: Vec<Task> = entries
        .into_iter()
        .map(|(id, entry)| Task {
            description: entry.description.unwrap_or_default(),
            action: entry
                .command
                .map(|command| Action::Command(CommandSpec::shell(&substitute_variables(&command, variables)))),
            dependencies: entry.dependencies,
            id,
        })
        .collect();
    tasks.sort_by(|a, b| a.id.cmp(&b.id));
    tasks
}

fn resolve_root(base_dir: &Path, root: Option<&str>) -> PathBuf {
    match root {
        Some(root) if Path::new(root).is_absolute() => PathBuf::from(root),
        Some(root) => base_dir.join(root),
        None => base_dir.to_path_buf(),
    }
}

fn add_builtin_variables(variables: &mut HashMap<String, String>, env: &HashMap<String, String>) {
    for (key, value) in env {
        variables.insert(format!("ENV_{}", key), value.clone());
    }

    if let Ok(pwd) = std::env::current_dir() {
        variables.insert("PWD".to_string(), pwd.to_string_lossy().to_string());
    }
}

fn substitute_variables(text: &str, variables: &HashMap<String, String>) -> String {
    let result = BRACED_VARIABLE
        .replace_all(text, |caps: &regex::Captures| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string();

    SIMPLE_VARIABLE
        .replace_all(&result, |caps: &regex::Captures| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}
