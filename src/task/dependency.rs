use std::collections::{HashMap, HashSet};

use super::Task;
use crate::error::{RelmanError, Result};

pub fn validate_tasks(tasks: &[Task]) -> Result<()> {
    let mut task_ids: HashSet<&str> = HashSet::new();

    for task in tasks {
        if !task_ids.insert(task.id.as_str()) {
            return Err(RelmanError::Dependency(format!(
                "Task '{}' is defined more than once",
                task.id
            )));
        }
    }

    for task in tasks {
        if task.is_sequence() && task.dependencies.is_empty() {
            return Err(RelmanError::Dependency(format!(
                "Task '{}' has neither a command nor any steps",
                task.id
            )));
        }

        for dep_id in &task.dependencies {
            if dep_id == &task.id {
                return Err(RelmanError::Dependency(format!(
                    "Task '{}' depends on itself",
                    task.id
                )));
            }
            if !task_ids.contains(dep_id.as_str()) {
                return Err(RelmanError::Dependency(format!(
                    "Task '{}' depends on '{}' which doesn't exist",
                    task.id, dep_id
                )));
            }
        }
    }

    detect_cycles(tasks)
}

/// Flattens `target` into the ordered list of tasks to execute: each
/// dependency's own plan in declared order, then the target itself. Every
/// task is included at most once.
pub fn resolve_plan<'a>(tasks: &'a [Task], target_task_id: &str) -> Result<Vec<&'a Task>> {
    let task_map: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let target = task_map
        .get(target_task_id)
        .copied()
        .ok_or_else(|| RelmanError::Task(format!("Task '{}' not found", target_task_id)))?;

    let mut seen = HashSet::new();
    let mut plan = Vec::new();
    expand(target, &task_map, &mut seen, &mut plan)?;
    Ok(plan)
}

fn expand<'a>(
    task: &'a Task,
    task_map: &HashMap<&str, &'a Task>,
    seen: &mut HashSet<&'a str>,
    plan: &mut Vec<&'a Task>,
) -> Result<()> {
    if !seen.insert(task.id.as_str()) {
        return Ok(());
    }

    for dep in &task.dependencies {
        let dep_task = task_map.get(dep.as_str()).copied().ok_or_else(|| {
            RelmanError::Dependency(format!(
                "Task '{}' depends on '{}' which doesn't exist",
                task.id, dep
            ))
        })?;
        expand(dep_task, task_map, seen, plan)?;
    }

    plan.push(task);
    Ok(())
}

fn detect_cycles(tasks: &[Task]) -> Result<()> {
    let task_map: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    for task in tasks {
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        if has_cycle(&task.id, &task_map, &mut visited, &mut path) {
            return Err(RelmanError::Dependency(format!(
                "Circular dependency: {}",
                path.join(" -> ")
            )));
        }
    }

    Ok(())
}

fn has_cycle(
    task_id: &str,
    task_map: &HashMap<&str, &Task>,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if path.iter().any(|id| id == task_id) {
        path.push(task_id.to_string());
        return true;
    }

    if visited.contains(task_id) {
        return false;
    }

    visited.insert(task_id.to_string());
    path.push(task_id.to_string());

    if let Some(task) = task_map.get(task_id) {
        for dep in &task.dependencies {
            if has_cycle(dep, task_map, visited, path) {
                return true;
            }
        }
    }

    path.pop();

    false
}
