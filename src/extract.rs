//! Unpacking of the manually downloaded libchromiumcontent archives.
//!
//! The destination is owned by this step: it is removed, recreated and
//! repopulated on every run, then stamped with a `.version` marker.

use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use regex::Regex;
use serde::Deserialize;

use crate::error::{RelmanError, Result};
use crate::util::{CommandSpec, Executor};

pub const DYNAMIC_ARCHIVE: &str = "download/libchromiumcontent.zip";
pub const STATIC_ARCHIVE: &str = "download/libchromiumcontent-static.zip";
pub const DESTINATION: &str = "vendor/brightray/vendor/download/libchromiumcontent";
pub const CONFIG_SCRIPT: &str = "script/lib/config.py";
pub const VERSION_MARKER: &str = ".version";

pub const MISSING_ARCHIVES_HINT: &str = "Please make sure you have downloaded libchromiumcontent from AWS and put it to ./download folder.";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// Unpack in-process.
    #[default]
    Unzip,
    /// Hand each archive to `script/extract.py`.
    Script,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSettings {
    pub mode: ExtractMode,
    /// Assignment in `script/lib/config.py` whose value stamps `.version`.
    pub commit_key: String,
    pub stamp_commit: bool,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            mode: ExtractMode::Unzip,
            commit_key: "LIBCHROMIUMCONTENT_COMMIT".to_string(),
            stamp_commit: true,
        }
    }
}

/// Both input archives in extraction order, or `MissingArchives` listing the
/// absent ones.
pub fn check_archives(root: &Path) -> Result<Vec<PathBuf>> {
    let archives = [DYNAMIC_ARCHIVE, STATIC_ARCHIVE];
    let missing: Vec<String> = archives
        .iter()
        .filter(|archive| !root.join(archive).is_file())
        .map(|archive| archive.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(RelmanError::MissingArchives(missing));
    }

    Ok(archives.iter().map(|archive| root.join(archive)).collect())
}

pub async fn extract_libchromiumcontent<E: Executor>(
    root: &Path,
    python: &str,
    settings: &ExtractSettings,
    executor: &E,
) -> Result<PathBuf> {
    let archives = check_archives(root)?;
    let destination = root.join(DESTINATION);

    reset_directory(&destination)?;
    tracing::info!(destination = %destination.display(), "cleaned target folder");

    match settings.mode {
        ExtractMode::Unzip => {
            let dest = destination.clone();
            tokio::task::spawn_blocking(move || unzip_all(&archives, &dest))
                .await
                .map_err(|e| RelmanError::Io(std::io::Error::other(e)))??;
        }
        ExtractMode::Script => {
            for archive in [DYNAMIC_ARCHIVE, STATIC_ARCHIVE] {
                let spec = CommandSpec::script(python, "extract.py", ["-s", archive, "-o", DESTINATION]);
                executor.run(&spec, root).await?;
                tracing::info!(archive, "extract complete");
            }
        }
    }

    let marker = version_marker(root, settings)?;
    fs::write(destination.join(VERSION_MARKER), &marker)?;
    tracing::debug!(marker = %marker, "wrote version marker");

    Ok(destination)
}

fn reset_directory(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Later archives overwrite files from earlier ones.
fn unzip_all(archives: &[PathBuf], destination: &Path) -> Result<()> {
    for archive in archives {
        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
        zip.extract(destination)?;
        tracing::info!(archive = %archive.display(), entries = zip.len(), "extract complete");
    }
    Ok(())
}

fn version_marker(root: &Path, settings: &ExtractSettings) -> Result<String> {
    if !settings.stamp_commit {
        return Ok(String::new());
    }

    let config_script = root.join(CONFIG_SCRIPT);
    if !config_script.is_file() {
        return Ok(String::new());
    }

    let contents = fs::read_to_string(&config_script)?;
    Ok(parse_assignment(&contents, &settings.commit_key)?.unwrap_or_default())
}

/// Value of the first `KEY = 'value'` line for `key`, trimmed.
pub fn parse_assignment(contents: &str, key: &str) -> Result<Option<String>> {
    let pattern = format!(r"(?m)^\s*{}\s*=\s*'([^']*)'", regex::escape(key));
    let regex = Regex::new(&pattern).map_err(|e| RelmanError::Parse(e.to_string()))?;

    Ok(regex
        .captures(contents)
        .map(|caps| caps[1].trim().to_string()))
}
