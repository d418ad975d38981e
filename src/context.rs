use std::path::PathBuf;

use crate::extract::ExtractSettings;
use crate::task::Settings;
use crate::upload::FtpSettings;

/// Host platform as named in release artifacts (`win32`, `darwin`, `linux`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    name: String,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        let name = match os {
            "windows" => "win32",
            "macos" => "darwin",
            other => other,
        };
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_windows(&self) -> bool {
        self.name == "win32"
    }

    /// Windows artifacts are always 32-bit.
    pub fn arch(&self) -> &'static str {
        if self.is_windows() { "ia32" } else { "x64" }
    }
}

/// Inputs every task runs against, passed explicitly instead of read from
/// process-wide state.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    pub python: String,
    pub platform: Platform,
    pub ftp: FtpSettings,
    pub extract: ExtractSettings,
}

impl Context {
    pub fn from_settings(settings: &Settings, platform: Platform) -> Self {
        Self {
            root: settings.root.clone(),
            python: settings.python.clone(),
            platform,
            ftp: settings.ftp.clone(),
            extract: settings.extract.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rust_os_names_to_release_names() {
        assert_eq!(Platform::from_os("windows").name(), "win32");
        assert_eq!(Platform::from_os("macos").name(), "darwin");
        assert_eq!(Platform::from_os("linux").name(), "linux");
        assert_eq!(Platform::from_os("freebsd").name(), "freebsd");
    }

    #[test]
    fn windows_is_always_ia32() {
        assert_eq!(Platform::from_os("windows").arch(), "ia32");
        assert_eq!(Platform::from_os("linux").arch(), "x64");
        assert_eq!(Platform::from_os("macos").arch(), "x64");
    }
}
