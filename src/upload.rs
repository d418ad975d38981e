//! Shipping the dist archive to the build FTP server.

use std::{
    fmt,
    fs::{self, File},
    future::Future,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use suppaftp::{FtpError, FtpStream, types::FileType};
use thiserror::Error;

use crate::context::Platform;
use crate::error::{RelmanError, Result};

pub const VERSION_FILE: &str = "dist/version";
pub const DIST_DIR: &str = "dist";

const DEFAULT_HOST: &str = "192.168.52.109";
const DEFAULT_PORT: u16 = 21;
const DEFAULT_REMOTE_ROOT: &str = "TestBuilds/Fireball/Electron";

pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot read {}: {source}", .path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("login as '{user}' rejected: {source}")]
    Login {
        user: String,
        #[source]
        source: TransportError,
    },

    #[error("cannot create remote directory '{path}': {source}")]
    Mkdir {
        path: String,
        #[source]
        source: TransportError,
    },

    #[error("cannot store '{path}': {source}")]
    Put {
        path: String,
        #[source]
        source: TransportError,
    },

    #[error("upload worker stopped: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Server, port and account used for the transfer.
#[derive(Clone, PartialEq, Eq)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl FtpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Remote directory that holds one folder per version.
    pub remote_root: String,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: None,
            password: None,
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
        }
    }
}

impl fmt::Debug for FtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("remote_root", &self.remote_root)
            .finish()
    }
}

impl FtpSettings {
    pub fn connection(&self) -> Result<FtpConfig> {
        let user = self.user.clone().ok_or_else(|| {
            RelmanError::Config("FTP user is not set (RELMAN_FTP_USER or [ftp] user)".to_string())
        })?;
        let password = self.password.clone().ok_or_else(|| {
            RelmanError::Config(
                "FTP password is not set (RELMAN_FTP_PASSWORD or [ftp] password)".to_string(),
            )
        })?;
        Ok(FtpConfig {
            host: self.host.clone(),
            port: self.port,
            user,
            password,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub config: FtpConfig,
}

/// Names of the release archive for one version on one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistArtifact {
    pub version: String,
    pub file_name: String,
    /// Relative to the project root.
    pub local_path: PathBuf,
    pub remote_path: String,
}

pub fn dist_artifact(version: &str, platform: &Platform, remote_root: &str) -> DistArtifact {
    let file_name = format!(
        "electron-{}-{}-{}.zip",
        version,
        platform.name(),
        platform.arch()
    );
    let remote_root = remote_root.trim_end_matches('/');
    let remote_path = if remote_root.is_empty() {
        format!("{}/{}", version, file_name)
    } else {
        format!("{}/{}/{}", remote_root, version, file_name)
    };

    DistArtifact {
        version: version.to_string(),
        local_path: Path::new(DIST_DIR).join(&file_name),
        file_name,
        remote_path,
    }
}

pub fn read_dist_version(root: &Path) -> Result<String> {
    let version = fs::read_to_string(root.join(VERSION_FILE))?;
    let version = version.trim();
    if version.is_empty() {
        return Err(RelmanError::Task(format!("{} is empty", VERSION_FILE)));
    }
    Ok(version.to_string())
}

/// One FTP control session. Paths are `/`-separated and relative to the
/// login directory.
pub trait FtpTransport {
    fn connect(&mut self, host: &str, port: u16) -> std::result::Result<(), TransportError>;
    fn login(&mut self, user: &str, password: &str) -> std::result::Result<(), TransportError>;
    fn dir_exists(&mut self, path: &str) -> std::result::Result<bool, TransportError>;
    fn mkdir(&mut self, path: &str) -> std::result::Result<(), TransportError>;
    fn put(&mut self, path: &str, reader: &mut dyn Read) -> std::result::Result<u64, TransportError>;
    fn quit(&mut self) -> std::result::Result<(), TransportError>;
}

/// connect, login, create the remote directory, store, close. Returns the
/// number of bytes stored. The first failing stage ends the upload and is
/// the error returned; later stages never run. Once the file is stored a
/// failing close is only logged.
pub fn upload_via_ftp<T: FtpTransport>(
    transport: &mut T,
    job: &UploadJob,
) -> std::result::Result<u64, UploadError> {
    let file = File::open(&job.local_path).map_err(|source| UploadError::Local {
        path: job.local_path.clone(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let address = job.config.address();
    transport
        .connect(&job.config.host, job.config.port)
        .map_err(|source| UploadError::Connect {
            address: address.clone(),
            source,
        })?;
    tracing::debug!(%address, "connected");

    match transfer(transport, job, &mut reader) {
        Ok(bytes) => {
            if let Err(quit_err) = transport.quit() {
                tracing::warn!(%address, "quit after stored upload: {}", quit_err);
            }
            Ok(bytes)
        }
        Err(err) => {
            if let Err(quit_err) = transport.quit() {
                tracing::debug!("quit after failed upload: {}", quit_err);
            }
            Err(err)
        }
    }
}

fn transfer<T: FtpTransport>(
    transport: &mut T,
    job: &UploadJob,
    reader: &mut dyn Read,
) -> std::result::Result<u64, UploadError> {
    transport
        .login(&job.config.user, &job.config.password)
        .map_err(|source| UploadError::Login {
            user: job.config.user.clone(),
            source,
        })?;

    if let Some((dir, _)) = job.remote_path.rsplit_once('/') {
        mkdir_all(transport, dir)?;
    }

    let bytes = transport
        .put(&job.remote_path, reader)
        .map_err(|source| UploadError::Put {
            path: job.remote_path.clone(),
            source,
        })?;
    tracing::info!(remote = %job.remote_path, bytes, "stored");
    Ok(bytes)
}

/// Creates each missing component of `dir`, outermost first.
fn mkdir_all<T: FtpTransport>(transport: &mut T, dir: &str) -> std::result::Result<(), UploadError> {
    let mut prefix = String::new();
    for component in dir.split('/').filter(|c| !c.is_empty()) {
        if !prefix.is_empty() || dir.starts_with('/') {
            prefix.push('/');
        }
        prefix.push_str(component);

        let exists = transport
            .dir_exists(&prefix)
            .map_err(|source| UploadError::Mkdir {
                path: prefix.clone(),
                source,
            })?;
        if exists {
            continue;
        }

        transport.mkdir(&prefix).map_err(|source| UploadError::Mkdir {
            path: prefix.clone(),
            source,
        })?;
        tracing::debug!(path = %prefix, "created remote directory");
    }
    Ok(())
}

/// [`FtpTransport`] over a plain `suppaftp` control connection.
#[derive(Default)]
pub struct SuppaTransport {
    stream: Option<FtpStream>,
}

impl SuppaTransport {
    fn stream(&mut self) -> std::result::Result<&mut FtpStream, TransportError> {
        self.stream.as_mut().ok_or_else(|| "not connected".into())
    }
}

impl FtpTransport for SuppaTransport {
    fn connect(&mut self, host: &str, port: u16) -> std::result::Result<(), TransportError> {
        self.stream = Some(FtpStream::connect((host, port))?);
        Ok(())
    }

    fn login(&mut self, user: &str, password: &str) -> std::result::Result<(), TransportError> {
        let stream = self.stream()?;
        stream.login(user, password)?;
        stream.transfer_type(FileType::Binary)?;
        Ok(())
    }

    fn dir_exists(&mut self, path: &str) -> std::result::Result<bool, TransportError> {
        let stream = self.stream()?;
        let home = stream.pwd()?;
        match stream.cwd(path) {
            Ok(()) => {
                stream.cwd(&home)?;
                Ok(true)
            }
            Err(FtpError::UnexpectedResponse(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn mkdir(&mut self, path: &str) -> std::result::Result<(), TransportError> {
        self.stream()?.mkdir(path)?;
        Ok(())
    }

    fn put(&mut self, path: &str, mut reader: &mut dyn Read) -> std::result::Result<u64, TransportError> {
        Ok(self.stream()?.put_file(path, &mut reader)?)
    }

    fn quit(&mut self) -> std::result::Result<(), TransportError> {
        match self.stream.take() {
            Some(mut stream) => Ok(stream.quit()?),
            None => Ok(()),
        }
    }
}

/// Delivers an [`UploadJob`]; the returned future resolves exactly once.
pub trait Uploader {
    fn upload(&self, job: UploadJob) -> impl Future<Output = std::result::Result<u64, UploadError>>;
}

/// Runs [`upload_via_ftp`] with a fresh [`SuppaTransport`] on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct FtpUploader;

impl Uploader for FtpUploader {
    async fn upload(&self, job: UploadJob) -> std::result::Result<u64, UploadError> {
        tokio::task::spawn_blocking(move || {
            let mut transport = SuppaTransport::default();
            upload_via_ftp(&mut transport, &job)
        })
        .await?
    }
}

pub async fn upload_dist<U: Uploader>(
    root: &Path,
    platform: &Platform,
    settings: &FtpSettings,
    uploader: &U,
) -> Result<DistArtifact> {
    let version = read_dist_version(root)?;
    let artifact = dist_artifact(&version, platform, &settings.remote_root);
    let job = UploadJob {
        local_path: root.join(&artifact.local_path),
        remote_path: artifact.remote_path.clone(),
        config: settings.connection()?,
    };

    tracing::info!(
        local = %artifact.local_path.display(),
        remote = %artifact.remote_path,
        host = %job.config.host,
        "uploading"
    );
    uploader.upload(job).await?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FakeTransport {
        calls: Vec<String>,
        existing: Vec<String>,
        fail_on: Option<&'static str>,
        stored: Vec<u8>,
    }

    impl FakeTransport {
        fn failing_on(stage: &'static str) -> Self {
            Self {
                fail_on: Some(stage),
                ..Self::default()
            }
        }

        fn record(&mut self, call: String, stage: &str) -> std::result::Result<(), TransportError> {
            self.calls.push(call);
            if self.fail_on == Some(stage) {
                return Err(format!("{} refused", stage).into());
            }
            Ok(())
        }
    }

    impl FtpTransport for FakeTransport {
        fn connect(&mut self, host: &str, port: u16) -> std::result::Result<(), TransportError> {
            self.record(format!("connect {}:{}", host, port), "connect")
        }

        fn login(&mut self, user: &str, _password: &str) -> std::result::Result<(), TransportError> {
            self.record(format!("login {}", user), "login")
        }

        fn dir_exists(&mut self, path: &str) -> std::result::Result<bool, TransportError> {
            Ok(self.existing.iter().any(|p| p == path))
        }

        fn mkdir(&mut self, path: &str) -> std::result::Result<(), TransportError> {
            self.record(format!("mkdir {}", path), "mkdir")
        }

        fn put(&mut self, path: &str, reader: &mut dyn Read) -> std::result::Result<u64, TransportError> {
            self.record(format!("put {}", path), "put")?;
            reader.read_to_end(&mut self.stored)?;
            Ok(self.stored.len() as u64)
        }

        fn quit(&mut self) -> std::result::Result<(), TransportError> {
            self.record("quit".to_string(), "quit")
        }
    }

    fn job(dir: &Path) -> UploadJob {
        let local_path = dir.join("electron.zip");
        fs::write(&local_path, b"zip-bytes").unwrap();
        UploadJob {
            local_path,
            remote_path: "TestBuilds/Fireball/Electron/1.2.3/electron.zip".to_string(),
            config: FtpConfig {
                host: "ftp.test".to_string(),
                port: 21,
                user: "builder".to_string(),
                password: "pw".to_string(),
            },
        }
    }

    #[test]
    fn creates_missing_directories_then_stores() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = FakeTransport {
            existing: vec!["TestBuilds".to_string(), "TestBuilds/Fireball".to_string()],
            ..FakeTransport::default()
        };

        let bytes = upload_via_ftp(&mut transport, &job(dir.path())).unwrap();

        assert_eq!(bytes, 9);
        assert_eq!(transport.stored, b"zip-bytes");
        assert_eq!(
            transport.calls,
            [
                "connect ftp.test:21",
                "login builder",
                "mkdir TestBuilds/Fireball/Electron",
                "mkdir TestBuilds/Fireball/Electron/1.2.3",
                "put TestBuilds/Fireball/Electron/1.2.3/electron.zip",
                "quit",
            ]
        );
    }

    #[test]
    fn connect_failure_stops_before_any_remote_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = FakeTransport::failing_on("connect");

        let err = upload_via_ftp(&mut transport, &job(dir.path())).unwrap_err();

        assert!(matches!(err, UploadError::Connect { .. }));
        assert_eq!(transport.calls, ["connect ftp.test:21"]);
    }

    #[test]
    fn mkdir_failure_never_reaches_put() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = FakeTransport::failing_on("mkdir");

        let err = upload_via_ftp(&mut transport, &job(dir.path())).unwrap_err();

        match err {
            UploadError::Mkdir { path, .. } => assert_eq!(path, "TestBuilds"),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!transport.calls.iter().any(|c| c.starts_with("put")));
        assert_eq!(transport.calls.last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn put_failure_is_reported_once_and_session_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = FakeTransport {
            existing: vec![
                "TestBuilds".to_string(),
                "TestBuilds/Fireball".to_string(),
                "TestBuilds/Fireball/Electron".to_string(),
                "TestBuilds/Fireball/Electron/1.2.3".to_string(),
            ],
            fail_on: Some("put"),
            ..FakeTransport::default()
        };

        let err = upload_via_ftp(&mut transport, &job(dir.path())).unwrap_err();

        assert!(matches!(err, UploadError::Put { .. }));
        assert_eq!(transport.calls.iter().filter(|c| *c == "quit").count(), 1);
    }

    #[test]
    fn failed_quit_after_store_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = FakeTransport::failing_on("quit");

        let bytes = upload_via_ftp(&mut transport, &job(dir.path())).unwrap();

        assert_eq!(bytes, 9);
        assert_eq!(transport.stored, b"zip-bytes");
        assert_eq!(transport.calls.last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn login_failure_stops_before_directories_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = FakeTransport::failing_on("login");

        let err = upload_via_ftp(&mut transport, &job(dir.path())).unwrap_err();

        match err {
            UploadError::Login { user, .. } => assert_eq!(user, "builder"),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(transport.calls, ["connect ftp.test:21", "login builder", "quit"]);
    }

    #[test]
    fn missing_local_file_does_not_connect() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job(dir.path());
        job.local_path = dir.path().join("absent.zip");
        let mut transport = FakeTransport::default();

        let err = upload_via_ftp(&mut transport, &job).unwrap_err();

        assert!(matches!(err, UploadError::Local { .. }));
        assert!(transport.calls.is_empty());
    }

    #[test]
    fn artifact_names_follow_release_layout() {
        let artifact = dist_artifact(
            "1.2.3",
            &Platform::from_os("linux"),
            "TestBuilds/Fireball/Electron",
        );
        assert_eq!(artifact.file_name, "electron-1.2.3-linux-x64.zip");
        assert_eq!(
            artifact.remote_path,
            "TestBuilds/Fireball/Electron/1.2.3/electron-1.2.3-linux-x64.zip"
        );
        assert_eq!(artifact.local_path, Path::new("dist").join("electron-1.2.3-linux-x64.zip"));
    }

    #[test]
    fn windows_artifact_is_ia32() {
        let artifact = dist_artifact("0.9.0", &Platform::from_os("windows"), "builds/");
        assert_eq!(artifact.file_name, "electron-0.9.0-win32-ia32.zip");
        assert_eq!(artifact.remote_path, "builds/0.9.0/electron-0.9.0-win32-ia32.zip");
    }

    #[test]
    fn version_file_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join(VERSION_FILE), "1.2.3\n").unwrap();
        assert_eq!(read_dist_version(dir.path()).unwrap(), "1.2.3");
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let settings = FtpSettings {
            user: Some("builder".to_string()),
            ..FtpSettings::default()
        };
        assert!(matches!(settings.connection(), Err(RelmanError::Config(_))));
    }

    #[test]
    fn debug_output_hides_password() {
        let settings = FtpSettings {
            password: Some("hunter2".to_string()),
            ..FtpSettings::default()
        };
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }
}
