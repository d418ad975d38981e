use super::{Action, BuildConfiguration, Task};
use crate::util::CommandSpec;

pub const AUTO_DIST: &str = "auto-dist";
pub const INIT_WITH_EXTERNAL_DOWNLOAD: &str = "init-with-external-download";

/// The fixed task set. `python` is the interpreter used for `script/*.py`.
pub fn builtin_tasks(python: &str) -> Vec<Task> {
    vec![
        build_task(python, BuildConfiguration::Debug),
        build_task(python, BuildConfiguration::Release),
        Task::step(
            "update",
            "Fetch and update build dependencies",
            Action::Command(CommandSpec::script(python, "update.py", Vec::<String>::new())),
        ),
        Task::step(
            "bootstrap",
            "Bootstrap the x64 build environment",
            Action::Command(CommandSpec::script(
                python,
                "bootstrap.py",
                ["-v", "--target_arch=x64"],
            )),
        ),
        Task::step(
            "show-download-url",
            "Print the libchromiumcontent download URLs",
            Action::Command(CommandSpec::script(python, "show-url.py", Vec::<String>::new())),
        ),
        Task::step(
            "create-dist",
            "Package the versioned dist archive",
            Action::Command(CommandSpec::script(python, "create-dist.py", Vec::<String>::new())),
        ),
        Task::step(
            "sync-submodule",
            "Sync submodule remotes",
            Action::Command(CommandSpec::new("git", ["submodule", "sync"])),
        ),
        Task::step(
            "update-submodule",
            "Check out submodules recursively",
            Action::Command(CommandSpec::new(
                "git",
                ["submodule", "update", "--init", "--recursive"],
            )),
        ),
        Task::step(
            "extract-libchromiumcontent",
            "Unpack downloaded libchromiumcontent archives into vendor",
            Action::ExtractLibchromiumcontent,
        ),
        Task::step(
            "upload-dist-ftp",
            "Upload the dist archive to the build FTP server",
            Action::UploadDist,
        ),
        Task::sequence(
            AUTO_DIST,
            "Update, package and upload",
            &["update", "create-dist", "upload-dist-ftp"],
        ),
        Task::sequence(
            INIT_WITH_EXTERNAL_DOWNLOAD,
            "Initialise a checkout from manually downloaded libchromiumcontent",
            &[
                "sync-submodule",
                "update-submodule",
                "extract-libchromiumcontent",
                "bootstrap",
            ],
        ),
    ]
}

fn build_task(python: &str, configuration: BuildConfiguration) -> Task {
    let description = match configuration {
        BuildConfiguration::Debug => "Build the debug configuration",
        BuildConfiguration::Release => "Build the release configuration",
    };
    Task::step(
        configuration.task_name(),
        description,
        Action::Command(CommandSpec::script(
            python,
            "build.py",
            ["-c", configuration.flag()],
        )),
    )
}
