use std::{collections::HashMap, env, process};

use clap::Parser;

use relman::{
    Context, Platform, RelmanError, Result, TaskRunner,
    cli::{Cli, Invocation, describe_plan, describe_tasks},
    extract::MISSING_ARCHIVES_HINT,
    logging::init_logging,
    task::{load_settings, resolve_plan},
    upload::FtpUploader,
    util::{ProcessExecutor, parse_timeout},
};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    init_logging(args.verbose);

    match run_relman(args).await {
        Ok(()) => {}
        Err(RelmanError::MissingArchives(_)) => {
            println!("{}", MISSING_ARCHIVES_HINT);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

async fn run_relman(args: Cli) -> Result<()> {
    let env: HashMap<String, String> = env::vars().collect();
    let settings = load_settings(&args.file, &env)?;

    let (target, dry_run) = match args.invocation(settings.default_task.as_deref()) {
        Invocation::List => {
            println!("Available tasks:");
            for line in describe_tasks(&settings.tasks) {
                println!("{}", line);
            }
            return Ok(());
        }
        Invocation::DryRun(target) => (target, true),
        Invocation::Run(target) => (target, false),
    };

    let plan = resolve_plan(&settings.tasks, target)?;

    if args.verbose {
        let order: Vec<&str> = plan.iter().map(|t| t.id.as_str()).collect();
        println!("Task execution order: {}", order.join(" -> "));
    }

    if dry_run {
        println!("Dry run mode - showing what would be executed:");
        for line in describe_plan(&plan) {
            println!("{}", line);
        }
        return Ok(());
    }

    let timeout = parse_timeout(args.timeout.as_deref(), settings.default_timeout.as_deref());
    let context = Context::from_settings(&settings, Platform::current());
    let executor = ProcessExecutor::new(timeout);
    let uploader = FtpUploader;

    TaskRunner::new(&context, &executor, &uploader)
        .run_plan(&plan)
        .await
}
