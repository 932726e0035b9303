use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snaprelay::config::{AppConfig, CliConfig, DEFAULT_CONFIG_PATH};
use snaprelay::control::{run_wakeup, wakeup_target, ControlClient, ControlError};
use snaprelay::job::WakeupSchedule;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli_style;
use cli_style::get_styles;

#[derive(Parser, Debug)]
#[command(name = "snaprelay", version, styles = get_styles())]
struct CliArgs {
    /// Path to the configuration file.
    #[clap(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Control socket path, overrides `global.control.sockpath`.
    #[clap(long, global = true)]
    pub sockpath: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wake up a job so it replicates now instead of at its next interval.
    Wakeup {
        /// Name of the job.
        #[arg(value_name = "JOB")]
        args: Vec<String>,
    },

    /// Show the status of every job.
    Status {
        /// Print the raw JSON returned by the daemon.
        #[clap(long)]
        json: bool,
    },

    /// Show client and daemon versions.
    Version,

    /// Validate the configuration file and list the configured jobs.
    Configcheck,
}

const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = CliArgs::parse();

    if let Err(e) = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
    {
        eprintln!("Cannot initialize logging: {}", e);
    }

    match run(cli_args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            cli_style::print_error(&format!("{:#}", e));
            let usage = e
                .downcast_ref::<ControlError>()
                .is_some_and(ControlError::is_usage);
            if usage {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli_args: CliArgs) -> Result<()> {
    let cli = CliConfig {
        sockpath: cli_args.sockpath.clone(),
    };

    match cli_args.command {
        Command::Wakeup { args } => {
            let job = wakeup_target(&args)?.to_string();
            let config = AppConfig::load_or_default(&cli_args.config, &cli)?;
            debug!("control socket {:?}", config.control_sockpath);
            run_wakeup(&config.control_sockpath, &args).await?;
            cli_style::print_success(&format!("woke up job {}", job));
        }
        Command::Status { json } => {
            let config = AppConfig::load_or_default(&cli_args.config, &cli)?;
            print_status(&ControlClient::new(config.control_sockpath), json).await?;
        }
        Command::Version => {
            let config = AppConfig::load_or_default(&cli_args.config, &cli)?;
            cli_style::print_key_value("client", env!("CARGO_PKG_VERSION"));
            match ControlClient::new(config.control_sockpath).version().await {
                Ok(daemon) => cli_style::print_key_value("daemon", &daemon.version),
                Err(e) => cli_style::print_warning(&format!("daemon: {}", e)),
            }
        }
        Command::Configcheck => {
            let config = AppConfig::load(&cli_args.config, &cli)
                .with_context(|| format!("Invalid configuration {:?}", cli_args.config))?;
            print_config(&config);
            cli_style::print_success("configuration is valid");
        }
    }

    Ok(())
}

async fn print_status(client: &ControlClient, json: bool) -> Result<()> {
    debug!("requesting status from {:?}", client.sockpath());
    let status = client.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.jobs.is_empty() {
        cli_style::print_empty_list("no jobs configured");
    }
    for (name, job) in &status.jobs {
        cli_style::print_section_header(name);
        cli_style::print_key_value("type", &job.kind.to_string());
        match &job.replication {
            Some(report) => {
                cli_style::print_key_block("replication", &serde_json::to_string_pretty(report)?)
            }
            None => cli_style::print_key_value("replication", "no invocation yet"),
        }
        cli_style::print_section_footer();
    }
    Ok(())
}

fn print_config(config: &AppConfig) {
    cli_style::print_key_value("control socket", &config.control_sockpath.display().to_string());
    if config.jobs.is_empty() {
        cli_style::print_empty_list("no jobs configured");
    }
    for job in &config.jobs {
        cli_style::print_section_header(&job.name);
        cli_style::print_key_value("type", &job.kind.to_string());
        let schedule = match job.schedule {
            WakeupSchedule::Manual => "manual wakeup only".to_string(),
            WakeupSchedule::Interval(period) => format!("every {}s", period.as_secs()),
        };
        cli_style::print_key_value("schedule", &schedule);
        cli_style::print_section_footer();
    }
}
