// Command-line surface: one subcommand per remote operation.
//
// Operation-level failures are printed and leave the exit code alone;
// raised errors bubble up to `main` and end the process with an error.

use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use crossterm::style::Stylize;

use crate::api::{Cursor, CursorBuilder, Service, DEFAULT_STABLE_ATTEMPTS};
use crate::archive::create_archive;
use crate::config::{defaults_path, Defaults, Endpoint};
use crate::error::Outcome;
use crate::listing::ListFilter;
use crate::ui::{with_spinner, FixedAnswer, TerminalPrompter};

#[derive(Parser, Debug)]
#[command(name = "tfd")]
#[command(about = "Manage models and modules served by TensorFlow Deploy", long_about = None)]
pub struct Cli {
    /// TensorFlow Deploy instance IP or address
    #[arg(long, global = true, env = "TFD_HOST")]
    pub host: Option<String>,

    /// TensorFlow Deploy instance port
    #[arg(long, global = true, env = "TFD_PORT")]
    pub port: Option<u16>,

    /// Verbose mode
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer "yes" to every confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Do not ping the service before running the command
    #[arg(long, global = true)]
    pub skip_connection_check: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct Target {
    /// TEAM
    #[arg(long, env = "TFD_TEAM")]
    pub team: Option<String>,

    /// PROJECT
    #[arg(long, env = "TFD_PROJECT")]
    pub project: Option<String>,

    /// Model or module NAME
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a tar archive with a model or module, ready for upload
    CreateArchive {
        /// Directory (or file) to archive
        src: PathBuf,
        /// Where to write the archive
        dst: PathBuf,
    },

    /// Upload a model directory or archive
    UploadModel {
        #[command(flatten)]
        target: Target,
        /// Full path to model dir/archive
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        label: Option<String>,
        /// Upload timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },

    /// Upload a module directory or archive
    UploadModule {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },

    /// Upload a model and reload every serving instance
    DeployModel {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        label: Option<String>,
    },

    /// Download a model by version or label
    GetModel {
        #[command(flatten)]
        target: Target,
        /// Directory where the archive is written
        #[arg(long)]
        dst: PathBuf,
        #[arg(long)]
        version: Option<u32>,
        #[arg(long)]
        label: Option<String>,
    },

    /// Download a module version
    GetModule {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        dst: PathBuf,
        #[arg(long)]
        version: u32,
    },

    /// List models matching the given criteria
    ListModels {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: Option<u32>,
        #[arg(long)]
        label: Option<String>,
    },

    /// List modules matching the given criteria
    ListModules {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: Option<u32>,
    },

    /// Delete a label (any label except 'stable')
    DeleteLabel {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        label: String,
    },

    /// Delete a model version, addressed by version or by label
    DeleteModel {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: Option<u32>,
        #[arg(long)]
        label: Option<String>,
    },

    /// Delete a module version
    DeleteModule {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: u32,
    },

    /// Point a label at a model version and reload
    SetLabel {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: u32,
        #[arg(long)]
        label: Option<String>,
    },

    /// Promote a model version to 'stable' and reload
    SetStable {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: u32,
        /// Number of attempts before giving up
        #[arg(long, default_value_t = DEFAULT_STABLE_ATTEMPTS)]
        retries: u32,
    },

    /// Reload every serving instance of the project
    ReloadConfig {
        #[command(flatten)]
        target: Target,
        /// Short reload (pass `false` for a full reload)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        short_reload: bool,
    },

    /// Restore the previous stable model version
    RevertModel {
        #[command(flatten)]
        target: Target,
    },

    /// Print the current serving configuration
    GetConfig {
        #[command(flatten)]
        target: Target,
    },

    /// Write a README.md describing a model or module
    GenerateReadme {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        label: Option<String>,
        /// Artifact directory
        #[arg(long)]
        dst: PathBuf,
        #[arg(long, default_value = "")]
        description: String,
        /// Model metric as KEY=VALUE, repeatable
        #[arg(long = "metric", value_parser = parse_metric)]
        metrics: Vec<(String, String)>,
        /// Describe a module instead of a model
        #[arg(long)]
        module: bool,
    },

    /// Remember host, port, team and project for later runs
    SaveDefaults {
        #[command(flatten)]
        target: Target,
    },
}

fn parse_metric(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("metric name is empty in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Settings shared by every subcommand once flags and defaults are merged.
struct Session {
    endpoint: Endpoint,
    defaults: Defaults,
    verbose: bool,
    yes: bool,
    check_connection: bool,
}

impl Session {
    fn builder(&self, target: &Target, label: Option<&str>) -> Result<CursorBuilder> {
        let team = self
            .defaults
            .team(target.team.clone())
            .ok_or_else(|| anyhow!("--team is required (or set TFD_TEAM)"))?;
        let project = self
            .defaults
            .project(target.project.clone())
            .ok_or_else(|| anyhow!("--project is required (or set TFD_PROJECT)"))?;

        let mut builder = Cursor::builder(team, project, self.endpoint.host.clone())
            .port(self.endpoint.port)
            .verbose(self.verbose)
            .check_connection(self.check_connection);
        if let Some(name) = &target.name {
            builder = builder.name(name.clone());
        }
        if let Some(label) = label {
            builder = builder.label(label);
        }
        builder = if self.yes {
            builder.prompter(FixedAnswer::yes())
        } else {
            builder.prompter(TerminalPrompter)
        };
        Ok(builder)
    }

    fn cursor(&self, target: &Target) -> Result<Cursor> {
        Ok(self.builder(target, None)?.build()?)
    }

    fn service(&self) -> Result<Service> {
        let service = Service::new(self.endpoint.host.clone(), self.endpoint.port)?;
        if self.check_connection {
            service.ping()?;
        }
        Ok(service)
    }
}

fn filter(target: &Target, version: Option<u32>, label: Option<String>) -> ListFilter {
    ListFilter {
        team: target.team.clone().unwrap_or_default(),
        project: target.project.clone().unwrap_or_default(),
        name: target.name.clone().unwrap_or_default(),
        version,
        label: label.unwrap_or_default(),
    }
}

/// Print an operation outcome: the value on stdout, a failure on stderr.
fn report<T: Display>(outcome: Outcome<T>) {
    match outcome {
        Ok(value) => println!("{}", value),
        Err(failure) => eprintln!("{}", failure.to_string().red()),
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let path = defaults_path();
    let defaults = Defaults::load(&path)
        .with_context(|| format!("load defaults from {}", path.display()))?;
    let session = Session {
        endpoint: defaults.endpoint(cli.host.clone(), cli.port),
        defaults,
        verbose: cli.verbose,
        yes: cli.yes,
        check_connection: !cli.skip_connection_check,
    };

    match cli.command {
        Command::CreateArchive { src, dst } => {
            let digest = create_archive(&src, &dst)?;
            println!("{}", digest);
        }
        Command::UploadModel {
            target,
            path,
            label,
            timeout,
        } => {
            let cursor = session.cursor(&target)?;
            let timeout = Duration::from_secs(timeout);
            report(with_spinner("Uploading...", || {
                cursor.upload_model(&path, label.as_deref(), timeout)
            })?);
        }
        Command::UploadModule {
            target,
            path,
            timeout,
        } => {
            let cursor = session.cursor(&target)?;
            let timeout = Duration::from_secs(timeout);
            report(with_spinner("Uploading...", || cursor.upload_module(&path, timeout))?);
        }
        Command::DeployModel {
            target,
            path,
            label,
        } => {
            let cursor = session.cursor(&target)?;
            report(with_spinner("Deploying...", || {
                cursor.deploy_model(&path, label.as_deref())
            })?);
        }
        Command::GetModel {
            target,
            dst,
            version,
            label,
        } => {
            let cursor = session.cursor(&target)?;
            report(with_spinner("Downloading...", || {
                cursor.get_model(&dst, version, label.as_deref())
            })?);
        }
        Command::GetModule {
            target,
            dst,
            version,
        } => {
            let cursor = session.cursor(&target)?;
            report(with_spinner("Downloading...", || cursor.get_module(&dst, version))?);
        }
        Command::ListModels {
            target,
            version,
            label,
        } => {
            let service = session.service()?;
            report(service.list_models(&filter(&target, version, label))?);
        }
        Command::ListModules { target, version } => {
            let service = session.service()?;
            report(service.list_modules(&filter(&target, version, None))?);
        }
        Command::DeleteLabel { target, label } => {
            report(session.cursor(&target)?.delete_label(&label)?);
        }
        Command::DeleteModel {
            target,
            version,
            label,
        } => {
            report(session.cursor(&target)?.delete_model(version, label.as_deref())?);
        }
        Command::DeleteModule { target, version } => {
            report(session.cursor(&target)?.delete_module(version)?);
        }
        Command::SetLabel {
            target,
            version,
            label,
        } => {
            report(session.cursor(&target)?.set_label(Some(version), label.as_deref())?);
        }
        Command::SetStable {
            target,
            version,
            retries,
        } => {
            report(session.cursor(&target)?.set_stable(Some(version), retries)?);
        }
        Command::ReloadConfig {
            target,
            short_reload,
        } => {
            report(session.cursor(&target)?.reload_config(short_reload)?);
        }
        Command::RevertModel { target } => {
            report(session.cursor(&target)?.revert_model()?);
        }
        Command::GetConfig { target } => {
            report(session.cursor(&target)?.get_config()?);
        }
        Command::GenerateReadme {
            target,
            label,
            dst,
            description,
            metrics,
            module,
        } => {
            let cursor = session
                .builder(&target, label.as_deref())?
                .check_connection(false)
                .build()?;
            if module {
                cursor.generate_module_readme(&dst, &description)?;
            } else {
                cursor.generate_model_readme(&dst, &description, &metrics)?;
            }
            println!("README.md written to {}", dst.display());
        }
        Command::SaveDefaults { target } => {
            let update = Defaults {
                host: cli.host,
                port: cli.port,
                team: target.team,
                project: target.project,
            };
            let merged = session.defaults.merge(update);
            merged
                .save(&path)
                .with_context(|| format!("save defaults to {}", path.display()))?;
            println!("Defaults saved to {}", path.display());
        }
    }
    Ok(())
}
