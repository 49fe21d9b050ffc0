//! Command-line front end for the Multimaze Recorder core.
//!
//! Every subcommand goes through [`Session`]; no model logic lives here.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use multimaze_recorder::acquisition::MockFrameSource;
use multimaze_recorder::config::Settings;
use multimaze_recorder::folder::AcquisitionParams;
use multimaze_recorder::layout::{SubdirShape, TableLayout};
use multimaze_recorder::session::{OpenOptions, Session, TemplateUpdate};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multimaze", about = "Multimaze Recorder metadata and folder tool")]
struct Cli {
    /// Settings file (TOML); defaults to `multimaze.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage experiment types.
    Experiment {
        #[command(subcommand)]
        command: ExperimentCommand,
    },
    /// Manage metadata templates.
    Template {
        #[command(subcommand)]
        command: TemplateCommand,
    },
    /// Create a new experiment folder and its metadata.
    Create {
        /// Folder name under the experiment type's root.
        folder: String,
        /// Experiment type name.
        #[arg(long)]
        experiment: String,
        /// Table layout ("arenas" or "corridors"); defaults to the type's.
        #[arg(long, value_parser = parse_layout)]
        layout: Option<TableLayout>,
    },
    /// Open an existing folder and print its metadata table summary.
    Open {
        /// Folder path under the lab data root.
        path: PathBuf,
        /// Open even if declared subdirectories are missing.
        #[arg(long)]
        allow_missing_structure: bool,
        /// Create metadata.json with this layout if absent.
        #[arg(long, value_parser = parse_layout)]
        create_metadata: Option<TableLayout>,
    },
    /// Print a folder's derived state.
    Status {
        /// Folder path under the lab data root.
        path: PathBuf,
    },
    /// Record into a folder using the built-in mock frame source.
    Record {
        /// Folder path under the lab data root.
        path: PathBuf,
        /// Frames per second.
        #[arg(long, default_value_t = 30)]
        fps: u32,
        /// Duration in seconds.
        #[arg(long, default_value_t = 3600)]
        duration: u32,
    },
}

#[derive(Subcommand)]
enum ExperimentCommand {
    /// List registered experiment types.
    List,
    /// Register a new experiment type.
    Add {
        /// Unique type name.
        name: String,
        /// Folder location, relative to the lab data root.
        path: PathBuf,
        /// Metadata template seeding new tables.
        #[arg(long)]
        template: Option<String>,
        /// Create per-arena corridor subdirectories.
        #[arg(long)]
        corridors: bool,
    },
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// List templates.
    List,
    /// Create an empty template.
    Create {
        /// Template name.
        name: String,
    },
    /// Print a template's variables.
    Show {
        /// Template name.
        name: String,
    },
}

fn parse_layout(s: &str) -> std::result::Result<TableLayout, String> {
    match s {
        "arenas" => Ok(TableLayout::Arenas),
        "corridors" => Ok(TableLayout::Corridors),
        other => Err(format!("unknown layout '{other}' (use arenas|corridors)")),
    }
}

fn print_info(info: &multimaze_recorder::session::FolderInfo) {
    println!("Folder:  {}", info.path.display());
    println!("State:   {:?}", info.state);
    println!("Layout:  {}", info.layout);
    if let Some(params) = info.params {
        println!(
            "Recorded with {} fps for {} s{}",
            params.fps,
            params.duration_secs,
            if info.params_locked { " (locked)" } else { "" }
        );
    }
}

fn report_template_update(update: &TemplateUpdate) {
    match update {
        TemplateUpdate::NoTemplate | TemplateUpdate::UpToDate => {}
        TemplateUpdate::Applied { added } => {
            println!("Template updated with {added} new variable(s)");
        }
        TemplateUpdate::NeedsDecision(diff) => {
            println!(
                "Template drift: table adds {:?}, template still has {:?}.",
                diff.new, diff.missing
            );
            println!("Not applied; re-run with an explicit template decision.");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::new(cli.config.as_deref()).context("loading settings")?;
    let mut session = Session::new(settings).context("starting session")?;

    match cli.command {
        Command::Experiment { command } => match command {
            ExperimentCommand::List => {
                for exp in session.registry().experiments() {
                    println!(
                        "{}  path={}  shape={:?}  template={}",
                        exp.name,
                        exp.path.display(),
                        exp.subdir_shape,
                        exp.metadata_template.as_deref().unwrap_or("-")
                    );
                }
            }
            ExperimentCommand::Add {
                name,
                path,
                template,
                corridors,
            } => {
                let shape = if corridors {
                    SubdirShape::ArenasWithCorridors
                } else {
                    SubdirShape::Arenas
                };
                session.add_experiment(&name, &path, template, None, shape)?;
                println!("Registered experiment type '{name}'");
            }
        },
        Command::Template { command } => match command {
            TemplateCommand::List => {
                for name in session.templates().list()? {
                    println!("{name}");
                }
            }
            TemplateCommand::Create { name } => {
                session.templates().create(&name)?;
                println!("Created template '{name}'");
            }
            TemplateCommand::Show { name } => {
                for variable in session.templates().load(&name)? {
                    println!("{variable}");
                }
            }
        },
        Command::Create {
            folder,
            experiment,
            layout,
        } => {
            let info = session.create(&folder, &experiment, layout)?;
            print_info(&info);
        }
        Command::Open {
            path,
            allow_missing_structure,
            create_metadata,
        } => {
            let info = session.open(
                &path,
                OpenOptions {
                    allow_invalid_structure: allow_missing_structure,
                    create_missing_metadata: create_metadata,
                },
            )?;
            print_info(&info);
            let binding = session.binding()?;
            println!("Variables:");
            for variable in binding.metadata().variables() {
                if !variable.is_empty() {
                    println!("  {variable}");
                }
            }
        }
        Command::Status { path } => {
            let info = session.open(&path, OpenOptions::default())?;
            print_info(&info);
        }
        Command::Record {
            path,
            fps,
            duration,
        } => {
            let info = session.open(&path, OpenOptions::default())?;
            if info.params_locked {
                bail!(
                    "{} already contains a recording; refusing to record again",
                    path.display()
                );
            }
            let params = AcquisitionParams {
                fps,
                duration_secs: duration,
            };
            // 64 KiB of noise per frame stands in for the camera pipeline.
            let source = Box::new(MockFrameSource::new(64 * 1024));
            let token = session.start_recording(source, params).await?;

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Ctrl-C: cancelling recording at next frame boundary");
                    token.cancel();
                }
            });

            if let Some(report) = session.finish_recording().await? {
                println!(
                    "Recording {:?}: {}/{} frames",
                    report.status, report.frames_written, report.frames_requested
                );
            }
            let update = session.save()?;
            report_template_update(&update);
            session.close()?;
        }
    }
    Ok(())
}
