mod cluster;
mod shared;
mod utils;

use camino::Utf8Path;
use chrono::Datelike;
use clap::{Parser, Subcommand};
use simple_error::{SimpleResult, bail};

use self::cluster::validate_and_fix_cluster_settings;
pub use self::cluster::{ClusterSettings, validate_cluster_settings_data, write_cluster_settings};
use self::shared::validate_and_fix_shared_settings;
pub use self::shared::SharedSettings;

#[derive(Subcommand)]
pub enum Commands {
    /// Cluster CNV segments and fit a genotype mixture model in one to many samples
    Cluster(ClusterSettings),
}

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    after_help = format!("Copyright (C) 2024-{}     The {} developers.
This program comes with ABSOLUTELY NO WARRANTY.", chrono::Utc::now().year(), env!("CARGO_PKG_NAME")),
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(propagate_version = true, rename_all = "kebab_case")]
pub struct Settings {
    #[command(flatten)]
    pub shared: SharedSettings,

    #[command(subcommand)]
    pub command: Commands,
}

impl Settings {
    pub fn get_output_dir(&self) -> &Utf8Path {
        match &self.command {
            Commands::Cluster(x) => &x.output_dir,
        }
    }
}

/// Checks if a directory does not exist
///
pub fn check_novel_dirname(dirname: &Utf8Path, label: &str) -> SimpleResult<()> {
    if dirname.exists() {
        bail!("{label} already exists: \"{dirname}\"");
    }
    Ok(())
}

/// Checks that the output directory can be used for a new run
///
/// An existing output directory is only accepted when `clobber` is set, so that results of a previous
/// run are not mixed with the new ones.
///
pub fn check_output_dirname(output_dir: &Utf8Path, clobber: bool) -> SimpleResult<()> {
    if clobber {
        return Ok(());
    }
    check_novel_dirname(output_dir, "Output directory")
}

/// Validate settings and update parameters that can't be processed by clap
///
fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.shared = validate_and_fix_shared_settings(settings.shared)?;

    settings.command = match settings.command {
        Commands::Cluster(x) => {
            let x = validate_and_fix_cluster_settings(x)?;
            Commands::Cluster(x)
        }
    };

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}
