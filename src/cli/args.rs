use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about,
    help_template(
        "{before-help}{name} {version}\n{author-with-newline}{about-with-newline}\n{usage-heading} {usage}\n\n{all-args}{after-help}"
    )
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a test chip layout and its SSC port map.
    Generate(GenerateArgs),
    /// Merge GDS libraries into one top cell.
    Merge(MergeArgs),
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "picgen.toml")]
    pub config: PathBuf,

    /// Directory to which output files should be saved.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Render an SVG preview of the chip.
    #[arg(long)]
    pub preview: bool,
}

#[derive(clap::Args, Debug)]
pub struct MergeArgs {
    /// Path to TOML merge configuration file.
    #[arg(short, long, default_value = "merge.toml")]
    pub config: PathBuf,

    /// Directory to which the merged library should be saved.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}
