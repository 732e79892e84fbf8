use std::collections::HashSet;
use std::fs::canonicalize;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::args::{Args, Command, GenerateArgs, MergeArgs};
use crate::cli::progress::StepContext;
use crate::config::chip::parse_chip_config;
use crate::config::merge::parse_merge_config;
use crate::plan::{
    execute_merge, execute_plan, generate_plan, ExecuteMergeParams, ExecutePlanParams, TaskKey,
    GENERATE_STEPS, MERGE_STEPS,
};
use crate::Result;

pub mod args;
pub mod progress;

pub const BANNER: &str = r"
        _
  _ __ (_) ___ __ _  ___ _ __
 | '_ \| |/ __/ _` |/ _ \ '_ \
 | |_) | | (_| (_| |  __/ | | |
 | .__/|_|\___\__, |\___|_| |_|
 |_|          |___/

picgen v0.1
";

pub fn run() -> Result<()> {
    let args = Args::parse();
    println!("{BANNER}");
    match args.command {
        Command::Generate(args) => generate(args),
        Command::Merge(args) => merge(args),
    }
}

/// Creates `output_dir`, or a directory named `name` when absent.
fn work_dir(output_dir: Option<PathBuf>, name: &str) -> Result<PathBuf> {
    let work_dir = output_dir.unwrap_or_else(|| PathBuf::from(name));
    std::fs::create_dir_all(&work_dir)?;
    Ok(canonicalize(work_dir)?)
}

fn print_config_path(path: &Path) {
    println!("Reading configuration file...\n");
    println!("Configuration file: {:?}", path);
}

fn generate(args: GenerateArgs) -> Result<()> {
    let config_path = canonicalize(&args.config)?;
    print_config_path(&config_path);
    let config = parse_chip_config(&config_path)?;

    let chip = &config.chip;
    println!("Chip parameters:");
    println!("\tName: {}", config.name);
    println!("\tSize: {} x {} um", chip.width, chip.height);
    println!("\tModulators: {}", chip.modulators.devices.len());
    println!(
        "\tGrating couplers: {}",
        chip.gc_array.as_ref().map_or(0, |gcs| gcs.count)
    );
    println!("\tCPW structures: {}", chip.cpw.len());
    println!("\tPassive pattern: {}\n", if chip.passive.is_some() { "yes" } else { "no" });

    let mut tasks = HashSet::from([
        TaskKey::GeneratePlan,
        TaskKey::GenerateLayout,
        TaskKey::WriteGds,
        TaskKey::WritePortMap,
    ]);
    if args.preview {
        tasks.insert(TaskKey::RenderPreview);
    }

    let mut ctx = StepContext::new(&GENERATE_STEPS, &tasks);

    let plan = ctx.check(generate_plan(&config))?;
    ctx.finish(TaskKey::GeneratePlan);

    let work_dir = ctx.check(work_dir(args.output_dir, &plan.name))?;

    let res = execute_plan(ExecutePlanParams {
        work_dir: &work_dir,
        plan: &plan,
        tasks: &tasks,
        ctx: Some(&mut ctx),
    });

    ctx.check(res)?;
    println!("Artifacts saved to: {:?}\n", &work_dir);

    Ok(())
}

fn merge(args: MergeArgs) -> Result<()> {
    let config_path = canonicalize(&args.config)?;
    print_config_path(&config_path);
    let config = parse_merge_config(&config_path)?;

    println!("Merge parameters:");
    println!("\tTop cell: {}", config.name);
    for source in config.sources.iter() {
        println!(
            "\t{:?}: `{}` as `{}` at {}",
            source.path,
            source.cell,
            source.top_name(),
            source.origin
        );
    }
    println!();

    let tasks = HashSet::from(MERGE_STEPS);
    let mut ctx = StepContext::new(&MERGE_STEPS, &tasks);

    let work_dir = ctx.check(work_dir(args.output_dir, &config.name))?;

    let res = execute_merge(ExecuteMergeParams {
        work_dir: &work_dir,
        config: &config,
        ctx: Some(&mut ctx),
    });

    ctx.check(res)?;
    println!("Artifacts saved to: {:?}\n", &work_dir);

    Ok(())
}
