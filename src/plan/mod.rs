use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;

use crate::blocks::chip::{draw_chip, ChipParams};
use crate::cli::progress::StepContext;
use crate::config::chip::ChipConfig;
use crate::config::merge::MergeConfig;
use crate::layout::preview::{render_svg, PreviewParams};
use crate::layout::PicLib;
use crate::merge::merge_libraries;
use crate::paths::{out_gds, out_ports, out_svg};
use crate::tech::TechConfig;
use crate::Result;

/// Width of the SVG preview in pixels.
const PREVIEW_WIDTH: u32 = 1600;

/// A checked chip configuration, ready to draw.
pub struct ChipPlan {
    pub name: String,
    pub tech: Arc<TechConfig>,
    pub pdk_gds: Option<PathBuf>,
    pub params: ChipParams,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    GeneratePlan,
    GenerateLayout,
    WriteGds,
    WritePortMap,
    RenderPreview,
    MergeLibraries,
}

impl TaskKey {
    pub fn desc(&self) -> &'static str {
        match *self {
            TaskKey::GeneratePlan => "Generate plan",
            TaskKey::GenerateLayout => "Generate layout",
            TaskKey::WriteGds => "Write GDS",
            TaskKey::WritePortMap => "Write port map",
            TaskKey::RenderPreview => "Render preview",
            TaskKey::MergeLibraries => "Merge libraries",
        }
    }
}

/// Steps of the `generate` command, in order.
pub const GENERATE_STEPS: [TaskKey; 5] = [
    TaskKey::GeneratePlan,
    TaskKey::GenerateLayout,
    TaskKey::WriteGds,
    TaskKey::WritePortMap,
    TaskKey::RenderPreview,
];

/// Steps of the `merge` command, in order.
pub const MERGE_STEPS: [TaskKey; 2] = [TaskKey::MergeLibraries, TaskKey::WriteGds];

pub struct ExecutePlanParams<'a> {
    pub work_dir: &'a Path,
    pub plan: &'a ChipPlan,
    pub tasks: &'a HashSet<TaskKey>,
    pub ctx: Option<&'a mut StepContext>,
}

pub fn generate_plan(config: &ChipConfig) -> Result<ChipPlan> {
    let params = &config.chip;

    if let Some(pdk) = &config.pdk_gds {
        if !pdk.is_file() {
            bail!("PDK GDS library {:?} does not exist", pdk);
        }
    }
    if params.modulators.devices.iter().any(|d| d.pin_length <= 0.0) {
        bail!("Modulator phase shifter lengths must be positive");
    }
    if let Some(gcs) = &params.gc_array {
        if gcs.count == 0 {
            bail!("The grating coupler array must have at least one coupler");
        }
    }
    if !params.markers.is_empty() && params.marker_size <= 0.0 {
        bail!("Probe marker size must be positive");
    }

    Ok(ChipPlan {
        name: config.name.clone(),
        tech: config.tech_config()?,
        pdk_gds: config.pdk_gds.clone(),
        params: params.clone(),
    })
}

macro_rules! try_finish_task {
    ( $ctx:expr, $task:expr ) => {
        if let Some(ctx) = $ctx.as_mut() {
            ctx.finish($task);
        }
    };
}

pub fn execute_plan(params: ExecutePlanParams) -> Result<()> {
    let ExecutePlanParams {
        work_dir,
        plan,
        tasks,
        mut ctx,
    } = params;

    std::fs::create_dir_all(work_dir)?;
    let name = plan.name.as_str();

    let mut lib = PicLib::new(Arc::clone(&plan.tech));
    if let Some(pdk) = &plan.pdk_gds {
        lib = lib.with_pdk_gds(pdk);
    }
    let chip = draw_chip(&mut lib, name, &plan.params)?;
    try_finish_task!(ctx, TaskKey::GenerateLayout);

    lib.save_gds(&chip.cell, out_gds(work_dir, name))?;
    try_finish_task!(ctx, TaskKey::WriteGds);

    let file = File::create(out_ports(work_dir, name))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &chip.port_map())?;
    try_finish_task!(ctx, TaskKey::WritePortMap);

    if tasks.contains(&TaskKey::RenderPreview) {
        render_svg(PreviewParams {
            cell: &chip.cell,
            output_path: &out_svg(work_dir, name),
            width: PREVIEW_WIDTH,
            hidden: &[plan.tech.layers.chip.spec],
        })?;
        try_finish_task!(ctx, TaskKey::RenderPreview);
    }

    Ok(())
}

pub struct ExecuteMergeParams<'a> {
    pub work_dir: &'a Path,
    pub config: &'a MergeConfig,
    pub ctx: Option<&'a mut StepContext>,
}

pub fn execute_merge(params: ExecuteMergeParams) -> Result<()> {
    let ExecuteMergeParams {
        work_dir,
        config,
        mut ctx,
    } = params;

    std::fs::create_dir_all(work_dir)?;
    let merged = merge_libraries(config)?;
    try_finish_task!(ctx, TaskKey::MergeLibraries);

    merged.save(out_gds(work_dir, &config.name))?;
    try_finish_task!(ctx, TaskKey::WriteGds);

    Ok(())
}
