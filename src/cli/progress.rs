use std::collections::HashSet;
use std::fmt::Display;
use std::time::Duration;

use anyhow::Error;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::plan::TaskKey;
use crate::Result;

#[derive(PartialEq, Eq)]
pub enum StepStatus {
    Done,
    Pending,
    InProgress,
    Disabled,
    Skipped,
    Failed,
}

pub struct StepContext {
    step_num: usize,
    steps: Vec<Step>,
}

pub struct Step {
    desc: &'static str,
    key: TaskKey,
    progress_bar: ProgressBar,
    disabled: bool,
}

impl StepContext {
    /// Lists `steps` in order; steps outside of `tasks` are shown as disabled.
    pub fn new(steps: &[TaskKey], tasks: &HashSet<TaskKey>) -> Self {
        println!("Tasks:");

        let mut steps: Vec<Step> = steps
            .iter()
            .map(|&key| Step {
                desc: key.desc(),
                key,
                progress_bar: ProgressBar::new_spinner(),
                disabled: !tasks.contains(&key),
            })
            .collect();
        let mp = MultiProgress::new();
        let num_steps = steps.iter().filter(|step| !step.disabled).count();
        let mut counter = 0;
        let width = format!("{num_steps}").len();
        for (i, step) in steps.iter_mut().enumerate() {
            mp.insert(i + 1, step.progress_bar.clone());
            if step.disabled {
                let msg = Some(format!("[-/-] {}", step.desc));
                step.set_status(StepStatus::Disabled, msg);
            } else {
                counter += 1;
                let msg = Some(format!("[{counter:width$}/{num_steps:width$}] {}", step.desc));
                step.set_status(StepStatus::Pending, msg);
            }
        }
        let mut ctx = StepContext { step_num: 0, steps };
        if ctx.current_step().map_or(false, |step| step.disabled) {
            ctx.advance();
        }
        if let Some(step) = ctx.current_step() {
            step.progress_bar.enable_steady_tick(Duration::from_millis(200));
        }
        ctx
    }

    pub fn advance(&mut self) {
        self.step_num += 1;
        while let Some(current_step) = self.current_step() {
            if !current_step.disabled {
                break;
            }
            self.step_num += 1;
        }
    }

    #[inline]
    pub fn current_step(&mut self) -> Option<&mut Step> {
        self.steps.get_mut(self.step_num)
    }

    pub fn check<T>(&mut self, res: Result<T>) -> Result<T> {
        if res.is_err() {
            if let Some(current_step) = self.current_step() {
                current_step.set_status(StepStatus::Failed, None);
                self.advance();
                while let Some(current_step) = self.current_step() {
                    current_step.set_status(StepStatus::Skipped, None);
                    self.advance();
                }
            }
            println!("\n");
        }

        res
    }

    pub fn bail(&mut self, e: Error) -> Result<()> {
        self.check(Err(e))
    }

    pub fn finish(&mut self, key: TaskKey) {
        if let Some(current_step) = self.current_step() {
            if current_step.key != key {
                panic!("step `{}` was completed out of order", key.desc());
            }

            current_step.set_status(StepStatus::Done, None);

            self.advance();

            if let Some(current_step) = self.current_step() {
                current_step.set_status(StepStatus::InProgress, None);
            } else {
                self.done();
            }
        } else {
            panic!("step `{}` was completed after all steps were marked completed", key.desc());
        }
    }

    pub fn done(&mut self) {
        println!("\n\nCompleted all tasks");
    }
}

fn format_template(spinner: bool, status: impl Display) -> String {
    if spinner {
        format!("{{spinner:.green}} {status:16} {{msg}}")
    } else {
        format!("  {status:16} {{msg}}")
    }
}

impl Step {
    fn set_status(&mut self, status: StepStatus, msg: Option<String>) {
        let status_template = match status {
            StepStatus::Disabled => format_template(false, "Disabled".truecolor(120, 120, 120).bold()),
            StepStatus::Done => format_template(false, "Done".green().bold()),
            StepStatus::Failed => format_template(false, "Failed".bright_white().on_red().bold()),
            StepStatus::InProgress => format_template(true, "In Progress".bright_white().bold()),
            StepStatus::Pending => format_template(true, "Pending".blue().bold()),
            StepStatus::Skipped => format_template(false, "Skipped".yellow().bold()),
        };
        if let Ok(style) = ProgressStyle::with_template(&status_template) {
            self.progress_bar.set_style(style);
        }

        if let Some(msg) = msg {
            self.progress_bar.set_message(msg);
        }

        if status == StepStatus::InProgress {
            self.progress_bar.enable_steady_tick(Duration::from_millis(200));
        } else if status != StepStatus::Pending {
            self.progress_bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::GENERATE_STEPS;

    #[test]
    fn test_steps_skip_disabled() {
        let tasks = HashSet::from([
            TaskKey::GeneratePlan,
            TaskKey::GenerateLayout,
            TaskKey::WriteGds,
            TaskKey::WritePortMap,
        ]);
        let mut ctx = StepContext::new(&GENERATE_STEPS, &tasks);
        ctx.finish(TaskKey::GeneratePlan);
        ctx.finish(TaskKey::GenerateLayout);
        ctx.finish(TaskKey::WriteGds);
        ctx.finish(TaskKey::WritePortMap);
        // The preview step is disabled and skipped over.
        assert!(ctx.current_step().is_none());
    }

    #[test]
    #[should_panic]
    fn test_steps_out_of_order() {
        let tasks = HashSet::from(GENERATE_STEPS);
        let mut ctx = StepContext::new(&GENERATE_STEPS, &tasks);
        ctx.finish(TaskKey::WriteGds);
    }
}
