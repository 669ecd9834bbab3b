use std::time::Duration;

use clap::Subcommand;
use worktimer_core::plan::{DayPlan, PlanSegment, SegmentKind};
use worktimer_core::DayPlanRepository;

use super::{print_json, CommandResult};

#[derive(Subcommand)]
pub enum PlanAction {
    /// Show the saved day plan
    Show,
    /// Replace the segment at INDEX, or append when INDEX equals the segment count
    SetSegment {
        /// Zero-based segment position
        index: usize,
        /// work, break, lunch or custom
        #[arg(long)]
        kind: SegmentKind,
        /// Segment length in minutes
        #[arg(long)]
        minutes: u32,
        /// Display title (defaults to the kind's name)
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Remove the segment at INDEX
    RemoveSegment { index: usize },
    /// Remove every segment
    Clear,
}

pub fn run(action: PlanAction) -> CommandResult {
    let repo = DayPlanRepository::open_default()?;
    let mut plan = repo.load();

    match action {
        PlanAction::Show => return print_json(&plan),
        PlanAction::SetSegment {
            index,
            kind,
            minutes,
            title,
        } => {
            let duration = Duration::from_secs(u64::from(minutes) * 60);
            set_segment(&mut plan, index, PlanSegment::new(kind, &title, duration))?;
        }
        PlanAction::RemoveSegment { index } => {
            if index >= plan.segments.len() {
                return Err(format!("no segment at index {index}").into());
            }
            plan.segments.remove(index);
        }
        PlanAction::Clear => plan.segments.clear(),
    }

    repo.save(&plan);
    print_json(&plan)
}

fn set_segment(plan: &mut DayPlan, index: usize, segment: PlanSegment) -> CommandResult {
    match index.cmp(&plan.segments.len()) {
        std::cmp::Ordering::Less => plan.segments[index] = segment,
        std::cmp::Ordering::Equal => plan.segments.push(segment),
        std::cmp::Ordering::Greater => {
            return Err(format!("index {index} is past the end of a {}-segment plan", plan.segments.len()).into())
        }
    }
    Ok(())
}
