// run.rs — `tb run`: tick the steps of a run file.
//
// Each step instantiates a fresh Sleep node plus a SleepCost evaluator that
// watches its feedback, then ticks both at the configured interval. A step
// ends when the node reports Success or Failure, or when its timeout elapses,
// in which case the node is halted (which cancels the goal on the server).

use std::fmt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use tb_action::{EventDispatcher, JsonlSink};
use tb_tree::{Blackboard, NodeConfig, NodeRegistry, NodeStatus, TreeNode};

use crate::run_file::{RunFile, Step};
use crate::sleep::{demo_registry, SLEEP_COST_ID, SLEEP_ID};

const FEEDBACK_KEY: &str = "sleep_feedback";

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Finished(NodeStatus),
    /// Timed out and halted.
    Halted,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Finished(status) => write!(f, "{}", status),
            StepOutcome::Halted => write!(f, "halted (timeout)"),
        }
    }
}

pub fn execute(file: &Path, tick_ms: Option<u64>, events: Option<&Path>) -> anyhow::Result<()> {
    let run = RunFile::load(file)?;
    let tick = tick_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| run.tick_interval());
    if tick.is_zero() {
        anyhow::bail!("--tick-ms must be greater than zero");
    }

    let mut dispatcher = EventDispatcher::new();
    if let Some(path) = events {
        dispatcher.add_sink(Box::new(JsonlSink::new(path)));
    }

    if run.steps.is_empty() {
        println!("No steps in {}.", file.display());
        return Ok(());
    }

    let outcomes = run_steps(&run, tick, dispatcher)?;
    println!();
    for (name, outcome) in &outcomes {
        println!("  {:<20} {}", name, outcome);
    }
    Ok(())
}

/// Run every step in order, returning each node name with its outcome.
pub fn run_steps(
    run: &RunFile,
    tick: Duration,
    events: EventDispatcher,
) -> anyhow::Result<Vec<(String, StepOutcome)>> {
    let registry = demo_registry(&run.sleep_action, events)?;
    let blackboard = Blackboard::new();
    tracing::info!(
        "running {} step(s) every {}ms against [{}]",
        run.steps.len(),
        tick.as_millis(),
        run.sleep_action.action_name
    );

    let mut outcomes = Vec::with_capacity(run.steps.len());
    for (index, step) in run.steps.iter().enumerate() {
        let name = step.node_name(index);
        blackboard.remove(FEEDBACK_KEY);
        let outcome = run_step(&registry, &blackboard, &name, step, tick)
            .with_context(|| format!("step {} ({})", index + 1, name))?;
        tracing::info!("{}: {}", name, outcome);
        outcomes.push((name, outcome));
    }
    Ok(outcomes)
}

fn run_step(
    registry: &NodeRegistry,
    blackboard: &Blackboard,
    name: &str,
    step: &Step,
    tick: Duration,
) -> anyhow::Result<StepOutcome> {
    let feedback = format!("{{{}}}", FEEDBACK_KEY);
    let mut node = registry.instantiate(
        SLEEP_ID,
        name,
        NodeConfig::new(blackboard.clone())
            .bind("msec", step.msec.to_string())
            .bind("feedback", feedback.as_str()),
    )?;
    let mut cost = registry.instantiate(
        SLEEP_COST_ID,
        &format!("{}_cost", name),
        NodeConfig::new(blackboard.clone())
            .bind("feedback", feedback.as_str())
            .bind("budget_ms", step.msec.to_string()),
    )?;

    let started = Instant::now();
    loop {
        let status = node.tick()?;
        sample_costs(cost.as_mut(), blackboard);

        if status.is_completed() {
            cost.halt();
            return Ok(StepOutcome::Finished(status));
        }
        if step.timeout().is_some_and(|limit| started.elapsed() >= limit) {
            tracing::warn!("{}: timed out after {}ms, halting", name, started.elapsed().as_millis());
            node.halt();
            cost.halt();
            return Ok(StepOutcome::Halted);
        }
        thread::sleep(tick);
    }
}

/// Tick the evaluator if the action has published any feedback yet.
fn sample_costs(cost: &mut dyn TreeNode, blackboard: &Blackboard) {
    if !blackboard.contains(FEEDBACK_KEY) {
        return;
    }
    match cost.tick() {
        Ok(_) => tracing::debug!(
            "{}: performance_cost={} resource_cost={}",
            cost.name(),
            blackboard.get("performance_cost").unwrap_or_default(),
            blackboard.get("resource_cost").unwrap_or_default()
        ),
        Err(e) => tracing::debug!("{}: {}", cost.name(), e),
    }
}

#[cfg(test)]
mod tests {
    use tb_action::MemorySink;

    use super::*;

    fn run_file(content: &str) -> RunFile {
        RunFile::from_toml_str(content).unwrap()
    }

    #[test]
    fn short_sleep_succeeds() {
        let run = run_file("[[steps]]\nmsec = 20\n");
        let outcomes = run_steps(&run, Duration::from_millis(5), EventDispatcher::new()).unwrap();
        assert_eq!(
            outcomes,
            vec![("sleep_1".to_string(), StepOutcome::Finished(NodeStatus::Success))]
        );
    }

    #[test]
    fn timeout_halts_long_sleep_and_cancels_goal() {
        let memory = MemorySink::new();
        let run = run_file(
            r#"
[[steps]]
name = "long"
msec = 10000
timeout_ms = 60

[[steps]]
name = "after"
msec = 10
"#,
        );
        let outcomes = run_steps(
            &run,
            Duration::from_millis(10),
            EventDispatcher::new().with_sink(memory.clone()),
        )
        .unwrap();

        assert_eq!(outcomes[0], ("long".to_string(), StepOutcome::Halted));
        assert_eq!(
            outcomes[1],
            ("after".to_string(), StepOutcome::Finished(NodeStatus::Success))
        );
        assert!(memory
            .events()
            .iter()
            .any(|e| e.event_type() == "cancel_requested" && e.node() == "long"));
    }

    #[test]
    fn outcome_display() {
        assert_eq!(StepOutcome::Finished(NodeStatus::Failure).to_string(), "failure");
        assert_eq!(StepOutcome::Halted.to_string(), "halted (timeout)");
    }
}
