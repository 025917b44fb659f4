// evaluator.rs — EvaluatorNode: derives costs from an action's feedback.
//
// An evaluator runs beside an ActionNode and reads the feedback the action
// publishes. Every tick it samples the latest feedback, asks the
// ActionEvaluator for a status and two costs, and publishes the costs as
// outputs. It never talks to the action endpoint itself.

use serde::{Deserialize, Serialize};
use tb_tree::{NodeConfig, NodeError, NodePorts, NodeStatus, PortsList, TreeNode};

use crate::action::ActionType;
use crate::error::ActionNodeError;
use crate::register::{evaluator_base_ports, FEEDBACK_PORT, PERFORMANCE_COST_PORT, RESOURCE_COST_PORT};

/// Costs derived from one feedback sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedCosts {
    pub performance_cost: f32,
    pub resource_cost: f32,
}

impl DerivedCosts {
    pub fn new(performance_cost: f32, resource_cost: f32) -> Self {
        Self {
            performance_cost,
            resource_cost,
        }
    }
}

/// What one sampling step reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Running, Success or Failure.
    pub status: NodeStatus,
    pub costs: DerivedCosts,
}

impl Evaluation {
    pub fn running(costs: DerivedCosts) -> Self {
        Self {
            status: NodeStatus::Running,
            costs,
        }
    }

    pub fn finished(status: NodeStatus, costs: DerivedCosts) -> Self {
        Self { status, costs }
    }
}

/// Turns feedback samples into costs.
pub trait ActionEvaluator: Send + 'static {
    type Action: ActionType;

    fn provided_ports() -> PortsList
    where
        Self: Sized,
    {
        PortsList::new()
    }

    fn spin_once(
        &mut self,
        feedback: &<Self::Action as ActionType>::Feedback,
        ports: &NodePorts,
    ) -> Evaluation;
}

pub struct EvaluatorNode<E: ActionEvaluator> {
    name: String,
    evaluator: E,
    ports: NodePorts,
    status: NodeStatus,
    costs: Option<DerivedCosts>,
}

impl<E: ActionEvaluator> EvaluatorNode<E> {
    pub fn new(name: impl Into<String>, evaluator: E, config: NodeConfig) -> Self {
        let name = name.into();
        let ports = NodePorts::new(&name, Self::ports_list(), config);
        Self {
            name,
            evaluator,
            ports,
            status: NodeStatus::Idle,
            costs: None,
        }
    }

    /// The evaluator's own ports plus `feedback`, `performance_cost` and
    /// `resource_cost`.
    pub fn ports_list() -> PortsList {
        E::provided_ports().merge(&evaluator_base_ports())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Costs from the most recent successful sample.
    pub fn costs(&self) -> Option<DerivedCosts> {
        self.costs
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Sample the feedback input once.
    ///
    /// A missing or undecodable sample is an error of the tick itself and
    /// leaves the node's status untouched.
    pub fn poll(&mut self) -> Result<NodeStatus, ActionNodeError> {
        let feedback = match self
            .ports
            .try_get_input::<<E::Action as ActionType>::Feedback>(FEEDBACK_PORT)
        {
            Ok(Some(feedback)) => feedback,
            Ok(None) => {
                tracing::warn!("{}: no feedback sample available", self.name);
                return Err(ActionNodeError::MissingFeedbackInput);
            }
            Err(e) => {
                tracing::warn!("{}: {}", self.name, e);
                return Err(ActionNodeError::MissingFeedbackInput);
            }
        };

        if self.status == NodeStatus::Idle {
            tracing::debug!("{}: evaluation started", self.name);
        }

        let evaluation = self.evaluator.spin_once(&feedback, &self.ports);
        if evaluation.status == NodeStatus::Idle {
            panic!(
                "{}: spin_once must return Running, Success or Failure, got {}",
                self.name, evaluation.status
            );
        }

        let costs = evaluation.costs;
        for (port, value) in [
            (PERFORMANCE_COST_PORT, costs.performance_cost),
            (RESOURCE_COST_PORT, costs.resource_cost),
        ] {
            if let Err(e) = self.ports.set_output(port, &value) {
                tracing::warn!("{}: could not publish [{}]: {}", self.name, port, e);
            }
        }
        self.costs = Some(costs);
        self.status = evaluation.status;
        Ok(evaluation.status)
    }

    pub fn halt(&mut self) {
        if self.status != NodeStatus::Idle {
            tracing::debug!("{}: evaluation halted", self.name);
        }
        self.status = NodeStatus::Idle;
    }
}

impl<E: ActionEvaluator> TreeNode for EvaluatorNode<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> NodeStatus {
        self.status
    }

    fn tick(&mut self) -> Result<NodeStatus, NodeError> {
        self.poll().map_err(|e| NodeError::runtime(&self.name, e))
    }

    fn halt(&mut self) {
        EvaluatorNode::halt(self);
    }
}
