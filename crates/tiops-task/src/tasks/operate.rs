//! Bridging tasks to the lifecycle procedures.

use std::sync::Arc;

use tiops_operation::{action, destroy, scale_in, upgrade, Operation, Options};
use tiops_topology::Topology;

use crate::context::Context;
use crate::error::Result;
use crate::task::Task;

/// Invokes an orchestrator procedure against the topology.
pub struct ClusterOperate {
    topo: Arc<Topology>,
    op: Operation,
    options: Options,
}

impl ClusterOperate {
    /// Creates the task.
    pub fn new(topo: Arc<Topology>, op: Operation, options: Options) -> Self {
        Self { topo, op, options }
    }
}

impl Task for ClusterOperate {
    fn execute(&self, ctx: &Context) -> Result<()> {
        match self.op {
            Operation::Start => {
                action::start(ctx, &self.topo, &self.options.roles, &self.options.nodes)?
            }
            Operation::Stop => {
                action::stop(ctx, &self.topo, &self.options.roles, &self.options.nodes)?
            }
            Operation::Restart => {
                action::restart(ctx, &self.topo, &self.options.roles, &self.options.nodes)?
            }
            Operation::Upgrade => upgrade::upgrade(ctx, &self.topo, &self.options)?,
            Operation::Destroy => destroy::destroy_cluster(ctx, &self.topo)?,
            Operation::ScaleIn => {
                // The persistent topology change is applied separately
                // by UpdateMeta from the same node list.
                let mut topo = (*self.topo).clone();
                scale_in::scale_in(ctx, &mut topo, &self.options)?
            }
        }
        Ok(())
    }

    fn stringify(&self) -> String {
        format!("ClusterOperate: operation={}", self.op)
    }
}
