//! Node and task sizing for a batch job.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Cannot fit {tasks} tasks in {nodes} node(s) x {tasks_per_node} tasks/node")]
    Unsatisfiable {
        tasks: u32,
        nodes: u32,
        tasks_per_node: u32,
    },
    #[error("{tasks_per_node} tasks/node exceeds the {max_tasks_per_node} cores of a node")]
    TooManyTasksPerNode {
        tasks_per_node: u32,
        max_tasks_per_node: u32,
    },
}

/// Node budget of the cluster partition a job goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCapacity {
    /// Nodes the user asked for (a lower bound)
    pub requested_nodes: u32,

    /// Hard upper bound on nodes
    pub max_nodes: u32,

    /// Cores usable per node
    pub max_tasks_per_node: u32,
}

impl NodeCapacity {
    /// Build a capacity, raising any zero value to 1.
    pub fn new(requested_nodes: u32, max_nodes: u32, max_tasks_per_node: u32) -> Self {
        Self {
            requested_nodes: requested_nodes.max(1),
            max_nodes: max_nodes.max(1),
            max_tasks_per_node: max_tasks_per_node.max(1),
        }
    }
}

impl Default for NodeCapacity {
    fn default() -> Self {
        Self::new(1, 18, 32)
    }
}

/// Concrete resource request for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocationPlan {
    pub nodes: u32,
    pub tasks: u32,
    /// Tasks placed on each node (`ceil(tasks / nodes)`)
    pub tasks_per_node: u32,
    /// Whether the node count was lowered to `max_nodes`
    pub capped: bool,
}

/// Size a job that needs `required_tasks` MPI ranks.
///
/// Uses the fewest nodes that hold every task, but never fewer than
/// requested. Going over `max_nodes` caps the count; if the capped nodes
/// can no longer hold every task the plan fails instead of starving a
/// partition.
pub fn plan_allocation(
    required_tasks: u32,
    capacity: &NodeCapacity,
) -> Result<AllocationPlan, AllocationError> {
    let tasks = required_tasks.max(1);
    let capacity = NodeCapacity::new(
        capacity.requested_nodes,
        capacity.max_nodes,
        capacity.max_tasks_per_node,
    );
    let tpn = capacity.max_tasks_per_node;

    let min_nodes = tasks.div_ceil(tpn);
    let mut nodes = min_nodes.max(capacity.requested_nodes);
    let mut capped = false;

    if nodes > capacity.max_nodes {
        tracing::warn!(
            "Requested too many nodes ({}), capping to max_nodes={}",
            nodes,
            capacity.max_nodes
        );
        nodes = capacity.max_nodes;
        capped = true;
    }

    if u64::from(nodes) * u64::from(tpn) < u64::from(tasks) {
        return Err(AllocationError::Unsatisfiable {
            tasks,
            nodes,
            tasks_per_node: tpn,
        });
    }

    let plan = AllocationPlan {
        nodes,
        tasks,
        tasks_per_node: tasks.div_ceil(nodes),
        capped,
    };
    tracing::info!(
        "Allocation: nodes={}, ntasks={}, ntasks/node={}",
        plan.nodes,
        plan.tasks,
        plan.tasks_per_node
    );
    Ok(plan)
}
