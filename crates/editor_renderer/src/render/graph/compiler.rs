//! Dependency validation and ordering

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use slotmap::SlotMap;

use super::pass::RenderPass;
use super::resource::{ResourceEntry, ResourceHandle};
use super::RenderGraphError;

/// Execution order of `passes`
///
/// Every referenced resource must exist and have at most one producer. A pass
/// reading a resource runs after its producer; among passes that are ready at
/// the same time the one added first runs first, so insertion order is kept
/// wherever dependencies allow.
pub fn compile_order<P>(
    passes: &[RenderPass<P>],
    resources: &SlotMap<ResourceHandle, ResourceEntry>,
) -> Result<Vec<usize>, RenderGraphError> {
    let mut producers: HashMap<ResourceHandle, usize> = HashMap::new();

    for (index, pass) in passes.iter().enumerate() {
        for &resource in pass.reads().iter().chain(pass.writes()) {
            if !resources.contains_key(resource) {
                return Err(RenderGraphError::UnknownResource {
                    pass: pass.name().to_string(),
                    resource: format!("{resource:?}"),
                });
            }
        }

        for &resource in pass.writes() {
            if let Some(&first) = producers.get(&resource) {
                return Err(RenderGraphError::MultipleProducers {
                    resource: resources[resource].name.clone(),
                    first: passes[first].name().to_string(),
                    second: pass.name().to_string(),
                });
            }
            producers.insert(resource, index);
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); passes.len()];
    let mut in_degree = vec![0_usize; passes.len()];

    for (index, pass) in passes.iter().enumerate() {
        for resource in pass.reads() {
            if let Some(&producer) = producers.get(resource) {
                if producer != index && !dependents[producer].contains(&index) {
                    dependents[producer].push(index);
                    in_degree[index] += 1;
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();
    let mut order = Vec::with_capacity(passes.len());

    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() < passes.len() {
        let stuck: Vec<&str> = (0..passes.len())
            .filter(|index| !order.contains(index))
            .map(|index| passes[index].name())
            .collect();
        return Err(RenderGraphError::CycleDetected(stuck.join(", ")));
    }

    Ok(order)
}
