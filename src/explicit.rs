//! Explicit-state reachability by breadth-first search.
//!
//! Enumerates concrete markings one at a time, so it only scales to small
//! nets; its role is as an oracle for the symbolic engine in tests and as a
//! baseline for quick experiments.

use std::collections::{HashSet, VecDeque};

use log::debug;

use crate::net::{Marking, NetError, PetriNet};

/// All markings reachable from the initial marking.
pub fn reachable_markings(net: &PetriNet) -> Result<HashSet<Marking>, NetError> {
    net.validate()?;

    let m0 = net.initial_marking();
    let mut visited = HashSet::new();
    visited.insert(m0.clone());
    let mut queue = VecDeque::from([m0]);

    while let Some(m) = queue.pop_front() {
        for t in net.enabled_transitions(&m) {
            let next = net.fire(t, &m);
            if visited.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }

    debug!("explicit search visited {} markings", visited.len());
    Ok(visited)
}

/// All reachable deadlocks, found explicitly.
pub fn reachable_deadlocks(net: &PetriNet) -> Result<Vec<Marking>, NetError> {
    let mut deadlocks: Vec<Marking> = reachable_markings(net)?
        .into_iter()
        .filter(|m| net.is_deadlock(m))
        .collect();
    deadlocks.sort_by_key(|m| m.to_string());
    Ok(deadlocks)
}
