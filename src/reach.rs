//! Symbolic reachability: the least fixpoint of the image operator from the
//! initial marking.
//!
//! The loop is a plain breadth-first frontier expansion on sets:
//! `R <- R ∨ Img(R)` until the canonical handle stops changing. Handle
//! equality is exact set equality, so convergence detection is O(1).

use std::collections::HashSet;

use log::{debug, info};
use num_bigint::BigUint;
use thiserror::Error;

use crate::bdd::Bdd;
use crate::encode::VarEncoding;
use crate::net::{Marking, NetError, PetriNet, PlaceId};
use crate::reference::Ref;
use crate::relation::{enabled_set, transition_relation};

/// Resource budgets for the fixpoint computation.
///
/// Exceeding a budget is reported as an error, never as a wrong answer.
#[derive(Debug, Clone, Copy)]
pub struct ReachOptions {
    /// Maximum number of fixpoint iterations.
    pub max_iterations: usize,
    /// Maximum number of allocated BDD nodes, checked between iterations.
    pub max_nodes: usize,
}

impl Default for ReachOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            max_nodes: 1 << 24,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReachError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error("fixpoint did not converge within {0} iterations")]
    IterationBudget(usize),

    #[error("node budget exceeded: {nodes} allocated (limit {limit})")]
    NodeBudget { nodes: usize, limit: usize },
}

/// The reachable markings of a net, as a BDD over current-frame variables.
#[derive(Debug)]
pub struct ReachableSet {
    bdd: Bdd,
    encoding: VarEncoding,
    set: Ref,
    iterations: usize,
}

/// One image step: `Img(S) = (∃x. S ∧ T)[x' <- x]`.
fn image(bdd: &Bdd, enc: &VarEncoding, states: Ref, rel: Ref) -> Ref {
    let conj = bdd.apply_and(states, rel);
    let mut img = bdd.exists(conj, enc.current_vars());
    // Rename next-frame to current-frame, ascending. Each next variable
    // 2p+2 maps to 2p+1 just above it, so the order is preserved and no
    // later substitution touches an already renamed variable.
    for v in enc.next_vars() {
        img = bdd.compose(img, v, bdd.mk_var(v - 1));
    }
    img
}

/// Compute the reachable set of `net` under the given budgets.
///
/// After the fixpoint converges, every transition is checked for 1-safety:
/// firing from a reachable marking must never put a token on an already
/// marked post-place.
pub fn reachable_set(net: &PetriNet, opts: ReachOptions) -> Result<ReachableSet, ReachError> {
    net.validate()?;

    let bdd = Bdd::default();
    let enc = VarEncoding::new(net);

    let rel = transition_relation(&bdd, net, &enc);
    info!(
        "transition relation over {} transitions: {} nodes",
        net.num_transitions(),
        bdd.size(rel)
    );

    let init = bdd.cube(enc.marking_cube(&net.initial_marking()));

    let mut reached = init;
    let mut iterations = 0;
    loop {
        if iterations >= opts.max_iterations {
            return Err(ReachError::IterationBudget(opts.max_iterations));
        }
        let nodes = bdd.num_nodes();
        if nodes > opts.max_nodes {
            return Err(ReachError::NodeBudget {
                nodes,
                limit: opts.max_nodes,
            });
        }

        let next = bdd.apply_or(reached, image(&bdd, &enc, reached, rel));
        iterations += 1;
        debug!("iteration {}: {} nodes in frontier set", iterations, bdd.size(next));
        if next == reached {
            break;
        }
        reached = next;
    }
    info!("fixpoint after {} iterations, {} nodes", iterations, bdd.size(reached));

    verify_one_safe(&bdd, net, &enc, reached)?;

    Ok(ReachableSet {
        bdd,
        encoding: enc,
        set: reached,
        iterations,
    })
}

fn verify_one_safe(bdd: &Bdd, net: &PetriNet, enc: &VarEncoding, reached: Ref) -> Result<(), NetError> {
    for t in net.transitions() {
        let tr = net.transition(t);
        let pre: HashSet<PlaceId> = tr.pre().iter().copied().collect();
        let enabled = enabled_set(bdd, net, enc, t);
        let fireable = bdd.apply_and(reached, enabled);
        for &p in tr.post() {
            if pre.contains(&p) {
                continue;
            }
            let marked = bdd.apply_and(fireable, bdd.mk_var(enc.current(p)));
            if !bdd.is_zero(marked) {
                return Err(NetError::NotOneSafe {
                    transition: tr.name().to_string(),
                    place: net.place_name(p).to_string(),
                });
            }
        }
    }
    Ok(())
}

impl ReachableSet {
    /// Membership test, linear in the number of places.
    pub fn contains(&self, m: &Marking) -> bool {
        self.bdd.evaluate(self.set, |v| {
            match self.encoding.place_of_current(v) {
                Some(p) => m.is_marked(p),
                // The set does not depend on next-frame variables.
                None => false,
            }
        })
    }

    /// Number of reachable markings.
    ///
    /// The set is counted over all `2n` variables and divided back down by
    /// the `n` unconstrained next-frame variables.
    pub fn count(&self) -> BigUint {
        let n = self.encoding.num_places();
        self.bdd.sat_count(self.set, 2 * n) >> n
    }

    /// Enumerate all reachable markings. Only sensible for small sets.
    pub fn markings(&self) -> Vec<Marking> {
        let mut out = Vec::new();
        let n = self.encoding.num_places();
        let mut bits = vec![false; n];
        self.enumerate(self.set, 0, &mut bits, &mut out);
        out.sort_by_key(|m| m.to_string());
        out
    }

    fn enumerate(&self, node: Ref, place: usize, bits: &mut Vec<bool>, out: &mut Vec<Marking>) {
        if self.bdd.is_zero(node) {
            return;
        }
        if place == self.encoding.num_places() {
            debug_assert!(self.bdd.is_one(node));
            out.push(Marking::from_bits(bits.clone()));
            return;
        }
        let v = self.encoding.current(PlaceId(place));
        let (low, high) = self.bdd.top_cofactors(node, v);
        bits[place] = false;
        self.enumerate(low, place + 1, bits, out);
        bits[place] = true;
        self.enumerate(high, place + 1, bits, out);
        bits[place] = false;
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Nodes in the reachable-set BDD, for diagnostics.
    pub fn bdd_size(&self) -> u64 {
        self.bdd.size(self.set)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::ToBigUint;
    use test_log::test;

    use super::*;

    fn chain() -> PetriNet {
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.mark_initial(p1).unwrap();
        net
    }

    fn cycle() -> PetriNet {
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.add_transition("t2", [p2], [p1]).unwrap();
        net.mark_initial(p1).unwrap();
        net
    }

    #[test]
    fn test_chain_reachable() {
        let net = chain();
        let reach = reachable_set(&net, ReachOptions::default()).unwrap();

        assert_eq!(reach.count(), 2.to_biguint().unwrap());

        let m0 = net.initial_marking();
        let m1 = net.fire(crate::net::TransitionId(0), &m0);
        assert!(reach.contains(&m0));
        assert!(reach.contains(&m1));

        let empty = Marking::empty(2);
        assert!(!reach.contains(&empty));

        let both = Marking::from_bits(vec![true, true]);
        assert!(!reach.contains(&both));
    }

    #[test]
    fn test_cycle_reachable() {
        let net = cycle();
        let reach = reachable_set(&net, ReachOptions::default()).unwrap();

        assert_eq!(reach.count(), 2.to_biguint().unwrap());
        // The monotone sequence stabilizes within 2^|P| steps.
        assert!(reach.iterations() <= 4);
        let markings = reach.markings();
        assert_eq!(markings.len(), 2);
        assert!(markings.contains(&Marking::from_bits(vec![true, false])));
        assert!(markings.contains(&Marking::from_bits(vec![false, true])));
    }

    #[test]
    fn test_iteration_budget() {
        let net = cycle();
        let opts = ReachOptions {
            max_iterations: 1,
            ..Default::default()
        };
        let err = reachable_set(&net, opts).unwrap_err();
        assert!(matches!(err, ReachError::IterationBudget(1)));
    }

    #[test]
    fn test_not_one_safe_detected() {
        // t1 can fire while p3 is already marked by t2's earlier output.
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        let p3 = net.add_place("p3").unwrap();
        net.add_transition("t1", [p1], [p2, p3]).unwrap();
        net.add_transition("t2", [p2], [p1]).unwrap();
        net.mark_initial(p1).unwrap();

        let err = reachable_set(&net, ReachOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ReachError::Net(NetError::NotOneSafe { .. })
        ));
        let _ = p3;
    }

    #[test]
    fn test_empty_net_rejected() {
        let net = PetriNet::new();
        let err = reachable_set(&net, ReachOptions::default()).unwrap_err();
        assert!(matches!(err, ReachError::Net(NetError::NoPlaces)));
    }
}
