//! Maximization of a weighted marking over the reachable set.
//!
//! The solver only answers feasibility, so optimization is a bound-tightening
//! loop over the state-equation relaxation (without any deadlock predicate):
//! whenever a reachable marking of value `v` is confirmed, the relaxation
//! additionally requires value `>= v + 1` and the search repeats; unreachable
//! candidates are excluded with single-point cuts. Weights and markings are
//! integral, so each improvement step is at least 1 and the loop terminates
//! at the optimum (or on a budget).

use log::{debug, info};
use num_bigint::BigInt;

use crate::deadlock::{HybridOptions, InconclusiveReason};
use crate::ilp::{IlpSolver, SolveOutcome, StateEquation};
use crate::net::{Marking, NetError, PetriNet};
use crate::reach::{reachable_set, ReachError};

/// The answer of the weighted marking search.
#[derive(Debug, Clone)]
pub enum OptimizeVerdict {
    /// The maximum-weight reachable marking.
    Optimum { marking: Marking, value: BigInt },
    /// A budget ran out before the optimum was certified.
    Inconclusive(InconclusiveReason),
}

fn weight_of(weights: &[i64], m: &Marking) -> BigInt {
    m.marked_places()
        .map(|p| BigInt::from(weights[p.0]))
        .sum()
}

/// Find the reachable marking maximizing `Σ_p w_p · M(p)`.
///
/// `weights` is indexed by place; it must cover every place of the net.
/// Some reachable marking always exists (at least the initial one), so the
/// only non-optimum outcome is a budget running out.
pub fn maximize_marking_weight(
    net: &PetriNet,
    weights: &[i64],
    opts: HybridOptions,
) -> Result<OptimizeVerdict, NetError> {
    net.validate()?;
    assert_eq!(
        weights.len(),
        net.num_places(),
        "One weight per place is required"
    );

    let reach = match reachable_set(net, opts.reach) {
        Ok(r) => r,
        Err(ReachError::Net(e)) => return Err(e),
        Err(e) => {
            return Ok(OptimizeVerdict::Inconclusive(
                InconclusiveReason::Reachability(e),
            ))
        }
    };

    let mut relaxation = StateEquation::reachability_only(net);
    let mut solver = opts.solver;
    let mut best: Option<(Marking, BigInt)> = None;

    for _ in 1..=opts.max_refinements {
        let outcome = match solver.solve(relaxation.model()) {
            Ok(o) => o,
            Err(e) => return Ok(OptimizeVerdict::Inconclusive(InconclusiveReason::Solver(e))),
        };

        match outcome {
            SolveOutcome::Infeasible => {
                // Reachable markings satisfy the state equation and are never
                // cut, so infeasibility implies a confirmed incumbent.
                let (marking, value) = best
                    .expect("the initial marking satisfies the state equation");
                info!(
                    "optimum {} with value {}",
                    net.format_marking(&marking),
                    value
                );
                return Ok(OptimizeVerdict::Optimum { marking, value });
            }
            SolveOutcome::Feasible(solution) => {
                let candidate = relaxation.marking_of(&solution);
                if reach.contains(&candidate) {
                    let value = weight_of(weights, &candidate);
                    debug!(
                        "reachable marking {} with value {}",
                        net.format_marking(&candidate),
                        value
                    );
                    // Demand a strictly better value from now on.
                    let next = value.clone() + BigInt::from(1);
                    relaxation.require_weight_at_least(weights, &next);
                    best = Some((candidate, value));
                } else {
                    debug!(
                        "candidate {} is unreachable, cutting",
                        net.format_marking(&candidate)
                    );
                    relaxation.exclude(&candidate);
                }
            }
        }
    }

    Ok(OptimizeVerdict::Inconclusive(
        InconclusiveReason::RefinementBudget {
            attempts: opts.max_refinements,
        },
    ))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn optimize(net: &PetriNet, weights: &[i64]) -> OptimizeVerdict {
        maximize_marking_weight(net, weights, HybridOptions::new()).unwrap()
    }

    #[test]
    fn test_chain() {
        // Reachable: {p1} (value 5) and {p2} (value 7).
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.mark_initial(p1).unwrap();

        match optimize(&net, &[5, 7]) {
            OptimizeVerdict::Optimum { marking, value } => {
                assert_eq!(marking, Marking::from_bits(vec![false, true]));
                assert_eq!(value, BigInt::from(7));
            }
            other => panic!("expected an optimum, got {:?}", other),
        }
    }

    #[test]
    fn test_picks_heavier_branch() {
        // A free choice between two branches: the weights decide.
        let mut net = PetriNet::new();
        let p0 = net.add_place("p0").unwrap();
        let pa = net.add_place("pa").unwrap();
        let pb = net.add_place("pb").unwrap();
        net.add_transition("ta", [p0], [pa]).unwrap();
        net.add_transition("tb", [p0], [pb]).unwrap();
        net.mark_initial(p0).unwrap();

        match optimize(&net, &[0, 1, 3]) {
            OptimizeVerdict::Optimum { marking, value } => {
                assert!(marking.is_marked(pb));
                assert_eq!(value, BigInt::from(3));
            }
            other => panic!("expected an optimum, got {:?}", other),
        }
    }

    #[test]
    fn test_all_negative_weights_keep_lightest_marking() {
        // Both reachable markings carry one token; the optimum is the less
        // negative one, {p1} at value -1.
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.mark_initial(p1).unwrap();

        match optimize(&net, &[-1, -2]) {
            OptimizeVerdict::Optimum { marking, value } => {
                assert_eq!(marking, Marking::from_bits(vec![true, false]));
                assert_eq!(value, BigInt::from(-1));
            }
            other => panic!("expected an optimum, got {:?}", other),
        }
    }

    #[test]
    fn test_spurious_candidates_do_not_survive() {
        // The t1/t2 cycle makes the empty marking state-equation-feasible,
        // but only {p1} is reachable, so the optimum is forced there.
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        let p3 = net.add_place("p3").unwrap();
        net.add_transition("t0", [p1], [p1]).unwrap();
        net.add_transition("t1", [p1, p2], [p3]).unwrap();
        net.add_transition("t2", [p3], [p2]).unwrap();
        net.mark_initial(p1).unwrap();

        match optimize(&net, &[1, 1, 1]) {
            OptimizeVerdict::Optimum { marking, value } => {
                assert_eq!(marking, Marking::from_bits(vec![true, false, false]));
                assert_eq!(value, BigInt::from(1));
            }
            other => panic!("expected an optimum, got {:?}", other),
        }
    }
}
