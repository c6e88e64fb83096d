//! Hybrid deadlock detection: the ILP state-equation relaxation proposes
//! candidate dead markings, the symbolic reachable set accepts or refutes
//! them, and refuted candidates are cut out of the relaxation.
//!
//! Soundness rests on two one-sided guarantees. The relaxation
//! over-approximates: if it is infeasible, no reachable deadlock exists.
//! The BDD membership test is exact on the computed reachable set. So an
//! accepted candidate is a real deadlock, and an infeasible relaxation is a
//! proof of deadlock-freedom; everything in between loops until a budget
//! runs out.

use log::{debug, info};
use thiserror::Error;

use crate::ilp::{IlpSolver, SolveOutcome, SolverError, StateEquation};
use crate::net::{Marking, NetError, PetriNet};
use crate::reach::{reachable_set, ReachError, ReachOptions, ReachableSet};
use crate::simplex::BranchBound;

/// The answer of the hybrid search.
#[derive(Debug, Clone)]
pub enum DeadlockVerdict {
    /// No reachable marking disables every transition.
    NoDeadlock,
    /// A reachable dead marking, with a proof by membership.
    DeadlockAt(Marking),
    /// A budget ran out before either proof was reached.
    Inconclusive(InconclusiveReason),
}

#[derive(Debug, Clone, Error)]
pub enum InconclusiveReason {
    #[error("reachability analysis ran out of budget: {0}")]
    Reachability(ReachError),

    #[error("refinement budget exhausted after {attempts} candidates")]
    RefinementBudget { attempts: usize },

    #[error("ILP solver ran out of budget: {0}")]
    Solver(SolverError),
}

#[derive(Debug, Clone, Copy)]
pub struct HybridOptions {
    pub reach: ReachOptions,
    pub solver: BranchBound,
    pub max_refinements: usize,
}

impl HybridOptions {
    pub fn new() -> Self {
        Self {
            reach: ReachOptions::default(),
            solver: BranchBound::default(),
            max_refinements: 10_000,
        }
    }
}

impl Default for HybridOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// One deadlock query over one net.
///
/// The search owns its refinement state, so [`HybridSearch::cuts_added`]
/// reports how much the relaxation had to be tightened.
pub struct HybridSearch<'a> {
    net: &'a PetriNet,
    opts: HybridOptions,
    cuts: usize,
}

impl<'a> HybridSearch<'a> {
    pub fn new(net: &'a PetriNet) -> Self {
        Self::with_options(net, HybridOptions::new())
    }

    pub fn with_options(net: &'a PetriNet, opts: HybridOptions) -> Self {
        Self { net, opts, cuts: 0 }
    }

    /// Number of exclusion cuts added during the last [`HybridSearch::run`].
    pub fn cuts_added(&self) -> usize {
        self.cuts
    }

    /// Run the search to a verdict.
    ///
    /// Structural model errors (including a 1-safety violation discovered
    /// during reachability) abort with `Err`; resource exhaustion is a
    /// verdict, not an error.
    pub fn run(&mut self) -> Result<DeadlockVerdict, NetError> {
        self.cuts = 0;
        self.net.validate()?;

        let reach = match reachable_set(self.net, self.opts.reach) {
            Ok(r) => r,
            Err(ReachError::Net(e)) => return Err(e),
            Err(e) => {
                return Ok(DeadlockVerdict::Inconclusive(
                    InconclusiveReason::Reachability(e),
                ))
            }
        };
        info!(
            "reachable set: {} markings in {} BDD nodes",
            reach.count(),
            reach.bdd_size()
        );

        Ok(self.refine(&reach))
    }

    fn refine(&mut self, reach: &ReachableSet) -> DeadlockVerdict {
        let mut relaxation = StateEquation::new(self.net);
        let mut solver = self.opts.solver;

        for attempt in 1..=self.opts.max_refinements {
            let outcome = match solver.solve(relaxation.model()) {
                Ok(o) => o,
                Err(e) => return DeadlockVerdict::Inconclusive(InconclusiveReason::Solver(e)),
            };

            match outcome {
                SolveOutcome::Infeasible => {
                    info!("relaxation infeasible after {} cuts: no deadlock", self.cuts);
                    return DeadlockVerdict::NoDeadlock;
                }
                SolveOutcome::Feasible(solution) => {
                    let candidate = relaxation.marking_of(&solution);
                    if reach.contains(&candidate) {
                        info!(
                            "deadlock {} confirmed on attempt {}",
                            self.net.format_marking(&candidate),
                            attempt
                        );
                        return DeadlockVerdict::DeadlockAt(candidate);
                    }
                    debug!(
                        "candidate {} is unreachable, cutting",
                        self.net.format_marking(&candidate)
                    );
                    relaxation.exclude(&candidate);
                    self.cuts += 1;
                }
            }
        }

        DeadlockVerdict::Inconclusive(InconclusiveReason::RefinementBudget {
            attempts: self.opts.max_refinements,
        })
    }
}

/// Convenience entry point with default budgets.
pub fn find_deadlock(net: &PetriNet) -> Result<DeadlockVerdict, NetError> {
    HybridSearch::new(net).run()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_chain_deadlocks() {
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.mark_initial(p1).unwrap();

        match find_deadlock(&net).unwrap() {
            DeadlockVerdict::DeadlockAt(m) => {
                assert!(!m.is_marked(p1));
                assert!(m.is_marked(p2));
                assert!(net.is_deadlock(&m));
            }
            other => panic!("expected a deadlock, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_is_deadlock_free() {
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.add_transition("t2", [p2], [p1]).unwrap();
        net.mark_initial(p1).unwrap();

        let mut search = HybridSearch::new(&net);
        assert!(matches!(
            search.run().unwrap(),
            DeadlockVerdict::NoDeadlock
        ));
        // The relaxation alone is already infeasible here.
        assert_eq!(search.cuts_added(), 0);
    }

    #[test]
    fn test_spurious_candidate_is_cut() {
        // The state equation admits the empty marking (the cycle through
        // t1/t2 lets firing counts fake a token on p2), but p2 can never be
        // marked, so the candidate is spurious and must be cut.
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        let p3 = net.add_place("p3").unwrap();
        net.add_transition("t0", [p1], [p1]).unwrap();
        net.add_transition("t1", [p1, p2], [p3]).unwrap();
        net.add_transition("t2", [p3], [p2]).unwrap();
        net.mark_initial(p1).unwrap();

        let mut search = HybridSearch::new(&net);
        assert!(matches!(
            search.run().unwrap(),
            DeadlockVerdict::NoDeadlock
        ));
        assert_eq!(search.cuts_added(), 1);
    }

    #[test]
    fn test_always_enabled_transition_means_no_deadlock() {
        // 'tick' has an empty pre-set, so it is enabled in every marking
        // and no deadlock can exist. Its disabledness constraint is the
        // unsatisfiable 0 <= -1, so the relaxation answers immediately.
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.add_transition("tick", [], []).unwrap();
        net.mark_initial(p1).unwrap();

        let mut search = HybridSearch::new(&net);
        assert!(matches!(search.run().unwrap(), DeadlockVerdict::NoDeadlock));
        assert_eq!(search.cuts_added(), 0);
    }

    #[test]
    fn test_unsafe_net_rejected() {
        // 'spawn' can refill an already marked place, so the net is not
        // 1-safe and the model is rejected before any verdict.
        let mut net = PetriNet::new();
        let p = net.add_place("p").unwrap();
        net.add_transition("spawn", [], [p]).unwrap();
        net.add_transition("drain", [p], []).unwrap();

        let verdict = find_deadlock(&net);
        assert!(matches!(verdict, Err(NetError::NotOneSafe { .. })));
    }

    #[test]
    fn test_refinement_budget() {
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.mark_initial(p1).unwrap();

        let opts = HybridOptions {
            max_refinements: 0,
            ..HybridOptions::new()
        };
        let mut search = HybridSearch::with_options(&net, opts);
        assert!(matches!(
            search.run().unwrap(),
            DeadlockVerdict::Inconclusive(InconclusiveReason::RefinementBudget { attempts: 0 })
        ));
    }
}
