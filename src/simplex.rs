//! Bundled ILP solver: a bound-repairing simplex over exact rationals with
//! branch-and-bound on top for integrality.
//!
//! The simplex follows the standard incremental scheme: one slack variable
//! per constraint carries the row `s_i = Σ a_j·x_j`, constraint senses are
//! expressed purely as bounds on the slack, and a repair loop pivots until
//! every basic variable sits within its bounds. Variable selection uses the
//! smallest-index rule, which excludes cycling; a pivot budget bounds the
//! worst case anyway.

use std::collections::HashMap;

use log::{debug, trace};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};

use crate::ilp::{CmpOp, IlpModel, IlpSolver, SolveOutcome, SolverError};

type Row = HashMap<usize, BigRational>;

struct Simplex {
    /// Bounds for all variables, model variables first, then slacks.
    lower: Vec<Option<BigRational>>,
    upper: Vec<Option<BigRational>>,
    beta: Vec<BigRational>,
    /// One row per basic variable, over the current nonbasic variables.
    rows: Vec<Row>,
    basic: Vec<usize>,
    row_of: Vec<Option<usize>>,
    max_pivots: usize,
}

impl Simplex {
    /// Set up the tableau with the given (already merged) bounds on the
    /// model variables. Slacks start basic at the row value of the initial
    /// point, which clamps every nonbasic variable into its bounds.
    fn new(
        model: &IlpModel,
        mut lower: Vec<Option<BigRational>>,
        mut upper: Vec<Option<BigRational>>,
        max_pivots: usize,
    ) -> Self {
        let n = model.num_vars();
        let m = model.constraints().len();
        let total = n + m;

        let mut beta = Vec::with_capacity(total);
        for j in 0..n {
            let v = match (&lower[j], &upper[j]) {
                (Some(l), _) if l > &BigRational::zero() => l.clone(),
                (_, Some(u)) if u < &BigRational::zero() => u.clone(),
                _ => BigRational::zero(),
            };
            beta.push(v);
        }

        let mut rows = Vec::with_capacity(m);
        let mut basic = Vec::with_capacity(m);
        let mut row_of = vec![None; total];

        for (i, c) in model.constraints().iter().enumerate() {
            let s = n + i;
            let row: Row = c.expr.terms().map(|(v, a)| (v, a.clone())).collect();
            let value = row
                .iter()
                .map(|(&j, a)| a * &beta[j])
                .fold(BigRational::zero(), |acc, x| acc + x);
            beta.push(value);

            match c.op {
                CmpOp::Eq => {
                    lower.push(Some(c.rhs.clone()));
                    upper.push(Some(c.rhs.clone()));
                }
                CmpOp::Le => {
                    lower.push(None);
                    upper.push(Some(c.rhs.clone()));
                }
            }

            row_of[s] = Some(i);
            rows.push(row);
            basic.push(s);
        }

        Self {
            lower,
            upper,
            beta,
            rows,
            basic,
            row_of,
            max_pivots,
        }
    }

    /// Smallest-index basic variable outside its bounds, with the bound it
    /// must be moved to.
    fn find_violation(&self) -> Option<(usize, BigRational, bool)> {
        for (var, r) in self.row_of.iter().enumerate() {
            let Some(r) = *r else { continue };
            if let Some(l) = &self.lower[var] {
                if &self.beta[var] < l {
                    return Some((r, l.clone(), true));
                }
            }
            if let Some(u) = &self.upper[var] {
                if &self.beta[var] > u {
                    return Some((r, u.clone(), false));
                }
            }
        }
        None
    }

    fn can_increase(&self, j: usize) -> bool {
        match &self.upper[j] {
            Some(u) => &self.beta[j] < u,
            None => true,
        }
    }

    fn can_decrease(&self, j: usize) -> bool {
        match &self.lower[j] {
            Some(l) => &self.beta[j] > l,
            None => true,
        }
    }

    /// Smallest-index nonbasic variable able to move the row value in the
    /// required direction. `None` means the constraint system is infeasible.
    fn find_pivot(&self, r: usize, increase: bool) -> Option<usize> {
        let mut keys: Vec<usize> = self.rows[r].keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter().find(|&j| {
            let a = &self.rows[r][&j];
            let positive = a > &BigRational::zero();
            if increase == positive {
                self.can_increase(j)
            } else {
                self.can_decrease(j)
            }
        })
    }

    fn pivot_and_update(&mut self, r: usize, j: usize, v: BigRational) {
        let b = self.basic[r];
        let a_ij = self.rows[r][&j].clone();
        let theta = (&v - &self.beta[b]) / &a_ij;

        self.beta[b] = v;
        self.beta[j] = &self.beta[j] + &theta;

        let mut deltas = Vec::new();
        for (rr, row) in self.rows.iter().enumerate() {
            if rr != r {
                if let Some(c) = row.get(&j) {
                    deltas.push((self.basic[rr], c * &theta));
                }
            }
        }
        for (var, d) in deltas {
            self.beta[var] = &self.beta[var] + &d;
        }

        self.pivot(r, j, a_ij);
    }

    /// Swap basic `basic[r]` with nonbasic `j` and eliminate `j` from every
    /// other row.
    fn pivot(&mut self, r: usize, j: usize, a_ij: BigRational) {
        let b = self.basic[r];
        let old = std::mem::take(&mut self.rows[r]);

        let mut new_row = Row::new();
        new_row.insert(b, a_ij.recip());
        for (k, c) in old {
            if k != j {
                new_row.insert(k, -(c / &a_ij));
            }
        }

        for rr in 0..self.rows.len() {
            if rr == r {
                continue;
            }
            if let Some(c) = self.rows[rr].remove(&j) {
                for (&k, nk) in &new_row {
                    let entry = self.rows[rr].entry(k).or_insert_with(BigRational::zero);
                    *entry += &c * nk;
                }
                self.rows[rr].retain(|_, v| !v.is_zero());
            }
        }

        self.rows[r] = new_row;
        self.basic[r] = j;
        self.row_of[b] = None;
        self.row_of[j] = Some(r);
    }

    /// Repair bound violations until a feasible point or a conflict.
    /// `Ok(true)` means feasible, `Ok(false)` infeasible.
    fn check(&mut self) -> Result<bool, SolverError> {
        let mut pivots = 0;
        loop {
            let Some((r, target, increase)) = self.find_violation() else {
                return Ok(true);
            };
            let Some(j) = self.find_pivot(r, increase) else {
                return Ok(false);
            };
            if pivots >= self.max_pivots {
                return Err(SolverError::PivotBudget(self.max_pivots));
            }
            pivots += 1;
            trace!("pivot {}: row {} enters {}", pivots, r, j);
            self.pivot_and_update(r, j, target);
        }
    }

    /// First integer variable with a fractional value, if any.
    fn first_fractional(&self, model: &IlpModel) -> Option<(usize, BigRational)> {
        model
            .vars()
            .iter()
            .enumerate()
            .find(|(j, spec)| spec.integer && !self.beta[*j].is_integer())
            .map(|(j, _)| (j, self.beta[j].clone()))
    }

    fn solution(&self, model: &IlpModel) -> Vec<BigInt> {
        (0..model.num_vars())
            .map(|j| {
                debug_assert!(self.beta[j].is_integer());
                self.beta[j].to_integer()
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Tightening {
    Upper(usize, BigRational),
    Lower(usize, BigRational),
}

/// Depth-first branch-and-bound over the rational relaxation.
///
/// Each node re-solves the relaxation under its accumulated bound
/// tightenings; the first integral relaxation answer is returned as the
/// witness. Budgets turn pathological instances into [`SolverError`]s
/// instead of non-termination.
#[derive(Debug, Clone, Copy)]
pub struct BranchBound {
    pub max_pivots: usize,
    pub max_nodes: usize,
}

impl Default for BranchBound {
    fn default() -> Self {
        Self {
            max_pivots: 100_000,
            max_nodes: 10_000,
        }
    }
}

impl IlpSolver for BranchBound {
    fn solve(&mut self, model: &IlpModel) -> Result<SolveOutcome, SolverError> {
        let mut stack: Vec<Vec<Tightening>> = vec![Vec::new()];
        let mut nodes = 0;

        while let Some(path) = stack.pop() {
            if nodes >= self.max_nodes {
                return Err(SolverError::NodeBudget(self.max_nodes));
            }
            nodes += 1;

            let mut lower: Vec<Option<BigRational>> =
                model.vars().iter().map(|v| v.lower.clone()).collect();
            let mut upper: Vec<Option<BigRational>> =
                model.vars().iter().map(|v| v.upper.clone()).collect();
            for t in &path {
                match t {
                    Tightening::Upper(j, b) => {
                        let tighter = match &upper[*j] {
                            Some(u) => b < u,
                            None => true,
                        };
                        if tighter {
                            upper[*j] = Some(b.clone());
                        }
                    }
                    Tightening::Lower(j, b) => {
                        let tighter = match &lower[*j] {
                            Some(l) => b > l,
                            None => true,
                        };
                        if tighter {
                            lower[*j] = Some(b.clone());
                        }
                    }
                }
            }
            let conflicting = (0..model.num_vars()).any(|j| match (&lower[j], &upper[j]) {
                (Some(l), Some(u)) => l > u,
                _ => false,
            });
            if conflicting {
                continue;
            }

            let mut spx = Simplex::new(model, lower, upper, self.max_pivots);
            if !spx.check()? {
                continue;
            }

            match spx.first_fractional(model) {
                None => {
                    debug!("integral solution after {} nodes", nodes);
                    return Ok(SolveOutcome::Feasible(spx.solution(model)));
                }
                Some((j, v)) => {
                    let floor = v.floor();
                    let ceil = &floor + BigRational::one();
                    trace!("branching on x{} = {}", j, v);
                    let mut up = path.clone();
                    up.push(Tightening::Lower(j, ceil));
                    let mut down = path;
                    down.push(Tightening::Upper(j, floor));
                    stack.push(up);
                    stack.push(down);
                }
            }
        }

        Ok(SolveOutcome::Infeasible)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ilp::{rat, LinearExpr, StateEquation};
    use crate::net::{Marking, PetriNet};

    fn solve(model: &IlpModel) -> SolveOutcome {
        BranchBound::default().solve(model).unwrap()
    }

    #[test]
    fn test_feasible_binary() {
        // x + y = 1 over binaries
        let mut model = IlpModel::new();
        let x = model.binary_var("x");
        let y = model.binary_var("y");
        let mut e = LinearExpr::new();
        e.add_term(x, rat(1));
        e.add_term(y, rat(1));
        model.add_constraint(e, CmpOp::Eq, rat(1), "sum");

        match solve(&model) {
            SolveOutcome::Feasible(sol) => {
                assert_eq!(&sol[x] + &sol[y], BigInt::from(1));
            }
            SolveOutcome::Infeasible => panic!("expected feasible"),
        }
    }

    #[test]
    fn test_infeasible_bounds() {
        // x <= 0 and x = 1 over a binary
        let mut model = IlpModel::new();
        let x = model.binary_var("x");
        let mut e = LinearExpr::new();
        e.add_term(x, rat(1));
        model.add_constraint(e.clone(), CmpOp::Le, rat(0), "le");
        model.add_constraint(e, CmpOp::Eq, rat(1), "eq");

        assert_eq!(solve(&model), SolveOutcome::Infeasible);
    }

    #[test]
    fn test_empty_row_infeasible() {
        // 0 <= -1: trivially conflicting
        let mut model = IlpModel::new();
        model.binary_var("x");
        model.add_constraint(LinearExpr::new(), CmpOp::Le, rat(-1), "never");

        assert_eq!(solve(&model), SolveOutcome::Infeasible);
    }

    #[test]
    fn test_branching_cuts_fraction() {
        // 2x = 1 has the relaxation answer x = 1/2 but no integer answer.
        let mut model = IlpModel::new();
        let x = model.binary_var("x");
        let mut e = LinearExpr::new();
        e.add_term(x, rat(2));
        model.add_constraint(e, CmpOp::Eq, rat(1), "half");

        assert_eq!(solve(&model), SolveOutcome::Infeasible);
    }

    #[test]
    fn test_branching_finds_integral_point() {
        // 2x + 2y = 2, x - y <= 0 over binaries: (0,1) is the only answer.
        let mut model = IlpModel::new();
        let x = model.binary_var("x");
        let y = model.binary_var("y");
        let mut e = LinearExpr::new();
        e.add_term(x, rat(2));
        e.add_term(y, rat(2));
        model.add_constraint(e, CmpOp::Eq, rat(2), "sum");
        let mut d = LinearExpr::new();
        d.add_term(x, rat(1));
        d.add_term(y, rat(-1));
        model.add_constraint(d, CmpOp::Le, rat(0), "order");

        match solve(&model) {
            SolveOutcome::Feasible(sol) => {
                assert_eq!(sol[x], BigInt::from(0));
                assert_eq!(sol[y], BigInt::from(1));
            }
            SolveOutcome::Infeasible => panic!("expected feasible"),
        }
    }

    #[test]
    fn test_node_budget() {
        let mut model = IlpModel::new();
        model.binary_var("x");
        let mut solver = BranchBound {
            max_nodes: 0,
            ..Default::default()
        };
        assert_eq!(solver.solve(&model), Err(SolverError::NodeBudget(0)));
    }

    #[test]
    fn test_chain_deadlock_candidate() {
        // p1 -> t1 -> p2: the only deadlock candidate is {p2}.
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.mark_initial(p1).unwrap();

        let se = StateEquation::new(&net);
        match solve(se.model()) {
            SolveOutcome::Feasible(sol) => {
                assert_eq!(se.marking_of(&sol), Marking::from_bits(vec![false, true]));
            }
            SolveOutcome::Infeasible => panic!("expected a candidate"),
        }
    }

    #[test]
    fn test_cycle_has_no_candidate() {
        // Mutual cycle: disabling both transitions contradicts the state
        // equation, so the relaxation alone proves deadlock-freedom.
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.add_transition("t2", [p2], [p1]).unwrap();
        net.mark_initial(p1).unwrap();

        let se = StateEquation::new(&net);
        assert_eq!(solve(se.model()), SolveOutcome::Infeasible);
    }

    #[test]
    fn test_exclusion_cut_removes_candidate() {
        let mut net = PetriNet::new();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        net.add_transition("t1", [p1], [p2]).unwrap();
        net.mark_initial(p1).unwrap();

        let mut se = StateEquation::new(&net);
        se.exclude(&Marking::from_bits(vec![false, true]));
        assert_eq!(solve(se.model()), SolveOutcome::Infeasible);
    }
}
