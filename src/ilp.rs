//! ILP modeling layer: linear expressions, constraints, and the
//! state-equation encoding of the deadlock question.
//!
//! All arithmetic is exact over [`BigRational`], so feasibility answers are
//! never corrupted by floating-point noise.

use std::collections::HashMap;
use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;
use thiserror::Error;

use crate::net::{Marking, PetriNet, PlaceId};

pub(crate) fn rat(n: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(n))
}

/// A linear expression `Σ c_i · x_i` over model variables.
#[derive(Debug, Clone, Default)]
pub struct LinearExpr {
    coeffs: HashMap<usize, BigRational>,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `c · x_var`, accumulating with any existing coefficient.
    pub fn add_term(&mut self, var: usize, c: impl Into<BigRational>) {
        let c = c.into();
        let entry = self.coeffs.entry(var).or_insert_with(BigRational::zero);
        *entry += c;
        if entry.is_zero() {
            self.coeffs.remove(&var);
        }
    }

    pub fn coeff(&self, var: usize) -> BigRational {
        self.coeffs.get(&var).cloned().unwrap_or_else(BigRational::zero)
    }

    pub fn terms(&self) -> impl Iterator<Item = (usize, &BigRational)> {
        self.coeffs.iter().map(|(&v, c)| (v, c))
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CmpOp {
    /// `expr = rhs`
    Eq,
    /// `expr <= rhs`
    Le,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub expr: LinearExpr,
    pub op: CmpOp,
    pub rhs: BigRational,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct VarSpec {
    pub name: String,
    pub lower: Option<BigRational>,
    pub upper: Option<BigRational>,
    pub integer: bool,
}

/// A mixed model: integer and binary variables under linear constraints.
///
/// There is no objective; the solver answers feasibility only. Optimization
/// is layered on top through repeated feasibility queries.
#[derive(Debug, Clone, Default)]
pub struct IlpModel {
    vars: Vec<VarSpec>,
    constraints: Vec<Constraint>,
}

impl IlpModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A 0/1 variable.
    pub fn binary_var(&mut self, name: impl Into<String>) -> usize {
        self.vars.push(VarSpec {
            name: name.into(),
            lower: Some(rat(0)),
            upper: Some(rat(1)),
            integer: true,
        });
        self.vars.len() - 1
    }

    /// A non-negative integer variable, optionally bounded above.
    pub fn integer_var(&mut self, name: impl Into<String>, upper: Option<i64>) -> usize {
        self.vars.push(VarSpec {
            name: name.into(),
            lower: Some(rat(0)),
            upper: upper.map(rat),
            integer: true,
        });
        self.vars.len() - 1
    }

    pub fn add_constraint(
        &mut self,
        expr: LinearExpr,
        op: CmpOp,
        rhs: BigRational,
        label: impl Into<String>,
    ) {
        self.constraints.push(Constraint {
            expr,
            op,
            rhs,
            label: label.into(),
        });
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn vars(&self) -> &[VarSpec] {
        &self.vars
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }
}

/// Outcome of a feasibility query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    /// A satisfying integer assignment, indexed by variable.
    Feasible(Vec<BigInt>),
    Infeasible,
}

/// Solver-side failures: budget exhaustion, never a wrong answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("simplex pivot budget exceeded ({0} pivots)")]
    PivotBudget(usize),

    #[error("branch-and-bound node budget exceeded ({0} nodes)")]
    NodeBudget(usize),
}

/// The feasibility oracle the refinement loop talks to.
pub trait IlpSolver {
    fn solve(&mut self, model: &IlpModel) -> Result<SolveOutcome, SolverError>;
}

/// The state-equation relaxation of "some deadlock marking is reachable".
///
/// Variables: one binary `x_p` per place (the candidate marking) and one
/// counting variable `σ_t` per transition (how often it fired). Constraints:
///
///   * state equation: `x_p = M0(p) + Σ_t C[p][t] · σ_t` for every place,
///   * deadlock: every transition is disabled, i.e. its pre-set is not
///     fully marked.
///
/// Every marking satisfying the true reachability question satisfies this
/// model; the converse fails, which is what the refinement loop repairs
/// through [`StateEquation::exclude`] cuts.
pub struct StateEquation {
    model: IlpModel,
    num_places: usize,
    num_cuts: usize,
}

impl StateEquation {
    /// State equation plus the deadlock predicate, for deadlock detection.
    pub fn new(net: &PetriNet) -> Self {
        Self::build(net, true)
    }

    /// State equation alone: candidates range over all markings satisfying
    /// `M = M0 + C·σ`, an over-approximation of the reachable markings.
    /// Used by the optimization loop.
    pub fn reachability_only(net: &PetriNet) -> Self {
        Self::build(net, false)
    }

    fn build(net: &PetriNet, with_deadlock_predicate: bool) -> Self {
        let mut model = IlpModel::new();

        for p in net.places() {
            model.binary_var(format!("x_{}", net.place_name(p)));
        }
        let sigma0 = model.num_vars();
        for t in net.transitions() {
            model.integer_var(format!("s_{}", net.transition(t).name()), None);
        }

        let m0 = net.initial_marking();
        let c = net.incidence();

        // x_p - Σ_t C[p][t]·σ_t = M0(p)
        for p in net.places() {
            let mut expr = LinearExpr::new();
            expr.add_term(p.0, rat(1));
            for (j, &cpt) in c[p.0].iter().enumerate() {
                if cpt != 0 {
                    expr.add_term(sigma0 + j, rat(-cpt));
                }
            }
            let rhs = rat(if m0.is_marked(p) { 1 } else { 0 });
            model.add_constraint(expr, CmpOp::Eq, rhs, format!("state_{}", net.place_name(p)));
        }

        // Σ_{p ∈ pre(t)} x_p <= |pre(t)| - 1: t is disabled.
        // An empty pre-set yields 0 <= -1, which is unsatisfiable: such a
        // transition is enabled everywhere, so no deadlock exists at all.
        if with_deadlock_predicate {
            for t in net.transitions() {
                let tr = net.transition(t);
                let mut expr = LinearExpr::new();
                for &p in tr.pre() {
                    expr.add_term(p.0, rat(1));
                }
                let rhs = rat(tr.pre().len() as i64 - 1);
                model.add_constraint(expr, CmpOp::Le, rhs, format!("disabled_{}", tr.name()));
            }
        }

        Self {
            model,
            num_places: net.num_places(),
            num_cuts: 0,
        }
    }

    pub fn model(&self) -> &IlpModel {
        &self.model
    }

    pub fn num_cuts(&self) -> usize {
        self.num_cuts
    }

    /// Cut a single spurious marking out of the feasible region:
    /// `Σ_{M(p)=1} x_p - Σ_{M(p)=0} x_p <= |M| - 1`.
    ///
    /// Over binary variables this is violated exactly by `M` itself.
    pub fn exclude(&mut self, m: &Marking) {
        assert_eq!(m.num_places(), self.num_places);
        let mut expr = LinearExpr::new();
        let mut ones = 0i64;
        for p in 0..self.num_places {
            if m.is_marked(PlaceId(p)) {
                expr.add_term(p, rat(1));
                ones += 1;
            } else {
                expr.add_term(p, rat(-1));
            }
        }
        self.num_cuts += 1;
        self.model.add_constraint(
            expr,
            CmpOp::Le,
            rat(ones - 1),
            format!("cut_{}", self.num_cuts),
        );
    }

    /// Require `Σ_p w_p · x_p >= bound`, for iterative maximization.
    pub fn require_weight_at_least(&mut self, weights: &[i64], bound: &BigInt) {
        assert_eq!(weights.len(), self.num_places);
        let mut expr = LinearExpr::new();
        for (p, &w) in weights.iter().enumerate() {
            if w != 0 {
                expr.add_term(p, rat(-w));
            }
        }
        let rhs = BigRational::from_integer(-bound.clone());
        self.model
            .add_constraint(expr, CmpOp::Le, rhs, format!("weight_ge_{}", bound));
    }

    /// Read the candidate marking off a solver assignment.
    pub fn marking_of(&self, solution: &[BigInt]) -> Marking {
        let bits = solution[..self.num_places]
            .iter()
            .map(|x| !x.is_zero())
            .collect();
        Marking::from_bits(bits)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms: Vec<(usize, &BigRational)> = self.expr.terms().collect();
        terms.sort_by_key(|&(v, _)| v);
        for (i, (v, c)) in terms.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}·x{}", c, v)?;
        }
        if terms.is_empty() {
            write!(f, "0")?;
        }
        let op = match self.op {
            CmpOp::Eq => "=",
            CmpOp::Le => "<=",
        };
        write!(f, " {} {}  [{}]", op, self.rhs, self.label)
    }
}

#[cfg(test)]
mod tests {
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

    #[test]
    fn test_linear_expr_accumulates() {
        let mut e = LinearExpr::new();
        e.add_term(0, rat(2));
        e.add_term(0, rat(3));
        assert_eq!(e.coeff(0), rat(5));

        e.add_term(0, rat(-5));
        assert!(e.is_empty());
    }

    #[test]
    fn test_state_equation_shape() {
        let net = chain();
        let se = StateEquation::new(&net);
        let model = se.model();

        // 2 place vars + 1 firing-count var
        assert_eq!(model.num_vars(), 3);
        // 2 state equations + 1 disabled constraint
        assert_eq!(model.constraints().len(), 3);

        // x_p1 - (-1)·σ = 1  <=>  x_p1 + σ = 1
        let state_p1 = &model.constraints()[0];
        assert_eq!(state_p1.op, CmpOp::Eq);
        assert_eq!(state_p1.expr.coeff(0), rat(1));
        assert_eq!(state_p1.expr.coeff(2), rat(1));
        assert_eq!(state_p1.rhs, rat(1));

        // disabled t1: x_p1 <= 0
        let disabled = &model.constraints()[2];
        assert_eq!(disabled.op, CmpOp::Le);
        assert_eq!(disabled.expr.coeff(0), rat(1));
        assert_eq!(disabled.rhs, rat(0));
    }

    #[test]
    fn test_reachability_only_drops_disabledness() {
        let net = chain();
        let se = StateEquation::reachability_only(&net);
        // Only the two state equations remain.
        assert_eq!(se.model().constraints().len(), 2);
        assert!(se
            .model()
            .constraints()
            .iter()
            .all(|c| c.op == CmpOp::Eq));
    }

    #[test]
    fn test_empty_preset_is_infeasible_marker() {
        let mut net = PetriNet::new();
        let p = net.add_place("p").unwrap();
        net.add_transition("spawn", [], [p]).unwrap();

        let se = StateEquation::new(&net);
        let disabled = se
            .model()
            .constraints()
            .iter()
            .find(|c| c.label == "disabled_spawn")
            .unwrap();
        assert!(disabled.expr.is_empty());
        assert_eq!(disabled.rhs, rat(-1));
    }

    #[test]
    fn test_exclusion_cut() {
        let net = chain();
        let mut se = StateEquation::new(&net);

        let m = Marking::from_bits(vec![false, true]);
        se.exclude(&m);
        assert_eq!(se.num_cuts(), 1);

        let cut = se.model().constraints().last().unwrap();
        assert_eq!(cut.op, CmpOp::Le);
        assert_eq!(cut.expr.coeff(0), rat(-1));
        assert_eq!(cut.expr.coeff(1), rat(1));
        assert_eq!(cut.rhs, rat(0));
    }

    #[test]
    fn test_marking_of() {
        let net = chain();
        let se = StateEquation::new(&net);
        let sol = vec![BigInt::from(0), BigInt::from(1), BigInt::from(1)];
        assert_eq!(se.marking_of(&sol), Marking::from_bits(vec![false, true]));
    }
}
