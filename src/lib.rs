//! # petri-hybrid: Hybrid Deadlock Detection for 1-Safe Petri Nets
//!
//! **`petri-hybrid`** combines two complementary analyses of a 1-safe Petri net:
//! **symbolic reachability** over Binary Decision Diagrams (BDDs) and an
//! **ILP relaxation** of the state equation, glued by a counterexample-guided
//! refinement loop.
//!
//! ## How it works
//!
//! The state equation `M = M0 + C·σ` together with per-transition
//! disabledness constraints over-approximates the set of reachable deadlocks:
//! every real deadlock satisfies it, but not every solution is reachable.
//! The refinement loop asks the ILP side for a candidate dead marking, checks
//! it for membership in the BDD-encoded reachable set, and either confirms it
//! as a real deadlock or excludes exactly that marking with a linear cut and
//! asks again. An infeasible relaxation is a proof of deadlock-freedom.
//!
//! ## Key Components
//!
//! - **Manager-Centric BDDs**: All BDD operations go through the
//!   [`Bdd`][crate::bdd::Bdd] manager, with hash consing, complement edges,
//!   and an ITE-based apply. Canonicity makes fixpoint detection a handle
//!   comparison.
//! - **Exact Arithmetic**: The bundled branch-and-bound solver works over
//!   arbitrary-precision rationals, so feasibility answers are never
//!   corrupted by rounding.
//! - **Budgeted Everything**: Fixpoint iterations, BDD nodes, simplex pivots,
//!   branch nodes, and refinement rounds are all bounded; exhaustion yields
//!   an explicit inconclusive verdict, never a wrong answer.
//!
//! ## Basic Usage
//!
//! ```rust
//! use petri_hybrid::deadlock::{find_deadlock, DeadlockVerdict};
//! use petri_hybrid::net::PetriNet;
//!
//! // p1 --t1--> p2, with nothing consuming p2: {p2} is a dead marking.
//! let mut net = PetriNet::new();
//! let p1 = net.add_place("p1").unwrap();
//! let p2 = net.add_place("p2").unwrap();
//! net.add_transition("t1", [p1], [p2]).unwrap();
//! net.mark_initial(p1).unwrap();
//!
//! match find_deadlock(&net).unwrap() {
//!     DeadlockVerdict::DeadlockAt(m) => {
//!         assert!(m.is_marked(p2));
//!         assert!(net.is_deadlock(&m));
//!     }
//!     other => panic!("unexpected verdict: {:?}", other),
//! }
//! ```
//!
//! ## Core Modules
//!
//! - **[`net`]**: The Petri net model and its validating builder.
//! - **[`bdd`]**: The BDD manager and core algorithms.
//! - **[`reach`]**: The symbolic reachability fixpoint and the 1-safety check.
//! - **[`ilp`]** / **[`simplex`]**: The state-equation relaxation and the
//!   exact-rational ILP solver behind it.
//! - **[`deadlock`]**: The refinement loop and its verdicts.
//! - **[`optimize`]**: Maximum-weight reachable marking via the same loop.
//! - **[`explicit`]**: Explicit-state enumeration, the small-net oracle.

pub mod bdd;
pub mod cache;
pub mod deadlock;
pub mod encode;
pub mod explicit;
pub mod ilp;
pub mod net;
pub mod optimize;
pub mod reach;
pub mod reference;
pub mod relation;
pub mod simplex;
pub mod table;
pub mod utils;
