//! Symbolic encoding of the firing rule.
//!
//! Each transition contributes one conjunct over current and next frame
//! variables; the global transition relation is their disjunction, so one
//! image step explores every enabled transition at once.

use log::debug;

use crate::bdd::Bdd;
use crate::encode::VarEncoding;
use crate::net::{PetriNet, TransitionId};
use crate::reference::Ref;

/// The relation for a single transition:
/// enabledness over the pre-set, the token moves, and frame conditions
/// for every place the transition does not touch.
pub fn single_transition_relation(
    bdd: &Bdd,
    net: &PetriNet,
    enc: &VarEncoding,
    t: TransitionId,
) -> Ref {
    let tr = net.transition(t);

    let mut literals: Vec<i32> = Vec::new();

    // Enabled: every pre-place holds a token now.
    for &p in tr.pre() {
        literals.push(enc.current(p) as i32);
    }
    // Post-places gain a token (self-loops stay marked).
    for &p in tr.post() {
        literals.push(enc.next(p) as i32);
    }
    // Pre-places outside the post-set lose theirs.
    for &p in tr.pre() {
        if !tr.post().contains(&p) {
            literals.push(-(enc.next(p) as i32));
        }
    }

    let mut rel = bdd.cube(literals);

    // Untouched places keep their value.
    for p in net.places() {
        if tr.pre().contains(&p) || tr.post().contains(&p) {
            continue;
        }
        let same = bdd.apply_eq(bdd.mk_var(enc.current(p)), bdd.mk_var(enc.next(p)));
        rel = bdd.apply_and(rel, same);
    }

    rel
}

/// The set of markings in which `t` is enabled, over current-frame variables.
pub fn enabled_set(bdd: &Bdd, net: &PetriNet, enc: &VarEncoding, t: TransitionId) -> Ref {
    let literals = net
        .transition(t)
        .pre()
        .iter()
        .map(|&p| enc.current(p) as i32);
    bdd.cube(literals)
}

/// The global transition relation: the union over all transitions.
pub fn transition_relation(bdd: &Bdd, net: &PetriNet, enc: &VarEncoding) -> Ref {
    let mut rel = bdd.zero;
    for t in net.transitions() {
        let single = single_transition_relation(bdd, net, enc, t);
        rel = bdd.apply_or(rel, single);
        debug!(
            "relation after '{}': {} nodes",
            net.transition(t).name(),
            bdd.size(rel)
        );
    }
    rel
}
