//! 1-safe Petri net model: places, transitions, markings.
//!
//! This is the "net input" boundary of the crate: an external parser or
//! constructor produces a [`PetriNet`] through the builder API, which
//! validates the structure fail-fast (before any BDD or ILP work starts).
//! Arcs are unweighted and every place holds 0 or 1 tokens.

use std::fmt;

use thiserror::Error;

/// Index of a place within its net.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PlaceId(pub usize);

/// Index of a transition within its net.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub usize);

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p#{}", self.0)
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t#{}", self.0)
    }
}

/// Structural modeling errors ("invalid net model" kind).
///
/// All of these are detected before, or during, analysis and abort it;
/// none of them is ever silently tolerated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("duplicate place name '{0}'")]
    DuplicatePlace(String),

    #[error("duplicate transition name '{0}'")]
    DuplicateTransition(String),

    #[error("transition '{transition}' refers to unknown place {place}")]
    UnknownPlace {
        transition: String,
        place: PlaceId,
    },

    #[error("place '{place}' appears twice in the {side}-set of transition '{transition}'")]
    DuplicateArc {
        transition: String,
        place: String,
        side: &'static str,
    },

    #[error("initial marking refers to unknown place {0}")]
    UnknownInitialPlace(PlaceId),

    #[error("the net has no places")]
    NoPlaces,

    #[error("the net has no transitions")]
    NoTransitions,

    #[error("net is not 1-safe: firing '{transition}' can put a second token on '{place}'")]
    NotOneSafe { transition: String, place: String },
}

/// A transition with its pre-set and post-set.
#[derive(Debug, Clone)]
pub struct Transition {
    name: String,
    pre: Vec<PlaceId>,
    post: Vec<PlaceId>,
}

impl Transition {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn pre(&self) -> &[PlaceId] {
        &self.pre
    }
    pub fn post(&self) -> &[PlaceId] {
        &self.post
    }
}

/// A marking: one bit per place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marking(Vec<bool>);

impl Marking {
    /// The empty marking over `num_places` places.
    pub fn empty(num_places: usize) -> Self {
        Marking(vec![false; num_places])
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Marking(bits)
    }

    pub fn num_places(&self) -> usize {
        self.0.len()
    }

    pub fn is_marked(&self, p: PlaceId) -> bool {
        self.0[p.0]
    }

    pub fn set(&mut self, p: PlaceId, marked: bool) {
        self.0[p.0] = marked;
    }

    /// Places currently holding a token.
    pub fn marked_places(&self) -> impl Iterator<Item = PlaceId> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(i, _)| PlaceId(i))
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            write!(f, "{}", if b { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// A 1-safe Petri net with an initial marking.
#[derive(Debug, Clone, Default)]
pub struct PetriNet {
    places: Vec<String>,
    transitions: Vec<Transition>,
    initial: Vec<bool>,
}

impl PetriNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a place. Names must be unique.
    pub fn add_place(&mut self, name: impl Into<String>) -> Result<PlaceId, NetError> {
        let name = name.into();
        if self.places.iter().any(|p| p == &name) {
            return Err(NetError::DuplicatePlace(name));
        }
        self.places.push(name);
        self.initial.push(false);
        Ok(PlaceId(self.places.len() - 1))
    }

    /// Add a transition with the given pre-set and post-set.
    ///
    /// A place may appear at most once per side (1-safe arcs are unweighted);
    /// a place in both sides is a self-loop and is allowed.
    pub fn add_transition(
        &mut self,
        name: impl Into<String>,
        pre: impl IntoIterator<Item = PlaceId>,
        post: impl IntoIterator<Item = PlaceId>,
    ) -> Result<TransitionId, NetError> {
        let name = name.into();
        if self.transitions.iter().any(|t| t.name == name) {
            return Err(NetError::DuplicateTransition(name));
        }

        let check = |side: &'static str, ps: &[PlaceId]| -> Result<(), NetError> {
            for (i, &p) in ps.iter().enumerate() {
                if p.0 >= self.places.len() {
                    return Err(NetError::UnknownPlace {
                        transition: name.clone(),
                        place: p,
                    });
                }
                if ps[..i].contains(&p) {
                    return Err(NetError::DuplicateArc {
                        transition: name.clone(),
                        place: self.places[p.0].clone(),
                        side,
                    });
                }
            }
            Ok(())
        };

        let pre: Vec<PlaceId> = pre.into_iter().collect();
        let post: Vec<PlaceId> = post.into_iter().collect();
        check("pre", &pre)?;
        check("post", &post)?;

        self.transitions.push(Transition { name, pre, post });
        Ok(TransitionId(self.transitions.len() - 1))
    }

    /// Put a token on `p` in the initial marking.
    pub fn mark_initial(&mut self, p: PlaceId) -> Result<(), NetError> {
        if p.0 >= self.places.len() {
            return Err(NetError::UnknownInitialPlace(p));
        }
        self.initial[p.0] = true;
        Ok(())
    }

    /// Structural sanity checks that only make sense on the finished net.
    pub fn validate(&self) -> Result<(), NetError> {
        if self.places.is_empty() {
            return Err(NetError::NoPlaces);
        }
        if self.transitions.is_empty() {
            return Err(NetError::NoTransitions);
        }
        Ok(())
    }

    pub fn num_places(&self) -> usize {
        self.places.len()
    }

    pub fn num_transitions(&self) -> usize {
        self.transitions.len()
    }

    pub fn place_name(&self, p: PlaceId) -> &str {
        &self.places[p.0]
    }

    pub fn places(&self) -> impl Iterator<Item = PlaceId> {
        (0..self.places.len()).map(PlaceId)
    }

    pub fn transitions(&self) -> impl Iterator<Item = TransitionId> {
        (0..self.transitions.len()).map(TransitionId)
    }

    pub fn transition(&self, t: TransitionId) -> &Transition {
        &self.transitions[t.0]
    }

    pub fn initial_marking(&self) -> Marking {
        Marking(self.initial.clone())
    }

    /// A transition is enabled iff all its pre-places hold a token.
    pub fn is_enabled(&self, t: TransitionId, m: &Marking) -> bool {
        self.transitions[t.0].pre.iter().all(|&p| m.is_marked(p))
    }

    /// Fire `t` in `m`. The caller must have checked enabledness.
    pub fn fire(&self, t: TransitionId, m: &Marking) -> Marking {
        debug_assert!(self.is_enabled(t, m));
        let t = &self.transitions[t.0];
        let mut next = m.clone();
        for &p in &t.pre {
            next.set(p, false);
        }
        for &p in &t.post {
            next.set(p, true);
        }
        next
    }

    pub fn enabled_transitions(&self, m: &Marking) -> Vec<TransitionId> {
        self.transitions()
            .filter(|&t| self.is_enabled(t, m))
            .collect()
    }

    /// A marking is a deadlock iff no transition is enabled in it.
    pub fn is_deadlock(&self, m: &Marking) -> bool {
        self.transitions().all(|t| !self.is_enabled(t, m))
    }

    /// The incidence matrix `C[p][t] = post(t,p) - pre(t,p)`, entries in
    /// `{-1, 0, +1}` for unweighted arcs (self-loops cancel to 0).
    pub fn incidence(&self) -> Vec<Vec<i64>> {
        let mut c = vec![vec![0i64; self.transitions.len()]; self.places.len()];
        for (j, t) in self.transitions.iter().enumerate() {
            for &p in &t.pre {
                c[p.0][j] -= 1;
            }
            for &p in &t.post {
                c[p.0][j] += 1;
            }
        }
        c
    }

    /// Render a marking with place names, e.g. `{p1, p3}`.
    pub fn format_marking(&self, m: &Marking) -> String {
        let names: Vec<&str> = m.marked_places().map(|p| self.place_name(p)).collect();
        format!("{{{}}}", names.join(", "))
    }
}
