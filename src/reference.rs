use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// A handle to a BDD node owned by the manager's node table.
///
/// The sign encodes a complement edge: `-f` denotes the negation of `f`
/// without allocating any node. Two handles are equal iff they denote the
/// same Boolean function (canonicity is maintained by [`Bdd::mk_node`]).
///
/// [`Bdd::mk_node`]: crate::bdd::Bdd::mk_node
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Ref(i32);

impl Ref {
    pub(crate) const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    pub const fn negate(self) -> Self {
        Self(-self.0)
    }

    /// Index of the referenced node in the manager's table.
    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    /// Sign-folded representation, suitable for hashing.
    pub(crate) const fn unsigned(self) -> u32 {
        (self.0.unsigned_abs() << 1) | (self.0 < 0) as u32
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negate()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}",
            if self.is_negated() { "~" } else { "" },
            self.index()
        )
    }
}
