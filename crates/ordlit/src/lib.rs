//! # Ordlit - Order-Literal Theory Propagation for CDCL Solvers
//!
//! Ordlit couples a Boolean CDCL host solver with a finite-domain integer
//! constraint engine. The host keeps full ownership of decisions, unit
//! propagation, conflict analysis, and backtracking over propositional
//! literals; this crate maintains an integer domain per variable, mirrors
//! those domains into the host through *order literals* of the form `v ≤ k`,
//! and enforces reified linear arithmetic constraints `Σ aᵢ·vᵢ ≤ r` by bound
//! propagation, producing reason and conflict clauses the host can learn
//! from.
//!
//! The host is reached exclusively through the callback surface in [`host`]:
//! a [`host::ClauseDatabase`] while the problem is grounded, and the
//! [`host::Propagator`] callbacks (`init`/`propagate`/`check`/`undo`) during
//! search. The crate never blocks, spawns, or schedules; each solver thread
//! owns an independent instance of the search-time state.

pub mod constraint;
pub mod domain;
pub mod driver;
pub(crate) mod helpers;
pub mod host;
pub mod propagator;
pub mod storage;
pub mod theory;
pub mod translate;
pub mod view;

#[cfg(test)]
pub(crate) mod tests;

use std::num::NonZeroI32;

use rangelist::RangeList;
use thiserror::Error;

pub use crate::{
	constraint::{Direction, LinearConstraint, Relation, ReifiedLinearConstraint},
	domain::Domain,
	driver::OrderPropagator,
	host::{Lit, Var},
	theory::{TheoryBuilder, TheoryError},
	view::{Restrictor, Variable, View},
};

/// Type alias for a disjunction of literals (clause), used for internal type
/// documentation.
pub type Clause = Vec<Lit>;

/// Type alias for a set of integers given to the crate as input, e.g. the
/// value set of a `&dom` atom.
pub type IntSetVal = RangeList<i64>;

/// Type alias for the value type of integer variables.
pub type IntVal = i32;

/// Type alias for a non-zero value, e.g. the coefficient of a view.
pub type NonZeroIntVal = NonZeroI32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Process-wide solving configuration, fixed before `init` is called.
pub struct Config {
	/// Unfold reified constraints into clauses when the product of the
	/// domain sizes of all but their last view is at most this value; `-1`
	/// unfolds every constraint.
	pub translate_constraints: i64,
	/// Minimum number of order literals precreated per variable, spread
	/// evenly over the domain; `-1` creates all of them.
	pub min_lits_per_var: i64,
	/// Upper bound on the size of a domain that operations may expand
	/// point-wise; `-1` leaves the expansion unrestricted.
	pub dom_size: i64,
	/// How much work propagation invests per constraint.
	pub prop_strength: PropStrength,
	/// Encode `distinct` with one cardinality constraint per value instead
	/// of pairwise inequalities.
	pub distinct_to_card: bool,
	/// Emit derived clauses to the host instead of keeping private reasons.
	pub learn_clauses: bool,
	/// Emit the binary ordering chain between order literals as clauses and
	/// suppress watches for variables whose domain the precreated literals
	/// fully cover.
	pub explicit_binary_order_clauses: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// The propagation strength levels of the linear propagator.
pub enum PropStrength {
	/// Only check reified constraints for conflicts.
	BoundCheck = 1,
	/// Additionally force reification literals of violated constraints.
	ForceReify = 2,
	/// Additionally narrow variable bounds, with default reason clauses.
	NarrowBounds = 3,
	/// Additionally minimize reason clauses by re-picking the weakest bounds
	/// that still justify each conclusion.
	MinimizeReasons = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("value outside the representable integer window")]
/// Marker error raised when an arithmetic result leaves the safe integer
/// window `[Domain::MIN, Domain::MAX]`.
///
/// The core responds to overflow by emitting a unit conflict clause, turning
/// the step unsatisfiable rather than wrapping around.
pub struct Overflow;

impl Default for Config {
	fn default() -> Self {
		Self {
			translate_constraints: 1000,
			min_lits_per_var: 1000,
			dom_size: 10_000,
			prop_strength: PropStrength::MinimizeReasons,
			distinct_to_card: false,
			learn_clauses: true,
			explicit_binary_order_clauses: true,
		}
	}
}
