//! Module containing the surface through which the theory code talks to its
//! host CDCL solver.
//!
//! The host owns the Boolean assignment, the clause store, and the search
//! itself. The theory only observes truth values, introduces fresh literals,
//! and hands clauses back. Two phases are distinguished: at *ground time* the
//! theory talks to a [`ClauseDatabase`], which can still state rules and
//! objective terms, and during *search* it talks to a [`PropagateControl`]
//! inside the [`Propagator`] callbacks.

use std::{
	fmt::{self, Display},
	num::NonZeroI32,
	ops::Not,
};

use crate::Clause;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A Boolean literal of the host solver: a variable or its negation.
pub struct Lit(NonZeroI32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A Boolean variable of the host solver.
pub struct Var(NonZeroI32);

/// Read-only access to the host solver's current Boolean assignment.
pub trait Assignment {
	/// Whether `lit` is assigned true.
	fn is_true(&self, lit: Lit) -> bool;

	/// Whether `lit` is assigned false.
	fn is_false(&self, lit: Lit) -> bool {
		self.is_true(!lit)
	}

	/// Whether `lit` is not (yet) assigned a truth value.
	fn is_unknown(&self, lit: Lit) -> bool {
		!self.is_true(lit) && !self.is_false(lit)
	}
}

/// The ground-time interface of the host: literal creation and rule
/// statement before search starts.
pub trait ClauseDatabase {
	/// A literal the host holds true in every model.
	fn true_lit(&self) -> Lit;

	/// The negation of [`Self::true_lit`].
	fn false_lit(&self) -> Lit {
		!self.true_lit()
	}

	/// Create a fresh, unconstrained literal.
	fn new_lit(&mut self) -> Lit;

	/// Add a clause over existing literals. Returns `false` if the clause
	/// makes the problem trivially unsatisfiable.
	fn add_clause(&mut self, lits: &[Lit]) -> bool;

	/// State that two literals must take the same truth value.
	fn equate(&mut self, a: Lit, b: Lit) -> bool {
		if a == b {
			return true;
		}
		self.add_clause(&[!a, b]) && self.add_clause(&[a, !b]) && a != !b
	}

	/// State that at most one of the given literals may be true.
	fn at_most_one(&mut self, lits: &[Lit]) -> bool {
		for (i, &a) in lits.iter().enumerate() {
			for &b in &lits[i + 1..] {
				if !self.add_clause(&[!a, !b]) {
					return false;
				}
			}
		}
		true
	}

	/// Add a weighted soft literal at the given priority level to the host's
	/// objective.
	fn add_minimize(&mut self, lit: Lit, weight: i64, priority: u32);

	/// Whether the host already knows `lit` to be true. Only facts are
	/// visible at ground time.
	fn is_fact_true(&self, lit: Lit) -> bool {
		lit == self.true_lit()
	}

	/// Whether the host already knows `lit` to be false.
	fn is_fact_false(&self, lit: Lit) -> bool {
		lit == self.false_lit()
	}
}

/// Handle given to [`Propagator::init`] to register watches.
pub trait PropagateInit {
	/// Watch assignments to `lit`: the host will include it in the `changes`
	/// of a later [`Propagator::propagate`] call when it becomes true.
	fn add_watch(&mut self, lit: Lit);
}

/// Handle given to the search-time [`Propagator`] callbacks.
pub trait PropagateControl {
	/// The index of the solver thread this callback runs on.
	fn thread_id(&self) -> usize;

	/// The host's current decision level.
	fn decision_level(&self) -> u32;

	/// The current Boolean assignment.
	fn assignment(&self) -> &dyn Assignment;

	/// Introduce a fresh literal, valid for the remainder of the step.
	fn add_literal(&mut self) -> Lit;

	/// Watch assignments to `lit` from the current decision level onwards.
	fn add_watch(&mut self, lit: Lit);

	/// Hand a clause to the host. Returns `false` when the clause conflicts
	/// with the current assignment; the propagator must then return control
	/// so the host can resolve the conflict.
	fn add_clause(&mut self, lits: &[Lit]) -> bool;

	/// Assign `lit` true under a reason the propagator keeps private; the
	/// host retrieves the reason through [`Propagator::reason`] when it needs
	/// it. Returns `false` when the assignment conflicts.
	fn propagate_lit(&mut self, lit: Lit) -> bool;
}

/// The callbacks a theory propagator provides to the host solver.
///
/// The host calls `init` once after grounding, `propagate` with the span of
/// watched literals that became true since the last call, `undo` once for
/// every decision level it backtracks that a `propagate` call was made on
/// (innermost first), and `check` on every total assignment.
pub trait Propagator {
	/// Register watches and finish per-step setup.
	fn init(&mut self, init: &mut dyn PropagateInit);

	/// Respond to newly true watched literals.
	fn propagate(&mut self, ctl: &mut dyn PropagateControl, changes: &[Lit]);

	/// Undo the state changes of the innermost propagated decision level.
	fn undo(&mut self, ctl: &mut dyn PropagateControl, changes: &[Lit]);

	/// Inspect a total assignment; may add literals or clauses to veto it.
	fn check(&mut self, ctl: &mut dyn PropagateControl);

	/// The reason clause for a literal previously assigned through
	/// [`PropagateControl::propagate_lit`]. The returned clause contains the
	/// propagated literal itself.
	fn reason(&mut self, thread: usize, lit: Lit) -> Clause;
}

impl Lit {
	/// The positive literal of `var`.
	pub fn positive(var: Var) -> Self {
		Self(var.0)
	}

	/// The variable this literal is over.
	pub fn var(self) -> Var {
		Var(NonZeroI32::new(self.0.get().abs()).unwrap())
	}

	/// Whether this is the negation of its variable.
	pub fn is_negated(self) -> bool {
		self.0.get() < 0
	}
}

impl Display for Lit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<Lit> for i32 {
	fn from(lit: Lit) -> Self {
		lit.0.get()
	}
}

impl From<NonZeroI32> for Lit {
	fn from(value: NonZeroI32) -> Self {
		Self(value)
	}
}

impl Not for Lit {
	type Output = Lit;

	fn not(self) -> Self::Output {
		Self(-self.0)
	}
}

impl Var {
	/// The variable with the given positive code.
	pub fn new(code: i32) -> Self {
		debug_assert!(code > 0);
		Self(NonZeroI32::new(code).unwrap())
	}
}

impl From<Var> for i32 {
	fn from(var: Var) -> Self {
		var.0.get()
	}
}

#[cfg(test)]
mod tests {
	use std::num::NonZeroI32;

	use crate::host::Lit;

	#[test]
	fn test_lit_negation() {
		let l = Lit::from(NonZeroI32::new(3).unwrap());
		assert!(!l.is_negated());
		assert!((!l).is_negated());
		assert_eq!(!(!l), l);
		assert_eq!(l.var(), (!l).var());
		assert_eq!(i32::from(!l), -3);
	}
}
