//! Module containing the bound-consistency propagator for reified linear
//! constraints and the queueing index that drives it.

use index_vec::IndexVec;
use tracing::trace;

use crate::{
	constraint::{Relation, ReifiedLinearConstraint},
	host::{Assignment, Lit},
	storage::{VariableCreator, VariableStorage},
	view::{Variable, View},
	Config, PropStrength,
};

#[derive(Debug, Default)]
/// Index from variable bound changes to the constraints that must be
/// re-examined, together with the LIFO queue of constraints awaiting
/// propagation.
pub struct ConstraintStorage {
	/// All posted constraints, in `≤` normal form with a forward reification.
	constraints: IndexVec<ConstraintRef, ReifiedLinearConstraint>,
	/// Whether a constraint is currently enqueued.
	queued: IndexVec<ConstraintRef, bool>,
	/// The queue itself, newest first.
	to_process: Vec<ConstraintRef>,
	/// Constraints whose sum depends on the lower bound of a variable.
	lb_changes: IndexVec<Variable, Vec<ConstraintRef>>,
	/// Constraints whose sum depends on the upper bound of a variable.
	ub_changes: IndexVec<Variable, Vec<ConstraintRef>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A clause derived by the propagator, in snapshot form.
///
/// `lit` is the negated reification literal. Every `(view, pos)` entry
/// contributes the literal `¬(view ≥ value-at(pos))`; for the tightened view
/// the position points right after the new upper end, which makes that entry
/// the asserting bound literal. The clause for a conflict has the same shape
/// and no true literal.
pub struct DerivedClause {
	/// The negation of the constraint's reification literal.
	pub lit: Lit,
	/// The bound witnesses, one per view of the constraint.
	pub bounds: Vec<(View, u64)>,
}

/// Bound-consistency propagation over reified linear constraints.
///
/// The propagator owns the search-time variable store and the constraint
/// queue. It never talks to the host itself: derived clauses are returned in
/// snapshot form and materialized into host literals by the driver.
#[derive(Debug)]
pub struct LinearPropagator {
	/// The solving configuration.
	config: Config,
	/// The queueing index.
	storage: ConstraintStorage,
	/// The trailed variable store.
	vs: VariableStorage,
	/// Clauses produced by the last single step.
	clauses: Vec<DerivedClause>,
}

impl ConstraintStorage {
	/// Create an index for `num_vars` variables.
	fn new(num_vars: usize) -> Self {
		Self {
			constraints: IndexVec::new(),
			queued: IndexVec::new(),
			to_process: Vec::new(),
			lb_changes: (0..num_vars).map(|_| Vec::new()).collect(),
			ub_changes: (0..num_vars).map(|_| Vec::new()).collect(),
		}
	}

	/// Add a normalized implication `lit → con` and enqueue it.
	fn add(&mut self, con: ReifiedLinearConstraint) -> ConstraintRef {
		debug_assert_eq!(con.con.relation(), Relation::Le);
		let id = self.constraints.push(con);
		let r = self.queued.push(false);
		debug_assert_eq!(id, r);
		for v in self.constraints[id].con.views() {
			// A forward view contributes its variable's lower bound to the
			// minimal sum, a reversed one its upper bound.
			if v.reversed() {
				self.ub_changes[v.var].push(id);
			} else {
				self.lb_changes[v.var].push(id);
			}
		}
		self.queue(id);
		id
	}

	/// The constraint stored under `id`.
	pub fn constraint(&self, id: ConstraintRef) -> &ReifiedLinearConstraint {
		&self.constraints[id]
	}

	/// The number of stored constraints.
	pub fn len(&self) -> usize {
		self.constraints.len()
	}

	/// Whether no constraint is stored.
	pub fn is_empty(&self) -> bool {
		self.constraints.is_empty()
	}

	/// Enqueue the constraint `id` unless it already is.
	pub fn queue(&mut self, id: ConstraintRef) {
		if !self.queued[id] {
			self.to_process.push(id);
			self.queued[id] = true;
		}
	}

	/// Pop the most recently enqueued constraint.
	fn pop(&mut self) -> ConstraintRef {
		let id = self.to_process.pop().unwrap();
		self.queued[id] = false;
		id
	}

	/// Whether the queue is empty.
	pub fn at_fixpoint(&self) -> bool {
		self.to_process.is_empty()
	}

	/// Drop all queued work, e.g. when a level is undone.
	fn clear_queue(&mut self) {
		for id in self.to_process.drain(..) {
			self.queued[id] = false;
		}
	}

	/// Requeue the constraints affected by a tightened lower bound of `var`,
	/// skipping those whose reification is already false.
	fn notify_lower_tightened(&mut self, var: Variable, asg: &dyn Assignment) {
		for i in 0..self.lb_changes[var].len() {
			let id = self.lb_changes[var][i];
			if !asg.is_false(self.constraints[id].lit) {
				self.queue(id);
			}
		}
	}

	/// Requeue the constraints affected by a tightened upper bound of `var`,
	/// skipping those whose reification is already false.
	fn notify_upper_tightened(&mut self, var: Variable, asg: &dyn Assignment) {
		for i in 0..self.ub_changes[var].len() {
			let id = self.ub_changes[var][i];
			if !asg.is_false(self.constraints[id].lit) {
				self.queue(id);
			}
		}
	}
}

impl LinearPropagator {
	/// Create a propagator over the variables of a grounded creator.
	pub fn new(vc: &VariableCreator, config: Config) -> Self {
		Self {
			config,
			storage: ConstraintStorage::new(vc.num_variables()),
			vs: VariableStorage::new(vc),
			clauses: Vec::new(),
		}
	}

	/// Post a batch of normalized implications.
	pub fn add_constraints(
		&mut self,
		constraints: impl IntoIterator<Item = ReifiedLinearConstraint>,
	) -> Vec<ConstraintRef> {
		constraints
			.into_iter()
			.map(|c| self.storage.add(c))
			.collect()
	}

	/// The queueing index.
	pub fn constraints(&self) -> &ConstraintStorage {
		&self.storage
	}

	/// Enqueue the constraint `id` for propagation.
	pub fn queue(&mut self, id: ConstraintRef) {
		self.storage.queue(id);
	}

	/// The trailed variable store.
	pub fn vars(&self) -> &VariableStorage {
		&self.vs
	}

	/// Mutable access to the trailed variable store.
	pub fn vars_mut(&mut self) -> &mut VariableStorage {
		&mut self.vs
	}

	/// Open a new trail level.
	pub fn add_level(&mut self) {
		self.vs.add_level();
	}

	/// Undo the innermost trail level and drop pending queue entries.
	pub fn remove_level(&mut self) {
		self.vs.remove_level();
		self.storage.clear_queue();
	}

	/// Whether no constraint awaits propagation.
	pub fn at_fixpoint(&self) -> bool {
		self.storage.at_fixpoint()
	}

	/// Tighten the upper end of `view`'s current restrictor to the positions
	/// before `end`, requeueing affected constraints. Returns `false` when
	/// the domain would become empty.
	pub fn constrain_upper(&mut self, view: View, end: u64, asg: &dyn Assignment) -> bool {
		let ok = self.vs.constrain_upper(view, end);
		if view.reversed() {
			self.storage.notify_lower_tightened(view.var, asg);
		} else {
			self.storage.notify_upper_tightened(view.var, asg);
		}
		ok
	}

	/// Tighten the lower end of `view`'s current restrictor to the positions
	/// at or after `begin`, requeueing affected constraints. Returns `false`
	/// when the domain would become empty.
	pub fn constrain_lower(&mut self, view: View, begin: u64, asg: &dyn Assignment) -> bool {
		let ok = self.vs.constrain_lower(view, begin);
		if view.reversed() {
			self.storage.notify_upper_tightened(view.var, asg);
		} else {
			self.storage.notify_lower_tightened(view.var, asg);
		}
		ok
	}

	/// Pop queued constraints until one produces clauses or the queue runs
	/// dry, and return the derived clauses.
	///
	/// Bounds are applied to the variable store as part of this call; the
	/// returned clauses communicate the derivations (and any conflict) to
	/// the host.
	pub fn propagate_single_step(&mut self, asg: &dyn Assignment) -> &[DerivedClause] {
		self.clauses.clear();
		while !self.storage.at_fixpoint() && self.clauses.is_empty() {
			let id = self.storage.pop();
			let con = self.storage.constraints[id].clone();
			if asg.is_true(con.lit) {
				self.propagate_true(&con, asg);
			} else if self.config.prop_strength >= PropStrength::ForceReify
				&& asg.is_unknown(con.lit)
			{
				self.propagate_unknown(&con);
			}
		}
		&self.clauses
	}

	/// Propagation under a true reification: tighten the upper bound of each
	/// view so the minimal contributions of the others still fit under the
	/// right hand side.
	fn propagate_true(&mut self, con: &ReifiedLinearConstraint, asg: &dyn Assignment) {
		let views = con.con.views();
		let rhs = con.con.rhs();

		// Snapshot of the bound positions justifying this propagation; the
		// reasons must name the restrictors as they are now, not after the
		// tightenings below.
		let lows: Vec<(View, u64)> = views.iter().map(|&v| (v, self.vs.current(v).begin())).collect();
		let mut min: i64 = 0;
		let mut max: i64 = 0;
		for &v in views {
			let r = self.vs.current(v);
			min += r.lower();
			max += r.upper();
		}
		if max <= rhs {
			return;
		}

		if self.config.prop_strength <= PropStrength::ForceReify {
			if min > rhs {
				self.clauses.push(DerivedClause {
					lit: !con.lit,
					bounds: lows,
				});
			}
			return;
		}

		for index in 0..views.len() {
			let v = views[index];
			let (r_lower, r_upper, r_end) = {
				let r = self.vs.current(v);
				(r.lower(), r.upper(), r.end())
			};
			let whole_lower = self.vs.restrictor(v).lower();
			let slack_min = min - r_lower;
			let up = rhs - slack_min;

			let mut prop = false;
			let mut conflict = false;
			let mut witness = 0;

			if up < whole_lower {
				conflict = true;
			} else if up < r_upper {
				let new_end = self.vs.current(v).count_le(up);
				debug_assert!(new_end > 0 && new_end < r_end);
				witness = new_end;
				prop = true;
				trace!(
					var = usize::from(v.var),
					bound = up,
					"tighten upper bound"
				);
				conflict = !self.constrain_upper(v, new_end, asg);
				max = (max - r_upper) + self.vs.restrictor(v).value_at(new_end - 1);
			}

			if prop || conflict {
				let mut bounds = lows.clone();
				bounds[index] = (v, witness);
				self.clauses.push(DerivedClause {
					lit: !con.lit,
					bounds,
				});
			}
			if conflict {
				break;
			}
		}
	}

	/// Entailment check under an unknown reification: when even the minimal
	/// sum exceeds the right hand side, the reification is forced false.
	fn propagate_unknown(&mut self, con: &ReifiedLinearConstraint) {
		debug_assert!(self.config.prop_strength >= PropStrength::ForceReify);
		let views = con.con.views();
		let rhs = con.con.rhs();

		let mut bounds: Vec<(View, u64)> =
			views.iter().map(|&v| (v, self.vs.current(v).begin())).collect();
		let mut min: i64 = views.iter().map(|&v| self.vs.current(v).lower()).sum();
		if min <= rhs {
			return;
		}

		if self.config.prop_strength >= PropStrength::MinimizeReasons {
			// Re-pick, per view, the weakest lower bound that still keeps the
			// sum above the right hand side.
			let mut index = 0;
			while index < views.len()
				&& min - i64::from(views[index].scale.get()).abs() > rhs
			{
				let v = views[index];
				let r_lower = self.vs.current(v).lower();
				let slack_min = min - r_lower;
				let up = rhs - slack_min;
				let whole = self.vs.restrictor(v);
				if up < whole.lower() {
					bounds[index] = (v, 0);
					min = slack_min + whole.lower();
				} else {
					let pos = whole.count_le(up);
					bounds[index] = (v, pos);
					min = slack_min + whole.value_at(pos);
				}
				index += 1;
			}
		}
		self.clauses.push(DerivedClause {
			lit: !con.lit,
			bounds,
		});
	}
}

index_vec::define_index_type! {
	/// Identifies a reified linear constraint in the [`ConstraintStorage`].
	pub struct ConstraintRef = u32;
}
