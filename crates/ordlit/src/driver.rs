//! Module containing the theory-solver driver: the [`Propagator`]
//! implementation that connects the variable store and the linear propagator
//! to the host CDCL solver through watches, `propagate`, `check`, and `undo`.

use std::collections::{BTreeMap, HashMap};

use index_vec::IndexVec;
use tracing::{debug, trace};

use crate::{
	constraint::ReifiedLinearConstraint,
	host::{Lit, PropagateControl, PropagateInit, Propagator, Var},
	propagator::{ConstraintRef, LinearPropagator},
	storage::VariableCreator,
	view::{Variable, View},
	Clause, Config, IntVal,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
/// Per-thread counters of the theory propagation work performed.
pub struct Statistics {
	/// Number of clauses handed to the host.
	num_clauses: u64,
	/// Number of literals introduced during search.
	num_lits: u64,
	/// Number of watched literals processed.
	propagations: u64,
}

/// The theory propagator coupling integer bound reasoning to the host
/// solver.
///
/// The grounded inputs (base domains, literal maps, normalized constraints,
/// configuration) are immutable and shared by every solver thread; each
/// thread lazily receives its own trailed state the first time the host
/// calls into it.
#[derive(Debug)]
pub struct OrderPropagator {
	/// The solving configuration.
	config: Config,
	/// The grounded variable store.
	vc: VariableCreator,
	/// The normalized forward implications to propagate.
	constraints: Vec<ReifiedLinearConstraint>,
	/// The shown variables, by name.
	shown: Vec<(String, View)>,
	/// Whether grounding already derived an inconsistency.
	failed: bool,
	/// Which variables have their order literals watched.
	watched: IndexVec<Variable, bool>,
	/// Whether monotonicity of a variable's order literals must be enforced
	/// by runtime forcing rather than by explicit binary clauses.
	chain: IndexVec<Variable, bool>,
	/// Host variable to the order conditions it carries, built at `init`.
	/// The payload encodes the enumeration position and the polarity as
	/// `±(position + 1)`.
	base_reverse: HashMap<Var, Vec<(Variable, i64)>>,
	/// Host variable to the constraints it reifies (with the polarity of
	/// the reifying literal).
	reif_index: HashMap<Var, Vec<(ConstraintRef, bool)>>,
	/// Lazily created per-thread states.
	threads: Vec<Option<ThreadState>>,
}

/// The search-time state owned by one solver thread.
#[derive(Debug)]
struct ThreadState {
	/// The linear propagator with its trailed variable store.
	prop: LinearPropagator,
	/// The thread's reverse index, extended by volatile literals.
	reverse: HashMap<Var, Vec<(Variable, i64)>>,
	/// The decision levels a trail frame was opened for.
	dls: Vec<u32>,
	/// Private reasons for literals assigned via `propagate_lit`.
	reasons: HashMap<Lit, Clause>,
	/// The integer values of the shown variables in the last accepted
	/// model.
	model: BTreeMap<String, IntVal>,
	/// Work counters.
	stats: Statistics,
}

impl Statistics {
	/// Number of clauses handed to the host.
	pub fn num_clauses(&self) -> u64 {
		self.num_clauses
	}

	/// Number of literals introduced during search.
	pub fn num_lits(&self) -> u64 {
		self.num_lits
	}

	/// Number of watched literals processed.
	pub fn propagations(&self) -> u64 {
		self.propagations
	}
}

impl OrderPropagator {
	/// Create the driver over a grounded variable store and constraint set.
	pub(crate) fn new(
		vc: VariableCreator,
		constraints: Vec<ReifiedLinearConstraint>,
		config: Config,
		shown: Vec<(String, View)>,
		failed: bool,
	) -> Self {
		let num_vars = vc.num_variables();
		Self {
			config,
			vc,
			constraints,
			shown,
			failed,
			watched: (0..num_vars).map(|_| false).collect(),
			chain: (0..num_vars).map(|_| true).collect(),
			base_reverse: HashMap::new(),
			reif_index: HashMap::new(),
			threads: Vec::new(),
		}
	}

	/// Whether grounding already found the problem unsatisfiable.
	pub fn failed(&self) -> bool {
		self.failed
	}

	/// The work counters of a thread.
	pub fn statistics(&self, thread: usize) -> Statistics {
		self.threads
			.get(thread)
			.and_then(|t| t.as_ref())
			.map(|t| t.stats)
			.unwrap_or_default()
	}

	/// The shown-variable values of the last model accepted by `check` on
	/// the given thread.
	pub fn model_values(&self, thread: usize) -> BTreeMap<String, IntVal> {
		self.threads
			.get(thread)
			.and_then(|t| t.as_ref())
			.map(|t| t.model.clone())
			.unwrap_or_default()
	}

	/// Fetch (creating if needed) the state of a thread.
	fn take_thread(&mut self, id: usize) -> ThreadState {
		if self.threads.len() <= id {
			self.threads.resize_with(id + 1, || None);
		}
		if let Some(st) = self.threads[id].take() {
			return st;
		}
		let mut prop = LinearPropagator::new(&self.vc, self.config);
		let _ = prop.add_constraints(self.constraints.iter().cloned());
		ThreadState {
			prop,
			reverse: self.base_reverse.clone(),
			dls: vec![0],
			reasons: HashMap::new(),
			model: BTreeMap::new(),
			stats: Statistics::default(),
		}
	}

	/// Register a runtime-created order literal: watches, reverse index, and
	/// the binary clauses linking it into the ordering chain of its
	/// neighbours.
	fn register_volatile(
		&self,
		st: &mut ThreadState,
		ctl: &mut dyn PropagateControl,
		view: View,
		pos: u64,
		lit: Lit,
	) {
		let (var, idx, stored) = st.prop.vars_mut().set_volatile_le(view, pos, lit);
		st.stats.num_lits += 1;
		ctl.add_watch(stored);
		ctl.add_watch(!stored);
		let signed = if stored.is_negated() {
			-(idx as i64 + 1)
		} else {
			idx as i64 + 1
		};
		st.reverse.entry(stored.var()).or_default().push((var, signed));
		// Tie the new literal into the chain of its nearest neighbours; unit
		// propagation then fixes its value whenever the surrounding bounds
		// already determine it.
		if idx > 0 {
			if let Some((_, prev)) = st.prop.vars().prev_le_lit(var, idx - 1) {
				let _ = ctl.add_clause(&[!prev, stored]);
			}
		}
		if let Some((_, next)) = st.prop.vars().next_le_lit(var, idx + 1) {
			let _ = ctl.add_clause(&[!stored, next]);
		}
		trace!(
			lit = i32::from(stored),
			var = usize::from(var),
			idx,
			"volatile order literal"
		);
	}

	/// The literal for `view ≥ value-at(pos)`, creating and registering it
	/// if it does not exist yet.
	fn ensure_ge_lit(
		&self,
		st: &mut ThreadState,
		ctl: &mut dyn PropagateControl,
		view: View,
		pos: u64,
	) -> Lit {
		if let Some(g) = st.prop.vars().ge_lit_at(view, pos) {
			return g;
		}
		let l = ctl.add_literal();
		self.register_volatile(st, ctl, view, pos - 1, l);
		st.prop
			.vars()
			.ge_lit_at(view, pos)
			.expect("the literal was just created")
	}

	/// Process one watched order condition `(var, idx, is_le)` made true by
	/// the host literal `p`.
	///
	/// Applies the bound to the trailed store, records a conflict clause on
	/// an emptied domain, and forces the order literals subsumed by the new
	/// bound (the monotonicity chain) when explicit binary clauses do not
	/// cover the variable.
	fn apply_order_change(
		&self,
		st: &mut ThreadState,
		ctl: &mut dyn PropagateControl,
		p: Lit,
		var: Variable,
		idx: usize,
		is_le: bool,
	) -> Result<(), Clause> {
		let view = View::new(var);
		let (lo, up) = st.prop.vars().current_bounds(var);
		let idx = idx as u64;
		if is_le {
			if idx + 1 < up && !st.prop.constrain_upper(view, idx + 1, ctl.assignment()) {
				// v ≤ value(idx) against a lower bound beyond it
				let mut conflict = vec![!p];
				if lo > 0 {
					if let Some(w) = st.prop.vars().le_lit_at(view, lo - 1) {
						conflict.push(w);
					}
				}
				return Err(conflict);
			}
			if self.chain[var] {
				// every weaker upper bound is implied true
				let mut at = idx as usize + 1;
				while let Some((j, l)) = st.prop.vars().next_le_lit(var, at) {
					if j + 1 == st.prop.vars().domain(var).size() as usize
						|| ctl.assignment().is_true(l)
					{
						break;
					}
					if !self.force(st, ctl, l, p) {
						return Err(Vec::new());
					}
					at = j + 1;
				}
			}
		} else {
			if idx + 1 > lo && !st.prop.constrain_lower(view, idx + 1, ctl.assignment()) {
				// v > value(idx) against an upper bound at or below it
				let mut conflict = vec![!p];
				if let Some(w) = st.prop.vars().le_lit_at(view, up - 1) {
					conflict.push(!w);
				}
				return Err(conflict);
			}
			if self.chain[var] && idx > 0 {
				// every stronger upper bound is implied false
				let mut at = idx as usize - 1;
				loop {
					let Some((j, l)) = st.prop.vars().prev_le_lit(var, at) else {
						break;
					};
					if ctl.assignment().is_false(l) {
						break;
					}
					if !self.force(st, ctl, !l, p) {
						return Err(Vec::new());
					}
					if j == 0 {
						break;
					}
					at = j - 1;
				}
			}
		}
		Ok(())
	}

	/// Make `lit` true with `p` as its reason, through a learned binary
	/// clause or a private reason depending on the configuration. Returns
	/// `false` when the host reports a conflict.
	fn force(
		&self,
		st: &mut ThreadState,
		ctl: &mut dyn PropagateControl,
		lit: Lit,
		p: Lit,
	) -> bool {
		if ctl.assignment().is_true(lit) {
			return true;
		}
		st.stats.num_clauses += 1;
		if self.config.learn_clauses {
			ctl.add_clause(&[!p, lit])
		} else {
			let _ = st.reasons.insert(lit, vec![lit, !p]);
			ctl.propagate_lit(lit)
		}
	}

	/// Run the linear propagator to fixpoint, materializing every derived
	/// clause into host literals.
	fn run_propagator(&self, st: &mut ThreadState, ctl: &mut dyn PropagateControl) {
		loop {
			let clauses = st.prop.propagate_single_step(ctl.assignment()).to_vec();
			if clauses.is_empty() {
				if st.prop.at_fixpoint() {
					return;
				}
				continue;
			}
			for dc in clauses {
				let mut clause: Clause = vec![dc.lit];
				for &(view, pos) in &dc.bounds {
					let g = self.ensure_ge_lit(st, ctl, view, pos);
					if g == self.vc.true_lit() {
						continue;
					}
					clause.push(!g);
				}
				if !self.emit(st, ctl, clause) {
					return;
				}
			}
		}
	}

	/// Hand a derived clause to the host, either directly or as a private
	/// reason for its asserting literal. Returns `false` when the host
	/// reports a conflict.
	fn emit(&self, st: &mut ThreadState, ctl: &mut dyn PropagateControl, clause: Clause) -> bool {
		st.stats.num_clauses += 1;
		debug!(
			clause = ?clause.iter().map(|&l| i32::from(l)).collect::<Vec<i32>>(),
			"derived clause"
		);
		if !self.config.learn_clauses {
			let asg = ctl.assignment();
			let mut asserting = None;
			let mut rest_false = true;
			for &l in &clause {
				if asg.is_unknown(l) {
					if asserting.replace(l).is_some() {
						asserting = None;
						rest_false = false;
						break;
					}
				} else if asg.is_true(l) {
					rest_false = false;
					break;
				}
			}
			if let (Some(l), true) = (asserting, rest_false) {
				let _ = st.reasons.insert(l, clause);
				return ctl.propagate_lit(l);
			}
		}
		ctl.add_clause(&clause)
	}
}

impl Propagator for OrderPropagator {
	fn init(&mut self, init: &mut dyn PropagateInit) {
		// Watch the reification literal of every constraint.
		for (cidx, rl) in self.constraints.iter().enumerate() {
			init.add_watch(rl.lit);
			self.reif_index
				.entry(rl.lit.var())
				.or_default()
				.push((ConstraintRef::new(cidx), rl.lit.is_negated()));
			for v in rl.con.views() {
				self.watched[v.var] = true;
			}
		}

		// Watch the order literals of every variable the bound reasoning
		// must follow. With explicit binary order clauses, variables whose
		// precreated literals cover the whole domain are left to the host.
		for var in (0..self.vc.num_variables()).map(Variable::from) {
			let size = self.vc.domain_size(View::new(var)) as usize;
			let covered = self.vc.order_lits(var).len() == size;
			if !self.config.explicit_binary_order_clauses || !covered {
				self.watched[var] = true;
			}
			self.chain[var] = !(self.config.explicit_binary_order_clauses && covered);
		}

		for var in (0..self.vc.num_variables()).map(Variable::from) {
			if !self.watched[var] {
				continue;
			}
			let size = self.vc.domain_size(View::new(var)) as usize;
			for (idx, l) in self.vc.order_lits(var) {
				if idx + 1 == size {
					continue;
				}
				init.add_watch(l);
				init.add_watch(!l);
				let signed = if l.is_negated() {
					-(idx as i64 + 1)
				} else {
					idx as i64 + 1
				};
				self.base_reverse.entry(l.var()).or_default().push((var, signed));
			}
		}
		debug!(
			constraints = self.constraints.len(),
			watched = self.watched.iter().filter(|&&w| w).count(),
			"theory propagator initialized"
		);
	}

	#[tracing::instrument(level = "debug", skip(self, ctl, changes), fields(level = ctl.decision_level()))]
	fn propagate(&mut self, ctl: &mut dyn PropagateControl, changes: &[Lit]) {
		let tid = ctl.thread_id();
		let mut st = self.take_thread(tid);

		let level = ctl.decision_level();
		if level > *st.dls.last().unwrap() {
			st.dls.push(level);
			st.prop.add_level();
		}

		let mut conflict = None;
		'outer: for &p in changes {
			st.stats.propagations += 1;
			if let Some(entries) = self.reif_index.get(&p.var()) {
				for &(cidx, neg) in entries {
					if neg == p.is_negated() {
						st.prop.queue(cidx);
					}
				}
			}
			let order: Option<Vec<(Variable, i64)>> = st.reverse.get(&p.var()).cloned();
			if let Some(entries) = order {
				for (var, s) in entries {
					let idx = (s.abs() - 1) as usize;
					let is_le = (s > 0) == !p.is_negated();
					if let Err(c) = self.apply_order_change(&mut st, ctl, p, var, idx, is_le) {
						conflict = Some(c);
						break 'outer;
					}
				}
			}
		}

		if let Some(conflict) = conflict {
			if !conflict.is_empty() {
				st.stats.num_clauses += 1;
				let _ = ctl.add_clause(&conflict);
			}
		} else {
			self.run_propagator(&mut st, ctl);
		}
		self.threads[tid] = Some(st);
	}

	fn undo(&mut self, ctl: &mut dyn PropagateControl, _changes: &[Lit]) {
		let tid = ctl.thread_id();
		let Some(st) = self.threads.get_mut(tid).and_then(Option::as_mut) else {
			return;
		};
		if st.dls.len() > 1 {
			let level = st.dls.pop().unwrap();
			trace!(level, "undo");
			st.prop.remove_level();
		}
	}

	#[tracing::instrument(level = "debug", skip(self, ctl))]
	fn check(&mut self, ctl: &mut dyn PropagateControl) {
		let tid = ctl.thread_id();
		let mut st = self.take_thread(tid);

		let level = ctl.decision_level();
		if level > *st.dls.last().unwrap() {
			st.dls.push(level);
			st.prop.add_level();
		}

		// Find the watched variable with the most remaining freedom.
		let mut split: Option<(Variable, u64, u64)> = None;
		for var in (0..st.prop.vars().num_variables()).map(Variable::from) {
			if !self.watched[var] {
				continue;
			}
			let (lo, up) = st.prop.vars().current_bounds(var);
			if up - lo > 1 && split.map_or(true, |(_, l, u)| up - lo > u - l) {
				split = Some((var, lo, up));
			}
		}

		if let Some((var, lo, up)) = split {
			// Split the variable at its midpoint; the fresh literal is left
			// free, forcing the host to branch on it.
			let mid = lo + (up - lo - 1) / 2;
			let view = View::new(var);
			if st.prop.vars().le_lit_at(view, mid).is_none() {
				let l = ctl.add_literal();
				self.register_volatile(&mut st, ctl, view, mid, l);
				debug!(var = usize::from(var), pos = mid, "split variable");
			}
			self.threads[tid] = Some(st);
			return;
		}

		// Every watched variable is narrowed to a single value: decode and
		// store the model for the shown variables.
		st.model.clear();
		for (name, view) in &self.shown {
			let var = view.var;
			let value = if self.watched[var] {
				st.prop
					.vars()
					.singleton_value(var)
					.expect("watched variables are singletons in a model")
			} else {
				// Fully covered variables are decoded from the first true
				// order literal.
				let asg = ctl.assignment();
				let storage = st.prop.vars().order_storage(var);
				let idx = storage
					.iter()
					.find(|&(_, l)| asg.is_true(l))
					.map(|(i, _)| i)
					.expect("the final order literal is always true");
				st.prop.vars().domain(var).value(idx as u64)
			};
			let _ = st.model.insert(name.clone(), value);
		}
		debug!(model = ?st.model, "model accepted");
		self.threads[tid] = Some(st);
	}

	fn reason(&mut self, thread: usize, lit: Lit) -> Clause {
		self.threads
			.get_mut(thread)
			.and_then(Option::as_mut)
			.and_then(|st| st.reasons.get(&lit).cloned())
			.unwrap_or_else(|| vec![lit])
	}
}

