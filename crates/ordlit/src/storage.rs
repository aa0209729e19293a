//! Module containing the integer variable store: base domains, the
//! order-literal maps tying bounds to host literals, and the trailed
//! restrictors tracking the current domain of every variable during search.

use std::collections::BTreeMap;

use index_vec::IndexVec;
use tracing::{debug, trace};

use crate::{
	domain::Domain,
	host::{ClauseDatabase, Lit},
	view::{Restrictor, Variable, View},
	Config, IntVal, Overflow,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Storage for the order literals `v ≤ dom(v)[k]` of one variable.
///
/// The positions `k` index the enumeration of the variable's base domain; the
/// literal at the final position is always the solver's true literal. Two
/// representations are kept: a compact vector when most positions will be
/// filled, and an ordered map when literals are introduced sparsely. Callers
/// never branch on the representation.
pub struct OrderStorage {
	/// Number of positions (the size of the base domain).
	size: usize,
	/// Dense representation, indexed by position.
	vector: Option<Vec<Option<Lit>>>,
	/// Sparse representation, keyed by position.
	map: Option<BTreeMap<usize, Lit>>,
	/// Number of positions holding a literal.
	count: usize,
}

/// One entry of a variable's restrictor trail: the bounds that held from the
/// moment the variable was first touched on `level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LevelBounds {
	/// The trail level the entry belongs to.
	level: usize,
	/// First position of the variable's enumeration still in the domain.
	lo: u64,
	/// First position after the last one still in the domain.
	up: u64,
}

#[derive(Debug)]
/// Owner of the base domains and order/equality literal maps, used while the
/// problem is being grounded.
///
/// All methods that may introduce literals or clauses take the host's
/// [`ClauseDatabase`].
pub struct VariableCreator {
	/// The solving configuration.
	config: Config,
	/// The host literal that is true in every model.
	true_lit: Lit,
	/// The base domain of every variable.
	domains: IndexVec<Variable, Domain>,
	/// The order-literal storage of every variable.
	order: IndexVec<Variable, OrderStorage>,
	/// Equality literals created on demand, keyed by variable and value.
	equal: BTreeMap<(Variable, IntVal), Lit>,
}

#[derive(Clone, Debug)]
/// The per-thread view of the variable store during search: immutable base
/// domains and literal maps (extended only by volatile literals owned by the
/// same thread), plus the trail of per-level restrictors.
pub struct VariableStorage {
	/// The host literal that is true in every model.
	true_lit: Lit,
	/// The base domain of every variable.
	domains: IndexVec<Variable, Domain>,
	/// The order-literal storage, extended in place by volatile literals.
	order: IndexVec<Variable, OrderStorage>,
	/// Restrictor stack per variable; the bottom entry covers the full base
	/// domain.
	bounds: IndexVec<Variable, Vec<LevelBounds>>,
	/// Variables touched on each trail level.
	touched: Vec<Vec<Variable>>,
}

impl OrderStorage {
	/// Prepare the storage for a domain of `size` values, choosing the
	/// representations to keep.
	fn prepare(&mut self, size: usize, sparse: bool, dense: bool) {
		debug_assert!(self.vector.is_none() && self.map.is_none());
		self.size = size;
		if sparse {
			self.map = Some(BTreeMap::new());
		}
		if dense {
			self.vector = Some(vec![None; size]);
		}
	}

	/// Whether a representation has been chosen.
	fn is_prepared(&self) -> bool {
		self.vector.is_some() || self.map.is_some()
	}

	/// The number of positions.
	pub(crate) fn size(&self) -> usize {
		self.size
	}

	/// The number of positions holding a literal.
	pub(crate) fn num_lits(&self) -> usize {
		self.count
	}

	/// The literal at `idx`, if one exists.
	pub(crate) fn get(&self, idx: usize) -> Option<Lit> {
		debug_assert!(idx < self.size);
		if let Some(v) = &self.vector {
			v[idx]
		} else if let Some(m) = &self.map {
			m.get(&idx).copied()
		} else {
			None
		}
	}

	/// Store `lit` at `idx` in every kept representation.
	fn set(&mut self, idx: usize, lit: Lit) {
		debug_assert!(idx < self.size);
		let mut fresh = false;
		if let Some(v) = &mut self.vector {
			fresh = v[idx].is_none();
			v[idx] = Some(lit);
		}
		if let Some(m) = &mut self.map {
			fresh = m.insert(idx, lit).is_none();
		}
		if fresh {
			self.count += 1;
		}
	}

	/// Iterate over the filled positions in increasing order.
	pub(crate) fn iter(&self) -> Box<dyn Iterator<Item = (usize, Lit)> + '_> {
		if let Some(m) = &self.map {
			Box::new(m.iter().map(|(&i, &l)| (i, l)))
		} else if let Some(v) = &self.vector {
			Box::new(
				v.iter()
					.enumerate()
					.filter_map(|(i, l)| l.map(|l| (i, l))),
			)
		} else {
			Box::new(std::iter::empty())
		}
	}

	/// The first filled position at or after `idx`.
	pub(crate) fn next_at_or_after(&self, idx: usize) -> Option<(usize, Lit)> {
		if let Some(m) = &self.map {
			m.range(idx..).next().map(|(&i, &l)| (i, l))
		} else if let Some(v) = &self.vector {
			(idx..self.size).find_map(|i| v[i].map(|l| (i, l)))
		} else {
			None
		}
	}

	/// The last filled position at or before `idx`.
	pub(crate) fn prev_at_or_before(&self, idx: usize) -> Option<(usize, Lit)> {
		if let Some(m) = &self.map {
			m.range(..=idx).next_back().map(|(&i, &l)| (i, l))
		} else if let Some(v) = &self.vector {
			(0..=idx).rev().find_map(|i| v[i].map(|l| (i, l)))
		} else {
			None
		}
	}

	/// Drop all literals and adopt a new size. Used when a base domain is
	/// replaced during grounding; the caller re-homes the literals.
	fn reset(&mut self, size: usize) {
		self.size = size;
		self.count = 0;
		if let Some(v) = &mut self.vector {
			v.clear();
			v.resize(size, None);
		}
		if let Some(m) = &mut self.map {
			m.clear();
		}
	}
}

impl VariableCreator {
	/// Create a variable store for the given configuration. `true_lit` is the
	/// host literal that holds in every model.
	pub fn new(config: Config, true_lit: Lit) -> Self {
		Self {
			config,
			true_lit,
			domains: IndexVec::new(),
			order: IndexVec::new(),
			equal: BTreeMap::new(),
		}
	}

	/// The number of variables created so far.
	pub fn num_variables(&self) -> usize {
		self.domains.len()
	}

	/// The base domain of `var`.
	pub fn domain(&self, var: Variable) -> &Domain {
		&self.domains[var]
	}

	/// The number of values the variable under `view` may take.
	pub fn domain_size(&self, view: View) -> u64 {
		self.domains[view.var].size()
	}

	/// Allocate a new variable with the given non-empty base domain.
	pub fn create_variable(&mut self, dom: Domain) -> Result<Variable, Overflow> {
		if dom.overflow() {
			return Err(Overflow);
		}
		debug_assert!(!dom.is_empty());
		let var = self.domains.push(dom);
		let r = self.order.push(OrderStorage::default());
		debug_assert_eq!(var, r);
		Ok(var)
	}

	/// Allocate a new variable and return its identity view.
	pub fn create_view(&mut self, dom: Domain) -> Result<View, Overflow> {
		Ok(View::new(self.create_variable(dom)?))
	}

	/// The full enumeration of the base domain of `view.var` through `view`.
	pub fn restrictor(&self, view: View) -> Restrictor<'_> {
		Restrictor::over(view, &self.domains[view.var])
	}

	/// Intersect the set `d` into the domain of `view`, translating it
	/// through the view first. Returns `false` (after emitting a unit
	/// conflict) when the domain becomes empty.
	pub fn intersect_view(
		&mut self,
		db: &mut dyn ClauseDatabase,
		view: View,
		mut d: Domain,
	) -> Result<bool, Overflow> {
		let _ = d.offset(
			IntVal::try_from(-i64::from(view.offset)).map_err(|_| Overflow)?,
		);
		if d.overflow() {
			return Err(Overflow);
		}
		let _ = d.inplace_divide(view.scale.get());
		let mut copy = self.domains[view.var].clone();
		if !copy.intersect(&d) {
			let fl = db.false_lit();
			let _ = db.add_clause(&[fl]);
			return Ok(false);
		}
		Ok(self.domain_change(db, view.var, copy))
	}

	/// Remove the view value `x` from the domain of `view`. Returns `false`
	/// (after emitting a unit conflict) when the domain becomes empty.
	pub fn remove_from_view(
		&mut self,
		db: &mut dyn ClauseDatabase,
		view: View,
		x: i64,
	) -> bool {
		let x = x - i64::from(view.offset);
		if x % i64::from(view.scale.get()) != 0 {
			return true;
		}
		let x = x / i64::from(view.scale.get());
		let mut copy = self.domains[view.var].clone();
		if !copy.remove_bounds(x, x) {
			let fl = db.false_lit();
			let _ = db.add_clause(&[fl]);
			return false;
		}
		self.domain_change(db, view.var, copy)
	}

	/// Restrict the domain of `view` to view values in `lo..=up`. Returns
	/// `false` (after emitting a unit conflict) when the domain becomes
	/// empty.
	pub fn constrain_view(
		&mut self,
		db: &mut dyn ClauseDatabase,
		view: View,
		lo: i64,
		up: i64,
	) -> bool {
		// The view is monotone, so the bounds map to variable bounds with the
		// roles swapped when the view is reversed.
		let a = (-view).invert_le(-lo);
		let b = view.invert_le(up);
		let (var_lo, var_up) = if view.reversed() { (b, a) } else { (a, b) };
		let mut copy = self.domains[view.var].clone();
		if !copy.intersect_bounds(var_lo, var_up) {
			let fl = db.false_lit();
			let _ = db.add_clause(&[fl]);
			return false;
		}
		self.domain_change(db, view.var, copy)
	}

	/// Replace the base domain of `var` with the (subset) domain `new`,
	/// re-homing existing order literals onto the new enumeration.
	///
	/// A literal whose value dropped below the new domain is made false, one
	/// whose value now covers the whole domain is made true, and two literals
	/// that became equivalent are tied together. Returns `false` when `new`
	/// is empty.
	fn domain_change(
		&mut self,
		db: &mut dyn ClauseDatabase,
		var: Variable,
		new: Domain,
	) -> bool {
		if new.is_empty() {
			let fl = db.false_lit();
			let _ = db.add_clause(&[fl]);
			return false;
		}
		let old = &self.domains[var];
		if *old == new {
			return true;
		}
		let storage = &mut self.order[var];
		if !storage.is_prepared() || storage.num_lits() == 0 {
			self.domains[var] = new;
			if storage.is_prepared() {
				storage.reset(new_size(&self.domains[var]));
				self.place_true_lit(var);
			}
			return true;
		}

		let relocated: Vec<(usize, Lit)> = storage.iter().collect();
		let new_len = new_size(&new);
		storage.reset(new_len);
		let mut ok = true;
		for (idx, l) in relocated {
			let val = old.value(idx as u64);
			// Number of values of the new domain that `v ≤ val` still allows.
			let kept = new.rank(i64::from(val) + 1);
			if kept == 0 {
				ok &= db.add_clause(&[!l]);
			} else if kept == new_len as u64 {
				if l != self.true_lit {
					ok &= db.add_clause(&[l]);
				}
			} else {
				let new_idx = (kept - 1) as usize;
				if let Some(existing) = storage.get(new_idx) {
					ok &= db.equate(existing, l);
				} else {
					storage.set(new_idx, l);
				}
			}
		}
		self.domains[var] = new;
		self.place_true_lit(var);
		ok
	}

	/// Ensure the final position of `var`'s order storage holds the true
	/// literal.
	fn place_true_lit(&mut self, var: Variable) {
		let storage = &mut self.order[var];
		let last = storage.size() - 1;
		if storage.get(last).is_none() {
			storage.set(last, self.true_lit);
		}
	}

	/// Choose the representations for the order-literal storage of `var` and
	/// seed the true literal, if not done before.
	fn prepare_order_storage(&mut self, var: Variable) {
		if self.order[var].is_prepared() {
			return;
		}
		let size = self.domains[var].size();
		// With lazily created literals the sparse map carries the step; the
		// dense vector is only worthwhile for small domains or when every
		// literal will exist anyway.
		let sparse = self.config.min_lits_per_var >= 0;
		let dense = size < 1_000_000 || self.config.min_lits_per_var == -1;
		self.order[var].prepare(size as usize, sparse, dense);
		self.place_true_lit(var);
	}

	/// The order literal `var ≤ dom(var)[idx]`, created through the host if
	/// it does not exist yet.
	fn le_lit_var(&mut self, db: &mut dyn ClauseDatabase, var: Variable, idx: usize) -> Lit {
		self.prepare_order_storage(var);
		let storage = &mut self.order[var];
		debug_assert!(idx < storage.size());
		if let Some(l) = storage.get(idx) {
			return l;
		}
		let l = db.new_lit();
		trace!(lit = i32::from(l), var = usize::from(var), idx, "create order literal");
		storage.set(idx, l);
		l
	}

	/// The literal meaning `view ≤ view-value-at(pos)`, created if absent.
	/// For reversed views this is the negation of the complementary order
	/// literal of the underlying variable.
	pub fn le_lit(&mut self, db: &mut dyn ClauseDatabase, view: View, pos: u64) -> Lit {
		let size = self.domains[view.var].size();
		debug_assert!(pos < size);
		if pos == size - 1 {
			return self.true_lit;
		}
		if view.reversed() {
			!self.le_lit_var(db, view.var, (size - pos - 2) as usize)
		} else {
			self.le_lit_var(db, view.var, pos as usize)
		}
	}

	/// The literal meaning `view ≥ view-value-at(pos)`; by duality the
	/// negation of [`Self::le_lit`] at the previous position. At position 0
	/// this is the solver's true literal.
	pub fn ge_lit(&mut self, db: &mut dyn ClauseDatabase, view: View, pos: u64) -> Lit {
		if pos == 0 {
			self.true_lit
		} else {
			!self.le_lit(db, view, pos - 1)
		}
	}

	/// Whether the order literal for `view ≤ view-value-at(pos)` already
	/// exists.
	pub fn has_le_lit(&self, view: View, pos: u64) -> bool {
		let size = self.domains[view.var].size();
		if pos == size - 1 {
			return true;
		}
		let idx = if view.reversed() {
			(size - pos - 2) as usize
		} else {
			pos as usize
		};
		self.order[view.var].get(idx).is_some()
	}

	/// Bind `lit` to the position `pos` of `view`'s enumeration as the
	/// literal meaning `view ≤ view-value-at(pos)`.
	///
	/// If another literal is already bound there the two are equated. When
	/// the host already knows the truth of `lit`, the corresponding bound is
	/// applied to the base domain. `pos == size` binds to the empty tail and
	/// makes `lit` false.
	pub fn set_le_lit(
		&mut self,
		db: &mut dyn ClauseDatabase,
		view: View,
		pos: u64,
		lit: Lit,
	) -> bool {
		let size = self.domains[view.var].size();
		if pos == size {
			return db.equate(lit, db.false_lit());
		}
		debug_assert!(pos < size);
		if view.reversed() {
			// view ≤ value(pos) is var ≥ value, the complementary ≥ binding.
			return self.set_ge_lit_var(db, view.var, (size - 1 - pos) as usize, lit);
		}
		self.set_le_lit_var(db, view.var, pos as usize, lit)
	}

	/// Var-side binding of `lit` as `var ≤ dom(var)[idx]`.
	fn set_le_lit_var(
		&mut self,
		db: &mut dyn ClauseDatabase,
		var: Variable,
		idx: usize,
		lit: Lit,
	) -> bool {
		self.prepare_order_storage(var);
		let storage = &mut self.order[var];
		if let Some(existing) = storage.get(idx) {
			if !db.equate(lit, existing) {
				return false;
			}
		} else {
			storage.set(idx, lit);
		}
		let value = i64::from(self.domains[var].value(idx as u64));
		if db.is_fact_true(lit) {
			self.constrain_view(db, View::new(var), i64::from(Domain::MIN), value)
		} else if db.is_fact_false(lit) {
			self.constrain_view(db, View::new(var), value + 1, i64::from(Domain::MAX))
		} else {
			true
		}
	}

	/// Var-side binding of `lit` as `var ≥ dom(var)[idx]`.
	fn set_ge_lit_var(
		&mut self,
		db: &mut dyn ClauseDatabase,
		var: Variable,
		idx: usize,
		lit: Lit,
	) -> bool {
		if idx == 0 {
			return db.equate(lit, self.true_lit);
		}
		self.set_le_lit_var(db, var, idx - 1, !lit)
	}

	/// The literal meaning `view = value`, created on demand.
	///
	/// When the value is the current lower or upper end of the base domain
	/// the corresponding endpoint order literal is returned instead of a
	/// fresh literal; a value outside the base domain yields the false
	/// literal. The clauses tying fresh equality literals to the order
	/// literals are emitted by [`Self::create_equal_clauses`].
	pub fn equal_lit(&mut self, db: &mut dyn ClauseDatabase, view: View, value: i64) -> Lit {
		let x = value - i64::from(view.offset);
		if x % i64::from(view.scale.get()) != 0 {
			return db.false_lit();
		}
		let x = x / i64::from(view.scale.get());
		let dom = &self.domains[view.var];
		let Ok(val) = IntVal::try_from(x) else {
			return db.false_lit();
		};
		if !dom.contains(val) {
			return db.false_lit();
		}
		if let Some(&l) = self.equal.get(&(view.var, val)) {
			return l;
		}
		let pos = dom.rank(x);
		if dom.lower() == val {
			return self.le_lit_var(db, view.var, pos as usize);
		}
		if dom.upper() == val {
			return !self.le_lit_var(db, view.var, (pos - 1) as usize);
		}
		let l = db.new_lit();
		let _ = self.equal.insert((view.var, val), l);
		l
	}

	/// Bulk precreation of order literals.
	///
	/// At least `min_lits_per_var` literals are created per variable, spread
	/// evenly over the enumeration; `-1` creates all of them.
	pub fn create_order_literals(&mut self, db: &mut dyn ClauseDatabase) {
		let min_lits = self.config.min_lits_per_var;
		if min_lits == 0 {
			for var in (0..self.num_variables()).map(Variable::from) {
				self.prepare_order_storage(var);
			}
			return;
		}
		for var in (0..self.num_variables()).map(Variable::from) {
			self.prepare_order_storage(var);
			// Positions 0..size-1 are the non-trivial bounds.
			let size = self.order[var].size() as i64 - 1;
			if size == 0 {
				continue;
			}
			let wanted = if min_lits == -1 { size } else { min_lits.min(size) };
			let existing = self.order[var].num_lits() as i64 - 1;
			if existing >= wanted {
				continue;
			}
			let step = ((size as f64) / (wanted as f64)).max(1.0);
			let mut j = step / 2.0;
			while j < size as f64 {
				let idx = j as usize;
				if self.order[var].get(idx).is_none() {
					let _ = self.le_lit_var(db, var, idx);
				}
				j += step;
			}
		}
		debug!(
			vars = self.num_variables(),
			lits = self
				.order
				.iter()
				.map(OrderStorage::num_lits)
				.sum::<usize>(),
			"precreated order literals"
		);
	}

	/// Emit the clauses `¬l ∨ l'` for every pair of order literals at
	/// consecutive filled positions, making the ordering chain explicit to
	/// the host.
	pub fn create_order_clauses(&mut self, db: &mut dyn ClauseDatabase) -> bool {
		for var in (0..self.num_variables()).map(Variable::from) {
			let pairs: Vec<(Lit, Lit)> = {
				let lits: Vec<Lit> = self.order[var].iter().map(|(_, l)| l).collect();
				lits.windows(2).map(|w| (w[0], w[1])).collect()
			};
			for (a, b) in pairs {
				if b == self.true_lit {
					continue;
				}
				if !db.add_clause(&[!a, b]) {
					return false;
				}
			}
		}
		true
	}

	/// Emit the three-clause equivalence tying every pending equality
	/// literal to its order literals.
	pub fn create_equal_clauses(&mut self, db: &mut dyn ClauseDatabase) -> bool {
		let pending: Vec<(Variable, IntVal, Lit)> = self
			.equal
			.iter()
			.map(|(&(var, val), &l)| (var, val, l))
			.collect();
		for (var, val, l) in pending {
			let dom = &self.domains[var];
			if !dom.contains(val) {
				if !db.add_clause(&[!l]) {
					return false;
				}
				continue;
			}
			let pos = dom.rank(i64::from(val)) as usize;
			// a: var ≤ val, b: var ≤ predecessor of val.
			let a = self.le_lit_var(db, var, pos);
			let b = if pos == 0 {
				db.false_lit()
			} else {
				self.le_lit_var(db, var, pos - 1)
			};
			if !(db.add_clause(&[l, !a, b])
				&& db.add_clause(&[!l, !b])
				&& db.add_clause(&[!l, a]))
			{
				return false;
			}
		}
		true
	}

	/// Tighten the base domains by the order and equality literals the host
	/// already fixed during grounding.
	pub fn restrict_domains_according_to_literals(
		&mut self,
		db: &mut dyn ClauseDatabase,
	) -> bool {
		for var in (0..self.num_variables()).map(Variable::from) {
			if self.order[var].num_lits() == 0 {
				continue;
			}
			let dom = &self.domains[var];
			let mut lower = i64::from(dom.lower());
			let mut upper = i64::from(dom.upper());
			for (idx, l) in self.order[var].iter() {
				if db.is_fact_false(l) {
					lower = i64::from(dom.value(idx as u64)) + 1;
				} else if db.is_fact_true(l) {
					upper = i64::from(dom.value(idx as u64));
					break;
				}
			}
			if !self.constrain_view(db, View::new(var), lower, upper) {
				return false;
			}
		}
		let pending: Vec<(Variable, IntVal, Lit)> = self
			.equal
			.iter()
			.map(|(&(var, val), &l)| (var, val, l))
			.collect();
		for (var, val, l) in pending {
			if db.is_fact_true(l) {
				let _ = self.equal.remove(&(var, val));
				if !self.constrain_view(db, View::new(var), i64::from(val), i64::from(val)) {
					return false;
				}
			} else if db.is_fact_false(l) {
				let _ = self.equal.remove(&(var, val));
				if !self.remove_from_view(db, View::new(var), i64::from(val)) {
					return false;
				}
			}
		}
		true
	}

	/// Split the creator into the immutable parts used during search.
	pub(crate) fn freeze(&self) -> (IndexVec<Variable, Domain>, IndexVec<Variable, OrderStorage>) {
		(self.domains.clone(), self.order.clone())
	}

	/// The order literals of `var` known at ground time, by position.
	pub(crate) fn order_lits(&self, var: Variable) -> Vec<(usize, Lit)> {
		self.order[var].iter().collect()
	}

	/// The host literal that is true in every model.
	pub fn true_lit(&self) -> Lit {
		self.true_lit
	}
}

/// The number of positions the order storage of a domain needs.
fn new_size(dom: &Domain) -> usize {
	dom.size() as usize
}

impl VariableStorage {
	/// Create the search-time store from a grounded [`VariableCreator`].
	pub fn new(vc: &VariableCreator) -> Self {
		let (domains, mut order) = vc.freeze();
		// Unprepared variables still need their true-literal sentinel for
		// runtime lookups.
		for (var, storage) in order.iter_mut_enumerated() {
			if !storage.is_prepared() {
				let size = domains[var].size() as usize;
				storage.prepare(size, true, false);
				storage.set(size - 1, vc.true_lit());
			}
		}
		let bounds = domains
			.iter()
			.map(|d| {
				vec![LevelBounds {
					level: 0,
					lo: 0,
					up: d.size(),
				}]
			})
			.collect();
		let touched = vec![(0..domains.len()).map(Variable::from).collect()];
		Self {
			true_lit: vc.true_lit(),
			domains,
			order,
			bounds,
			touched,
		}
	}

	/// The number of variables.
	pub fn num_variables(&self) -> usize {
		self.domains.len()
	}

	/// The base domain of `var`.
	pub fn domain(&self, var: Variable) -> &Domain {
		&self.domains[var]
	}

	/// The number of trail levels, including the root level.
	pub fn num_levels(&self) -> usize {
		self.touched.len()
	}

	/// Open a new trail level.
	pub fn add_level(&mut self) {
		self.touched.push(Vec::new());
	}

	/// Pop the innermost trail level, restoring the restrictors of every
	/// variable touched on it.
	pub fn remove_level(&mut self) {
		debug_assert!(self.touched.len() > 1);
		for var in self.touched.pop().unwrap() {
			let _ = self.bounds[var].pop();
		}
	}

	/// The full enumeration of the base domain through `view`.
	pub fn restrictor(&self, view: View) -> Restrictor<'_> {
		Restrictor::over(view, &self.domains[view.var])
	}

	/// The enumeration through `view` truncated to the current trail bounds.
	pub fn current(&self, view: View) -> Restrictor<'_> {
		let top = self.bounds[view.var].last().unwrap();
		Restrictor::windowed(view, &self.domains[view.var], top.lo, top.up)
	}

	/// The current variable-side bounds `[lo, up)` of `var`.
	pub fn current_bounds(&self, var: Variable) -> (u64, u64) {
		let top = self.bounds[var].last().unwrap();
		(top.lo, top.up)
	}

	/// Record new bounds for `var` on the current level.
	fn store_bounds(&mut self, var: Variable, lo: u64, up: u64) {
		let level = self.touched.len() - 1;
		let top = self.bounds[var].last_mut().unwrap();
		if top.level == level {
			top.lo = lo;
			top.up = up;
		} else {
			self.bounds[var].push(LevelBounds { level, lo, up });
			self.touched[level].push(var);
		}
	}

	/// Keep only the positions before `end` of `view`'s enumeration,
	/// returning `false` (without changing the trail) when this would empty
	/// the domain.
	pub fn constrain_upper(&mut self, view: View, end: u64) -> bool {
		let size = self.domains[view.var].size();
		let (lo, up) = self.current_bounds(view.var);
		let (new_lo, new_up) = if view.reversed() {
			(lo.max(size - end), up)
		} else {
			(lo, up.min(end))
		};
		if new_lo >= new_up {
			return false;
		}
		if (new_lo, new_up) != (lo, up) {
			trace!(
				var = usize::from(view.var),
				lo = new_lo,
				up = new_up,
				"tighten"
			);
			self.store_bounds(view.var, new_lo, new_up);
		}
		true
	}

	/// Keep only the positions at or after `begin` of `view`'s enumeration,
	/// returning `false` (without changing the trail) when this would empty
	/// the domain.
	pub fn constrain_lower(&mut self, view: View, begin: u64) -> bool {
		let size = self.domains[view.var].size();
		let (lo, up) = self.current_bounds(view.var);
		let (new_lo, new_up) = if view.reversed() {
			(lo, up.min(size - begin))
		} else {
			(lo.max(begin), up)
		};
		if new_lo >= new_up {
			return false;
		}
		if (new_lo, new_up) != (lo, up) {
			trace!(
				var = usize::from(view.var),
				lo = new_lo,
				up = new_up,
				"tighten"
			);
			self.store_bounds(view.var, new_lo, new_up);
		}
		true
	}

	/// The existing literal meaning `view ≤ view-value-at(pos)`, if any.
	pub fn le_lit_at(&self, view: View, pos: u64) -> Option<Lit> {
		let size = self.domains[view.var].size();
		debug_assert!(pos < size);
		if pos == size - 1 {
			return Some(self.true_lit);
		}
		if view.reversed() {
			self.order[view.var]
				.get((size - pos - 2) as usize)
				.map(|l| !l)
		} else {
			self.order[view.var].get(pos as usize)
		}
	}

	/// The existing literal meaning `view ≥ view-value-at(pos)`, if any.
	pub fn ge_lit_at(&self, view: View, pos: u64) -> Option<Lit> {
		if pos == 0 {
			Some(self.true_lit)
		} else {
			self.le_lit_at(view, pos - 1).map(|l| !l)
		}
	}

	/// Insert a literal created during search as `view ≤ view-value-at(pos)`.
	///
	/// Returns the underlying variable, the variable-side position, and the
	/// literal as stored (negated for reversed views), which the driver uses
	/// to register watches.
	pub fn set_volatile_le(
		&mut self,
		view: View,
		pos: u64,
		lit: Lit,
	) -> (Variable, usize, Lit) {
		let size = self.domains[view.var].size();
		debug_assert!(pos < size - 1);
		let (idx, stored) = if view.reversed() {
			((size - pos - 2) as usize, !lit)
		} else {
			(pos as usize, lit)
		};
		debug_assert!(self.order[view.var].get(idx).is_none());
		self.order[view.var].set(idx, stored);
		(view.var, idx, stored)
	}

	/// The first position at or after `idx` of `var`'s enumeration holding
	/// an order literal.
	pub fn next_le_lit(&self, var: Variable, idx: usize) -> Option<(usize, Lit)> {
		self.order[var].next_at_or_after(idx)
	}

	/// The last position at or before `idx` of `var`'s enumeration holding
	/// an order literal.
	pub fn prev_le_lit(&self, var: Variable, idx: usize) -> Option<(usize, Lit)> {
		self.order[var].prev_at_or_before(idx)
	}

	/// The order-literal storage of `var`.
	pub(crate) fn order_storage(&self, var: Variable) -> &OrderStorage {
		&self.order[var]
	}

	/// The value of `var` once its current restrictor is a singleton.
	pub fn singleton_value(&self, var: Variable) -> Option<IntVal> {
		let (lo, up) = self.current_bounds(var);
		(up - lo == 1).then(|| self.domains[var].value(lo))
	}
}
