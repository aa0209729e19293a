//! Module containing the adapter from parsed theory atoms to the constraint
//! store: `&sum`, `&dom`, `&distinct`, `&minimize`, and `&show` atoms are
//! checked, normalized, and turned into domains, reified linear constraints,
//! objective terms, and the shown-variable table.
//!
//! Parsing the theory language itself is the front-end's concern; this
//! module consumes atoms whose terms have already been flattened into linear
//! expressions over named integer variables.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::warn;

use crate::{
	constraint::{Direction, LinearConstraint, Relation, ReifiedLinearConstraint},
	domain::Domain,
	driver::OrderPropagator,
	host::{ClauseDatabase, Lit},
	storage::VariableCreator,
	translate::{translate, translate_distinct},
	view::View,
	Config, IntSetVal, IntVal, NonZeroIntVal, Overflow,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// The guard of a theory atom: a relation against a linear expression.
pub struct Guard {
	/// The comparison relation.
	pub rel: Relation,
	/// The right hand side expression.
	pub terms: Vec<TheoryTerm>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// One element of a theory atom.
pub struct TheoryElement {
	/// The linear expression of the element.
	pub terms: Vec<TheoryTerm>,
	/// The identity tuple of the element, used to detect duplicates in
	/// `&minimize` atoms.
	pub tuple: Vec<i64>,
	/// The element's condition literal; conditions are not supported.
	pub condition: Option<Lit>,
	/// The priority level of a `&minimize` element.
	pub priority: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A single term `coef·var` (or a constant, when `var` is `None`) of a
/// flattened theory expression.
pub struct TheoryTerm {
	/// The coefficient.
	pub coef: i64,
	/// The variable name, or `None` for a constant term.
	pub var: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors raised for malformed theory input, surfaced before solving
/// begins.
pub enum TheoryError {
	/// A guard is missing, superfluous, or uses the wrong relation.
	#[error("invalid guard for &{0} atom")]
	BadGuard(String),
	/// Two `&minimize` elements carry the same priority and tuple.
	#[error("duplicate tuple in &minimize atom")]
	DuplicateMinimize,
	/// An expression does not denote an integer view where one is required.
	#[error("non-integer expression in theory atom")]
	NonIntegerExpression,
	/// A theory atom uses a name this propagator does not define.
	#[error("unknown theory function &{0}")]
	UnknownFunction(String),
	/// An element carries a condition, which is not supported.
	#[error("conditions on theory elements are not supported")]
	UnsupportedCondition,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
/// A selector of a `&show` atom.
pub enum ShowSelector {
	/// Show the variable with exactly this name.
	Name(String),
	/// Show all variables whose name has this symbol and arity.
	Signature(String, usize),
}

/// Builder consuming parsed theory atoms and producing the grounded theory
/// propagator.
#[derive(Debug)]
pub struct TheoryBuilder {
	/// The solving configuration.
	config: Config,
	/// The variable store being grounded.
	vc: VariableCreator,
	/// Mapping from variable names to their identity views.
	names: BTreeMap<String, View>,
	/// Compiled forward implications, in normal form.
	constraints: Vec<ReifiedLinearConstraint>,
	/// Distinct atoms pending decomposition.
	distincts: Vec<(Lit, Vec<View>)>,
	/// Objective terms `(view, priority)` pending emission.
	minimize: Vec<(View, u32)>,
	/// Seen `(priority, tuple)` pairs of minimize elements.
	minimize_seen: BTreeSet<(u32, Vec<i64>)>,
	/// Variables that were given an explicit `&dom`.
	dom_declared: BTreeSet<String>,
	/// Selectors of `&show` atoms; empty shows every named variable.
	shown: Vec<ShowSelector>,
	/// Whether grounding derived a trivial inconsistency.
	failed: bool,
}

impl TheoryBuilder {
	/// Create a builder for the given configuration. `true_lit` is the host
	/// literal that holds in every model.
	pub fn new(config: Config, true_lit: Lit) -> Self {
		Self {
			config,
			vc: VariableCreator::new(config, true_lit),
			names: BTreeMap::new(),
			constraints: Vec::new(),
			distincts: Vec::new(),
			minimize: Vec::new(),
			minimize_seen: BTreeSet::new(),
			dom_declared: BTreeSet::new(),
			shown: Vec::new(),
			failed: false,
		}
	}

	/// Whether grounding has already derived a trivial inconsistency.
	pub fn failed(&self) -> bool {
		self.failed
	}

	/// The identity view of the named variable, created with the full safe
	/// value window on first reference.
	pub fn var(&mut self, name: &str) -> View {
		if let Some(&v) = self.names.get(name) {
			return v;
		}
		let view = self
			.vc
			.create_view(Domain::unbounded())
			.expect("the unbounded domain is always representable");
		let _ = self.names.insert(name.to_owned(), view);
		view
	}

	/// Dispatch a parsed atom `&name{elements} guard` with reification
	/// literal `lit`.
	pub fn add_atom(
		&mut self,
		db: &mut dyn ClauseDatabase,
		name: &str,
		lit: Lit,
		elements: Vec<TheoryElement>,
		guard: Option<Guard>,
	) -> Result<(), TheoryError> {
		for e in &elements {
			if e.condition.is_some() {
				return Err(TheoryError::UnsupportedCondition);
			}
		}
		match name {
			"sum" => {
				let guard = guard.ok_or_else(|| TheoryError::BadGuard(name.to_owned()))?;
				self.add_sum(db, lit, elements, guard.rel, guard.terms, Direction::Eq)
			}
			"dom" => {
				let guard = guard.ok_or_else(|| TheoryError::BadGuard(name.to_owned()))?;
				if guard.rel != Relation::Eq {
					return Err(TheoryError::BadGuard(name.to_owned()));
				}
				let set = dom_set(&elements).ok_or(TheoryError::NonIntegerExpression)?;
				let var = single_var(&guard.terms).ok_or(TheoryError::BadGuard(name.to_owned()))?;
				self.add_dom(db, &set, &var)
			}
			"distinct" => {
				if guard.is_some() {
					return Err(TheoryError::BadGuard(name.to_owned()));
				}
				self.add_distinct(lit, elements)
			}
			"minimize" => {
				if guard.is_some() {
					return Err(TheoryError::BadGuard(name.to_owned()));
				}
				self.add_minimize(elements)
			}
			"show" => {
				if guard.is_some() {
					return Err(TheoryError::BadGuard(name.to_owned()));
				}
				for e in elements {
					self.shown.push(show_selector(&e)?);
				}
				Ok(())
			}
			other => Err(TheoryError::UnknownFunction(other.to_owned())),
		}
	}

	/// Add a `&sum` atom: `lit dir (Σ elements  rel  Σ guard_terms)`.
	pub fn add_sum(
		&mut self,
		db: &mut dyn ClauseDatabase,
		lit: Lit,
		elements: Vec<TheoryElement>,
		rel: Relation,
		guard_terms: Vec<TheoryTerm>,
		direction: Direction,
	) -> Result<(), TheoryError> {
		let mut views = Vec::new();
		let mut rhs: i64 = 0;
		for e in &elements {
			if !self.collect_terms(&e.terms, 1, &mut views, &mut rhs) {
				let _ = self.overflow_unsat(db);
				return Ok(());
			}
		}
		// Guard terms move to the left hand side with inverted sign.
		let mut guard_const: i64 = 0;
		if !self.collect_terms(&guard_terms, -1, &mut views, &mut guard_const) {
			let _ = self.overflow_unsat(db);
			return Ok(());
		}
		rhs += guard_const;

		let mut rl =
			ReifiedLinearConstraint::new(lit, LinearConstraint::new(views, rel, rhs), direction);
		if rl.normalize().is_err() {
			let _ = self.overflow_unsat(db);
			return Ok(());
		}
		if rl.con.rhs().abs() > i64::from(Domain::MAX) {
			let _ = self.overflow_unsat(db);
			return Ok(());
		}
		self.post(db, rl);
		Ok(())
	}

	/// Collect `sign · terms` into `views`, folding constants into `rhs`
	/// (with the opposite sign, as they move across the relation). Returns
	/// `false` on overflow.
	fn collect_terms(
		&mut self,
		terms: &[TheoryTerm],
		sign: i64,
		views: &mut Vec<View>,
		rhs: &mut i64,
	) -> bool {
		for t in terms {
			let coef = t.coef * sign;
			match &t.var {
				None => *rhs -= coef,
				Some(name) => {
					if coef == 0 {
						continue;
					}
					let Ok(coef) = IntVal::try_from(coef) else {
						return false;
					};
					let view = self.var(name);
					views.push(view * NonZeroIntVal::new(coef).unwrap());
				}
			}
		}
		rhs.abs() <= i64::from(Domain::MAX)
	}

	/// Compile a normalized reified constraint into forward implications,
	/// splitting `=`/`≠` and the backward direction.
	fn post(&mut self, db: &mut dyn ClauseDatabase, rl: ReifiedLinearConstraint) {
		match rl.con.relation() {
			Relation::Le => match rl.direction {
				Direction::Fwd => self.post_le_imp(db, rl.lit, rl.con),
				Direction::Bwd => {
					let neg = rl.con.negated_le();
					self.post_le_imp(db, !rl.lit, neg);
				}
				Direction::Eq => self.post_le_eq(db, rl.lit, rl.con),
			},
			Relation::Eq | Relation::Ne => {
				// Σ = r splits into the equivalences le ↔ (Σ ≤ r) and
				// ge ↔ (Σ ≥ r); the atom is then propositional logic over
				// the two halves. `≠` with an `=` direction was already
				// flipped by normalization.
				let is_eq = rl.con.relation() == Relation::Eq;
				let b = rl.lit;
				let views = rl.con.views().to_vec();
				let rhs = rl.con.rhs();
				let le = db.new_lit();
				let ge = db.new_lit();
				let upper = LinearConstraint::new(views.clone(), Relation::Le, rhs);
				let lower =
					LinearConstraint::new(views.iter().map(|&v| -v).collect(), Relation::Le, -rhs);
				self.post_le_eq(db, le, upper);
				self.post_le_eq(db, ge, lower);
				let fwd = rl.direction != Direction::Bwd;
				let bwd = rl.direction != Direction::Fwd;
				if is_eq {
					if fwd {
						let _ = db.add_clause(&[!b, le]);
						let _ = db.add_clause(&[!b, ge]);
					}
					if bwd {
						let _ = db.add_clause(&[b, !le, !ge]);
					}
				} else {
					if fwd {
						let _ = db.add_clause(&[!b, !le, !ge]);
					}
					if bwd {
						let _ = db.add_clause(&[b, le]);
						let _ = db.add_clause(&[b, ge]);
					}
				}
			}
			_ => unreachable!("constraint not normalized"),
		}
	}

	/// Post the equivalence `lit ↔ con` for a `≤` constraint.
	///
	/// A single-term constraint is an order condition, so `lit` is bound
	/// directly into the order-literal map instead of being propagated.
	fn post_le_eq(&mut self, db: &mut dyn ClauseDatabase, lit: Lit, mut con: LinearConstraint) {
		if con.normalize().is_err() {
			let _ = self.overflow_unsat(db);
			return;
		}
		if let [view] = *con.views() {
			let pos = self.vc.restrictor(view).count_le(con.rhs());
			let size = self.vc.domain_size(view);
			if pos == 0 {
				let fl = db.false_lit();
				let _ = db.equate(lit, fl);
			} else if pos == size {
				let tl = db.true_lit();
				let _ = db.equate(lit, tl);
			} else if !self.vc.set_le_lit(db, view, pos - 1, lit) {
				self.failed = true;
			}
			return;
		}
		let neg = con.negated_le();
		self.post_le_imp(db, lit, con);
		self.post_le_imp(db, !lit, neg);
	}

	/// Record the forward implication `lit → con` for dynamic propagation.
	fn post_le_imp(&mut self, db: &mut dyn ClauseDatabase, lit: Lit, mut con: LinearConstraint) {
		if con.normalize().is_err() {
			let _ = self.overflow_unsat(db);
			return;
		}
		debug_assert_eq!(con.relation(), Relation::Le);
		if con.views().is_empty() {
			if con.rhs() < 0 {
				let _ = db.add_clause(&[!lit]);
			}
			return;
		}
		self.constraints
			.push(ReifiedLinearConstraint::new(lit, con, Direction::Fwd));
	}

	/// Apply a `&dom` atom directly to the variable store.
	pub fn add_dom(
		&mut self,
		db: &mut dyn ClauseDatabase,
		set: &IntSetVal,
		var: &str,
	) -> Result<(), TheoryError> {
		let view = self.var(var);
		let _ = self.dom_declared.insert(var.to_owned());
		let dom = Domain::from_set(set);
		if dom.is_empty() {
			self.failed = true;
			let fl = db.false_lit();
			let _ = db.add_clause(&[fl]);
			return Ok(());
		}
		match self.vc.intersect_view(db, view, dom) {
			Ok(true) => {}
			Ok(false) => self.failed = true,
			Err(Overflow) => {
				let _ = self.overflow_unsat(db);
			}
		}
		Ok(())
	}

	/// Queue a `&distinct` atom for decomposition.
	fn add_distinct(
		&mut self,
		lit: Lit,
		elements: Vec<TheoryElement>,
	) -> Result<(), TheoryError> {
		let views = elements
			.iter()
			.map(|e| self.affine_view(&e.terms))
			.collect::<Result<Vec<_>, _>>()?;
		self.distincts.push((lit, views));
		Ok(())
	}

	/// Record the objective terms of a `&minimize` atom.
	fn add_minimize(&mut self, elements: Vec<TheoryElement>) -> Result<(), TheoryError> {
		for e in &elements {
			if !self.minimize_seen.insert((e.priority, e.tuple.clone())) {
				return Err(TheoryError::DuplicateMinimize);
			}
			let view = self.affine_view(&e.terms)?;
			self.minimize.push((view, e.priority));
		}
		Ok(())
	}

	/// Interpret a flattened expression as a single affine view.
	fn affine_view(&mut self, terms: &[TheoryTerm]) -> Result<View, TheoryError> {
		let mut view: Option<View> = None;
		let mut offset: i64 = 0;
		for t in terms {
			match &t.var {
				None => offset += t.coef,
				Some(name) => {
					if view.is_some() {
						return Err(TheoryError::NonIntegerExpression);
					}
					let coef =
						IntVal::try_from(t.coef).map_err(|_| TheoryError::NonIntegerExpression)?;
					let coef =
						NonZeroIntVal::new(coef).ok_or(TheoryError::NonIntegerExpression)?;
					view = Some(self.var(name) * coef);
				}
			}
		}
		let view = view.ok_or(TheoryError::NonIntegerExpression)?;
		let offset = IntVal::try_from(offset).map_err(|_| TheoryError::NonIntegerExpression)?;
		Ok(view + offset)
	}

	/// Emit a unit conflict for an overflowing construction, with a warning.
	/// Always returns `true` so callers can record the failure and continue.
	fn overflow_unsat(&mut self, db: &mut dyn ClauseDatabase) -> bool {
		warn!("integer overflow while grounding constraints, forcing unsatisfiability");
		eprintln!("warning: constraint exceeds the representable integer range");
		self.failed = true;
		let fl = db.false_lit();
		let _ = db.add_clause(&[fl]);
		true
	}

	/// Finish grounding: clamp unrestricted variables, decompose `distinct`,
	/// unfold eligible constraints, create the configured order and equality
	/// literals, and hand everything to the search-time driver.
	pub fn finish(mut self, db: &mut dyn ClauseDatabase) -> Result<OrderPropagator, TheoryError> {
		// Unrestricted variables keep the full safe window, with a warning.
		for (name, view) in &self.names {
			if !self.dom_declared.contains(name) {
				let dom = self.vc.domain(view.var);
				if dom.lower() == Domain::MIN || dom.upper() == Domain::MAX {
					warn!(
						var = name.as_str(),
						lo = Domain::MIN,
						up = Domain::MAX,
						"variable has an unrestricted bound, clamped to the safe range"
					);
				}
			}
		}

		let distincts = std::mem::take(&mut self.distincts);
		for (lit, views) in distincts {
			match translate_distinct(db, &mut self.vc, lit, &views, &self.config, &mut self.constraints)
			{
				Ok(true) => {}
				Ok(false) => self.failed = true,
				Err(Overflow) => {
					let _ = self.overflow_unsat(db);
				}
			}
		}
		if !translate(db, &mut self.vc, &mut self.constraints, &self.config) {
			self.failed = true;
		}

		self.vc.create_order_literals(db);
		if self.config.explicit_binary_order_clauses && !self.vc.create_order_clauses(db) {
			self.failed = true;
		}
		if !self.vc.create_equal_clauses(db) {
			self.failed = true;
		}
		if !self.vc.restrict_domains_according_to_literals(db) {
			self.failed = true;
		}

		// Objective terms become weighted order literals: moving one step up
		// from value k-1 to k costs the difference.
		let minimize = std::mem::take(&mut self.minimize);
		for (view, priority) in minimize {
			let size = self.vc.domain_size(view);
			for pos in 1..size {
				let r = self.vc.restrictor(view);
				let weight = r.value_at(pos) - r.value_at(pos - 1);
				let ge = self.vc.ge_lit(db, view, pos);
				db.add_minimize(ge, weight, priority);
			}
		}

		let shown = self.shown_table();
		Ok(OrderPropagator::new(
			self.vc,
			self.constraints,
			self.config,
			shown,
			self.failed,
		))
	}

	/// The table of shown variables: every named variable when no `&show`
	/// atom was given, the selected ones otherwise.
	fn shown_table(&self) -> Vec<(String, View)> {
		let select = |name: &str| -> bool {
			if self.shown.is_empty() {
				return true;
			}
			self.shown.iter().any(|s| match s {
				ShowSelector::Name(n) => n == name,
				ShowSelector::Signature(sym, arity) => {
					name_signature(name) == (sym.as_str(), *arity)
				}
			})
		};
		self.names
			.iter()
			.filter(|(name, _)| select(name))
			.map(|(name, &view)| (name.clone(), view))
			.collect()
	}
}

/// The value set of the elements of a `&dom` atom; every element is a value
/// or a closed range of constants.
fn dom_set(elements: &[TheoryElement]) -> Option<IntSetVal> {
	let mut ranges = Vec::new();
	for e in elements {
		match e.terms.as_slice() {
			[TheoryTerm { coef, var: None }] => ranges.push(*coef..=*coef),
			[TheoryTerm { coef: lo, var: None }, TheoryTerm { coef: up, var: None }] => {
				ranges.push(*lo..=*up);
			}
			_ => return None,
		}
	}
	ranges.sort_by_key(|r| *r.start());
	Some(IntSetVal::from_iter(ranges))
}

/// The single variable of a guard expression `1·x`, if that is its shape.
fn single_var(terms: &[TheoryTerm]) -> Option<String> {
	match terms {
		[TheoryTerm {
			coef: 1,
			var: Some(name),
		}] => Some(name.clone()),
		_ => None,
	}
}

/// Interpret a `&show` element as a selector: `name/arity` signatures come
/// in as a tuple, plain names as a single term.
fn show_selector(e: &TheoryElement) -> Result<ShowSelector, TheoryError> {
	match e.terms.as_slice() {
		[TheoryTerm {
			var: Some(name),
			coef: 1,
		}] => {
			if let Some((sym, arity)) = name.split_once('/') {
				let arity: usize = arity
					.parse()
					.map_err(|_| TheoryError::NonIntegerExpression)?;
				Ok(ShowSelector::Signature(sym.to_owned(), arity))
			} else {
				Ok(ShowSelector::Name(name.clone()))
			}
		}
		_ => Err(TheoryError::NonIntegerExpression),
	}
}

/// The symbol and arity of a variable name like `p(1,2)`.
fn name_signature(name: &str) -> (&str, usize) {
	match name.split_once('(') {
		Some((sym, rest)) => {
			let args = rest.trim_end_matches(')');
			let arity = if args.is_empty() {
				0
			} else {
				args.chars().filter(|&c| c == ',').count() + 1
			};
			(sym, arity)
		}
		None => (name, 0),
	}
}
