//! Module containing the compile-time translator: reified linear constraints
//! whose enumeration stays below a configured budget are unfolded into
//! equivalent clauses and removed from dynamic propagation. The same
//! machinery decomposes `distinct` atoms.

use itertools::Itertools;
use tracing::debug;

use crate::{
	constraint::{Direction, LinearConstraint, Relation, ReifiedLinearConstraint},
	host::{ClauseDatabase, Lit},
	storage::VariableCreator,
	view::View,
	Clause, Config, Overflow,
};

/// Unfold every constraint eligible under `translate_constraints` into
/// clauses, removing it from `constraints`. Returns `false` when clause
/// addition makes the problem trivially unsatisfiable.
pub fn translate(
	db: &mut dyn ClauseDatabase,
	vc: &mut VariableCreator,
	constraints: &mut Vec<ReifiedLinearConstraint>,
	config: &Config,
) -> bool {
	let budget = config.translate_constraints;
	let before = constraints.len();
	let mut i = 0;
	while i < constraints.len() {
		let eligible = constraints[i]
			.con
			.unfolding_within(|v| vc.domain_size(v), budget);
		if eligible {
			let rl = constraints.swap_remove(i);
			if !db.is_fact_false(rl.lit) && !translate_implication(db, vc, rl.lit, &rl.con) {
				return false;
			}
		} else {
			i += 1;
		}
	}
	debug!(
		unfolded = before - constraints.len(),
		remaining = constraints.len(),
		"translated constraints"
	);
	true
}

/// Emit a clause set equivalent to `lit → con`.
///
/// The views are enumerated with the smallest domain last; for each prefix
/// assignment the last view contributes a single upper-bound literal, and
/// branches whose running sum can no longer violate the constraint are
/// pruned.
fn translate_implication(
	db: &mut dyn ClauseDatabase,
	vc: &mut VariableCreator,
	lit: Lit,
	con: &LinearConstraint,
) -> bool {
	debug_assert_eq!(con.relation(), Relation::Le);
	let mut views: Vec<View> = con.views().to_vec();
	if views.is_empty() {
		if con.rhs() < 0 {
			return db.add_clause(&[!lit]);
		}
		return true;
	}
	views.sort_by_key(|&v| std::cmp::Reverse(vc.domain_size(v)));

	// subsums[i] holds the minimal and maximal value the views from i
	// onwards can contribute.
	let mut subsums = vec![(0_i64, 0_i64); views.len() + 1];
	for i in (0..views.len()).rev() {
		let r = vc.restrictor(views[i]);
		subsums[i] = (subsums[i + 1].0 + r.lower(), subsums[i + 1].1 + r.upper());
	}

	let mut clause: Clause = vec![!lit];
	rec_trans(db, vc, con.rhs(), &views, &subsums, &mut clause, 0, 0)
}

/// One level of the unfolding enumeration: pick increasingly large values
/// for `views[index]` and either recurse or close a clause.
#[allow(clippy::too_many_arguments, reason = "plain recursion state")]
fn rec_trans(
	db: &mut dyn ClauseDatabase,
	vc: &mut VariableCreator,
	rhs: i64,
	views: &[View],
	subsums: &[(i64, i64)],
	clause: &mut Clause,
	current: i64,
	index: usize,
) -> bool {
	let view = views[index];
	let (begin, end) = {
		let lr = vc.restrictor(view);
		// First value whose choice can still violate the constraint given
		// the largest possible remainder.
		(lr.count_le(rhs - subsums[index + 1].1 - current), lr.size())
	};
	for pos in begin..end {
		let val = vc.restrictor(view).value_at(pos);
		let ge = vc.ge_lit(db, view, pos);
		clause.push(!ge);
		if current + val + subsums[index + 1].0 <= rhs {
			if !rec_trans(db, vc, rhs, views, subsums, clause, current + val, index + 1) {
				return false;
			}
			let _ = clause.pop();
		} else {
			let ok = db.add_clause(clause);
			let _ = clause.pop();
			return ok;
		}
	}
	true
}

/// Decompose `lit → distinct(views)`.
///
/// The default decomposition posts, per pair of views, a fresh literal
/// choosing which of the two strict orders holds. With `distinct_to_card`
/// and a fact atom, one at-most-one group per domain value is used instead;
/// the `dom_size` budget bounds the per-view value iteration this requires.
pub fn translate_distinct(
	db: &mut dyn ClauseDatabase,
	vc: &mut VariableCreator,
	lit: Lit,
	views: &[View],
	config: &Config,
	out: &mut Vec<ReifiedLinearConstraint>,
) -> Result<bool, Overflow> {
	let within_budget = config.dom_size == -1
		|| views
			.iter()
			.all(|&v| vc.domain_size(v) as i64 <= config.dom_size);
	if config.distinct_to_card && db.is_fact_true(lit) && within_budget {
		return distinct_by_cardinality(db, vc, views);
	}
	for (i, &a) in views.iter().enumerate() {
		for &b in &views[i + 1..] {
			let less = db.new_lit();
			let greater = db.new_lit();
			if !db.add_clause(&[!lit, less, greater]) {
				return Ok(false);
			}
			let mut lt = LinearConstraint::new(vec![a, -b], Relation::Lt, 0);
			lt.normalize()?;
			let mut gt = LinearConstraint::new(vec![b, -a], Relation::Lt, 0);
			gt.normalize()?;
			// full equivalences keep the choice literals determined by the
			// integer assignment
			push_imp(db, out, !less, lt.negated_le());
			push_imp(db, out, less, lt);
			push_imp(db, out, !greater, gt.negated_le());
			push_imp(db, out, greater, gt);
		}
	}
	Ok(true)
}

/// Record the implication `lit → con`, reducing a constraint without views
/// to a unit clause.
fn push_imp(
	db: &mut dyn ClauseDatabase,
	out: &mut Vec<ReifiedLinearConstraint>,
	lit: Lit,
	con: LinearConstraint,
) {
	if con.views().is_empty() {
		if con.rhs() < 0 {
			let _ = db.add_clause(&[!lit]);
		}
		return;
	}
	out.push(ReifiedLinearConstraint::new(lit, con, Direction::Fwd));
}

/// Cardinality decomposition of a fact `distinct`: for every value of the
/// union of the domains, at most one view takes it.
fn distinct_by_cardinality(
	db: &mut dyn ClauseDatabase,
	vc: &mut VariableCreator,
	views: &[View],
) -> Result<bool, Overflow> {
	let values: Vec<i64> = views
		.iter()
		.flat_map(|&v| vc.restrictor(v).values().collect::<Vec<_>>())
		.sorted()
		.dedup()
		.collect();
	let fl = db.false_lit();
	for val in values {
		let holders: Vec<Lit> = views
			.iter()
			.map(|&v| vc.equal_lit(db, v, val))
			.filter(|&l| l != fl)
			.collect();
		if holders.len() > 1 && !db.at_most_one(&holders) {
			return Ok(false);
		}
	}
	Ok(true)
}

#[cfg(test)]
mod tests {
	use crate::{
		constraint::{Direction, LinearConstraint, Relation, ReifiedLinearConstraint},
		domain::Domain,
		host::ClauseDatabase,
		storage::VariableCreator,
		tests::GroundDb,
		translate::translate,
		Config,
	};

	#[test]
	fn test_small_constraint_is_unfolded() {
		let mut db = GroundDb::new();
		let mut vc = VariableCreator::new(Config::default(), db.true_lit_for_tests());
		let x = vc.create_view(Domain::new(0, 2)).unwrap();
		let y = vc.create_view(Domain::new(0, 2)).unwrap();
		let lit = db.new_lit();
		let mut con = LinearConstraint::new(vec![x, y], Relation::Le, 2);
		con.normalize().unwrap();
		let mut constraints = vec![ReifiedLinearConstraint::new(lit, con, Direction::Fwd)];
		let config = Config {
			translate_constraints: 10,
			..Config::default()
		};
		assert!(translate(&mut db, &mut vc, &mut constraints, &config));
		assert!(constraints.is_empty());
		assert!(db.num_clauses() > 0);
	}

	#[test]
	fn test_large_constraint_is_kept() {
		let mut db = GroundDb::new();
		let mut vc = VariableCreator::new(Config::default(), db.true_lit_for_tests());
		let x = vc.create_view(Domain::new(0, 100)).unwrap();
		let y = vc.create_view(Domain::new(0, 100)).unwrap();
		let lit = db.new_lit();
		let mut con = LinearConstraint::new(vec![x, y], Relation::Le, 150);
		con.normalize().unwrap();
		let mut constraints = vec![ReifiedLinearConstraint::new(lit, con, Direction::Fwd)];
		let config = Config {
			translate_constraints: 10,
			..Config::default()
		};
		assert!(translate(&mut db, &mut vc, &mut constraints, &config));
		assert_eq!(constraints.len(), 1);
	}
}
