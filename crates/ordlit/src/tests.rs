//! Shared test infrastructure: a small chronological-backtracking DPLL
//! solver that implements the host callback surface and enumerates all
//! models, driving the theory propagator exactly like a CDCL host would
//! (watched-literal spans, level-wise undo, checks on total assignments).

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
	host::{
		Assignment, ClauseDatabase, Lit, PropagateControl, PropagateInit, Propagator, Var,
	},
	Clause, IntVal, OrderPropagator,
};

/// A model found by [`TestSolver::solve_all`]: the shown integer values and
/// the objective per priority level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Model {
	/// Shown integer variable values, sorted by name.
	pub(crate) ints: Vec<(String, IntVal)>,
	/// Objective value per priority level.
	pub(crate) cost: BTreeMap<u32, i64>,
}

/// An [`Assignment`] over an explicit map, for driving the propagator in
/// unit tests.
#[derive(Debug, Default)]
pub(crate) struct MapAssignment(HashMap<Var, bool>);

/// The DPLL test host. Also usable as a plain ground-time clause store.
#[derive(Debug)]
pub(crate) struct TestSolver {
	/// Assigned values, indexed by variable code (entry 0 unused).
	values: Vec<Option<bool>>,
	/// All clauses, ground and learned alike.
	clauses: Vec<Clause>,
	/// Literals the theory propagator watches.
	watches: HashSet<Lit>,
	/// The assignment trail.
	trail: Vec<Lit>,
	/// Trail length at the start of each decision level.
	trail_lim: Vec<usize>,
	/// The decision literal of each level and whether both phases were
	/// tried.
	decisions: Vec<(Lit, bool)>,
	/// Whether the theory saw each level (and thus gets an undo call).
	theory_touched: Vec<bool>,
	/// How many trail literals have been delivered to the theory.
	delivered: usize,
	/// Conflict raised by a theory callback.
	conflict: bool,
	/// The problem is unsatisfiable at the root.
	unsat: bool,
	/// Weighted objective literals, `(lit, weight, priority)`.
	minimize: Vec<(Lit, i64, u32)>,
	/// Literals assigned through `propagate_lit`.
	propagated: Vec<Lit>,
}

/// Convenient alias for tests that only need the ground-time interface.
pub(crate) type GroundDb = TestSolver;

impl MapAssignment {
	/// Record the truth value of a literal.
	pub(crate) fn assign(&mut self, lit: Lit, value: bool) {
		let value = if lit.is_negated() { !value } else { value };
		let _ = self.0.insert(lit.var(), value);
	}
}

impl Assignment for MapAssignment {
	fn is_true(&self, lit: Lit) -> bool {
		self.0
			.get(&lit.var())
			.is_some_and(|&v| v == !lit.is_negated())
	}
}

impl TestSolver {
	/// Create a solver whose variable 1 is the always-true literal.
	pub(crate) fn new() -> Self {
		let mut slv = Self {
			values: vec![None, Some(true)],
			clauses: Vec::new(),
			watches: HashSet::new(),
			trail: Vec::new(),
			trail_lim: Vec::new(),
			decisions: Vec::new(),
			theory_touched: Vec::new(),
			delivered: 0,
			conflict: false,
			unsat: false,
			minimize: Vec::new(),
			propagated: Vec::new(),
		};
		slv.trail.push(slv.true_lit_for_tests());
		slv
	}

	/// The always-true literal, without needing the trait in scope.
	pub(crate) fn true_lit_for_tests(&self) -> Lit {
		Lit::positive(Var::new(1))
	}

	/// The always-false literal, without needing the trait in scope.
	pub(crate) fn false_lit_for_tests(&self) -> Lit {
		!self.true_lit_for_tests()
	}

	/// Whether the exact clause has been added.
	pub(crate) fn clauses_contain(&self, clause: &[Lit]) -> bool {
		self.clauses.iter().any(|c| c == clause)
	}

	/// The number of stored clauses.
	pub(crate) fn num_clauses(&self) -> usize {
		self.clauses.len()
	}

	/// The literals assigned by the theory through `propagate_lit`.
	pub(crate) fn propagated_lits(&self) -> &[Lit] {
		&self.propagated
	}

	/// State that at most one of `lits` may be true (helper for tests
	/// encoding Boolean cardinality directly).
	pub(crate) fn add_at_most_one(&mut self, lits: &[Lit]) {
		let lits = lits.to_vec();
		let _ = ClauseDatabase::at_most_one(self, &lits);
	}

	/// Truth value of a literal under the current assignment.
	fn value(&self, lit: Lit) -> Option<bool> {
		self.values[i32::from(lit.var()) as usize].map(|v| v != lit.is_negated())
	}

	/// Record an assignment on the trail.
	fn assign(&mut self, lit: Lit) {
		debug_assert!(self.value(lit).is_none());
		self.values[i32::from(lit.var()) as usize] = Some(!lit.is_negated());
		self.trail.push(lit);
	}

	/// Open a new decision level on `lit`.
	fn decide(&mut self, lit: Lit, flipped: bool) {
		self.trail_lim.push(self.trail.len());
		self.theory_touched.push(false);
		self.decisions.push((lit, flipped));
		self.assign(lit);
	}

	/// Undo the innermost decision level, notifying the theory if it saw
	/// the level.
	fn undo_level(&mut self, theory: &mut OrderPropagator) {
		let lim = self.trail_lim.pop().unwrap();
		let touched = self.theory_touched.pop().unwrap();
		for l in self.trail.split_off(lim) {
			self.values[i32::from(l.var()) as usize] = None;
		}
		self.delivered = self.delivered.min(self.trail.len());
		if touched {
			theory.undo(self, &[]);
		}
	}

	/// Backtrack to the most recent decision with an untried phase and take
	/// it. Returns `false` when the search space is exhausted.
	fn next_branch(&mut self, theory: &mut OrderPropagator) -> bool {
		while let Some((dlit, flipped)) = self.decisions.pop() {
			self.undo_level(theory);
			if !flipped {
				self.decide(!dlit, true);
				return true;
			}
		}
		false
	}

	/// Run Boolean unit propagation and theory propagation to fixpoint.
	/// Returns `false` on conflict.
	fn propagate_all(&mut self, theory: &mut OrderPropagator) -> bool {
		loop {
			if self.unsat {
				return false;
			}
			if self.conflict {
				self.conflict = false;
				return false;
			}
			// One pass of unit propagation over all clauses.
			let mut progress = false;
			for ci in 0..self.clauses.len() {
				let mut unknown = None;
				let mut n_unknown = 0;
				let mut satisfied = false;
				for i in 0..self.clauses[ci].len() {
					let l = self.clauses[ci][i];
					match self.value(l) {
						Some(true) => {
							satisfied = true;
							break;
						}
						Some(false) => {}
						None => {
							unknown = Some(l);
							n_unknown += 1;
						}
					}
				}
				if satisfied {
					continue;
				}
				match n_unknown {
					0 => return false,
					1 => {
						self.assign(unknown.unwrap());
						progress = true;
					}
					_ => {}
				}
			}
			if progress {
				continue;
			}
			// Deliver newly assigned watched literals to the theory.
			let pending: Vec<Lit> = self.trail[self.delivered..]
				.iter()
				.copied()
				.filter(|l| self.watches.contains(l))
				.collect();
			self.delivered = self.trail.len();
			if !pending.is_empty() {
				if let Some(t) = self.theory_touched.last_mut() {
					*t = true;
				}
				theory.propagate(self, &pending);
				continue;
			}
			return true;
		}
	}

	/// Enumerate every model of the clauses and the theory, under the given
	/// assumptions. Models are deduplicated on their shown integer values.
	pub(crate) fn solve_all(
		&mut self,
		theory: &mut OrderPropagator,
		assumptions: &[Lit],
	) -> Vec<Model> {
		let mut found: BTreeMap<Vec<(String, IntVal)>, BTreeMap<u32, i64>> = BTreeMap::new();
		if self.unsat {
			return Vec::new();
		}
		theory.init(self);
		for &a in assumptions {
			match self.value(a) {
				Some(false) => return Vec::new(),
				Some(true) => {}
				None => self.assign(a),
			}
		}
		loop {
			if !self.propagate_all(theory) {
				if self.trail_lim.is_empty() || !self.next_branch(theory) {
					break;
				}
				continue;
			}
			// Branch on the most recently created unassigned variable; order
			// and split literals then come before auxiliary choices, which
			// keeps the search close to integer labelling.
			if let Some(v) = (1..self.values.len())
				.rev()
				.find(|&i| self.values[i].is_none())
			{
				self.decide(Lit::positive(Var::new(v as i32)), false);
				continue;
			}
			// Total assignment: let the theory inspect it.
			let vars_before = self.values.len();
			let clauses_before = self.clauses.len();
			let trail_before = self.trail.len();
			if let Some(t) = self.theory_touched.last_mut() {
				*t = true;
			}
			theory.check(self);
			if self.conflict {
				self.conflict = false;
				if !self.next_branch(theory) {
					break;
				}
				continue;
			}
			if self.values.len() != vars_before
				|| self.clauses.len() != clauses_before
				|| self.trail.len() != trail_before
			{
				continue;
			}
			// A model: record it and backtrack for the next one.
			let ints: Vec<(String, IntVal)> = theory.model_values(0).into_iter().collect();
			let mut cost: BTreeMap<u32, i64> = BTreeMap::new();
			for &(l, w, p) in &self.minimize {
				let e = cost.entry(p).or_insert(0);
				if self.value(l) == Some(true) {
					*e += w;
				}
			}
			let _ = found.insert(ints, cost);
			if !self.next_branch(theory) {
				break;
			}
		}
		found
			.into_iter()
			.map(|(ints, cost)| Model { ints, cost })
			.collect()
	}
}

impl Assignment for TestSolver {
	fn is_true(&self, lit: Lit) -> bool {
		self.value(lit) == Some(true)
	}
}

impl ClauseDatabase for TestSolver {
	fn true_lit(&self) -> Lit {
		self.true_lit_for_tests()
	}

	fn new_lit(&mut self) -> Lit {
		self.values.push(None);
		Lit::positive(Var::new(self.values.len() as i32 - 1))
	}

	fn add_clause(&mut self, lits: &[Lit]) -> bool {
		let falsified = lits.iter().all(|&l| self.value(l) == Some(false));
		self.clauses.push(lits.to_vec());
		if falsified {
			if self.trail_lim.is_empty() {
				self.unsat = true;
			} else {
				self.conflict = true;
			}
			return false;
		}
		true
	}

	fn add_minimize(&mut self, lit: Lit, weight: i64, priority: u32) {
		self.minimize.push((lit, weight, priority));
	}

	fn is_fact_true(&self, lit: Lit) -> bool {
		lit == self.true_lit()
			|| (self.trail_lim.is_empty() && self.value(lit) == Some(true))
	}

	fn is_fact_false(&self, lit: Lit) -> bool {
		self.is_fact_true(!lit)
	}
}

impl PropagateInit for TestSolver {
	fn add_watch(&mut self, lit: Lit) {
		let _ = self.watches.insert(lit);
	}
}

impl PropagateControl for TestSolver {
	fn thread_id(&self) -> usize {
		0
	}

	fn decision_level(&self) -> u32 {
		self.trail_lim.len() as u32
	}

	fn assignment(&self) -> &dyn Assignment {
		self
	}

	fn add_literal(&mut self) -> Lit {
		ClauseDatabase::new_lit(self)
	}

	fn add_watch(&mut self, lit: Lit) {
		let _ = self.watches.insert(lit);
	}

	fn add_clause(&mut self, lits: &[Lit]) -> bool {
		ClauseDatabase::add_clause(self, lits)
	}

	fn propagate_lit(&mut self, lit: Lit) -> bool {
		match self.value(lit) {
			Some(true) => true,
			Some(false) => {
				self.conflict = true;
				false
			}
			None => {
				self.assign(lit);
				self.propagated.push(lit);
				true
			}
		}
	}
}

/// Render a model set the way the host application prints answers: one line
/// per model, `name=value` pairs sorted by name.
pub(crate) fn render(models: &[Model]) -> String {
	let mut lines: Vec<String> = models
		.iter()
		.map(|m| {
			m.ints
				.iter()
				.map(|(n, v)| format!("{n}={v}"))
				.collect::<Vec<_>>()
				.join(" ")
		})
		.collect();
	lines.sort();
	lines.join("\n")
}

#[cfg(test)]
mod scenarios {
	use expect_test::expect;
	use tracing_test::traced_test;

	use crate::{
		constraint::{Direction, Relation},
		host::{ClauseDatabase, Lit, Propagator},
		tests::{render, Model, TestSolver},
		theory::{TheoryBuilder, TheoryElement, TheoryTerm},
		Config, IntSetVal, OrderPropagator, PropStrength,
	};

	/// A term `coef·var`.
	fn term(coef: i64, var: &str) -> TheoryTerm {
		TheoryTerm {
			coef,
			var: Some(var.to_owned()),
		}
	}

	/// A constant term.
	fn cons(coef: i64) -> TheoryTerm {
		TheoryTerm { coef, var: None }
	}

	/// An element without tuple or condition.
	fn elem(terms: Vec<TheoryTerm>) -> TheoryElement {
		TheoryElement {
			terms,
			tuple: Vec::new(),
			condition: None,
			priority: 0,
		}
	}

	/// Post the fact `Σ terms rel rhs`.
	fn fact_sum(
		slv: &mut TestSolver,
		b: &mut TheoryBuilder,
		terms: Vec<TheoryTerm>,
		rel: Relation,
		rhs: i64,
	) {
		let t = slv.true_lit();
		b.add_sum(slv, t, vec![elem(terms)], rel, vec![cons(rhs)], Direction::Eq)
			.unwrap();
	}

	/// The SEND+MORE=MONEY puzzle over the given configuration.
	fn money(config: Config) -> (TestSolver, OrderPropagator) {
		let mut slv = TestSolver::new();
		let mut b = TheoryBuilder::new(config, slv.true_lit());
		let letters = ["s", "e", "n", "d", "m", "o", "r", "y"];
		for l in letters {
			b.add_dom(&mut slv, &IntSetVal::from(0..=9), l).unwrap();
		}
		let t = slv.true_lit();
		b.add_sum(
			&mut slv,
			t,
			vec![
				elem(vec![term(1000, "s"), term(100, "e"), term(10, "n"), term(1, "d")]),
				elem(vec![term(1000, "m"), term(100, "o"), term(10, "r"), term(1, "e")]),
			],
			Relation::Eq,
			vec![
				term(10000, "m"),
				term(1000, "o"),
				term(100, "n"),
				term(10, "e"),
				term(1, "y"),
			],
			Direction::Eq,
		)
		.unwrap();
		fact_sum(&mut slv, &mut b, vec![term(1, "m")], Relation::Ne, 0);
		b.add_atom(
			&mut slv,
			"distinct",
			t,
			letters.iter().map(|&l| elem(vec![term(1, l)])).collect(),
			None,
		)
		.unwrap();
		let theory = b.finish(&mut slv).unwrap();
		(slv, theory)
	}

	#[test]
	#[traced_test]
	fn test_send_more_money() {
		let (mut slv, mut theory) = money(Config::default());
		let models = slv.solve_all(&mut theory, &[]);
		expect![[r#"d=7 e=5 m=1 n=6 o=0 r=8 s=9 y=2"#]].assert_eq(&render(&models));
		assert!(theory.statistics(0).propagations() > 0);
	}

	#[test]
	fn test_send_more_money_config_variants() {
		let reference = {
			let (mut slv, mut theory) = money(Config::default());
			render(&slv.solve_all(&mut theory, &[]))
		};
		let variants = [
			Config {
				translate_constraints: 0,
				..Config::default()
			},
			Config {
				explicit_binary_order_clauses: false,
				min_lits_per_var: 3,
				..Config::default()
			},
			Config {
				learn_clauses: false,
				..Config::default()
			},
			Config {
				prop_strength: PropStrength::ForceReify,
				..Config::default()
			},
		];
		for config in variants {
			let (mut slv, mut theory) = money(config);
			assert_eq!(
				render(&slv.solve_all(&mut theory, &[])),
				reference,
				"diverging result for {config:?}"
			);
		}
	}

	/// The bin-packing instance: three bins with capacities 10, 7, and 5,
	/// items of sizes 3, 5, 4, 3, and 2, minimizing the number of used bins.
	/// Returns the solver, the theory, and the `packed(item, bin)` and
	/// `used(bin)` literals.
	#[allow(clippy::type_complexity, reason = "test fixture")]
	fn packing() -> (TestSolver, OrderPropagator, Vec<Vec<Lit>>, Vec<Lit>) {
		let caps = [10, 7, 5];
		let sizes = [3, 5, 4, 3, 2];
		let mut slv = TestSolver::new();
		let mut b = TheoryBuilder::new(Config::default(), slv.true_lit());
		let packed: Vec<Vec<Lit>> = (0..sizes.len())
			.map(|_| (0..caps.len()).map(|_| slv.new_lit()).collect())
			.collect();
		let used: Vec<Lit> = (0..caps.len()).map(|_| slv.new_lit()).collect();
		for row in &packed {
			// every item is packed into exactly one bin
			assert!(slv.add_clause(row));
			slv.add_at_most_one(row);
		}
		for (i, &size) in sizes.iter().enumerate() {
			for (j, _) in caps.iter().enumerate() {
				let load = format!("load({},{})", i + 1, j + 1);
				b.add_dom(&mut slv, &IntSetVal::from(0..=size), &load)
					.unwrap();
				b.add_sum(
					&mut slv,
					packed[i][j],
					vec![elem(vec![term(1, &load)])],
					Relation::Eq,
					vec![cons(size)],
					Direction::Fwd,
				)
				.unwrap();
				b.add_sum(
					&mut slv,
					!packed[i][j],
					vec![elem(vec![term(1, &load)])],
					Relation::Eq,
					vec![cons(0)],
					Direction::Fwd,
				)
				.unwrap();
				// a packed item marks its bin as used
				assert!(slv.add_clause(&[!packed[i][j], used[j]]));
			}
		}
		for (j, &cap) in caps.iter().enumerate() {
			let loads = (0..sizes.len())
				.map(|i| term(1, &format!("load({},{})", i + 1, j + 1)))
				.collect();
			fact_sum(&mut slv, &mut b, loads, Relation::Le, cap);
			// an unused bin holds no item
			let mut holders: Vec<Lit> = vec![!used[j]];
			holders.extend((0..sizes.len()).map(|i| packed[i][j]));
			assert!(slv.add_clause(&holders));
			slv.add_minimize(used[j], 1, 0);
		}
		let theory = b.finish(&mut slv).unwrap();
		(slv, theory, packed, used)
	}

	/// The optimum over priority level 0 of a model set.
	fn optimum(models: &[Model]) -> Option<i64> {
		models.iter().map(|m| m.cost[&0]).min()
	}

	#[test]
	fn test_bin_packing_optimum() {
		let (mut slv, mut theory, _, _) = packing();
		let models = slv.solve_all(&mut theory, &[]);
		assert!(!models.is_empty());
		assert_eq!(optimum(&models), Some(2));
	}

	#[test]
	fn test_bin_packing_assumptions() {
		// forcing items 4 and 1 into bin 1 keeps the optimum at two bins,
		// so requiring a single used bin is unsatisfiable
		let (mut slv, mut theory, packed, used) = packing();
		slv.add_at_most_one(&used);
		let models = slv.solve_all(&mut theory, &[packed[3][0], packed[0][0]]);
		assert!(models.is_empty());
	}

	#[test]
	fn test_bin_packing_overfull_assumptions() {
		// items 1 and 2 together exceed the smallest bin
		let (mut slv, mut theory, packed, _) = packing();
		let models = slv.solve_all(&mut theory, &[packed[0][2], packed[1][2]]);
		assert!(models.is_empty());
	}

	/// The two-machine flow-shop instance with tasks a, b, and c, durations
	/// `[[3,4],[1,6],[5,5]]`, a makespan bound of 16, and start-time domains
	/// clamped to `lo..=hi`.
	fn flow_shop(lo: i64, hi: i64) -> (TestSolver, OrderPropagator) {
		let tasks = ["a", "b", "c"];
		let dur = [[3, 4], [1, 6], [5, 5]];
		let bound = 16;
		let mut slv = TestSolver::new();
		let mut b = TheoryBuilder::new(Config::default(), slv.true_lit());
		for (t, d) in tasks.iter().zip(dur) {
			for m in 0..2 {
				let start = format!("({t},{})", m + 1);
				b.add_dom(&mut slv, &IntSetVal::from(lo..=hi), &start).unwrap();
				// every task finishes within the makespan bound
				fact_sum(
					&mut slv,
					&mut b,
					vec![term(1, &start)],
					Relation::Le,
					bound - d[m],
				);
			}
			// the second machine starts after the first finished
			fact_sum(
				&mut slv,
				&mut b,
				vec![term(1, &format!("({t},1)")), term(-1, &format!("({t},2)"))],
				Relation::Le,
				-d[0],
			);
		}
		// one selector per processing order, exactly one holds
		let orders = [
			[0, 1, 2],
			[0, 2, 1],
			[1, 0, 2],
			[1, 2, 0],
			[2, 0, 1],
			[2, 1, 0],
		];
		let selectors: Vec<Lit> = orders.iter().map(|_| slv.new_lit()).collect();
		assert!(slv.add_clause(&selectors));
		slv.add_at_most_one(&selectors);
		for (perm, &sel) in orders.iter().zip(&selectors) {
			for w in perm.windows(2) {
				let (t1, t2) = (w[0], w[1]);
				for m in 0..2 {
					b.add_sum(
						&mut slv,
						sel,
						vec![elem(vec![
							term(1, &format!("({},{})", tasks[t1], m + 1)),
							term(-1, &format!("({},{})", tasks[t2], m + 1)),
						])],
						Relation::Le,
						vec![cons(-dur[t1][m])],
						Direction::Fwd,
					)
					.unwrap();
				}
			}
		}
		let theory = b.finish(&mut slv).unwrap();
		(slv, theory)
	}

	#[test]
	fn test_flow_shop_tight() {
		let (mut slv, mut theory) = flow_shop(0, 11);
		let models = slv.solve_all(&mut theory, &[]);
		expect![[r#"
		    (a,1)=1 (a,2)=7 (b,1)=0 (b,2)=1 (c,1)=4 (c,2)=11
		    (a,1)=1 (a,2)=7 (b,1)=0 (b,2)=1 (c,1)=5 (c,2)=11
		    (a,1)=1 (a,2)=7 (b,1)=0 (b,2)=1 (c,1)=6 (c,2)=11
		    (a,1)=2 (a,2)=7 (b,1)=0 (b,2)=1 (c,1)=5 (c,2)=11
		    (a,1)=2 (a,2)=7 (b,1)=0 (b,2)=1 (c,1)=6 (c,2)=11
		    (a,1)=3 (a,2)=7 (b,1)=0 (b,2)=1 (c,1)=6 (c,2)=11"#]]
		.assert_eq(&render(&models));
	}

	#[test]
	fn test_flow_shop_infeasible() {
		let (mut slv, mut theory) = flow_shop(0, 10);
		assert!(slv.solve_all(&mut theory, &[]).is_empty());
	}

	#[test]
	fn test_flow_shop_wide() {
		let (mut slv, mut theory) = flow_shop(0, 20);
		assert_eq!(slv.solve_all(&mut theory, &[]).len(), 13);
	}

	#[test]
	fn test_simple_range() {
		// x > 0 and x < 3 with no declared domain: the store clamps x to
		// the safe window and the constraints leave 1 and 2
		let mut slv = TestSolver::new();
		let mut b = TheoryBuilder::new(Config::default(), slv.true_lit());
		fact_sum(&mut slv, &mut b, vec![term(1, "x")], Relation::Gt, 0);
		fact_sum(&mut slv, &mut b, vec![term(1, "x")], Relation::Lt, 3);
		let mut theory = b.finish(&mut slv).unwrap();
		let models = slv.solve_all(&mut theory, &[]);
		expect![[r#"
		    x=1
		    x=2"#]]
		.assert_eq(&render(&models));
	}

	#[test]
	fn test_distinct_by_cardinality() {
		let config = Config {
			distinct_to_card: true,
			..Config::default()
		};
		let mut slv = TestSolver::new();
		let mut b = TheoryBuilder::new(config, slv.true_lit());
		for v in ["x", "y", "z"] {
			b.add_dom(&mut slv, &IntSetVal::from(1..=3), v).unwrap();
		}
		let t = slv.true_lit();
		b.add_atom(
			&mut slv,
			"distinct",
			t,
			["x", "y", "z"]
				.iter()
				.map(|&v| elem(vec![term(1, v)]))
				.collect(),
			None,
		)
		.unwrap();
		let mut theory = b.finish(&mut slv).unwrap();
		let models = slv.solve_all(&mut theory, &[]);
		assert_eq!(models.len(), 6);
		expect![[r#"
		    x=1 y=2 z=3
		    x=1 y=3 z=2
		    x=2 y=1 z=3
		    x=2 y=3 z=1
		    x=3 y=1 z=2
		    x=3 y=2 z=1"#]]
		.assert_eq(&render(&models));
	}

	#[test]
	fn test_overflow_reported_unsat() {
		// &dom{0..2^30} = x with 8·x ≤ 2^33: the product cannot be
		// represented, so the step must fail instead of wrapping
		let mut slv = TestSolver::new();
		let mut b = TheoryBuilder::new(Config::default(), slv.true_lit());
		b.add_dom(&mut slv, &IntSetVal::from(0..=(1_i64 << 30)), "x")
			.unwrap();
		fact_sum(
			&mut slv,
			&mut b,
			vec![term(8, "x")],
			Relation::Le,
			1_i64 << 33,
		);
		assert!(b.failed());
		let mut theory = b.finish(&mut slv).unwrap();
		assert!(theory.failed());
		assert!(slv.solve_all(&mut theory, &[]).is_empty());
	}

	#[test]
	fn test_private_reasons_are_recorded() {
		let config = Config {
			learn_clauses: false,
			translate_constraints: 0,
			..Config::default()
		};
		let mut slv = TestSolver::new();
		let mut b = TheoryBuilder::new(config, slv.true_lit());
		for v in ["x", "y"] {
			b.add_dom(&mut slv, &IntSetVal::from(0..=9), v).unwrap();
		}
		fact_sum(
			&mut slv,
			&mut b,
			vec![term(1, "x"), term(1, "y")],
			Relation::Le,
			4,
		);
		let mut theory = b.finish(&mut slv).unwrap();
		let models = slv.solve_all(&mut theory, &[]);
		// x + y <= 4 over 0..9 has 15 solutions
		assert_eq!(models.len(), 15);
		if let Some(&l) = slv.propagated_lits().first() {
			let reason = theory.reason(0, l);
			assert!(reason.contains(&l));
		}
	}

	#[test]
	fn test_minimize_weights_emitted() {
		let mut slv = TestSolver::new();
		let mut b = TheoryBuilder::new(Config::default(), slv.true_lit());
		b.add_dom(&mut slv, &IntSetVal::from(2..=5), "x").unwrap();
		let t = slv.true_lit();
		let mut e = elem(vec![term(1, "x")]);
		e.tuple = vec![0];
		e.priority = 1;
		b.add_atom(&mut slv, "minimize", t, vec![e], None).unwrap();
		let mut theory = b.finish(&mut slv).unwrap();
		// one unit-weight step literal per domain transition
		assert_eq!(slv.minimize.len(), 3);
		assert!(slv.minimize.iter().all(|&(_, w, p)| w == 1 && p == 1));
		let models = slv.solve_all(&mut theory, &[]);
		assert_eq!(models.len(), 4);
	}
}
