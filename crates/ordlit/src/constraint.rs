//! Module containing the normalized representation of linear constraints and
//! their reification.

use std::fmt::{self, Display};

use itertools::Itertools;

use crate::{helpers::gcd, host::Lit, view::View, IntVal, NonZeroIntVal, Overflow};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// The activation direction of a reified constraint.
pub enum Direction {
	/// The literal implies the constraint.
	Fwd,
	/// The constraint implies the literal.
	Bwd,
	/// Literal and constraint are equivalent.
	Eq,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A linear constraint `Σ scaleᵢ·varᵢ + offsets  relation  rhs`.
///
/// The normal form produced by [`Self::normalize`] has all view offsets
/// folded into the right hand side, at most one term per variable, views
/// sorted by variable index, and the greatest common divisor of the
/// coefficients and the right hand side factored out. The relation of a
/// normalized constraint is [`Relation::Le`], except that `=` and `≠` are
/// preserved for the theory layer to decompose.
pub struct LinearConstraint {
	/// The affine terms summed on the left hand side.
	views: Vec<View>,
	/// The relation between the sum and the right hand side.
	relation: Relation,
	/// The right hand side.
	rhs: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A linear constraint whose activation is controlled by a host literal.
pub struct ReifiedLinearConstraint {
	/// The controlling literal.
	pub lit: Lit,
	/// The controlled constraint.
	pub con: LinearConstraint,
	/// Which implication directions are enforced.
	pub direction: Direction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// A comparison relation between a linear sum and a constant.
pub enum Relation {
	/// Equal.
	Eq,
	/// Not equal.
	Ne,
	/// Strictly less than.
	Lt,
	/// Less than or equal.
	Le,
	/// Strictly greater than.
	Gt,
	/// Greater than or equal.
	Ge,
}

impl LinearConstraint {
	/// Create a (not yet normalized) linear constraint.
	pub fn new(views: Vec<View>, relation: Relation, rhs: i64) -> Self {
		Self {
			views,
			relation,
			rhs,
		}
	}

	/// The affine terms of the left hand side.
	pub fn views(&self) -> &[View] {
		&self.views
	}

	/// The relation of the constraint.
	pub fn relation(&self) -> Relation {
		self.relation
	}

	/// The right hand side of the constraint.
	pub fn rhs(&self) -> i64 {
		self.rhs
	}

	/// Bring the constraint into normal form.
	///
	/// Fails when a merged coefficient or the scaled right hand side can no
	/// longer be represented.
	pub fn normalize(&mut self) -> Result<(), Overflow> {
		// Fold the view offsets into the right hand side.
		for v in &mut self.views {
			self.rhs -= i64::from(v.offset);
			v.offset = 0;
		}

		match self.relation {
			Relation::Lt => {
				self.relation = Relation::Le;
				self.rhs -= 1;
			}
			Relation::Gt | Relation::Ge => {
				if self.relation == Relation::Gt {
					self.rhs += 1;
				}
				for v in &mut self.views {
					*v = -*v;
				}
				self.rhs = -self.rhs;
				self.relation = Relation::Le;
			}
			Relation::Le | Relation::Eq | Relation::Ne => {}
		}

		// One term per variable, sorted by variable index.
		self.views.sort_by_key(|v| v.var);
		let mut merged = Vec::with_capacity(self.views.len());
		for (var, group) in &self.views.iter().chunk_by(|v| v.var) {
			let scale: i64 = group.map(|v| i64::from(v.scale.get())).sum();
			if scale == 0 {
				continue;
			}
			let scale = IntVal::try_from(scale).map_err(|_| Overflow)?;
			merged.push(View {
				var,
				scale: NonZeroIntVal::new(scale).unwrap(),
				offset: 0,
			});
		}
		self.views = merged;

		let _ = self.factorize();
		Ok(())
	}

	/// Divide the coefficients and right hand side by their greatest common
	/// divisor, returning the factor.
	fn factorize(&mut self) -> i64 {
		let Some(first) = self.views.first() else {
			return 1;
		};
		let mut div = i64::from(first.scale.get()).abs();
		for v in &self.views {
			div = gcd(div, i64::from(v.scale.get()).abs());
			if div == 1 {
				break;
			}
		}
		if self.rhs != 0 {
			div = gcd(div, self.rhs.abs());
		}
		if div > 1 {
			for v in &mut self.views {
				v.scale = NonZeroIntVal::new(v.scale.get() / div as IntVal).unwrap();
			}
			self.rhs /= div;
		}
		div
	}

	/// The `≤` normal form of the negation of this constraint.
	///
	/// # Warning
	/// Only valid on constraints already normalized to [`Relation::Le`].
	pub fn negated_le(&self) -> Self {
		debug_assert_eq!(self.relation, Relation::Le);
		Self {
			views: self.views.iter().map(|&v| -v).collect(),
			relation: Relation::Le,
			rhs: -self.rhs - 1,
		}
	}

	/// Whether the product of the domain sizes of all views but the last is
	/// at most `budget`. A negative budget accepts every constraint.
	pub fn unfolding_within(
		&self,
		mut domain_size: impl FnMut(View) -> u64,
		budget: i64,
	) -> bool {
		if budget < 0 {
			return true;
		}
		let mut product: u64 = 1;
		for &v in self.views.iter().rev().skip(1) {
			product = product.saturating_mul(domain_size(v));
			if product > budget as u64 {
				return false;
			}
		}
		true
	}
}

impl Display for LinearConstraint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, v) in self.views.iter().enumerate() {
			if i > 0 {
				write!(f, " + ")?;
			}
			write!(f, "{}·v{}", v.scale.get(), usize::from(v.var))?;
			if v.offset != 0 {
				write!(f, "{:+}", v.offset)?;
			}
		}
		let rel = match self.relation {
			Relation::Eq => "=",
			Relation::Ne => "!=",
			Relation::Lt => "<",
			Relation::Le => "<=",
			Relation::Gt => ">",
			Relation::Ge => ">=",
		};
		write!(f, " {rel} {}", self.rhs)
	}
}

impl ReifiedLinearConstraint {
	/// Create a reified constraint.
	pub fn new(lit: Lit, con: LinearConstraint, direction: Direction) -> Self {
		Self {
			lit,
			con,
			direction,
		}
	}

	/// Bring the underlying constraint into normal form, flipping a `≠`
	/// equivalence into a negated `=` equivalence first.
	pub fn normalize(&mut self) -> Result<(), Overflow> {
		if self.con.relation == Relation::Ne && self.direction == Direction::Eq {
			self.lit = !self.lit;
			self.con.relation = Relation::Eq;
		}
		self.con.normalize()
	}
}
