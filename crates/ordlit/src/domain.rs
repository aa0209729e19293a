//! Module containing the representation of the set of integer values a
//! variable can take, stored as an ordered sequence of disjoint closed
//! ranges.
//!
//! All values are kept within [`Domain::MIN`] and [`Domain::MAX`]. Operations
//! whose result would leave this window set a sticky overflow flag; a domain
//! with the flag raised must not be used further and the caller is expected
//! to report unsatisfiability (see the crate documentation on overflow
//! handling).

use std::fmt::{self, Display};

use rangelist::RangeList;
use tracing::trace;

use crate::{IntSetVal, IntVal};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// An ordered set of integers, stored as disjoint, non-adjacent, closed
/// ranges.
pub struct Domain {
	/// The sorted disjoint ranges making up the set.
	ranges: Vec<Range>,
	/// Sticky flag raised when an operation left the representable window.
	overflow: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// A closed range of integers `lo..=up`.
pub(crate) struct Range {
	/// Smallest value contained in the range.
	pub(crate) lo: IntVal,
	/// Largest value contained in the range.
	pub(crate) up: IntVal,
}

impl Domain {
	/// Largest value any domain may contain.
	pub const MAX: IntVal = IntVal::MAX - 1;
	/// Smallest value any domain may contain.
	pub const MIN: IntVal = IntVal::MIN + 1;

	/// Create a domain holding all values of the closed range `lo..=up`.
	///
	/// An empty domain is created when `lo > up`.
	pub fn new(lo: IntVal, up: IntVal) -> Self {
		let ranges = if lo <= up {
			vec![Range { lo, up }]
		} else {
			Vec::new()
		};
		Self {
			ranges,
			overflow: false,
		}
	}

	/// Create the domain spanning the full representable window.
	pub fn unbounded() -> Self {
		Self::new(Self::MIN, Self::MAX)
	}

	/// Create a domain from a set of integer ranges, clamping each range to
	/// the representable window.
	pub fn from_set(set: &IntSetVal) -> Self {
		let mut dom = Self {
			ranges: Vec::new(),
			overflow: false,
		};
		for r in set.iter() {
			let lo = (*r.start()).max(i64::from(Self::MIN));
			let up = (*r.end()).min(i64::from(Self::MAX));
			if lo <= up {
				dom.unify(lo as IntVal, up as IntVal);
			}
		}
		dom
	}

	/// Whether the set contains the value `x`.
	pub fn contains(&self, x: IntVal) -> bool {
		debug_assert!(!self.overflow);
		let i = self.ranges.partition_point(|r| r.up < x);
		self.ranges.get(i).is_some_and(|r| x >= r.lo)
	}

	/// Whether the set contains no values.
	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	/// The smallest value in the set.
	///
	/// # Warning
	/// This method must not be called on an empty domain.
	pub fn lower(&self) -> IntVal {
		self.ranges[0].lo
	}

	/// The largest value in the set.
	///
	/// # Warning
	/// This method must not be called on an empty domain.
	pub fn upper(&self) -> IntVal {
		self.ranges[self.ranges.len() - 1].up
	}

	/// Whether an operation on this domain has left the representable window.
	pub fn overflow(&self) -> bool {
		self.overflow
	}

	/// The number of values in the set.
	pub fn size(&self) -> u64 {
		self.ranges
			.iter()
			.map(|r| (i64::from(r.up) - i64::from(r.lo) + 1) as u64)
			.sum()
	}

	/// The `idx`-th smallest value of the set.
	///
	/// # Warning
	/// This method must not be called with `idx >= self.size()`.
	pub fn value(&self, idx: u64) -> IntVal {
		let mut rem = idx;
		for r in &self.ranges {
			let len = (i64::from(r.up) - i64::from(r.lo) + 1) as u64;
			if rem < len {
				return (i64::from(r.lo) + rem as i64) as IntVal;
			}
			rem -= len;
		}
		unreachable!("domain index out of range")
	}

	/// The number of values in the set that are strictly smaller than `val`,
	/// i.e. the position at which `val` would be enumerated.
	pub fn rank(&self, val: i64) -> u64 {
		let mut count = 0;
		for r in &self.ranges {
			if val <= i64::from(r.lo) {
				break;
			} else if val > i64::from(r.up) {
				count += (i64::from(r.up) - i64::from(r.lo) + 1) as u64;
			} else {
				count += (val - i64::from(r.lo)) as u64;
				break;
			}
		}
		count
	}

	/// Iterate over all values of the set in increasing order.
	pub fn iter(&self) -> impl DoubleEndedIterator<Item = IntVal> + '_ {
		self.ranges
			.iter()
			.flat_map(|r| (r.lo..=r.up).collect::<Vec<_>>())
	}

	/// Restrict the set to the values inside `lo..=up`, returning `false` if
	/// the set becomes empty.
	pub fn intersect_bounds(&mut self, lo: i64, up: i64) -> bool {
		debug_assert!(!self.overflow);
		if lo > up || up < i64::from(Self::MIN) || lo > i64::from(Self::MAX) {
			self.ranges.clear();
			return false;
		}
		let lo = lo.max(i64::from(Self::MIN)) as IntVal;
		let up = up.min(i64::from(Self::MAX)) as IntVal;
		self.ranges.retain(|r| r.up >= lo && r.lo <= up);
		if let Some(first) = self.ranges.first_mut() {
			if first.lo < lo {
				first.lo = lo;
			}
		}
		if let Some(last) = self.ranges.last_mut() {
			if last.up > up {
				last.up = up;
			}
		}
		!self.is_empty()
	}

	/// Restrict the set to the values also contained in `other`, returning
	/// `false` if the set becomes empty.
	pub fn intersect(&mut self, other: &Domain) -> bool {
		debug_assert!(!self.overflow);
		let mut out = Vec::with_capacity(self.ranges.len().max(other.ranges.len()));
		let (mut i, mut j) = (0, 0);
		while i < self.ranges.len() && j < other.ranges.len() {
			let a = self.ranges[i];
			let b = other.ranges[j];
			let lo = a.lo.max(b.lo);
			let up = a.up.min(b.up);
			if lo <= up {
				out.push(Range { lo, up });
			}
			if a.up < b.up {
				i += 1;
			} else {
				j += 1;
			}
		}
		self.ranges = out;
		!self.is_empty()
	}

	/// Remove the single value `x` from the set, returning `false` if the set
	/// becomes empty.
	pub fn remove(&mut self, x: IntVal) -> bool {
		self.remove_bounds(i64::from(x), i64::from(x))
	}

	/// Remove all values inside `lo..=up` from the set, returning `false` if
	/// the set becomes empty.
	pub fn remove_bounds(&mut self, lo: i64, up: i64) -> bool {
		debug_assert!(!self.overflow);
		if lo > up {
			return !self.is_empty();
		}
		let mut out = Vec::with_capacity(self.ranges.len() + 1);
		for &r in &self.ranges {
			if i64::from(r.up) < lo || i64::from(r.lo) > up {
				out.push(r);
				continue;
			}
			if i64::from(r.lo) < lo {
				out.push(Range {
					lo: r.lo,
					up: (lo - 1) as IntVal,
				});
			}
			if i64::from(r.up) > up {
				out.push(Range {
					lo: (up + 1) as IntVal,
					up: r.up,
				});
			}
		}
		self.ranges = out;
		!self.is_empty()
	}

	/// Remove all values contained in `other` from the set, returning `false`
	/// if the set becomes empty.
	pub fn remove_set(&mut self, other: &Domain) -> bool {
		for r in &other.ranges {
			if !self.remove_bounds(i64::from(r.lo), i64::from(r.up)) {
				return false;
			}
		}
		true
	}

	/// Add all values of `lo..=up` to the set, merging with overlapping or
	/// adjacent ranges.
	pub fn unify(&mut self, lo: IntVal, up: IntVal) {
		debug_assert!(!self.overflow);
		if lo > up {
			return;
		}
		// First range that could merge with the new one (adjacency included).
		let start = self
			.ranges
			.partition_point(|r| i64::from(r.up) + 1 < i64::from(lo));
		let mut merged = Range { lo, up };
		let mut end = start;
		while end < self.ranges.len() && i64::from(self.ranges[end].lo) <= i64::from(up) + 1 {
			merged.lo = merged.lo.min(self.ranges[end].lo);
			merged.up = merged.up.max(self.ranges[end].up);
			end += 1;
		}
		let _ = self.ranges.splice(start..end, [merged]);
	}

	/// Scale every value in the set by `n`.
	///
	/// When the set holds at most `max_size` values (or `max_size` is `-1`)
	/// the scaling is exact and point-wise; otherwise only the range
	/// endpoints are rescaled, which loses the holes between multiples. The
	/// overflow flag is raised when any scaled value leaves the representable
	/// window.
	pub fn inplace_times(&mut self, mut n: IntVal, max_size: i64) -> &mut Self {
		debug_assert!(!self.overflow);
		debug_assert_ne!(n, 0);
		if n < 0 {
			self.reverse();
			n = -n;
		}
		if n == 1 {
			return self;
		}
		let in_window =
			|x: i64| (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&x);
		if max_size == -1 || self.size() as i64 <= max_size {
			let mut out = Vec::new();
			for r in &self.ranges {
				for i in r.lo..=r.up {
					let v = i64::from(i) * i64::from(n);
					if !in_window(v) {
						trace!(value = v, "domain scaling overflow");
						self.overflow = true;
						return self;
					}
					out.push(Range {
						lo: v as IntVal,
						up: v as IntVal,
					});
				}
			}
			self.ranges = out;
		} else {
			for r in &mut self.ranges {
				let lo = i64::from(r.lo) * i64::from(n);
				let up = i64::from(r.up) * i64::from(n);
				if !in_window(lo) || !in_window(up) {
					trace!(lo, up, "domain scaling overflow");
					self.overflow = true;
					return self;
				}
				r.lo = lo as IntVal;
				r.up = up as IntVal;
			}
		}
		self
	}

	/// Keep only the multiples of `n` in the set and divide them by `n`.
	pub fn inplace_divide(&mut self, mut n: IntVal) -> &mut Self {
		debug_assert!(!self.overflow);
		debug_assert_ne!(n, 0);
		if n < 0 {
			self.reverse();
			n = -n;
		}
		if n == 1 {
			return self;
		}
		let mut out: Domain = Domain {
			ranges: Vec::new(),
			overflow: false,
		};
		for r in &self.ranges {
			// First multiple of `n` at or above the start of the range.
			let lo = i64::from(r.lo);
			let first = lo + (n as i64 - lo.rem_euclid(n as i64)) % n as i64;
			let mut i = first;
			while i <= i64::from(r.up) {
				let v = (i / i64::from(n)) as IntVal;
				out.unify(v, v);
				i += i64::from(n);
			}
		}
		self.ranges = out.ranges;
		self
	}

	/// Translate every value in the set by `c`, raising the overflow flag if
	/// a translated value leaves the representable window.
	pub fn offset(&mut self, c: IntVal) -> &mut Self {
		debug_assert!(!self.overflow);
		if c == 0 {
			return self;
		}
		for r in &mut self.ranges {
			let lo = i64::from(r.lo) + i64::from(c);
			let up = i64::from(r.up) + i64::from(c);
			if lo < i64::from(Self::MIN) || up > i64::from(Self::MAX) {
				trace!(lo, up, "domain translation overflow");
				self.overflow = true;
				return self;
			}
			r.lo = lo as IntVal;
			r.up = up as IntVal;
		}
		self
	}

	/// Keep only the values `x` for which `(times·x + c) mod div == 0`,
	/// returning `false` if the set becomes empty.
	pub fn constrain_mod(&mut self, times: IntVal, c: IntVal, div: IntVal) -> bool {
		debug_assert!(!self.overflow);
		debug_assert_ne!(div, 0);
		let d = i64::from(div).unsigned_abs() as i64;
		if d == 1 {
			return !self.is_empty();
		}
		let hit = |x: i64| (i64::from(times) * x + i64::from(c)).rem_euclid(d) == 0;
		let mut out = Domain {
			ranges: Vec::new(),
			overflow: false,
		};
		if d < self.size() as i64 {
			// Hits are periodic in the residues modulo `div`; two hits (or a
			// single one) fix the full solution set.
			let mut hits = (0..d).filter(|&i| hit(i));
			let Some(first) = hits.next() else {
				self.ranges.clear();
				return false;
			};
			let period = hits.next().map_or(d, |second| second - first);
			for r in &self.ranges {
				let lo = i64::from(r.lo);
				let mut x = lo + (first - lo).rem_euclid(period);
				while x <= i64::from(r.up) {
					out.unify(x as IntVal, x as IntVal);
					x += period;
				}
			}
		} else {
			for r in &self.ranges {
				for x in r.lo..=r.up {
					if hit(i64::from(x)) {
						out.unify(x, x);
					}
				}
			}
		}
		self.ranges = out.ranges;
		!self.is_empty()
	}

	/// Mirror the set around zero.
	fn reverse(&mut self) {
		self.ranges.reverse();
		for r in &mut self.ranges {
			(r.lo, r.up) = (-r.up, -r.lo);
		}
	}
}

impl Display for Domain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for r in &self.ranges {
			if !first {
				write!(f, ",")?;
			}
			if r.lo == r.up {
				write!(f, "{}", r.lo)?;
			} else {
				write!(f, "{}..{}", r.lo, r.up)?;
			}
			first = false;
		}
		Ok(())
	}
}

impl From<&Domain> for RangeList<i64> {
	fn from(dom: &Domain) -> Self {
		dom.ranges
			.iter()
			.map(|r| i64::from(r.lo)..=i64::from(r.up))
			.collect()
	}
}
