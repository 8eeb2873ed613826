use std::cmp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number represents either an integral or a floating point value. It
/// needs to be accompanied with a source of `NumberKind` that describes
/// the actual type of the value stored within `Number`.
#[derive(Debug, Default)]
pub struct Number(AtomicU64);

impl Number {
    /// Assigns this number to the given other number. Both should be of the
    /// same kind.
    pub fn assign(&self, number_kind: &NumberKind, other: &Number) {
        let _ = number_kind;
        self.0.store(other.0.load(Ordering::Acquire), Ordering::Release)
    }

    /// Adds the given other number to this number. Both should be of the same
    /// kind. Integral overflow saturates.
    pub fn saturating_add(&self, number_kind: &NumberKind, other: &Number) {
        let other = other.0.load(Ordering::Acquire);
        loop {
            let current = self.0.load(Ordering::Acquire);
            let new = match number_kind {
                NumberKind::I64 => (current as i64).saturating_add(other as i64) as u64,
                NumberKind::U64 => current.saturating_add(other),
                NumberKind::F64 => f64_to_u64(u64_to_f64(current) + u64_to_f64(other)),
            };
            if self
                .0
                .compare_exchange(current, new, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Subtracts the given other number from this number. Both should be of
    /// the same kind. Integral overflow saturates.
    pub fn saturating_sub(&self, number_kind: &NumberKind, other: &Number) {
        let other = other.0.load(Ordering::Acquire);
        loop {
            let current = self.0.load(Ordering::Acquire);
            let new = match number_kind {
                NumberKind::I64 => (current as i64).saturating_sub(other as i64) as u64,
                NumberKind::U64 => current.saturating_sub(other),
                NumberKind::F64 => f64_to_u64(u64_to_f64(current) - u64_to_f64(other)),
            };
            if self
                .0
                .compare_exchange(current, new, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Atomically replaces the stored value with the given other number,
    /// returning the previously stored value. The exchange is kind-agnostic
    /// since both payloads share one representation.
    pub fn swap(&self, other: &Number) -> Number {
        self.0
            .swap(other.0.load(Ordering::Acquire), Ordering::AcqRel)
            .into()
    }

    /// Casts the number to `i64`. May result in data/precision loss.
    pub fn to_i64(&self, number_kind: &NumberKind) -> i64 {
        let current = self.0.load(Ordering::SeqCst);

        match number_kind {
            NumberKind::F64 => u64_to_f64(current) as i64,
            NumberKind::U64 | NumberKind::I64 => current as i64,
        }
    }

    /// Casts the number to `u64`. May result in data/precision loss.
    pub fn to_u64(&self, number_kind: &NumberKind) -> u64 {
        let current = self.0.load(Ordering::SeqCst);

        match number_kind {
            NumberKind::F64 => u64_to_f64(current) as u64,
            NumberKind::U64 | NumberKind::I64 => current,
        }
    }

    /// Casts the number to `f64`. May result in data/precision loss.
    pub fn to_f64(&self, number_kind: &NumberKind) -> f64 {
        let current = self.0.load(Ordering::SeqCst);

        match number_kind {
            NumberKind::I64 => (current as i64) as f64,
            NumberKind::F64 => u64_to_f64(current),
            NumberKind::U64 => current as f64,
        }
    }

    /// Compares this number to the given other number. Both should be of the
    /// same kind.
    pub fn partial_cmp(&self, number_kind: &NumberKind, other: &Number) -> Option<cmp::Ordering> {
        let current = self.0.load(Ordering::SeqCst);
        let other = other.0.load(Ordering::SeqCst);
        match number_kind {
            NumberKind::I64 => (current as i64).partial_cmp(&(other as i64)),
            NumberKind::F64 => u64_to_f64(current).partial_cmp(&u64_to_f64(other)),
            NumberKind::U64 => current.partial_cmp(&other),
        }
    }

    /// Checks if this value is an f64 NaN value. Do not use on non-f64 values.
    pub fn is_nan(&self) -> bool {
        u64_to_f64(self.0.load(Ordering::Acquire)).is_nan()
    }

    /// `true` if the actual value is less than zero.
    pub fn is_negative(&self, number_kind: &NumberKind) -> bool {
        match number_kind {
            NumberKind::I64 => (self.0.load(Ordering::Acquire) as i64).is_negative(),
            NumberKind::F64 => u64_to_f64(self.0.load(Ordering::Acquire)).is_sign_negative(),
            NumberKind::U64 => false,
        }
    }

    /// Return loaded data for debugging purposes
    pub fn to_debug(&self, kind: &NumberKind) -> Box<dyn fmt::Debug> {
        let current = self.0.load(Ordering::SeqCst);
        match kind {
            NumberKind::I64 => Box::new(current as i64),
            NumberKind::F64 => Box::new(u64_to_f64(current)),
            NumberKind::U64 => Box::new(current),
        }
    }
}

impl Clone for Number {
    fn clone(&self) -> Self {
        self.0.load(Ordering::SeqCst).into()
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number(AtomicU64::new(f64_to_u64(f)))
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number(AtomicU64::new(i as u64))
    }
}

impl From<u64> for Number {
    fn from(u: u64) -> Self {
        Number(AtomicU64::new(u))
    }
}

/// A descriptor for the encoded data type of a `Number`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NumberKind {
    /// A `Number` that stores `i64` values.
    I64,
    /// A `Number` that stores `f64` values.
    F64,
    /// A `Number` that stores `u64` values.
    U64,
}

impl NumberKind {
    /// Returns the zero value for each kind
    pub fn zero(&self) -> Number {
        match self {
            NumberKind::I64 => 0i64.into(),
            NumberKind::F64 => 0f64.into(),
            NumberKind::U64 => 0u64.into(),
        }
    }

    /// Returns the max value for each kind
    pub fn max(&self) -> Number {
        match self {
            NumberKind::I64 => i64::MAX.into(),
            NumberKind::F64 => f64::MAX.into(),
            NumberKind::U64 => u64::MAX.into(),
        }
    }

    /// Returns the min value for each kind
    pub fn min(&self) -> Number {
        match self {
            NumberKind::I64 => i64::MIN.into(),
            NumberKind::F64 => f64::MIN.into(),
            NumberKind::U64 => u64::MIN.into(),
        }
    }
}

#[inline]
fn u64_to_f64(val: u64) -> f64 {
    f64::from_bits(val)
}

#[inline]
fn f64_to_u64(val: f64) -> u64 {
    f64::to_bits(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn add_and_sub_by_kind() {
        let i = Number::from(10i64);
        i.saturating_add(&NumberKind::I64, &Number::from(-3i64));
        assert_eq!(i.to_i64(&NumberKind::I64), 7);
        i.saturating_sub(&NumberKind::I64, &Number::from(2i64));
        assert_eq!(i.to_i64(&NumberKind::I64), 5);

        let f = Number::from(0.5f64);
        f.saturating_add(&NumberKind::F64, &Number::from(0.25f64));
        assert_eq!(f.to_f64(&NumberKind::F64), 0.75);
        f.saturating_sub(&NumberKind::F64, &Number::from(0.5f64));
        assert_eq!(f.to_f64(&NumberKind::F64), 0.25);

        let u = Number::from(1u64);
        u.saturating_sub(&NumberKind::U64, &Number::from(10u64));
        assert_eq!(u.to_u64(&NumberKind::U64), 0);
    }

    #[test]
    fn compare_by_kind() {
        let a = Number::from(-1i64);
        let b = Number::from(1i64);
        assert_eq!(a.partial_cmp(&NumberKind::I64, &b), Some(Ordering::Less));

        let a = Number::from(2.0f64);
        let b = Number::from(1.5f64);
        assert_eq!(a.partial_cmp(&NumberKind::F64, &b), Some(Ordering::Greater));
        assert!(a.partial_cmp(&NumberKind::F64, &Number::from(f64::NAN)).is_none());
    }

    #[test]
    fn nan_and_negative_checks() {
        assert!(Number::from(f64::NAN).is_nan());
        assert!(!Number::from(1.0f64).is_nan());
        assert!(Number::from(-1i64).is_negative(&NumberKind::I64));
        assert!(Number::from(-0.1f64).is_negative(&NumberKind::F64));
        assert!(!Number::from(3u64).is_negative(&NumberKind::U64));
    }

    #[test]
    fn concurrent_adds_are_lossless() {
        let total = Arc::new(NumberKind::U64.zero());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let total = Arc::clone(&total);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    total.saturating_add(&NumberKind::U64, &Number::from(1u64));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(total.to_u64(&NumberKind::U64), 4000);
    }
}
