//! Equality strategies used to gate change notifications
//!
//! [`Equality`] is the pluggable predicate an [`crate::ObservableValue`]
//! consults before notifying. [`DeepEq`] provides structural comparison for
//! list-, map- and set-shaped values: lists compare element-wise in order,
//! maps and sets compare by membership regardless of order. Shared pointers
//! are compared by identity first and only descended into when they differ.
//!
//! Types outside the built-in shapes opt in with [`deep_eq_by_partial_eq!`],
//! which compares them with their own `PartialEq` without looking inside.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

/// Pluggable "are these equal" predicate
pub struct Equality<T: ?Sized> {
    eq: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T: ?Sized> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            eq: Rc::clone(&self.eq),
        }
    }
}

impl<T: ?Sized + 'static> Equality<T> {
    /// Use an arbitrary predicate
    pub fn custom(eq: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self { eq: Rc::new(eq) }
    }

    /// Treat every write as a change
    pub fn never() -> Self {
        Self::custom(|_, _| false)
    }

    /// Evaluate the predicate
    pub fn is_equal(&self, a: &T, b: &T) -> bool {
        (self.eq)(a, b)
    }
}

impl<T: PartialEq + ?Sized + 'static> Equality<T> {
    /// Compare with `PartialEq`
    pub fn partial_eq() -> Self {
        Self::custom(|a: &T, b: &T| a == b)
    }
}

impl<T: DeepEq + ?Sized + 'static> Equality<T> {
    /// Compare structurally with [`DeepEq`]
    pub fn deep() -> Self {
        Self::custom(|a: &T, b: &T| a.deep_eq(b))
    }
}

impl<T: ?Sized + 'static> Equality<Rc<T>> {
    /// Compare shared values by pointer identity only
    pub fn identity() -> Self {
        Self::custom(|a: &Rc<T>, b: &Rc<T>| Rc::ptr_eq(a, b))
    }
}

impl<T: ?Sized> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Equality(..)")
    }
}

/// Structural equality for collection-shaped values
pub trait DeepEq {
    /// Whether `self` and `other` hold equal contents
    fn deep_eq(&self, other: &Self) -> bool;
}

/// Implement [`DeepEq`] for types by delegating to their `PartialEq`.
///
/// ```rust
/// use tether_core::deep_eq_by_partial_eq;
/// use tether_core::equality::DeepEq;
///
/// #[derive(PartialEq)]
/// struct Point { x: i32, y: i32 }
///
/// deep_eq_by_partial_eq!(Point);
///
/// let a = vec![Point { x: 1, y: 2 }];
/// let b = vec![Point { x: 1, y: 2 }];
/// assert!(a.deep_eq(&b));
/// ```
#[macro_export]
macro_rules! deep_eq_by_partial_eq {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::equality::DeepEq for $t {
                fn deep_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

deep_eq_by_partial_eq!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    str,
    String,
);

// Lists

impl<T: DeepEq> DeepEq for [T] {
    fn deep_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.deep_eq(b)))
    }
}

impl<T: DeepEq, const N: usize> DeepEq for [T; N] {
    fn deep_eq(&self, other: &Self) -> bool {
        self.as_slice().deep_eq(other.as_slice())
    }
}

impl<T: DeepEq> DeepEq for Vec<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        self.as_slice().deep_eq(other.as_slice())
    }
}

impl<T: DeepEq> DeepEq for VecDeque<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.deep_eq(b)))
    }
}

// Maps

impl<K, V, S> DeepEq for HashMap<K, V, S>
where
    K: Eq + Hash,
    V: DeepEq,
    S: BuildHasher,
{
    fn deep_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len()
                && self
                    .iter()
                    .all(|(k, v)| other.get(k).is_some_and(|o| v.deep_eq(o))))
    }
}

impl<K: Ord, V: DeepEq> DeepEq for BTreeMap<K, V> {
    fn deep_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len()
                && self
                    .iter()
                    .all(|(k, v)| other.get(k).is_some_and(|o| v.deep_eq(o))))
    }
}

impl<K, V, S> DeepEq for IndexMap<K, V, S>
where
    K: Eq + Hash,
    V: DeepEq,
    S: BuildHasher,
{
    fn deep_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len()
                && self
                    .iter()
                    .all(|(k, v)| other.get(k).is_some_and(|o| v.deep_eq(o))))
    }
}

// Sets

impl<T: Eq + Hash, S: BuildHasher> DeepEq for HashSet<T, S> {
    fn deep_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len() && self.iter().all(|v| other.contains(v)))
    }
}

impl<T: Ord> DeepEq for BTreeSet<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len() && self.iter().all(|v| other.contains(v)))
    }
}

impl<T: Eq + Hash, S: BuildHasher> DeepEq for IndexSet<T, S> {
    fn deep_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.len() == other.len() && self.iter().all(|v| other.contains(v)))
    }
}

// Wrappers

impl<T: DeepEq> DeepEq for Option<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.deep_eq(b),
            _ => false,
        }
    }
}

impl<T: DeepEq + ?Sized> DeepEq for Box<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        (**self).deep_eq(&**other)
    }
}

impl<T: DeepEq + ?Sized> DeepEq for Rc<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other) || (**self).deep_eq(&**other)
    }
}

impl<T: DeepEq + ?Sized> DeepEq for Arc<T> {
    fn deep_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other) || (**self).deep_eq(&**other)
    }
}

impl<A: DeepEq, B: DeepEq> DeepEq for (A, B) {
    fn deep_eq(&self, other: &Self) -> bool {
        self.0.deep_eq(&other.0) && self.1.deep_eq(&other.1)
    }
}

impl<A: DeepEq, B: DeepEq, C: DeepEq> DeepEq for (A, B, C) {
    fn deep_eq(&self, other: &Self) -> bool {
        self.0.deep_eq(&other.0) && self.1.deep_eq(&other.1) && self.2.deep_eq(&other.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists() {
        assert!(vec![1, 2, 3].deep_eq(&vec![1, 2, 3]));
        assert!(!vec![1, 2, 3].deep_eq(&vec![1, 3, 2]));
        assert!(!vec![1, 2].deep_eq(&vec![1, 2, 3]));
        assert!(Vec::<i32>::new().deep_eq(&Vec::new()));
        assert!([1u8, 2].deep_eq(&[1u8, 2]));

        let a: VecDeque<_> = [1, 2].into_iter().collect();
        let b: VecDeque<_> = [1, 2].into_iter().collect();
        assert!(a.deep_eq(&b));
    }

    #[test]
    fn test_maps_ignore_order() {
        let mut a = IndexMap::new();
        a.insert("x", vec![1]);
        a.insert("y", vec![2]);
        let mut b = IndexMap::new();
        b.insert("y", vec![2]);
        b.insert("x", vec![1]);
        assert!(a.deep_eq(&b));

        b.insert("x", vec![9]);
        assert!(!a.deep_eq(&b));

        let c: HashMap<&str, i32> = HashMap::new();
        assert!(c.deep_eq(&HashMap::new()));

        let d: BTreeMap<i32, Option<String>> = [(1, None)].into_iter().collect();
        let e: BTreeMap<i32, Option<String>> = [(1, Some("v".into()))].into_iter().collect();
        assert!(!d.deep_eq(&e));
    }

    #[test]
    fn test_sets_ignore_order() {
        let a: IndexSet<i32> = [1, 2, 3].into_iter().collect();
        let b: IndexSet<i32> = [3, 1, 2].into_iter().collect();
        assert!(a.deep_eq(&b));

        let c: HashSet<i32> = [1, 2].into_iter().collect();
        let d: HashSet<i32> = [1, 4].into_iter().collect();
        assert!(!c.deep_eq(&d));

        assert!(BTreeSet::<u8>::new().deep_eq(&BTreeSet::new()));
    }

    #[test]
    fn test_nested_shapes() {
        let a: Vec<HashMap<String, Vec<i32>>> =
            vec![[("k".to_string(), vec![1, 2])].into_iter().collect()];
        let b = a.clone();
        assert!(a.deep_eq(&b));
    }

    #[test]
    fn test_options() {
        assert!(None::<i32>.deep_eq(&None));
        assert!(!None.deep_eq(&Some(1)));
        assert!(!Some(1).deep_eq(&None));
        assert!(Some(vec![1]).deep_eq(&Some(vec![1])));
    }

    #[test]
    fn test_shared_pointers() {
        let shared = Rc::new(vec![1, 2]);
        assert!(shared.deep_eq(&shared.clone()));
        assert!(shared.deep_eq(&Rc::new(vec![1, 2])));
        assert!(!shared.deep_eq(&Rc::new(vec![2, 1])));
        assert!(Arc::new("s".to_string()).deep_eq(&Arc::new("s".to_string())));
    }

    struct Opaque {
        id: u32,
        cache: Vec<u8>,
    }

    impl PartialEq for Opaque {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    deep_eq_by_partial_eq!(Opaque);

    #[test]
    fn test_custom_types_use_their_own_eq() {
        let a = vec![Opaque {
            id: 1,
            cache: vec![1],
        }];
        let b = vec![Opaque {
            id: 1,
            cache: vec![2],
        }];
        let c = vec![Opaque {
            id: 2,
            cache: vec![1],
        }];
        assert_ne!(a[0].cache, b[0].cache);
        assert!(a.deep_eq(&b));
        assert!(!a.deep_eq(&c));
    }

    #[test]
    fn test_equality_strategies() {
        let eq = Equality::<i32>::partial_eq();
        assert!(eq.is_equal(&1, &1));
        assert!(!eq.is_equal(&1, &2));

        let never = Equality::<i32>::never();
        assert!(!never.is_equal(&1, &1));

        let a = Rc::new(vec![1]);
        let b = Rc::new(vec![1]);
        let identity = Equality::<Rc<Vec<i32>>>::identity();
        assert!(identity.is_equal(&a, &a.clone()));
        assert!(!identity.is_equal(&a, &b));

        let deep = Equality::<Rc<Vec<i32>>>::deep();
        assert!(deep.is_equal(&a, &b));

        let case_insensitive =
            Equality::<String>::custom(|a, b| a.eq_ignore_ascii_case(b));
        assert!(case_insensitive.is_equal(&"Hi".to_string(), &"hI".to_string()));
    }
}
