//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Identifiers are totally ordered: code that locks several entities of the
/// same kind in one transaction acquires them in ascending id order.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Sort and dedupe a set of ids into the canonical lock acquisition order.
pub fn lock_order<I>(ids: impl IntoIterator<Item = I>) -> Vec<I>
where
    I: Ord,
{
    let mut ids: Vec<I> = ids.into_iter().collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_order_sorts_and_dedupes() {
        assert_eq!(lock_order([3, 1, 2, 3, 1]), vec![1, 2, 3]);
    }
}
