// src/diff.rs

//! A generic three-way merge over two sorted ranges, used by [`crate::check`]
//! to cross-reference the changelog against the repository.

/// Walks sorted ranges `a` and `b`, invoking exactly one of `only_in_a`,
/// `only_in_b`, or `in_both` per logical element, in ascending order.
///
/// `cmp(x, y)` must report whether `x` sorts strictly before `y`; `eq(x,
/// y)` must report whether they represent the same logical key. Both must
/// agree with the order `a` and `b` are already sorted in.
pub fn diff<T, Cmp, Eq_, OnlyA, OnlyB, Both>(
    a: &[T],
    b: &[T],
    mut cmp: Cmp,
    mut eq: Eq_,
    mut only_in_a: OnlyA,
    mut only_in_b: OnlyB,
    mut in_both: Both,
) where
    Cmp: FnMut(&T, &T) -> bool,
    Eq_: FnMut(&T, &T) -> bool,
    OnlyA: FnMut(&T),
    OnlyB: FnMut(&T),
    Both: FnMut(&T, &T),
{
    let mut ai = 0usize;
    let mut bi = 0usize;
    while ai < a.len() && bi < b.len() {
        if cmp(&a[ai], &b[bi]) {
            only_in_a(&a[ai]);
            ai += 1;
        } else if !eq(&a[ai], &b[bi]) {
            only_in_b(&b[bi]);
            bi += 1;
        } else {
            in_both(&a[ai], &b[bi]);
            ai += 1;
            bi += 1;
        }
    }
    while ai < a.len() {
        only_in_a(&a[ai]);
        ai += 1;
    }
    while bi < b.len() {
        only_in_b(&b[bi]);
        bi += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_scenario() {
        let a = [1, 2, 3, 4, 5];
        let b = [2, 4];
        let mut only_a = Vec::new();
        let mut only_b = Vec::new();
        let mut both = Vec::new();
        diff(
            &a,
            &b,
            |x, y| x < y,
            |x, y| x == y,
            |x| only_a.push(*x),
            |y| only_b.push(*y),
            |x, y| both.push((*x, *y)),
        );
        assert_eq!(only_a, vec![1, 3, 5]);
        assert_eq!(only_b, Vec::<i32>::new());
        assert_eq!(both, vec![(2, 2), (4, 4)]);
    }

    #[test]
    fn every_element_appears_exactly_once() {
        let a = [1, 3, 5, 7, 9];
        let b = [1, 2, 3, 4, 5];
        let mut seen = Vec::new();
        diff(
            &a,
            &b,
            |x, y| x < y,
            |x, y| x == y,
            |x| seen.push(("a", *x)),
            |y| seen.push(("b", *y)),
            |x, _| seen.push(("both", *x)),
        );
        // every input element is accounted for exactly once
        let total = a.len() + b.len() - seen.iter().filter(|(k, _)| *k == "both").count();
        assert_eq!(seen.len(), total);
    }

    #[test]
    fn disjoint_ranges_drain_each_side() {
        let a = [1, 2];
        let b = [3, 4];
        let mut only_a = Vec::new();
        let mut only_b = Vec::new();
        diff(
            &a,
            &b,
            |x, y| x < y,
            |x, y| x == y,
            |x| only_a.push(*x),
            |y| only_b.push(*y),
            |_, _| panic!("no overlap expected"),
        );
        assert_eq!(only_a, vec![1, 2]);
        assert_eq!(only_b, vec![3, 4]);
    }
}
