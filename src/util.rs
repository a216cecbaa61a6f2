//! Ordered-queue helpers.
//!
//! Every queue in the core is a `VecDeque` kept in a comparator-defined
//! order. `insertion_point` places a new element *before* the first element
//! it orders ahead of, which makes equal elements FIFO; `take_highest_by`
//! removes the best element by a key that may have changed since insertion
//! (priority donation reorders threads while they wait), taking the first
//! occurrence of the maximum to preserve FIFO among equals.

use alloc::collections::VecDeque;

/// Index at which a new element belongs so that the queue order given by
/// `orders_before` is preserved, with FIFO tie-break.
pub(crate) fn insertion_point<T>(queue: &VecDeque<T>, orders_before: impl Fn(&T) -> bool) -> usize {
    queue
        .iter()
        .position(orders_before)
        .unwrap_or(queue.len())
}

/// Removes and returns the element with the highest `key`, or `None` if the
/// queue is empty. The first occurrence of the maximum wins.
pub(crate) fn take_highest_by<T, K: Ord>(
    queue: &mut VecDeque<T>,
    key: impl Fn(&T) -> K,
) -> Option<T> {
    let mut best: Option<(usize, K)> = None;
    for (i, item) in queue.iter().enumerate() {
        let k = key(item);
        let replace = match &best {
            Some((_, bk)) => k > *bk,
            None => true,
        };
        if replace {
            best = Some((i, k));
        }
    }
    best.and_then(|(i, _)| queue.remove(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deque<T>(items: impl IntoIterator<Item = T>) -> VecDeque<T> {
        items.into_iter().collect()
    }

    #[test]
    fn insertion_point_keeps_descending_order_with_fifo_ties() {
        // Descending queue; a new element goes before the first strictly
        // smaller one, i.e. after every equal one.
        let q = deque([9, 7, 7, 3]);
        assert_eq!(insertion_point(&q, |&e| 7 > e), 3);
        assert_eq!(insertion_point(&q, |&e| 10 > e), 0);
        assert_eq!(insertion_point(&q, |&e| 1 > e), 4);
        assert_eq!(insertion_point(&deque::<i32>([]), |&e| 5 > e), 0);
    }

    #[test]
    fn take_highest_by_is_fifo_among_equals() {
        let mut q = deque([("a", 3), ("b", 7), ("c", 7), ("d", 1)]);
        assert_eq!(take_highest_by(&mut q, |e| e.1), Some(("b", 7)));
        assert_eq!(take_highest_by(&mut q, |e| e.1), Some(("c", 7)));
        assert_eq!(take_highest_by(&mut q, |e| e.1), Some(("a", 3)));
        assert_eq!(take_highest_by(&mut q, |e| e.1), Some(("d", 1)));
        assert_eq!(take_highest_by(&mut q, |e| e.1), None);
    }
}
