//! Sibling execution-order resequencing.
//!
//! Execution orders, when assigned, form the contiguous sequence 1..N among
//! siblings. Moving one item resequences the whole ordered set; callers write
//! all affected rows inside a single transaction.

/// A sibling row participating in resequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedItem {
    /// Internal row id.
    pub id: i64,
    /// Current 1-based order, `None` when unordered.
    pub execution_order: Option<i32>,
}

/// Recomputes sibling orders after one item's order changed.
///
/// Items with an order are sorted by it, the changed item is pulled out and
/// reinserted at the requested position (clamped to the list bounds), and the
/// ordered list is renumbered 1..N. Unordered items follow with their order
/// left as `None`. A `None` target leaves the changed item unordered.
pub fn resequence(
    siblings: Vec<OrderedItem>,
    changed_id: i64,
    target_order: Option<i32>,
) -> Vec<OrderedItem> {
    let mut ordered: Vec<OrderedItem> = Vec::new();
    let mut unordered: Vec<OrderedItem> = Vec::new();
    let mut changed: Option<OrderedItem> = None;

    for item in siblings {
        if item.id == changed_id {
            changed = Some(item);
        } else if item.execution_order.is_some() {
            ordered.push(item);
        } else {
            unordered.push(item);
        }
    }

    ordered.sort_by_key(|item| item.execution_order);

    if let Some(mut item) = changed {
        match target_order {
            Some(target) => {
                // Clamp the insertion index to [0, len].
                let index = (target - 1).clamp(0, ordered.len() as i32) as usize;
                item.execution_order = Some(target);
                ordered.insert(index, item);
            }
            None => {
                item.execution_order = None;
                unordered.push(item);
            }
        }
    }

    for (i, item) in ordered.iter_mut().enumerate() {
        item.execution_order = Some(i as i32 + 1);
    }

    ordered.extend(unordered);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(id: i64, order: Option<i32>) -> OrderedItem {
        OrderedItem {
            id,
            execution_order: order,
        }
    }

    fn orders(items: &[OrderedItem]) -> Vec<(i64, Option<i32>)> {
        items.iter().map(|i| (i.id, i.execution_order)).collect()
    }

    #[test]
    fn move_last_to_second() {
        // A(1) B(2) C(3) D(4), D -> 2  =>  A=1 D=2 B=3 C=4.
        let out = resequence(
            vec![item(1, Some(1)), item(2, Some(2)), item(3, Some(3)), item(4, Some(4))],
            4,
            Some(2),
        );
        assert_eq!(
            orders(&out),
            vec![(1, Some(1)), (4, Some(2)), (2, Some(3)), (3, Some(4))]
        );
    }

    #[test]
    fn rerunning_same_move_is_noop() {
        let first = resequence(
            vec![item(1, Some(1)), item(2, Some(2)), item(3, Some(3)), item(4, Some(4))],
            4,
            Some(2),
        );
        let second = resequence(first.clone(), 4, Some(2));
        assert_eq!(orders(&first), orders(&second));
    }

    #[test]
    fn target_clamped_high() {
        let out = resequence(vec![item(1, Some(1)), item(2, Some(2))], 1, Some(99));
        assert_eq!(orders(&out), vec![(2, Some(1)), (1, Some(2))]);
    }

    #[test]
    fn target_clamped_low() {
        let out = resequence(vec![item(1, Some(1)), item(2, Some(2))], 2, Some(0));
        assert_eq!(orders(&out), vec![(2, Some(1)), (1, Some(2))]);
    }

    #[test]
    fn none_target_unorders_item() {
        let out = resequence(
            vec![item(1, Some(1)), item(2, Some(2)), item(3, Some(3))],
            2,
            None,
        );
        assert_eq!(orders(&out), vec![(1, Some(1)), (3, Some(2)), (2, None)]);
    }

    #[test]
    fn unordered_items_keep_null_order() {
        let out = resequence(
            vec![item(1, Some(2)), item(2, None), item(3, Some(1))],
            1,
            Some(1),
        );
        assert_eq!(orders(&out), vec![(1, Some(1)), (3, Some(2)), (2, None)]);
    }

    #[test]
    fn assigning_order_to_unordered_item() {
        let out = resequence(
            vec![item(1, Some(1)), item(2, Some(2)), item(3, None)],
            3,
            Some(1),
        );
        assert_eq!(
            orders(&out),
            vec![(3, Some(1)), (1, Some(2)), (2, Some(3))]
        );
    }

    #[test]
    fn gapped_input_is_repaired() {
        let out = resequence(
            vec![item(1, Some(3)), item(2, Some(7)), item(3, Some(9))],
            3,
            Some(1),
        );
        assert_eq!(
            orders(&out),
            vec![(3, Some(1)), (1, Some(2)), (2, Some(3))]
        );
    }
}
