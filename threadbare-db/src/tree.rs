//! Bounded-depth reply-tree assembly.
//!
//! Queries fetch replies level by level as flat rows; this module nests them
//! back under their parents. Depth is bounded by what was fetched, never by
//! this code: a node whose parent is not part of the input is dropped, which
//! is exactly how "populate two levels, no further" behaves.

use std::collections::HashMap;
use threadbare_common::model::{
    Id,
    thread::{Thread, ThreadMarker},
};

/// Nests `replies` under `roots` (and under each other), preserving the
/// order of `replies` within each parent's child list. Callers pass replies
/// ordered by snowflake, so child order is insertion order.
pub(crate) fn attach_replies(roots: &mut [Thread], replies: Vec<Thread>) {
    let mut children_of: HashMap<Id<ThreadMarker>, Vec<Thread>> = HashMap::new();
    for reply in replies {
        // Replies always carry a parent link; a missing one would mean the
        // query predicate was wrong, and the row is skipped.
        let Some(parent) = reply.parent else {
            continue;
        };
        children_of.entry(parent).or_default().push(reply);
    }

    for root in roots.iter_mut() {
        adopt(root, &mut children_of);
    }
}

fn adopt(node: &mut Thread, children_of: &mut HashMap<Id<ThreadMarker>, Vec<Thread>>) {
    if let Some(children) = children_of.remove(&node.id) {
        node.children = children;
        for child in &mut node.children {
            adopt(child, children_of);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::attach_replies;
    use threadbare_common::model::{
        thread::{Thread, ThreadText},
        user::{AuthId, AuthorProfile},
    };
    use time::macros::utc_datetime;

    fn node(id: u64, parent: Option<u64>) -> Thread {
        Thread {
            id: id.into(),
            text: ThreadText::new(format!("thread {id}")).unwrap(),
            author: AuthorProfile {
                id: 1u64.into(),
                auth_id: AuthId::new("user_a".to_owned()).unwrap(),
                name: "Ada".to_owned(),
                image: String::new(),
            },
            parent: parent.map(Into::into),
            community: None,
            created_at: utc_datetime!(2025-06-15 12:30),
            children: Vec::new(),
        }
    }

    fn ids(children: &[Thread]) -> Vec<u64> {
        children.iter().map(|child| child.id.into()).collect()
    }

    #[test]
    fn nests_two_levels_under_the_root() {
        let mut roots = vec![node(1, None)];
        let replies = vec![
            node(10, Some(1)),
            node(11, Some(1)),
            node(100, Some(10)),
            node(110, Some(11)),
        ];

        attach_replies(&mut roots, replies);

        let root = &roots[0];
        assert_eq!(ids(&root.children), [10, 11]);
        assert_eq!(ids(&root.children[0].children), [100]);
        assert_eq!(ids(&root.children[1].children), [110]);
    }

    #[test]
    fn child_order_follows_input_order() {
        let mut roots = vec![node(1, None)];
        let replies = vec![node(10, Some(1)), node(11, Some(1)), node(12, Some(1))];

        attach_replies(&mut roots, replies);

        assert_eq!(ids(&roots[0].children), [10, 11, 12]);
    }

    #[test]
    fn each_reply_lands_under_exactly_one_parent() {
        let mut roots = vec![node(1, None), node(2, None)];
        let replies = vec![node(10, Some(1)), node(20, Some(2))];

        attach_replies(&mut roots, replies);

        assert_eq!(ids(&roots[0].children), [10]);
        assert_eq!(ids(&roots[1].children), [20]);
    }

    #[test]
    fn unfetched_ancestors_bound_the_depth() {
        // 1000's parent (100) is absent from the input, so it cannot be
        // placed and disappears, exactly like a populate that stopped a
        // level higher.
        let mut roots = vec![node(1, None)];
        let replies = vec![node(10, Some(1)), node(1000, Some(100))];

        attach_replies(&mut roots, replies);

        assert_eq!(ids(&roots[0].children), [10]);
        assert!(roots[0].children[0].children.is_empty());
    }

    #[test]
    fn roots_without_replies_stay_empty() {
        let mut roots = vec![node(1, None)];
        attach_replies(&mut roots, Vec::new());
        assert!(roots[0].children.is_empty());
    }
}
