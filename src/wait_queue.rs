//! # Wait queue
//!
//! Per-resource, singly-linked, priority-sorted list of blocked tasks.
//! Sorted primarily by priority descending; insertion is strictly FIFO
//! among equal priorities. Extraction is always O(1) and always returns
//! the highest-priority, earliest-arrived waiter.
//!
//! The link field reused here is [`Tcb::ring_next`] — a task is never
//! simultaneously in a priority ring and on a wait queue, so the single
//! field safely serves both roles.

use crate::task::{TaskId, Tcb};

/// Insert `id` into the wait queue rooted at `*head`.
///
/// `id` is placed after all equal-priority predecessors and before the
/// first strictly-lower-priority successor, preserving FIFO order among
/// equal priorities.
pub fn insert(tasks: &mut [Tcb], head: &mut Option<TaskId>, id: TaskId) {
    tasks[id].ring_next = None;

    let Some(head_id) = *head else {
        *head = Some(id);
        return;
    };

    let priority = tasks[id].priority;
    if priority > tasks[head_id].priority {
        tasks[id].ring_next = Some(head_id);
        *head = Some(id);
        return;
    }

    let mut cursor = head_id;
    while let Some(next_id) = tasks[cursor].ring_next {
        if priority >= tasks[next_id].priority {
            cursor = next_id;
        } else {
            break;
        }
    }
    tasks[id].ring_next = tasks[cursor].ring_next;
    tasks[cursor].ring_next = Some(id);
}

/// Pop and return the current head (highest priority, earliest
/// arrival), or `None` if the queue is empty.
pub fn extract(tasks: &mut [Tcb], head: &mut Option<TaskId>) -> Option<TaskId> {
    let head_id = (*head)?;
    *head = tasks[head_id].ring_next;
    tasks[head_id].ring_next = None;
    Some(head_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_TASKS;

    fn make_tasks() -> [Tcb; MAX_TASKS] {
        core::array::from_fn(|i| {
            let mut t = Tcb::empty();
            t.init(i, 0);
            t
        })
    }

    #[test]
    fn empty_queue_extracts_none() {
        let mut tasks = make_tasks();
        let mut head = None;
        assert_eq!(extract(&mut tasks, &mut head), None);
    }

    #[test]
    fn higher_priority_jumps_the_queue() {
        let mut tasks = make_tasks();
        tasks[1].priority = 1;
        tasks[2].priority = 5;
        tasks[3].priority = 3;
        let mut head = None;

        insert(&mut tasks, &mut head, 1);
        insert(&mut tasks, &mut head, 2);
        insert(&mut tasks, &mut head, 3);

        // Order should be 2 (prio 5), 3 (prio 3), 1 (prio 1)
        assert_eq!(extract(&mut tasks, &mut head), Some(2));
        assert_eq!(extract(&mut tasks, &mut head), Some(3));
        assert_eq!(extract(&mut tasks, &mut head), Some(1));
        assert_eq!(extract(&mut tasks, &mut head), None);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut tasks = make_tasks();
        for i in [1, 2, 3] {
            tasks[i].priority = 2;
        }
        let mut head = None;
        insert(&mut tasks, &mut head, 1);
        insert(&mut tasks, &mut head, 2);
        insert(&mut tasks, &mut head, 3);

        assert_eq!(extract(&mut tasks, &mut head), Some(1));
        assert_eq!(extract(&mut tasks, &mut head), Some(2));
        assert_eq!(extract(&mut tasks, &mut head), Some(3));
    }

    #[test]
    fn equal_priority_after_unequal() {
        // priority 5 arrives first, then two priority-2 arrivals: the
        // second priority-2 arrival must land after the first, not before.
        let mut tasks = make_tasks();
        tasks[1].priority = 5;
        tasks[2].priority = 2;
        tasks[3].priority = 2;
        let mut head = None;
        insert(&mut tasks, &mut head, 1);
        insert(&mut tasks, &mut head, 2);
        insert(&mut tasks, &mut head, 3);

        assert_eq!(extract(&mut tasks, &mut head), Some(1));
        assert_eq!(extract(&mut tasks, &mut head), Some(2));
        assert_eq!(extract(&mut tasks, &mut head), Some(3));
    }
}
