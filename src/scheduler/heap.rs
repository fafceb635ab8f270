use crate::scheduler::job::Job;

/// Slot in the heap's backing array. `index` mirrors the slot position and is
/// rewritten on every move; it never leaves this module.
#[derive(Debug)]
struct HeapNode {
    job: Job,
    index: usize,
}

/// Array-backed binary max-heap of jobs ordered by [`Job::precedes`].
///
/// Not synchronised: [`JobQueue`](crate::scheduler::JobQueue) owns one of these
/// behind its lock.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    nodes: Vec<HeapNode>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The job that [`extract_max`](Self::extract_max) would return next.
    pub fn peek(&self) -> Option<&Job> {
        self.nodes.first().map(|node| &node.job)
    }

    /// Insert a job in O(log n).
    pub fn insert(&mut self, job: Job) {
        let index = self.nodes.len();
        self.nodes.push(HeapNode { job, index });
        self.sift_up(index);
    }

    /// Remove and return the highest-ranked job in O(log n).
    ///
    /// Returns `None` on an empty heap. Callers that hold the queue lock are
    /// expected to check for emptiness first.
    pub fn extract_max(&mut self) -> Option<Job> {
        let last = self.nodes.len().checked_sub(1)?;
        self.swap(0, last);
        let node = self.nodes.pop()?;
        if !self.nodes.is_empty() {
            self.sift_down(0);
        }
        Some(node.job)
    }

    fn precedes(&self, i: usize, j: usize) -> bool {
        self.nodes[i].job.precedes(&self.nodes[j].job)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.nodes.swap(i, j);
        self.nodes[i].index = i;
        self.nodes[j].index = j;
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.precedes(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut best = left;
            if right < len && self.precedes(right, left) {
                best = right;
            }
            if !self.precedes(best, i) {
                break;
            }
            self.swap(i, best);
            i = best;
        }
    }

    /// Checks the heap property and index bookkeeping for every slot.
    #[cfg(test)]
    fn is_valid(&self) -> bool {
        self.nodes.iter().enumerate().all(|(i, node)| {
            let parent_ok = i == 0 || !self.precedes(i, (i - 1) / 2);
            parent_ok && node.index == i
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn job_at(id: &str, priority: i64, offset_ms: i64) -> Job {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Job::with_timestamp(id, priority, base + Duration::milliseconds(offset_ms))
    }

    fn drain(heap: &mut PriorityQueue) -> Vec<String> {
        std::iter::from_fn(|| heap.extract_max())
            .map(|job| job.id)
            .collect()
    }

    #[test]
    fn empty_heap() {
        let mut heap = PriorityQueue::new();
        assert_eq!(heap.len(), 0);
        assert!(heap.is_empty());
        assert!(heap.peek().is_none());
        assert!(heap.extract_max().is_none());
    }

    #[test]
    fn extracts_in_priority_order() {
        let mut heap = PriorityQueue::with_capacity(8);
        for (id, priority) in [("c", 3), ("a", 1), ("e", 5), ("b", 2), ("d", 4)] {
            heap.insert(job_at(id, priority, 0));
            assert!(heap.is_valid());
        }
        assert_eq!(heap.len(), 5);
        assert_eq!(heap.peek().map(|j| j.id.as_str()), Some("e"));
        assert_eq!(drain(&mut heap), vec!["e", "d", "c", "b", "a"]);
        assert!(heap.is_empty());
    }

    #[test]
    fn equal_priority_earlier_timestamp_first() {
        let mut heap = PriorityQueue::new();
        heap.insert(job_at("late", 1, 10));
        heap.insert(job_at("early", 1, 0));
        assert_eq!(drain(&mut heap), vec!["early", "late"]);

        heap.insert(job_at("early", 1, 0));
        heap.insert(job_at("late", 1, 10));
        assert_eq!(drain(&mut heap), vec!["early", "late"]);
    }

    #[test]
    fn mixed_priorities_and_timestamps() {
        let mut heap = PriorityQueue::new();
        heap.insert(job_at("job1", 1, 0));
        heap.insert(job_at("job2", 2, 1));
        heap.insert(job_at("job3", 1, 2));
        assert_eq!(drain(&mut heap), vec!["job2", "job1", "job3"]);
    }

    #[test]
    fn negative_priorities_rank_below_zero() {
        let mut heap = PriorityQueue::new();
        heap.insert(job_at("neg", -5, 0));
        heap.insert(job_at("zero", 0, 5));
        assert_eq!(drain(&mut heap), vec!["zero", "neg"]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Insert(i64, i64),
            Extract,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                3 => (-5i64..5, 0i64..20).prop_map(|(p, t)| Op::Insert(p, t)),
                1 => Just(Op::Extract),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: the heap invariant holds after every operation.
            #[test]
            fn heap_property_survives_interleaved_ops(ops in prop::collection::vec(op(), 0..200)) {
                let mut heap = PriorityQueue::new();
                let mut live = 0usize;
                for (n, op) in ops.into_iter().enumerate() {
                    match op {
                        Op::Insert(p, t) => {
                            heap.insert(job_at(&n.to_string(), p, t));
                            live += 1;
                        }
                        Op::Extract => {
                            let extracted = heap.extract_max();
                            prop_assert_eq!(extracted.is_some(), live > 0);
                            live = live.saturating_sub(1);
                        }
                    }
                    prop_assert!(heap.is_valid());
                    prop_assert_eq!(heap.len(), live);
                }
            }

            /// Property: distinct keys come out in strictly decreasing order.
            #[test]
            fn distinct_keys_extract_in_total_order(
                keys in prop::collection::hash_set((-50i64..50, 0i64..1000), 1..100)
            ) {
                let mut heap = PriorityQueue::new();
                for (n, (p, t)) in keys.iter().enumerate() {
                    heap.insert(job_at(&n.to_string(), *p, *t));
                }
                let mut previous = heap.extract_max().unwrap();
                while let Some(next) = heap.extract_max() {
                    prop_assert!(previous.precedes(&next));
                    previous = next;
                }
            }
        }
    }
}
