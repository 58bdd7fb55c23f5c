//! 点位调度器：一个设备的全部发生器点位共用一个最小堆。

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// 按到期时间排序的点位调度器
#[derive(Debug)]
pub struct TagScheduler {
    heap: BinaryHeap<Reverse<(i64, usize)>>,
    intervals: Vec<i64>,
}

impl TagScheduler {
    /// 所有点位首次在 `start_ms` 到期
    pub fn new(intervals_ms: &[u64], start_ms: i64) -> Self {
        let intervals: Vec<i64> = intervals_ms
            .iter()
            .map(|interval| (*interval).max(1) as i64)
            .collect();
        let heap = (0..intervals.len())
            .map(|index| Reverse((start_ms, index)))
            .collect();
        Self { heap, intervals }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// 下一个到期时间
    pub fn next_due(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse((due, _))| *due)
    }

    /// 弹出所有已到期的点位下标并重新排期。
    ///
    /// 落后超过一个周期的点位从 `now_ms` 起重新计时，不补发。
    pub fn pop_due(&mut self, now_ms: i64) -> Vec<usize> {
        let mut due = Vec::new();
        while let Some(Reverse((due_ms, index))) = self.heap.peek().copied() {
            if due_ms > now_ms {
                break;
            }
            self.heap.pop();
            due.push(index);
            let interval = self.intervals[index];
            let mut next = due_ms + interval;
            if next <= now_ms {
                next = now_ms + interval;
            }
            self.heap.push(Reverse((next, index)));
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_due_order() {
        let mut scheduler = TagScheduler::new(&[1000, 250], 0);
        assert_eq!(scheduler.next_due(), Some(0));
        assert_eq!(scheduler.pop_due(0), vec![0, 1]);
        assert_eq!(scheduler.next_due(), Some(250));
        assert_eq!(scheduler.pop_due(249), Vec::<usize>::new());
        assert_eq!(scheduler.pop_due(250), vec![1]);
        assert_eq!(scheduler.pop_due(500), vec![1]);
        assert_eq!(scheduler.pop_due(750), vec![1]);
        assert_eq!(scheduler.pop_due(1000), vec![0, 1]);
    }

    #[test]
    fn late_tags_are_not_replayed() {
        let mut scheduler = TagScheduler::new(&[100], 0);
        scheduler.pop_due(0);
        assert_eq!(scheduler.pop_due(1050), vec![0]);
        assert_eq!(scheduler.next_due(), Some(1150));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let mut scheduler = TagScheduler::new(&[0], 10);
        assert_eq!(scheduler.pop_due(10), vec![0]);
        assert_eq!(scheduler.next_due(), Some(11));
    }
}
