use std::collections::VecDeque;
use vigil_types::HealthSample;

/// The last `capacity` samples of one worker, oldest first.
#[derive(Clone, Debug)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<HealthSample>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: HealthSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn as_slice(&mut self) -> &[HealthSample] {
        self.samples.make_contiguous()
    }

    pub fn latest(&self) -> Option<&HealthSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::WorkerId;

    #[test]
    fn test_window_keeps_last_k() {
        let mut window = SampleWindow::new(3);
        for backlog in 0..5u64 {
            window.push(HealthSample::healthy(WorkerId::new("w")).with_backlog(backlog));
        }
        assert_eq!(window.len(), 3);
        let backlogs: Vec<u64> = window.as_slice().iter().filter_map(|s| s.queue_backlog).collect();
        assert_eq!(backlogs, vec![2, 3, 4]);
        assert_eq!(window.latest().and_then(|s| s.queue_backlog), Some(4));

        window.clear();
        assert!(window.is_empty());
    }
}
