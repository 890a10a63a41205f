//! Fixed-capacity sliding window
//!
//! The window starts full of a neutral value so that readers never see a
//! short buffer. Results computed before [`SlidingWindow::is_warm`] turns true
//! are biased by that padding.

use std::collections::VecDeque;

/// Insertion-ordered ring buffer, oldest sample at index 0
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    fill: T,
    real_samples: u64,
}

impl<T: Clone> SlidingWindow<T> {
    /// Create a window of `capacity` slots pre-filled with `fill`
    pub fn with_fill(capacity: usize, fill: T) -> Self {
        let capacity = capacity.max(1);
        let mut buffer = VecDeque::with_capacity(capacity);
        buffer.extend(std::iter::repeat(fill.clone()).take(capacity));

        SlidingWindow {
            buffer,
            capacity,
            fill,
            real_samples: 0,
        }
    }

    /// Append a value, evicting the oldest one
    pub fn push(&mut self, value: T) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
        self.real_samples += 1;
    }

    /// Copy of the contents, oldest first
    pub fn as_sequence(&self) -> Vec<T> {
        self.buffer.iter().cloned().collect()
    }

    /// Current length (equal to capacity)
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed value
    pub fn latest(&self) -> Option<&T> {
        if self.real_samples == 0 {
            None
        } else {
            self.buffer.back()
        }
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    /// Number of real values pushed since creation or the last clear
    pub fn real_samples(&self) -> u64 {
        self.real_samples
    }

    /// True once every slot holds a real value
    pub fn is_warm(&self) -> bool {
        self.real_samples >= self.capacity as u64
    }

    /// Refill with the neutral value and forget pushed samples
    pub fn clear(&mut self) {
        for slot in self.buffer.iter_mut() {
            *slot = self.fill.clone();
        }
        self.real_samples = 0;
    }
}

impl<T: Clone + Default> SlidingWindow<T> {
    /// Create a window pre-filled with `T::default()`
    pub fn new(capacity: usize) -> Self {
        Self::with_fill(capacity, T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefilled_with_zero() {
        let window: SlidingWindow<f64> = SlidingWindow::new(5);
        assert_eq!(window.size(), 5);
        assert_eq!(window.as_sequence(), vec![0.0; 5]);
        assert!(window.latest().is_none());
        assert!(!window.is_warm());
    }

    #[test]
    fn test_keeps_last_n_in_arrival_order() {
        let capacity = 4;
        for extra in 0..6 {
            let mut window = SlidingWindow::new(capacity);
            let total = capacity + extra;
            for i in 0..total {
                window.push(i as f64);
            }

            let expected: Vec<f64> = (extra..total).map(|i| i as f64).collect();
            assert_eq!(window.size(), capacity);
            assert_eq!(window.as_sequence(), expected);
            assert!(window.is_warm());
        }
    }

    #[test]
    fn test_partial_fill_keeps_padding_in_front() {
        let mut window = SlidingWindow::new(4);
        window.push(7.0);
        window.push(8.0);

        assert_eq!(window.as_sequence(), vec![0.0, 0.0, 7.0, 8.0]);
        assert_eq!(window.latest(), Some(&8.0));
        assert_eq!(window.real_samples(), 2);
    }

    #[test]
    fn test_clear_restores_fill() {
        let mut window = SlidingWindow::with_fill(3, -1i32);
        window.push(1);
        window.push(2);
        window.push(3);
        window.clear();

        assert_eq!(window.as_sequence(), vec![-1, -1, -1]);
        assert_eq!(window.real_samples(), 0);
        assert_eq!(window.size(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut window: SlidingWindow<f64> = SlidingWindow::new(0);
        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.as_sequence(), vec![2.0]);
    }
}
