// Moving average over a fixed circular window
//
// Used to smooth the ultrasonic distance readings before the obstacle check.

/// Fixed-size moving average with an O(1) update.
///
/// Every slot starts at a caller-supplied default so the first averages are
/// already close to a realistic baseline instead of ramping up from zero.
#[derive(Debug, Clone)]
pub struct SpeedFilter {
    window: Vec<i32>,
    write_index: usize,
    running_sum: i64,
}

impl SpeedFilter {
    /// Create a filter of `length` slots, all preset to `default`.
    /// A zero length is raised to one.
    pub fn new(default: i32, length: usize) -> Self {
        let length = length.max(1);
        Self {
            window: vec![default; length],
            write_index: 0,
            running_sum: i64::from(default) * length as i64,
        }
    }

    /// Replace the oldest sample with `value` and return the new average.
    ///
    /// The average truncates toward zero.
    pub fn add(&mut self, value: i32) -> i32 {
        let evicted = std::mem::replace(&mut self.window[self.write_index], value);
        self.running_sum += i64::from(value) - i64::from(evicted);
        self.write_index = (self.write_index + 1) % self.window.len();
        self.average()
    }

    pub fn average(&self) -> i32 {
        (self.running_sum / self.window.len() as i64) as i32
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn running_sum(&self) -> i64 {
        self.running_sum
    }

    /// Current window contents in slot order (not insertion order)
    pub fn window(&self) -> &[i32] {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_baseline() {
        let mut filter = SpeedFilter::new(100, 10);
        assert_eq!(filter.average(), 100);
        assert_eq!(filter.add(100), 100);
    }

    #[test]
    fn test_full_window_of_new_values() {
        let mut filter = SpeedFilter::new(100, 10);
        let values = [3, 8, 15, 2, 40, 7, 11, 9, 1, 5];
        let mut last = 0;
        for v in values {
            last = filter.add(v);
        }
        // 101 / 10 truncates to 10
        assert_eq!(last, 10);
        assert_eq!(filter.running_sum(), 101);
    }

    #[test]
    fn test_partial_window_mixes_default() {
        let mut filter = SpeedFilter::new(100, 4);
        assert_eq!(filter.add(0), 75);
        assert_eq!(filter.add(0), 50);
        assert_eq!(filter.add(0), 25);
        assert_eq!(filter.add(0), 0);
        // oldest zero is evicted, wraps to slot 0
        assert_eq!(filter.add(8), 2);
    }

    #[test]
    fn test_truncates_toward_zero() {
        let mut filter = SpeedFilter::new(0, 3);
        assert_eq!(filter.add(2), 0); // 2 / 3
        assert_eq!(filter.add(2), 1); // 4 / 3
        let mut negative = SpeedFilter::new(0, 3);
        assert_eq!(negative.add(-2), 0); // -2 / 3 truncates up, not down
    }

    #[test]
    fn test_zero_length_is_clamped() {
        let mut filter = SpeedFilter::new(7, 0);
        assert_eq!(filter.len(), 1);
        assert_eq!(filter.add(42), 42);
    }
}
