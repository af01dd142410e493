//! Property-based tests for the filter and the drive command

use rover_runtime::filter::SpeedFilter;
use rover_runtime::messages::DriveCommand;

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Key {
        Forward,
        Backward,
        Left,
        Right,
        Stop,
    }

    fn key() -> impl Strategy<Value = Key> {
        prop_oneof![
            Just(Key::Forward),
            Just(Key::Backward),
            Just(Key::Left),
            Just(Key::Right),
            Just(Key::Stop),
        ]
    }

    fn press(cmd: &mut DriveCommand, key: Key) {
        match key {
            Key::Forward => cmd.increment_forward(),
            Key::Backward => cmd.increment_backward(),
            Key::Left => cmd.increment_left(),
            Key::Right => cmd.increment_right(),
            Key::Stop => cmd.stop(),
        }
    }

    proptest! {
        #[test]
        fn running_sum_matches_window(
            default in -1000i32..1000,
            length in 1usize..32,
            values in prop::collection::vec(-100_000i32..100_000, 0..200),
        ) {
            let mut filter = SpeedFilter::new(default, length);
            for v in values {
                let average = filter.add(v);
                let sum: i64 = filter.window().iter().map(|&x| i64::from(x)).sum();
                prop_assert_eq!(filter.running_sum(), sum);
                prop_assert_eq!(i64::from(average), sum / length as i64);
            }
        }

        #[test]
        fn full_window_average_is_truncated_mean(
            values in prop::collection::vec(0i32..600, 10),
        ) {
            let mut filter = SpeedFilter::new(100, 10);
            let mut last = 0;
            for &v in &values {
                last = filter.add(v);
            }
            let sum: i32 = values.iter().sum();
            prop_assert_eq!(last, sum / 10);
        }

        #[test]
        fn speeds_stay_in_range(
            increment in 1i16..=255,
            keys in prop::collection::vec(key(), 0..64),
        ) {
            let mut cmd = DriveCommand::with_increment(increment);
            for k in keys {
                press(&mut cmd, k);
                prop_assert!((-255..=255).contains(&cmd.left_speed()));
                prop_assert!((-255..=255).contains(&cmd.right_speed()));
            }
        }

        #[test]
        fn forward_and_backward_leave_sides_equal(
            keys in prop::collection::vec(key(), 0..32),
            last_forward in any::<bool>(),
        ) {
            let mut cmd = DriveCommand::new();
            for k in keys {
                press(&mut cmd, k);
            }
            press(&mut cmd, if last_forward { Key::Forward } else { Key::Backward });
            prop_assert_eq!(cmd.left_speed(), cmd.right_speed());
        }
    }
}
