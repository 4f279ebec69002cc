//! Restart schedules: how many backtracks each restart sequence gets.

use sgiso_common::Config;

/// The Luby sequence 1 1 2 1 1 2 4 ..., generated by list doubling:
/// whenever the cursor reaches the end, the whole list is appended to
/// itself followed by twice its last element.
#[derive(Clone, Debug)]
pub(crate) struct Luby {
    sequence: Vec<u64>,
    position: usize,
}

impl Luby {
    pub(crate) fn new() -> Self {
        Luby { sequence: vec![1], position: 0 }
    }

    pub(crate) fn next(&mut self) -> u64 {
        let value = self.sequence[self.position];
        if self.position + 1 == self.sequence.len() {
            let mut copy = self.sequence.clone();
            let last = value;
            self.sequence.append(&mut copy);
            self.sequence.push(last * 2);
        }
        self.position += 1;
        value
    }
}

/// A worker's restart budget source. Workers that never restart on
/// their own (enumeration, no restarts configured, or a non-zero rank
/// under triggered restarts) use `Never` and only restart when told to.
#[derive(Clone, Debug)]
pub(crate) enum RestartSchedule {
    Never,
    Geometric { current: f64, multiplier: f64 },
    Luby { luby: Luby, multiplier: u64 },
}

impl RestartSchedule {
    pub(crate) fn for_worker(config: &Config, thread: usize) -> Self {
        if config.enumerate || config.dds || config.restarts_constant == 0 {
            RestartSchedule::Never
        } else if config.triggered_restarts && thread != 0 {
            RestartSchedule::Never
        } else if config.geometric_multiplier != 0.0 {
            RestartSchedule::Geometric {
                current: config.restarts_constant as f64,
                multiplier: config.geometric_multiplier,
            }
        } else {
            RestartSchedule::Luby { luby: Luby::new(), multiplier: config.restarts_constant }
        }
    }

    /// Backtracks allowed before the next restart, or `None` for no
    /// self-imposed limit.
    pub(crate) fn next_budget(&mut self) -> Option<i64> {
        match self {
            RestartSchedule::Never => None,
            RestartSchedule::Geometric { current, multiplier } => {
                *current *= *multiplier;
                Some(current.round() as i64)
            }
            RestartSchedule::Luby { luby, multiplier } => {
                Some((luby.next() * *multiplier) as i64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn luby_prefix() {
        let mut luby = Luby::new();
        let prefix: Vec<u64> = (0..15).map(|_| luby.next()).collect();
        assert_eq!(prefix, vec![1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8]);
    }

    #[test]
    fn luby_budgets_scale_by_the_constant() {
        let config = Config { restarts_constant: 660, ..Config::default() };
        let mut schedule = RestartSchedule::for_worker(&config, 0);
        assert_eq!(schedule.next_budget(), Some(660));
        assert_eq!(schedule.next_budget(), Some(660));
        assert_eq!(schedule.next_budget(), Some(1320));
    }

    #[test]
    fn geometric_budgets_grow() {
        let config = Config {
            restarts_constant: 100,
            geometric_multiplier: 1.5,
            ..Config::default()
        };
        let mut schedule = RestartSchedule::for_worker(&config, 0);
        assert_eq!(schedule.next_budget(), Some(150));
        assert_eq!(schedule.next_budget(), Some(225));
        assert_eq!(schedule.next_budget(), Some(338));
    }

    #[rstest]
    #[case(Config { enumerate: true, ..Config::default() }, 0)]
    #[case(Config { restarts_constant: 0, ..Config::default() }, 0)]
    #[case(Config { triggered_restarts: true, ..Config::default() }, 1)]
    fn unlimited_budgets(#[case] config: Config, #[case] thread: usize) {
        let mut schedule = RestartSchedule::for_worker(&config, thread);
        assert_eq!(schedule.next_budget(), None);
    }

    #[test]
    fn triggered_restarts_still_schedule_the_first_worker() {
        let config = Config { triggered_restarts: true, ..Config::default() };
        let mut schedule = RestartSchedule::for_worker(&config, 0);
        assert_eq!(schedule.next_budget(), Some(660));
    }
}
