//! Progress indicator state driven by the `progressbar.*` events.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndicatorId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressState {
    active: Option<IndicatorId>,
    value: u8,
}

impl ProgressState {
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn indicator(&self) -> Option<IndicatorId> {
        self.active
    }

    /// Activates a fresh indicator at 0. Returns `false` when one is already
    /// active.
    pub fn init(&mut self, id: IndicatorId) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(id);
        self.value = 0;
        true
    }

    /// Updates the active indicator, clamping to `0..=100`.
    pub fn step(&mut self, raw: f64) -> Option<(IndicatorId, u8)> {
        let id = self.active?;
        self.value = clamp_percent(raw);
        Some((id, self.value))
    }

    /// Completes the active indicator at 100 and deactivates it. The caller
    /// owns removing it from view.
    pub fn clear(&mut self) -> Option<IndicatorId> {
        let id = self.active.take()?;
        self.value = 100;
        Some(id)
    }

    /// Drops the active indicator without completing it.
    pub fn reset(&mut self) {
        self.active = None;
        self.value = 0;
    }
}

pub fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_without_init_changes_nothing() {
        let mut progress = ProgressState::default();
        assert_eq!(progress.step(50.0), None);
        assert!(!progress.is_active());
        assert_eq!(progress.value(), 0);
    }

    #[test]
    fn second_init_does_not_replace_active_indicator() {
        let mut progress = ProgressState::default();
        assert!(progress.init(IndicatorId(1)));
        progress.step(20.0);
        assert!(!progress.init(IndicatorId(2)));
        assert_eq!(progress.indicator(), Some(IndicatorId(1)));
        assert_eq!(progress.value(), 20);
    }

    #[test]
    fn clear_forces_completion_once() {
        let mut progress = ProgressState::default();
        progress.init(IndicatorId(1));
        progress.step(37.0);
        assert_eq!(progress.clear(), Some(IndicatorId(1)));
        assert_eq!(progress.value(), 100);
        assert!(!progress.is_active());
        assert_eq!(progress.clear(), None);
    }

    #[test]
    fn out_of_range_steps_clamp() {
        assert_eq!(clamp_percent(-4.0), 0);
        assert_eq!(clamp_percent(250.0), 100);
        assert_eq!(clamp_percent(49.6), 50);
        assert_eq!(clamp_percent(f64::NAN), 0);
    }
}
