//! Report-side state: the idle/active toggle and the state machine that
//! decides which HID input report goes out next.

use crate::keycodes::KeyCode;

/// Fixed-layout boot-protocol keyboard input report: modifier byte, reserved
/// byte, six keycode slots. This firmware only ever fills the first slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyReport {
    modifier: u8,
    keycodes: [u8; 6],
}

impl KeyReport {
    /// Report holding the given modifier/key combination.
    pub const fn pressed(modifier: u8, key: KeyCode) -> Self {
        Self { modifier, keycodes: [key as u8, 0, 0, 0, 0, 0] }
    }

    /// The all-zero "no keys pressed" report.
    pub const fn released() -> Self {
        Self { modifier: 0, keycodes: [0; 6] }
    }

    /// Wire layout, reserved byte included.
    pub fn as_bytes(&self) -> [u8; 8] {
        let k = &self.keycodes;
        [self.modifier, 0, k[0], k[1], k[2], k[3], k[4], k[5]]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Nothing to send.
    Wait,
    /// The configured combination is held; keep reporting it.
    SendKey,
    /// The combination was let go; one all-zero report is owed.
    ReleaseKey,
}

/// `KeyReporter` turns consumed press edges into an alternating
/// hold/release report stream.
///
/// A press edge flips the operating mode. Entering active mode arms
/// `SendKey`; leaving it arms `ReleaseKey`. `SendKey` stays armed so the
/// held combination is re-sent every time the endpoint frees up, while
/// `ReleaseKey` emits exactly one empty report and disarms, which
/// guarantees the host never ends up with a stuck key: every hold is
/// followed by exactly one release before the next hold can start.
///
/// All transitions go through [`toggle`](Self::toggle) and
/// [`next_report`](Self::next_report); there is no other writer.
pub struct KeyReporter {
    modifier: u8,
    key: KeyCode,
    active: bool,
    phase: Phase,
    report: KeyReport,
}

impl KeyReporter {
    /// A reporter that emits `modifier` + `key` while active.
    pub const fn new(modifier: u8, key: KeyCode) -> Self {
        Self {
            modifier,
            key,
            active: false,
            phase: Phase::Wait,
            report: KeyReport::released(),
        }
    }

    /// Consume one press edge: flip between idle and active mode and arm
    /// the matching report phase. Returns the new mode so the caller can
    /// drive the indicator LED.
    pub fn toggle(&mut self) -> bool {
        self.active = !self.active;
        self.phase = if self.active { Phase::SendKey } else { Phase::ReleaseKey };
        self.active
    }

    /// Current operating mode, true = active.
    #[allow(unused)]
    pub fn active(&self) -> bool {
        self.active
    }

    /// True when a report is due on the interrupt pipe.
    pub fn pending(&self) -> bool {
        self.phase != Phase::Wait
    }

    /// Build the report for the current phase, or `None` when idle.
    pub fn next_report(&mut self) -> Option<&KeyReport> {
        match self.phase {
            Phase::Wait => None,
            Phase::SendKey => {
                self.report = KeyReport::pressed(self.modifier, self.key);
                Some(&self.report)
            }
            Phase::ReleaseKey => {
                self.report = KeyReport::released();
                self.phase = Phase::Wait;
                Some(&self.report)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycodes::modifier;

    fn reporter() -> KeyReporter {
        KeyReporter::new(modifier::LEFT_SHIFT, KeyCode::W)
    }

    #[test]
    fn boots_idle_with_nothing_to_send() {
        let mut r = reporter();
        assert!(!r.active());
        assert!(!r.pending());
        assert_eq!(r.next_report(), None);
    }

    #[test]
    fn press_edge_arms_the_held_combination() {
        let mut r = reporter();
        assert!(r.toggle());
        assert!(r.pending());
        let report = r.next_report().copied().unwrap();
        assert_eq!(
            report.as_bytes(),
            [modifier::LEFT_SHIFT, 0, KeyCode::W as u8, 0, 0, 0, 0, 0]
        );
        // Still armed: the held key keeps being reported until the next
        // toggle.
        assert!(r.pending());
        assert_eq!(r.next_report().copied(), Some(report));
    }

    #[test]
    fn second_press_releases_exactly_once() {
        let mut r = reporter();
        r.toggle();
        r.next_report();
        assert!(!r.toggle());
        let report = r.next_report().copied().unwrap();
        assert_eq!(report.as_bytes(), [0; 8]);
        assert!(!r.pending());
        assert_eq!(r.next_report(), None);
    }

    #[test]
    fn mode_strictly_alternates() {
        let mut r = reporter();
        assert!(r.toggle());
        assert!(!r.toggle());
        assert!(r.toggle());
        assert!(!r.toggle());
    }

    #[test]
    fn busy_transport_does_not_lose_the_release() {
        // The endpoint stays busy through a full press/press cycle: the
        // hold was never observed, but the release still goes out once.
        let mut r = reporter();
        r.toggle();
        r.toggle();
        let report = r.next_report().copied().unwrap();
        assert_eq!(report.as_bytes(), [0; 8]);
        assert!(!r.pending());
        assert_eq!(r.next_report(), None);
    }

    #[test]
    fn hold_phase_survives_a_busy_transport() {
        let mut r = reporter();
        r.toggle();
        // Gate never fires; the phase must stay armed.
        assert!(r.pending());
        assert!(r.pending());
        let report = r.next_report().copied().unwrap();
        assert_ne!(report.as_bytes(), [0; 8]);
    }

    #[test]
    fn release_report_is_all_zero_bytes() {
        assert_eq!(KeyReport::released().as_bytes(), [0; 8]);
    }
}
