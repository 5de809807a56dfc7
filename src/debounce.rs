//! Tick-based button debouncing with one-shot press-event latching.

/// Bitmask of monitored input lines, one bit per line. A single `u8` covers
/// every line this hardware has, with room to grow.
pub type LineMask = u8;

/// Consecutive agreeing ticks required before a level change is accepted.
/// Fixed by the 2-bit counter depth in [`Debouncer::sample`].
#[allow(unused)]
pub const DEBOUNCE_TICKS: u32 = 4;

/// `Debouncer` is an allocation-free, constant-time filter for a set of
/// input lines sampled at a fixed tick rate.
///
/// # Algorithm
/// Each line gets a 2-bit "vertical" counter, spread across the `ct0`/`ct1`
/// masks so that every line is counted in parallel with plain bit
/// arithmetic. A line whose raw sample disagrees with its debounced state
/// counts up once per tick; any tick that agrees resets the counter. Only
/// when the counter rolls over ([`DEBOUNCE_TICKS`] sustained ticks) does the
/// debounced state flip, so pulses shorter than the window are dropped and
/// no transition is ever accepted twice.
///
/// # Events
/// Accepted released-to-pressed edges are latched into a pending mask until
/// [`Debouncer::consume`] drains them, which makes the pending mask itself
/// the durable record of "press happened but not yet observed". The sampler
/// and the consumer run in different contexts (timer interrupt vs. main
/// loop); the caller wraps both in the same critical section.
pub struct Debouncer {
    /// Debounced line state, 1 = pressed.
    state: LineMask,
    /// Accepted press edges not yet consumed.
    pressed: LineMask,
    ct0: LineMask,
    ct1: LineMask,
}

impl Debouncer {
    pub const fn new() -> Self {
        Self::with_state(0)
    }

    /// Create a `Debouncer` that adopts `held` as the already-accepted
    /// state, so lines pressed across a reset do not latch a press event.
    pub const fn with_state(held: LineMask) -> Self {
        Self { state: held, pressed: 0, ct0: !0, ct1: !0 }
    }

    /// Feed one tick of raw samples. `raw` has a bit set for every line
    /// currently reading as pressed (already corrected for active-low
    /// wiring by the caller).
    ///
    /// Interrupt-context safe: a fixed handful of bitwise operations, no
    /// branches per line.
    pub fn sample(&mut self, raw: LineMask) {
        let changed = self.state ^ raw;
        self.ct0 = !(self.ct0 & changed);
        self.ct1 = self.ct0 ^ (self.ct1 & changed);
        // Both counter bits roll over together once the new level has held
        // for the full window.
        let accepted = changed & self.ct0 & self.ct1;
        self.state ^= accepted;
        // Latch released -> pressed edges only; releases flip the state but
        // are not events.
        self.pressed |= self.state & accepted;
    }

    /// Read and clear the pending press edges selected by `mask`.
    ///
    /// Each accepted press is observed by exactly one `consume` call, no
    /// matter how irregularly the consumer polls. Lines outside `mask`
    /// stay latched.
    pub fn consume(&mut self, mask: LineMask) -> LineMask {
        let matched = mask & self.pressed;
        self.pressed ^= matched;
        matched
    }

    /// Debounced level of the given lines (any bit set = pressed).
    #[allow(unused)]
    pub fn is_pressed(&self, mask: LineMask) -> bool {
        self.state & mask != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUTTON: LineMask = 1 << 0;
    const WINDOW: usize = DEBOUNCE_TICKS as usize;

    fn tick_n(debouncer: &mut Debouncer, raw: LineMask, n: usize) {
        for _ in 0..n {
            debouncer.sample(raw);
        }
    }

    #[test]
    fn idle_input_stays_released() {
        let mut debouncer = Debouncer::new();
        tick_n(&mut debouncer, 0, 20);
        assert!(!debouncer.is_pressed(BUTTON));
        assert_eq!(debouncer.consume(BUTTON), 0);
    }

    #[test]
    fn sustained_press_is_accepted_after_the_window() {
        let mut debouncer = Debouncer::new();
        tick_n(&mut debouncer, BUTTON, WINDOW - 1);
        assert!(!debouncer.is_pressed(BUTTON));
        debouncer.sample(BUTTON);
        assert!(debouncer.is_pressed(BUTTON));
        assert_eq!(debouncer.consume(BUTTON), BUTTON);
    }

    #[test]
    fn short_glitch_is_rejected() {
        let mut debouncer = Debouncer::new();
        tick_n(&mut debouncer, BUTTON, WINDOW - 1);
        tick_n(&mut debouncer, 0, 20);
        assert!(!debouncer.is_pressed(BUTTON));
        assert_eq!(debouncer.consume(BUTTON), 0);
    }

    #[test]
    fn bouncing_input_never_latches() {
        let mut debouncer = Debouncer::new();
        for i in 0..40 {
            debouncer.sample(if i % 2 == 0 { BUTTON } else { 0 });
        }
        assert!(!debouncer.is_pressed(BUTTON));
        assert_eq!(debouncer.consume(BUTTON), 0);
    }

    #[test]
    fn press_is_delivered_exactly_once() {
        let mut debouncer = Debouncer::new();
        assert_eq!(debouncer.consume(BUTTON), 0);
        tick_n(&mut debouncer, BUTTON, WINDOW);
        // Keep holding well past the window; still a single event.
        tick_n(&mut debouncer, BUTTON, 50);
        assert_eq!(debouncer.consume(BUTTON), BUTTON);
        assert_eq!(debouncer.consume(BUTTON), 0);
    }

    #[test]
    fn press_survives_until_a_consumer_shows_up() {
        let mut debouncer = Debouncer::new();
        tick_n(&mut debouncer, BUTTON, WINDOW);
        tick_n(&mut debouncer, 0, WINDOW);
        // Button pressed and fully released before anyone polled.
        assert_eq!(debouncer.consume(BUTTON), BUTTON);
        assert_eq!(debouncer.consume(BUTTON), 0);
    }

    #[test]
    fn release_edge_latches_no_event() {
        let mut debouncer = Debouncer::with_state(BUTTON);
        tick_n(&mut debouncer, 0, WINDOW);
        assert!(!debouncer.is_pressed(BUTTON));
        assert_eq!(debouncer.consume(BUTTON), 0);
    }

    #[test]
    fn held_at_boot_is_not_an_event() {
        let mut debouncer = Debouncer::with_state(BUTTON);
        tick_n(&mut debouncer, BUTTON, 20);
        assert!(debouncer.is_pressed(BUTTON));
        assert_eq!(debouncer.consume(BUTTON), 0);
    }

    #[test]
    fn presses_between_polls_collapse_into_one_event() {
        let mut debouncer = Debouncer::new();
        for _ in 0..2 {
            tick_n(&mut debouncer, BUTTON, WINDOW);
            tick_n(&mut debouncer, 0, WINDOW);
        }
        assert_eq!(debouncer.consume(BUTTON), BUTTON);
        assert_eq!(debouncer.consume(BUTTON), 0);
    }

    #[test]
    fn lines_outside_the_mask_stay_latched() {
        let mut debouncer = Debouncer::new();
        let other: LineMask = 1 << 3;
        tick_n(&mut debouncer, BUTTON | other, WINDOW);
        assert_eq!(debouncer.consume(BUTTON), BUTTON);
        assert_eq!(debouncer.consume(other), other);
        assert_eq!(debouncer.consume(BUTTON | other), 0);
    }
}
