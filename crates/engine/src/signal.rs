// In crates/engine/src/signal.rs

use core_types::Signal;
use rust_decimal::Decimal;

/// The result of one signal computation. Both averages are kept so the
/// evaluator can persist them as session analytics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalReading {
    pub signal: Signal,
    pub short_ma: Decimal,
    pub long_ma: Decimal,
}

/// Computes the dual-SMA crossover signal from a chronologically ordered
/// series of closing prices (oldest first).
///
/// Pure and deterministic. The caller is expected to supply at least
/// `long_window` closes; with fewer, each average degenerates to the most
/// recent close rather than erroring.
pub fn evaluate(
    closes: &[Decimal],
    short_window: u32,
    long_window: u32,
    neutral_threshold: Decimal,
) -> SignalReading {
    let short_ma = moving_average(closes, short_window as usize);
    let long_ma = moving_average(closes, long_window as usize);
    let diff = short_ma - long_ma;

    let signal = if diff.is_zero() {
        Signal::Neutral
    } else if long_ma.is_zero() {
        // A zero long average makes the relative band meaningless; fall back
        // to classifying by the sign of the divergence alone.
        if diff > Decimal::ZERO { Signal::Long } else { Signal::Short }
    } else {
        let ratio = (diff / long_ma).abs();
        if ratio < neutral_threshold {
            Signal::Neutral
        } else if diff > Decimal::ZERO {
            Signal::Long
        } else {
            Signal::Short
        }
    };

    SignalReading { signal, short_ma, long_ma }
}

/// Simple moving average over the last `window` values. Degenerates to the
/// single most recent value when the series is shorter than the window.
fn moving_average(closes: &[Decimal], window: usize) -> Decimal {
    let Some(last) = closes.last() else {
        return Decimal::ZERO;
    };
    if window == 0 || closes.len() < window {
        return *last;
    }

    let tail = &closes[closes.len() - window..];
    let sum: Decimal = tail.iter().copied().sum();
    sum / Decimal::from(window as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn same_inputs_give_same_reading() {
        let closes = vec![dec!(1.0), dec!(1.1), dec!(1.2), dec!(1.3), dec!(1.4)];
        let a = evaluate(&closes, 2, 4, dec!(0.001));
        let b = evaluate(&closes, 2, 4, dec!(0.001));
        assert_eq!(a, b);
    }

    #[test]
    fn divergence_inside_the_band_is_neutral() {
        // short MA 100.5 vs long MA 100: ratio 0.005 < threshold 0.01.
        let closes = vec![dec!(99.5), dec!(100.5)];
        let reading = evaluate(&closes, 1, 2, dec!(0.01));
        assert_eq!(reading.short_ma, dec!(100.5));
        assert_eq!(reading.long_ma, dec!(100.0));
        assert_eq!(reading.signal, Signal::Neutral);
    }

    #[test]
    fn divergence_beyond_the_band_follows_the_sign() {
        // short MA 102 vs long MA 100: ratio 0.02 >= threshold 0.01.
        let closes = vec![dec!(98), dec!(102)];
        let reading = evaluate(&closes, 1, 2, dec!(0.01));
        assert_eq!(reading.signal, Signal::Long);

        let closes = vec![dec!(102), dec!(98)];
        let reading = evaluate(&closes, 1, 2, dec!(0.01));
        assert_eq!(reading.signal, Signal::Short);
    }

    #[test]
    fn zero_long_average_classifies_by_sign_alone() {
        // long MA is exactly zero; any threshold is ignored.
        let closes = vec![dec!(-5), dec!(5)];
        let reading = evaluate(&closes, 1, 2, dec!(0.99));
        assert_eq!(reading.long_ma, Decimal::ZERO);
        assert_eq!(reading.signal, Signal::Long);
    }

    #[test]
    fn identical_averages_are_neutral_even_with_zero_threshold() {
        let closes = vec![dec!(2), dec!(2), dec!(2), dec!(2)];
        let reading = evaluate(&closes, 2, 4, Decimal::ZERO);
        assert_eq!(reading.signal, Signal::Neutral);
    }

    #[test]
    fn short_series_degenerates_to_last_close() {
        let closes = vec![dec!(1.5)];
        let reading = evaluate(&closes, 2, 4, dec!(0.001));
        assert_eq!(reading.short_ma, dec!(1.5));
        assert_eq!(reading.long_ma, dec!(1.5));
        assert_eq!(reading.signal, Signal::Neutral);
    }
}
