//! Sliding-window volume-weighted average price.
//!
//! [`Calculator`] keeps the last `window_width` `(price × quantity, quantity)`
//! pairs together with their running sums and reports
//! `Σ price·quantity / Σ quantity` after every accepted trade.
//!
//! - Arithmetic is done in [`BigDecimal`], which has no fixed mantissa or
//!   scale, so sums are exact and never drift: evicting a pair subtracts
//!   exactly what was added for it.
//! - The exact ratio is rounded once to the nearest `f64` (ties to even) and
//!   rendered with 16 digits after the decimal point.
//! - Every fallible step runs before the window is touched. A rejected trade
//!   leaves buffers and sums as they were.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::{BigUint, Sign};
use num_traits::{ToPrimitive, Zero};
use parking_lot::Mutex;

use crate::error::{Operand, VwapError};
use crate::window::SlidingWindow;

/// Digits printed after the decimal point.
const OUTPUT_PRECISION: usize = 16;

/// Largest accepted decimal exponent magnitude of a literal. Far beyond the
/// binary64 range (about 1e-324 to 1e308) while keeping the cost of aligning
/// sums bounded.
const MAX_LITERAL_EXPONENT: i64 = 4096;

struct WindowState {
    products: SlidingWindow<BigDecimal>,
    quantities: SlidingWindow<BigDecimal>,
    cumulative_typical_price: BigDecimal,
    cumulative_volume: BigDecimal,
    vwap: Option<f64>,
}

/// Per-instrument VWAP aggregator over a window of the most recent trades.
pub struct Calculator {
    window_width: usize,
    state: Mutex<WindowState>,
}

impl Calculator {
    /// # Panics
    ///
    /// If `window_width` is zero.
    pub fn new(window_width: usize) -> Self {
        Self {
            window_width,
            state: Mutex::new(WindowState {
                products: SlidingWindow::new(window_width),
                quantities: SlidingWindow::new(window_width),
                cumulative_typical_price: BigDecimal::zero(),
                cumulative_volume: BigDecimal::zero(),
                vwap: None,
            }),
        }
    }

    pub fn window_width(&self) -> usize {
        self.window_width
    }

    /// Number of trades currently inside the window.
    pub fn len(&self) -> usize {
        self.state.lock().quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last value returned by [`update`](Self::update), if any.
    pub fn vwap(&self) -> Option<f64> {
        self.state.lock().vwap
    }

    pub fn cumulative_typical_price(&self) -> BigDecimal {
        self.state.lock().cumulative_typical_price.clone()
    }

    pub fn cumulative_volume(&self) -> BigDecimal {
        self.state.lock().cumulative_volume.clone()
    }

    /// Fold one trade into the window and return the new VWAP.
    ///
    /// Returns [`VwapError::ZeroVolume`] when the window's quantities sum to
    /// zero. The trade is still recorded in that case.
    pub fn update(&self, price: &str, quantity: &str) -> Result<String, VwapError> {
        let price = parse_decimal(Operand::Price, price)?;
        let quantity = parse_decimal(Operand::Quantity, quantity)?;
        let product = &price * &quantity;

        let mut state = self.state.lock();

        let evicting = state.quantities.is_full();
        let mut typical = &state.cumulative_typical_price + &product;
        let mut volume = &state.cumulative_volume + &quantity;
        if evicting {
            if let (Some(old_product), Some(old_quantity)) =
                (state.products.front(), state.quantities.front())
            {
                typical -= old_product;
                volume -= old_quantity;
            }
        }

        let vwap = (!volume.is_zero()).then(|| ratio_to_f64(&typical, &volume));

        if evicting {
            state.products.pop_front();
            state.quantities.pop_front();
        }
        state.products.push_back(product);
        state.quantities.push_back(quantity);
        state.cumulative_typical_price = typical;
        state.cumulative_volume = volume;

        match vwap {
            Some(value) => {
                state.vwap = Some(value);
                Ok(format!("{value:.prec$}", prec = OUTPUT_PRECISION))
            }
            None => Err(VwapError::ZeroVolume),
        }
    }
}

impl std::fmt::Debug for Calculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Calculator")
            .field("window_width", &self.window_width)
            .field("len", &state.quantities.len())
            .field("cumulative_typical_price", &state.cumulative_typical_price)
            .field("cumulative_volume", &state.cumulative_volume)
            .field("vwap", &state.vwap)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Parsing / conversion
// ---------------------------------------------------------------------------

/// `[+-]? digits [. digits]? ([eE] [+-]? digits)?` with at least one mantissa
/// digit. Rejects separators, `NaN`, infinities and trailing garbage before
/// `bigdecimal` sees the text.
fn is_decimal_literal(s: &str) -> bool {
    let b = s.as_bytes();
    let mut i = 0;
    if matches!(b.first(), Some(b'+' | b'-')) {
        i += 1;
    }

    let int_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let mut mantissa_digits = i - int_start;

    if i < b.len() && b[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        mantissa_digits += i - frac_start;
    }
    if mantissa_digits == 0 {
        return false;
    }

    if i < b.len() && matches!(b[i], b'e' | b'E') {
        i += 1;
        if i < b.len() && matches!(b[i], b'+' | b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }

    i == b.len()
}

fn parse_decimal(operand: Operand, text: &str) -> Result<BigDecimal, VwapError> {
    let err = || VwapError::Parse { operand, value: text.to_string() };
    if !is_decimal_literal(text) {
        return Err(err());
    }
    let value = BigDecimal::from_str(text).map_err(|_| err())?;
    let (_, scale) = value.as_bigint_and_exponent();
    if scale.abs() > MAX_LITERAL_EXPONENT {
        return Err(err());
    }
    Ok(value)
}

/// Round `numerator / denominator` to the nearest `f64`, ties to even.
///
/// The quotient is taken in integers with at least two bits beyond the
/// target precision plus a sticky bit for any non-zero remainder, so the
/// single rounding step below sees the exact value. Results below the normal
/// range round on the subnormal grid; results above it become infinite.
fn ratio_to_f64(numerator: &BigDecimal, denominator: &BigDecimal) -> f64 {
    let (a, a_scale) = numerator.as_bigint_and_exponent();
    let (b, b_scale) = denominator.as_bigint_and_exponent();
    if a.is_zero() {
        return 0.0;
    }
    let negative = (a.sign() == Sign::Minus) != (b.sign() == Sign::Minus);

    // |a| * 10^-a_scale / (|b| * 10^-b_scale) = n / d
    let (mut n, mut d) = (a.magnitude().clone(), b.magnitude().clone());
    let shift10 = b_scale - a_scale;
    let ten = BigUint::from(10u32);
    if shift10 >= 0 {
        n *= ten.pow(shift10.unsigned_abs() as u32);
    } else {
        d *= ten.pow(shift10.unsigned_abs() as u32);
    }

    // n / d lies in [2^(k-1), 2^(k+1)); scaling by 2^(55-k) leaves a quotient
    // of 55 or 56 bits.
    let k = n.bits() as i64 - d.bits() as i64;
    let shift2 = 55 - k;
    let (q, sticky) = scaled_quotient(&n, &d, shift2);
    let mut exponent = q.bits() as i64 - 1 - shift2;

    const MIN_NORMAL_EXP: i64 = -1022;
    const MAX_EXP: i64 = 1023;
    const SUBNORMAL_SHIFT: i64 = 1074;

    let magnitude = if exponent < MIN_NORMAL_EXP {
        // Quotient on the 2^-1076 grid: two guard bits below the subnormal
        // unit 2^-1074.
        let (q, sticky) = scaled_quotient(&n, &d, SUBNORMAL_SHIFT + 2);
        let m = q.to_u64().unwrap_or(u64::MAX) | u64::from(sticky);
        // A carry into bit 52 yields the smallest normal number, which
        // `from_bits` encodes correctly.
        f64::from_bits(round_half_even(m, 2))
    } else {
        let m = q.to_u64().unwrap_or(u64::MAX) | u64::from(sticky);
        let extra = (64 - m.leading_zeros()) - 53;
        let mut mantissa = round_half_even(m, extra);
        if mantissa == 1 << 53 {
            mantissa >>= 1;
            exponent += 1;
        }
        if exponent > MAX_EXP {
            f64::INFINITY
        } else {
            let biased = (exponent + 1023) as u64;
            f64::from_bits((biased << 52) | (mantissa & ((1 << 52) - 1)))
        }
    };

    if negative && magnitude != 0.0 { -magnitude } else { magnitude }
}

/// `floor(n * 2^shift / d)` and whether the division left a remainder.
fn scaled_quotient(n: &BigUint, d: &BigUint, shift: i64) -> (BigUint, bool) {
    let (n, d) = if shift >= 0 {
        (n << shift.unsigned_abs() as usize, d.clone())
    } else {
        (n.clone(), d << shift.unsigned_abs() as usize)
    };
    let q = &n / &d;
    let sticky = !(&n % &d).is_zero();
    (q, sticky)
}

/// Drop the low `extra` bits of `m`, rounding to nearest with ties to even.
/// Bit 0 of `m` already carries the sticky remainder.
fn round_half_even(m: u64, extra: u32) -> u64 {
    let half = 1u64 << (extra - 1);
    let low = m & ((1u64 << extra) - 1);
    let base = m >> extra;
    if low > half || (low == half && base & 1 == 1) { base + 1 } else { base }
}
