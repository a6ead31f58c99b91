//! Black-Scholes pricing with continuous dividend yield: a bisection
//! implied-volatility solver and analytic Greeks.
//!
//! The solver bisects sigma over [0, 5] until the bracket narrows to 1e-4,
//! using the monotone predicate `model_price(sigma) > market_price`. Theta
//! is reported per calendar day, vega per vol point.

use super::greek::Greek;

const LOW_VOL: f64 = 0.0;
const HIGH_VOL: f64 = 5.0;
const VOL_TOLERANCE: f64 = 0.0001;
const MIN_Z_SCORE: f64 = -8.0;
const MAX_Z_SCORE: f64 = 8.0;
/// sqrt(2 * pi)
const ROOT_2PI: f64 = 2.50662827463;

/// Built-in Black-Scholes Greek calculator.
///
/// `legacy_zero_dividend_iv` reproduces the historical behavior of running
/// the implied-volatility search with a zero dividend yield while the Greek
/// formulas still receive the real yield; it exists for regression
/// comparisons against systems that shipped that way.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackScholesCalculator {
    pub legacy_zero_dividend_iv: bool,
}

impl BlackScholesCalculator {
    pub fn new() -> BlackScholesCalculator {
        BlackScholesCalculator::default()
    }

    pub fn with_legacy_zero_dividend_iv(mut self, enabled: bool) -> BlackScholesCalculator {
        self.legacy_zero_dividend_iv = enabled;
        self
    }

    /// Compute the full Greek tuple from market state. Returns the invalid
    /// Greek when any input fails the domain gate.
    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &self,
        risk_free_rate: f64,
        dividend_yield: f64,
        underlying_price: f64,
        ask_price: f64,
        bid_price: f64,
        strike: f64,
        is_put: bool,
        years_to_expiration: f64,
    ) -> Greek {
        if ask_price <= 0.0
            || bid_price <= 0.0
            || risk_free_rate <= 0.0
            || underlying_price <= 0.0
            || years_to_expiration <= 0.0
            || strike <= 0.0
        {
            return Greek::invalid();
        }
        let market_price = (ask_price + bid_price) / 2.0;
        let sigma = self.implied_volatility(
            is_put,
            underlying_price,
            strike,
            years_to_expiration,
            risk_free_rate,
            dividend_yield,
            market_price,
        );
        if sigma <= 0.0 {
            return Greek::invalid();
        }
        let delta = self.delta(
            is_put,
            underlying_price,
            strike,
            years_to_expiration,
            risk_free_rate,
            dividend_yield,
            sigma,
        );
        let gamma = self.gamma(
            underlying_price,
            strike,
            years_to_expiration,
            risk_free_rate,
            dividend_yield,
            sigma,
        );
        let theta = self.theta(
            is_put,
            underlying_price,
            strike,
            years_to_expiration,
            risk_free_rate,
            dividend_yield,
            sigma,
        );
        let vega = self.vega(
            underlying_price,
            strike,
            years_to_expiration,
            risk_free_rate,
            dividend_yield,
            sigma,
        );
        Greek::new(sigma, delta, gamma, theta, vega, true)
    }

    /// Bisection implied-volatility solve to within [`VOL_TOLERANCE`].
    #[allow(clippy::too_many_arguments)]
    pub fn implied_volatility(
        &self,
        is_put: bool,
        underlying_price: f64,
        strike: f64,
        years_to_expiration: f64,
        risk_free_rate: f64,
        dividend_yield: f64,
        market_price: f64,
    ) -> f64 {
        let search_yield = if self.legacy_zero_dividend_iv {
            0.0
        } else {
            dividend_yield
        };
        let mut low = LOW_VOL;
        let mut high = HIGH_VOL;
        while (high - low) > VOL_TOLERANCE {
            let mid = (high + low) / 2.0;
            let model = if is_put {
                self.price_put(
                    underlying_price,
                    strike,
                    years_to_expiration,
                    risk_free_rate,
                    mid,
                    search_yield,
                )
            } else {
                self.price_call(
                    underlying_price,
                    strike,
                    years_to_expiration,
                    risk_free_rate,
                    mid,
                    search_yield,
                )
            };
            if model > market_price {
                high = mid;
            } else {
                low = mid;
            }
        }
        (high + low) / 2.0
    }

    #[allow(clippy::too_many_arguments)]
    fn delta(
        &self,
        is_put: bool,
        s: f64,
        k: f64,
        t: f64,
        r: f64,
        q: f64,
        sigma: f64,
    ) -> f64 {
        let call_delta = normal_cdf(d1(s, k, t, r, sigma, q));
        if is_put {
            call_delta - 1.0
        } else {
            call_delta
        }
    }

    fn gamma(&self, s: f64, k: f64, t: f64, r: f64, q: f64, sigma: f64) -> f64 {
        phi(d1(s, k, t, r, sigma, q)) * (-q * t).exp() / (s * sigma * t.sqrt())
    }

    #[allow(clippy::too_many_arguments)]
    fn theta(
        &self,
        is_put: bool,
        s: f64,
        k: f64,
        t: f64,
        r: f64,
        q: f64,
        sigma: f64,
    ) -> f64 {
        let d1 = d1(s, k, t, r, sigma, q);
        let d2 = d2(s, k, t, r, sigma, q);
        let decay = s * phi(d1) * sigma / (2.0 * t.sqrt());
        let carry = r * k * (-r * t).exp();
        if is_put {
            (-decay + carry * normal_cdf(-d2)) / 365.0
        } else {
            (-decay - carry * normal_cdf(d2)) / 365.0
        }
    }

    fn vega(&self, s: f64, k: f64, t: f64, r: f64, q: f64, sigma: f64) -> f64 {
        s * (-q * t).exp() * phi(d1(s, k, t, r, sigma, q)) * t.sqrt() / 100.0
    }

    /// European call value with continuous dividend yield.
    pub fn price_call(&self, s: f64, k: f64, t: f64, r: f64, sigma: f64, q: f64) -> f64 {
        let d1 = d1(s, k, t, r, sigma, q);
        let d2 = d2(s, k, t, r, sigma, q);
        s * (-q * t).exp() * normal_cdf(d1) - k * (-r * t).exp() * normal_cdf(d2)
    }

    /// European put value with continuous dividend yield.
    pub fn price_put(&self, s: f64, k: f64, t: f64, r: f64, sigma: f64, q: f64) -> f64 {
        let d1 = d1(s, k, t, r, sigma, q);
        let d2 = d2(s, k, t, r, sigma, q);
        k * (-r * t).exp() * normal_cdf(-d2) - s * (-q * t).exp() * normal_cdf(-d1)
    }
}

fn d1(s: f64, k: f64, t: f64, r: f64, sigma: f64, q: f64) -> f64 {
    ((s / k).ln() + (r - q + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt())
}

fn d2(s: f64, k: f64, t: f64, r: f64, sigma: f64, q: f64) -> f64 {
    d1(s, k, t, r, sigma, q) - sigma * t.sqrt()
}

/// Standard normal density.
fn phi(x: f64) -> f64 {
    (-0.5 * x * x).exp() / ROOT_2PI
}

/// Cumulative standard normal via the Maclaurin series of the integral,
/// clamped outside |z| = 8. Terms accumulate until addition stops changing
/// the sum (floating-point fixed point).
fn normal_cdf(z: f64) -> f64 {
    if z < MIN_Z_SCORE {
        return 0.0;
    }
    if z > MAX_Z_SCORE {
        return 1.0;
    }
    let mut i = 3.0;
    let mut sum = 0.0;
    let mut term = z;
    while sum + term != sum {
        sum += term;
        term = term * z * z / i;
        i += 2.0;
    }
    0.5 + sum * phi(z)
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: f64 = 100.0;
    const K: f64 = 100.0;
    const T: f64 = 1.0;
    const R: f64 = 0.05;

    #[test]
    fn test_normal_cdf_center_and_symmetry() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(0.5) + normal_cdf(-0.5) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_normal_cdf_clamps() {
        assert_eq!(normal_cdf(9.0), 1.0);
        assert_eq!(normal_cdf(-9.0), 0.0);
        assert!(normal_cdf(7.9) < 1.0);
    }

    #[test]
    fn test_call_price_increases_in_vol() {
        let calc = BlackScholesCalculator::new();
        let mut last = 0.0;
        for step in 1..=20 {
            let sigma = 0.05 * step as f64;
            let price = calc.price_call(S, K, T, R, sigma, 0.0);
            assert!(price > last, "price not increasing at sigma={sigma}");
            last = price;
        }
    }

    #[test]
    fn test_implied_vol_recovers_known_sigma() {
        let calc = BlackScholesCalculator::new();
        let market = calc.price_call(S, K, T, R, 0.20, 0.0);
        let recovered = calc.implied_volatility(false, S, K, T, R, 0.0, market);
        assert!((recovered - 0.20).abs() <= 1e-4, "recovered {recovered}");
    }

    #[test]
    fn test_implied_vol_recovers_put_with_yield() {
        let calc = BlackScholesCalculator::new();
        let market = calc.price_put(S, K, T, R, 0.35, 0.02);
        let recovered = calc.implied_volatility(true, S, K, T, R, 0.02, market);
        assert!((recovered - 0.35).abs() <= 1e-4, "recovered {recovered}");
    }

    #[test]
    fn test_legacy_flag_ignores_yield_in_search() {
        let q = 0.03;
        let exact = BlackScholesCalculator::new();
        let legacy = BlackScholesCalculator::new().with_legacy_zero_dividend_iv(true);
        let market = exact.price_call(S, K, T, R, 0.20, q);

        let recovered = exact.implied_volatility(false, S, K, T, R, q, market);
        assert!((recovered - 0.20).abs() <= 1e-4);

        // The legacy search prices with q = 0, so it lands on a lower vol
        // for the same dividend-adjusted market price.
        let skewed = legacy.implied_volatility(false, S, K, T, R, q, market);
        assert!(skewed < 0.20 - 1e-3, "skewed {skewed}");
    }

    #[test]
    fn test_put_call_parity() {
        let calc = BlackScholesCalculator::new();
        for q in [0.0, 0.025] {
            let call = calc.price_call(S, K, T, R, 0.3, q);
            let put = calc.price_put(S, K, T, R, 0.3, q);
            let lhs = call - put;
            let rhs = S * (-q * T).exp() - K * (-R * T).exp();
            assert!((lhs - rhs).abs() < 1e-9, "parity broken at q={q}");
        }
    }

    #[test]
    fn test_calculate_atm_call_shape() {
        let calc = BlackScholesCalculator::new();
        let market = calc.price_call(S, K, T, R, 0.20, 0.0);
        let half_spread = 0.05;
        let greek = calc.calculate(
            R,
            0.0,
            S,
            market + half_spread,
            market - half_spread,
            K,
            false,
            T,
        );
        assert!(greek.is_valid_greek());
        assert!((greek.implied_volatility - 0.20).abs() < 1e-3);
        assert!(greek.delta > 0.5 && greek.delta < 0.75);
        assert!(greek.gamma > 0.0);
        assert!(greek.vega > 0.0);
        assert!(greek.theta < 0.0);
    }

    #[test]
    fn test_calculate_put_delta_negative() {
        let calc = BlackScholesCalculator::new();
        let market = calc.price_put(S, K, T, R, 0.20, 0.0);
        let greek = calc.calculate(R, 0.0, S, market + 0.05, market - 0.05, K, true, T);
        assert!(greek.is_valid_greek());
        assert!(greek.delta < 0.0 && greek.delta > -1.0);
    }

    #[test]
    fn test_invalid_inputs_short_circuit() {
        let calc = BlackScholesCalculator::new();
        // One bad input at a time: ask, bid, rate, spot, expiry, strike.
        assert!(!calc.calculate(R, 0.0, S, 0.0, 1.0, K, false, T).is_valid);
        assert!(!calc.calculate(R, 0.0, S, 1.0, 0.0, K, false, T).is_valid);
        assert!(!calc.calculate(0.0, 0.0, S, 1.0, 1.0, K, false, T).is_valid);
        assert!(!calc.calculate(R, 0.0, 0.0, 1.0, 1.0, K, false, T).is_valid);
        assert!(!calc.calculate(R, 0.0, S, 1.0, 1.0, K, false, 0.0).is_valid);
        assert!(!calc.calculate(R, 0.0, S, 1.0, 1.0, 0.0, false, T).is_valid);
    }

    #[test]
    fn test_bisection_converges_within_sixteen_iterations() {
        // ceil(log2(5.0 / 1e-4)) = 16: the bracket must close after at
        // most 16 halvings.
        let mut width: f64 = HIGH_VOL - LOW_VOL;
        let mut iterations = 0;
        while width > VOL_TOLERANCE {
            width /= 2.0;
            iterations += 1;
        }
        assert!(iterations <= 16, "took {iterations} iterations");
    }
}
