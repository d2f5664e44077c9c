//! Bucket grid construction.
//!
//! Every level partitions `[min_price, max_price]` with boundaries drawn from
//! an exponential distribution and min-max rescaled onto the range. Exponential
//! draws cluster near zero, so grids are finer toward the low end of the range
//! where most winning bids live. Each level gets its own rate from a linear
//! schedule and its own independent draw.
//!
//! ```text
//! λ_i = λ_min + i × (λ_max − λ_min) / (levels − 1)
//! x_j ~ Exp(λ_i),  j = 0..=buckets,  sorted
//! bound_j = min_price + (x_j − x_0) / (x_n − x_0) × (max_price − min_price)
//! ```

use rand::Rng;
use rand_distr::{Distribution, Exp};

use super::bucket::Bucket;
use super::level::Level;
use crate::errors::ConfigError;
use crate::optimizer::config::SpaceConfig;

/// Smallest skew in the ensemble (near-uniform grid).
pub const LAMBDA_MIN: f64 = 0.1;

/// Largest skew in the ensemble (front-loaded grid).
pub const LAMBDA_MAX: f64 = 1.8;

/// Linearly spaced skews in `[LAMBDA_MIN, LAMBDA_MAX]`, one per level.
pub fn skew_schedule(level_count: usize) -> Vec<f64> {
    match level_count {
        0 => Vec::new(),
        1 => vec![LAMBDA_MIN],
        n => {
            let step = (LAMBDA_MAX - LAMBDA_MIN) / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        LAMBDA_MAX
                    } else {
                        LAMBDA_MIN + step * i as f64
                    }
                })
                .collect()
        }
    }
}

/// Draw `bucket_count + 1` ordered boundaries spanning exactly
/// `[min_price, max_price]`.
pub fn bucket_bounds<R: Rng + ?Sized>(
    rng: &mut R,
    skew: f64,
    min_price: f64,
    max_price: f64,
    bucket_count: usize,
) -> Vec<f64> {
    let n = bucket_count + 1;
    let span = max_price - min_price;

    let mut draws: Vec<f64> = match Exp::new(skew) {
        Ok(exp) => (0..n).map(|_| exp.sample(rng)).collect(),
        Err(_) => Vec::new(),
    };
    draws.sort_by(|a, b| a.total_cmp(b));

    let (lo, hi) = match (draws.first(), draws.last()) {
        (Some(&lo), Some(&hi)) if hi - lo > f64::EPSILON => (lo, hi),
        // Degenerate draw: fall back to an even split
        _ => {
            return (0..n)
                .map(|i| min_price + span * i as f64 / bucket_count as f64)
                .collect();
        }
    };

    let mut bounds: Vec<f64> = draws
        .iter()
        .map(|x| (min_price + (x - lo) / (hi - lo) * span).clamp(min_price, max_price))
        .collect();

    // Pin the ends so the level covers the range exactly
    bounds[0] = min_price;
    bounds[n - 1] = max_price;
    bounds
}

/// Build one level for skew `skew`.
pub fn build_level<R: Rng + ?Sized>(
    rng: &mut R,
    skew: f64,
    min_price: f64,
    max_price: f64,
    config: &SpaceConfig,
) -> Level {
    let bounds = bucket_bounds(rng, skew, min_price, max_price, config.bucket_count);
    let buckets = bounds
        .windows(2)
        .map(|w| Bucket::new(w[0], w[1], config.window_capacity, config.discount))
        .collect();
    Level::new(skew, buckets)
}

/// Build the full level ensemble for one context.
pub fn build_levels<R: Rng + ?Sized>(
    rng: &mut R,
    context: &str,
    min_price: f64,
    max_price: f64,
    config: &SpaceConfig,
) -> Result<Vec<Level>, ConfigError> {
    config.validate()?;
    validate_range(context, min_price, max_price)?;

    Ok(skew_schedule(config.level_count)
        .into_iter()
        .map(|skew| build_level(rng, skew, min_price, max_price, config))
        .collect())
}

/// Price ranges must be finite and non-empty.
pub fn validate_range(context: &str, min_price: f64, max_price: f64) -> Result<(), ConfigError> {
    if !min_price.is_finite() || !max_price.is_finite() || min_price >= max_price {
        return Err(ConfigError::PriceRange {
            context: context.to_string(),
            min_price,
            max_price,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(levels: usize, buckets: usize) -> SpaceConfig {
        SpaceConfig {
            level_count: levels,
            bucket_count: buckets,
            window_capacity: 10,
            discount: 0.9,
        }
    }

    fn assert_partition(level: &Level, min_price: f64, max_price: f64) {
        let buckets = level.buckets();
        assert_eq!(buckets.first().unwrap().lower(), min_price);
        assert_eq!(buckets.last().unwrap().upper(), max_price);
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].upper(), pair[1].lower(), "gap or overlap");
        }
        for b in buckets {
            assert!(b.lower() <= b.upper());
        }
    }

    #[test]
    fn test_skew_schedule() {
        assert!(skew_schedule(0).is_empty());
        assert_eq!(skew_schedule(1), vec![LAMBDA_MIN]);

        let s = skew_schedule(3);
        assert_eq!(s.len(), 3);
        assert!((s[0] - 0.1).abs() < 1e-12);
        assert!((s[1] - 0.95).abs() < 1e-12);
        assert_eq!(s[2], LAMBDA_MAX);
    }

    #[test]
    fn test_levels_partition_range_for_many_seeds() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            for (levels, buckets) in [(1, 5), (3, 10), (5, 37)] {
                let cfg = config(levels, buckets);
                let built = build_levels(&mut rng, "ctx", 0.25, 7.5, &cfg).unwrap();
                assert_eq!(built.len(), levels);
                for level in &built {
                    assert_eq!(level.buckets().len(), buckets);
                    assert_partition(level, 0.25, 7.5);
                }
            }
        }
    }

    #[test]
    fn test_every_price_in_range_is_located() {
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = config(4, 12);
        let levels = build_levels(&mut rng, "ctx", 1.0, 2.0, &cfg).unwrap();
        for level in &levels {
            for i in 0..=1000 {
                let price = 1.0 + i as f64 / 1000.0;
                assert!(level.locate(price).is_some(), "price {price} not found");
            }
            assert!(level.locate(0.9999).is_none());
            assert!(level.locate(2.0001).is_none());
        }
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let cfg = config(3, 8);
        let a = build_levels(&mut StdRng::seed_from_u64(11), "ctx", 0.0, 1.0, &cfg).unwrap();
        let b = build_levels(&mut StdRng::seed_from_u64(11), "ctx", 0.0, 1.0, &cfg).unwrap();
        for (la, lb) in a.iter().zip(b.iter()) {
            assert_eq!(la.mid_prices(), lb.mid_prices());
        }
    }

    #[test]
    fn test_degenerate_skew_falls_back_to_even_split() {
        let mut rng = StdRng::seed_from_u64(5);
        let bounds = bucket_bounds(&mut rng, -1.0, 0.0, 1.0, 5);
        assert_eq!(bounds.len(), 6);
        for (i, b) in bounds.iter().enumerate() {
            assert!((b - i as f64 / 5.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut cfg = config(0, 10);
        assert_eq!(
            build_levels(&mut rng, "ctx", 0.0, 1.0, &cfg).unwrap_err(),
            ConfigError::LevelCount(0)
        );
        cfg = config(2, 4);
        assert_eq!(
            build_levels(&mut rng, "ctx", 0.0, 1.0, &cfg).unwrap_err(),
            ConfigError::BucketCount(4)
        );
        cfg = config(2, 5);
        cfg.window_capacity = 9;
        assert_eq!(
            build_levels(&mut rng, "ctx", 0.0, 1.0, &cfg).unwrap_err(),
            ConfigError::WindowCapacity(9)
        );
        cfg.window_capacity = 10;
        cfg.discount = -0.1;
        assert!(matches!(
            build_levels(&mut rng, "ctx", 0.0, 1.0, &cfg),
            Err(ConfigError::Discount(_))
        ));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = config(1, 5);
        assert!(build_levels(&mut rng, "ctx", 2.0, 1.0, &cfg).is_err());
        assert!(build_levels(&mut rng, "ctx", 1.0, 1.0, &cfg).is_err());
        assert!(build_levels(&mut rng, "ctx", f64::NAN, 1.0, &cfg).is_err());
    }
}
