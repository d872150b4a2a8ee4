// Abstract single-hop link: a flat range cutoff, a distance-proportional
// delay with exponential jitter, and a seeded coin-flip loss. Deliberately
// not a radio model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    // meters; packets between nodes further apart than this are lost
    pub max_range: f64,
    pub base_delay: Duration,
    pub delay_per_meter: Duration,
    // mean of the exponential jitter, zero disables it
    pub jitter_mean: Duration,
    // 0.0..=1.0 chance an in-range packet is dropped anyway
    pub loss_rate: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_range: 50.0,
            base_delay: Duration::from_millis(1),
            delay_per_meter: Duration::from_micros(10),
            jitter_mean: Duration::from_millis(2),
            loss_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delivery {
    Delivered { delay: Duration },
    Lost,
    OutOfRange,
}

#[derive(Debug)]
pub struct LinkModel {
    config: LinkConfig,
    rng: StdRng,
    jitter: Option<Exp<f64>>,
}

impl LinkModel {
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        let jitter = (!config.jitter_mean.is_zero())
            .then(|| Exp::new(1.0 / config.jitter_mean.as_secs_f64()).unwrap());

        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            jitter,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn verdict(&mut self, distance: f64) -> Delivery {
        if distance > self.config.max_range {
            return Delivery::OutOfRange;
        }

        if self.config.loss_rate > 0.0 && self.rng.r#gen::<f64>() < self.config.loss_rate {
            return Delivery::Lost;
        }

        let mut delay = self.config.base_delay + self.config.delay_per_meter.mul_f64(distance);
        if let Some(jitter) = &self.jitter {
            delay += Duration::from_secs_f64(jitter.sample(&mut self.rng));
        }

        Delivery::Delivered { delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> LinkConfig {
        LinkConfig {
            jitter_mean: Duration::ZERO,
            ..LinkConfig::default()
        }
    }

    #[test]
    fn out_of_range_is_always_lost() {
        let mut link = LinkModel::new(quiet_config(), 1);
        assert_eq!(link.verdict(50.1), Delivery::OutOfRange);
    }

    #[test]
    fn lossless_in_range_always_delivers() {
        let mut link = LinkModel::new(quiet_config(), 1);
        for _ in 0..100 {
            match link.verdict(10.0) {
                Delivery::Delivered { delay } => {
                    assert_eq!(delay, Duration::from_millis(1) + Duration::from_micros(100));
                }
                other => panic!("unexpected verdict {:?}", other),
            }
        }
    }

    #[test]
    fn same_seed_same_verdicts() {
        let config = LinkConfig {
            loss_rate: 0.3,
            ..LinkConfig::default()
        };
        let mut a = LinkModel::new(config, 99);
        let mut b = LinkModel::new(config, 99);
        for _ in 0..200 {
            assert_eq!(a.verdict(20.0), b.verdict(20.0));
        }
    }

    #[test]
    fn total_loss_rate_drops_everything() {
        let config = LinkConfig {
            loss_rate: 1.0,
            ..quiet_config()
        };
        let mut link = LinkModel::new(config, 5);
        for _ in 0..50 {
            assert_eq!(link.verdict(1.0), Delivery::Lost);
        }
    }
}
