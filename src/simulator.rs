//! ==============================================================================
//! simulator.rs - bench sensor
//! ==============================================================================
//!
//! purpose:
//!     emits json frames shaped like the station firmware's output at a fixed
//!     rate, so the pipeline and dashboard run with no board attached.
//!
//! ==============================================================================

use crate::error::LinkError;
use crate::link::{LineSource, LinkOpener};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

pub fn generate_frame<R: Rng>(rng: &mut R) -> serde_json::Value {
    fn round2(x: f64) -> f64 {
        (x * 100.0).round() / 100.0
    }

    serde_json::json!({
        "temperature": round2(rng.gen_range(15.0..35.0)),
        "humidity": round2(rng.gen_range(30.0..90.0)),
        "pressure": round2(rng.gen_range(950.0..1050.0)),
        "rain_analog": rng.gen_range(0..=1023),
        "rain_detected": rng.gen_bool(0.5),
        "light_intensity": rng.gen_range(0..=1023),
        "nh3": round2(rng.gen_range(0.0..0.5)),
        "co": round2(rng.gen_range(0.0..0.5)),
        "co2": round2(rng.gen_range(300.0..500.0)),
        "alcohol": round2(rng.gen_range(0.0..0.5)),
        "lpg": round2(rng.gen_range(0.0..0.5)),
        "ch4": round2(rng.gen_range(0.0..0.5)),
        "aqi": rng.gen_range(0..=500),
    })
}

pub struct SimulatedOpener {
    name: String,
    period: Duration,
    seed: Option<u64>,
}

impl SimulatedOpener {
    /// `period` must be non-zero, see `LinkConfig::simulated_period`
    pub fn new(period: Duration) -> Self {
        Self {
            name: "simulated sensor".to_string(),
            period,
            seed: None,
        }
    }

    /// deterministic frame sequence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[async_trait]
impl LinkOpener for SimulatedOpener {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> Result<Box<dyn LineSource>, LinkError> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Box::new(SimulatedSource { rng, ticker }))
    }
}

struct SimulatedSource {
    rng: StdRng,
    ticker: Interval,
}

#[async_trait]
impl LineSource for SimulatedSource {
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        if tokio::time::timeout(timeout, self.ticker.tick()).await.is_err() {
            return Ok(None);
        }
        let mut line = generate_frame(&mut self.rng).to_string().into_bytes();
        line.push(b'\n');
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder;

    #[test]
    fn generated_frames_decode() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let frame = generate_frame(&mut rng).to_string();
            let reading = decoder::decode(frame.as_bytes()).unwrap();
            assert!((15.0..=35.0).contains(&reading.temp));
            assert!(reading.co2.is_some());
        }
    }

    #[tokio::test]
    async fn simulated_link_yields_lines() {
        let opener = SimulatedOpener::new(Duration::from_millis(10)).with_seed(1);
        let mut source = opener.open().await.unwrap();
        for _ in 0..3 {
            let line = source.read_line(Duration::from_secs(1)).await.unwrap().unwrap();
            assert_eq!(line.last(), Some(&b'\n'));
            assert!(decoder::decode(&line).is_ok());
        }
    }
}
