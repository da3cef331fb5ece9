//! Kitchen intake: orders files and Poisson-paced submission.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::{Order, Temperature};
use crate::pod::ShelfPod;

/// One entry of the orders input file:
/// `{"name": ..., "temp": "hot", "shelfLife": 300, "decayRate": 0.45}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    pub name: String,
    pub temp: Temperature,
    pub shelf_life: u32,
    pub decay_rate: f64,
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("failed to read orders file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse orders file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("order {name:?} has non-regular temperature {temperature}")]
    NonRegularTemperature {
        name: String,
        temperature: Temperature,
    },
    #[error("intake rate {mean} cannot drive a poisson sampler")]
    UnusableRate { mean: f64 },
}

/// Read and validate an orders file. Every order must name a regular
/// temperature; the overflow category is the pod's business, not the
/// kitchen's.
pub fn load_orders(path: &Path) -> Result<Vec<OrderInput>, IntakeError> {
    let contents = std::fs::read_to_string(path).map_err(|source| IntakeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let inputs: Vec<OrderInput> =
        serde_json::from_str(&contents).map_err(|source| IntakeError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    for input in &inputs {
        if !input.temp.is_regular() {
            return Err(IntakeError::NonRegularTemperature {
                name: input.name.clone(),
                temperature: input.temp,
            });
        }
    }
    Ok(inputs)
}

/// Mint a pod-ready order from an input row.
pub fn build_order(input: &OrderInput) -> Arc<Order> {
    Arc::new(Order::new(
        Uuid::new_v4().to_string(),
        input.name.clone(),
        input.temp,
        input.shelf_life,
        input.decay_rate,
    ))
}

/// Feed the pod one-second batches whose sizes follow a Poisson draw of
/// `mean_per_second`, until the input runs dry. Returns every submitted
/// order so the caller can take a terminal census later.
pub fn submit_at_poisson_rate(
    pod: &ShelfPod,
    inputs: Vec<OrderInput>,
    mean_per_second: f64,
) -> Result<Vec<Arc<Order>>, IntakeError> {
    let poisson = Poisson::new(mean_per_second).map_err(|_| IntakeError::UnusableRate {
        mean: mean_per_second,
    })?;
    let mut rng = StdRng::from_entropy();
    let mut remaining = inputs.into_iter();
    let mut submitted = Vec::new();

    loop {
        let batch = poisson.sample(&mut rng) as usize;
        let mut exhausted = false;
        for _ in 0..batch {
            let Some(input) = remaining.next() else {
                exhausted = true;
                break;
            };
            let order = build_order(&input);
            pod.add_order(Arc::clone(&order));
            submitted.push(order);
        }

        tracing::info!(
            submitted = submitted.len(),
            shelved = pod.list_orders().len(),
            "intake batch done"
        );

        if exhausted || remaining.as_slice().is_empty() {
            return Ok(submitted);
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_original_orders_format() {
        let raw = r#"[
            {"name": "Banana Split", "temp": "frozen", "shelfLife": 20, "decayRate": 0.63},
            {"name": "McFlury", "temp": "frozen", "shelfLife": 375, "decayRate": 0.4},
            {"name": "Acai Bowl", "temp": "cold", "shelfLife": 249, "decayRate": 0.3}
        ]"#;
        let inputs: Vec<OrderInput> = serde_json::from_str(raw).unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0].temp, Temperature::Frozen);
        assert_eq!(inputs[0].shelf_life, 20);
        assert_eq!(inputs[2].decay_rate, 0.3);
    }

    #[test]
    fn rejects_overflow_orders() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(
            file,
            r#"[{{"name": "Soup", "temp": "overflow", "shelfLife": 10, "decayRate": 0.1}}]"#
        )
        .unwrap();
        assert!(matches!(
            load_orders(file.path()),
            Err(IntakeError::NonRegularTemperature { .. })
        ));
    }

    #[test]
    fn built_orders_carry_fresh_ids() {
        let input = OrderInput {
            name: "Pho".to_string(),
            temp: Temperature::Hot,
            shelf_life: 300,
            decay_rate: 0.45,
        };
        let a = build_order(&input);
        let b = build_order(&input);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), "Pho");
    }
}
