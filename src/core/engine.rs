/// The stochastic propagation engine — bootstrap-sampled iterations
/// of population flow from the root to the terminal stages.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::core::model::{Model, RunParams};
use crate::core::output::OutputLog;
use crate::schema::stage::Casting;
use crate::schema::table::TableError;
use crate::schema::tree::StageId;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("the model has not been checked since its last modification")]
    NotValidated,
    #[error("initial population must be non-negative (got {0})")]
    NegativeInitial(f32),
    #[error("stage '{stage}' references casting '{name}', which no longer exists")]
    MissingCasting { stage: String, name: String },
    #[error("stage '{stage}' no longer matches its casting assignment")]
    InconsistentStage { stage: String },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Cooperative cancellation token, polled between iterations only: a
/// request lands once the iteration in flight has completed. Clones
/// share the flag, so one clone can be handed to another thread or a
/// UI callback while the engine holds the other.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs bootstrap iterations of a checked model. Owns its pseudorandom
/// generator, seeded once at construction, so runs are independently
/// seedable and reproducible.
pub struct SimulationEngine {
    rng: StdRng,
}

impl SimulationEngine {
    /// An engine seeded from the operating system's entropy source.
    pub fn new() -> SimulationEngine {
        SimulationEngine {
            rng: StdRng::from_entropy(),
        }
    }

    /// A reproducible engine: the same seed, model, and parameters
    /// produce the same trajectories.
    pub fn with_seed(seed: u64) -> SimulationEngine {
        SimulationEngine {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Run `params.iterations` iterations of stochastic propagation,
    /// recording every `report`-flagged stage into the returned log.
    ///
    /// The model must be checked; running an unchecked model fails
    /// with [`RunError::NotValidated`] and does no work. Cancellation
    /// is observed at iteration boundaries; rows of iterations that
    /// never ran stay empty.
    pub fn run(
        &mut self,
        model: &Model,
        params: &RunParams,
        cancel: &CancelFlag,
    ) -> Result<OutputLog, RunError> {
        if !model.is_checked() {
            return Err(RunError::NotValidated);
        }
        if params.initial < 0.0 {
            return Err(RunError::NegativeInitial(params.initial));
        }

        let tree = model.tree();
        let reported: Vec<StageId> = tree
            .preorder()
            .into_iter()
            .filter(|&id| tree.get(id).is_some_and(|s| s.report))
            .collect();

        // Room for the parameter header even when few stages report.
        let cols = (reported.len() + 1).max(5);
        let rows = params.iterations as usize + 3;
        let mut log = OutputLog::new(rows, cols);

        log.set(0, 1, "Initial".to_string());
        log.set(0, 2, format!("{}", params.initial));
        log.set(0, 3, "Eps".to_string());
        log.set(0, 4, format!("{}", params.epsilon));
        log.set(2, 0, "Iter".to_string());
        for (k, &id) in reported.iter().enumerate() {
            if let Some(stage) = tree.get(id) {
                log.set(1, k + 1, stage.hierarchical_id.clone());
                log.set(2, k + 1, stage.name.clone());
            }
        }

        let mut populations = vec![0.0f32; tree.slot_count()];
        for i in 1..=params.iterations as usize {
            if cancel.is_cancelled() {
                break;
            }
            log.set(i + 2, 0, format!("{:>4}", i));
            self.cast(model, &mut populations, tree.root(), params.initial, params.epsilon)?;
            for (k, &id) in reported.iter().enumerate() {
                log.set(i + 2, k + 1, format!("{:>10.3}", populations[id.0]));
            }
        }

        Ok(log)
    }

    /// Propagate a population of `n` through the stage at `id`,
    /// recursively. Terminates because validation guarantees every
    /// path ends in a `Success`/`Sink` leaf.
    fn cast(
        &mut self,
        model: &Model,
        populations: &mut [f32],
        id: StageId,
        n: f32,
        eps: f32,
    ) -> Result<(), RunError> {
        let Some(stage) = model.tree().get(id) else {
            return Ok(());
        };
        populations[id.0] = n;
        match &stage.casting {
            Casting::Success | Casting::Sink => Ok(()),
            Casting::Direct => {
                let Some(&child) = stage.children().first() else {
                    return Err(RunError::InconsistentStage {
                        stage: stage.name.clone(),
                    });
                };
                self.cast(model, populations, child, n, eps)
            }
            Casting::Table(name) => {
                let Some(table) = model.table(name) else {
                    return Err(RunError::MissingCasting {
                        stage: stage.name.clone(),
                        name: name.clone(),
                    });
                };
                let row = self.sample_row(table.rows());
                for (col, &child) in stage.children().iter().enumerate() {
                    let f = table.read_cell(row, col)?;
                    // Quasi-zero floor: no child ever receives exactly
                    // zero population.
                    self.cast(model, populations, child, n * f.max(eps), eps)?;
                }
                Ok(())
            }
            Casting::Unassigned => Err(RunError::InconsistentStage {
                stage: stage.name.clone(),
            }),
        }
    }

    /// Bootstrap draw: one row index, uniform over the table's rows.
    /// A single-row table is used deterministically.
    fn sample_row(&mut self, rows: usize) -> usize {
        if rows > 1 {
            self.rng.gen_range(0..rows)
        } else {
            0
        }
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        SimulationEngine::new()
    }
}
