// Fine-tuning glue
//
// The optimizer, LoRA math and checkpoint format belong to an external
// framework; this module hands it a prepared run directory and records the outcome.

pub mod checkpoint;
pub mod dataset;
pub mod driver;
pub mod hyperparams;

pub use checkpoint::latest_checkpoint;
pub use dataset::{split, Split};
pub use driver::{RunMetrics, TrainingDriver, TrainingError, TrainingJob};
pub use hyperparams::Hyperparameters;
