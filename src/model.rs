//! Signal Models
//!
//! Pure functions from time and fixed coefficients to plausible sensor values.
//!
//! # Architecture
//!
//! - [`SignalModel`]: Trait the producer samples every tick
//! - [`SeasonalModel`]: Yearly + daily sinusoids (temperature, humidity)
//! - [`HarmonicModel`]: Diurnally drifting resonant modes (acceleration)
//!
//! # Example
//!
//! ```rust
//! use sensorgen::model::{SeasonalModel, SeasonalParams};
//!
//! let model = SeasonalModel::temperature(SeasonalParams::temperature_defaults()).unwrap();
//! let july_afternoon = model.evaluate(7.0, 14.0);
//! assert!(july_afternoon > model.evaluate(1.0, 14.0));
//! ```

pub mod clock;
mod harmonic;
mod seasonal;
mod traits;

pub use clock::SeasonalTime;
pub use harmonic::{
    DEFAULT_DRIFT_RATIO, DEFAULT_FREQUENCIES, DEFAULT_PEAK_HOUR, HarmonicModel, HarmonicParams,
    UniformRange,
};
pub use seasonal::{DailyAmplitude, HUMIDITY_CEILING, SeasonalModel, SeasonalParams};
pub use traits::{ModelError, SignalModel, check_finite};
