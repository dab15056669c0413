#![deny(missing_docs)]
#![doc = "Shared error surface, deterministic RNG and conditions values for the CEMC engine."]

pub mod errors;
pub mod logging;
pub mod rng;
mod values;

pub use errors::{io_error, CemcError, ErrorInfo};
pub use logging::{LogSink, NullSink, StdoutSink};
pub use rng::{derive_substream_seed, run_seed, RngHandle};
pub use values::ValueMap;

/// Boltzmann constant in eV per Kelvin.
///
/// Energies throughout the engine are in eV and temperatures in K, so
/// `beta = 1 / (KB * temperature)`.
pub const KB: f64 = 8.617333262e-5;
