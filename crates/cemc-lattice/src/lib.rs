#![deny(missing_docs)]
#![doc = "Prim description, supercell index conversions, neighbor lists and composition axes for the CEMC engine."]

pub mod composition;
pub mod neighborhood;
pub mod prim;
pub mod supercell;

pub use composition::{CompositionAxes, CompositionCalculator, CompositionConverter};
pub use neighborhood::{NeighborEntry, PrimNeighborList, SuperNeighborList};
pub use prim::{BasisSite, Prim};
pub use supercell::{det, smith_normal_form, Conversions, Mat3, UnitCell};
