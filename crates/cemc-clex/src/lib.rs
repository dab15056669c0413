#![deny(missing_docs)]
#![doc = "Cluster-expansion basis evaluators and extensive/delta energy evaluation."]

pub mod basis;
pub mod expansion;
pub mod local;
mod view;

pub use basis::{
    required_neighborhood, Clexulator, OrbitClexulator, ProtoClusterSite, ProtoOrbit, SiteBasis,
};
pub use expansion::{ClusterExpansion, MultiClusterExpansion, SparseCoefficients};
pub use local::{LocalClusterExpansion, LocalOrbitEvaluator, LocalProtoOrbit};
pub use view::OccView;
