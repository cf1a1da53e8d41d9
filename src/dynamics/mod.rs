//! Dynamics: contact law, force reduction, clump aggregation, timestep selection and integration.

pub mod aggregator;
pub mod forces;
pub mod integrator;
pub mod law;
pub mod timestep;

pub use aggregator::ClumpAggregator;
pub use forces::ForceBuffer;
pub use integrator::LeapfrogIntegrator;
pub use law::{effective_mass, BodyState, ContactLaw, ViscoElasticLaw};
pub use timestep::{CriticalTimestep, TimestepController};
