// src/process/mod.rs
pub mod clean;
pub mod metrics;
pub mod profile;

pub use clean::{clean, ProcessedRow, ProcessingTable};
pub use metrics::{
    compute_growth_factor, compute_incidence, GrowthRow, GrowthTable, IncidenceRow,
    IncidenceTable,
};
pub use profile::{profile, ProfileRow, ProfileTable};
