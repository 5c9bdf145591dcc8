//! Static registries built once at startup.
//!
//! - [`module_table`] - Per-revision block tables and the pipeline assembler
//! - [`capability`] - Block and revision capability flags
//! - [`tags`] - Named-tag registry used for per-frame properties

pub mod capability;
pub mod module_table;
pub mod tags;

pub use capability::{BlockCaps, BpsCapability, UbwcVersions};
pub use module_table::{
    AssemblyOptions, BlockFactory, HardwareBlockDescriptor, ModulePlan, ModuleVersion,
    PipelineAssembler, PlanStats,
};
pub use tags::{TagId, TagRegistry};
