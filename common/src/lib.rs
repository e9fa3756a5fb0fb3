//! Modelo compartido del orquestador: datasets, catálogo de variaciones,
//! selección, partición en jobs y nombres de archivos.

pub mod config;
pub mod dataset;
pub mod error;
pub mod groups;
pub mod manifest;
pub mod naming;
pub mod planner;
pub mod selector;
pub mod variation;

/* --------- Re-exports de uso frecuente --------- */

pub use config::TaskLayout;
pub use dataset::{load_dataset, save_dataset, Dataset, DatasetStems, ParamValue};
pub use error::{Error, Result};
pub use groups::DatasetGroups;
pub use manifest::{load_manifest, load_manifest_with_stems};
pub use planner::{plan_jobs, JobSpec, MaxFiles, PlannerConfig};
pub use selector::{select, Request, SelectOptions, WorkItem};
pub use variation::{load_catalog, Direction, Variation, VariationCatalog, VariationEntry};
