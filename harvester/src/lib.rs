//! Harvest: busca las salidas de los jobs y las combina por grupo y
//! variación.

pub mod harvest;
pub mod merge;

pub use harvest::{
    default_merge_concurrency, harvest, plan_harvest, HarvestFailure, HarvestOptions, HarvestPlan,
    HarvestReport, MergeRule,
};
pub use merge::{merge, Hadd, Merger, Source, DEFAULT_MERGE_TOOL};
