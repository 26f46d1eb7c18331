//! Desired-state items from the control plane (§3) and the dependency
//! protection policy (§4.F).

pub mod critical;
pub mod item;
pub mod requirement;

pub use critical::CriticalPackages;
pub use item::{DependencyItem, DependencyResult, ItemType, ModelItem, ModelType, PluginItem};
pub use requirement::{plan_install, InstallPlan, Requirement};
