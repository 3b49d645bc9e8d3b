pub mod deployment;
pub mod filter;
pub mod parallel;
pub mod scanner;

pub use deployment::{DeployPhase, DeployPlan, DeployReport, Deployer, PlanEntry};
pub use filter::{derive_folders, FilterError, PathFilter};
pub use parallel::Parallelizor;
pub use scanner::{collect, CollectOptions, Collected};
