//! strata-core
//!
//! Data model and pure decision logic for the infrastructure-program
//! controller. No I/O lives here.
//!
//! - `resource` / `status`: the declared object and its observed status
//! - `condition`: keyed condition store and the reason vocabulary
//! - `transition`: status transitions applied by each phase
//! - `gate`: plan / apply / drift / retry predicates
//! - `plan_id`: deterministic plan identifiers and prefix approval
//! - `encoding`: saved-plan payload encoding
//! - `hcl`: backend and cloud configuration blocks

pub mod condition;
pub mod encoding;
pub mod error;
pub mod gate;
pub mod hcl;
pub mod plan_id;
pub mod resource;
pub mod status;
pub mod transition;

pub use crate::condition::{Condition, ConditionStatus, ConditionType, Conditions, reason};
pub use crate::error::CoreError;
pub use crate::resource::{ApprovePlan, ManagedResource, ObjectKey, ResourceSpec};
pub use crate::status::{InventoryEntry, ResourceStatus};
