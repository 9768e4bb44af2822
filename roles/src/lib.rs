pub mod audit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod registry;
pub mod store;

pub use audit::Violation;
pub use config::CoordinatorConfig;
pub use coordinator::TabRoleCoordinator;
pub use error::RoleError;
pub use model::{CoordinatorPhase, Role, RoleDecision, RoleState, TabId, TabRecord};
pub use registry::{NotifyOutcome, TabEvent, TabFilter, TabMessage, TabRegistry};
pub use store::RoleStore;
