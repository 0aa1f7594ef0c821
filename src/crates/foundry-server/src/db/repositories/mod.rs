//! Repository modules

pub mod automation_repo;
pub mod lock_repo;
pub mod plan_repo;
pub mod workflow_repo;

pub use automation_repo::AutomationRepository;
pub use lock_repo::LockRepository;
pub use plan_repo::PlanRepository;
pub use workflow_repo::WorkflowRepository;
