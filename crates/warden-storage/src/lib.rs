pub mod audit;
pub mod error;
pub mod evaluator;
pub mod groups;
pub mod migrations;
pub mod pool;
pub mod resources;
pub mod roles;
pub mod tenants;

pub use audit::{AuditStore, InMemoryAuditStore, PostgresAuditStore};
pub use error::StorageError;
pub use evaluator::PermissionRepository;
pub use groups::GroupRepository;
pub use pool::{DbConfig, connect};
pub use resources::ResourceRepository;
pub use roles::RoleRepository;
pub use tenants::TenantRepository;
