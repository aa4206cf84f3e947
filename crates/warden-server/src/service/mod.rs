//! Application services: the layer between HTTP/event handlers and the
//! repositories. Services hold the narrow event sink; the full publisher
//! stays with the event handler fan-out.

mod access;
mod groups;
mod roles;
mod tenants;

pub use access::AccessService;
pub use groups::GroupService;
pub use roles::RoleService;
pub use tenants::TenantService;
