/**
 * Driver status envelope reported to the
 *  storage orchestrator on stdout.
 */
pub mod driver_status;
/**
 * Go-style duration strings used in
 *  volume options.
 */
pub mod duration;
/**
 * Credential leases and the wire types
 *  exchanged with the broker.
 */
pub mod lease;
/**
 * Deterministic, hash-derived file locations
 *  for per-target state.
 */
pub mod path_hash;
/**
 * On-disk mapping from mount target to the
 *  supervisor process holding it.
 */
pub mod registry;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::driver_status::{DriverCapabilities, DriverStatus, Status};
    pub use crate::lease::{CredentialLease, IssueRequest, IssueResponse, Lease};
    pub use crate::path_hash::{path_sum256, TargetPaths};
    pub use crate::registry::{Registry, RegistryError};
    pub use crate::version::build_info;
}
