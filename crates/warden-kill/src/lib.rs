//! Process and network containment for Warden.
//!
//! Two enforcement layers live here. The [`KillExecutor`] escalates through
//! the graceful and forceful signal sequence and verifies the target
//! actually died. The [`NetworkKillManager`] drives a [`FirewallBackend`]
//! chosen at startup to cut an agent off from the network, with the
//! bookkeeping needed to undo exactly what it installed.
//!
//! # Modules
//!
//! - [`error`]: signal delivery failures
//! - [`executor`]: the escalating kill sequence
//! - [`firewall`]: OS firewall backends
//! - [`netblock`]: network containment bookkeeping
//! - [`process`]: liveness probes and signal delivery
//!
//! [`KillExecutor`]: executor::KillExecutor
//! [`NetworkKillManager`]: netblock::NetworkKillManager
//! [`FirewallBackend`]: firewall::FirewallBackend

pub mod error;
pub mod executor;
pub mod firewall;
pub mod netblock;
pub mod process;
