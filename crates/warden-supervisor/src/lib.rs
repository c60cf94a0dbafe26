//! Orchestration for the Warden containment layer.
//!
//! The [`Supervisor`] is the seam every agent action passes through: it
//! consults the detection engines in `warden-core`, asks the authoritative
//! [`Validator`] when one is wired, and drives the kill layers in
//! `warden-kill` when a finding demands containment. Alongside it live the
//! agent registry binding agent ids to their process footprints and the
//! capped histories the status surface reads.
//!
//! # Modules
//!
//! - [`history`]: capped, newest-first finding and report logs
//! - [`registry`]: agent-to-PID bookkeeping with containment status
//! - [`supervisor`]: the check pipeline and containment orchestration
//! - [`validator`]: the authoritative validator seam
//!
//! [`Supervisor`]: supervisor::Supervisor
//! [`Validator`]: validator::Validator

pub mod history;
pub mod registry;
pub mod supervisor;
pub mod validator;
