//! Domain services used by HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and talk to external systems
//! (Supabase, Resend) so route handlers can stay focused on protocol
//! translation and auth plumbing.

pub mod backoffice;
pub mod contact;
pub mod usage;
