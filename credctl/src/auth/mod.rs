//! Authentication and authorization.
//!
//! Requests authenticate with a JWT bearer token carrying the user's id,
//! username and role. The [`current_user`] extractor verifies the token and
//! confirms the account is still active; [`session`] creates and verifies the
//! tokens themselves.
//!
//! Authorization is role-based with an ownership chain: admins may act on
//! everything, resellers on the client accounts they created (matched through
//! the `created_by` username), clients only on their own resources.

pub mod current_user;
pub mod session;
