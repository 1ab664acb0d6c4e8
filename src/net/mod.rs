//! Outbound calls to the application API on behalf of the signed-in user.

pub mod api;
