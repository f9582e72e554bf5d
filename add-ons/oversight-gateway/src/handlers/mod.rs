//! Route handlers. Every handler resolves the caller role from the request headers and lets
//! the core decide what that role may see.

pub(crate) mod requests;
