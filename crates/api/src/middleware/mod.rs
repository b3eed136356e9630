//! Request middleware.

pub mod timing;
