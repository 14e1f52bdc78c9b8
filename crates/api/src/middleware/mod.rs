//! Request extractors: trusted-gateway identity and request metadata.

pub mod identity;
pub mod request_info;
