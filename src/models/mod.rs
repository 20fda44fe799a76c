mod audit_request;

pub use audit_request::*;
