pub mod access;
pub mod request_id;
