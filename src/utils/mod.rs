pub mod auth;
pub mod hash;
pub mod keyed_mutex;
pub mod url;
pub mod validation;
