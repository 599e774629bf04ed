mod resp_error;
mod server_error;

pub use resp_error::*;
pub use server_error::*;
