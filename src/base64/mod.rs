mod core;
mod error;


pub use self::core::{
    Config, DEFAULT_WRAP_WIDTH, decode_source, encode_source, process_source, strip_garbage, wrap,
};
pub use self::error::Base64Error;
