//! Custom extractors whose rejections use the API error envelope.

mod json;
mod path_id;

pub use json::ApiJson;
pub use path_id::PathId;
