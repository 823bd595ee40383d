//! Draw-call encoders
//!
//! A [`DrawCall`] turns an index buffer and a primitive topology into exactly
//! one native draw call, and reports how many triangles, lines and points
//! that call produces.

pub mod draw_call;
pub mod index_buffer;

pub use draw_call::{
    DrawArrays, DrawCall, DrawElements, DrawRangeElements, MultiDrawElements, COUNT_UNKNOWN,
};
pub use index_buffer::{IndexBuffer, IndexData};
