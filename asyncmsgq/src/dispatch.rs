//! Dispatch helper: a pure function, not a method, so it can never be
//! tempted to reach back into the queue.

use crate::{
    chunk::Chunk,
    target::{MessageTarget, Userdata},
};

/// Invoke `object`'s handler with the given message fields, or return `0`
/// if there is no target.
pub fn dispatch(
    object: Option<&dyn MessageTarget>,
    code: i32,
    userdata: Option<&Userdata>,
    offset: i64,
    chunk: Option<&Chunk>,
) -> i32 {
    match object {
        Some(object) => object.process_msg(code, userdata, offset, chunk),
        None => 0,
    }
}
