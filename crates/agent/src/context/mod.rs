//! Conversational context for a single turn.
//!
//! | Piece | Source | When it shrinks |
//! |-------|--------|-----------------|
//! | Summary | Cached on the thread | Regenerated once the unsummarized history passes the threshold |
//! | Retained tail | Latest messages | Never; always passed verbatim |
//! | Current message | The inbound text | Never |

pub mod token;
pub mod window;

pub use window::{BoundedContext, ContextWindowManager};
