//! Local proxies for entities living in the peer.
//!
//! Everything here is a thin, identity-only handle. State is never cached;
//! each operation borrows the [`Client`](crate::Client) and makes its own
//! round trips.

mod buffer;
mod line_range;
mod object;
mod option;
mod tabpage;
mod window;

pub use buffer::Buffer;
pub use line_range::{normalize_bounds, normalize_index, normalize_position, normalize_slice, LineRange};
pub use object::RemoteObject;
pub use option::EditorOption;
pub use tabpage::Tabpage;
pub use window::Window;
