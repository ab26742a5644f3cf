mod delivery;
mod device;
mod group;
mod inbox;
mod message;
mod owner;
mod result;

pub use delivery::*;
pub use device::*;
pub use group::*;
pub use inbox::*;
pub use message::*;
pub use owner::*;
pub use result::*;
