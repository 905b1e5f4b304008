// Domain layer: listing model, slot allocation and ports. No I/O here.

pub mod allocator;
pub mod model;
pub mod ports;
pub mod slots;
