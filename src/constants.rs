pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

/// Wire lengths are authored in length units, ten per unit of board distance.
pub const WIRE_LENGTH_SCALE: f32 = 10.0;

pub const NODE_CAPACITY: usize = 2;
pub const OUTPUT_NODE_CAPACITY: usize = 1;

pub const OUTPUT_NODE_ID: usize = 0;

pub const COMPLETION_FILE_VERSION: u8 = 1;
