// Layout defaults. The actual values live in ModelInstance, these are only what new_empty() starts from.

pub const DEFAULT_FIELD_COUNT: u32 = 30;
pub const DEFAULT_EMBEDDING_DIM: u32 = 14;
pub const DEFAULT_HASH_BITS: u32 = 18;

// Packed feature index is u32, field lives above the hash bits
pub const MAX_HASH_BITS: u32 = 28;

pub const ALIGN_BYTES: usize = 32;
pub const LANES: usize = ALIGN_BYTES / std::mem::size_of::<f32>();

// How many interaction ordinals ahead we look when deciding what to prefetch
pub const PREFETCH_DEPTH: usize = 1;
pub const CACHE_LINE_BYTES: usize = 64;
