/// Use mimalloc as the global allocator.
/// Feeder and drainer allocate a parsed JSON tree per record.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod jsort;
