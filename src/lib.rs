pub mod cache;
pub mod classifier;
pub mod engine;
pub mod environment;
pub mod kb;
pub mod logging;
pub mod ranker;
pub mod registry;
pub mod types;

pub const TARGET_KB_REQUEST: &str = "kb_request";
pub const TARGET_CLASSIFY: &str = "classify";
pub const TARGET_RANK: &str = "rank";
pub const TARGET_CACHE: &str = "cache";

pub use engine::Linker;
pub use types::{Category, RankPolicy, TypeProfile};
