mod item;
mod settings;
mod state;

pub use item::{CanonicalItem, DedupeKey};
pub use marquee_api::types::MediaKind;
pub use settings::{clamp_pages, ConfigPatch, WatchlistConfig, MAX_PAGE_COUNT, MIN_PAGE_COUNT};
pub use state::PipelineState;
