pub mod collision;
pub mod config;
pub mod engine;
pub mod filter;
pub mod geo;
pub mod historical;
pub mod lod;
pub mod polygon;
pub mod rng;
pub mod session;
pub mod snapshot;
pub mod style;
pub mod surface;
pub mod synth;
pub mod timer;
pub mod web;
pub mod zone;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder, EngineError, EngineSettings, PassReport};
pub use filter::{FilterState, FilterUpdate};
pub use surface::{MapSurface, RecordingSurface};
pub use zone::{Category, TierKind, Zone, ZoneId};
