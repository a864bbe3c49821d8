pub mod config;
pub mod country;
pub mod grid;
pub mod ownership;
pub mod persistence;
pub mod preview;
pub mod sync;
pub mod terrain;
pub mod tile;
pub mod world;

pub use config::{ConfigError, OctaveSchedule, TerrainConfig, WorldConfig};
pub use country::{Country, CountryError, CountryRegistry};
pub use grid::{TileGrid, wrap_position};
pub use ownership::{FillOutcome, FillReport, FillTask, OwnershipError};
pub use persistence::{ByteOrder, PersistenceError, load_grid, save_grid};
pub use sync::{MirrorBuffer, SyncOutcome, SyncUpdate, TileChange};
pub use terrain::{TerrainError, TerrainSource, generate_terrain};
pub use tile::{Tile, TileDetails, UNCLAIMED};
pub use world::{World, WorldError, WorldOptions};
