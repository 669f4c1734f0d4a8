//! Spatial indexing for particle and mesh simulations: balanced cell lists,
//! multi-phase Verlet lists and chunked sparse grids.

pub mod cell_list;
pub mod config;
pub mod mem_balanced;
pub mod phase;
pub mod search;
pub mod single;
pub mod space;
pub mod sparse;
pub mod stencil;
pub mod verlet;

#[cfg(feature = "python")]
mod python_api;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

pub use cell_list::CellList;
pub use mem_balanced::{BucketCursor, BucketRange, MemBalanced};
pub use phase::{PhaseCodec, PhaseCodecError};
pub use single::build_neighborlists;
pub use space::{CellDecomposer, Point, SpaceBox, SpaceError};
pub use sparse::{GridBox, GridKey, SparseGrid, SparseGridError, SparseKey};
pub use stencil::{AnomalousCell, CrsDomain, NeighborMode, Stencil};
pub use verlet::{VerletError, VerletList, VerletListM};
