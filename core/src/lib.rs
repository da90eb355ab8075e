pub mod block;
pub mod channels;
pub mod detector;
pub mod entropy;
pub mod era;
pub mod heuristics;
pub mod patterns;
pub mod pools;
pub mod signal;

pub use block::Block;
pub use channels::{Channel, Channels};
pub use detector::{detect_signals, DetectorState};
pub use era::{EraLabel, EraSlug};
pub use signal::Signal;
