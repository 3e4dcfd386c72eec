pub mod position;

pub use position::{MoveList, Position};
