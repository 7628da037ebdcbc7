pub mod cell_dragging;

pub use cell_dragging::{CellDragger, DragInput};
