pub mod file_io;
pub mod table;
pub use file_io::*;
pub use table::{Cell, ElementType, IntoCell, TableRow, Terminal};
