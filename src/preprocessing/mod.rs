//! Scaling and partitioning of the model inputs
//!
//! - [`MinMaxScaler`]: per-column `[0, 1]` scaling that remembers its ranges
//! - [`train_test_split`]: seeded, unstratified hold-out split

mod scaler;
mod split;

pub use scaler::{min_max_scale, ColumnRange, MinMaxScaler};
pub use split::{split_indices, train_test_split, TrainTestSplit};
