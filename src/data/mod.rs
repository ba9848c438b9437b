//! Job records, the job table, and file loading

mod loader;
mod table;

pub use loader::{
    parse_power_text, table_from_dataframe, FileFormat, FileInfo, JobLoader, POWER_COLUMN,
    REQUIRED_COLUMNS,
};
pub use table::{JobRecord, JobTable};
