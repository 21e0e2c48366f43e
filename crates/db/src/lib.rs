pub mod connection;
pub mod passthrough;

pub use connection::{connect, connect_read_only, connect_with_settings, DbPool};
pub use passthrough::{
    ColumnSchema, PassthroughError, QueryPassthrough, QueryRows, SqlQueryPassthrough, TableSchema,
    MAX_ROWS,
};
