// ABOUTME: PostgreSQL source support
// ABOUTME: Connection setup, row conversion and the paginated table source

pub mod connection;
pub mod converter;
pub mod source;

pub use connection::connect;
pub use source::PostgresSource;
