pub mod common;
pub mod envelope;
pub mod manual_csv;
pub mod schema;

pub use common::{format_api_date, parse_erp_date};
pub use envelope::{flatten_nested, offers_price_list, parse_envelope};
pub use manual_csv::read_manual_csv;
