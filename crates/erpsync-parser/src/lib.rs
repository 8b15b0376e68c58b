pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::ParserError;
pub use formats::{
    flatten_nested, format_api_date, offers_price_list, parse_envelope, parse_erp_date,
    read_manual_csv,
};
pub use model::{FieldKind, RawItem, Record, Value};
pub use registry::{map_columns, ApiEntity};
