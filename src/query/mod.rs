// Submodules for separation of concerns
mod eval;
mod parse;
mod translate;
mod types;

pub use eval::{SortKey, compare_docs, compare_values, eval_query, parse_sort, wildcard_match};
pub(crate) use eval::get_path;
pub use parse::{FieldsSerde, FilterSerde, OrderSerde, parse_filter, parse_filter_json, parse_where};
pub use translate::{QueryBuilder, SearchRequest, build_query, build_sort, like_to_wildcard};
pub use types::{CmpOp, Condition, Order, Projection, QueryFilter, SortSpec};
