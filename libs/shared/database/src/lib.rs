pub mod query;
pub mod supabase;

pub use query::{day_bounds, db_timestamp, Query};
pub use supabase::SupabaseClient;
