pub mod backfill;
pub mod yahoo;
