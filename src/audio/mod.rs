// Module audio - Output facilities and timeline bookkeeping

pub mod engine;
pub mod offline;
pub mod output;
pub mod timing;
