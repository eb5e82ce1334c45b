// Library root: league transaction windows and draft coordination.

pub mod config;
pub mod db;
pub mod draft;
pub mod league;
pub mod notify;
pub mod schedule;
pub mod store;
pub mod transactions;

#[cfg(test)]
mod test_support;
