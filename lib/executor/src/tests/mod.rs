mod anomalies;
mod batching;
mod failures;
mod mutations;
