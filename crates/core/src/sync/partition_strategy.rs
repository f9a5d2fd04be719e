//! How the analytics phase walks the configured partitions.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Sequential by default. `Concurrent` runs up to `max_in_flight` partitions
/// at once; results keep the configured partition order either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionStrategy {
    #[default]
    Sequential,
    Concurrent { max_in_flight: usize },
}

impl PartitionStrategy {
    pub fn from_concurrency(max_in_flight: usize) -> Self {
        if max_in_flight <= 1 {
            Self::Sequential
        } else {
            Self::Concurrent { max_in_flight }
        }
    }

    pub async fn run<F, Fut, T>(&self, partition_ids: &[String], work: F) -> Vec<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = T>,
    {
        match *self {
            Self::Sequential => {
                let mut results = Vec::with_capacity(partition_ids.len());
                for partition_id in partition_ids {
                    results.push(work(partition_id.clone()).await);
                }
                results
            }
            Self::Concurrent { max_in_flight } => {
                stream::iter(partition_ids.iter().cloned().map(&work))
                    .buffered(max_in_flight.max(1))
                    .collect()
                    .await
            }
        }
    }
}
