use indexsync_observability::{Counter, Histogram};

pub struct SyncMetrics {
    pub windows_created: Counter<u64>,
    pub flushes: Counter<u64>,
    pub submitted_operations: Counter<u64>,
    pub failed_operations: Counter<u64>,
    pub flush_size: Histogram<u64>,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        let meter = indexsync_observability::meter("sync");
        Self {
            windows_created: meter
                .u64_counter("sync.windows.created")
                .with_unit("{window}")
                .with_description("number of batch windows opened")
                .build(),
            flushes: meter
                .u64_counter("sync.flush.count")
                .with_unit("{request}")
                .with_description("number of bulk requests sent")
                .build(),
            submitted_operations: meter
                .u64_counter("sync.operations.submitted")
                .with_unit("{operation}")
                .with_description("operations sent to the bulk endpoint")
                .build(),
            failed_operations: meter
                .u64_counter("sync.operations.failed")
                .with_unit("{operation}")
                .with_description("operations rejected by the bulk endpoint")
                .build(),
            flush_size: meter
                .u64_histogram("sync.flush.size")
                .with_unit("{operation}")
                .with_description("operations per bulk request")
                .build(),
        }
    }
}
