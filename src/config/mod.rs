mod settings;

pub use settings::{
    HistoryConfig, LoggingConfig, Settings, StorageBackendKind, StorageConfig, DEFAULT_MAX_SIZE,
};
