/// Configuration for a content store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Fixed block size in characters for new entries (default: 4000).
    /// Larger blocks mean fewer reads per substring; smaller blocks mean
    /// less read amplification for short snippets.
    pub block_size_characters: u32,

    /// Preferred maximum size of a data file in bytes (default: 100MB).
    /// Data files hold whole entries only, so this size may be exceeded.
    pub data_file_size_hint: u64,

    /// Extra room reserved at the end of the writable TOC mapping (default: 1MB)
    pub write_map_reserve: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size_characters: 4000,
            data_file_size_hint: 100_000_000, // 100MB
            write_map_reserve: 1_000_000, // 1MB
        }
    }
}

impl StoreConfig {
    /// Create a config with the default tuning values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size in characters for new entries
    pub fn block_size_characters(mut self, size: u32) -> Self {
        self.block_size_characters = size;
        self
    }

    /// Set the preferred maximum data file size
    pub fn data_file_size_hint(mut self, size: u64) -> Self {
        self.data_file_size_hint = size;
        self
    }

    /// Set the write reserve for the TOC mapping
    pub fn write_map_reserve(mut self, size: usize) -> Self {
        self.write_map_reserve = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.block_size_characters, 4000);
        assert_eq!(config.data_file_size_hint, 100_000_000);
        assert_eq!(config.write_map_reserve, 1_000_000);
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::new()
            .block_size_characters(512)
            .data_file_size_hint(10 * 1024 * 1024)
            .write_map_reserve(64 * 1024);

        assert_eq!(config.block_size_characters, 512);
        assert_eq!(config.data_file_size_hint, 10 * 1024 * 1024);
        assert_eq!(config.write_map_reserve, 64 * 1024);
    }
}
