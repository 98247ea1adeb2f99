use std::path::PathBuf;

use etcetera::BaseStrategy;

/// Platform cache directory for nsremap, e.g. `~/.cache/nsremap`
pub fn cache_dir() -> Option<PathBuf> {
    etcetera::choose_base_strategy()
        .ok()
        .map(|strategy| strategy.cache_dir().join("nsremap"))
}
