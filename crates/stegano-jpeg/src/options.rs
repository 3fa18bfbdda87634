/// Default upper bound for the coefficient buffer, in 8x8 blocks.
///
/// One block takes 128 bytes, so the default caps a working set at 512 MiB.
pub const DEFAULT_MAX_BLOCKS: usize = 1 << 22;

/// Options for a [`JpegCoder`](crate::JpegCoder)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoderOptions {
    /// If true, a restart marker with an unexpected number (RST3 where RST2
    /// was due) fails the scan. Otherwise it is logged and accepted.
    pub strict_restart_markers: bool,

    /// If true, a scan that fails half way restores the coefficients of the
    /// components it touched, so earlier scans stay intact.
    ///
    /// Each scan first copies its spectral band of every block of its
    /// components: two bytes per coefficient in `Ss..=Se`, so a sequential
    /// scan copies its components whole and a DC scan one value per block.
    pub rollback_failed_scans: bool,

    /// Largest coefficient buffer, counted in blocks over all components,
    /// that freezing a working set may allocate.
    pub max_blocks: usize,
}

impl Default for CoderOptions {
    fn default() -> Self {
        Self {
            strict_restart_markers: true,
            rollback_failed_scans: true,
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }
}

impl CoderOptions {
    pub fn with_strict_restart_markers(mut self, strict: bool) -> Self {
        self.strict_restart_markers = strict;
        self
    }

    pub fn with_rollback_failed_scans(mut self, rollback: bool) -> Self {
        self.rollback_failed_scans = rollback;
        self
    }

    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }
}
